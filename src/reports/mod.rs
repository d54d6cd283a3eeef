//! Report generation: PDF documents, Excel workbooks and the quick exports of
//! the latest sample.
//!
//! Rendering failures never leave the user empty-handed: a minimal text PDF
//! is produced instead and the failure is reported alongside it.

mod excel;
mod export;
mod pdf;
mod snapshot;

pub use excel::{Cell, Sheet, Workbook, MAX_COLUMN_WIDTH};
pub use export::{analytics_mail, analytics_workbook, metadata_csv, records_csv, AnalyticsRange};
pub use pdf::{PdfDocument, MAX_PAGES};
pub use snapshot::{daily_summary_mail, sample_csv, sample_pdf, test_mail};

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::analytics::{alert_stats, describe, ColumnStats, DailyRecord, Metric};
use crate::error::ReportError;
use crate::mail::{MailAttachment, OutgoingMail};
use crate::models::{format_local, Parameter};

// ---

/// Reports kept per session.
pub const REPORT_HISTORY_LEN: usize = 50;

/// Reports left after "Clear Old Reports".
pub const REPORT_CLEAR_KEEP: usize = 20;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    #[serde(rename = "Daily Summary")]
    DailySummary,
    #[serde(rename = "Weekly Analysis")]
    WeeklyAnalysis,
    #[serde(rename = "Monthly Review")]
    MonthlyReview,
    #[serde(rename = "Incident Report")]
    IncidentReport,
    #[serde(rename = "Compliance Report")]
    ComplianceReport,
    #[serde(rename = "Custom Report")]
    CustomReport,
}

impl ReportType {
    pub fn label(self) -> &'static str {
        match self {
            ReportType::DailySummary => "Daily Summary",
            ReportType::WeeklyAnalysis => "Weekly Analysis",
            ReportType::MonthlyReview => "Monthly Review",
            ReportType::IncidentReport => "Incident Report",
            ReportType::ComplianceReport => "Compliance Report",
            ReportType::CustomReport => "Custom Report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "Last 7 days")]
    Last7Days,
    #[serde(rename = "Last 30 days")]
    Last30Days,
    #[serde(rename = "Last quarter")]
    LastQuarter,
    #[serde(rename = "Custom range")]
    CustomRange,
    #[serde(rename = "Year to date")]
    YearToDate,
}

impl TimePeriod {
    pub fn label(self) -> &'static str {
        match self {
            TimePeriod::Last7Days => "Last 7 days",
            TimePeriod::Last30Days => "Last 30 days",
            TimePeriod::LastQuarter => "Last quarter",
            TimePeriod::CustomRange => "Custom range",
            TimePeriod::YearToDate => "Year to date",
        }
    }

    /// First day covered when the report is dated `report_date`; `None`
    /// covers the whole history. Fails when the period would start before
    /// the earliest representable date.
    pub fn start(self, report_date: NaiveDate) -> Result<Option<NaiveDate>, ReportError> {
        // ---
        let days_back = |days: i64| {
            report_date
                .checked_sub_signed(Duration::days(days - 1))
                .map(Some)
                .ok_or_else(|| {
                    ReportError::InvalidRequest(format!(
                        "{} before {} is out of range",
                        self.label(),
                        report_date
                    ))
                })
        };
        match self {
            TimePeriod::Last7Days => days_back(7),
            TimePeriod::Last30Days => days_back(30),
            TimePeriod::LastQuarter => days_back(90),
            TimePeriod::YearToDate => Ok(NaiveDate::from_ymd_opt(report_date.year(), 1, 1)),
            TimePeriod::CustomRange => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportSection {
    #[serde(rename = "Executive Summary")]
    ExecutiveSummary,
    #[serde(rename = "Sensor Data")]
    SensorData,
    #[serde(rename = "Alert History")]
    AlertHistory,
    #[serde(rename = "Trend Analysis")]
    TrendAnalysis,
    #[serde(rename = "Recommendations")]
    Recommendations,
    #[serde(rename = "Action Items")]
    ActionItems,
    #[serde(rename = "Cost Analysis")]
    CostAnalysis,
    #[serde(rename = "Energy Consumption")]
    EnergyConsumption,
    #[serde(rename = "System Performance")]
    SystemPerformance,
    #[serde(rename = "Maintenance Log")]
    MaintenanceLog,
}

impl ReportSection {
    pub fn label(self) -> &'static str {
        match self {
            ReportSection::ExecutiveSummary => "Executive Summary",
            ReportSection::SensorData => "Sensor Data",
            ReportSection::AlertHistory => "Alert History",
            ReportSection::TrendAnalysis => "Trend Analysis",
            ReportSection::Recommendations => "Recommendations",
            ReportSection::ActionItems => "Action Items",
            ReportSection::CostAnalysis => "Cost Analysis",
            ReportSection::EnergyConsumption => "Energy Consumption",
            ReportSection::SystemPerformance => "System Performance",
            ReportSection::MaintenanceLog => "Maintenance Log",
        }
    }

    /// Sections preselected by the report form.
    pub fn defaults() -> Vec<ReportSection> {
        vec![
            ReportSection::ExecutiveSummary,
            ReportSection::SensorData,
            ReportSection::AlertHistory,
            ReportSection::Recommendations,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Excel,
}

/// The report form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    // ---
    pub report_type: ReportType,
    pub report_date: NaiveDate,
    pub time_period: TimePeriod,
    #[serde(default = "ReportSection::defaults")]
    pub sections: Vec<ReportSection>,
    pub format: ReportFormat,
    #[serde(default)]
    pub send_email: bool,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl ReportRequest {
    /// Reject forms that cannot produce a report; returns the first day
    /// covered.
    pub fn validate(&self) -> Result<Option<NaiveDate>, ReportError> {
        // ---
        if self.sections.is_empty() {
            return Err(ReportError::InvalidRequest(
                "Select at least one report section".into(),
            ));
        }
        self.time_period.start(self.report_date)
    }
}

/// What the report history table shows.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    // ---
    pub id: String,
    pub generated_at: String,
    pub report_type: ReportType,
    pub report_date: NaiveDate,
    pub time_period: TimePeriod,
    pub sections: Vec<ReportSection>,
    pub size_bytes: usize,
    pub format: ReportFormat,
    pub email_sent: bool,
    pub status: String,
}

/// A rendered report ready for download.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    // ---
    pub metadata: ReportMetadata,
    pub generated: DateTime<Local>,
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,

    /// Set when the requested format failed and a text PDF was produced.
    pub warning: Option<String>,
}

/// Build the report described by `req` from the daily history.
///
/// Generating again with the same `now` and history reproduces the same
/// report, id included.
pub fn generate(
    req: &ReportRequest,
    history: &[DailyRecord],
    location: &str,
    now: DateTime<Local>,
) -> Result<GeneratedReport, ReportError> {
    // ---
    let start = req.validate()?;
    let id = report_id(now);
    let records: Vec<DailyRecord> = history
        .iter()
        .filter(|r| r.date <= req.report_date && start.map_or(true, |s| r.date >= s))
        .cloned()
        .collect();

    let sections = build_sections(&req.sections, &records);

    let rendered = match req.format {
        ReportFormat::Pdf => render_pdf(req, &sections, &id, location, now),
        ReportFormat::Excel => render_excel(req, &records, location, now),
    };

    Ok(package(req, &sections, rendered, location, now))
}

fn report_id(now: DateTime<Local>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Wrap the renderer's output. A failed render becomes a text PDF of the
/// same sections, with the failure kept as a warning.
fn package(
    req: &ReportRequest,
    sections: &[(String, String)],
    rendered: Result<Vec<u8>, ReportError>,
    location: &str,
    now: DateTime<Local>,
) -> GeneratedReport {
    // ---
    let id = report_id(now);
    let (bytes, format, warning) = match rendered {
        Ok(bytes) => (bytes, req.format, None),
        Err(e) => {
            tracing::error!("Report {} failed to render: {}", id, e);
            let text = plain_text(req, sections, &id, location, now);
            (
                fallback_pdf(&text),
                ReportFormat::Pdf,
                Some(format!("Error generating report: {}. A plain text PDF was produced instead.", e)),
            )
        }
    };

    let (extension, content_type) = match format {
        ReportFormat::Pdf => ("pdf", "application/pdf"),
        ReportFormat::Excel => ("xlsx", XLSX_CONTENT_TYPE),
    };

    let filename = format!(
        "{}_{}.{}",
        req.report_type.label().replace(' ', "_"),
        id,
        extension
    );

    tracing::info!(
        "Generated report {} ({}, {} bytes)",
        id,
        filename,
        bytes.len()
    );

    GeneratedReport {
        metadata: ReportMetadata {
            id,
            generated_at: format_local(&now),
            report_type: req.report_type,
            report_date: req.report_date,
            time_period: req.time_period,
            sections: req.sections.clone(),
            size_bytes: bytes.len(),
            format,
            email_sent: false,
            status: if warning.is_some() {
                "Generated (fallback)".to_string()
            } else {
                "Generated".to_string()
            },
        },
        generated: now,
        filename,
        content_type,
        bytes,
        warning,
    }
}

impl GeneratedReport {
    /// The report as a mail attachment. Empty `recipients` means the
    /// configured default.
    pub fn to_mail(&self, recipients: &[String]) -> OutgoingMail {
        // ---
        let meta = &self.metadata;
        let mut mail = OutgoingMail::new(
            format!("{} Report - {}", meta.report_type.label(), meta.report_date),
            format!(
                "Please find attached the {} report.\n\n\
                 Report ID: {}\n\
                 Time Period: {}\n\
                 Generated: {}\n",
                meta.report_type.label(),
                meta.id,
                meta.time_period.label(),
                meta.generated_at
            ),
        );
        mail.to = recipients
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        mail.attachment = Some(MailAttachment {
            filename: self.filename.clone(),
            content_type: self.content_type,
            bytes: self.bytes.clone(),
        });
        mail
    }

    /// History entry for this report.
    pub fn log_entry(&self, request: &ReportRequest) -> LoggedReport {
        LoggedReport {
            metadata: self.metadata.clone(),
            request: request.clone(),
            generated: self.generated,
        }
    }
}

/// Minimal text-only PDF used when rendering fails.
pub fn fallback_pdf(text: &str) -> Vec<u8> {
    // ---
    let mut doc = PdfDocument::new();
    doc.paragraph(text);
    doc.render_truncated()
}

/// Days on which `p` classified as CRITICAL.
fn critical_days(records: &[DailyRecord], p: Parameter) -> usize {
    alert_stats(records)
        .iter()
        .find(|s| s.parameter == p)
        .map_or(0, |s| s.count)
}

fn mean(records: &[DailyRecord], m: Metric) -> f64 {
    describe(records, m).map_or(0.0, |s| s.mean)
}

fn build_sections(selected: &[ReportSection], records: &[DailyRecord]) -> Vec<(String, String)> {
    // ---
    selected
        .iter()
        .map(|section| {
            let body = match section {
                ReportSection::ExecutiveSummary => executive_summary(records),
                ReportSection::SensorData => sensor_data(records),
                ReportSection::AlertHistory => alert_history(records),
                ReportSection::TrendAnalysis => trend_analysis(records),
                ReportSection::Recommendations => [
                    "1. Consider additional ventilation during peak occupancy hours (10:00-16:00)",
                    "2. Schedule maintenance for HVAC systems before summer season",
                    "3. Implement automated alerts for rapid response to critical conditions",
                    "4. Review energy consumption patterns for further optimization",
                    "5. Consider upgrading air filtration in high PM2.5 areas",
                ]
                .join("\n"),
                ReportSection::ActionItems => [
                    "- Review alert response times and implement improvements",
                    "- Update maintenance schedules based on system performance data",
                    "- Train staff on new monitoring protocols and emergency procedures",
                    "- Validate sensor calibration quarterly",
                    "- Implement energy-saving measures identified in analysis",
                ]
                .join("\n"),
                ReportSection::CostAnalysis => [
                    "- Estimated energy savings potential: $1,200/month",
                    "- Maintenance cost avoidance: $5,000/year",
                    "- Recommended investment: $15,000 for system upgrades",
                ]
                .join("\n"),
                ReportSection::EnergyConsumption => energy_consumption(records),
                ReportSection::SystemPerformance => format!(
                    "- Days with data: {}\n- Monitoring: ACTIVE\n- Sensors: ONLINE",
                    records.len()
                ),
                ReportSection::MaintenanceLog => [
                    "- Sensor calibration check: scheduled quarterly",
                    "- HVAC filter replacement: scheduled monthly",
                    "- Alert mail relay test: run from the Reports page",
                ]
                .join("\n"),
            };
            (section.label().to_string(), body)
        })
        .collect()
}

fn executive_summary(records: &[DailyRecord]) -> String {
    // ---
    let peak_co2 = describe(records, Metric::Co2).map_or(0.0, |s| s.max);
    format!(
        "- Monitoring period: {} days\n\
         - Critical temperature days: {}\n\
         - Average temperature: {:.1} °C\n\
         - Average humidity: {:.1} %\n\
         - Peak CO₂ level: {:.0} ppm\n\
         - Average energy consumption: {:.0} kWh",
        records.len(),
        critical_days(records, Parameter::Temperature),
        mean(records, Metric::Temperature),
        mean(records, Metric::Humidity),
        peak_co2,
        mean(records, Metric::Energy),
    )
}

fn sensor_data(records: &[DailyRecord]) -> String {
    // ---
    let metrics = [
        (Metric::Temperature, "Temperature", "°C"),
        (Metric::Humidity, "Humidity", "%"),
        (Metric::Pressure, "Pressure", "hPa"),
        (Metric::Co2, "CO₂", "ppm"),
        (Metric::Pm25, "PM2.5", "µg/m³"),
    ];
    metrics
        .iter()
        .map(|(m, label, unit)| match describe(records, *m) {
            Some(s) => format!("- {} range: {:.1} {} to {:.1} {}", label, s.min, unit, s.max, unit),
            None => format!("- {} range: no data", label),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn alert_history(records: &[DailyRecord]) -> String {
    // ---
    alert_stats(records)
        .iter()
        .map(|s| format!("- {} alerts ({}): {} occurrences", s.label, s.threshold, s.count))
        .collect::<Vec<_>>()
        .join("\n")
}

fn trend_analysis(records: &[DailyRecord]) -> String {
    // ---
    if records.len() < 2 {
        return "- Not enough data for trend analysis".to_string();
    }
    let (first, second) = records.split_at(records.len() / 2);
    [Metric::Temperature, Metric::Humidity, Metric::Co2, Metric::Pm25, Metric::Energy]
        .iter()
        .map(|m| {
            let delta = mean(second, *m) - mean(first, *m);
            let direction = if delta > 0.0 {
                "rising"
            } else if delta < 0.0 {
                "falling"
            } else {
                "flat"
            };
            format!("- {}: {} ({:+.1})", m.label(), direction, delta)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn energy_consumption(records: &[DailyRecord]) -> String {
    // ---
    match describe(records, Metric::Energy) {
        Some(s) => format!(
            "- Total: {:.0} kWh\n- Daily average: {:.1} kWh\n- Peak day: {:.1} kWh",
            s.mean * s.count as f64,
            s.mean,
            s.max
        ),
        None => "- No energy data in range".to_string(),
    }
}

fn metadata_lines(
    req: &ReportRequest,
    id: &str,
    location: &str,
    now: DateTime<Local>,
) -> Vec<String> {
    // ---
    let sections: Vec<&str> = req.sections.iter().map(|s| s.label()).collect();
    vec![
        format!("Generated: {}", format_local(&now)),
        format!("Report Date: {}", req.report_date),
        format!("Time Period: {}", req.time_period.label()),
        format!("Location: {}", location),
        format!("Report ID: {}", id),
        format!("Included Sections: {}", sections.join(", ")),
    ]
}

fn render_pdf(
    req: &ReportRequest,
    sections: &[(String, String)],
    id: &str,
    location: &str,
    now: DateTime<Local>,
) -> Result<Vec<u8>, ReportError> {
    // ---
    let mut doc = PdfDocument::new();
    doc.title(format!("{} Report", req.report_type.label()));
    doc.paragraph(metadata_lines(req, id, location, now).join("\n"));
    doc.spacer(20.0);

    for (title, body) in sections {
        doc.heading(title.as_str());
        doc.paragraph(body.as_str());
        doc.spacer(10.0);
    }

    doc.footer(format!(
        "Report ID: {} | Report generated by Critical Space Monitoring System",
        id
    ));
    doc.render()
}

fn plain_text(
    req: &ReportRequest,
    sections: &[(String, String)],
    id: &str,
    location: &str,
    now: DateTime<Local>,
) -> String {
    // ---
    let mut text = format!("{} Report\n\n", req.report_type.label());
    text.push_str(&metadata_lines(req, id, location, now).join("\n"));
    for (title, body) in sections {
        text.push_str(&format!("\n\n{}\n{}", title, body));
    }
    text
}

fn render_excel(
    req: &ReportRequest,
    records: &[DailyRecord],
    location: &str,
    now: DateTime<Local>,
) -> Result<Vec<u8>, ReportError> {
    // ---
    let mut wb = Workbook::new();
    summary_sheet(
        &mut wb,
        req.report_type.label(),
        req.report_date,
        req.time_period.label(),
        location,
        now,
    );
    raw_data_sheet(&mut wb, records);
    statistics_sheet(&mut wb, records);
    alert_summary_sheet(&mut wb, records);
    recommendations_sheet(&mut wb);
    wb.to_xlsx()
}

fn summary_sheet(
    wb: &mut Workbook,
    report_type: &str,
    report_date: NaiveDate,
    period: &str,
    location: &str,
    now: DateTime<Local>,
) {
    // ---
    let summary = wb.add_sheet("Summary");
    summary.push_row(["Report Type", "Report Date", "Time Period", "Generated On", "Location"]);
    summary.push_row([
        report_type.to_string(),
        report_date.to_string(),
        period.to_string(),
        format_local(&now),
        location.to_string(),
    ]);
}

fn raw_data_sheet(wb: &mut Workbook, records: &[DailyRecord]) {
    // ---
    let raw = wb.add_sheet("Raw Data");
    let mut header: Vec<Cell> = vec!["Date".into()];
    header.extend(Metric::ALL.iter().map(|m| Cell::from(m.label())));
    raw.push_row(header);
    for r in records {
        let mut row: Vec<Cell> = vec![r.date.to_string().into()];
        row.extend(Metric::ALL.iter().map(|m| Cell::Number(m.of(r))));
        raw.push_row(row);
    }
}

fn statistics_sheet(wb: &mut Workbook, records: &[DailyRecord]) {
    // ---
    let stats: Vec<_> = Metric::ALL
        .iter()
        .filter_map(|m| describe(records, *m))
        .collect();
    let sheet = wb.add_sheet("Statistics");
    let mut header: Vec<Cell> = vec!["".into()];
    header.extend(stats.iter().map(|s| Cell::from(s.metric.label())));
    sheet.push_row(header);
    let rows: [(&str, fn(&ColumnStats) -> f64); 8] = [
        ("count", |s| s.count as f64),
        ("mean", |s| s.mean),
        ("std", |s| s.std),
        ("min", |s| s.min),
        ("25%", |s| s.q25),
        ("50%", |s| s.median),
        ("75%", |s| s.q75),
        ("max", |s| s.max),
    ];
    for (name, get) in rows {
        let mut row: Vec<Cell> = vec![name.into()];
        row.extend(stats.iter().map(|s| Cell::Number(round2(get(s)))));
        sheet.push_row(row);
    }
}

fn alert_summary_sheet(wb: &mut Workbook, records: &[DailyRecord]) {
    // ---
    let alerts = wb.add_sheet("Alert Summary");
    alerts.push_row(["Parameter", "Threshold", "Alerts Count", "Worst Value", "Average"]);
    let optional = |v: Option<f64>| v.map_or_else(|| Cell::from(""), |v| Cell::Number(round2(v)));
    for stat in alert_stats(records) {
        alerts.push_row(vec![
            Cell::from(stat.label),
            Cell::from(stat.threshold),
            Cell::from(stat.count),
            optional(stat.worst),
            optional(stat.average),
        ]);
    }
}

fn recommendations_sheet(wb: &mut Workbook) {
    // ---
    let recs = wb.add_sheet("Recommendations");
    recs.push_row(["Priority", "Recommendation", "Estimated Cost", "Timeline"]);
    for row in [
        ["High", "Install additional ventilation for high CO2 areas", "$5,000", "2 weeks"],
        ["High", "Schedule HVAC maintenance for temperature control", "$3,000", "1 month"],
        ["Medium", "Implement real-time alert notifications", "$1,500", "3 weeks"],
        ["Medium", "Add air purification in PM2.5 hotspots", "$8,000", "2 months"],
        ["Low", "Review energy consumption patterns", "$500", "2 weeks"],
    ] {
        recs.push_row(row);
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// One entry of the report history. The request and generation time are
/// kept so the same report can be rebuilt for a resend.
#[derive(Debug, Clone)]
pub struct LoggedReport {
    pub metadata: ReportMetadata,
    pub request: ReportRequest,
    pub generated: DateTime<Local>,
}

impl LoggedReport {
    /// Rebuild the logged report from the same daily history.
    pub fn regenerate(&self, history: &[DailyRecord], location: &str) -> Result<GeneratedReport, ReportError> {
        generate(&self.request, history, location, self.generated)
    }
}

/// Per-session report history, newest last, bounded to
/// [`REPORT_HISTORY_LEN`].
#[derive(Debug, Clone, Default)]
pub struct ReportLog {
    entries: VecDeque<LoggedReport>,
}

impl ReportLog {
    // ---
    pub fn push(&mut self, entry: LoggedReport) {
        while self.entries.len() >= REPORT_HISTORY_LEN {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest entry with `id`.
    pub fn get(&self, id: &str) -> Option<&LoggedReport> {
        self.entries.iter().rev().find(|e| e.metadata.id == id)
    }

    pub fn mark_emailed(&mut self, id: &str) -> bool {
        // ---
        match self.entries.iter_mut().rev().find(|e| e.metadata.id == id) {
            Some(entry) => {
                entry.metadata.email_sent = true;
                true
            }
            None => false,
        }
    }

    /// Keep the newest `keep` entries; returns how many were dropped.
    pub fn retain_latest(&mut self, keep: usize) -> usize {
        // ---
        let excess = self.entries.len().saturating_sub(keep);
        self.entries.drain(..excess);
        excess
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn metadata(&self) -> impl Iterator<Item = &ReportMetadata> + '_ {
        self.entries.iter().map(|e| &e.metadata)
    }

    /// Newest first.
    pub fn newest_first(&self) -> Vec<ReportMetadata> {
        self.entries.iter().rev().map(|e| e.metadata.clone()).collect()
    }
}
