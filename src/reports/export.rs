//! Exports of the analytics range and of the report history.

use chrono::{DateTime, Local, NaiveDate};

use crate::analytics::{DailyRecord, Metric};
use crate::error::ReportError;
use crate::mail::{MailAttachment, OutgoingMail};
use crate::models::format_local;

use super::{
    alert_summary_sheet, raw_data_sheet, statistics_sheet, summary_sheet, ReportMetadata, Workbook,
    XLSX_CONTENT_TYPE,
};

// ---

/// Date range of an analytics export, resolved against the filtered records
/// so open bounds still name real days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl AnalyticsRange {
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        records: &[DailyRecord],
    ) -> Self {
        Self {
            start: start.or_else(|| records.first().map(|r| r.date)),
            end: end.or_else(|| records.last().map(|r| r.date)),
        }
    }

    fn bound(day: Option<NaiveDate>) -> String {
        day.map_or_else(|| "all".to_string(), |d| d.to_string())
    }

    /// `2025-06-01 to 2025-06-30`
    pub fn label(&self) -> String {
        format!("{} to {}", Self::bound(self.start), Self::bound(self.end))
    }

    pub fn csv_filename(&self) -> String {
        format!("Analytics_Data_{}_{}.csv", Self::bound(self.start), Self::bound(self.end))
    }

    pub fn xlsx_filename(&self) -> String {
        format!("Analytics_Report_{}_{}.xlsx", Self::bound(self.start), Self::bound(self.end))
    }
}

/// Daily records as CSV, one column per metric.
pub fn records_csv(records: &[DailyRecord]) -> String {
    // ---
    let header: Vec<&str> = std::iter::once("Date")
        .chain(Metric::ALL.iter().map(|m| m.label()))
        .collect();

    let mut csv = header.join(",");
    csv.push('\n');
    for r in records {
        let row: Vec<String> = std::iter::once(r.date.to_string())
            .chain(Metric::ALL.iter().map(|m| m.of(r).to_string()))
            .collect();
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

/// Workbook with the Summary, Raw Data, Statistics and Alert Summary sheets
/// for an analytics range.
pub fn analytics_workbook(
    records: &[DailyRecord],
    range: AnalyticsRange,
    location: &str,
    now: DateTime<Local>,
) -> Result<Vec<u8>, ReportError> {
    // ---
    let mut wb = Workbook::new();
    summary_sheet(
        &mut wb,
        "Analytics Export",
        now.date_naive(),
        &range.label(),
        location,
        now,
    );
    raw_data_sheet(&mut wb, records);
    statistics_sheet(&mut wb, records);
    alert_summary_sheet(&mut wb, records);
    wb.to_xlsx()
}

/// The analytics workbook as a mail to the default recipient.
pub fn analytics_mail(
    records: &[DailyRecord],
    range: AnalyticsRange,
    location: &str,
    now: DateTime<Local>,
) -> Result<OutgoingMail, ReportError> {
    // ---
    let bytes = analytics_workbook(records, range, location, now)?;
    let mut mail = OutgoingMail::new(
        format!("Analytics Export Report - {}", now.format("%Y-%m-%d")),
        format!(
            "Please find attached the analytics export.\n\n\
             Time Period: {}\n\
             Days: {}\n\
             Location: {}\n\
             Generated: {}\n",
            range.label(),
            records.len(),
            location,
            format_local(&now)
        ),
    );
    mail.attachment = Some(MailAttachment {
        filename: range.xlsx_filename(),
        content_type: XLSX_CONTENT_TYPE,
        bytes,
    });
    Ok(mail)
}

/// Report history as CSV, oldest first.
pub fn metadata_csv<'a>(entries: impl IntoIterator<Item = &'a ReportMetadata>) -> String {
    // ---
    let mut csv = String::from(
        "id,generated_at,report_type,report_date,time_period,sections,format,size_bytes,email_sent,status\n",
    );
    for m in entries {
        let sections: Vec<&str> = m.sections.iter().map(|s| s.label()).collect();
        let format = match m.format {
            super::ReportFormat::Pdf => "pdf",
            super::ReportFormat::Excel => "excel",
        };
        let row = [
            m.id.clone(),
            m.generated_at.clone(),
            m.report_type.label().to_string(),
            m.report_date.to_string(),
            m.time_period.label().to_string(),
            sections.join("; "),
            format.to_string(),
            m.size_bytes.to_string(),
            m.email_sent.to_string(),
            m.status.clone(),
        ];
        let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        csv.push_str(&fields.join(","));
        csv.push('\n');
    }
    csv
}

/// Quote a field that contains a separator, a quote or a line break.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
