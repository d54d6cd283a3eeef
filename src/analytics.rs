//! Analytics over the per-session daily history.
//!
//! Each session is seeded with 30 days of simulated daily averages. The
//! analytics page filters them by date range and derives line series,
//! distributions, descriptive statistics, per-parameter alert counts and a
//! correlation matrix.

use chrono::{Duration, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::alerts::{classify, Severity};
use crate::models::{Direction, Parameter};
use crate::source::round1;

// ---

/// Days of history seeded per session.
pub const HISTORY_DAYS: i64 = 30;

/// Histogram bins for distribution plots.
pub const DISTRIBUTION_BINS: usize = 10;

/// One day of aggregated readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    // ---
    pub date: NaiveDate,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub pm25: f64,
    pub co2: f64,
    pub noise: f64,
    pub energy: f64,
}

impl DailyRecord {
    /// Daily average of a sensor parameter.
    pub fn value(&self, p: Parameter) -> f64 {
        match p {
            Parameter::Temperature => self.temperature,
            Parameter::Humidity => self.humidity,
            Parameter::Pressure => self.pressure,
            Parameter::Co2 => self.co2,
            Parameter::Pm25 => self.pm25,
            Parameter::Noise => self.noise,
        }
    }
}

/// Column of the daily history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    Pm25,
    Co2,
    Noise,
    Energy,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::Pm25,
        Metric::Co2,
        Metric::Noise,
        Metric::Energy,
    ];

    /// Columns of the correlation matrix.
    pub const CORRELATED: [Metric; 5] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Co2,
        Metric::Pm25,
        Metric::Energy,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Humidity => "Humidity",
            Metric::Pressure => "Pressure",
            Metric::Pm25 => "PM2.5",
            Metric::Co2 => "CO2",
            Metric::Noise => "Noise",
            Metric::Energy => "Energy_Consumption",
        }
    }

    pub fn of(self, r: &DailyRecord) -> f64 {
        match self {
            Metric::Temperature => r.temperature,
            Metric::Humidity => r.humidity,
            Metric::Pressure => r.pressure,
            Metric::Pm25 => r.pm25,
            Metric::Co2 => r.co2,
            Metric::Noise => r.noise,
            Metric::Energy => r.energy,
        }
    }
}

/// Generate `days` days of history ending on `end` (inclusive), oldest first.
pub fn seed_history<R: Rng>(rng: &mut R, end: NaiveDate, days: i64) -> Vec<DailyRecord> {
    // ---
    (0..days)
        .rev()
        .map(|back| DailyRecord {
            date: end - Duration::days(back),
            temperature: round1(rng.gen_range(22.0..36.0)),
            humidity: round1(rng.gen_range(40.0..75.0)),
            pressure: round1(rng.gen_range(980.0..1025.0)),
            pm25: round1(rng.gen_range(10.0..80.0)),
            co2: round1(rng.gen_range(400.0..1500.0)),
            noise: round1(rng.gen_range(25.0..85.0)),
            energy: round1(rng.gen_range(50.0..200.0)),
        })
        .collect()
}

/// Records with `start <= date <= end`; open bounds are unbounded.
pub fn filter_range(
    records: &[DailyRecord],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<DailyRecord> {
    // ---
    records
        .iter()
        .filter(|r| start.map_or(true, |s| r.date >= s))
        .filter(|r| end.map_or(true, |e| r.date <= e))
        .cloned()
        .collect()
}

/// Descriptive statistics of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    // ---
    pub metric: Metric,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 with fewer than two values.
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

pub fn describe(records: &[DailyRecord], metric: Metric) -> Option<ColumnStats> {
    // ---
    if records.is_empty() {
        return None;
    }

    let mut values: Vec<f64> = records.iter().map(|r| metric.of(r)).collect();
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };

    Some(ColumnStats {
        metric,
        count: n,
        mean,
        std,
        min: values[0],
        q25: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q75: quantile(&values, 0.75),
        max: values[n - 1],
    })
}

/// Linear-interpolated quantile of sorted, non-empty `values`.
fn quantile(values: &[f64], q: f64) -> f64 {
    // ---
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

/// Pearson correlation of two columns; `None` when undefined.
pub fn pearson(records: &[DailyRecord], a: Metric, b: Metric) -> Option<f64> {
    // ---
    let n = records.len();
    if n < 2 {
        return None;
    }

    let mean_a = records.iter().map(|r| a.of(r)).sum::<f64>() / n as f64;
    let mean_b = records.iter().map(|r| b.of(r)).sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for r in records {
        let da = a.of(r) - mean_a;
        let db = b.of(r) - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        None
    } else {
        Some((cov / denom).clamp(-1.0, 1.0))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub metrics: Vec<Metric>,
    pub values: Vec<Vec<Option<f64>>>,
}

pub fn correlation_matrix(records: &[DailyRecord]) -> CorrelationMatrix {
    // ---
    let metrics = Metric::CORRELATED.to_vec();
    let values = metrics
        .iter()
        .map(|a| metrics.iter().map(|b| pearson(records, *a, *b)).collect())
        .collect();
    CorrelationMatrix { metrics, values }
}

/// Equal-width histogram of one column.
#[derive(Debug, Clone, Serialize)]
pub struct Distribution {
    pub metric: Metric,
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

pub fn distribution(records: &[DailyRecord], metric: Metric, bins: usize) -> Distribution {
    // ---
    let values: Vec<f64> = records.iter().map(|r| metric.of(r)).collect();
    if values.is_empty() || bins == 0 {
        return Distribution {
            metric,
            edges: Vec::new(),
            counts: Vec::new(),
        };
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if max > min { (max - min) / bins as f64 } else { 1.0 };

    let mut counts = vec![0usize; bins];
    for v in &values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let edges = (0..=bins).map(|i| min + width * i as f64).collect();
    Distribution {
        metric,
        edges,
        counts,
    }
}

/// Alert counts of one parameter over a range of days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertStat {
    // ---
    pub parameter: Parameter,
    pub label: &'static str,
    pub threshold: String,

    /// Days whose average classified as CRITICAL.
    pub count: usize,

    /// Highest daily average, or the lowest for parameters that alert on the
    /// low side. `None` for an empty range.
    pub worst: Option<f64>,

    pub average: Option<f64>,
}

/// One row per alerting parameter; informational ones are left out.
pub fn alert_stats(records: &[DailyRecord]) -> Vec<AlertStat> {
    // ---
    Parameter::ALL
        .iter()
        .map(|p| p.descriptor())
        .filter(|d| d.direction != Direction::Informational)
        .map(|d| {
            let p = d.parameter;
            let values = records.iter().map(|r| r.value(p));
            let worst = match d.direction {
                Direction::Low => values.reduce(f64::min),
                _ => values.reduce(f64::max),
            };
            let average = (!records.is_empty())
                .then(|| records.iter().map(|r| r.value(p)).sum::<f64>() / records.len() as f64);

            AlertStat {
                parameter: p,
                label: d.label,
                threshold: d.threshold_text(),
                count: records
                    .iter()
                    .filter(|r| classify(p, r.value(p)).severity == Severity::Critical)
                    .count(),
                worst,
                average,
            }
        })
        .collect()
}

/// Date/value pairs for a line chart.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub metric: Metric,
    pub points: Vec<(NaiveDate, f64)>,
}

/// Everything the analytics page renders for one date range.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsView {
    // ---
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub records: Vec<DailyRecord>,
    pub series: Vec<Series>,
    pub distributions: Vec<Distribution>,
    pub statistics: Vec<ColumnStats>,
    pub alerts: Vec<AlertStat>,
    pub correlation: CorrelationMatrix,
}

pub fn analyze(
    history: &[DailyRecord],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> AnalyticsView {
    // ---
    let records = filter_range(history, start, end);

    let series = Metric::ALL
        .iter()
        .map(|m| Series {
            metric: *m,
            points: records.iter().map(|r| (r.date, m.of(r))).collect(),
        })
        .collect();

    let distributions = Metric::ALL
        .iter()
        .map(|m| distribution(&records, *m, DISTRIBUTION_BINS))
        .collect();

    let statistics = Metric::ALL
        .iter()
        .filter_map(|m| describe(&records, *m))
        .collect();

    let alerts = alert_stats(&records);
    let correlation = correlation_matrix(&records);

    AnalyticsView {
        start,
        end,
        records,
        series,
        distributions,
        statistics,
        alerts,
        correlation,
    }
}
