//! Threshold evaluator: maps a reading to a severity and a status label.
//!
//! Evaluation is pure and total. Boundary values belong to the less severe
//! band, and anything that is not provably WARN or CRITICAL (including NaN)
//! is NORMAL.

use serde::Serialize;

use crate::models::{Direction, Parameter, Sample};

// ---

/// Severity class of one reading, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Normal,
    Warn,
    Critical,
}

/// Severity plus the label shown next to the reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterStatus {
    pub severity: Severity,
    pub label: &'static str,
}

/// Classify a single reading against the parameter's descriptor.
pub fn classify(parameter: Parameter, value: f64) -> ParameterStatus {
    // ---
    let d = parameter.descriptor();

    let severity = match d.direction {
        Direction::High if value > d.critical => Severity::Critical,
        Direction::High if value > d.warn => Severity::Warn,
        Direction::Low if value < d.critical => Severity::Critical,
        Direction::Low if value < d.warn => Severity::Warn,
        _ => Severity::Normal,
    };

    let label = match severity {
        Severity::Normal => d.status_labels[0],
        Severity::Warn => d.status_labels[1],
        Severity::Critical => d.status_labels[2],
    };

    ParameterStatus { severity, label }
}

/// Classify every parameter of a sample, indexed by [`Parameter::index`].
pub fn classify_sample(sample: &Sample) -> [ParameterStatus; Parameter::COUNT] {
    Parameter::ALL.map(|p| classify(p, sample.value(p)))
}

/// Coarse air quality summary from a PM2.5 reading.
pub fn air_quality(pm25: f64) -> &'static str {
    // ---
    if pm25 < 35.0 {
        "Good"
    } else if pm25 < 55.0 {
        "Moderate"
    } else {
        "Poor"
    }
}
