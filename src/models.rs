//! Data models for the monitoring pipeline.
//!
//! Every monitored quantity is described once, in [`DESCRIPTORS`]. The
//! threshold evaluator, the alert mailer and the dashboard view all walk this
//! table instead of branching per sensor.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ---

/// Identifier of a monitored quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Temperature = 0,
    Humidity = 1,
    Pressure = 2,
    Co2 = 3,
    Pm25 = 4,
    Noise = 5,
}

impl Parameter {
    /// Number of parameters; sizes every per-parameter array.
    pub const COUNT: usize = 6;

    /// All parameters in table order.
    pub const ALL: [Parameter; Parameter::COUNT] = [
        Parameter::Temperature,
        Parameter::Humidity,
        Parameter::Pressure,
        Parameter::Co2,
        Parameter::Pm25,
        Parameter::Noise,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn descriptor(self) -> &'static ParameterDescriptor {
        &DESCRIPTORS[self.index()]
    }

    /// Stable lowercase key used in JSON, CSV headers and logs.
    pub fn key(self) -> &'static str {
        self.descriptor().key
    }
}

/// Which side of the band is dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Readings above the band are dangerous.
    High,
    /// Readings below the band are dangerous.
    Low,
    /// Displayed only; never alerts.
    Informational,
}

/// Static description of one parameter.
#[derive(Debug)]
pub struct ParameterDescriptor {
    // ---
    pub parameter: Parameter,
    pub key: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub direction: Direction,

    /// Boundary between NORMAL and WARN.
    pub warn: f64,

    /// Boundary between WARN and CRITICAL.
    pub critical: f64,

    /// Status labels for NORMAL, WARN and CRITICAL, in that order.
    pub status_labels: [&'static str; 3],

    /// Closing line of the alert mail.
    pub advice: &'static str,
}

impl ParameterDescriptor {
    /// Human readable critical condition, e.g. `> 34 °C`.
    pub fn threshold_text(&self) -> String {
        // ---
        match self.direction {
            Direction::High => format!("> {} {}", self.critical, self.unit),
            Direction::Low => format!("< {} {}", self.critical, self.unit),
            Direction::Informational => "n/a".to_string(),
        }
    }
}

pub static DESCRIPTORS: [ParameterDescriptor; Parameter::COUNT] = [
    ParameterDescriptor {
        parameter: Parameter::Temperature,
        key: "temperature",
        label: "Temperature",
        unit: "°C",
        direction: Direction::High,
        warn: 26.0,
        critical: 34.0,
        status_labels: ["Normal", "Warm", "High"],
        advice: "Please take immediate action.",
    },
    ParameterDescriptor {
        parameter: Parameter::Humidity,
        key: "humidity",
        label: "Humidity",
        unit: "%",
        direction: Direction::High,
        warn: 60.0,
        critical: 70.0,
        status_labels: ["Normal", "High", "Very High"],
        advice: "Risk of mold growth and equipment damage.",
    },
    ParameterDescriptor {
        parameter: Parameter::Pressure,
        key: "pressure",
        label: "Pressure",
        unit: "hPa",
        direction: Direction::Low,
        warn: 1000.0,
        critical: 990.0,
        status_labels: ["Normal", "Moderate", "Low"],
        advice: "May indicate weather changes or system issues.",
    },
    ParameterDescriptor {
        parameter: Parameter::Co2,
        key: "co2",
        label: "CO₂ Level",
        unit: "ppm",
        direction: Direction::High,
        warn: 800.0,
        critical: 1200.0,
        status_labels: ["Normal", "Moderate", "High"],
        advice: "Ventilation required for occupant safety.",
    },
    ParameterDescriptor {
        parameter: Parameter::Pm25,
        key: "pm25",
        label: "Air Quality (PM2.5)",
        unit: "µg/m³",
        direction: Direction::High,
        warn: 35.0,
        critical: 55.0,
        status_labels: ["Clean", "Moderate", "High"],
        advice: "Air purification or ventilation required.",
    },
    ParameterDescriptor {
        parameter: Parameter::Noise,
        key: "noise",
        label: "Noise Level",
        unit: "dB",
        direction: Direction::Informational,
        warn: f64::INFINITY,
        critical: f64::INFINITY,
        status_labels: ["Safe", "Safe", "Safe"],
        advice: "",
    },
];

/// One timestamped reading of every parameter.
///
/// Readings live in a fixed array indexed by [`Parameter::index`], so a
/// sample is always complete.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    // ---
    timestamp: DateTime<Local>,
    readings: [f64; Parameter::COUNT],
}

impl Sample {
    // ---
    pub fn new(timestamp: DateTime<Local>, readings: [f64; Parameter::COUNT]) -> Self {
        Self {
            timestamp,
            readings,
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn value(&self, parameter: Parameter) -> f64 {
        self.readings[parameter.index()]
    }

    /// Iterate `(parameter, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Parameter, f64)> + '_ {
        Parameter::ALL.iter().map(move |p| (*p, self.value(*p)))
    }
}

/// Serialized form of a [`Sample`] for the dashboard trend chart.
#[derive(Debug, Clone, Serialize)]
pub struct SamplePoint {
    // ---
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub co2: f64,
    pub pm25: f64,
    pub noise: f64,
}

impl From<&Sample> for SamplePoint {
    fn from(sample: &Sample) -> Self {
        // ---
        Self {
            timestamp: sample.timestamp().format("%H:%M:%S").to_string(),
            temperature: sample.value(Parameter::Temperature),
            humidity: sample.value(Parameter::Humidity),
            pressure: sample.value(Parameter::Pressure),
            co2: sample.value(Parameter::Co2),
            pm25: sample.value(Parameter::Pm25),
            noise: sample.value(Parameter::Noise),
        }
    }
}

/// Local timestamp format used in mails, exports and reports.
pub fn format_local(ts: &DateTime<Local>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_descriptor_table_is_indexed_by_parameter() {
        // ---
        for p in Parameter::ALL {
            assert_eq!(p.descriptor().parameter, p);
        }
        assert_eq!(Parameter::Pm25.key(), "pm25");
    }

    #[test]
    fn test_threshold_text() {
        // ---
        assert_eq!(Parameter::Temperature.descriptor().threshold_text(), "> 34 °C");
        assert_eq!(Parameter::Pressure.descriptor().threshold_text(), "< 990 hPa");
        assert_eq!(Parameter::Noise.descriptor().threshold_text(), "n/a");
    }

    #[test]
    fn test_sample_point_conversion() {
        // ---
        let ts = Local.with_ymd_and_hms(2025, 3, 26, 18, 45, 7).unwrap();
        let sample = Sample::new(ts, [30.0, 50.0, 1005.0, 600.0, 20.0, 40.0]);
        let point = SamplePoint::from(&sample);

        assert_eq!(point.timestamp, "18:45:07");
        assert_eq!(point.pressure, 1005.0);
        assert_eq!(format_local(&ts), "2025-03-26 18:45:07");
    }

    #[test]
    fn test_parameter_serializes_lowercase() {
        // ---
        let json = serde_json::to_string(&Parameter::Co2).unwrap();
        assert_eq!(json, "\"co2\"");
    }
}
