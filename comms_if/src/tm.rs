//! # Telemetry module
//!
//! Classification of the messages published by the rover. The science module doesn't tag its
//! messages, so the kind of a message is recovered from the shape of its payload.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{codec::Envelope, tc::SCIENCE_EVENT};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Keys which identify a drill/elevator feedback message.
pub const TELEMETRY_KEYS: [&str; 4] = ["FbDrillA", "FbDrillB", "FbElevatorA", "FbElevatorB"];

/// Keys which identify a science sample.
pub const SAMPLE_KEYS: [&str; 3] = ["number", "lights", "gasses"];

/// Maximum number of characters of an undecodable message kept in its summary.
pub const RAW_SUMMARY_LEN: usize = 200;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Drill and elevator feedback from the science module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    #[serde(rename = "FbDrillA")]
    pub fb_drill_a: f64,

    #[serde(rename = "FbDrillB")]
    pub fb_drill_b: f64,

    #[serde(rename = "FbElevatorA")]
    pub fb_elevator_a: f64,

    #[serde(rename = "FbElevatorB")]
    pub fb_elevator_b: f64,
}

/// A single analysed soil sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Sample number.
    pub number: i64,

    /// Sample mass.
    ///
    /// Units: grams
    #[serde(default)]
    pub mass: Option<f64>,

    /// Sample temperature.
    ///
    /// Units: degrees Celsius
    #[serde(default)]
    pub temp: Option<f64>,

    /// Gas sensor readings.
    pub gasses: Vec<Value>,

    /// Light sensor readings.
    pub lights: Vec<Value>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Category of an inbound message, based on its shape.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Drill/elevator feedback, only the latest value is of interest.
    Telemetry,

    /// A science sample, every one of them is of interest.
    Sample,

    /// A science event which is neither telemetry nor a sample.
    UnknownScience,

    /// Anything else, including messages which couldn't be decoded.
    Other,
}

/// A short digest of a message, used for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Summary {
    Telemetry {
        #[serde(rename = "FbDrillA")]
        fb_drill_a: Value,
        #[serde(rename = "FbDrillB")]
        fb_drill_b: Value,
        #[serde(rename = "FbElevatorA")]
        fb_elevator_a: Value,
        #[serde(rename = "FbElevatorB")]
        fb_elevator_b: Value,
    },
    Sample {
        number: Value,
        mass: Value,
        temp: Value,
        gasses_len: Option<usize>,
        lights_len: Option<usize>,
    },
    UnknownScience {
        keys: Vec<String>,
    },
    Other {
        event_type: String,
        keys: Vec<String>,
    },
    InvalidJson {
        raw: String,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Classification {
    /// All classifications.
    pub const ALL: [Classification; 4] = [
        Classification::Telemetry,
        Classification::Sample,
        Classification::UnknownScience,
        Classification::Other,
    ];
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Classification::Telemetry => "telemetry",
            Classification::Sample => "sample",
            Classification::UnknownScience => "unknown_science",
            Classification::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl TelemetryReading {
    /// Extract a reading from an envelope, `None` if the values are missing or not numbers.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        serde_json::from_value(Value::Object(envelope.payload.clone())).ok()
    }
}

impl TelemetrySample {
    /// Extract a sample from an envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(envelope.payload.clone()))
    }
}

impl Summary {
    /// Summarise a decoded envelope.
    pub fn of(envelope: &Envelope) -> Self {
        let get = |k: &str| envelope.payload.get(k).cloned().unwrap_or(Value::Null);
        let len = |k: &str| envelope.payload.get(k).and_then(Value::as_array).map(Vec::len);

        match classify(envelope) {
            Classification::Telemetry => Summary::Telemetry {
                fb_drill_a: get("FbDrillA"),
                fb_drill_b: get("FbDrillB"),
                fb_elevator_a: get("FbElevatorA"),
                fb_elevator_b: get("FbElevatorB"),
            },
            Classification::Sample => Summary::Sample {
                number: get("number"),
                mass: get("mass"),
                temp: get("temp"),
                gasses_len: len("gasses"),
                lights_len: len("lights"),
            },
            Classification::UnknownScience => Summary::UnknownScience {
                keys: envelope.payload_keys(),
            },
            Classification::Other => Summary::Other {
                event_type: envelope.event_type.clone(),
                keys: envelope.payload_keys(),
            },
        }
    }

    /// Summarise a message which could not be decoded.
    pub fn invalid(raw: &str) -> Self {
        Summary::InvalidJson {
            raw: raw.chars().take(RAW_SUMMARY_LEN).collect(),
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Summary::Telemetry {
                fb_drill_a,
                fb_drill_b,
                fb_elevator_a,
                fb_elevator_b,
            } => write!(
                f,
                "telemetry: FbDrillA={} FbDrillB={} FbElevatorA={} FbElevatorB={}",
                fb_drill_a, fb_drill_b, fb_elevator_a, fb_elevator_b
            ),
            Summary::Sample {
                number,
                mass,
                temp,
                gasses_len,
                lights_len,
            } => write!(
                f,
                "sample #{}: mass={} g, temp={} C, {:?} gasses, {:?} lights",
                number, mass, temp, gasses_len, lights_len
            ),
            Summary::UnknownScience { keys } => write!(f, "unknown science payload: {:?}", keys),
            Summary::Other { event_type, keys } => {
                write!(f, "other ({}) payload: {:?}", event_type, keys)
            }
            Summary::InvalidJson { raw } => write!(f, "invalid JSON: {}", raw),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Classify an envelope by its event type and payload keys.
///
/// This never fails, unrecognised shapes become `UnknownScience` or `Other`.
pub fn classify(envelope: &Envelope) -> Classification {
    if envelope.event_type != SCIENCE_EVENT {
        return Classification::Other;
    }

    if envelope.has_keys(&TELEMETRY_KEYS) {
        Classification::Telemetry
    } else if envelope.has_keys(&SAMPLE_KEYS) {
        Classification::Sample
    } else {
        Classification::UnknownScience
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
