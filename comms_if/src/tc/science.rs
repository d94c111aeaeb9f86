//! # Science module telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SCIENCE_EVENT;
use crate::codec::{Envelope, Payload};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Upper end of the carousel rotation range.
pub const ROTATE_MAX: i32 = 16000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A command to the science module.
///
/// Field ranges are owned by the caller, this type does not clamp:
/// - `drill`, `elev`: `[-255, 255]`
/// - `conv`: `-1`, `0` or `1`
/// - `res_seq`, `reset`: `0` or `1`
/// - `rotate`: `[0, ROTATE_MAX]`
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScienceCommand {
    /// Drill motor demand.
    pub drill: i32,

    /// Elevator motor demand.
    pub elev: i32,

    /// Conveyor direction.
    pub conv: i32,

    /// Start the research sequence.
    pub res_seq: i32,

    /// Carousel rotation target.
    pub rotate: i32,

    /// Reset the science module.
    pub reset: i32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScienceCommand {
    /// Build the envelope which is published to the science topic.
    pub fn to_envelope(&self) -> Envelope {
        let mut payload = Payload::new();
        payload.insert("drill".into(), Value::from(self.drill));
        payload.insert("elev".into(), Value::from(self.elev));
        payload.insert("conv".into(), Value::from(self.conv));
        payload.insert("res_seq".into(), Value::from(self.res_seq));
        payload.insert("rotate".into(), Value::from(self.rotate));
        payload.insert("reset".into(), Value::from(self.reset));

        Envelope::new(SCIENCE_EVENT, payload)
    }

    /// Extract a science command from an envelope.
    ///
    /// Science telemetry shares the event type with commands, so this returns `None` unless every
    /// command field is present as an integer.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        if envelope.event_type != SCIENCE_EVENT {
            return None;
        }

        let get = |k: &str| envelope.payload.get(k).and_then(Value::as_i64).map(|v| v as i32);

        Some(Self {
            drill: get("drill")?,
            elev: get("elev")?,
            conv: get("conv")?,
            res_seq: get("res_seq")?,
            rotate: get("rotate")?,
            reset: get("reset")?,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
