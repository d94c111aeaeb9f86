//! # Chassis telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CHASSIS_EVENT;
use crate::codec::{Envelope, Payload};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum absolute PWM demand accepted by the chassis controller.
pub const PWM_MAX: i32 = 255;

/// Number of driven wheels on the chassis.
pub const NUM_WHEELS: usize = 4;

/// Mode string sent alongside chassis commands.
pub const PWM_MODE: &str = "pwm";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// PWM demands for each of the four wheels, each in `[-PWM_MAX, PWM_MAX]`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChassisCommand {
    pub fl: i32,
    pub fr: i32,
    pub rl: i32,
    pub rr: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifies a single wheel of the chassis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Wheel {
    /// All wheels in wire order (`fl`, `fr`, `rl`, `rr`).
    pub const ALL: [Wheel; NUM_WHEELS] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::RearLeft,
        Wheel::RearRight,
    ];

    /// Index of the wheel in wire order.
    pub fn index(self) -> usize {
        match self {
            Wheel::FrontLeft => 0,
            Wheel::FrontRight => 1,
            Wheel::RearLeft => 2,
            Wheel::RearRight => 3,
        }
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        match self {
            Wheel::FrontLeft => "Front Left",
            Wheel::FrontRight => "Front Right",
            Wheel::RearLeft => "Rear Left",
            Wheel::RearRight => "Rear Right",
        }
    }
}

impl std::str::FromStr for Wheel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fl" | "front_left" => Ok(Wheel::FrontLeft),
            "fr" | "front_right" => Ok(Wheel::FrontRight),
            "rl" | "rear_left" => Ok(Wheel::RearLeft),
            "rr" | "rear_right" => Ok(Wheel::RearRight),
            _ => Err(format!("{} is not a wheel (expected fl, fr, rl or rr)", s)),
        }
    }
}

impl ChassisCommand {
    /// Build a command from per-wheel values in wire order.
    pub fn from_wheels(speeds: [i32; NUM_WHEELS]) -> Self {
        Self {
            fl: speeds[0],
            fr: speeds[1],
            rl: speeds[2],
            rr: speeds[3],
        }
    }

    /// Per-wheel values in wire order.
    pub fn wheels(&self) -> [i32; NUM_WHEELS] {
        [self.fl, self.fr, self.rl, self.rr]
    }

    /// Value demanded of a single wheel.
    pub fn get(&self, wheel: Wheel) -> i32 {
        self.wheels()[wheel.index()]
    }

    /// Build the envelope which is published to the chassis topic.
    pub fn to_envelope(&self) -> Envelope {
        let mut payload = Payload::new();
        payload.insert("fl".into(), Value::from(self.fl));
        payload.insert("fr".into(), Value::from(self.fr));
        payload.insert("rl".into(), Value::from(self.rl));
        payload.insert("rr".into(), Value::from(self.rr));

        Envelope::new(CHASSIS_EVENT, payload).with_mode(PWM_MODE)
    }

    /// Extract a chassis command from an envelope, for instance the rover's echo.
    ///
    /// Returns `None` if the envelope isn't a chassis event or a wheel is missing or not an
    /// integer.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        if envelope.event_type != CHASSIS_EVENT {
            return None;
        }

        let get = |k: &str| envelope.payload.get(k).and_then(Value::as_i64).map(|v| v as i32);

        Some(Self {
            fl: get("fl")?,
            fr: get("fr")?,
            rl: get("rl")?,
            rr: get("rr")?,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec;

    #[test]
    fn test_envelope_schema() {
        let cmd = ChassisCommand::from_wheels([127, -127, 127, -127]);
        let bytes = codec::encode(&cmd.to_envelope()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "eventType": "chassis",
                "mode": "pwm",
                "payload": {"fl": 127, "fr": -127, "rl": 127, "rr": -127}
            })
        );
    }

    #[test]
    fn test_echo_parse() {
        let env = codec::decode(
            br#"{"eventType":"chassis","mode":"pwm","payload":{"fl":1,"fr":2,"rl":3,"rr":4}}"#,
        )
        .unwrap();
        assert_eq!(
            ChassisCommand::from_envelope(&env),
            Some(ChassisCommand::from_wheels([1, 2, 3, 4]))
        );

        let env = codec::decode(br#"{"eventType":"chassis","payload":{"fl":1}}"#).unwrap();
        assert_eq!(ChassisCommand::from_envelope(&env), None);

        let env = codec::decode(br#"{"eventType":"science","payload":{}}"#).unwrap();
        assert_eq!(ChassisCommand::from_envelope(&env), None);
    }

    #[test]
    fn test_wheel_parse() {
        assert_eq!("FL".parse::<Wheel>(), Ok(Wheel::FrontLeft));
        assert_eq!("rear_right".parse::<Wheel>(), Ok(Wheel::RearRight));
        assert!("middle".parse::<Wheel>().is_err());

        for (i, w) in Wheel::ALL.iter().enumerate() {
            assert_eq!(w.index(), i);
        }
    }
}
