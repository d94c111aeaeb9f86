//! Axis to wheel demand mapping

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use comms_if::tc::{ChassisCommand, Wheel, NUM_WHEELS, PWM_MAX};
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Set of wheels the operator has locked. A locked wheel is always sent a zero demand.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelLockSet {
    locked: [bool; NUM_WHEELS],
}

/// Result of mapping the operator's input onto the wheels.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ChassisMapping {
    /// The demands to send.
    pub cmd: ChassisCommand,

    /// Largest demand magnitude reachable at the current speed factor, in `[0, PWM_MAX]`.
    ///
    /// Only used to scale indicators, it is never sent to the rover.
    pub dynamic_max: i32,

    /// True if a side's demand was outside `[-PWM_MAX, PWM_MAX]` and had to be limited.
    pub clamped: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WheelLockSet {
    /// Create a set with every wheel unlocked.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, wheel: Wheel) -> bool {
        self.locked[wheel.index()]
    }

    pub fn set(&mut self, wheel: Wheel, locked: bool) {
        self.locked[wheel.index()] = locked;
    }

    /// Flip the lock on a wheel, returning the new state.
    pub fn toggle(&mut self, wheel: Wheel) -> bool {
        let i = wheel.index();
        self.locked[i] = !self.locked[i];
        self.locked[i]
    }

    /// Lock flags in wire order.
    pub fn flags(&self) -> [bool; NUM_WHEELS] {
        self.locked
    }

    /// Wheels which are currently locked.
    pub fn locked_wheels(&self) -> Vec<Wheel> {
        Wheel::ALL
            .iter()
            .copied()
            .filter(|w| self.is_locked(*w))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map the operator's axes onto the four wheels.
///
/// - `left_axis`, `right_axis` are expected in `[-1, 1]` and `speed_factor` in `[0, 1]`.
/// - Each side's demand is `axis * speed_factor * PWM_MAX`, truncated toward zero and limited to
///   `[-PWM_MAX, PWM_MAX]` whatever the inputs.
/// - Locked wheels are zeroed after the side demands are computed.
/// - A NaN input gives zero demands.
pub fn map_chassis(
    left_axis: f64,
    right_axis: f64,
    speed_factor: f64,
    locks: &WheelLockSet,
) -> ChassisMapping {
    let (left_speed, left_clamped) = side_demand(left_axis, speed_factor);
    let (right_speed, right_clamped) = side_demand(right_axis, speed_factor);

    let mut speeds = [left_speed, right_speed, left_speed, right_speed];

    for wheel in Wheel::ALL.iter() {
        if locks.is_locked(*wheel) {
            speeds[wheel.index()] = 0;
        }
    }

    let dynamic_max = clamp((speed_factor * PWM_MAX as f64).trunc(), 0.0, PWM_MAX as f64);

    ChassisMapping {
        cmd: ChassisCommand::from_wheels(speeds),
        // NaN casts to zero
        dynamic_max: dynamic_max as i32,
        clamped: left_clamped || right_clamped,
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Demand for one side of the chassis, and whether it had to be limited.
fn side_demand(axis: f64, speed_factor: f64) -> (i32, bool) {
    let raw = (axis * speed_factor * PWM_MAX as f64).trunc();

    if raw.is_nan() {
        return (0, false);
    }

    let limited = clamp(raw, -PWM_MAX as f64, PWM_MAX as f64);

    (limited as i32, limited != raw)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
