//! # Telecommand module
//!
//! Commands sent from the ground to the rover. Both command families travel inside an
//! [`Envelope`](crate::codec::Envelope) whose `eventType` identifies the family.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod chassis;
pub mod science;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use chassis::{ChassisCommand, Wheel, NUM_WHEELS, PWM_MAX};
pub use science::{ScienceCommand, ROTATE_MAX};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Topic chassis commands are published to. The rover echoes them back on the same topic.
pub const CHASSIS_INBOUND_TOPIC: &str = "orion/topic/chassis/controller/inbound";

/// Topic science commands are published to.
pub const SCIENCE_INBOUND_TOPIC: &str = "orion/topic/science/inbound";

/// Topic the science module publishes telemetry and samples on.
pub const SCIENCE_OUTBOUND_TOPIC: &str = "orion/topic/science/outbound";

/// Event type of chassis envelopes.
pub const CHASSIS_EVENT: &str = "chassis";

/// Event type of science envelopes.
pub const SCIENCE_EVENT: &str = "science";
