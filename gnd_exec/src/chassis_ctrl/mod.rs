//! Chassis control module
//!
//! Turns the operator's left and right axes and speed factor into a PWM demand for each of the
//! four wheels. The chassis is skid steered, so both left wheels get the left demand and both
//! right wheels the right demand.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod mapping;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use mapping::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ChassisCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ChassisCtrlError {
    #[error("Invalid device role table: {0}")]
    InvalidDeviceRoles(String),
}
