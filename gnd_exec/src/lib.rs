//! # Ground station library.
//!
//! This library holds everything the ground station executables share: turning operator input into
//! rover commands and pacing how those commands are sent.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Chassis control module - converts operator axes into per-wheel PWM demands
pub mod chassis_ctrl;

/// Operator input sources for the chassis - joysticks by role, or the manual fallback
pub mod input;

/// Science control - operator actions for the science module
pub mod sci_ctrl;

/// Publisher throttle - paces the chassis heartbeat and counts dropped commands
pub mod throttle;

/// Data shared between the main loop and the operator input thread
pub mod data_store;

/// Executable parameters
pub mod params;
