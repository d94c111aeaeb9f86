//! # Communications interface crate.
//!
//! Provides the messages exchanged with the rover through the MQTT broker, and the client used to
//! exchange them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// JSON envelope codec
pub mod codec;

/// Telecommand definitions
pub mod tc;

/// Telemetry classification
pub mod tm;

/// Buffering of received messages
pub mod inbound;

/// Network module
pub mod net;
