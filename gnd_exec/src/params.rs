//! # Ground Executable Parameters
//!
//! This module provides parameters for the ground executables, loaded from `gnd_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::input::DeviceRoleTable;
use comms_if::{
    inbound::DEFAULT_CAPACITY,
    net::NetParams,
    tc::{CHASSIS_INBOUND_TOPIC, SCIENCE_INBOUND_TOPIC, SCIENCE_OUTBOUND_TOPIC},
};
use util::params::{self, LoadError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Name of the parameter file under the parameters directory.
pub const PARAMS_FILE: &str = "gnd_exec.toml";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GndExecParams {
    /// Broker connection
    pub broker: NetParams,

    pub topics: TopicParams,

    /// Period of the chassis heartbeat.
    ///
    /// Units: milliseconds
    pub chassis_tick_period_ms: u64,

    /// Number of inbound messages held before the oldest is overwritten.
    pub inbound_capacity: usize,

    /// Period at which the science logger drains the inbound queue.
    ///
    /// Units: milliseconds
    pub drain_period_ms: u64,

    /// Subscribe to the chassis topic to see the commands the rover receives.
    pub subscribe_chassis_echo: bool,

    /// Devices recognised as chassis joysticks.
    pub device_roles: DeviceRoleTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicParams {
    /// Chassis commands are published here
    pub chassis_inbound: String,

    /// Science commands are published here
    pub science_inbound: String,

    /// Science telemetry and samples arrive here
    pub science_outbound: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for GndExecParams {
    fn default() -> Self {
        Self {
            broker: NetParams::default(),
            topics: TopicParams::default(),
            chassis_tick_period_ms: 50,
            inbound_capacity: DEFAULT_CAPACITY,
            drain_period_ms: 1000,
            subscribe_chassis_echo: true,
            device_roles: DeviceRoleTable::default(),
        }
    }
}

impl Default for TopicParams {
    fn default() -> Self {
        Self {
            chassis_inbound: CHASSIS_INBOUND_TOPIC.into(),
            science_inbound: SCIENCE_INBOUND_TOPIC.into(),
            science_outbound: SCIENCE_OUTBOUND_TOPIC.into(),
        }
    }
}

impl GndExecParams {
    /// Load the parameters from the parameters directory and apply the broker environment
    /// overrides.
    pub fn load() -> Result<Self, LoadError> {
        let mut p: Self = params::load(PARAMS_FILE)?;
        p.broker.apply_env_overrides();
        Ok(p)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
