//! # Broker connection parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const ENV_BROKER_HOST: &str = "ORION_BROKER_HOST";
pub const ENV_BROKER_PORT: &str = "ORION_BROKER_PORT";
pub const ENV_BROKER_USERNAME: &str = "ORION_BROKER_USERNAME";
pub const ENV_BROKER_PASSWORD: &str = "ORION_BROKER_PASSWORD";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of a broker session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetParams {
    /// Broker host name or address.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Username, no credentials are sent if empty.
    pub username: String,

    pub password: String,

    /// Keepalive interval.
    ///
    /// Units: seconds
    pub keepalive_s: u64,

    /// Prefix of the client ID, the process ID is appended to it.
    pub client_id_prefix: String,

    /// Time waited after a link failure before reconnecting.
    ///
    /// Units: milliseconds
    pub retry_interval_ms: u64,

    /// Time allowed for the broker to accept a connection before the attempt fails.
    ///
    /// Units: seconds
    pub connection_timeout_s: u64,

    /// Number of outgoing requests which can be waiting for the network thread.
    pub request_capacity: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for NetParams {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            keepalive_s: 60,
            client_id_prefix: "orion_gnd".into(),
            retry_interval_ms: 1000,
            connection_timeout_s: 5,
            request_capacity: 64,
        }
    }
}

impl NetParams {
    /// Override the broker address and credentials from the environment.
    ///
    /// An unparsable port is ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var(ENV_BROKER_HOST) {
            self.host = host;
        }

        if let Ok(port) = std::env::var(ENV_BROKER_PORT) {
            match port.parse() {
                Ok(p) => self.port = p,
                Err(e) => warn!(
                    "Ignoring {}={:?}, not a valid port: {}",
                    ENV_BROKER_PORT, port, e
                ),
            }
        }

        if let Ok(username) = std::env::var(ENV_BROKER_USERNAME) {
            self.username = username;
        }

        if let Ok(password) = std::env::var(ENV_BROKER_PASSWORD) {
            self.password = password;
        }
    }

    /// Client ID to present to the broker, unique per process.
    pub fn client_id(&self) -> String {
        format!("{}-{}", self.client_id_prefix, std::process::id())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_toml() {
        let params: NetParams = toml::from_str(
            r#"
            host = "192.168.11.11"
            username = "user"
            password = "user"
            "#,
        )
        .unwrap();

        assert_eq!(params.host, "192.168.11.11");
        assert_eq!(params.port, 1883);
        assert_eq!(params.keepalive_s, 60);
        assert_eq!(params.connection_timeout_s, 5);
        assert!(params.client_id().starts_with("orion_gnd-"));
    }
}
