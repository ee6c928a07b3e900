//! Identify engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use hallmark_protocol::{identify_protocol, push_protocol};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyConfig {
    /// First segment of both protocol ids.
    #[serde(default = "default_protocol_prefix")]
    pub protocol_prefix: String,
    /// Advertised agent string.
    #[serde(default = "default_agent_version")]
    pub agent_version: String,
    /// Advertised protocol-version string.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Per-exchange deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Cap on a single identify frame.
    #[serde(default = "default_max_message_size")]
    pub max_identify_message_size: usize,
    #[serde(default = "default_one")]
    pub max_inbound_streams: usize,
    #[serde(default = "default_one")]
    pub max_outbound_streams: usize,
    #[serde(default = "default_one")]
    pub max_push_incoming_streams: usize,
    #[serde(default = "default_one")]
    pub max_push_outgoing_streams: usize,
    /// Cap on observed addresses retained by the address manager.
    #[serde(default = "default_max_observed")]
    pub max_observed_addresses: usize,
    /// Identify every newly established connection.
    #[serde(default = "default_true")]
    pub run_on_connect: bool,
}

impl IdentifyConfig {
    /// Identify protocol id under the configured prefix.
    pub fn identify_protocol(&self) -> String {
        identify_protocol(&self.protocol_prefix)
    }

    /// Identify-push protocol id under the configured prefix.
    pub fn push_protocol(&self) -> String {
        push_protocol(&self.protocol_prefix)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            protocol_prefix: default_protocol_prefix(),
            agent_version: default_agent_version(),
            protocol_version: default_protocol_version(),
            timeout_ms: default_timeout_ms(),
            max_identify_message_size: default_max_message_size(),
            max_inbound_streams: default_one(),
            max_outbound_streams: default_one(),
            max_push_incoming_streams: default_one(),
            max_push_outgoing_streams: default_one(),
            max_observed_addresses: default_max_observed(),
            run_on_connect: default_true(),
        }
    }
}

// Default value functions
fn default_protocol_prefix() -> String {
    hallmark_protocol::DEFAULT_PROTOCOL_PREFIX.into()
}
fn default_agent_version() -> String {
    concat!("hallmark/", env!("CARGO_PKG_VERSION")).into()
}
fn default_protocol_version() -> String {
    "ipfs/0.1.0".into()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_max_message_size() -> usize {
    hallmark_protocol::MAX_IDENTIFY_MESSAGE_SIZE
}
fn default_one() -> usize {
    1
}
fn default_max_observed() -> usize {
    10
}
fn default_true() -> bool {
    true
}
