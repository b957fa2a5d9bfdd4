//! Reconciliation configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for reconciling intent against rooms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Minimum spacing between full resyncs of every protected room's ACL
    /// (in milliseconds).
    pub acl_resync_delay_ms: u64,
    /// Whether compiled ACLs allow servers addressed by IP literal.
    pub allow_ip_literals: bool,
    /// Allow list of every compiled ACL.
    pub acl_allow: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            acl_resync_delay_ms: 1000,
            allow_ip_literals: false,
            acl_allow: vec!["*".to_string()],
        }
    }
}

impl ReconcileConfig {
    /// Parse a configuration, filling absent fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn acl_resync_delay(&self) -> Duration {
        Duration::from_millis(self.acl_resync_delay_ms)
    }
}

/// Builder for reconciliation configuration.
pub struct ReconcileConfigBuilder {
    config: ReconcileConfig,
}

impl ReconcileConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReconcileConfig::default(),
        }
    }

    pub fn acl_resync_delay(mut self, ms: u64) -> Self {
        self.config.acl_resync_delay_ms = ms;
        self
    }

    pub fn allow_ip_literals(mut self, allowed: bool) -> Self {
        self.config.allow_ip_literals = allowed;
        self
    }

    pub fn acl_allow(mut self, servers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.acl_allow = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> ReconcileConfig {
        self.config
    }
}

impl Default for ReconcileConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
