//! Server Configuration

use crate::storage::HashConfig;

/// Server configuration: bind address/port plus the active-expire cron's
/// tick interval and per-tick quota, composing [`HashConfig`] for the
/// hash encoding thresholds (spec.md §6's configuration table).
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub bind: String,

    /// Port number
    pub port: u16,

    /// Active-expire sweep interval in seconds (C9's cron tick)
    pub active_expire_interval: u64,

    /// Max fields the active-expire sweep may remove per tick
    pub active_expire_quota: u64,

    /// Hash encoding thresholds and lazy-expiry policy
    pub hash: HashConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 6380,
            active_expire_interval: 1,
            active_expire_quota: 20,
            hash: HashConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Create a new config with custom bind address
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Set the active-expire tick interval, in seconds
    pub fn with_active_expire_interval(mut self, interval_secs: u64) -> Self {
        self.active_expire_interval = interval_secs;
        self
    }

    /// Set the active-expire per-tick field quota
    pub fn with_active_expire_quota(mut self, quota: u64) -> Self {
        self.active_expire_quota = quota;
        self
    }

    pub fn with_hash_config(mut self, hash: HashConfig) -> Self {
        self.hash = hash;
        self
    }
}
