//! Logger configuration, validated at construction.

use std::fmt;

use crate::severity::Severity;

/// Estimated byte weight of one event document, used to derive the
/// byte ceiling of a capped collection from its item ceiling. A
/// heuristic, not a guaranteed bound: heavier documents lower the
/// actual item capacity, since the underlying cap is byte-based.
pub const EVENT_DOC_WEIGHT: u64 = 1024;

/// Error type for configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The capped-collection item ceiling must be at least 1.
    ZeroItemLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroItemLimit => {
                write!(f, "capped-collection item limit must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Logger settings. Invalid settings are a startup error, never a
/// per-call one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Minimum severity to log; calls numerically above it (less
    /// severe) are dropped before any work happens.
    pub limit: Severity,
    /// Item ceiling of each per-template capped event collection.
    pub items: u64,
    /// Whether per-request template tracking is enabled.
    pub request_tracking: bool,
}

impl Config {
    pub fn new(limit: Severity, items: u64, request_tracking: bool) -> Result<Self, ConfigError> {
        if items == 0 {
            return Err(ConfigError::ZeroItemLimit);
        }
        Ok(Config {
            limit,
            items,
            request_tracking,
        })
    }

    /// Byte ceiling for a capped event collection.
    pub fn capped_bytes(&self) -> u64 {
        self.items * EVENT_DOC_WEIGHT
    }
}
