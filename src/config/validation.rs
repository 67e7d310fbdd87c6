//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sizes > 0, address parses)
//! - Check network credentials against the selected mode
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BootloaderConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BootloaderConfig, NetworkMode};

/// Minimum WPA2 passphrase length.
const MIN_AP_PASSWORD_LEN: usize = 8;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("runner.script_extension '{0}' must be a bare, non-empty extension")]
    InvalidExtension(String),

    #[error("network.ssid is required when network.mode is not 'disabled'")]
    MissingSsid,

    #[error("network.password must be at least {MIN_AP_PASSWORD_LEN} characters for an access point")]
    WeakAccessPointPassword,
}

/// Validate the semantic constraints of a parsed configuration.
pub fn validate_config(config: &BootloaderConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    let positive = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("http.read_timeout_secs", config.http.read_timeout_secs),
        ("http.read_chunk_size", config.http.read_chunk_size as u64),
        ("http.max_request_bytes", config.http.max_request_bytes as u64),
        ("stream.poll_interval_ms", config.stream.poll_interval_ms),
        ("stream.channel_capacity", config.stream.channel_capacity as u64),
        ("runner.stop_timeout_secs", config.runner.stop_timeout_secs),
        ("network.timeout_secs", config.network.timeout_secs),
        ("observability.log_max_bytes", config.observability.log_max_bytes),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive(field));
        }
    }

    let ext = &config.runner.script_extension;
    if ext.is_empty() || ext.contains(['*', '/', '.']) {
        errors.push(ValidationError::InvalidExtension(ext.clone()));
    }

    match config.network.mode {
        NetworkMode::Disabled => {}
        NetworkMode::Station => {
            if config.network.ssid.is_empty() {
                errors.push(ValidationError::MissingSsid);
            }
        }
        NetworkMode::AccessPoint => {
            if config.network.ssid.is_empty() {
                errors.push(ValidationError::MissingSsid);
            }
            if config.network.password.chars().count() < MIN_AP_PASSWORD_LEN {
                errors.push(ValidationError::WeakAccessPointPassword);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
