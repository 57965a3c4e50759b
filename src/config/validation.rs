//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// One semantic problem in a [`ProxyConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ConfigViolation>> {
    let mut violations = Vec::new();
    let mut check_addr = |field: &'static str, value: &str| {
        if value.parse::<SocketAddr>().is_err() {
            violations.push(ConfigViolation {
                field,
                message: format!("'{}' is not a socket address", value),
            });
        }
    };

    check_addr("listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_addr("admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_addr("observability.metrics_address", &config.observability.metrics_address);
    }

    if config.origins.path.as_os_str().is_empty() {
        violations.push(ConfigViolation {
            field: "origins.path",
            message: "must not be empty".to_string(),
        });
    }
    if config.origins.poll_interval_ms == 0 {
        violations.push(ConfigViolation {
            field: "origins.poll_interval_ms",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.timeouts.connect_secs == 0 {
        violations.push(ConfigViolation {
            field: "timeouts.connect_secs",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.timeouts.request_secs == 0 {
        violations.push(ConfigViolation {
            field: "timeouts.request_secs",
            message: "must be greater than zero".to_string(),
        });
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
