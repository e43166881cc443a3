//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Addresses must parse and stay on the loopback interface
//! - Limits and timeouts must be non-zero; the body cap may only be lowered
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ApiConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ApiConfig;
use crate::http::request::MAX_BODY_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: {addr} is not a loopback address")]
    NotLoopback { field: &'static str, addr: SocketAddr },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("limits.max_body_size {value} exceeds the 100 MiB ceiling")]
    BodyLimitTooLarge { value: usize },
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_loopback(
        "listener.bind_address",
        &config.listener.bind_address,
        &mut errors,
    );
    if config.observability.metrics_enabled {
        check_loopback(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    let non_zero = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("limits.max_body_size", config.limits.max_body_size as u64),
        ("limits.max_header_size", config.limits.max_header_size as u64),
        ("timeouts.read_secs", config.timeouts.read_secs),
        ("timeouts.handler_secs", config.timeouts.handler_secs),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.limits.max_body_size > MAX_BODY_SIZE {
        errors.push(ValidationError::BodyLimitTooLarge {
            value: config.limits.max_body_size,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_loopback(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    match value.parse::<SocketAddr>() {
        Ok(addr) if addr.ip().is_loopback() => {}
        Ok(addr) => errors.push(ValidationError::NotLoopback { field, addr }),
        Err(_) => errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ApiConfig::default()), Ok(()));
    }

    #[test]
    fn ipv6_loopback_is_accepted() {
        let mut config = ApiConfig::default();
        config.listener.bind_address = "[::1]:8978".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ApiConfig::default();
        config.listener.bind_address = "0.0.0.0:8978".into();
        config.listener.max_connections = 0;
        config.limits.max_body_size = 200 * 1024 * 1024;
        config.timeouts.read_secs = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "localhost".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::NotLoopback {
            field: "listener.bind_address",
            addr: "0.0.0.0:8978".parse().unwrap(),
        }));
        assert!(errors.contains(&ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: "localhost".into(),
        }));
        assert!(errors.contains(&ValidationError::Zero { field: "listener.max_connections" }));
        assert!(errors.contains(&ValidationError::Zero { field: "timeouts.read_secs" }));
        assert!(errors.contains(&ValidationError::BodyLimitTooLarge { value: 200 * 1024 * 1024 }));
    }

    #[test]
    fn metrics_address_ignored_when_disabled() {
        let mut config = ApiConfig::default();
        config.observability.metrics_address = "not an address".into();
        assert!(validate_config(&config).is_ok());
    }
}
