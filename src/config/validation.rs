//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, header buffer large enough)
//! - Reject keystore/truststore types the TLS builder cannot read
//! - Decode the run-on-start service context up front
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::lifecycle::run_once::decode_service_context;

/// Smallest header buffer the HTTP/1 codec accepts.
pub const MIN_REQUEST_HEADER_SIZE: usize = 8192;

/// Keystore/truststore bundle types understood by the TLS builder.
pub const SUPPORTED_STORE_KINDS: &[&str] = &["PEM", "PKCS12", "P12"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.address.trim().is_empty() {
        errors.push(ValidationError::new("server.address", "must not be blank"));
    }
    if config.server.idle_timeout_secs == 0 {
        errors.push(ValidationError::new("server.idle_timeout_secs", "must be greater than 0"));
    }
    if config.server.request_header_size < MIN_REQUEST_HEADER_SIZE {
        errors.push(ValidationError::new(
            "server.request_header_size",
            format!("must be at least {MIN_REQUEST_HEADER_SIZE} bytes"),
        ));
    }
    if config.startup.construction_error_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "startup.construction_error_timeout_ms",
            "must be greater than 0",
        ));
    }

    if config.tls.enabled {
        validate_tls(config, &mut errors);
    }

    if config.recovery.storage.trim().is_empty()
        && (config.recovery.enabled || config.cluster.enabled)
    {
        errors.push(ValidationError::new(
            "recovery.storage",
            "a recovery storage name is required when recovery or cluster mode is enabled",
        ));
    }

    let run = &config.notebook.run_on_start;
    if !run.note_id.trim().is_empty() {
        if let Err(e) = decode_service_context(&run.service_context) {
            errors.push(ValidationError::new("notebook.run_on_start.service_context", e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tls(config: &ServerConfig, errors: &mut Vec<ValidationError>) {
    let tls = &config.tls;

    if !tls.keystore.path.is_empty() && !is_supported_kind(&tls.keystore.kind) {
        errors.push(ValidationError::new(
            "tls.keystore.kind",
            format!("unsupported keystore type {:?}", tls.keystore.kind),
        ));
    }
    if tls.client_auth && !tls.truststore.path.is_empty() && !is_supported_kind(&tls.truststore.kind) {
        errors.push(ValidationError::new(
            "tls.truststore.kind",
            format!("unsupported truststore type {:?}", tls.truststore.kind),
        ));
    }
}

fn is_supported_kind(kind: &str) -> bool {
    SUPPORTED_STORE_KINDS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.server.idle_timeout_secs = 0;
        config.server.request_header_size = 1024;
        config.startup.construction_error_timeout_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "server.request_header_size"));
    }

    #[test]
    fn rejects_unsupported_keystore_kind() {
        let mut config = ServerConfig::default();
        config.tls.enabled = true;
        config.tls.keystore.path = "/etc/server.jks".to_string();
        config.tls.keystore.kind = "JKS".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "tls.keystore.kind");
    }

    #[test]
    fn accepts_password_protected_stores() {
        let mut config = ServerConfig::default();
        config.tls.enabled = true;
        config.tls.pem_key_password = "hunter2".to_string();
        config.tls.keystore.path = "/etc/server.p12".to_string();
        config.tls.keystore.kind = "PKCS12".to_string();
        config.tls.keystore.password = "changeit".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn keystore_kind_is_case_insensitive() {
        let mut config = ServerConfig::default();
        config.tls.enabled = true;
        config.tls.keystore.path = "/etc/server.pem".to_string();
        config.tls.keystore.kind = "pem".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn tls_settings_ignored_when_disabled() {
        let mut config = ServerConfig::default();
        config.tls.pem_key_password = "secret".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn malformed_service_context_is_rejected() {
        let mut config = ServerConfig::default();
        config.notebook.run_on_start.note_id = "note-1".to_string();
        config.notebook.run_on_start.service_context = "%%% not base64".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "notebook.run_on_start.service_context");
    }

    #[test]
    fn cluster_needs_recovery_storage_name() {
        let mut config = ServerConfig::default();
        config.cluster.enabled = true;
        config.recovery.storage = " ".to_string();
        assert!(validate_config(&config).is_err());
    }
}
