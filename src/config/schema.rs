//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the notebook server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Connector binding and tuning.
    pub server: ServerSection,

    /// TLS material sources.
    pub tls: TlsConfig,

    /// Authentication backend selection.
    pub auth: AuthConfig,

    /// Notebook storage, scheduler and search settings.
    pub notebook: NotebookConfig,

    /// Interpreter settings known to the settings manager.
    pub interpreter: InterpreterConfig,

    /// Recovery mode and recovery storage selection.
    pub recovery: RecoveryConfig,

    /// Cluster mode.
    pub cluster: ClusterConfig,

    /// Management endpoints (health, ping, metrics).
    pub management: ManagementConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Startup sequencing knobs.
    pub startup: StartupConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind host (e.g., "0.0.0.0").
    pub address: String,

    /// Plaintext port.
    pub port: u16,

    /// Port used instead of `port` when TLS is enabled.
    pub ssl_port: u16,

    /// Requests idle longer than this are cut off.
    pub idle_timeout_secs: u64,

    /// Maximum request header buffer in bytes.
    pub request_header_size: usize,

    /// Drain window given to in-flight requests when the listener stops.
    pub graceful_shutdown_secs: u64,
}

impl ServerSection {
    /// Port the primary connector binds, depending on whether TLS is on.
    pub fn effective_port(&self, tls_enabled: bool) -> u16 {
        if tls_enabled {
            self.ssl_port
        } else {
            self.port
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_secs)
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            ssl_port: 8443,
            idle_timeout_secs: 30,
            request_header_size: 8192,
            graceful_shutdown_secs: 5,
        }
    }
}

/// TLS configuration for the primary connector.
///
/// A PEM key/certificate pair takes precedence over the keystore when both
/// files are readable. The two sources are never merged.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Serve HTTPS instead of plain HTTP.
    pub enabled: bool,

    /// Require clients to present a certificate.
    pub client_auth: bool,

    /// Path to the PEM private key.
    pub pem_key_path: String,

    /// Path to the PEM certificate chain.
    pub pem_cert_path: String,

    /// Path to the PEM CA bundle used to verify client certificates.
    pub pem_ca_path: String,

    /// Password for an encrypted PKCS#8 PEM private key.
    pub pem_key_password: String,

    /// Keystore fallback for the server identity.
    pub keystore: KeystoreConfig,

    /// Truststore fallback for client verification.
    pub truststore: TruststoreConfig,
}

/// Keystore settings (path/type/password triple).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// Path to the keystore bundle.
    pub path: String,

    /// `PEM` bundle or `PKCS12`.
    pub kind: String,

    /// Opens a PKCS12 store; decrypts the key of a PEM bundle unless
    /// `key_manager_password` is set.
    pub password: String,

    /// Decrypts the private key inside a PEM bundle.
    pub key_manager_password: String,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            kind: "PEM".to_string(),
            password: String::new(),
            key_manager_password: String::new(),
        }
    }
}

/// Truststore settings (path/type/password triple).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TruststoreConfig {
    pub path: String,
    pub kind: String,
    pub password: String,
}

impl Default for TruststoreConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            kind: "PEM".to_string(),
            password: String::new(),
        }
    }
}

/// Authentication backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Realm file delegating authentication. Blank means no authentication.
    pub realm_config_path: String,
}

/// Notebook subsystem configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotebookConfig {
    /// Directory holding note files.
    pub dir: String,

    /// Enable the cron scheduler.
    pub cron_enabled: bool,

    /// Worker slots available to the cron scheduler.
    pub cron_pool_size: usize,

    /// Enable the indexed search service.
    pub search_enabled: bool,

    /// Upper bound on hits returned by a search query.
    pub search_max_results: usize,

    /// Run a single note during startup.
    pub run_on_start: RunOnStartConfig,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            dir: "notebook".to_string(),
            cron_enabled: false,
            cron_pool_size: 4,
            search_enabled: false,
            search_max_results: 50,
            run_on_start: RunOnStartConfig::default(),
        }
    }
}

/// Run-on-start configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RunOnStartConfig {
    /// Note to run. Blank disables the feature.
    pub note_id: String,

    /// Base64-encoded JSON service context. Blank means anonymous.
    pub service_context: String,

    /// Shut the server down once the note finished.
    pub auto_shutdown: bool,
}

/// Interpreter settings configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Interpreter setting names (e.g. "md", "sh", "python").
    pub settings: Vec<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            settings: vec!["md".to_string(), "sh".to_string()],
        }
    }
}

/// Recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Keep interpreter processes alive across restarts.
    pub enabled: bool,

    /// Registered recovery storage name (`null`, `file`).
    pub storage: String,

    /// Directory used by the `file` recovery storage.
    pub dir: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            storage: "null".to_string(),
            dir: "recovery".to_string(),
        }
    }
}

/// Cluster configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    /// Enable cluster mode.
    pub enabled: bool,

    /// Node identifier. Generated when blank.
    pub node_id: String,
}

/// Management endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// Attach `/health/*`, `/ping` and `/metrics`.
    pub enabled: bool,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Install the Prometheus recorder.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

/// Startup sequencing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    /// How long to wait for construction errors before declaring success.
    pub construction_error_timeout_ms: u64,
}

impl StartupConfig {
    pub fn construction_error_timeout(&self) -> Duration {
        Duration::from_millis(self.construction_error_timeout_ms)
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            construction_error_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.tls.enabled);
        assert_eq!(config.tls.keystore.kind, "PEM");
        assert_eq!(config.startup.construction_error_timeout_ms, 5000);
        assert_eq!(config.recovery.storage, "null");
    }

    #[test]
    fn effective_port_follows_tls_flag() {
        let section = ServerSection::default();
        assert_eq!(section.effective_port(false), 8080);
        assert_eq!(section.effective_port(true), 8443);
    }

    #[test]
    fn nested_sections_parse() {
        let raw = r#"
            [server]
            port = 9000

            [tls]
            enabled = true
            pem_cert_path = "/etc/cert.pem"

            [tls.keystore]
            path = "/etc/keystore.pem"

            [notebook.run_on_start]
            note_id = "2A94M5J1Z"
            auto_shutdown = true
        "#;
        let config: ServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ssl_port, 8443);
        assert!(config.tls.enabled);
        assert_eq!(config.tls.keystore.path, "/etc/keystore.pem");
        assert_eq!(config.notebook.run_on_start.note_id, "2A94M5J1Z");
        assert!(config.notebook.run_on_start.auto_shutdown);
    }
}
