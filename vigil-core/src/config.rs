use crate::access::LogFormat;
use crate::error::VigilError;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub access_log: AccessLogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Max buffered request body, in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

/// Settings of the wrapping handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Fixed `Content-Type` applied to every response.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Only admit requests negotiating this media type.
    #[serde(default)]
    pub accept: Option<String>,
    /// Allowed methods, in `Allow` header order. Empty = all.
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub negotiation: NegotiationHeader,
}

/// Which request header the media-type admission check reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationHeader {
    /// What the client wants back.
    #[default]
    Accept,
    /// What the client sent.
    ContentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub format: LogFormat,
    /// Queue depth of the default sink; events beyond it are dropped.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// When false, no prometheus counters are updated on the hot path.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_addr() -> String { "0.0.0.0:8080".into() }
fn default_body_limit() -> usize { 2 * 1024 * 1024 }
fn default_true() -> bool { true }
fn default_capacity() -> usize { 256 }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            body_limit: default_body_limit(),
        }
    }
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::default(),
            capacity: default_capacity(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl VigilConfig {
    /// Load configuration from YAML file + env overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: VigilConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.access_log.enabled && self.access_log.capacity == 0 {
            return Err(VigilError::Config("access_log.capacity must be at least 1".into()));
        }
        if !self.metrics.path.starts_with('/') {
            return Err(VigilError::Config(format!(
                "metrics.path must start with '/', got {:?}",
                self.metrics.path
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── Default values ────────────────────────────────────────────

    #[test]
    fn default_server_config_has_expected_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.addr, "0.0.0.0:8080");
        assert_eq!(cfg.body_limit, 2 * 1024 * 1024);
    }

    #[test]
    fn default_handler_config_admits_everything() {
        let cfg = HandlerConfig::default();
        assert!(cfg.content_type.is_none());
        assert!(cfg.accept.is_none());
        assert!(cfg.allow.is_empty());
        assert_eq!(cfg.negotiation, NegotiationHeader::Accept);
    }

    #[test]
    fn default_access_log_is_enabled_combined() {
        let cfg = AccessLogConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.format, LogFormat::Combined);
        assert_eq!(cfg.capacity, 256);
    }

    #[test]
    fn default_metrics_disabled() {
        let cfg = MetricsConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.path, "/metrics");
    }

    #[test]
    fn negotiation_header_serde_is_snake_case() {
        let json = serde_json::to_string(&NegotiationHeader::ContentType).unwrap();
        assert_eq!(json, "\"content_type\"");
        let back: NegotiationHeader = serde_json::from_str("\"accept\"").unwrap();
        assert_eq!(back, NegotiationHeader::Accept);
    }

    // ── validate() ────────────────────────────────────────────────

    #[test]
    fn zero_capacity_is_rejected() {
        let mut cfg = VigilConfig::default();
        cfg.access_log.capacity = 0;
        assert!(cfg.validate().is_err());
        cfg.access_log.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn relative_metrics_path_is_rejected() {
        let mut cfg = VigilConfig::default();
        cfg.metrics.path = "metrics".into();
        assert!(matches!(cfg.validate(), Err(VigilError::Config(_))));
    }

    // ── VigilConfig::load() ───────────────────────────────────────

    #[test]
    fn load_from_valid_yaml_overrides_defaults() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "server:\n  addr: \"127.0.0.1:9999\"\n").unwrap();
        let cfg = VigilConfig::load(tmpfile.path()).unwrap();
        assert_eq!(cfg.server.addr, "127.0.0.1:9999");
        // Defaults still apply for unspecified fields
        assert_eq!(cfg.server.body_limit, 2 * 1024 * 1024);
        assert!(cfg.access_log.enabled);
    }

    #[test]
    fn load_yaml_with_handler_and_log_format() {
        let yaml = r#"
handler:
  content_type: "application/json"
  accept: "application/json"
  allow: ["GET", "POST"]
  negotiation: content_type
access_log:
  format: json
  capacity: 16
metrics:
  enabled: true
  path: "/prom"
"#;
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "{yaml}").unwrap();
        let cfg = VigilConfig::load(tmpfile.path()).unwrap();
        assert_eq!(cfg.handler.content_type.as_deref(), Some("application/json"));
        assert_eq!(cfg.handler.accept.as_deref(), Some("application/json"));
        assert_eq!(cfg.handler.allow, vec!["GET".to_string(), "POST".to_string()]);
        assert_eq!(cfg.handler.negotiation, NegotiationHeader::ContentType);
        assert_eq!(cfg.access_log.format, LogFormat::Json);
        assert_eq!(cfg.access_log.capacity, 16);
        assert!(cfg.metrics.enabled);
        assert_eq!(cfg.metrics.path, "/prom");
    }

    #[test]
    fn load_yaml_with_invalid_capacity_fails() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "access_log:\n  capacity: 0\n").unwrap();
        assert!(VigilConfig::load(tmpfile.path()).is_err());
    }
}
