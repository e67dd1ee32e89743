//! Configuration loading for a2a-relay.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::core::circuit::CircuitBreakerConfig;
use crate::core::rate_limit::RateLimitConfig;
use crate::core::routing::{BroadcastMode, Deliver, RouterOptions};
use crate::error::{Error, Result};
use crate::protocol::validator::{EnvelopeValidator, StrictValidator, Validate};

/// Get the a2a-relay home directory (~/.a2a-relay).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".a2a-relay"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.a2a-relay/settings.json
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load and validate settings from a specific file.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'a2a-relay config --init' first.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write settings as pretty JSON, creating the parent directory.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    validate_settings(settings)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    tracing::info!("Wrote settings to {}", path.display());
    Ok(())
}

/// Reject limits that would block or never reset all traffic.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if let Some(rl) = &settings.rate_limiter {
        if rl.max_per_window == 0 || rl.window_ms == 0 {
            return Err(Error::Config(
                "rate_limiter.max_per_window and rate_limiter.window_ms must be positive".to_string(),
            ));
        }
    }
    if let Some(cb) = &settings.circuit_breaker {
        if cb.max_correlation_depth == 0
            || cb.max_pair_messages_per_window == 0
            || cb.window_ms == 0
        {
            return Err(Error::Config(
                "circuit_breaker limits and window_ms must be positive".to_string(),
            ));
        }
    }
    if settings.audit.max_file_mb == 0 {
        return Err(Error::Config("audit.max_file_mb must be positive".to_string()));
    }
    Ok(())
}

/// Audit trail configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuditSettings {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Defaults to ~/.a2a-relay/audit
    pub log_dir: Option<PathBuf>,
    /// Recorded as `processedBy` on every entry
    pub processed_by: Option<String>,
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
}

fn default_audit_enabled() -> bool {
    true
}

fn default_max_file_mb() -> u64 {
    50
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_dir: None,
            processed_by: None,
            max_file_mb: default_max_file_mb(),
        }
    }
}

/// Routing configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Routing {
    #[serde(default)]
    pub broadcast: BroadcastMode,
    /// Check payloads against their per-type schema
    #[serde(default = "default_strict_payloads")]
    pub strict_payloads: bool,
}

fn default_strict_payloads() -> bool {
    true
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            broadcast: BroadcastMode::default(),
            strict_payloads: default_strict_payloads(),
        }
    }
}

/// Mailbox storage configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Mailboxes {
    /// Defaults to ~/.a2a-relay
    pub dir: Option<PathBuf>,
}

fn default_rate_limiter() -> Option<RateLimitConfig> {
    Some(RateLimitConfig::default())
}

fn default_circuit_breaker() -> Option<CircuitBreakerConfig> {
    Some(CircuitBreakerConfig::default())
}

/// a2a-relay settings.
///
/// `rate_limiter` and `circuit_breaker` may be set to `null` to disable them.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default = "default_rate_limiter")]
    pub rate_limiter: Option<RateLimitConfig>,

    #[serde(default = "default_circuit_breaker")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    #[serde(default)]
    pub routing: Routing,

    #[serde(default)]
    pub mailboxes: Mailboxes,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audit: AuditSettings::default(),
            rate_limiter: default_rate_limiter(),
            circuit_breaker: default_circuit_breaker(),
            routing: Routing::default(),
            mailboxes: Mailboxes::default(),
        }
    }
}

impl Settings {
    /// Directory holding the audit files.
    pub fn audit_log_dir(&self) -> Result<PathBuf> {
        match &self.audit.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_home_dir()?.join("audit")),
        }
    }

    /// Base directory for mailbox files.
    pub fn mailbox_dir(&self) -> Result<PathBuf> {
        match &self.mailboxes.dir {
            Some(dir) => Ok(dir.clone()),
            None => get_home_dir(),
        }
    }

    /// Validator matching `routing.strict_payloads`.
    pub fn validator(&self) -> Arc<dyn Validate> {
        if self.routing.strict_payloads {
            Arc::new(StrictValidator)
        } else {
            Arc::new(EnvelopeValidator)
        }
    }

    /// Router options for these settings.
    pub fn router_options(
        &self,
        deliver: Arc<dyn Deliver>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> RouterOptions {
        RouterOptions {
            deliver,
            validator: self.validator(),
            audit,
            rate_limiter: self.rate_limiter,
            circuit_breaker: self.circuit_breaker,
            broadcast: self.routing.broadcast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(settings.audit.enabled);
        assert_eq!(settings.audit.max_file_mb, 50);
        assert_eq!(settings.rate_limiter, Some(RateLimitConfig::default()));
        assert_eq!(settings.circuit_breaker, Some(CircuitBreakerConfig::default()));
        assert_eq!(settings.routing.broadcast, BroadcastMode::Logical);
        assert!(settings.routing.strict_payloads);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_partial_settings() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "audit": {"log_dir": "/var/log/a2a", "processed_by": "relay-1"},
                "rate_limiter": {"max_per_window": 10, "window_ms": 1000},
                "circuit_breaker": null,
                "routing": {"broadcast": "fan_out"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.audit_log_dir().unwrap(), PathBuf::from("/var/log/a2a"));
        assert_eq!(settings.audit.processed_by.as_deref(), Some("relay-1"));
        assert_eq!(settings.rate_limiter.unwrap().max_per_window, 10);
        assert!(settings.circuit_breaker.is_none());
        assert_eq!(settings.routing.broadcast, BroadcastMode::FanOut);
        assert!(settings.routing.strict_payloads);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut settings = Settings::default();
        settings.rate_limiter = Some(RateLimitConfig {
            max_per_window: 0,
            window_ms: 1000,
        });
        assert!(matches!(validate_settings(&settings), Err(Error::Config(_))));

        let mut settings = Settings::default();
        settings.circuit_breaker = Some(CircuitBreakerConfig {
            window_ms: 0,
            ..CircuitBreakerConfig::default()
        });
        assert!(validate_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.audit.max_file_mb = 0;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");
        assert!(matches!(load_settings_from(&path), Err(Error::Config(_))));

        let mut settings = Settings::default();
        settings.routing.strict_payloads = false;
        settings.mailboxes.dir = Some(temp_dir.path().to_path_buf());
        save_settings(&settings, &path).unwrap();

        let loaded = load_settings_from(&path).unwrap();
        assert!(!loaded.routing.strict_payloads);
        assert_eq!(loaded.mailbox_dir().unwrap(), temp_dir.path());
    }
}
