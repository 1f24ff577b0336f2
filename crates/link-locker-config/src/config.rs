// crates/link-locker-config/src/config.rs
// ============================================================================
// Module: Link Locker Configuration
// Description: Configuration loading and validation for the link locker.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: link-locker-core, link-locker-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has serde defaults, so a file only needs `[server] bind`.
//! Missing or invalid configuration fails closed: the server never starts
//! on a half-valid config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use link_locker_core::CountryCode;
use link_locker_core::EngineConfig;
use link_locker_core::GeoInfo;
use link_locker_core::ReconciliationPolicy;
use link_locker_core::Tier;
use link_locker_core::runtime::DEFAULT_CLICK_PARAM;
use link_locker_core::runtime::DEFAULT_COOLDOWN_HOURS;
use link_locker_store_sqlite::SqliteStoreConfig;
use link_locker_store_sqlite::SqliteStoreMode;
use link_locker_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "link-locker.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "LINK_LOCKER_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for the per-request handler timeout.
pub(crate) const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;
/// Upper bound for the accepted request body size.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Minimum geolocation lookup timeout.
pub(crate) const MIN_GEO_TIMEOUT_MS: u64 = 100;
/// Maximum geolocation lookup timeout.
pub(crate) const MAX_GEO_TIMEOUT_MS: u64 = 10_000;
/// Maximum geolocation response size.
pub(crate) const MAX_GEO_RESPONSE_BYTES: usize = 1024 * 1024;
/// Maximum eligibility window.
pub(crate) const MAX_COOLDOWN_HOURS: u32 = 720;
/// Maximum length of the click tracking parameter.
pub(crate) const MAX_CLICK_PARAM_LENGTH: usize = 64;
/// Placeholder replaced by the visitor IP in the geolocation endpoint.
pub const GEO_IP_PLACEHOLDER: &str = "{ip}";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Link locker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkLockerConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Geolocation configuration.
    #[serde(default)]
    pub geo: GeoConfig,
    /// Eligibility gate configuration.
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    /// Attribution configuration.
    #[serde(default)]
    pub attribution: AttributionConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl LinkLockerConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is `path` when given, else `LINK_LOCKER_CONFIG`, else
    /// `./link-locker.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.geo.validate()?;
        self.eligibility.validate()?;
        self.attribution.validate()?;
        Ok(())
    }

    /// Returns the engine configuration described by this file.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cooldown_hours: self.eligibility.cooldown_hours,
            reconciliation: self.attribution.reconciliation,
            click_param: self.attribution.click_param.trim().to_string(),
            default_country: self.geo.default_country.clone(),
            default_tier: self.geo.default_tier,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default)]
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Upper bound on handler run time in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: None,
            max_body_bytes: default_max_body_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address is missing or invalid.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or_default().trim();
        if bind.is_empty() {
            return Err(ConfigError::Invalid("server.bind is required".to_string()));
        }
        bind.parse().map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("max_body_bytes exceeds limit".to_string()));
        }
        validate_timeout_range(
            "server.request_timeout_ms",
            self.request_timeout_ms,
            1,
            MAX_REQUEST_TIMEOUT_MS,
        )?;
        self.audit.validate()
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` store configuration for the sqlite backend.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_store_path(path)?;
                if self.busy_timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "store busy_timeout_ms must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite` store.
    Sqlite,
}

/// Geolocation lookup mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeoMode {
    /// Every visitor gets the default country and tier.
    #[default]
    Disabled,
    /// Query an HTTP lookup service.
    Http,
}

/// Geolocation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoConfig {
    /// Lookup mode.
    #[serde(default)]
    pub mode: GeoMode,
    /// Lookup URL template containing `{ip}`; required for http mode.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Lookup timeout in milliseconds.
    #[serde(default = "default_geo_timeout_ms")]
    pub timeout_ms: u64,
    /// Country used when the lookup fails or is disabled.
    #[serde(default = "CountryCode::us")]
    pub default_country: CountryCode,
    /// Tier used when the lookup fails or is disabled.
    #[serde(default = "default_geo_tier")]
    pub default_tier: Tier,
    /// Maximum accepted lookup response size.
    #[serde(default = "default_geo_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            mode: GeoMode::default(),
            endpoint: None,
            timeout_ms: default_geo_timeout_ms(),
            default_country: CountryCode::us(),
            default_tier: default_geo_tier(),
            max_response_bytes: default_geo_max_response_bytes(),
        }
    }
}

impl GeoConfig {
    /// Returns the fallback answer for failed or disabled lookups.
    #[must_use]
    pub fn fallback(&self) -> GeoInfo {
        GeoInfo::fallback(self.default_country.clone(), self.default_tier)
    }

    /// Validates geolocation configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout_range(
            "geo.timeout_ms",
            self.timeout_ms,
            MIN_GEO_TIMEOUT_MS,
            MAX_GEO_TIMEOUT_MS,
        )?;
        if self.max_response_bytes == 0 || self.max_response_bytes > MAX_GEO_RESPONSE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "geo.max_response_bytes must be between 1 and {MAX_GEO_RESPONSE_BYTES}"
            )));
        }
        match self.mode {
            GeoMode::Disabled => Ok(()),
            GeoMode::Http => {
                let endpoint = self.endpoint.as_deref().unwrap_or_default().trim();
                if endpoint.is_empty() {
                    return Err(ConfigError::Invalid("http geo mode requires endpoint".to_string()));
                }
                if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
                    return Err(ConfigError::Invalid(
                        "geo.endpoint must include http:// or https://".to_string(),
                    ));
                }
                if !endpoint.contains(GEO_IP_PLACEHOLDER) {
                    return Err(ConfigError::Invalid(
                        "geo.endpoint must contain the {ip} placeholder".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Eligibility gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityConfig {
    /// Window length in hours.
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u32,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: default_cooldown_hours(),
        }
    }
}

impl EligibilityConfig {
    /// Validates eligibility configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cooldown_hours == 0 || self.cooldown_hours > MAX_COOLDOWN_HOURS {
            return Err(ConfigError::Invalid(format!(
                "eligibility.cooldown_hours must be between 1 and {MAX_COOLDOWN_HOURS}"
            )));
        }
        Ok(())
    }
}

/// Attribution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    /// Cross-path reconciliation policy.
    #[serde(default)]
    pub reconciliation: ReconciliationPolicy,
    /// Query parameter carrying the click id on outbound ad URLs.
    #[serde(default = "default_click_param")]
    pub click_param: String,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            reconciliation: ReconciliationPolicy::default(),
            click_param: default_click_param(),
        }
    }
}

impl AttributionConfig {
    /// Validates attribution configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let param = self.click_param.trim();
        if param.is_empty() {
            return Err(ConfigError::Invalid(
                "attribution.click_param must be non-empty".to_string(),
            ));
        }
        if param.len() > MAX_CLICK_PARAM_LENGTH {
            return Err(ConfigError::Invalid(
                "attribution.click_param exceeds max length".to_string(),
            ));
        }
        if !param.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
            return Err(ConfigError::Invalid(
                "attribution.click_param must be alphanumeric, '_' or '-'".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default maximum request body size in bytes.
const fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Default handler timeout in milliseconds.
const fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Audit logging is on unless disabled.
const fn default_audit_enabled() -> bool {
    true
}

/// Default `SQLite` busy timeout in milliseconds.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

/// Default geolocation timeout in milliseconds.
const fn default_geo_timeout_ms() -> u64 {
    1_500
}

/// Default fallback tier.
const fn default_geo_tier() -> Tier {
    Tier::Tier1
}

/// Default geolocation response cap.
const fn default_geo_max_response_bytes() -> usize {
    16 * 1024
}

/// Default eligibility window.
const fn default_cooldown_hours() -> u32 {
    DEFAULT_COOLDOWN_HOURS
}

/// Default click tracking parameter.
fn default_click_param() -> String {
    DEFAULT_CLICK_PARAM.to_string()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates store paths against security limits.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("store path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a millisecond value against an inclusive range.
fn validate_timeout_range(
    field: &str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<(), ConfigError> {
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {min_ms} and {max_ms} milliseconds",
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn timeout_range_is_inclusive() {
        assert!(validate_timeout_range("t", 100, 100, 200).is_ok());
        assert!(validate_timeout_range("t", 200, 100, 200).is_ok());
        assert!(validate_timeout_range("t", 99, 100, 200).is_err());
        assert!(validate_timeout_range("t", 201, 100, 200).is_err());
    }

    #[test]
    fn path_string_rejects_blank_and_long_components() {
        let blank = validate_path_string("audit.path", "   ").unwrap_err();
        assert_eq!(blank.to_string(), "invalid config: audit.path must be non-empty");
        let long = format!("logs/{}", "a".repeat(300));
        let err = validate_path_string("audit.path", &long).unwrap_err();
        assert!(err.to_string().contains("audit.path path component too long"));
    }

    #[test]
    fn explicit_path_wins_over_environment() {
        let resolved = resolve_path(Some(Path::new("custom.toml"))).unwrap();
        assert_eq!(resolved, PathBuf::from("custom.toml"));
    }

    #[test]
    fn sqlite_config_only_for_sqlite_backend() {
        let mut store = StoreConfig::default();
        assert!(store.sqlite_config().is_none());
        store.store_type = StoreType::Sqlite;
        store.path = Some(PathBuf::from("ll.db"));
        store.busy_timeout_ms = 250;
        let sqlite = store.sqlite_config().unwrap();
        assert_eq!(sqlite.path, PathBuf::from("ll.db"));
        assert_eq!(sqlite.busy_timeout_ms, 250);
    }
}
