// crates/backdrop-config/src/config.rs
// ============================================================================
// Module: Backdrop Configuration
// Description: Configuration loading and validation for the relay server.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: backdrop-core, backdrop-fetch, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `BACKDROP_CONFIG`, then
//! `./backdrop.toml`. Only the implicit default file may be absent, in which
//! case the built-in defaults apply. Anything present is validated before use.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use backdrop_core::OriginGuard;
use backdrop_fetch::DEFAULT_MAX_BODY_BYTES;
use backdrop_fetch::DEFAULT_MAX_REDIRECTS;
use backdrop_fetch::DEFAULT_USER_AGENT;
use backdrop_fetch::FetcherConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "backdrop.toml";
/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "BACKDROP_CONFIG";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum length of a whole path.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default listener address.
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:3000";
/// Default concurrent relay call cap.
pub(crate) const DEFAULT_MAX_INFLIGHT: usize = 64;
/// Upper bound for the concurrent relay call cap.
pub(crate) const MAX_INFLIGHT: usize = 4096;
/// Default trusted upstream origin.
pub(crate) const DEFAULT_ALLOWED_ORIGIN: &str = "https://steamcommunity.com/";
/// Maximum user agent length.
pub(crate) const MAX_USER_AGENT_LENGTH: usize = 512;
/// Default fetch timeout in milliseconds.
pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Minimum fetch timeout in milliseconds.
pub(crate) const MIN_TIMEOUT_MS: u64 = 100;
/// Maximum fetch timeout in milliseconds.
pub(crate) const MAX_TIMEOUT_MS: u64 = 60_000;
/// Minimum response body ceiling.
pub(crate) const MIN_BODY_BYTES: usize = 1024;
/// Maximum response body ceiling.
pub(crate) const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;
/// Maximum redirect hop limit.
pub(crate) const MAX_REDIRECTS: usize = 10;
/// Default catalog file ceiling.
pub(crate) const DEFAULT_CATALOG_MAX_BYTES: usize = 1024 * 1024;
/// Maximum catalog file ceiling.
pub(crate) const MAX_CATALOG_MAX_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Relay server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackdropConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Trusted upstream configuration.
    #[serde(default)]
    pub origin: OriginConfig,
    /// Outbound fetch limits.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Background catalog configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl BackdropConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = match fs::read(&resolved) {
            Ok(bytes) => bytes,
            Err(err) if !explicit && err.kind() == ErrorKind::NotFound => {
                let mut config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(err) => return Err(ConfigError::Io(err.to_string())),
        };
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
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
        self.origin.validate()?;
        self.fetch.validate()?;
        self.catalog.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Builds the fetcher limits from the fetch and origin sections.
    #[must_use]
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: self.fetch.timeout(),
            max_body_bytes: self.fetch.max_body_bytes,
            max_redirects: self.fetch.max_redirects,
            user_agent: self.origin.user_agent.clone(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum concurrent relay calls.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    /// Emit `access-control-allow-origin: *` on every response.
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_inflight: default_max_inflight(),
            cors_allow_any: true,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))
    }

    /// Validates listener settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_inflight == 0 {
            return Err(ConfigError::Invalid("max_inflight must be greater than zero".to_string()));
        }
        if self.max_inflight > MAX_INFLIGHT {
            return Err(ConfigError::Invalid(format!(
                "max_inflight must be at most {MAX_INFLIGHT}"
            )));
        }
        Ok(())
    }
}

/// Trusted upstream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    /// The single origin the relay may fetch from.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
    /// Identifying `User-Agent` sent upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
            user_agent: default_user_agent(),
        }
    }
}

impl OriginConfig {
    /// Builds the origin guard for the configured origin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the origin is not an absolute
    /// http(s) URL with a host.
    pub fn guard(&self) -> Result<OriginGuard, ConfigError> {
        let url = Url::parse(self.allowed_origin.trim())
            .map_err(|_| ConfigError::Invalid("origin.allowed_origin must be a url".to_string()))?;
        OriginGuard::new(&url)
            .map_err(|err| ConfigError::Invalid(format!("origin.allowed_origin rejected: {err}")))
    }

    /// Validates origin settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.guard()?;
        let agent = self.user_agent.trim();
        if agent.is_empty() {
            return Err(ConfigError::Invalid("origin.user_agent must be non-empty".to_string()));
        }
        if agent.len() > MAX_USER_AGENT_LENGTH {
            return Err(ConfigError::Invalid("origin.user_agent exceeds max length".to_string()));
        }
        if agent.chars().any(char::is_control) {
            return Err(ConfigError::Invalid(
                "origin.user_agent must not contain control characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outbound fetch limits.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Wall-clock budget per fetch in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Response body ceiling in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Maximum redirect hops followed.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl FetchConfig {
    /// Returns the timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates fetch limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TIMEOUT_MS ..= MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "fetch.timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"
            )));
        }
        if !(MIN_BODY_BYTES ..= MAX_BODY_BYTES).contains(&self.max_body_bytes) {
            return Err(ConfigError::Invalid(format!(
                "fetch.max_body_bytes must be between {MIN_BODY_BYTES} and {MAX_BODY_BYTES}"
            )));
        }
        if self.max_redirects > MAX_REDIRECTS {
            return Err(ConfigError::Invalid(format!(
                "fetch.max_redirects must be at most {MAX_REDIRECTS}"
            )));
        }
        Ok(())
    }
}

/// Background catalog configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Optional catalog file; the endpoint serves an empty list when absent.
    #[serde(default)]
    pub path: Option<String>,
    /// Catalog file ceiling in bytes.
    #[serde(default = "default_catalog_max_bytes")]
    pub max_bytes: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: default_catalog_max_bytes(),
        }
    }
}

impl CatalogConfig {
    /// Validates catalog settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("catalog.path", path)?;
        }
        if self.max_bytes == 0 || self.max_bytes > MAX_CATALOG_MAX_BYTES {
            return Err(ConfigError::Invalid(format!(
                "catalog.max_bytes must be between 1 and {MAX_CATALOG_MAX_BYTES}"
            )));
        }
        Ok(())
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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
// SECTION: Helpers
// ============================================================================

/// Resolves the config path and whether it was named explicitly.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
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
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Serde default for `server.bind`.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Serde default for `server.max_inflight`.
const fn default_max_inflight() -> usize {
    DEFAULT_MAX_INFLIGHT
}

/// Serde default for boolean switches that are on unless disabled.
const fn default_true() -> bool {
    true
}

/// Serde default for `origin.allowed_origin`.
fn default_allowed_origin() -> String {
    DEFAULT_ALLOWED_ORIGIN.to_string()
}

/// Serde default for `origin.user_agent`.
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Serde default for `fetch.timeout_ms`.
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Serde default for `fetch.max_body_bytes`.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Serde default for `fetch.max_redirects`.
const fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

/// Serde default for `catalog.max_bytes`.
const fn default_catalog_max_bytes() -> usize {
    DEFAULT_CATALOG_MAX_BYTES
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_path_string_rejects_whitespace_only() {
        assert!(validate_path_string("catalog.path", "   ").is_err());
    }

    #[test]
    fn validate_path_string_rejects_long_component() {
        let component = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        let err = validate_path_string("audit.path", &format!("logs/{component}"));
        assert_eq!(
            err,
            Err(ConfigError::Invalid("audit.path path component too long".to_string()))
        );
    }

    #[test]
    fn explicit_path_is_marked_explicit() {
        let (path, explicit) = resolve_path(Some(Path::new("custom.toml"))).unwrap_or_default();
        assert_eq!(path, PathBuf::from("custom.toml"));
        assert!(explicit);
    }
}
