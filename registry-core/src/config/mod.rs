//! Configuration surface (spec §6.4).
//!
//! Default config location: `~/.schema-registry/config.toml`. Every
//! option can be overridden by an environment variable whose name
//! mirrors the option path (e.g. `SCHEMA_REGISTRY_SERVER__BIND_ADDR`),
//! applied on top of the file via `apply_env_overrides`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use registry_storage::model::CompatibilityLevel;

/// Top-level configuration, following the teacher's `Config` shape
/// (`server`/`storage`/`security`/`observability`, env overrides
/// matching option names).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub compatibility: CompatibilityConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Maximum request body size in bytes (default: 10MB; schemas are
    /// text, not the megabyte payloads a search-engine document store
    /// would expect).
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Default per-request timeout the transport imposes (spec §5).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8081".to_string()
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            tls: TlsConfig::default(),
            max_body_size: default_max_body_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

/// Shape only: this crate never terminates TLS itself (spec §1 lists TLS
/// termination as an external-collaborator concern), but the config
/// surface still carries it so an adapter deployment can read it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tls_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_tls_key_path")]
    pub key_path: PathBuf,
}

fn default_tls_cert_path() -> PathBuf {
    PathBuf::from("./conf/tls/cert.pem")
}

fn default_tls_key_path() -> PathBuf {
    PathBuf::from("./conf/tls/key.pem")
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: default_tls_cert_path(),
            key_path: default_tls_key_path(),
        }
    }
}

/// Storage backend selection (spec §4.1, §6.4). Mirrors
/// `registry_storage::factory::StorageKind` one-to-one; kept as a
/// separate, serde-friendly type so the storage crate does not need to
/// depend on config parsing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(rename = "type", default = "default_storage_type")]
    pub storage_type: String,
    /// Connection string for any non-memory backend. Unused by `memory`.
    #[serde(default)]
    pub connection: Option<String>,
}

fn default_storage_type() -> String {
    "memory".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: default_storage_type(),
            connection: None,
        }
    }
}

impl StorageConfig {
    pub fn to_storage_kind(&self) -> Result<registry_storage::factory::StorageKind> {
        self.storage_type
            .parse()
            .map_err(|e: String| anyhow!(e))
    }
}

/// Default compatibility level applied when neither a per-subject nor a
/// global `ConfigRecord` has been set (spec §4.4 step 5 falls back to
/// `BACKWARD`; this lets a deployment pick a different baseline).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompatibilityConfig {
    #[serde(default)]
    pub default_level: CompatibilityLevel,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            default_level: CompatibilityLevel::Backward,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    /// Role assumed by unauthenticated requests when `enabled = false`.
    #[serde(default = "default_role")]
    pub default_role: String,
}

fn default_role() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoleConfig {
    /// Subject-name glob pattern (trailing `*` only) -> permitted actions
    /// (`read`, `write`, `delete`, `admin`, or `*`).
    #[serde(default)]
    pub subjects: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// "pretty" or "json". Overridden by `LOG_FORMAT`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Whether docs (OpenAPI) are exposed — shape only, spec §1.
    #[serde(default = "default_true")]
    pub docs_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,registry_core=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
            docs_enabled: true,
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".schema-registry")
}

impl Config {
    /// Load from `~/.schema-registry/config.toml`, or defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_dir().join("config.toml"))
    }

    /// Load from an explicit file path, creating a default file if one
    /// does not yet exist (matching the teacher's `load_or_create`).
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(path);
            config
        };
        config.expand_paths()?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.expand_paths()?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn expand_paths(&mut self) -> Result<()> {
        if self.server.tls.enabled {
            self.server.tls.cert_path = expand_tilde(&self.server.tls.cert_path)?;
            self.server.tls.key_path = expand_tilde(&self.server.tls.key_path)?;
        }
        Ok(())
    }

    /// Apply environment overrides matching option names (spec §6.4).
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SCHEMA_REGISTRY_LISTEN") {
            self.server.bind_addr = v;
        }
        if let Ok(v) = std::env::var("SCHEMA_REGISTRY_STORAGE_TYPE") {
            self.storage.storage_type = v;
        }
        if let Ok(v) = std::env::var("SCHEMA_REGISTRY_DEFAULT_COMPATIBILITY") {
            if let Ok(level) = v.parse() {
                self.compatibility.default_level = level;
            }
        }
        if let Ok(v) = std::env::var("SCHEMA_REGISTRY_AUTH_ENABLED") {
            self.security.enabled = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Ok(v) = std::env::var("LOG_FORMAT") {
            self.observability.log_format = v;
        }
        if let Ok(v) = std::env::var("RUST_LOG") {
            self.observability.log_level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.bind_addr, config.server.bind_addr);
        assert_eq!(
            parsed.compatibility.default_level,
            config.compatibility.default_level
        );
    }

    #[test]
    fn storage_type_parses_to_kind() {
        let config = StorageConfig::default();
        let kind = config.to_storage_kind().unwrap();
        assert_eq!(kind, registry_storage::factory::StorageKind::Memory);
    }
}
