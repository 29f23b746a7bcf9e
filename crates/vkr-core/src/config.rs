use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "VKR_CONFIG";

/// Per-context renderer settings, loaded from vkr.toml.
///
/// Passed explicitly at context construction so that contexts with different
/// settings can coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    /// Highest API version advertised to guests, as "major.minor".
    #[serde(default = "default_max_api_version")]
    pub max_api_version: String,
    #[serde(default)]
    pub extensions: ExtensionConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run one fence waiter thread per queue instead of polling.
    #[serde(default)]
    pub thread_sync: bool,
    /// Waiter threads report retired fences directly to the transport.
    /// Requires `thread_sync`.
    #[serde(default)]
    pub async_fence_callback: bool,
    /// How long a waiter thread blocks on a fence before re-checking for
    /// shutdown.
    #[serde(default = "default_waiter_timeout_ms")]
    pub waiter_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Enable the host validation layer on created instances
    #[serde(default)]
    pub validation: bool,
    /// Log every decoded command at debug level
    #[serde(default)]
    pub log_commands: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Device extensions never advertised to guests
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Make every allocation exportable when the guest did not ask for it.
    #[serde(default)]
    pub auto_export: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            debug: DebugConfig::default(),
            max_api_version: default_max_api_version(),
            extensions: ExtensionConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            thread_sync: false,
            async_fence_callback: false,
            waiter_timeout_ms: default_waiter_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub fn waiter_timeout(&self) -> Duration {
        Duration::from_millis(self.waiter_timeout_ms)
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        let config: RendererConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), "ignoring invalid config: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sync.async_fence_callback && !self.sync.thread_sync {
            return Err(CoreError::ConfigError(
                "sync.async_fence_callback requires sync.thread_sync".to_string(),
            ));
        }
        if self.sync.waiter_timeout_ms == 0 {
            return Err(CoreError::ConfigError(
                "sync.waiter_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.max_api_version()?;
        Ok(())
    }

    /// `max_api_version` packed the way the driver reports versions
    /// (variant 0, patch 0).
    pub fn max_api_version(&self) -> Result<u32, CoreError> {
        parse_api_version(&self.max_api_version)
    }
}

fn parse_api_version(value: &str) -> Result<u32, CoreError> {
    let invalid = || CoreError::ConfigError(format!("invalid max_api_version {:?}", value));
    let (major, minor) = value.trim().split_once('.').ok_or_else(invalid)?;
    let major: u32 = major.parse().map_err(|_| invalid())?;
    let minor: u32 = minor.parse().map_err(|_| invalid())?;
    if major == 0 || major > 0x7F || minor > 0x3FF {
        return Err(invalid());
    }
    Ok((major << 22) | (minor << 12))
}

/// Returns the config file path.
/// Search order:
/// 1. `$VKR_CONFIG`
/// 2. System-wide config: `/etc/vkr/vkr.toml`
/// 3. Local fallback: `./vkr.toml`
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let system_path = Path::new("/etc/vkr/vkr.toml");
    if system_path.exists() {
        return system_path.to_path_buf();
    }
    PathBuf::from("vkr.toml")
}

fn default_max_api_version() -> String {
    "1.3".to_string()
}

fn default_waiter_timeout_ms() -> u64 {
    100
}
