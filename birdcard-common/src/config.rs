//! Configuration loading and config file resolution
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. `BIRDCARD_CONFIG` environment variable
//! 3. User then system TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is not fatal: the engine logs a warning and starts
//! with compiled defaults. A config file that exists but fails to parse is.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::SelectionTier;
use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BIRDCARD_CONFIG";

/// Top-level engine configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub target: TargetConfig,
    pub location: LocationConfig,
    pub session: SessionConfig,
    pub regionality: RegionalityConfig,
    pub selection: SelectionConfig,
    pub collaborators: CollaboratorConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (host:port)
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Target used when an event does not name one
    pub default_target_id: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            default_target_id: "CARD1".to_string(),
        }
    }
}

/// Coordinates the IP provider returns when it does not really know
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SentinelLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Decimal places kept when bucketing coordinates (1 ≈ 11 km)
    pub bucket_decimals: u8,
    pub sentinels: Vec<SentinelLocation>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            bucket_decimals: 1,
            // Country centroid used by common IP databases for "somewhere in the US"
            sentinels: vec![SentinelLocation {
                latitude: 37.751,
                longitude: -97.822,
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of one playback sitting
    pub ttl_secs: u64,
    /// Interval of the background expiry sweep
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegionalityConfig {
    pub radius_km: f64,
    pub window_days: u32,
}

impl Default for RegionalityConfig {
    fn default() -> Self {
        Self {
            radius_km: 50.0,
            window_days: 14,
        }
    }
}

/// One entry of the fixed anchor rotation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnchorConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl AnchorConfig {
    fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Tiers tried, in order, when choosing an item for a key
    pub fallback_order: Vec<SelectionTier>,
    /// Serve unresolved observers read-only from the global tier
    pub bypass_cache_for_unresolved: bool,
    /// Whole days of records kept behind today (UTC) before the sweep evicts them
    pub retain_days: u32,
    pub anchors: Vec<AnchorConfig>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            fallback_order: vec![
                SelectionTier::LocationSource,
                SelectionTier::GlobalCache,
                SelectionTier::Anchor,
            ],
            bypass_cache_for_unresolved: false,
            retain_days: 2,
            anchors: default_anchors(),
        }
    }
}

/// Built-in anchor rotation (well-known birding hotspots)
pub fn default_anchors() -> Vec<AnchorConfig> {
    vec![
        AnchorConfig::new("Central Park, New York", 40.78, -73.97),
        AnchorConfig::new("Golden Gate Park, San Francisco", 37.77, -122.45),
        AnchorConfig::new("High Island, Texas", 29.56, -94.39),
        AnchorConfig::new("Magee Marsh, Ohio", 41.63, -83.19),
        AnchorConfig::new("Cape May, New Jersey", 38.94, -74.91),
        AnchorConfig::new("Point Pelee, Ontario", 41.96, -82.52),
        AnchorConfig::new("Hyde Park, London", 51.51, -0.17),
    ]
}

/// Endpoints and credentials of the external collaborators
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub ip_geo_url: String,
    pub device_registry_url: Option<String>,
    pub device_registry_token: Option<String>,
    pub observations_url: String,
    pub observations_token: Option<String>,
    pub publish_url: Option<String>,
    pub publish_token: Option<String>,
    /// Base URL of rendered track audio (`{base}/{item}/{kind}.mp3`)
    pub asset_base_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Outbound rate limit per collaborator
    pub requests_per_second: u32,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            ip_geo_url: "http://ip-api.com".to_string(),
            device_registry_url: None,
            device_registry_token: None,
            observations_url: "https://api.ebird.org/v2".to_string(),
            observations_token: None,
            publish_url: None,
            publish_token: None,
            asset_base_url: "http://127.0.0.1:5740/assets".to_string(),
            timeout_secs: 15,
            connect_timeout_secs: 5,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Populate the global record for the UTC day in the background
    pub global_refresh_enabled: bool,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            global_refresh_enabled: false,
            interval_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from disk
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve and load the config file, falling back to compiled defaults
    ///
    /// Returns the config and the file it came from (None for defaults).
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration");
                Ok((Self::load(&path)?, Some(path)))
            }
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Config file not found, using compiled defaults"
                );
                Ok((Self::default(), None))
            }
            None => {
                warn!("No config file found, using compiled defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.location.bucket_decimals > 4 {
            return Err(Error::Config(format!(
                "location.bucket_decimals must be 0-4, got {}",
                self.location.bucket_decimals
            )));
        }
        if self.session.ttl_secs == 0 {
            return Err(Error::Config("session.ttl_secs must be positive".to_string()));
        }
        if self.selection.fallback_order.is_empty() {
            return Err(Error::Config(
                "selection.fallback_order must name at least one tier".to_string(),
            ));
        }
        if self.selection.anchors.is_empty()
            && self.selection.fallback_order.contains(&SelectionTier::Anchor)
        {
            return Err(Error::Config(
                "selection.anchors is empty but the anchor tier is enabled".to_string(),
            ));
        }
        if self.selection.retain_days == 0 {
            return Err(Error::Config(
                "selection.retain_days must be at least 1 (local days lag UTC by up to one)"
                    .to_string(),
            ));
        }
        if self.collaborators.requests_per_second == 0 {
            return Err(Error::Config(
                "collaborators.requests_per_second must be positive".to_string(),
            ));
        }
        if self.target.default_target_id.trim().is_empty() {
            return Err(Error::Config("target.default_target_id is empty".to_string()));
        }
        Ok(())
    }
}

/// Resolve the config file path following the priority order above
///
/// Returns the highest-priority candidate. Explicit candidates (CLI, env) are
/// returned even when missing so the caller can report them.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: user config, then system config
    default_config_file()
}

/// Platform config file location, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("birdcard").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/birdcard/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.session.ttl_secs, 900);
        assert_eq!(config.location.bucket_decimals, 1);
        assert_eq!(config.selection.anchors.len(), 7);
        assert_eq!(config.target.default_target_id, "CARD1");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [session]
            ttl_secs = 600

            [selection]
            fallback_order = ["global_cache", "anchor"]
            "#,
        )
        .unwrap();
        assert_eq!(config.session.ttl_secs, 600);
        assert_eq!(config.session.sweep_interval_secs, 60);
        assert_eq!(
            config.selection.fallback_order,
            vec![SelectionTier::GlobalCache, SelectionTier::Anchor]
        );
        assert_eq!(config.selection.anchors.len(), 7);
        assert_eq!(config.server.bind, "127.0.0.1:5740");
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = EngineConfig::default();
        config.session.ttl_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = EngineConfig::default();
        config.selection.retain_days = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.selection.retain_days = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_anchor_tier_without_anchors() {
        let mut config = EngineConfig::default();
        config.selection.anchors.clear();
        assert!(config.validate().is_err());

        config.selection.fallback_order = vec![SelectionTier::LocationSource];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = Path::new("/tmp/birdcard-cli.toml");
        assert_eq!(resolve_config_path(Some(path)), Some(path.to_path_buf()));
    }
}
