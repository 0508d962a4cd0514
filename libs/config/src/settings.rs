//! Settings Loading Module
//!
//! Provides configuration loading for the router service.
//! Supports an optional TOML file with `SOR_`-prefixed environment overrides
//! (nested keys use `__`, e.g. `SOR_ROUTER__MAX_HOPS=3`).

use crate::router::RouterConfig;
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SOR";

/// Top-level router service settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SorSettings {
    /// Pool snapshot in the indexer JSON shape
    pub snapshot_path: Option<PathBuf>,
    /// Optional on-chain balance refresh applied on top of the snapshot
    pub refresh_path: Option<PathBuf>,
    /// Routing engine parameters
    pub router: RouterConfig,
}

impl SorSettings {
    /// Load settings from an optional file with environment overrides
    ///
    /// A missing `path` means defaults plus environment only; a `path` that
    /// does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading router settings: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        settings.expand_env_vars()?;
        settings
            .router
            .validate()
            .context("Invalid router configuration")?;

        debug!(?settings, "Router settings loaded");
        Ok(settings)
    }

    /// Expand environment variables in path values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(snapshot) = &self.snapshot_path {
            let expanded = shellexpand::full(&snapshot.to_string_lossy())
                .context("Failed to expand snapshot path")?
                .to_string();
            self.snapshot_path = Some(PathBuf::from(expanded));
        }

        if let Some(refresh) = &self.refresh_path {
            let expanded = shellexpand::full(&refresh.to_string_lossy())
                .context("Failed to expand refresh path")?
                .to_string();
            self.refresh_path = Some(PathBuf::from(expanded));
        }

        Ok(())
    }

    /// Render the settings as TOML, the format `load` reads
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("router.toml");

        let config_content = r#"
snapshot_path = "/var/lib/sor/pools.json"

[router]
max_hops = 3
convergence_tolerance = "0.0000001"
gas_units_per_swap = 85000
"#;

        fs::write(&config_path, config_content).unwrap();

        let settings = SorSettings::load(Some(&config_path)).unwrap();

        assert_eq!(
            settings.snapshot_path,
            Some(PathBuf::from("/var/lib/sor/pools.json"))
        );
        assert_eq!(settings.refresh_path, None);
        assert_eq!(settings.router.max_hops, 3);
        assert_eq!(settings.router.convergence_tolerance, dec!(0.0000001));
        assert_eq!(settings.router.gas_units_per_swap, 85_000);
        // Unset keys keep their defaults
        assert_eq!(
            settings.router.max_candidate_paths,
            crate::router::defaults::MAX_CANDIDATE_PATHS
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let result = SorSettings::load(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("router.toml");
        fs::write(&config_path, "[router]\nmax_hops = 0\n").unwrap();

        assert!(SorSettings::load(Some(&config_path)).is_err());
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("router.toml");
        fs::write(&config_path, "[router]\ncalibration_timeout_ms = 500\n").unwrap();

        std::env::set_var("SOR_ROUTER__CALIBRATION_TIMEOUT_MS", "750");
        let settings = SorSettings::load(Some(&config_path));
        std::env::remove_var("SOR_ROUTER__CALIBRATION_TIMEOUT_MS");

        assert_eq!(settings.unwrap().router.calibration_timeout_ms, 750);
    }

    #[test]
    fn test_toml_round_trip() {
        let settings = SorSettings {
            snapshot_path: Some(PathBuf::from("pools.json")),
            ..SorSettings::default()
        };
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("round_trip.toml");
        fs::write(&config_path, settings.to_toml().unwrap()).unwrap();

        let loaded = SorSettings::load(Some(&config_path)).unwrap();
        assert_eq!(loaded.snapshot_path, settings.snapshot_path);
        assert_eq!(loaded.router.max_hops, settings.router.max_hops);
        assert_eq!(
            loaded.router.convergence_tolerance,
            settings.router.convergence_tolerance
        );
    }
}
