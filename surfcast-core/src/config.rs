use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{assemble::BreakingParams, location::Site, units::UnitSystem};

/// Forecast window requested from every model, in hours after the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Horizon {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for Horizon {
    fn default() -> Self {
        Self {
            start_hour: 0,
            end_hour: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Deadline for a single request, seconds.
    pub timeout_secs: u64,
    /// Deadline for all requests of one ingestion run, seconds.
    pub run_budget_secs: u64,
    /// Issue the wave and wind requests at the same time.
    pub concurrent: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            run_budget_secs: 480,
            concurrent: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_secs)
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// units = "imperial"
///
/// [site.wave]
/// name = "Block Island Sound"
/// latitude = 41.323
/// longitude = -71.396
/// elevation = 30.0
///
/// [breaking]
/// beach_angle = 145.0
/// beach_slope = 0.02
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub units: UnitSystem,
    /// Where snapshots are kept; the platform data directory when unset.
    pub data_dir: Option<PathBuf>,
    pub site: Site,
    pub horizon: Horizon,
    pub fetch: FetchConfig,
    pub breaking: BreakingParams,
}

impl Config {
    /// Load config from the default location, or defaults on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from `path`, or defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon.end_hour < self.horizon.start_hour {
            bail!(
                "horizon end_hour ({}) is before start_hour ({})",
                self.horizon.end_hour,
                self.horizon.start_hour
            );
        }
        if self.fetch.timeout_secs == 0 || self.fetch.run_budget_secs == 0 {
            bail!("fetch timeouts must be greater than zero");
        }

        // Negated comparisons so NaN is rejected too.
        let breaking = &self.breaking;
        if !breaking.beach_angle.is_finite() {
            bail!("breaking.beach_angle must be a finite bearing");
        }
        if !(breaking.beach_slope > 0.0 && breaking.beach_slope.is_finite()) {
            bail!("breaking.beach_slope must be positive");
        }
        if !(breaking.refraction_factor > 0.0 && breaking.refraction_factor.is_finite()) {
            bail!("breaking.refraction_factor must be positive");
        }
        if !(breaking.min_max_ratio >= 1.0 && breaking.min_max_ratio.is_finite()) {
            bail!("breaking.min_max_ratio must be at least 1");
        }

        for (role, location) in self.site.locations() {
            if !(-90.0..=90.0).contains(&location.latitude()) {
                bail!("{role} location '{}' has latitude out of range", location.name());
            }
            if !location.longitude().is_finite() || !location.elevation().is_finite() {
                bail!("{role} location '{}' has a non-finite coordinate", location.name());
            }
        }
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Snapshot store root, honoring `data_dir`.
    pub fn snapshot_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("snapshots")),
        }
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "surfcast", "surfcast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }
}
