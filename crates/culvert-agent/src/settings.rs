//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Daemon settings: TOML file with env override and discovery."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use culvert_logging::LoggingSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ENV_SETTINGS_PATH: &str = "CULVERT_CONFIG";
const CANDIDATE_PATHS: &[&str] = &["culvert.toml", "/etc/culvert/culvert.toml"];

/// Where the effective settings came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    /// Path passed explicitly (CLI flag).
    Explicit(PathBuf),
    /// Path taken from `CULVERT_CONFIG`.
    Environment(PathBuf),
    /// First existing candidate path.
    Discovered(PathBuf),
    /// No file found anywhere; compiled-in defaults.
    Defaults,
}

/// Daemon settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    /// The systemd unit under control.
    pub unit: String,
    /// Control endpoint listen address.
    pub listen: SocketAddr,
    /// Path of the supervised agent's config document.
    pub config_path: PathBuf,
    /// How many journal entries the recent-logs endpoint returns.
    pub recent_log_count: usize,
    /// Optional directory of static assets served alongside the API.
    pub static_dir: Option<PathBuf>,
    /// Daemon logging settings.
    pub logging: LoggingSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            unit: "cloudflared.service".to_string(),
            listen: default_listen(),
            config_path: PathBuf::from("/etc/culvert/config.json"),
            recent_log_count: 100,
            static_dir: None,
            logging: LoggingSettings::default(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl AgentSettings {
    /// Load settings: explicit path, `CULVERT_CONFIG`, then discovery; with
    /// no file anywhere, compiled-in defaults.
    pub fn load(path: Option<&Path>) -> Result<(Self, SettingsSource)> {
        if let Some(path) = path {
            let settings = Self::from_path(path)?;
            return Ok((settings, SettingsSource::Explicit(path.to_path_buf())));
        }

        if let Ok(env_path) = std::env::var(ENV_SETTINGS_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let settings = Self::from_path(&path)?;
                return Ok((settings, SettingsSource::Environment(path)));
            }
        }

        for candidate in CANDIDATE_PATHS {
            let path = Path::new(candidate);
            if path.exists() {
                let settings = Self::from_path(path)?;
                return Ok((settings, SettingsSource::Discovered(path.to_path_buf())));
            }
        }

        Ok((Self::default(), SettingsSource::Defaults))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(settings_path = %path.display(), "loading daemon settings");
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read settings file {}", path.display()))?;
        let settings: AgentSettings = toml::from_str(&contents)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Structural checks on the document.
    pub fn validate(&self) -> Result<()> {
        if self.unit.trim().is_empty() {
            bail!("unit must not be empty");
        }
        if self.recent_log_count == 0 {
            bail!("recent_log_count must be at least 1");
        }
        Ok(())
    }
}
