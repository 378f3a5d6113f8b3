use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "ANISTREAM";
pub const DEFAULT_BASE_URL: &str = "https://anime-iota-nine.vercel.app";
const DEFAULT_USER_AGENT: &str = concat!("anistream/", env!("CARGO_PKG_VERSION"));

/// Where a listing endpoint keeps its array inside `results`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListShape {
    /// `results.data` is the array.
    Wrapped,
    /// `results` itself is the array.
    Bare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub user_agent: String,
    /// Language assigned to subtitle tracks that do not declare one.
    pub subtitle_language: String,
    pub search_shape: ListShape,
    pub listing_shape: ListShape,
    pub history: bool,
    pub player: PlayerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub command: String,
    /// Extra arguments, split shell-style.
    pub args: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            subtitle_language: String::from("en"),
            search_shape: ListShape::Wrapped,
            listing_shape: ListShape::Wrapped,
            history: true,
            player: PlayerSettings::default(),
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            command: String::from("mpv"),
            args: String::new(),
        }
    }
}

impl PlayerSettings {
    pub fn split_args(&self) -> Result<Vec<String>> {
        shlex::split(&self.args)
            .ok_or_else(|| anyhow!("player.args is not valid shell syntax: {}", self.args))
    }
}

impl Settings {
    /// Defaults, then the TOML file (explicit path or the per-user one),
    /// then `ANISTREAM_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        match explicit {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Ok(path) = settings_path() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .with_context(|| format!("base_url is not a valid URL: {}", self.base_url))?;
        if self.player.command.trim().is_empty() {
            return Err(anyhow!("player.command must not be empty"));
        }
        self.player.split_args()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

pub fn settings_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join("anistream").join("config.toml"))
}
