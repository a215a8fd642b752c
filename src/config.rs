//! Loading of the optional `pixely.toml` and merging of command line
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::encoder::FrameTiming;

pub const CONFIG_FILE_NAME: &str = "pixely.toml";

const MAX_SCALE: u32 = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Frame rate as written by the user. Text is kept verbatim so it goes
/// through the same lenient parsing as the `--fps` flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FpsSetting {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GifConfig {
    #[serde(default)]
    pub fps: Option<FpsSetting>,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_scale() -> u32 {
    1
}

fn default_output() -> PathBuf {
    PathBuf::from("animation.gif")
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            fps: None,
            scale: default_scale(),
            output: default_output(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PixelyConfig {
    #[serde(default)]
    pub gif: GifConfig,
}

impl PixelyConfig {
    pub fn timing(&self) -> FrameTiming {
        match &self.gif.fps {
            Some(FpsSetting::Number(fps)) => FrameTiming::from_fps(*fps),
            Some(FpsSetting::Text(text)) => FrameTiming::parse(Some(text.as_str())),
            None => FrameTiming::parse(None),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SCALE).contains(&self.gif.scale) {
            return Err(ConfigError::Validation(format!(
                "gif.scale must be between 1 and {MAX_SCALE}, got {}",
                self.gif.scale
            )));
        }
        if self.gif.output.as_os_str().is_empty() {
            return Err(ConfigError::Validation("gif.output must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub fps: Option<String>,
    pub scale: Option<u32>,
    pub output: Option<PathBuf>,
}

/// Loads `path` if given, otherwise `./pixely.toml` when it exists, otherwise
/// the defaults.
pub fn load_config(path: Option<&Path>) -> Result<PixelyConfig, ConfigError> {
    match path {
        Some(path) => load_config_file(path),
        None => {
            let path = Path::new(CONFIG_FILE_NAME);
            if path.exists() {
                load_config_file(path)
            } else {
                debug!("no {CONFIG_FILE_NAME} found, using defaults");
                Ok(PixelyConfig::default())
            }
        }
    }
}

fn load_config_file(path: &Path) -> Result<PixelyConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PixelyConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;

    debug!("loaded config from {}", path.display());
    Ok(config)
}

pub fn merge_cli_overrides(config: &mut PixelyConfig, overrides: &CliOverrides) -> Result<(), ConfigError> {
    if let Some(fps) = &overrides.fps {
        config.gif.fps = Some(FpsSetting::Text(fps.clone()));
    }
    if let Some(scale) = overrides.scale {
        config.gif.scale = scale;
    }
    if let Some(output) = &overrides.output {
        config.gif.output = output.clone();
    }
    config.validate()
}
