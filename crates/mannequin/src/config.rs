//! Configuration file handling.
//!
//! Every key is optional. A missing file is the same as an empty one.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::body::Complexity;
use crate::photo::DEFAULT_MAX_DIMENSION;

/// Conventional name of the configuration file.
pub const CONFIG_FILE: &str = "mannequin.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub photos: PhotoConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Directory holding the mesh assets and metadata.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Number of mannequins generated per gender.
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Converts body model units to metres.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,
    /// JSON body model, `{gender}` is substituted. The built-in procedural model is used if unset.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Generate the catalog when its metadata is missing.
    #[serde(default = "default_auto_generate")]
    pub auto_generate: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("static/mannequins")
}

fn default_count() -> usize {
    70
}

fn default_seed() -> u64 {
    7
}

fn default_scale_factor() -> f32 {
    1.0
}

fn default_auto_generate() -> bool {
    true
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            count: default_count(),
            seed: default_seed(),
            scale_factor: default_scale_factor(),
            model_path: None,
            auto_generate: default_auto_generate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoseConfig {
    /// ONNX landmark model. Defaults to the conventional file name for `complexity` in `models/`.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
}

fn default_min_detection_confidence() -> f32 {
    0.5
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            complexity: Complexity::default(),
            min_detection_confidence: default_min_detection_confidence(),
        }
    }
}

impl PoseConfig {
    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| Path::new("models").join(self.complexity.model_file_name()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhotoConfig {
    /// Photos are downscaled so that their longest side is at most this many pixels.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config '{}'", path.display()))
    }

    /// Loads the config at `path`, or returns the default config if the file doesn't exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::metadata(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("no config at '{}', using defaults", path.display());
                Ok(Self::default())
            }
            _ => Self::load(path),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
