//! Viewer settings, loadable from a JSON file. Every field has a default,
//! so a config file only needs the settings it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::views::alloc_tree::AllocTreeOptions;
use crate::views::memgraph::MemgraphOptions;
use crate::views::sparklines::SparklineOptions;
use crate::views::timeline::PlaybackOptions;
use crate::views::treemap::TreemapOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}

/// Settings that shape the model itself at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Nodes whose peak reaches this share of the whole heap's peak start
    /// expanded.
    pub auto_expand_fraction: f64,
    /// Whether per-node hide flags are honored initially.
    pub hiding_enabled: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            auto_expand_fraction: 0.25,
            hiding_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub model: ModelConfig,
    pub treemap: TreemapOptions,
    pub memgraph: MemgraphOptions,
    pub sparklines: SparklineOptions,
    pub alloc_tree: AllocTreeOptions,
    pub playback: PlaybackOptions,
}

impl ViewerConfig {
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.model.auto_expand_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::OutOfRange {
                field: "model.auto_expand_fraction",
                expected: "between 0 and 1",
                value: fraction,
            });
        }
        for (field, value) in [
            ("treemap.border", self.treemap.border),
            ("treemap.padding", self.treemap.padding),
            ("treemap.text_size", self.treemap.text_size),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::OutOfRange {
                    field,
                    expected: "non-negative",
                    value,
                });
            }
        }
        if let Some(h) = self.sparklines.item_height
            && !(h > 0.0)
        {
            return Err(ConfigError::OutOfRange {
                field: "sparklines.item_height",
                expected: "positive",
                value: h,
            });
        }
        Ok(())
    }
}
