//! Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::{ChannelOrder, ValueRange};

/// Configuration for the style transfer pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the model input that receives the content image.
    pub input_slot: String,

    /// Name of the model output holding the stylized image.
    pub output_slot: String,

    /// Value range the model expects for pixels, and produces.
    pub value_range: ValueRange,

    /// Channel order of three-channel model tensors.
    pub channel_order: ChannelOrder,

    /// Size used when the model leaves input height or width dynamic.
    pub fallback_size: u32,

    /// Graph optimization level applied when compiling (0-3).
    pub optimization_level: u8,

    /// ONNX Runtime intra-op threads. 0 uses the runtime default.
    pub intra_threads: usize,

    /// Where compiled models are written. Defaults to a directory under the system temp dir.
    pub compile_dir: Option<PathBuf>,

    /// Style applied when none is chosen. Defaults to the first style in the catalog.
    pub default_style: Option<String>,

    /// Output JPEG quality (1-100).
    pub output_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_slot: "image".to_string(),
            output_slot: "stylizedImage".to_string(),
            value_range: ValueRange::ZeroTo255,
            channel_order: ChannelOrder::Rgb,
            fallback_size: 512,
            optimization_level: 3,
            intra_threads: 0,
            compile_dir: None,
            default_style: None,
            output_quality: 95,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory compiled models are written to.
    #[must_use]
    pub fn compile_dir(&self) -> PathBuf {
        self.compile_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("petra").join("compiled"))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.input_slot.is_empty() {
            return Err(Error::InvalidParameter {
                name: "input_slot".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.output_slot.is_empty() {
            return Err(Error::InvalidParameter {
                name: "output_slot".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.fallback_size == 0 {
            return Err(Error::InvalidParameter {
                name: "fallback_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.optimization_level > 3 {
            return Err(Error::InvalidParameter {
                name: "optimization_level".to_string(),
                reason: "must be between 0 and 3".to_string(),
            });
        }

        if !(1..=100).contains(&self.output_quality) {
            return Err(Error::InvalidParameter {
                name: "output_quality".to_string(),
                reason: "must be between 1 and 100".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.input_slot, "image");
        assert_eq!(config.output_slot, "stylizedImage");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let bad = [
            Config {
                output_quality: 0,
                ..Config::default()
            },
            Config {
                optimization_level: 4,
                ..Config::default()
            },
            Config {
                fallback_size: 0,
                ..Config::default()
            },
            Config {
                input_slot: String::new(),
                ..Config::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("petra.json");
        std::fs::write(
            &path,
            r#"{
                "input_slot": "input1",
                "output_slot": "output1",
                "value_range": "0..1",
                "channel_order": "bgr"
            }"#,
        )
        .unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.input_slot, "input1");
        assert_eq!(config.value_range, ValueRange::ZeroToOne);
        assert_eq!(config.channel_order, ChannelOrder::Bgr);
        assert_eq!(config.output_quality, 95);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("petra.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::from_json_file(&path),
            Err(Error::ConfigParse { .. })
        ));
    }
}
