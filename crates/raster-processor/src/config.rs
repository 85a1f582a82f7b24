//! Configuration for the raster processor.

use crate::resample::ResamplingKernel;
use serde::{Deserialize, Serialize};

/// Tunables shared by the mosaic, warp and overview stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterProcessorConfig {
    /// Output block edge length in pixels (square blocks).
    pub block_size: usize,

    /// Memory budget for the decoded source cache in megabytes.
    pub cache_size_mb: usize,

    /// Samples per source edge when computing the target extent.
    pub edge_samples: usize,

    /// Kernel used to resample the alpha mask.
    pub mask_resampling: ResamplingKernel,
}

impl Default for RasterProcessorConfig {
    fn default() -> Self {
        Self {
            block_size: 256,
            cache_size_mb: 512,
            edge_samples: 21,
            mask_resampling: ResamplingKernel::Bilinear,
        }
    }
}

impl RasterProcessorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RASTER_BLOCK_SIZE") {
            if let Ok(size) = val.parse() {
                config.block_size = size;
            }
        }

        if let Ok(val) = std::env::var("RASTER_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("RASTER_EDGE_SAMPLES") {
            if let Ok(samples) = val.parse() {
                config.edge_samples = samples;
            }
        }

        if let Ok(val) = std::env::var("RASTER_MASK_RESAMPLING") {
            if let Ok(kernel) = val.parse() {
                config.mask_resampling = kernel;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size == 0 {
            return Err("block_size must be > 0".to_string());
        }

        if self.cache_size_mb == 0 {
            return Err("cache_size_mb must be > 0".to_string());
        }

        if self.edge_samples < 2 {
            return Err("edge_samples must be >= 2 (corners)".to_string());
        }

        if !matches!(
            self.mask_resampling,
            ResamplingKernel::Nearest | ResamplingKernel::Bilinear
        ) {
            return Err(format!(
                "mask_resampling must be nearest or bilinear, got {}",
                self.mask_resampling
            ));
        }

        Ok(())
    }

    /// Get the cache size in bytes.
    pub fn cache_size_bytes(&self) -> usize {
        self.cache_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RasterProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_size_bytes(), 512 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RasterProcessorConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.block_size = 256;
        config.edge_samples = 1;
        assert!(config.validate().is_err());

        config.edge_samples = 21;
        config.mask_resampling = ResamplingKernel::Lanczos;
        assert!(config.validate().unwrap_err().contains("mask_resampling"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RasterProcessorConfig = serde_json::from_str(r#"{"block_size": 512}"#).unwrap();
        assert_eq!(config.block_size, 512);
        assert_eq!(config.edge_samples, 21);
    }
}
