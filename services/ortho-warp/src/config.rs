//! Job file loading for `ortho-warp`.
//!
//! A job is a YAML document naming the source images, the optional coverage
//! mask, the coordinate pipeline and the output store. Relative paths are
//! resolved against the directory containing the job file.

use anyhow::{Context, Result};
use ortho_common::SpatialRef;
use projection::{CoordinatePipeline, DirectoryGridResolver};
use raster_processor::{
    MaskOptions, OutputOptions, OverlapPolicy, OverviewOptions, RasterProcessorConfig,
    ResamplingKernel, TileCodec, WarpOptions,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Job File Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub source_srs: String,
    pub target_srs: String,
    /// Glob patterns; order decides overlap precedence.
    pub sources: Vec<String>,
    pub overlap: OverlapPolicy,
    #[serde(default)]
    pub mask: Option<MaskConfig>,
    /// Pipeline definition; omitted means the two SRS must be equal.
    #[serde(default)]
    pub pipeline: Option<String>,
    /// Directory searched for `+grids=` files, defaults to the job directory.
    #[serde(default)]
    pub grids_dir: Option<PathBuf>,
    pub zoom: u32,
    #[serde(default)]
    pub kernel: ResamplingKernel,
    #[serde(default = "default_true")]
    pub target_aligned: bool,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub block_size: Option<usize>,
    #[serde(default)]
    pub cache_mb: Option<usize>,
    /// Value treated as nodata in the source images.
    #[serde(default)]
    pub source_nodata: Option<f32>,
    pub output: OutputConfig,
    #[serde(default)]
    pub overviews: OverviewConfig,

    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskConfig {
    /// GeoJSON coverage layers, intersected with each other.
    pub layers: Vec<PathBuf>,
    #[serde(default)]
    pub invert: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub compression: TileCodec,
    #[serde(default)]
    pub nodata: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverviewConfig {
    pub enabled: bool,
    pub min_dimension: usize,
    pub max_levels: Option<u32>,
    pub kernel: Option<ResamplingKernel>,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        let defaults = OverviewOptions::default();
        Self {
            enabled: true,
            min_dimension: defaults.min_dimension,
            max_levels: defaults.max_levels,
            kernel: defaults.kernel,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Loading Functions
// ============================================================================

/// Load a job file with environment variable substitution and overrides.
pub fn load_job_config<P: AsRef<Path>>(path: P) -> Result<JobConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {:?}", path))?;

    let mut job = parse_job_config(&content)
        .with_context(|| format!("Failed to parse job file {:?}", path))?;
    job.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    job.apply_overrides(|name| std::env::var(name).ok())?;
    job.validate()?;
    Ok(job)
}

/// Parse job YAML after expanding `${VAR}` references.
pub fn parse_job_config(content: &str) -> Result<JobConfig> {
    let expanded = expand_env_vars(content)?;
    let job: JobConfig =
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse job YAML")?;
    Ok(job)
}

impl JobConfig {
    /// Apply `ORTHO_WARP_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("ORTHO_WARP_THREADS") {
            self.threads = Some(parse_override("ORTHO_WARP_THREADS", &val)?);
        }
        if let Some(val) = lookup("ORTHO_WARP_BLOCK_SIZE") {
            self.block_size = Some(parse_override("ORTHO_WARP_BLOCK_SIZE", &val)?);
        }
        if let Some(val) = lookup("ORTHO_WARP_CACHE_MB") {
            self.cache_mb = Some(parse_override("ORTHO_WARP_CACHE_MB", &val)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.source_srs()?;
        self.target_srs()?;

        anyhow::ensure!(!self.sources.is_empty(), "At least one source pattern is required");
        anyhow::ensure!(self.threads != Some(0), "threads must be greater than 0");
        anyhow::ensure!(self.block_size != Some(0), "block_size must be greater than 0");
        anyhow::ensure!(self.cache_mb != Some(0), "cache_mb must be greater than 0");
        anyhow::ensure!(
            !self.output.dir.as_os_str().is_empty(),
            "output.dir cannot be empty"
        );

        if let Some(mask) = &self.mask {
            anyhow::ensure!(!mask.layers.is_empty(), "mask.layers cannot be empty");
        }

        if self.pipeline.is_none() {
            anyhow::ensure!(
                self.source_srs()? == self.target_srs()?,
                "A pipeline is required when source_srs ({}) and target_srs ({}) differ",
                self.source_srs,
                self.target_srs
            );
        }

        self.raster_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid raster settings: {}", e))?;
        self.warp_options()
            .validate()
            .context("Invalid warp settings")?;
        Ok(())
    }

    pub fn source_srs(&self) -> Result<SpatialRef> {
        self.source_srs
            .parse()
            .with_context(|| format!("Invalid source_srs '{}'", self.source_srs))
    }

    pub fn target_srs(&self) -> Result<SpatialRef> {
        self.target_srs
            .parse()
            .with_context(|| format!("Invalid target_srs '{}'", self.target_srs))
    }

    /// `path` relative to the job file's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Expand the source patterns.
    ///
    /// Matches keep pattern order, and each pattern's matches are sorted, so
    /// overlap precedence is stable between runs. A pattern that matches
    /// nothing is an error.
    pub fn source_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for pattern in &self.sources {
            let full = self.resolve(Path::new(pattern));
            let full = full.to_string_lossy();
            let mut matched: Vec<PathBuf> = glob::glob(&full)
                .with_context(|| format!("Invalid source pattern '{}'", pattern))?
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Failed to expand source pattern '{}'", pattern))?;
            anyhow::ensure!(!matched.is_empty(), "Source pattern '{}' matched no files", pattern);
            matched.sort();
            paths.extend(matched);
        }
        Ok(paths)
    }

    pub fn pipeline(&self) -> Result<CoordinatePipeline> {
        match &self.pipeline {
            Some(definition) => {
                let grids_dir = match &self.grids_dir {
                    Some(dir) => self.resolve(dir),
                    None => self.base_dir.clone(),
                };
                CoordinatePipeline::parse(definition, &DirectoryGridResolver::new(grids_dir))
                    .with_context(|| format!("Invalid pipeline '{}'", definition))
            }
            None => Ok(CoordinatePipeline::identity()),
        }
    }

    /// Raster tunables: `RASTER_*` environment first, then the job file.
    pub fn raster_config(&self) -> RasterProcessorConfig {
        let mut config = RasterProcessorConfig::from_env();
        if let Some(size) = self.block_size {
            config.block_size = size;
        }
        if let Some(mb) = self.cache_mb {
            config.cache_size_mb = mb;
        }
        config
    }

    pub fn warp_options(&self) -> WarpOptions {
        WarpOptions {
            kernel: self.kernel,
            target_aligned: self.target_aligned,
            threads: self.threads,
            output: OutputOptions {
                compression: self.output.compression,
                nodata: self.output.nodata,
            },
            ..WarpOptions::from_config(self.zoom, &self.raster_config())
        }
    }

    pub fn mask_options(&self) -> MaskOptions {
        MaskOptions {
            invert: self.mask.as_ref().is_some_and(|m| m.invert),
            ..MaskOptions::default()
        }
    }

    pub fn overview_options(&self) -> OverviewOptions {
        OverviewOptions {
            kernel: self.overviews.kernel,
            min_dimension: self.overviews.min_dimension,
            max_levels: self.overviews.max_levels,
            threads: self.threads,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output.dir)
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a positive integer, got '{}'", name, value))
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` in job text.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }
            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const JOB: &str = r#"
source_srs: EPSG:5514
target_srs: EPSG:3857
sources: ["tiles/*.png"]
overlap: last_wins
mask:
  layers: ["cycles.geojson", "footprints.geojson"]
  invert: false
pipeline: "+proj=pipeline +ellps=bessel +step +inv +proj=krovak +step +proj=cart +step +proj=helmert +x=570.8 +y=85.7 +z=462.8 +rx=4.998 +ry=1.587 +rz=5.261 +s=3.56 +convention=position_vector +step +inv +proj=cart +ellps=WGS84 +step +proj=webmerc +ellps=WGS84"
zoom: 19
kernel: lanczos
target_aligned: true
threads: 8
block_size: 512
output:
  dir: out/
  compression: { type: jpeg, quality: 85 }
overviews: { min_dimension: 256 }
"#;

    #[test]
    fn test_parse_full_job() {
        let job = parse_job_config(JOB).unwrap();
        assert_eq!(job.source_srs().unwrap(), SpatialRef::epsg(5514));
        assert_eq!(job.overlap, OverlapPolicy::LastWins);
        assert_eq!(job.kernel, ResamplingKernel::Lanczos);
        assert_eq!(job.output.compression, TileCodec::Jpeg { quality: 85 });
        assert_eq!(job.mask.as_ref().unwrap().layers.len(), 2);
        assert!(job.overviews.enabled);
        assert_eq!(job.pipeline().unwrap().steps().len(), 5);

        let options = job.warp_options();
        assert_eq!(options.zoom, 19);
        assert_eq!(options.block_size, 512);
        assert_eq!(options.threads, Some(8));
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let job = parse_job_config(
            "source_srs: EPSG:3857\ntarget_srs: EPSG:3857\nsources: [a.png]\noverlap: first_wins\nzoom: 12\noutput: { dir: out }\n",
        )
        .unwrap();
        assert!(job.mask.is_none());
        assert!(job.target_aligned);
        assert_eq!(job.output.compression, TileCodec::Png);
        assert_eq!(job.overviews.min_dimension, 256);
        job.validate().unwrap();
    }

    #[test]
    fn test_overlap_is_required() {
        let result = parse_job_config(
            "source_srs: EPSG:3857\ntarget_srs: EPSG:3857\nsources: [a.png]\nzoom: 12\noutput: { dir: out }\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut job = parse_job_config(JOB).unwrap();
        let env: HashMap<&str, &str> =
            [("ORTHO_WARP_THREADS", "2"), ("ORTHO_WARP_CACHE_MB", "64")].into();
        job.apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(job.threads, Some(2));
        assert_eq!(job.block_size, Some(512));
        assert_eq!(job.raster_config().cache_size_mb, 64);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut job = parse_job_config(JOB).unwrap();
        let result = job.apply_overrides(|name| {
            (name == "ORTHO_WARP_BLOCK_SIZE").then(|| "big".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut job = parse_job_config(JOB).unwrap();
        job.threads = Some(0);
        assert!(job.validate().is_err());

        let mut job = parse_job_config(JOB).unwrap();
        job.pipeline = None;
        assert!(job.validate().is_err());

        let mut job = parse_job_config(JOB).unwrap();
        job.zoom = 99;
        assert!(job.validate().is_err());

        let mut job = parse_job_config(JOB).unwrap();
        job.target_srs = "nonsense".to_string();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_source_paths_keep_pattern_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.png", "z.jpg"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let job_path = dir.path().join("job.yaml");
        fs::write(
            &job_path,
            "source_srs: EPSG:3857\ntarget_srs: EPSG:3857\nsources: ['*.jpg', '*.png']\noverlap: first_wins\nzoom: 12\noutput: { dir: out }\n",
        )
        .unwrap();

        let job = load_job_config(&job_path).unwrap();
        let names: Vec<String> = job
            .source_paths()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["z.jpg", "a.png", "b.png"]);
        assert_eq!(job.output_dir(), dir.path().join("out"));
    }

    #[test]
    fn test_unmatched_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = parse_job_config(JOB).unwrap();
        job.base_dir = dir.path().to_path_buf();
        assert!(job.source_paths().is_err());
    }

    #[test]
    fn test_pipeline_parses_or_defaults_to_identity() {
        let job = parse_job_config(JOB).unwrap();
        job.pipeline().unwrap();

        let mut job = parse_job_config(JOB).unwrap();
        job.pipeline = Some("+proj=nosuchthing".to_string());
        assert!(job.pipeline().is_err());

        job.pipeline = None;
        job.pipeline().unwrap();
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("ORTHO_WARP_TEST_DIR", "/data/out");
        assert_eq!(
            expand_env_vars("dir: ${ORTHO_WARP_TEST_DIR}").unwrap(),
            "dir: /data/out"
        );
        std::env::remove_var("ORTHO_WARP_TEST_UNSET");
        assert_eq!(
            expand_env_vars("zoom: ${ORTHO_WARP_TEST_UNSET:-17}").unwrap(),
            "zoom: 17"
        );
        assert!(expand_env_vars("${ORTHO_WARP_TEST_UNSET}").is_err());
        assert!(expand_env_vars("${OPEN").is_err());
    }
}
