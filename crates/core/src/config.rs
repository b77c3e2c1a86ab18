//! Pipeline configuration
//!
//! Every tunable lives in one [`PipelineConfig`], grouped into sections that
//! mirror the pipeline stages. Values are layered, lowest precedence first:
//! built-in defaults, a TOML file, `TENDON_*` environment variables, and
//! finally whatever the caller (usually the CLI) overrides explicitly.
//!
//! ```toml
//! [raster]
//! dpi = 200
//!
//! [tiling]
//! tile_size = 1000
//! overlap = 250
//!
//! [measurement]
//! unit = "ft"
//! precision = 2
//! ```

use crate::annotate::AnnotateConfig;
use crate::lines::LineConfig;
use crate::matcher::MatchConfig;
use crate::measurement::{LengthUnit, MeasurementConfig};
use crate::merge::DedupConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Rasterization settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    pub dpi: u32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self { dpi: 200 }
    }
}

/// Tile grid settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Overlap between neighbouring tiles; must exceed the widest glyph
    pub overlap: u32,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_size: 1000,
            overlap: 250,
        }
    }
}

/// Text detection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tiles per detector call
    pub batch_size: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { batch_size: 24 }
    }
}

/// Document-level scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Process pages on the rayon pool instead of one after another
    pub parallel_pages: bool,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raster: RasterConfig,
    pub tiling: TilingConfig,
    pub ocr: OcrConfig,
    pub dedup: DedupConfig,
    pub lines: LineConfig,
    pub matching: MatchConfig,
    pub measurement: MeasurementConfig,
    pub annotation: AnnotateConfig,
    pub pipeline: RunConfig,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {key}: `{value}`")]
    InvalidEnv { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn env_value<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn unit_interval(name: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be within 0..=1, got {value}")))
    }
}

fn positive(name: &str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")))
    }
}

impl PipelineConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save as TOML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay environment variables onto this configuration
    ///
    /// - `TENDON_DPI`
    /// - `TENDON_TILE_SIZE`, `TENDON_TILE_OVERLAP`
    /// - `TENDON_OCR_BATCH_SIZE`
    /// - `TENDON_MAX_DISTANCE`
    /// - `TENDON_UNIT` (`ft`, `in`, `m`, `cm`, `mm`)
    /// - `TENDON_PRECISION`
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(dpi) = env_value("TENDON_DPI")? {
            self.raster.dpi = dpi;
        }
        if let Some(size) = env_value("TENDON_TILE_SIZE")? {
            self.tiling.tile_size = size;
        }
        if let Some(overlap) = env_value("TENDON_TILE_OVERLAP")? {
            self.tiling.overlap = overlap;
        }
        if let Some(batch) = env_value("TENDON_OCR_BATCH_SIZE")? {
            self.ocr.batch_size = batch;
        }
        if let Some(distance) = env_value("TENDON_MAX_DISTANCE")? {
            self.matching.max_distance = distance;
        }
        if let Some(unit) = env_value::<LengthUnit>("TENDON_UNIT")? {
            self.measurement.unit = unit;
        }
        if let Some(precision) = env_value("TENDON_PRECISION")? {
            self.measurement.precision = precision;
        }
        Ok(())
    }

    /// Load `path` if given, then overlay the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(72..=600).contains(&self.raster.dpi) {
            return Err(ConfigError::Invalid(format!(
                "dpi must be within 72..=600, got {}",
                self.raster.dpi
            )));
        }
        if !(1..=100).contains(&self.ocr.batch_size) {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be within 1..=100, got {}",
                self.ocr.batch_size
            )));
        }
        if self.tiling.overlap >= self.tiling.tile_size {
            return Err(ConfigError::Invalid(format!(
                "overlap {} must be smaller than tile_size {}",
                self.tiling.overlap, self.tiling.tile_size
            )));
        }

        unit_interval("dedup.iou_threshold", self.dedup.iou_threshold)?;
        unit_interval("dedup.text_similarity_threshold", self.dedup.text_similarity_threshold)?;
        unit_interval("matching.orientation_weight", self.matching.orientation_weight)?;

        positive("lines.min_length", self.lines.min_length)?;
        positive("lines.max_gap", self.lines.max_gap)?;
        positive("lines.merge_angle_tolerance", self.lines.merge_angle_tolerance)?;
        positive("lines.merge_distance_tolerance", self.lines.merge_distance_tolerance)?;
        positive("lines.merge_gap_tolerance", self.lines.merge_gap_tolerance)?;
        positive("lines.canny_low", self.lines.canny_low)?;
        if self.lines.canny_high < self.lines.canny_low {
            return Err(ConfigError::Invalid("lines.canny_high must not be below canny_low".to_string()));
        }
        positive("matching.max_distance", self.matching.max_distance)?;
        positive("annotation.font_scale", self.annotation.font_scale)?;

        if self.matching.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid("matching.keywords must name at least one keyword".to_string()));
        }
        if self.measurement.precision > 6 {
            return Err(ConfigError::Invalid(format!(
                "precision must be at most 6, got {}",
                self.measurement.precision
            )));
        }
        if let Some(fallback) = self.measurement.fallback_pixels_per_unit {
            positive("measurement.fallback_pixels_per_unit", fallback)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_KEYS: &[&str] = &[
        "TENDON_DPI",
        "TENDON_TILE_SIZE",
        "TENDON_TILE_OVERLAP",
        "TENDON_OCR_BATCH_SIZE",
        "TENDON_MAX_DISTANCE",
        "TENDON_UNIT",
        "TENDON_PRECISION",
    ];

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in var_names {
                env::remove_var(name);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.raster.dpi, 200);
        assert_eq!(config.tiling.tile_size, 1000);
        assert_eq!(config.tiling.overlap, 250);
        assert_eq!(config.ocr.batch_size, 24);
        assert_eq!(config.dedup.iou_threshold, 0.6);
        assert_eq!(config.measurement.unit, LengthUnit::Feet);
        assert_eq!(config.measurement.precision, 2);
        assert!(!config.pipeline.parallel_pages);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [tiling]
            overlap = 300

            [measurement]
            unit = "m"
            approximation_marker = "≈"
            "#,
        )
        .unwrap();

        assert_eq!(config.tiling.overlap, 300);
        assert_eq!(config.tiling.tile_size, 1000);
        assert_eq!(config.measurement.unit, LengthUnit::Meters);
        assert_eq!(config.measurement.approximation_marker, "≈");
        assert_eq!(config.raster.dpi, 200);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            PipelineConfig::from_toml("[tiling]\ntile_size = \"big\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = PipelineConfig::default();
        config.matching.keywords.push("DEAD END".to_string());
        config.measurement.fallback_pixels_per_unit = Some(12.5);

        let parsed = PipelineConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tendon.toml");

        let mut config = PipelineConfig::default();
        config.raster.dpi = 300;
        config.save_to_file(&path).unwrap();

        assert_eq!(PipelineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(ENV_KEYS);
        env::set_var("TENDON_DPI", "300");
        env::set_var("TENDON_TILE_SIZE", "800");
        env::set_var("TENDON_TILE_OVERLAP", "200");
        env::set_var("TENDON_OCR_BATCH_SIZE", "8");
        env::set_var("TENDON_MAX_DISTANCE", "75.5");
        env::set_var("TENDON_UNIT", "mm");
        env::set_var("TENDON_PRECISION", "1");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.raster.dpi, 300);
        assert_eq!(config.tiling.tile_size, 800);
        assert_eq!(config.tiling.overlap, 200);
        assert_eq!(config.ocr.batch_size, 8);
        assert_eq!(config.matching.max_distance, 75.5);
        assert_eq!(config.measurement.unit, LengthUnit::Millimeters);
        assert_eq!(config.measurement.precision, 1);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let _guard = EnvGuard::new(ENV_KEYS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tendon.toml");
        fs::write(&path, "[raster]\ndpi = 150\n[ocr]\nbatch_size = 4\n").unwrap();
        env::set_var("TENDON_DPI", "250");

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.raster.dpi, 250);
        assert_eq!(config.ocr.batch_size, 4);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(ENV_KEYS);
        env::set_var("TENDON_TILE_SIZE", "huge");

        let err = PipelineConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "TENDON_TILE_SIZE"));
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut config = PipelineConfig::default();
        config.raster.dpi = 1200;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.ocr.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.tiling.overlap = config.tiling.tile_size;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.dedup.iou_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.matching.max_distance = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.measurement.precision = 9;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.measurement.fallback_pixels_per_unit = Some(-1.0);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.matching.keywords = vec![" ".to_string()];
        assert!(config.validate().is_err());
    }
}
