//! Pipeline configuration
//!
//! [`PipelineConfig`] gathers the per-stage thresholds. Build one with
//! [`PipelineConfigBuilder`], which validates ranges, or load it from JSON
//! (missing fields fall back to their defaults).

use crate::error::{FigextractError, Result};
use crate::pipeline::stage01_document_statistics::Stage01Config;
use crate::pipeline::stage03_candidate_disambiguator::Stage03Config;
use crate::pipeline::stage04_caption_builder::Stage04Config;
use crate::pipeline::stage05_region_classifier::Stage05Config;
use crate::pipeline::stage06_figure_assigner::Stage06Config;
use serde::{Deserialize, Serialize};

/// Resolution of page renders when none is given (pixels per inch)
pub const DEFAULT_DPI: f64 = 100.0;

/// Gray level below which a pixel counts as ink
pub const DEFAULT_FOREGROUND_THRESHOLD: u8 = 250;

/// Complete configuration for [`analyze_document`](crate::analyze_document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Resolution of the page renders and of all text coordinates
    pub dpi: f64,
    /// Pixels darker than this are foreground
    pub foreground_threshold: u8,
    /// Parse documents whose body text is drawn as images
    pub text_as_image: bool,
    pub stage01: Stage01Config,
    pub stage03: Stage03Config,
    pub stage04: Stage04Config,
    pub stage05: Stage05Config,
    pub stage06: Stage06Config,
}

impl Default for PipelineConfig {
    #[inline]
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            foreground_threshold: DEFAULT_FOREGROUND_THRESHOLD,
            text_as_image: false,
            stage01: Stage01Config::default(),
            stage03: Stage03Config::default(),
            stage04: Stage04Config::default(),
            stage05: Stage05Config::default(),
            stage06: Stage06Config::default(),
        }
    }
}

impl PipelineConfig {
    /// Check every threshold for a usable range
    ///
    /// # Errors
    ///
    /// Returns [`FigextractError::ConfigError`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(FigextractError::ConfigError { reason });
        if !(self.dpi.is_finite() && self.dpi > 0.0) {
            return fail(format!("dpi must be positive, got {}", self.dpi));
        }
        if self.stage06.max_configurations == 0 {
            return fail("max_configurations must be at least 1".to_string());
        }
        let fractions = [
            ("two_column_tolerance", self.stage01.two_column_tolerance),
            ("right_aligned_tolerance", self.stage01.right_aligned_tolerance),
            ("page_number_ratio", self.stage01.page_number_ratio),
            ("graphic_line_coverage", self.stage04.graphic_line_coverage),
            ("graphic_fraction", self.stage05.graphic_fraction),
            ("caption_overlap", self.stage05.caption_overlap),
            ("claimed_overlap", self.stage06.claimed_overlap),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.stage06.min_region_size < 0.0 {
            return fail(format!(
                "min_region_size must not be negative, got {}",
                self.stage06.min_region_size
            ));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`]
///
/// # Examples
///
/// ```
/// use figextract::PipelineConfigBuilder;
///
/// # fn main() -> figextract::Result<()> {
/// let config = PipelineConfigBuilder::new()
///     .dpi(150.0)
///     .max_configurations(500)
///     .build()?;
/// assert_eq!(config.dpi, 150.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new config builder with defaults
    ///
    /// Default settings:
    /// - DPI: 100
    /// - Text as image: disabled
    /// - Ambiguous caption groups of up to 2 are kept
    /// - At most 10,000 assignment configurations per page
    #[inline]
    #[must_use = "returns a new builder with default settings"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset that only keeps unambiguous caption evidence
    ///
    /// Ambiguous groups of more than one candidate are dropped instead of
    /// kept.
    #[must_use = "returns a builder that rejects ambiguous captions"]
    pub fn strict() -> Self {
        Self::new().max_ambiguous_kept(1)
    }

    /// Preset for scanned documents whose text layer sits on top of page images
    #[must_use = "returns a builder for scanned documents"]
    pub fn scanned() -> Self {
        Self::new().text_as_image(true)
    }

    #[inline]
    #[must_use = "returns the builder with dpi configured"]
    pub const fn dpi(mut self, dpi: f64) -> Self {
        self.config.dpi = dpi;
        self
    }

    #[inline]
    #[must_use = "returns the builder with the foreground threshold configured"]
    pub const fn foreground_threshold(mut self, threshold: u8) -> Self {
        self.config.foreground_threshold = threshold;
        self
    }

    /// Treat image-rendered body text as parseable instead of refusing the document
    #[inline]
    #[must_use = "returns the builder with text-as-image configured"]
    pub const fn text_as_image(mut self, enabled: bool) -> Self {
        self.config.text_as_image = enabled;
        self
    }

    /// Largest ambiguous candidate group kept as-is
    #[inline]
    #[must_use = "returns the builder with max ambiguous kept configured"]
    pub const fn max_ambiguous_kept(mut self, max: usize) -> Self {
        self.config.stage03.max_ambiguous_kept = max;
        self
    }

    /// Cap on caption/proposal configurations evaluated per page
    #[inline]
    #[must_use = "returns the builder with max configurations configured"]
    pub const fn max_configurations(mut self, max: usize) -> Self {
        self.config.stage06.max_configurations = max;
        self
    }

    #[inline]
    #[must_use = "returns the builder with the stage 1 config replaced"]
    pub const fn stage01_config(mut self, config: Stage01Config) -> Self {
        self.config.stage01 = config;
        self
    }

    #[inline]
    #[must_use = "returns the builder with the stage 4 config replaced"]
    pub const fn stage04_config(mut self, config: Stage04Config) -> Self {
        self.config.stage04 = config;
        self
    }

    #[inline]
    #[must_use = "returns the builder with the stage 5 config replaced"]
    pub const fn stage05_config(mut self, config: Stage05Config) -> Self {
        self.config.stage05 = config;
        self
    }

    #[inline]
    #[must_use = "returns the builder with the stage 6 config replaced"]
    pub const fn stage06_config(mut self, config: Stage06Config) -> Self {
        self.config.stage06 = config;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    ///
    /// Returns [`FigextractError::ConfigError`] when a value is out of range.
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
