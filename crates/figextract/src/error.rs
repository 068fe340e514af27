//! Error types for the figure extraction library
//!
//! Per-caption and per-page problems are never errors: they surface as
//! partial failures (a [`Figure`](crate::Figure) without an image region).
//! The variants below cover configuration mistakes, input that cannot be
//! loaded or is inconsistent, and documents the pipeline declines to process.
//!
//! # Examples
//!
//! ```
//! use figextract::{FigextractError, PipelineConfigBuilder};
//!
//! let err = PipelineConfigBuilder::new().dpi(0.0).build().unwrap_err();
//! assert!(err.is_config_error());
//! ```

use thiserror::Error;

/// Errors that can occur while locating figures
#[derive(Error, Debug)]
pub enum FigextractError {
    /// Invalid configuration
    ///
    /// Raised by [`PipelineConfigBuilder::build`](crate::PipelineConfigBuilder::build)
    /// when a threshold or cap is out of range.
    #[error("Invalid configuration: {reason}")]
    ConfigError {
        /// Description of what is invalid in the configuration
        reason: String,
    },

    /// A page image could not be produced or does not match the page text
    #[error("Page {page} unavailable: {reason}")]
    PageError {
        /// Zero-based page index
        page: usize,
        /// Description of what went wrong
        reason: String,
    },

    /// Two text pages share the same page index
    #[error("Page index {page} appears more than once")]
    DuplicatePage {
        /// The repeated zero-based page index
        page: usize,
    },

    /// The document's body text is rendered as raster images
    ///
    /// Returned by [`analyze_document`](crate::analyze_document) unless
    /// `text_as_image` is enabled in the configuration.
    #[error("Body text appears to be encoded as graphics (enable text_as_image to parse it)")]
    GraphicalBodyText,

    /// IO error (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON input or output failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A page render could not be decoded or encoded
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl FigextractError {
    /// Returns true if this error is a configuration error (user-fixable)
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }

    /// Returns true if this error concerns a single page
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_page_error(&self) -> bool {
        matches!(self, Self::PageError { .. })
    }

    /// Returns true if the document was skipped because its text is graphical
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_graphical_text(&self) -> bool {
        matches!(self, Self::GraphicalBodyText)
    }

    /// Returns true if this is an I/O error
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::IoError(_))
    }
}

/// Type alias for Result with `FigextractError`
pub type Result<T> = std::result::Result<T, FigextractError>;
