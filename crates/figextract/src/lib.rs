//! # figextract - Figure and Table Locator for Rendered Document Pages
//!
//! Finds captioned figures and tables in documents whose pages are given as
//! a reading-order text layer plus grayscale renders. Detection is
//! heuristic: layout statistics, caption pattern matching and raster
//! geometry, with no learned models.
//!
//! ## Features
//!
//! - **Caption Detection**: `Figure N` / `Table N` anchors, disambiguated
//!   document-wide by style (colon, bold, abbreviation, ...)
//! - **Caption Regions**: Multi-line caption boxes grown line by line
//! - **Page Regions**: Body text, titles, graphics and noise separated on every page
//! - **Figure Regions**: One image region per caption, found by a bounded
//!   combinatorial search
//! - **Partial Failures**: Captions without a region are reported, never dropped
//!
//! ## Quick Start
//!
//! ```
//! use figextract::{analyze_document, PageImages, PipelineConfigBuilder, Result, TextPage};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> Result<()> {
//! let config = PipelineConfigBuilder::new().dpi(100.0).build()?;
//!
//! // Text pages normally come from a JSON dump of the PDF text layer
//! let pages: Vec<TextPage> = Vec::new();
//! let images: BTreeMap<usize, PageImages> = BTreeMap::new();
//!
//! let result = analyze_document(&pages, &images, &config)?;
//! for (page, figures) in &result.figures {
//!     for figure in figures {
//!         println!("page {page}: {} {} at {:?}", figure.figure_type, figure.number, figure.image_bbox);
//!     }
//! }
//! assert!(result.errors.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Per-caption and per-page problems are not errors. Only invalid
//! configuration and documents whose body text is drawn as images fail:
//!
//! ```no_run
//! use figextract::{analyze_document, FigextractError, PageImages, PipelineConfig, TextPage};
//! use std::collections::BTreeMap;
//!
//! # fn example(pages: Vec<TextPage>, images: BTreeMap<usize, PageImages>) {
//! match analyze_document(&pages, &images, &PipelineConfig::default()) {
//!     Ok(result) => log::debug!("{} figures", result.found()),
//!     Err(FigextractError::GraphicalBodyText) => {
//!         log::warn!("Scanned document, retry with text_as_image");
//!     }
//!     Err(e) => log::warn!("Error: {}", e),
//! }
//! # }
//! ```

pub mod error;
pub mod export;
pub mod pipeline;
pub mod raster;
pub mod text;

pub use error::{FigextractError, Result};
pub use export::{FigureRecord, ImageWord};
pub use pipeline::{
    analyze_document, BBox, Caption, CaptionStart, DocumentFigures, Figure, FigurePipeline,
    FigureType, PageImageSource, PageImages, PageRegions, PipelineConfig, PipelineConfigBuilder,
};
pub use text::{TextBlock, TextLine, TextPage, Word};
