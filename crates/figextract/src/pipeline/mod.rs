//! # Figure Pipeline - Stages 1-6
//!
//! Each stage is a small struct with its own config and a `process` method,
//! so it can be tested in isolation.
//!
//! ## Document stages (run once)
//!
//! ### Stage 1: Document Statistics ([`Stage01DocumentStatistics`])
//! - **Input:** All `TextPage`s
//! - **Process:** Margin, font, header and page-number histograms
//! - **Output:** [`DocumentStatistics`]
//!
//! ### Stage 2: Caption Candidates ([`Stage02CaptionCandidates`])
//! - **Input:** All `TextPage`s
//! - **Process:** Finds `Figure N` / `Table N` anchors
//! - **Output:** Candidates grouped by signed id
//!
//! ### Stage 3: Candidate Disambiguation ([`Stage03CandidateDisambiguator`])
//! - **Input:** Candidate groups
//! - **Process:** Priority filter cascade, then drops groups that stay ambiguous
//! - **Output:** [`CaptionStart`]s per page
//!
//! ## Page stages (run per page, in parallel)
//!
//! ### Stage 4: Caption Regions ([`Stage04CaptionBuilder`])
//! - **Input:** A page's caption starts and graphic components
//! - **Process:** Grows each anchor line into a multi-line caption box
//! - **Output:** [`Caption`]s
//!
//! ### Stage 5: Region Classification ([`Stage05RegionClassifier`])
//! - **Input:** Captions, page text, graphics bitmap
//! - **Process:** Titles, body text components, graphics, noise removal
//! - **Output:** [`PageRegions`]
//!
//! ### Stage 6: Figure Assignment ([`Stage06FigureAssigner`])
//! - **Input:** `PageRegions` and the full page render
//! - **Process:** Proposals per caption, capped configuration search
//! - **Output:** [`Figure`]s and partial failures
//!
//! [`FigurePipeline`] chains all six; [`analyze_document`] is the one-call
//! entry point.

pub mod config;
pub mod orchestrator;
pub mod stage01_document_statistics;
pub mod stage02_caption_candidates;
pub mod stage03_candidate_disambiguator;
pub mod stage04_caption_builder;
pub mod stage05_region_classifier;
pub mod stage06_figure_assigner;
pub mod types;

pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_DPI};
pub use orchestrator::{
    analyze_document, DocumentFigures, FigurePipeline, PageImageSource, PageImages,
};
pub use stage01_document_statistics::{DocumentStatistics, Stage01Config, Stage01DocumentStatistics};
pub use stage02_caption_candidates::{CandidateGroups, Stage02CaptionCandidates};
pub use stage03_candidate_disambiguator::{
    CandidateFilter, CaptionStarts, Stage03CandidateDisambiguator, Stage03Config,
};
pub use stage04_caption_builder::{Stage04CaptionBuilder, Stage04Config};
pub use stage05_region_classifier::{Stage05Config, Stage05RegionClassifier};
pub use stage06_figure_assigner::{PageFigures, Stage06Config, Stage06FigureAssigner};
pub use types::*;
