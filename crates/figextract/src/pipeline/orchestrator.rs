/// Figure Pipeline Orchestrator
///
/// Runs the document-wide stages (01-03) once, then the page stages
/// (04-06) for every page holding an accepted caption anchor. Pages are
/// independent and run in parallel on the rayon pool.
use crate::error::{FigextractError, Result};
use crate::pipeline::{
    config::PipelineConfig,
    stage01_document_statistics::DocumentStatistics,
    stage03_candidate_disambiguator::CaptionStarts,
    stage06_figure_assigner::PageFigures,
    types::{BBox, CaptionStart, Figure},
    Stage01DocumentStatistics, Stage02CaptionCandidates, Stage03CandidateDisambiguator,
    Stage04CaptionBuilder, Stage05RegionClassifier, Stage06FigureAssigner,
};
use crate::raster::{Bitmap, Connectivity};
use crate::text::TextPage;
use image::GrayImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Raster renders of one page at the configured DPI
#[derive(Debug, Clone, PartialEq)]
pub struct PageImages {
    /// Full page render
    pub render: GrayImage,
    /// Render with text suppressed; `None` derives graphics from `render`
    pub graphics: Option<GrayImage>,
}

/// Supplies page renders on demand
///
/// Implementations are shared across the page workers.
pub trait PageImageSource: Sync {
    /// Renders of page `page` (zero-based)
    ///
    /// # Errors
    ///
    /// Any error marks the page's captions as partial failures.
    fn page_images(&self, page: usize) -> Result<PageImages>;
}

impl PageImageSource for BTreeMap<usize, PageImages> {
    fn page_images(&self, page: usize) -> Result<PageImages> {
        self.get(&page).cloned().ok_or_else(|| FigextractError::PageError {
            page,
            reason: "no render available".to_string(),
        })
    }
}

/// Detection results for a whole document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFigures {
    /// Figures with an image region, by zero-based page
    pub figures: BTreeMap<usize, Vec<Figure>>,
    /// Captions without an image region, in page order
    pub errors: Vec<Figure>,
}

impl DocumentFigures {
    /// Number of figures with an image region
    #[must_use = "returns the number of located figures"]
    pub fn found(&self) -> usize {
        self.figures.values().map(Vec::len).sum()
    }

    /// All figures in page order, partial failures included when asked
    #[must_use = "returns the figures in page order"]
    pub fn all(&self, with_errors: bool) -> Vec<&Figure> {
        let mut all: Vec<&Figure> = self.figures.values().flatten().collect();
        if with_errors {
            all.extend(&self.errors);
            all.sort_by_key(|f| f.page);
        }
        all
    }
}

/// The six stages wired together
#[derive(Debug, Clone)]
pub struct FigurePipeline {
    stage01: Stage01DocumentStatistics,
    stage02: Stage02CaptionCandidates,
    stage03: Stage03CandidateDisambiguator,
    stage04: Stage04CaptionBuilder,
    stage05: Stage05RegionClassifier,
    stage06: Stage06FigureAssigner,
    foreground_threshold: u8,
    text_as_image: bool,
    only_page: Option<usize>,
}

impl Default for FigurePipeline {
    #[inline]
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl FigurePipeline {
    /// Create a pipeline from a configuration
    #[inline]
    #[must_use = "pipeline is created but not used"]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            stage01: Stage01DocumentStatistics::with_config(config.stage01),
            stage02: Stage02CaptionCandidates::new(),
            stage03: Stage03CandidateDisambiguator::with_config(config.stage03),
            stage04: Stage04CaptionBuilder::with_config(config.stage04),
            stage05: Stage05RegionClassifier::with_config(config.stage05),
            stage06: Stage06FigureAssigner::with_config(config.stage06),
            foreground_threshold: config.foreground_threshold,
            text_as_image: config.text_as_image,
            only_page: None,
        }
    }

    /// Restrict page processing to one zero-based page
    ///
    /// Document statistics and caption disambiguation still see every page.
    #[inline]
    #[must_use = "pipeline is created but not used"]
    pub const fn with_only_page(mut self, page: Option<usize>) -> Self {
        self.only_page = page;
        self
    }

    /// Stages 01-03: document statistics and accepted caption anchors
    ///
    /// # Errors
    ///
    /// Returns [`FigextractError::DuplicatePage`] when two pages share an
    /// index, and [`FigextractError::GraphicalBodyText`] when the body text
    /// is drawn as images and `text_as_image` is off.
    pub fn caption_starts(
        &self,
        pages: &[TextPage],
    ) -> Result<(DocumentStatistics, CaptionStarts)> {
        let mut seen = BTreeSet::new();
        if let Some(page) = pages.iter().map(|p| p.index).find(|&index| !seen.insert(index)) {
            return Err(FigextractError::DuplicatePage { page });
        }
        let stats = self.stage01.process(pages);
        if stats.body_is_image && !self.text_as_image {
            return Err(FigextractError::GraphicalBodyText);
        }
        let groups = self.stage02.process(pages);
        let starts = self.stage03.process(groups);
        info!(
            "{} caption(s) accepted on {} page(s)",
            starts.values().map(Vec::len).sum::<usize>(),
            starts.len()
        );
        Ok((stats, starts))
    }

    /// Run every stage over a document
    ///
    /// # Errors
    ///
    /// Only document-level refusals are errors; see [`Self::caption_starts`].
    pub fn process<S: PageImageSource + ?Sized>(
        &self,
        pages: &[TextPage],
        images: &S,
    ) -> Result<DocumentFigures> {
        let (stats, starts) = self.caption_starts(pages)?;
        let by_index: BTreeMap<usize, &TextPage> = pages.iter().map(|p| (p.index, p)).collect();

        let work: Vec<(&TextPage, &[CaptionStart])> = starts
            .iter()
            .filter(|(page, _)| self.only_page.map_or(true, |only| only == **page))
            .filter_map(|(page, page_starts)| match by_index.get(page) {
                Some(text) => Some((*text, page_starts.as_slice())),
                None => {
                    warn!("Caption anchors reference missing page {page}");
                    None
                }
            })
            .collect();

        let results: Vec<PageFigures> = work
            .par_iter()
            .map(|(page, page_starts)| self.process_page(page, &stats, page_starts, images))
            .collect();

        let mut document = DocumentFigures::default();
        for ((page, _), result) in work.iter().zip(results) {
            if !result.figures.is_empty() {
                document.figures.insert(page.index, result.figures);
            }
            document.errors.extend(result.errors);
        }
        info!(
            "{} figure(s) located, {} caption(s) without a region",
            document.found(),
            document.errors.len()
        );
        Ok(document)
    }

    /// Stages 04-06 for a single page
    #[must_use = "page figures are returned but not used"]
    pub fn process_page<S: PageImageSource + ?Sized>(
        &self,
        page: &TextPage,
        stats: &DocumentStatistics,
        starts: &[CaptionStart],
        images: &S,
    ) -> PageFigures {
        let rasters = images
            .page_images(page.index)
            .and_then(|images| self.binarize(page, stats, &images));
        let (render, graphics) = match rasters {
            Ok(rasters) => rasters,
            Err(err) => {
                warn!("Skipping page {}: {err}", page.index);
                let captions = self.stage04.process(page, starts, &[]);
                return PageFigures {
                    figures: Vec::new(),
                    errors: captions.iter().map(|c| Figure::new(c, None)).collect(),
                };
            }
        };

        let graphic_boxes: Vec<BBox> = graphics.components(Connectivity::Eight).boxes().to_vec();
        let captions = self.stage04.process(page, starts, &graphic_boxes);
        let regions = self.stage05.process(page, stats, captions, &graphics);
        debug!(
            "Page {}: {} captions, {} body text, {} graphics, {} other regions",
            page.index,
            regions.captions.len(),
            regions.bodytext.len(),
            regions.graphics.len(),
            regions.other.len()
        );
        self.stage06.process(&render, &regions, stats.two_column)
    }

    /// Binary full render and graphics mask of a page
    fn binarize(
        &self,
        page: &TextPage,
        stats: &DocumentStatistics,
        images: &PageImages,
    ) -> Result<(Bitmap, Bitmap)> {
        let (width, height) = images.render.dimensions();
        let expected = (page.width.round(), page.height.round());
        if page.width > 0.0 && expected != (f64::from(width), f64::from(height)) {
            return Err(FigextractError::PageError {
                page: page.index,
                reason: format!(
                    "render is {width}x{height}, text expects {}x{}",
                    expected.0, expected.1
                ),
            });
        }
        let render = Bitmap::from_gray(&images.render, self.foreground_threshold);

        if stats.body_is_image {
            return Ok((render, Bitmap::empty(width, height)));
        }
        let mut graphics = match &images.graphics {
            Some(gray) if gray.dimensions() == (width, height) => {
                Bitmap::from_gray(gray, self.foreground_threshold)
            }
            Some(gray) => {
                return Err(FigextractError::PageError {
                    page: page.index,
                    reason: format!(
                        "graphics render is {}x{}, expected {width}x{height}",
                        gray.width(),
                        gray.height()
                    ),
                });
            }
            None => {
                // Without a text-free render, erase the words from the full one
                let words: Vec<BBox> = page
                    .lines()
                    .flat_map(|l| l.words.iter().map(|w| w.bbox))
                    .collect();
                let mut graphics = render.clone();
                graphics.subtract(&Bitmap::from_boxes(width, height, &words));
                graphics
            }
        };
        // Graphics that never reached the full render are dropped
        graphics.and(&render);
        Ok((render, graphics))
    }
}

/// Locate every captioned figure and table in a document
///
/// # Errors
///
/// Returns [`FigextractError::ConfigError`] for an invalid configuration,
/// [`FigextractError::DuplicatePage`] when page indices repeat, and
/// [`FigextractError::GraphicalBodyText`] for documents whose body text is
/// drawn as images (unless `text_as_image` is set).
pub fn analyze_document<S: PageImageSource + ?Sized>(
    pages: &[TextPage],
    images: &S,
    config: &PipelineConfig,
) -> Result<DocumentFigures> {
    config.validate()?;
    FigurePipeline::new(config).process(pages, images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_missing_render_is_page_error() {
        let images: BTreeMap<usize, PageImages> = BTreeMap::new();
        let err = images.page_images(3).unwrap_err();
        assert!(err.is_page_error());
    }

    #[test]
    fn test_duplicate_page_index_refused() {
        let page = TextPage {
            index: 4,
            ..TextPage::default()
        };
        let err = FigurePipeline::default()
            .caption_starts(&[page.clone(), page])
            .unwrap_err();
        assert!(matches!(err, FigextractError::DuplicatePage { page: 4 }));
    }

    #[test]
    fn test_empty_document() {
        let images: BTreeMap<usize, PageImages> = BTreeMap::new();
        let result = analyze_document(&[], &images, &PipelineConfig::default()).unwrap();
        assert_eq!(result, DocumentFigures::default());
    }

    #[test]
    fn test_binarize_rejects_size_mismatch() {
        let page = TextPage {
            width: 200.0,
            height: 100.0,
            ..TextPage::default()
        };
        let images = PageImages {
            render: GrayImage::from_pixel(100, 100, Luma([255])),
            graphics: None,
        };
        let pipeline = FigurePipeline::default();
        let err = pipeline
            .binarize(&page, &DocumentStatistics::default(), &images)
            .unwrap_err();
        assert!(err.is_page_error());
    }

    #[test]
    fn test_graphics_masked_by_render() {
        let page = TextPage {
            width: 20.0,
            height: 20.0,
            ..TextPage::default()
        };
        let mut render = GrayImage::from_pixel(20, 20, Luma([255]));
        render.put_pixel(5, 5, Luma([0]));
        let mut graphics = GrayImage::from_pixel(20, 20, Luma([255]));
        graphics.put_pixel(5, 5, Luma([0]));
        graphics.put_pixel(15, 15, Luma([0]));
        let images = PageImages {
            render,
            graphics: Some(graphics),
        };
        let (render, graphics) = FigurePipeline::default()
            .binarize(&page, &DocumentStatistics::default(), &images)
            .unwrap();
        assert_eq!(render.count_in(&render.bounds()), 1);
        assert_eq!(graphics.count_in(&graphics.bounds()), 1);
        assert!(graphics.get(5, 5));
    }

    #[test]
    fn test_body_image_document_refused() {
        let stats_page = TextPage {
            width: 100.0,
            height: 100.0,
            media_width: 100.0,
            media_height: 100.0,
            embedded_images: vec![crate::text::ImageExtent {
                width: 100.0,
                height: 100.0,
            }],
            ..TextPage::default()
        };
        let images: BTreeMap<usize, PageImages> = BTreeMap::new();
        let err = analyze_document(&[stats_page.clone()], &images, &PipelineConfig::default())
            .unwrap_err();
        assert!(err.is_graphical_text());

        let config = PipelineConfig {
            text_as_image: true,
            ..PipelineConfig::default()
        };
        assert!(analyze_document(&[stats_page], &images, &config).is_ok());
    }
}
