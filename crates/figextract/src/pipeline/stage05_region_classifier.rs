// Stage 5: Page Region Classification - titles, body text, graphics, other
// Intentional conversions: pixel sizes and font sizes
#![allow(clippy::cast_precision_loss)]

use crate::pipeline::stage01_document_statistics::DocumentStatistics;
use crate::pipeline::types::{BBox, Caption, PageRegions};
use crate::raster::{Bitmap, Connectivity, SplitParams};
use crate::text::{TextLine, TextPage, Word};
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TITLE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{1,2}(\.[0-9]{1,3})?\.?$").expect("Invalid title number regex")
});

/// Configuration for Stage 5 (Page Region Classification)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage05Config {
    /// Lines more than this far above the `Abstract` heading are titles
    pub abstract_slack: f64,
    /// Margin tolerance for numbered headings
    pub heading_alignment_tolerance: f64,
    /// Min vertical gap to a next line that continues a bold title line
    pub title_continuation_gap: f64,
    /// Max distance from the title's right edge to a continuing line's start
    pub title_continuation_indent: f64,
    /// Max gap between a lone heading number and its bold heading text
    pub heading_number_gap: f64,
    /// Padding around title boxes
    pub title_pad: f64,
    /// Vertical padding of ordinary text line boxes
    pub text_pad: f64,
    /// Point-size gap below the body font for the first word of a small line
    pub small_font_gap: f64,
    /// Point-size gap below the body font for every other word of a small line
    pub small_font_gap_rest: f64,
    /// Text components covering more than this fraction of a caption are split
    pub caption_overlap: f64,
    /// Top rule: topmost graphic above this y
    pub rule_max_top: f64,
    /// Top rule: thinner than this
    pub rule_max_height: f64,
    /// Top rule: wider than this fraction of the page
    pub rule_min_width: f64,
    /// Components with more of their area on graphics are not body text
    pub graphic_fraction: f64,
    /// Smallest margin-aligned body text component
    pub min_text_area: f64,
    /// Smallest body text component when the text is rendered as images
    pub min_graphical_text_area: f64,
    /// Narrower components are not body text in two-column documents
    pub narrow_two_column: f64,
    /// Narrower components may not be body text in one-column documents
    pub narrow_one_column: f64,
    /// Narrow one-column components taller than this are not body text
    pub narrow_max_height: f64,
    /// Graphics up to this size in both dimensions are noise candidates
    pub noise_size: f64,
    /// Noise graphics covered more than this by body text are dropped
    pub noise_coverage: f64,
    pub split: SplitParams,
}

impl Default for Stage05Config {
    #[inline]
    fn default() -> Self {
        Self {
            abstract_slack: 10.0,
            heading_alignment_tolerance: 4.0,
            title_continuation_gap: 10.0,
            title_continuation_indent: 20.0,
            heading_number_gap: 50.0,
            title_pad: 3.0,
            text_pad: 3.0,
            small_font_gap: 4.0,
            small_font_gap_rest: 3.0,
            caption_overlap: 0.5,
            rule_max_top: 50.0,
            rule_max_height: 5.0,
            rule_min_width: 0.70,
            graphic_fraction: 0.40,
            min_text_area: 600.0,
            min_graphical_text_area: 15000.0,
            narrow_two_column: 150.0,
            narrow_one_column: 200.0,
            narrow_max_height: 50.0,
            noise_size: 50.0,
            noise_coverage: 0.80,
            split: SplitParams::default(),
        }
    }
}

/// A non-empty line with its box and the next line of its block
#[derive(Debug, Clone, Copy)]
struct PageLine<'a> {
    line: &'a TextLine,
    first: &'a Word,
    bbox: BBox,
    next: Option<usize>,
}

fn page_lines(page: &TextPage) -> Vec<PageLine<'_>> {
    let mut lines = Vec::new();
    for block in &page.blocks {
        let block_lines: Vec<&TextLine> =
            block.lines.iter().filter(|l| !l.words.is_empty()).collect();
        let base = lines.len();
        for (i, &line) in block_lines.iter().enumerate() {
            let (Some(first), Some(bbox)) = (line.first_word(), line.bbox()) else {
                continue;
            };
            lines.push(PageLine {
                line,
                first,
                bbox,
                next: (i + 1 < block_lines.len()).then_some(base + i + 1),
            });
        }
    }
    lines
}

/// Stage 5: Page Region Classification
///
/// Partitions the page's non-caption content into body text, graphics and
/// other boxes.
///
/// Steps:
/// 1. Title lines (headings, page headers and numbers, front matter above
///    `Abstract` on the first page) become padded body text boxes
/// 2. Each remaining line becomes one box of its non-caption words; rotated
///    or undersized lines are graphics, the rest ordinary text
/// 3. Ordinary text is rasterized, graphics removed and the mask re-split
///    into 4-connected components
/// 4. Components swallowing a caption are split into body text. The rest
///    are body text or other by graphic overlap, margin alignment and size
///
/// `graphics` is the binarized graphics-only render (empty when body text is
/// itself drawn as images).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage05RegionClassifier {
    config: Stage05Config,
}

impl Stage05RegionClassifier {
    #[inline]
    #[must_use = "region classifier is created but not used"]
    pub fn new() -> Self {
        Self {
            config: Stage05Config::default(),
        }
    }

    #[inline]
    #[must_use = "region classifier is created but not used"]
    pub const fn with_config(config: Stage05Config) -> Self {
        Self { config }
    }

    /// Classify one page
    #[must_use = "page regions are returned but not used"]
    pub fn process(
        &self,
        page: &TextPage,
        stats: &DocumentStatistics,
        captions: Vec<Caption>,
        graphics: &Bitmap,
    ) -> PageRegions {
        let cfg = &self.config;
        let (width, height) = (graphics.width(), graphics.height());
        let lines = page_lines(page);
        let (titles, is_title) = self.find_titles(&lines, page.index, stats);

        let mut bodytext: Vec<BBox> =
            titles.iter().map(|&i| lines[i].bbox.pad(cfg.title_pad)).collect();
        let mut graphic_boxes: Vec<BBox> = Vec::new();
        let mut text_boxes: Vec<BBox> = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if is_title[i] {
                continue;
            }
            let words: Vec<&Word> = line
                .line
                .words
                .iter()
                .filter(|w| !captions.iter().any(|c| c.bbox.contains(&inset(&w.bbox))))
                .collect();
            let Some(bbox) = BBox::extent(words.iter().map(|w| &w.bbox)) else {
                continue;
            };
            let mode = stats.mode_font_size;
            let small = mode > words[0].font_size + cfg.small_font_gap
                && words.iter().all(|w| mode > w.font_size + cfg.small_font_gap_rest);
            if line.line.is_rotated() || small {
                graphic_boxes.push(bbox);
            } else {
                text_boxes.push(bbox.pad_xy(0.0, cfg.text_pad));
            }
        }

        let mut text_mask = Bitmap::from_boxes(width, height, &text_boxes);
        text_mask.subtract(graphics);
        let components = text_mask.components(Connectivity::Four);

        graphic_boxes.extend_from_slice(graphics.components(Connectivity::Eight).boxes());
        let graphic_mask = Bitmap::from_boxes(width, height, &graphic_boxes);

        // Text wrapped around a caption notch swallows it; cut such components up
        let mut consumed = vec![false; components.len()];
        for caption in &captions {
            for (index, bbox) in components.boxes().iter().enumerate() {
                let swallowed = bbox.overlap_fraction(&caption.bbox) > cfg.caption_overlap;
                if swallowed && !consumed[index] {
                    consumed[index] = true;
                    let pieces = components.split_component(index, &cfg.split);
                    debug!("Split a text component into {} around a caption", pieces.len());
                    bodytext.extend(pieces);
                }
            }
        }

        if let Some(top) = graphic_boxes
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.t.total_cmp(&b.1.t))
            .map(|(i, _)| i)
        {
            let rule = graphic_boxes[top];
            if rule.t < cfg.rule_max_top
                && rule.height() < cfg.rule_max_height
                && rule.width() / f64::from(width) > cfg.rule_min_width
            {
                trace!("Found top rule at y={}", rule.t);
                bodytext.push(graphic_boxes.remove(top));
            }
        }

        let mut other = Vec::new();
        for (index, bbox) in components.boxes().iter().enumerate() {
            if consumed[index] {
                continue;
            }
            if self.is_body_text(bbox, stats, &graphic_mask) {
                bodytext.push(*bbox);
            } else {
                other.push(*bbox);
            }
        }

        graphic_boxes.retain(|g| {
            g.width() > cfg.noise_size
                || g.height() > cfg.noise_size
                || !bodytext.iter().any(|b| b.overlap_fraction(g) > cfg.noise_coverage)
        });

        debug!(
            "Page {}: {} titles, {} body, {} graphics, {} other",
            page.index,
            titles.len(),
            bodytext.len(),
            graphic_boxes.len(),
            other.len()
        );
        PageRegions {
            captions,
            bodytext,
            graphics: graphic_boxes,
            other,
        }
    }

    fn is_body_text(
        &self,
        bbox: &BBox,
        stats: &DocumentStatistics,
        graphic_mask: &Bitmap,
    ) -> bool {
        let cfg = &self.config;
        if graphic_mask.average_in(bbox) > cfg.graphic_fraction {
            return false;
        }
        let min_area = if stats.body_is_image {
            cfg.min_graphical_text_area
        } else if stats.line_is_aligned(bbox.l, bbox.r) {
            cfg.min_text_area
        } else {
            return false;
        };
        let (w, h) = (bbox.width(), bbox.height());
        let narrow = if stats.two_column {
            w < cfg.narrow_two_column
        } else {
            w < cfg.narrow_one_column && (h > w * 2.0 || h > cfg.narrow_max_height)
        };
        bbox.area() >= min_area && !narrow
    }

    /// Title lines in the order found, plus a per-line title mask
    fn find_titles(
        &self,
        lines: &[PageLine<'_>],
        page_index: usize,
        stats: &DocumentStatistics,
    ) -> (Vec<usize>, Vec<bool>) {
        let cfg = &self.config;
        let mut titles = Vec::new();
        let mut remaining: Vec<usize> = (0..lines.len()).collect();

        if page_index == 0 {
            let abstract_y = lines
                .iter()
                .find(|l| l.first.text == "Abstract")
                .map(|l| l.first.bbox.t);
            if let Some(abstract_y) = abstract_y {
                remaining.retain(|&i| {
                    let y = lines[i].first.bbox.t;
                    let front_matter = y == abstract_y || y < abstract_y - cfg.abstract_slack;
                    if front_matter {
                        titles.push(i);
                    }
                    !front_matter
                });
            }
        }

        let top = remaining
            .iter()
            .copied()
            .reduce(|a, b| if lines[b].bbox.t < lines[a].bbox.t { b } else { a });
        let bottom = remaining
            .iter()
            .copied()
            .reduce(|a, b| if lines[b].bbox.b > lines[a].bbox.b { b } else { a });
        if let Some(bottom) = bottom {
            if stats.is_page_number(lines[bottom].line) {
                titles.push(bottom);
                remaining.retain(|&i| i != bottom);
            }
        }
        if let Some(top) = top {
            if remaining.contains(&top) && stats.is_page_header(lines[top].line) {
                titles.push(top);
                remaining.retain(|&i| i != top);
            }
        }

        let mut heading_numbers = Vec::new();
        let mut bold_lines = Vec::new();
        remaining.retain(|&i| {
            let line = &lines[i];
            if !stats.line_is_bold(line.line) {
                return true;
            }
            let lone_short = line.line.words.len() == 1 && line.first.text.chars().count() <= 4;
            if stats.is_bold_centered(line.bbox.l, line.bbox.r)
                && !lone_short
                && stats.word_is_large(line.first)
            {
                let continued = line.next.is_some_and(|n| {
                    let next = lines[n].first.bbox;
                    (next.t - line.bbox.b).abs() >= cfg.title_continuation_gap
                        && (next.l - line.bbox.r).abs() <= cfg.title_continuation_indent
                });
                if !continued {
                    titles.push(i);
                }
                return continued;
            }
            let numbered = TITLE_NUMBER.is_match(&line.first.text);
            if !numbered {
                bold_lines.push(i);
                return true;
            }
            let tol = cfg.heading_alignment_tolerance;
            if !stats.line_is_aligned_to_tol(line.bbox.l, line.bbox.r, tol, tol) {
                return true;
            }
            if line.line.words.len() == 1 {
                heading_numbers.push(i);
            }
            titles.push(i);
            false
        });

        // A lone heading number pulls in the bold heading text beside it
        for &number in &heading_numbers {
            let start = lines[number].bbox;
            let found = bold_lines.iter().position(|&j| {
                let text = lines[j].bbox;
                (text.t - start.t).abs() <= 1.0
                    && start.r < text.l
                    && text.l - start.r < cfg.heading_number_gap
            });
            if let Some(pos) = found {
                let j = bold_lines.remove(pos);
                titles.push(j);
                remaining.retain(|&i| i != j);
            }
        }
        debug!(
            "Found {} title lines ({} numbered headings)",
            titles.len(),
            heading_numbers.len()
        );

        let mut is_title = vec![false; lines.len()];
        for &i in &titles {
            is_title[i] = true;
        }
        (titles, is_title)
    }
}

/// Word box shrunk on its leading edges
#[inline]
fn inset(bbox: &BBox) -> BBox {
    BBox::new(bbox.l + 1.0, bbox.t + 1.0, bbox.r, bbox.b)
}
