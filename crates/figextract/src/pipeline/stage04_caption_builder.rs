// Stage 4: Caption Region Building - grow anchors into multi-line captions
// Pixel coordinates are rounded before comparing against component boxes
#![allow(clippy::cast_precision_loss)]

use crate::pipeline::types::{BBox, Caption, CaptionStart};
use crate::text::{RankedWord, TextPage};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

/// Configuration for Stage 4 (Caption Region Building)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage04Config {
    /// Slack around a row when collecting words on the same text row
    pub row_slack: f64,
    /// Largest horizontal gap bridged when extending a line rightward
    pub extend_gap: f64,
    /// A word may start this far left of the current right edge
    pub extend_overlap: f64,
    /// Right-margin raggedness that, after a trailing period, ends a caption
    pub ragged_margin: f64,
    /// Allowed vertical gap range from the region bottom to the next line
    pub next_line_gap: (f64, f64),
    /// Next-line words may end this far left of the region
    pub line_left_slack: f64,
    /// Tolerance for left alignment and for center alignment
    pub alignment_tolerance: f64,
    /// Intersections thinner than this that span the line are rules
    pub rule_max_height: f64,
    /// Fraction of the line width a crossing rule must cover
    pub graphic_line_coverage: f64,
    /// Intersection area with a graphic that always blocks a line
    pub graphic_max_area: f64,
    /// Padding applied to the finished caption box
    pub caption_pad: f64,
}

impl Default for Stage04Config {
    #[inline]
    fn default() -> Self {
        Self {
            row_slack: 4.0,
            extend_gap: 20.0,
            extend_overlap: 2.0,
            ragged_margin: 60.0,
            next_line_gap: (-3.0, 8.0),
            line_left_slack: 5.0,
            alignment_tolerance: 2.0,
            rule_max_height: 15.0,
            graphic_line_coverage: 0.90,
            graphic_max_area: 8000.0,
            caption_pad: 1.5,
        }
    }
}

/// How the lines of a caption line up with each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineAlignment {
    /// Only one line so far, or every line was both left aligned and centered
    Unknown,
    LeftAligned,
    Centered,
}

/// A caption being grown line by line
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionRegion {
    pub bbox: BBox,
    /// Lines may not extend past this x
    pub x_limit: f64,
    pub alignment: LineAlignment,
    /// Ranks of absorbed words, in absorption order
    pub words: Vec<usize>,
    pub lines: usize,
}

/// Page data shared by every caption grown on the page
#[derive(Debug, Clone)]
pub struct GrowthContext<'a> {
    words: Vec<RankedWord<'a>>,
    /// Ranks of every caption anchor on the page
    edges: Vec<usize>,
    graphics: &'a [BBox],
}

impl<'a> GrowthContext<'a> {
    /// `graphics` are the 8-connected components of the page graphics
    #[must_use = "growth context is created but not used"]
    pub fn new(page: &'a TextPage, starts: &[CaptionStart], graphics: &'a [BBox]) -> Self {
        Self {
            words: page.words(),
            edges: starts.iter().map(|s| s.word_rank).collect(),
            graphics,
        }
    }

    #[inline]
    fn is_edge(&self, rank: usize) -> bool {
        self.edges.contains(&rank)
    }
}

#[inline]
fn round(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Stage 4: Caption Region Building
///
/// Grows each accepted caption anchor into a caption box.
///
/// Algorithm:
/// 1. Seed: the anchor plus the words to its right on the same row, stopping
///    at a gap wider than `extend_gap` or at another caption's anchor
/// 2. Add lines below while they start at the region's left edge or share
///    its center; the first line that is one but not the other fixes the
///    alignment for the rest of the caption
/// 3. Stop at a ragged line ending in a period, at a misaligned line, or at
///    a line crossing a graphic
///
/// Every `CaptionStart` yields exactly one `Caption`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage04CaptionBuilder {
    config: Stage04Config,
}

impl Stage04CaptionBuilder {
    #[inline]
    #[must_use = "caption builder is created but not used"]
    pub fn new() -> Self {
        Self {
            config: Stage04Config::default(),
        }
    }

    #[inline]
    #[must_use = "caption builder is created but not used"]
    pub const fn with_config(config: Stage04Config) -> Self {
        Self { config }
    }

    /// Build captions for all anchors on a page, in anchor order
    #[must_use = "captions are returned but not used"]
    pub fn process(
        &self,
        page: &TextPage,
        starts: &[CaptionStart],
        graphics: &[BBox],
    ) -> Vec<Caption> {
        let ctx = GrowthContext::new(page, starts, graphics);
        starts
            .iter()
            .map(|start| {
                let Some(mut region) = self.seed(&ctx, start) else {
                    warn!(
                        "{} {} anchor rank {} not found on page {}, using the anchor box",
                        start.figure_type, start.number, start.word_rank, start.page
                    );
                    return self.anchor_only(start);
                };
                let added = self.grow(&ctx, &mut region);
                debug!(
                    "{} {}: {} caption line(s) on page {}",
                    start.figure_type,
                    start.number,
                    added + 1,
                    start.page
                );
                self.finish(&ctx, start, &region)
            })
            .collect()
    }

    /// Caption made of the anchor box alone, for anchors missing from the page words
    #[must_use = "caption is returned but not used"]
    pub fn anchor_only(&self, start: &CaptionStart) -> Caption {
        Caption {
            page: start.page,
            number: start.number,
            figure_type: start.figure_type,
            bbox: start.anchor_bbox.pad(self.config.caption_pad),
            text: format!("{} {}", start.figure_type, start.number),
        }
    }

    /// Words to the right of `bbox.l` whose vertical center falls within the row
    fn row_words<'c>(&self, ctx: &'c GrowthContext<'_>, bbox: &BBox) -> Vec<&'c RankedWord<'c>> {
        ctx.words
            .iter()
            .filter(|w| {
                let cy = w.word.bbox.center_y();
                cy + self.config.row_slack > bbox.t
                    && cy - self.config.row_slack < bbox.b
                    && w.word.bbox.l > bbox.l
            })
            .collect()
    }

    /// Leftmost caption anchor among `row`, or no limit
    fn edge_limit(ctx: &GrowthContext<'_>, row: &[&RankedWord<'_>]) -> f64 {
        row.iter()
            .filter(|w| ctx.is_edge(w.rank))
            .map(|w| w.word.bbox.l)
            .fold(f64::INFINITY, f64::min)
    }

    /// Absorb words rightward from `bbox` until a gap or `limit`
    fn extend_right(
        &self,
        row: &[&RankedWord<'_>],
        mut bbox: BBox,
        limit: f64,
    ) -> (BBox, Vec<usize>) {
        let mut absorbed = Vec::new();
        while let Some(next) = row.iter().find(|w| {
            let b = &w.word.bbox;
            b.l - bbox.r < self.config.extend_gap
                && b.l > bbox.r - self.config.extend_overlap
                && b.l < limit
                && b.r > bbox.r
        }) {
            bbox = bbox.union(&next.word.bbox);
            absorbed.push(next.rank);
        }
        (bbox, absorbed)
    }

    /// Single-line region around an anchor
    #[must_use = "seeded region is returned but not used"]
    pub fn seed(&self, ctx: &GrowthContext<'_>, start: &CaptionStart) -> Option<CaptionRegion> {
        let anchor = ctx.words.get(start.word_rank)?;
        let row = self.row_words(ctx, &anchor.word.bbox);
        let limit = Self::edge_limit(ctx, &row);
        let (bbox, rest) = self.extend_right(&row, anchor.word.bbox, limit);
        let mut words = vec![anchor.rank];
        words.extend(rest);
        Some(CaptionRegion {
            bbox,
            x_limit: limit,
            alignment: LineAlignment::Unknown,
            words,
            lines: 1,
        })
    }

    /// Add lines until the region is done, returning how many were added
    ///
    /// Growing a finished region again adds nothing.
    pub fn grow(&self, ctx: &GrowthContext<'_>, region: &mut CaptionRegion) -> usize {
        let mut added = 0;
        while self.add_line(ctx, region) {
            added += 1;
        }
        added
    }

    fn add_line(&self, ctx: &GrowthContext<'_>, region: &mut CaptionRegion) -> bool {
        let cfg = &self.config;
        if region.alignment != LineAlignment::Centered {
            let last = region.words.last().and_then(|&rank| ctx.words.get(rank));
            if let Some(last) = last {
                let ragged = region.bbox.r - last.word.bbox.r > cfg.ragged_margin;
                if ragged && last.word.ends_with_period() {
                    trace!("Caption ends at ragged line after rank {}", last.rank);
                    return false;
                }
            }
        }

        let (min_gap, max_gap) = cfg.next_line_gap;
        let Some(start) = ctx
            .words
            .iter()
            .filter(|w| {
                let b = &w.word.bbox;
                let gap = b.t - region.bbox.b;
                gap > min_gap
                    && gap < max_gap
                    && b.r - region.bbox.l > -cfg.line_left_slack
                    && b.b - 1.0 > region.bbox.b
            })
            .min_by(|a, b| a.word.bbox.l.total_cmp(&b.word.bbox.l))
        else {
            return false;
        };
        if ctx.is_edge(start.rank) {
            return false;
        }

        let row = self.row_words(ctx, &start.word.bbox);
        let limit = region.x_limit.min(Self::edge_limit(ctx, &row));
        let (line, rest) = self.extend_right(&row, start.word.bbox, limit);

        let left_aligned = (line.l - region.bbox.l).abs() < cfg.alignment_tolerance;
        let centered = (line.center_x() - region.bbox.center_x()).abs() < cfg.alignment_tolerance;
        if !left_aligned && !centered {
            return false;
        }
        let alignment = match region.alignment {
            LineAlignment::Unknown if !(left_aligned && centered) => {
                if centered {
                    LineAlignment::Centered
                } else {
                    LineAlignment::LeftAligned
                }
            }
            current => current,
        };

        if self.crosses_graphic(ctx.graphics, &line) {
            trace!("Caption line at y={} runs into a graphic", line.t);
            return false;
        }
        let accepted = (centered && alignment != LineAlignment::LeftAligned)
            || (left_aligned && alignment != LineAlignment::Centered);
        if !accepted {
            return false;
        }

        region.alignment = alignment;
        region.bbox = region.bbox.union(&line);
        region.x_limit = region.x_limit.min(limit);
        region.words.push(start.rank);
        region.words.extend(rest);
        region.lines += 1;
        true
    }

    /// A thin rule spanning the line, or a large overlap with any graphic
    fn crosses_graphic(&self, graphics: &[BBox], line: &BBox) -> bool {
        let cfg = &self.config;
        let line_width = line.width();
        graphics.iter().any(|g| {
            let w = g.r.min(round(line.r)) - g.l.max(round(line.l));
            if w < 0.0 {
                return false;
            }
            let h = g.b.min(round(line.b)) - g.t.max(line.t);
            let thin_rule = (0.0..cfg.rule_max_height).contains(&h)
                && line_width > 0.0
                && w / line_width > cfg.graphic_line_coverage;
            thin_rule || w * h > cfg.graphic_max_area
        })
    }

    /// Padded caption box with its text
    #[must_use = "caption is returned but not used"]
    pub fn finish(
        &self,
        ctx: &GrowthContext<'_>,
        start: &CaptionStart,
        region: &CaptionRegion,
    ) -> Caption {
        let text = region
            .words
            .iter()
            .filter_map(|&rank| ctx.words.get(rank))
            .map(|w| w.word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Caption {
            page: start.page,
            number: start.number,
            figure_type: start.figure_type,
            bbox: region.bbox.pad(self.config.caption_pad),
            text,
        }
    }
}
