// Stage 6: Figure Assignment - proposals, scoring, configuration search
// Intentional conversions: pixel extents and configuration counts
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

use crate::pipeline::types::{BBox, Caption, Figure, FigureType, PageRegions, Placement};
use crate::raster::Bitmap;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

/// Configuration for Stage 6 (Figure Assignment)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage06Config {
    /// Tolerance when deciding which side of an obstacle a caption is on
    pub adjacency_tolerance: f64,
    /// Padding of the content frame that bounds the page margins
    pub margin_pad: f64,
    /// Gap kept from a horizontally adjacent obstacle
    pub horizontal_gap: f64,
    /// Gap kept from a vertically adjacent obstacle
    pub vertical_gap: f64,
    /// Proposals narrower or shorter than this score zero
    pub min_region_size: f64,
    /// Max fraction of a claimed region a proposal may cover
    pub claimed_overlap: f64,
    /// Graphics this fraction inside a proposal count as contained
    pub contained_fraction: f64,
    /// Graphics larger than this, less than `cut_fraction_small` inside, void a proposal
    pub cut_area_small: f64,
    pub cut_fraction_small: f64,
    /// Graphics larger than this, less than `cut_fraction_large` inside, void a proposal
    pub cut_area_large: f64,
    pub cut_fraction_large: f64,
    /// Contained graphic area earning a figure the full bonus
    pub large_graphic_area: f64,
    /// Contained graphic area earning a figure the partial bonus
    pub medium_graphic_area: f64,
    /// Contained graphic area earning a table its bonus
    pub table_graphic_area: f64,
    /// Width fraction at which a contained graphic spans a table
    pub line_across_fraction: f64,
    /// Height of the blank strip searched when splitting a shared box
    pub split_strip_height: f64,
    /// Cap on configurations evaluated per page
    pub max_configurations: usize,
    /// Padding around accepted image regions
    pub image_pad: f64,
}

impl Default for Stage06Config {
    #[inline]
    fn default() -> Self {
        Self {
            adjacency_tolerance: 2.0,
            margin_pad: 2.0,
            horizontal_gap: 2.0,
            vertical_gap: 3.0,
            min_region_size: 25.0,
            claimed_overlap: 0.1,
            contained_fraction: 0.98,
            cut_area_small: 1000.0,
            cut_fraction_small: 0.5,
            cut_area_large: 3000.0,
            cut_fraction_large: 0.8,
            large_graphic_area: 18000.0,
            medium_graphic_area: 600.0,
            table_graphic_area: 1000.0,
            line_across_fraction: 0.5,
            split_strip_height: 5.0,
            max_configurations: 10_000,
            image_pad: 2.0,
        }
    }
}

/// Figures found on one page and captions left without an image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFigures {
    pub figures: Vec<Figure>,
    pub errors: Vec<Figure>,
}

/// A proposal kept for a caption, with its standalone score
#[derive(Debug, Clone, Copy, PartialEq)]
struct Proposal {
    bbox: BBox,
    score: f64,
}

/// Everything scoring needs about the page
struct ScoringContext<'a> {
    render: &'a Bitmap,
    obstacles: &'a [BBox],
    graphics: &'a [BBox],
    page_area: f64,
}

/// Iterates every index tuple of a mixed-radix space, first digit fastest
#[derive(Debug, Clone)]
struct Configurations {
    radices: Vec<usize>,
    next: usize,
    total: usize,
}

impl Configurations {
    fn new(radices: Vec<usize>) -> Self {
        let total = radices.iter().product();
        Self {
            radices,
            next: 0,
            total,
        }
    }
}

impl Iterator for Configurations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let mut rest = self.next;
        let digits = self
            .radices
            .iter()
            .map(|&radix| {
                let digit = rest % radix;
                rest /= radix;
                digit
            })
            .collect();
        self.next += 1;
        Some(digits)
    }
}

/// Stage 6: Figure Assignment
///
/// Proposes image regions for every caption on a page and picks the best
/// joint assignment.
///
/// Algorithm:
/// 1. Obstacles: body text, the strips outside the page content frame, captions
/// 2. Each obstacle adjacent to a caption along exactly one axis bounds a
///    proposal between the two, widened on the free axis to the nearest
///    obstacles and clipped to the page foreground
/// 3. Captions without a positive proposal fail immediately
/// 4. Every combination of proposals (up to `max_configurations`) is
///    evaluated: shared boxes of stacked captions are split along a blank
///    strip, then all proposals are rescored against each other
/// 5. The configuration with the most positive scores, then the highest
///    total, wins; captions scoring zero in it are partial failures
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage06FigureAssigner {
    config: Stage06Config,
}

impl Stage06FigureAssigner {
    #[inline]
    #[must_use = "figure assigner is created but not used"]
    pub fn new() -> Self {
        Self {
            config: Stage06Config::default(),
        }
    }

    #[inline]
    #[must_use = "figure assigner is created but not used"]
    pub const fn with_config(config: Stage06Config) -> Self {
        Self { config }
    }

    /// Assign image regions to the captions of one page
    ///
    /// `render` is the binarized full page render.
    #[must_use = "page figures are returned but not used"]
    pub fn process(&self, render: &Bitmap, regions: &PageRegions, two_column: bool) -> PageFigures {
        let mut result = PageFigures::default();
        if regions.captions.is_empty() {
            return result;
        }

        let obstacles = self.obstacles(render, regions);
        let ctx = ScoringContext {
            render,
            obstacles: &obstacles,
            graphics: &regions.graphics,
            page_area: f64::from(render.width()) * f64::from(render.height()),
        };

        let mut captions: Vec<&Caption> = Vec::new();
        let mut proposals: Vec<Vec<Proposal>> = Vec::new();
        for caption in &regions.captions {
            let candidates = self.proposals_for(&ctx, caption, two_column);
            if candidates.is_empty() {
                debug!("No region found for {} {}", caption.figure_type, caption.number);
                result.errors.push(Figure::new(caption, None));
            } else {
                captions.push(caption);
                proposals.push(candidates);
            }
        }
        if captions.is_empty() {
            return result;
        }

        self.cap_configurations(&mut proposals);
        let radices: Vec<usize> = proposals.iter().map(Vec::len).collect();
        debug!(
            "Evaluating {} configurations for {} captions",
            radices.iter().product::<usize>(),
            captions.len()
        );

        let mut best: Option<(usize, f64, Vec<BBox>, Vec<bool>)> = None;
        for selection in Configurations::new(radices) {
            let mut boxes: Vec<BBox> = selection
                .iter()
                .zip(&proposals)
                .map(|(&choice, list)| list[choice].bbox)
                .collect();
            self.split_shared_boxes(render, &captions, &mut boxes);

            let scores: Vec<f64> = boxes
                .iter()
                .zip(&captions)
                .enumerate()
                .map(|(i, (bbox, caption))| {
                    self.score(&ctx, bbox, caption.figure_type, &boxes, Some(i))
                })
                .collect();
            let found = scores.iter().filter(|&&s| s > 0.0).count();
            let total: f64 = scores.iter().sum();
            let better = best
                .as_ref()
                .map_or(true, |(bf, bt, _, _)| found > *bf || (found == *bf && total > *bt));
            if better {
                let keep = scores.iter().map(|&s| s > 0.0).collect();
                best = Some((found, total, boxes, keep));
            }
        }

        let Some((_, _, boxes, keep)) = best else {
            return result;
        };
        let (width, height) = (f64::from(render.width()), f64::from(render.height()));
        for ((caption, bbox), kept) in captions.iter().zip(boxes).zip(keep) {
            if kept {
                let image = bbox.pad(self.config.image_pad).clamp_to(width, height);
                result.figures.push(Figure::new(caption, Some(image)));
            } else {
                result.errors.push(Figure::new(caption, None));
            }
        }
        result
    }

    /// Body text, the margin strips around the page content, and captions
    fn obstacles(&self, render: &Bitmap, regions: &PageRegions) -> Vec<BBox> {
        let (width, height) = (f64::from(render.width()), f64::from(render.height()));
        let content = [
            render.clip_to_foreground(None),
            BBox::extent(&regions.graphics),
            BBox::extent(&regions.bodytext),
            BBox::extent(&regions.other),
        ];
        let frame = content
            .into_iter()
            .flatten()
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| render.bounds())
            .pad(self.config.margin_pad)
            .clamp_to(width, height);

        let strips = [
            BBox::new(0.0, 0.0, width, frame.t),
            BBox::new(0.0, frame.b, width, height),
            BBox::new(0.0, 0.0, frame.l, height),
            BBox::new(frame.r, 0.0, width, height),
        ];
        let mut obstacles = regions.bodytext.clone();
        obstacles.extend(strips.into_iter().filter(BBox::is_valid));
        obstacles.extend(regions.captions.iter().map(|c| c.bbox));
        obstacles
    }

    /// Positive-scoring proposals for one caption, deduplicated, best first
    fn proposals_for(
        &self,
        ctx: &ScoringContext<'_>,
        caption: &Caption,
        two_column: bool,
    ) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = Vec::new();
        for obstacle in ctx.obstacles {
            let Some(region) = self.propose(ctx, &caption.bbox, obstacle, two_column) else {
                continue;
            };
            if proposals.iter().any(|p| p.bbox == region) {
                continue;
            }
            let score = self.score(ctx, &region, caption.figure_type, &[], None);
            if score > 0.0 {
                proposals.push(Proposal { bbox: region, score });
            }
        }
        proposals.sort_by(|a, b| b.score.total_cmp(&a.score));
        trace!(
            "{} {}: {} proposals",
            caption.figure_type,
            caption.number,
            proposals.len()
        );
        proposals
    }

    /// Region between a caption and one adjacent obstacle
    fn propose(
        &self,
        ctx: &ScoringContext<'_>,
        caption: &BBox,
        obstacle: &BBox,
        two_column: bool,
    ) -> Option<BBox> {
        let cfg = &self.config;
        let relation = caption.relation_to(obstacle, cfg.adjacency_tolerance);
        if !relation.is_axis_adjacent() {
            return None;
        }
        let (width, height) = (f64::from(ctx.render.width()), f64::from(ctx.render.height()));
        let mut region = match (relation.horizontal, relation.vertical) {
            (Placement::After, _) => {
                let r = caption.with_left(obstacle.r + cfg.horizontal_gap);
                expand_vertically(r, ctx.obstacles, height).with_right(caption.l - 1.0)
            }
            (Placement::Before, _) => {
                let r = caption.with_right(obstacle.l - cfg.horizontal_gap);
                expand_vertically(r, ctx.obstacles, height).with_left(caption.r + 1.0)
            }
            (_, Placement::After) => {
                let r = caption.with_top(obstacle.b + cfg.vertical_gap);
                expand_horizontally(r, ctx.obstacles, width).with_bottom(caption.t - 1.0)
            }
            (_, Placement::Before) => {
                let r = caption.with_bottom(obstacle.t - cfg.vertical_gap);
                expand_horizontally(r, ctx.obstacles, width).with_top(caption.b + 1.0)
            }
            (Placement::Overlapping, Placement::Overlapping) => return None,
        };

        // Single-column captions keep their figures on their own side of the gutter
        if two_column {
            let center = width / 2.0;
            if caption.r <= center && region.r > center {
                region = region.with_right(center - 1.0);
            } else if caption.l >= center && region.l < center {
                region = region.with_left(center + 1.0);
            }
        }
        if !region.is_valid() {
            return None;
        }
        ctx.render.clip_to_foreground(Some(&region))
    }

    /// Standalone or in-configuration score of a region; zero means unusable
    ///
    /// `claimed` are regions already taken, `self_index` the position of
    /// `region` among them.
    fn score(
        &self,
        ctx: &ScoringContext<'_>,
        region: &BBox,
        figure_type: FigureType,
        claimed: &[BBox],
        self_index: Option<usize>,
    ) -> f64 {
        let cfg = &self.config;
        if region.width() < cfg.min_region_size || region.height() < cfg.min_region_size {
            return 0.0;
        }
        if ctx.render.is_blank(region) {
            return 0.0;
        }
        if ctx.obstacles.iter().any(|o| o.intersects(region)) {
            return 0.0;
        }
        let overlaps_claim = claimed
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self_index)
            .any(|(_, c)| region.overlap_fraction(c) > cfg.claimed_overlap);
        if overlaps_claim {
            return 0.0;
        }

        let mut largest = 0.0_f64;
        let mut line_across = false;
        let mut touching = 0;
        for graphic in ctx.graphics.iter().filter(|g| g.intersects(region)) {
            touching += 1;
            let inside = region.overlap_fraction(graphic);
            let area = graphic.area();
            if inside > cfg.contained_fraction {
                largest = largest.max(area);
                if graphic.width() / region.width() > cfg.line_across_fraction {
                    line_across = true;
                }
            } else if (area > cfg.cut_area_small && inside < cfg.cut_fraction_small)
                || (area > cfg.cut_area_large && inside < cfg.cut_fraction_large)
            {
                return 0.0;
            }
        }

        let mut score = 10.0;
        match figure_type {
            FigureType::Figure => {
                if largest > cfg.large_graphic_area {
                    score += 2.0;
                } else if largest > cfg.medium_graphic_area || touching > 2 {
                    score += 1.0;
                }
            }
            FigureType::Table => {
                if line_across && largest > cfg.table_graphic_area {
                    score += 1.0;
                }
            }
        }
        score + region.area() / ctx.page_area
    }

    /// Drop the weakest proposals of the most ambiguous captions until the
    /// configuration count fits the cap
    fn cap_configurations(&self, proposals: &mut [Vec<Proposal>]) {
        let max = self.config.max_configurations.max(1);
        let count = |p: &[Vec<Proposal>]| {
            p.iter()
                .try_fold(1usize, |acc, list| acc.checked_mul(list.len()))
                .unwrap_or(usize::MAX)
        };
        let before = count(&*proposals);
        while count(&*proposals) > max {
            let Some(widest) = proposals
                .iter_mut()
                .filter(|list| list.len() > 1)
                .reduce(|a, b| if b.len() > a.len() { b } else { a })
            else {
                break;
            };
            widest.pop();
        }
        if before > max {
            warn!("Capped {before} configurations to {}", count(&*proposals));
        }
    }

    /// Split boxes shared by vertically stacked captions along a blank strip
    fn split_shared_boxes(&self, render: &Bitmap, captions: &[&Caption], boxes: &mut [BBox]) {
        for i in 0..boxes.len() {
            for j in i + 1..boxes.len() {
                if boxes[i] != boxes[j] {
                    continue;
                }
                let relation = captions[i]
                    .bbox
                    .relation_to(&captions[j].bbox, self.config.adjacency_tolerance);
                if relation.vertical == Placement::Overlapping
                    || relation.horizontal != Placement::Overlapping
                {
                    continue;
                }
                let Some(split) = self.find_split(render, &boxes[i]) else {
                    continue;
                };
                let top = render.clip_to_foreground(Some(&boxes[i].with_bottom(split)));
                let bottom = render.clip_to_foreground(Some(&boxes[i].with_top(split + 1.0)));
                let (Some(top), Some(bottom)) = (top, bottom) else {
                    continue;
                };
                trace!("Split a shared region at y={split}");
                if relation.vertical == Placement::Before {
                    boxes[i] = top;
                    boxes[j] = bottom;
                } else {
                    boxes[i] = bottom;
                    boxes[j] = top;
                }
            }
        }
    }

    /// Row at the center of a blank horizontal strip near the middle of `region`
    ///
    /// Strips are tried at growing offsets from the midpoint, up and then
    /// down, within a quarter of the region height.
    fn find_split(&self, render: &Bitmap, region: &BBox) -> Option<f64> {
        let strip_height = self.config.split_strip_height;
        let center = region.t + (region.height() / 2.0).floor() - (strip_height / 2.0).ceil();
        let reach = (region.height() / 4.0).floor() as i64;
        (0..reach).find_map(|offset| {
            [-1.0, 1.0].into_iter().find_map(|direction| {
                let top = center + direction * offset as f64;
                let strip = BBox::new(region.l, top, region.r, top + strip_height);
                render
                    .is_blank(&strip)
                    .then(|| top + (strip_height / 2.0).floor())
            })
        })
    }
}

/// Grow `region` left and right up to the nearest obstacles sharing its rows
fn expand_horizontally(region: BBox, obstacles: &[BBox], width: f64) -> BBox {
    let mut left = 0.0_f64;
    let mut right = width;
    for o in obstacles {
        let relation = region.relation_to(o, 0.0);
        if relation.vertical != Placement::Overlapping {
            continue;
        }
        match relation.horizontal {
            Placement::After => left = left.max(o.r + 1.0),
            Placement::Before => right = right.min(o.l - 1.0),
            Placement::Overlapping => {}
        }
    }
    region.with_left(left).with_right(right)
}

/// Grow `region` up and down to the nearest obstacles sharing its columns
fn expand_vertically(region: BBox, obstacles: &[BBox], height: f64) -> BBox {
    let mut top = 0.0_f64;
    let mut bottom = height;
    for o in obstacles {
        let relation = region.relation_to(o, 0.0);
        if relation.horizontal != Placement::Overlapping {
            continue;
        }
        match relation.vertical {
            Placement::After => top = top.max(o.b + 1.0),
            Placement::Before => bottom = bottom.min(o.t - 1.0),
            Placement::Overlapping => {}
        }
    }
    region.with_top(top).with_bottom(bottom)
}
