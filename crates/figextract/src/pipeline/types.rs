use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle in raster pixel space
///
/// `r` and `b` are exclusive edges, so a box covering pixel columns
/// `10..20` has `l = 10.0` and `r = 20.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub l: f64, // left (x_min)
    pub t: f64, // top (y_min)
    pub r: f64, // right (x_max)
    pub b: f64, // bottom (y_max)
}

/// Where one box lies relative to another along a single axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Entirely left of (or above) the other box
    Before,
    /// Spans overlap (within tolerance)
    Overlapping,
    /// Entirely right of (or below) the other box
    After,
}

/// Horizontal and vertical placement of a box relative to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxRelation {
    pub horizontal: Placement,
    pub vertical: Placement,
}

impl BoxRelation {
    /// True when the boxes are separated along exactly one axis
    #[inline]
    #[must_use = "returns whether the boxes are adjacent along one axis"]
    pub fn is_axis_adjacent(&self) -> bool {
        (self.horizontal == Placement::Overlapping) != (self.vertical == Placement::Overlapping)
    }
}

impl BBox {
    /// Create a new bounding box
    #[inline]
    #[must_use = "returns a new BBox instance"]
    pub const fn new(l: f64, t: f64, r: f64, b: f64) -> Self {
        Self { l, t, r, b }
    }

    /// Create a box from its origin and size
    #[inline]
    #[must_use = "returns a new BBox instance"]
    pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    #[inline]
    #[must_use = "returns the box width"]
    pub fn width(&self) -> f64 {
        self.r - self.l
    }

    #[inline]
    #[must_use = "returns the box height"]
    pub fn height(&self) -> f64 {
        self.b - self.t
    }

    #[inline]
    #[must_use = "returns the horizontal center"]
    pub fn center_x(&self) -> f64 {
        (self.l + self.r) / 2.0
    }

    #[inline]
    #[must_use = "returns the vertical center"]
    pub fn center_y(&self) -> f64 {
        (self.t + self.b) / 2.0
    }

    /// Calculate area of the bounding box
    #[inline]
    #[must_use = "returns the bounding box area"]
    pub fn area(&self) -> f64 {
        let width = (self.r - self.l).abs();
        let height = (self.b - self.t).abs();
        width * height
    }

    /// A box is valid when it has positive width and height
    #[inline]
    #[must_use = "returns whether the box is non-degenerate"]
    pub fn is_valid(&self) -> bool {
        self.r > self.l && self.b > self.t
    }

    /// Calculate intersection area with another bbox
    #[inline]
    #[must_use = "returns the intersection area"]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let x_left = self.l.max(other.l);
        let y_top = self.t.max(other.t);
        let x_right = self.r.min(other.r);
        let y_bottom = self.b.min(other.b);

        let width = (x_right - x_left).max(0.0);
        let height = (y_bottom - y_top).max(0.0);

        width * height
    }

    /// True when the boxes share a region of positive area
    #[inline]
    #[must_use = "returns whether the boxes intersect"]
    pub fn intersects(&self, other: &Self) -> bool {
        self.l.max(other.l) < self.r.min(other.r) && self.t.max(other.t) < self.b.min(other.b)
    }

    /// Fraction of `other`'s area that is covered by `self`
    ///
    /// Returns 0.0 for a degenerate `other`.
    #[inline]
    #[must_use = "returns the covered fraction of the other box"]
    pub fn overlap_fraction(&self, other: &Self) -> f64 {
        let other_area = other.area();
        if other_area > 0.0 {
            self.intersection_area(other) / other_area
        } else {
            0.0
        }
    }

    /// True when `other` lies entirely inside `self`
    #[inline]
    #[must_use = "returns whether the other box is contained"]
    pub fn contains(&self, other: &Self) -> bool {
        other.l >= self.l && other.t >= self.t && other.r <= self.r && other.b <= self.b
    }

    /// Smallest box containing both boxes
    #[inline]
    #[must_use = "returns the bounding region of both boxes"]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.l.min(other.l),
            self.t.min(other.t),
            self.r.max(other.r),
            self.b.max(other.b),
        )
    }

    /// Extent of a set of boxes, `None` when the set is empty
    #[must_use = "returns the extent of the boxes"]
    pub fn extent<'a>(boxes: impl IntoIterator<Item = &'a Self>) -> Option<Self> {
        boxes.into_iter().copied().reduce(|acc, b| acc.union(&b))
    }

    /// Grow the box by `dx` horizontally and `dy` vertically on each side
    #[inline]
    #[must_use = "returns the padded box"]
    pub fn pad_xy(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.l - dx, self.t - dy, self.r + dx, self.b + dy)
    }

    #[inline]
    #[must_use = "returns the padded box"]
    pub fn pad(&self, amount: f64) -> Self {
        self.pad_xy(amount, amount)
    }

    /// Intersect with the page rectangle `[0, width) x [0, height)`
    #[inline]
    #[must_use = "returns the clamped box"]
    pub fn clamp_to(&self, width: f64, height: f64) -> Self {
        Self::new(
            self.l.clamp(0.0, width),
            self.t.clamp(0.0, height),
            self.r.clamp(0.0, width),
            self.b.clamp(0.0, height),
        )
    }

    #[inline]
    #[must_use = "returns the box with its left side moved"]
    pub const fn with_left(mut self, l: f64) -> Self {
        self.l = l;
        self
    }

    #[inline]
    #[must_use = "returns the box with its right side moved"]
    pub const fn with_right(mut self, r: f64) -> Self {
        self.r = r;
        self
    }

    #[inline]
    #[must_use = "returns the box with its top side moved"]
    pub const fn with_top(mut self, t: f64) -> Self {
        self.t = t;
        self
    }

    #[inline]
    #[must_use = "returns the box with its bottom side moved"]
    pub const fn with_bottom(mut self, b: f64) -> Self {
        self.b = b;
        self
    }

    /// Placement of `self` relative to `other` on both axes
    ///
    /// Along each axis `self` is `Before` when it ends at least `tolerance`
    /// pixels before `other` starts, and `After` in the mirrored case.
    #[must_use = "returns the relation between the boxes"]
    pub fn relation_to(&self, other: &Self, tolerance: f64) -> BoxRelation {
        let horizontal = if self.r + tolerance <= other.l {
            Placement::Before
        } else if self.l >= other.r + tolerance {
            Placement::After
        } else {
            Placement::Overlapping
        };
        let vertical = if self.b + tolerance <= other.t {
            Placement::Before
        } else if self.t >= other.b + tolerance {
            Placement::After
        } else {
            Placement::Overlapping
        };
        BoxRelation {
            horizontal,
            vertical,
        }
    }

    /// `[x, y, x2, y2]` as written to JSON
    #[inline]
    #[must_use = "returns the box corners"]
    pub const fn to_array(&self) -> [f64; 4] {
        [self.l, self.t, self.r, self.b]
    }
}

/// Kind of captioned element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FigureType {
    Figure,
    Table,
}

impl fmt::Display for FigureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Figure => write!(f, "Figure"),
            Self::Table => write!(f, "Table"),
        }
    }
}

/// A possible caption anchor found in the text
///
/// `word_rank` is the anchor's position in the page's flattened reading
/// order (see [`TextPage::words`](crate::TextPage::words)).
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCandidate {
    pub page: usize,
    pub word_rank: usize,
    /// Box of the anchor word
    pub anchor_bbox: BBox,
    pub figure_type: FigureType,
    pub number: u32,
    pub line_start: bool,
    pub block_start: bool,
    pub colon: bool,
    pub period: bool,
    pub caps: bool,
    pub abbreviated: bool,
    pub bold: bool,
    pub italic: bool,
    /// A word follows the number on the same line
    pub has_next_word: bool,
}

impl CaptionCandidate {
    /// Signed group key: the number, negated for tables
    #[inline]
    #[must_use = "returns the candidate group id"]
    pub fn id(&self) -> i64 {
        let number = i64::from(self.number);
        match self.figure_type {
            FigureType::Figure => number,
            FigureType::Table => -number,
        }
    }
}

/// A disambiguated caption anchor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptionStart {
    pub page: usize,
    pub number: u32,
    pub figure_type: FigureType,
    pub word_rank: usize,
    /// Box of the anchor word, used as the caption when the rank is stale
    pub anchor_bbox: BBox,
}

impl From<&CaptionCandidate> for CaptionStart {
    #[inline]
    fn from(candidate: &CaptionCandidate) -> Self {
        Self {
            page: candidate.page,
            number: candidate.number,
            figure_type: candidate.figure_type,
            word_rank: candidate.word_rank,
            anchor_bbox: candidate.anchor_bbox,
        }
    }
}

/// A finalized caption box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub page: usize,
    pub number: u32,
    pub figure_type: FigureType,
    pub bbox: BBox,
    /// Caption words joined with single spaces, in the order they were absorbed
    pub text: String,
}

/// Classified content of one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRegions {
    pub captions: Vec<Caption>,
    pub bodytext: Vec<BBox>,
    pub graphics: Vec<BBox>,
    pub other: Vec<BBox>,
}

/// Final detection result for one caption
///
/// `image_bbox` is `None` for a partial failure: the caption was found but
/// no acceptable image region was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub figure_type: FigureType,
    pub number: u32,
    pub page: usize,
    pub caption_bbox: BBox,
    pub caption: String,
    pub image_bbox: Option<BBox>,
}

impl Figure {
    #[inline]
    #[must_use = "returns a new Figure"]
    pub fn new(caption: &Caption, image_bbox: Option<BBox>) -> Self {
        Self {
            figure_type: caption.figure_type,
            number: caption.number,
            page: caption.page,
            caption_bbox: caption.bbox,
            caption: caption.text.clone(),
            image_bbox,
        }
    }

    #[inline]
    #[must_use = "returns whether no image region was found"]
    pub const fn is_partial_failure(&self) -> bool {
        self.image_bbox.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_fraction_is_relative_to_other() {
        let big = BBox::new(0.0, 0.0, 100.0, 100.0);
        let small = BBox::new(90.0, 90.0, 110.0, 110.0);
        assert!((big.overlap_fraction(&small) - 0.25).abs() < 1e-9);
        assert!((small.overlap_fraction(&big) - 0.01).abs() < 1e-9);
        assert_eq!(big.overlap_fraction(&BBox::new(5.0, 5.0, 5.0, 9.0)), 0.0);
    }

    #[test]
    fn test_touching_boxes_do_not_intersect() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&BBox::new(9.0, 9.0, 12.0, 12.0)));
    }

    #[test]
    fn test_relation_to() {
        let caption = BBox::new(100.0, 500.0, 300.0, 520.0);
        let above = BBox::new(100.0, 100.0, 300.0, 400.0);
        let rel = caption.relation_to(&above, 2.0);
        assert_eq!(rel.horizontal, Placement::Overlapping);
        assert_eq!(rel.vertical, Placement::After);
        assert!(rel.is_axis_adjacent());

        let diagonal = BBox::new(400.0, 100.0, 500.0, 200.0);
        let rel = caption.relation_to(&diagonal, 2.0);
        assert_eq!(rel.horizontal, Placement::Before);
        assert_eq!(rel.vertical, Placement::After);
        assert!(!rel.is_axis_adjacent());

        // Within tolerance counts as overlapping
        let near = BBox::new(301.0, 500.0, 400.0, 520.0);
        assert_eq!(caption.relation_to(&near, 2.0).horizontal, Placement::Overlapping);
    }

    #[test]
    fn test_candidate_id_sign() {
        let mut candidate = CaptionCandidate {
            page: 0,
            word_rank: 0,
            anchor_bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            figure_type: FigureType::Figure,
            number: 4,
            line_start: true,
            block_start: true,
            colon: false,
            period: false,
            caps: false,
            abbreviated: false,
            bold: false,
            italic: false,
            has_next_word: true,
        };
        assert_eq!(candidate.id(), 4);
        candidate.figure_type = FigureType::Table;
        assert_eq!(candidate.id(), -4);
    }

    #[test]
    fn test_extent_and_clamp() {
        let boxes = [BBox::new(5.0, 5.0, 10.0, 10.0), BBox::new(-5.0, 2.0, 8.0, 30.0)];
        let extent = BBox::extent(&boxes).unwrap();
        assert_eq!(extent, BBox::new(-5.0, 2.0, 10.0, 30.0));
        assert_eq!(extent.clamp_to(20.0, 20.0), BBox::new(0.0, 2.0, 10.0, 20.0));
        assert!(BBox::extent(&Vec::<BBox>::new()).is_none());
    }
}
