//! Binary raster primitives over `image::GrayImage`
//!
//! A [`Bitmap`] stores foreground pixels as 255 and background as 0.
//! Boxes map to pixel ranges by flooring the left/top edge and ceiling the
//! right/bottom edge, clamped to the bitmap.

// Pixel coordinates are small non-negative integers stored in f64 boxes
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::pipeline::types::BBox;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::connected_components;
pub use imageproc::region_labelling::Connectivity;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

const FOREGROUND: u8 = 255;

/// Pixel range `[x0, x1) x [y0, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelRect {
    fn to_bbox(self) -> BBox {
        BBox::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

/// Binary image with foreground pixels set to 255
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    image: GrayImage,
}

impl Bitmap {
    /// All-background bitmap
    #[must_use = "returns a new empty bitmap"]
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// Binarize a grayscale render: pixels darker than `threshold` are foreground
    #[must_use = "returns the binarized bitmap"]
    pub fn from_gray(gray: &GrayImage, threshold: u8) -> Self {
        let image = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            if gray.get_pixel(x, y)[0] < threshold {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        });
        Self { image }
    }

    /// Rasterize filled boxes into a new bitmap
    #[must_use = "returns the box mask"]
    pub fn from_boxes(width: u32, height: u32, boxes: &[BBox]) -> Self {
        let mut bitmap = Self::empty(width, height);
        for bbox in boxes {
            bitmap.fill(bbox);
        }
        bitmap
    }

    #[inline]
    #[must_use = "returns the bitmap width"]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    #[must_use = "returns the bitmap height"]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Box covering the whole bitmap
    #[inline]
    #[must_use = "returns the bitmap bounds"]
    pub fn bounds(&self) -> BBox {
        BBox::new(0.0, 0.0, f64::from(self.width()), f64::from(self.height()))
    }

    #[inline]
    #[must_use = "returns whether the pixel is foreground"]
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.image.get_pixel(x, y)[0] != 0
    }

    /// Set every pixel inside `bbox`
    pub fn fill(&mut self, bbox: &BBox) {
        if let Some(rect) = self.pixel_rect(bbox) {
            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    self.image.put_pixel(x, y, Luma([FOREGROUND]));
                }
            }
        }
    }

    /// Clear every pixel that is set in `other`
    pub fn subtract(&mut self, other: &Self) {
        let (w, h) = (self.width().min(other.width()), self.height().min(other.height()));
        for y in 0..h {
            for x in 0..w {
                if other.get(x, y) {
                    self.image.put_pixel(x, y, Luma([0]));
                }
            }
        }
    }

    /// Keep only pixels that are also set in `other`
    pub fn and(&mut self, other: &Self) {
        for (x, y, pixel) in self.image.enumerate_pixels_mut() {
            if !other.get(x, y) {
                *pixel = Luma([0]);
            }
        }
    }

    fn pixel_rect(&self, bbox: &BBox) -> Option<PixelRect> {
        let w = f64::from(self.width());
        let h = f64::from(self.height());
        let x0 = bbox.l.floor().clamp(0.0, w) as u32;
        let y0 = bbox.t.floor().clamp(0.0, h) as u32;
        let x1 = bbox.r.ceil().clamp(0.0, w) as u32;
        let y1 = bbox.b.ceil().clamp(0.0, h) as u32;
        (x0 < x1 && y0 < y1).then_some(PixelRect { x0, y0, x1, y1 })
    }

    /// Number of foreground pixels inside `bbox`
    #[must_use = "returns the foreground pixel count"]
    pub fn count_in(&self, bbox: &BBox) -> u64 {
        let Some(rect) = self.pixel_rect(bbox) else {
            return 0;
        };
        let mut count = 0;
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                if self.image.get_pixel(x, y)[0] != 0 {
                    count += 1;
                }
            }
        }
        count
    }

    /// True when no foreground pixel lies inside `bbox`
    #[must_use = "returns whether the region is blank"]
    pub fn is_blank(&self, bbox: &BBox) -> bool {
        let Some(rect) = self.pixel_rect(bbox) else {
            return true;
        };
        (rect.y0..rect.y1).all(|y| (rect.x0..rect.x1).all(|x| self.image.get_pixel(x, y)[0] == 0))
    }

    /// Fraction of pixels inside `bbox` that are foreground
    #[must_use = "returns the average intensity"]
    pub fn average_in(&self, bbox: &BBox) -> f64 {
        match self.pixel_rect(bbox) {
            Some(rect) => {
                let total = f64::from(rect.x1 - rect.x0) * f64::from(rect.y1 - rect.y0);
                self.count_in(&rect.to_bbox()) as f64 / total
            }
            None => 0.0,
        }
    }

    /// Tight box around the foreground inside `region` (or the whole bitmap)
    ///
    /// Returns `None` when the region holds no foreground.
    #[must_use = "returns the clipped box"]
    pub fn clip_to_foreground(&self, region: Option<&BBox>) -> Option<BBox> {
        let bounds = self.bounds();
        let rect = self.pixel_rect(region.unwrap_or(&bounds))?;
        let mut found: Option<PixelRect> = None;
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                if self.image.get_pixel(x, y)[0] == 0 {
                    continue;
                }
                found = Some(match found {
                    None => PixelRect {
                        x0: x,
                        y0: y,
                        x1: x + 1,
                        y1: y + 1,
                    },
                    Some(r) => PixelRect {
                        x0: r.x0.min(x),
                        y0: r.y0.min(y),
                        x1: r.x1.max(x + 1),
                        y1: r.y1.max(y + 1),
                    },
                });
            }
        }
        found.map(PixelRect::to_bbox)
    }

    /// Label connected foreground components
    #[must_use = "returns the labelled components"]
    pub fn components(&self, connectivity: Connectivity) -> ComponentMap {
        let labels = connected_components(&self.image, connectivity, Luma([0u8]));
        let mut index_of: FxHashMap<u32, usize> = FxHashMap::default();
        let mut rects: Vec<PixelRect> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }
            let index = *index_of.entry(label).or_insert_with(|| {
                rects.push(PixelRect {
                    x0: x,
                    y0: y,
                    x1: x + 1,
                    y1: y + 1,
                });
                rects.len() - 1
            });
            let r = &mut rects[index];
            r.x0 = r.x0.min(x);
            r.y0 = r.y0.min(y);
            r.x1 = r.x1.max(x + 1);
            r.y1 = r.y1.max(y + 1);
        }
        let mut label_of = vec![0; rects.len()];
        for (label, index) in index_of {
            label_of[index] = label;
        }
        ComponentMap {
            labels,
            boxes: rects.into_iter().map(PixelRect::to_bbox).collect(),
            label_of,
        }
    }

    /// Underlying grayscale buffer (foreground = 255)
    #[inline]
    #[must_use = "returns the image buffer"]
    pub const fn as_image(&self) -> &GrayImage {
        &self.image
    }
}

/// Parameters for [`ComponentMap::split_component`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Pieces with fewer foreground pixels are discarded
    pub min_pixels: u64,
    /// Rows whose left or right extent moves by more than this start a new piece
    pub delta: f64,
    /// Rows beyond this many pieces are folded into the last piece
    pub max_pieces: usize,
}

impl Default for SplitParams {
    #[inline]
    fn default() -> Self {
        Self {
            min_pixels: 10,
            delta: 15.0,
            max_pieces: 7,
        }
    }
}

/// Connected components of a bitmap with their bounding boxes
///
/// Components are ordered by the raster position of their first pixel.
#[derive(Debug, Clone)]
pub struct ComponentMap {
    labels: ImageBuffer<Luma<u32>, Vec<u32>>,
    boxes: Vec<BBox>,
    label_of: Vec<u32>,
}

impl ComponentMap {
    #[inline]
    #[must_use = "returns the component boxes"]
    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    #[inline]
    #[must_use = "returns the number of components"]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    #[must_use = "returns whether there are no components"]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Split one component into rectangular pieces
    ///
    /// Rows of the component are scanned top to bottom; a piece continues
    /// while each row's horizontal extent stays within `delta` of the
    /// previous row. Used to cut text blocks that wrap around a notch.
    #[must_use = "returns the split pieces"]
    pub fn split_component(&self, index: usize, params: &SplitParams) -> Vec<BBox> {
        let (Some(bbox), Some(&label)) = (self.boxes.get(index), self.label_of.get(index)) else {
            return Vec::new();
        };
        let (x0, y0, x1, y1) = (bbox.l as u32, bbox.t as u32, bbox.r as u32, bbox.b as u32);

        struct Piece {
            bbox: BBox,
            pixels: u64,
            last: (f64, f64),
        }
        let mut pieces: Vec<Piece> = Vec::new();
        for y in y0..y1 {
            let mut extent: Option<(u32, u32)> = None;
            let mut pixels = 0u64;
            for x in x0..x1 {
                if self.labels.get_pixel(x, y)[0] == label {
                    pixels += 1;
                    extent = Some(extent.map_or((x, x + 1), |(a, _)| (a, x + 1)));
                }
            }
            let Some((rl, rr)) = extent else {
                continue;
            };
            let (rl, rr) = (f64::from(rl), f64::from(rr));
            let row = BBox::new(rl, f64::from(y), rr, f64::from(y + 1));
            // Rows beyond the piece limit fold into the last piece
            let continues = pieces.len() >= params.max_pieces.max(1)
                || pieces.last().is_some_and(|p| {
                    (rl - p.last.0).abs() <= params.delta && (rr - p.last.1).abs() <= params.delta
                });
            match pieces.last_mut() {
                Some(piece) if continues => {
                    piece.bbox = piece.bbox.union(&row);
                    piece.pixels += pixels;
                    piece.last = (rl, rr);
                }
                _ => pieces.push(Piece {
                    bbox: row,
                    pixels,
                    last: (rl, rr),
                }),
            }
        }
        pieces
            .into_iter()
            .filter(|p| p.pixels >= params.min_pixels)
            .map(|p| p.bbox)
            .collect()
    }
}
