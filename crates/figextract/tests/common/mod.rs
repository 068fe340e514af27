//! Common test utilities: synthetic pages and renders.
//!
//! These are not part of the production library.
#![allow(dead_code)]

use figextract::{BBox, PageImages, TextBlock, TextLine, TextPage, Word};
use image::{GrayImage, Luma};
use std::collections::BTreeMap;

pub const PAGE_WIDTH: u32 = 400;
pub const PAGE_HEIGHT: u32 = 500;

pub fn word(text: &str, l: f64, t: f64, r: f64, b: f64) -> Word {
    Word {
        text: text.to_string(),
        bbox: BBox::new(l, t, r, b),
        font_size: 10.0,
        font_name: Some("Times-Roman".to_string()),
        bold: false,
        italic: false,
        rotation: 0,
    }
}

/// Words of the given widths laid out left to right from `l`, 4px apart
pub fn words_at(texts: &[(&str, f64)], l: f64, t: f64, height: f64) -> Vec<Word> {
    let mut x = l;
    texts
        .iter()
        .map(|&(text, width)| {
            let w = word(text, x, t, x + width, t + height);
            x += width + 4.0;
            w
        })
        .collect()
}

/// Full-width body text lines, 12px apart
pub fn body_lines(count: usize, top: f64) -> Vec<TextLine> {
    (0..count)
        .map(|row| {
            let t = top + 12.0 * row as f64;
            TextLine {
                words: vec![
                    word("body", 20.0, t, 200.0, t + 10.0),
                    word("text", 204.0, t, 380.0, t + 10.0),
                ],
            }
        })
        .collect()
}

pub fn page(index: usize, blocks: Vec<Vec<TextLine>>) -> TextPage {
    TextPage {
        index,
        width: f64::from(PAGE_WIDTH),
        height: f64::from(PAGE_HEIGHT),
        media_width: 288.0,
        media_height: 360.0,
        blocks: blocks.into_iter().map(|lines| TextBlock { lines }).collect(),
        embedded_images: vec![],
    }
}

/// White page with black filled boxes
pub fn render(boxes: &[BBox]) -> GrayImage {
    let mut image = GrayImage::from_pixel(PAGE_WIDTH, PAGE_HEIGHT, Luma([255]));
    for bbox in boxes {
        for y in bbox.t as u32..bbox.b as u32 {
            for x in bbox.l as u32..bbox.r as u32 {
                image.put_pixel(x, y, Luma([0]));
            }
        }
    }
    image
}

/// Render every word of the page plus `graphics`; graphics-only render of `graphics`
pub fn page_images(page: &TextPage, graphics: &[BBox]) -> PageImages {
    let mut ink: Vec<BBox> = page
        .lines()
        .flat_map(|line| line.words.iter().map(|w| w.bbox))
        .collect();
    ink.extend_from_slice(graphics);
    PageImages {
        render: render(&ink),
        graphics: Some(render(graphics)),
    }
}

pub const PLOT: BBox = BBox::new(100.0, 200.0, 300.0, 330.0);

/// Body text at the top and bottom, `Figure 1: A plot` at y=350,
/// optionally a plot between the body text and the caption
pub fn figure_above_caption(with_plot: bool) -> (Vec<TextPage>, BTreeMap<usize, PageImages>) {
    let caption = TextLine {
        words: words_at(
            &[("Figure", 40.0), ("1:", 10.0), ("A", 8.0), ("plot", 30.0)],
            20.0,
            350.0,
            10.0,
        ),
    };
    let page = page(0, vec![body_lines(10, 40.0), vec![caption], body_lines(5, 400.0)]);
    let graphics: &[BBox] = if with_plot { &[PLOT] } else { &[] };
    let images = BTreeMap::from([(0, page_images(&page, graphics))]);
    (vec![page], images)
}

pub const UPPER_PLOT: BBox = BBox::new(100.0, 70.0, 300.0, 200.0);
pub const LOWER_PLOT: BBox = BBox::new(100.0, 230.0, 300.0, 360.0);

/// `Figure 1` above two plots, `Figure 2` below them, blank rows between the plots
pub fn stacked_figures() -> (Vec<TextPage>, BTreeMap<usize, PageImages>) {
    let caption = |number: &str, t: f64| TextLine {
        words: words_at(
            &[("Figure", 50.0), (number, 16.0), ("Some", 46.0), ("plot", 76.0)],
            100.0,
            t,
            12.0,
        ),
    };
    let page = page(0, vec![vec![caption("1:", 40.0)], vec![caption("2:", 380.0)]]);
    let images = BTreeMap::from([(0, page_images(&page, &[UPPER_PLOT, LOWER_PLOT]))]);
    (vec![page], images)
}
