// Stage 1: Document Statistics - layout profile shared by every page worker
// Histogram keys are rounded pixel positions
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use crate::text::{TextLine, TextPage, Word};
use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

static PAGE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{1,3}$").expect("Invalid page number regex"));
static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("Invalid decimal regex"));

/// Configuration for Stage 1 (Document Statistics)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage01Config {
    /// Max count gap between the two left margins, as a fraction of all lines
    pub two_column_tolerance: f64,
    /// Max popularity gap between left and right margins for right-aligned text
    pub right_aligned_tolerance: f64,
    /// Max distance of a header line's center from the page center
    pub header_center_tolerance: f64,
    /// A header text must repeat more than this many times
    pub min_header_repeats: usize,
    /// Fraction of pages that must carry a page number
    pub page_number_ratio: f64,
    /// Page numbers must be seen more than this many times
    pub min_page_numbers: usize,
    /// Slack (points) when deciding that an embedded image fills its page
    pub image_fill_slack: f64,
    /// Bold lines sharing a center needed before the center counts as a title axis
    pub min_bold_centers: usize,
}

impl Default for Stage01Config {
    #[inline]
    fn default() -> Self {
        Self {
            two_column_tolerance: 0.20,
            right_aligned_tolerance: 0.15,
            header_center_tolerance: 20.0,
            min_header_repeats: 2,
            page_number_ratio: 0.70,
            min_page_numbers: 5,
            image_fill_slack: 10.0,
            min_bold_centers: 3,
        }
    }
}

/// Whole-document layout profile
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentStatistics {
    pub left_margin_first: f64,
    pub left_margin_second: f64,
    pub right_margin_first: f64,
    pub right_margin_second: f64,
    pub mode_font_size: f64,
    pub mode_font_name: Option<String>,
    pub two_column: bool,
    pub right_aligned: bool,
    pub has_page_numbers: bool,
    pub body_is_image: bool,
    pub page_headers: BTreeSet<String>,
    pub bold_centers_up: FxHashMap<i64, usize>,
    pub bold_centers_down: FxHashMap<i64, usize>,
    pub total_lines: usize,
    min_bold_centers: usize,
}

#[inline]
fn round_px(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Most and second most frequent keys, ties broken toward the smaller key
fn top_two(counts: &FxHashMap<i64, usize>) -> Option<((i64, usize), Option<(i64, usize)>)> {
    let mut ranked: Vec<(i64, usize)> = counts.iter().map(|(&k, &v)| (k, v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut it = ranked.into_iter();
    let first = it.next()?;
    Some((first, it.next()))
}

/// Key with the highest count, ties broken toward the smaller key
fn mode_of<K: Ord + Clone>(counts: impl IntoIterator<Item = (K, usize)>) -> Option<K> {
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(k, _)| k)
}

impl DocumentStatistics {
    /// Left edge within tolerance of a column's left margin
    ///
    /// The line's left edge is rounded to a whole pixel first. The second
    /// margin only counts in two-column documents.
    #[must_use = "returns whether the line is margin aligned"]
    pub fn line_is_aligned_to_tol(&self, x: f64, _x2: f64, l_tol: f64, r_tol: f64) -> bool {
        let x = round_px(x) as f64;
        let near = |margin: f64| margin - x <= l_tol && x - margin <= r_tol;
        near(self.left_margin_first) || (self.two_column && near(self.left_margin_second))
    }

    #[inline]
    #[must_use = "returns whether the line is margin aligned"]
    pub fn line_is_aligned(&self, x: f64, x2: f64) -> bool {
        self.line_is_aligned_to_tol(x, x2, 1.0, 1.0)
    }

    /// Whether a line spanning `x..x2` sits where bold titles sit
    ///
    /// Margin-aligned lines qualify. In right-aligned documents the line must
    /// be centered in its column; otherwise enough other bold lines must
    /// share its center.
    #[must_use = "returns whether the line is a title-like bold line"]
    pub fn is_bold_centered(&self, x: f64, x2: f64) -> bool {
        if self.line_is_aligned(x, x2) {
            return true;
        }
        let center = (x + x2) / 2.0;
        if self.right_aligned {
            let column_center = if self.two_column && center > self.right_margin_first {
                (self.left_margin_second + self.right_margin_second) / 2.0
            } else {
                (self.left_margin_first + self.right_margin_first) / 2.0
            };
            return (center - column_center).abs() <= 2.0;
        }
        let up = self.bold_centers_up.get(&((1.0 + center) as i64)).copied().unwrap_or(0);
        let down = self.bold_centers_down.get(&(center as i64)).copied().unwrap_or(0);
        up + down >= self.min_bold_centers
    }

    #[must_use = "returns whether the line is a repeated page header"]
    pub fn is_page_header(&self, line: &TextLine) -> bool {
        self.page_headers.contains(&line.joined_text())
    }

    #[must_use = "returns whether the line is a page number"]
    pub fn is_page_number(&self, line: &TextLine) -> bool {
        self.has_page_numbers && is_number_line(line)
    }

    /// First word bold, unrotated and not smaller than the body font
    #[must_use = "returns whether the line is bold"]
    pub fn line_is_bold(&self, line: &TextLine) -> bool {
        let Some(first) = line.first_word() else {
            return false;
        };
        if !first.is_bold() || self.mode_font_size > first.font_size || first.rotation != 0 {
            return false;
        }
        line.words.iter().skip(1).all(|w| w.rotation == 0)
    }

    #[inline]
    #[must_use = "returns whether the word is larger than body text"]
    pub fn word_is_large(&self, word: &Word) -> bool {
        word.font_size > self.mode_font_size
    }
}

fn is_number_line(line: &TextLine) -> bool {
    line.words.len() == 1 && PAGE_NUMBER.is_match(&line.words[0].text)
}

/// Top-most and bottom-most lines of a page
fn top_and_bottom(page: &TextPage) -> Option<(&TextLine, &TextLine)> {
    let mut top: Option<(&TextLine, f64)> = None;
    let mut bottom: Option<(&TextLine, f64)> = None;
    for line in page.lines() {
        let Some(bbox) = line.bbox() else { continue };
        if top.map_or(true, |(_, y)| bbox.t < y) {
            top = Some((line, bbox.t));
        }
        if bottom.map_or(true, |(_, y)| bbox.b > y) {
            bottom = Some((line, bbox.b));
        }
    }
    Some((top?.0, bottom?.0))
}

/// Stage 1: Document Statistics
///
/// One pass over every page that records the layout facts later stages
/// judge lines against.
///
/// Margins:
/// - Line left/right edges are rounded to whole pixels and counted
/// - The two most common left (and right) edges are the column margins
/// - Two columns when both left margins are comparably popular, in which
///   case "first" is the left column and "second" the right one
///
/// Input: every `TextPage` of the document
/// Output: `DocumentStatistics`, immutable once built
///
/// Never fails; an empty document yields default statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage01DocumentStatistics {
    config: Stage01Config,
}

impl Stage01DocumentStatistics {
    #[inline]
    #[must_use = "statistics stage is created but not used"]
    pub fn new() -> Self {
        Self {
            config: Stage01Config::default(),
        }
    }

    #[inline]
    #[must_use = "statistics stage is created but not used"]
    pub const fn with_config(config: Stage01Config) -> Self {
        Self { config }
    }

    /// Aggregate layout statistics over all pages
    #[must_use = "computed statistics are returned but not used"]
    pub fn process(&self, pages: &[TextPage]) -> DocumentStatistics {
        let cfg = &self.config;
        let mut left_counts: FxHashMap<i64, usize> = FxHashMap::default();
        let mut right_counts: FxHashMap<i64, usize> = FxHashMap::default();
        let mut size_counts: FxHashMap<OrderedFloat<f64>, usize> = FxHashMap::default();
        let mut name_counts: FxHashMap<Option<String>, usize> = FxHashMap::default();
        let mut header_counts: FxHashMap<String, usize> = FxHashMap::default();
        let mut stats = DocumentStatistics {
            min_bold_centers: cfg.min_bold_centers,
            ..DocumentStatistics::default()
        };
        let mut page_numbers = 0usize;

        for page in pages {
            for line in page.lines() {
                let Some(bbox) = line.bbox() else { continue };
                stats.total_lines += 1;
                *left_counts.entry(round_px(bbox.l)).or_default() += 1;
                *right_counts.entry(round_px(bbox.r)).or_default() += 1;

                for word in &line.words {
                    *size_counts.entry(OrderedFloat(word.font_size)).or_default() += 1;
                    *name_counts.entry(word.font_name.clone()).or_default() += 1;
                }

                let all_bold = line.words.iter().all(Word::is_bold);
                let numeric = line.first_word().is_some_and(|w| DECIMAL.is_match(&w.text));
                if all_bold && !numeric {
                    let center = bbox.center_x();
                    *stats.bold_centers_up.entry((1.0 + center) as i64).or_default() += 1;
                    *stats.bold_centers_down.entry(center as i64).or_default() += 1;
                }
            }

            // Headers and page numbers are only counted after the first page
            if page.index == 0 {
                continue;
            }
            let Some((top, bottom)) = top_and_bottom(page) else {
                continue;
            };
            if is_number_line(bottom) {
                page_numbers += 1;
            }
            let page_center = page.width / 2.0;
            if let Some(bbox) = top.bbox() {
                if (bbox.center_x() - page_center).abs() < cfg.header_center_tolerance {
                    *header_counts.entry(top.joined_text()).or_default() += 1;
                }
            }
        }

        stats.has_page_numbers = page_numbers > cfg.min_page_numbers
            && page_numbers as f64 > pages.len() as f64 * cfg.page_number_ratio;
        if stats.has_page_numbers {
            log::debug!("{} page numbers ({} pages)", page_numbers, pages.len());
        }

        stats.page_headers = header_counts
            .into_iter()
            .filter(|(_, count)| *count > cfg.min_header_repeats)
            .map(|(text, _)| text)
            .collect();
        for header in &stats.page_headers {
            log::debug!("Found page header: <{header}>");
        }

        stats.mode_font_size = mode_of(size_counts).map_or(0.0, |s| s.0);
        stats.mode_font_name = mode_of(name_counts).flatten();

        let left = top_two_or_repeat(&left_counts);
        let right = top_two_or_repeat(&right_counts);

        if stats.total_lines > 0 {
            let total = stats.total_lines as f64;
            let column_gap = left.0 .1.abs_diff(left.1 .1) as f64 / total;
            stats.two_column = column_gap < cfg.two_column_tolerance;

            let (left_popularity, right_popularity) = if stats.two_column {
                (left.0 .1 + left.1 .1, right.0 .1 + right.1 .1)
            } else {
                (left.0 .1, right.0 .1)
            };
            let symmetry_gap = left_popularity.abs_diff(right_popularity) as f64 / total;
            stats.right_aligned = symmetry_gap < cfg.right_aligned_tolerance;
        }

        // Two-column margins are ordered by x; one column keeps the most common edge first
        let two_column = stats.two_column;
        let order = |(a, b): ((i64, usize), (i64, usize))| {
            if two_column && b.0 < a.0 {
                (b.0 as f64, a.0 as f64)
            } else {
                (a.0 as f64, b.0 as f64)
            }
        };
        (stats.left_margin_first, stats.left_margin_second) = order(left);
        (stats.right_margin_first, stats.right_margin_second) = order(right);
        log::debug!(
            "Margins: left ({}, {}) right ({}, {}), {} column, {}",
            stats.left_margin_first,
            stats.left_margin_second,
            stats.right_margin_first,
            stats.right_margin_second,
            if stats.two_column { "two" } else { "one" },
            if stats.right_aligned { "right aligned" } else { "not right aligned" },
        );

        stats.body_is_image = !pages.is_empty()
            && pages.iter().all(|page| {
                page.embedded_images.iter().any(|image| {
                    image.width > page.media_width - cfg.image_fill_slack
                        && image.height > page.media_height - cfg.image_fill_slack
                })
            });
        if stats.body_is_image {
            log::info!("Graphical elements appear to include body text");
        }

        stats
    }
}

/// The two most common edges with their counts; a lone edge stands in for both
fn top_two_or_repeat(counts: &FxHashMap<i64, usize>) -> ((i64, usize), (i64, usize)) {
    match top_two(counts) {
        Some((first, Some(second))) => (first, second),
        Some((first, None)) => (first, (first.0, 0)),
        None => ((0, 0), (0, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BBox;
    use crate::text::{ImageExtent, TextBlock};

    fn make_word(text: &str, l: f64, t: f64, r: f64, size: f64, bold: bool) -> Word {
        Word {
            text: text.to_string(),
            bbox: BBox::new(l, t, r, t + 10.0),
            font_size: size,
            font_name: Some(if bold { "Times-Bold" } else { "Times-Roman" }.to_string()),
            bold: false,
            italic: false,
            rotation: 0,
        }
    }

    fn make_line(l: f64, t: f64, r: f64) -> TextLine {
        TextLine {
            words: vec![make_word("text", l, t, r, 10.0, false)],
        }
    }

    fn make_page(index: usize, lines: Vec<TextLine>) -> TextPage {
        TextPage {
            index,
            width: 850.0,
            height: 1100.0,
            media_width: 612.0,
            media_height: 792.0,
            blocks: vec![TextBlock { lines }],
            embedded_images: vec![],
        }
    }

    fn two_column_page(index: usize) -> TextPage {
        let mut lines = Vec::new();
        for row in 0..20 {
            let t = 100.0 + f64::from(row) * 12.0;
            lines.push(make_line(72.0, t, 410.0));
            lines.push(make_line(440.0, t, 778.0));
        }
        make_page(index, lines)
    }

    #[test]
    fn test_empty_document() {
        let stats = Stage01DocumentStatistics::new().process(&[]);
        assert_eq!(stats.total_lines, 0);
        assert!(!stats.two_column);
        assert!(!stats.has_page_numbers);
        assert!(!stats.body_is_image);
        assert_eq!(stats.mode_font_size, 0.0);
    }

    #[test]
    fn test_two_column_margins_ordered_by_x() {
        let stats = Stage01DocumentStatistics::new().process(&[two_column_page(0)]);
        assert!(stats.two_column);
        assert_eq!(stats.left_margin_first, 72.0);
        assert_eq!(stats.left_margin_second, 440.0);
        assert_eq!(stats.right_margin_first, 410.0);
        assert_eq!(stats.right_margin_second, 778.0);
        assert!(stats.right_aligned);
        assert!(stats.line_is_aligned(441.0, 700.0));
        assert!(!stats.line_is_aligned(450.0, 700.0));
        assert_eq!(stats.mode_font_size, 10.0);
        assert_eq!(stats.mode_font_name.as_deref(), Some("Times-Roman"));
        assert!(stats.word_is_large(&make_word("Title", 72.0, 50.0, 200.0, 14.0, true)));
        assert!(!stats.word_is_large(&make_word("body", 72.0, 50.0, 200.0, 10.0, false)));
    }

    #[test]
    fn test_one_column_with_indents() {
        let mut lines = Vec::new();
        for row in 0..30 {
            let t = 100.0 + f64::from(row) * 12.0;
            // Every fifth line is an indented paragraph start
            let l = if row % 5 == 0 { 87.0 } else { 72.0 };
            lines.push(make_line(l, t, 540.0 - f64::from(row % 3) * 40.0));
        }
        let stats = Stage01DocumentStatistics::new().process(&[make_page(0, lines)]);
        assert!(!stats.two_column);
        assert_eq!(stats.left_margin_first, 72.0);
        assert!(stats.line_is_aligned(72.4, 300.0));
        assert!(!stats.line_is_aligned(87.0, 300.0));
        assert!(stats.line_is_aligned_to_tol(75.0, 300.0, 4.0, 4.0));
    }

    #[test]
    fn test_page_numbers_and_headers() {
        let pages: Vec<TextPage> = (0..8)
            .map(|i| {
                let mut lines = vec![
                    TextLine {
                        words: vec![make_word("Journal", 385.0, 40.0, 465.0, 9.0, false)],
                    },
                    make_line(72.0, 100.0, 778.0),
                ];
                lines.push(TextLine {
                    words: vec![make_word(&format!("{}", i + 1), 420.0, 1040.0, 430.0, 9.0, false)],
                });
                make_page(i, lines)
            })
            .collect();
        let stats = Stage01DocumentStatistics::new().process(&pages);
        assert!(stats.has_page_numbers);
        assert!(stats.page_headers.contains("Journal"));
        assert!(stats.is_page_header(&pages[3].blocks[0].lines[0]));
        assert!(stats.is_page_number(&pages[3].blocks[0].lines[2]));
        assert!(!stats.is_page_number(&pages[3].blocks[0].lines[1]));
    }

    #[test]
    fn test_first_page_found_by_index() {
        let header = || TextLine {
            words: vec![make_word("Journal", 385.0, 40.0, 465.0, 9.0, false)],
        };
        let body = || make_line(72.0, 100.0, 778.0);
        // The slice does not start with the first page
        let pages = vec![
            make_page(1, vec![header(), body()]),
            make_page(2, vec![header(), body()]),
            make_page(3, vec![header(), body()]),
            make_page(0, vec![body()]),
        ];
        let stats = Stage01DocumentStatistics::new().process(&pages);
        assert!(stats.page_headers.contains("Journal"));
    }

    #[test]
    fn test_few_page_numbers_are_ignored() {
        let pages: Vec<TextPage> = (0..4)
            .map(|i| {
                make_page(
                    i,
                    vec![
                        make_line(72.0, 100.0, 778.0),
                        TextLine {
                            words: vec![make_word("3", 420.0, 1040.0, 430.0, 9.0, false)],
                        },
                    ],
                )
            })
            .collect();
        let stats = Stage01DocumentStatistics::new().process(&pages);
        assert!(!stats.has_page_numbers);
    }

    #[test]
    fn test_body_is_image_requires_every_page() {
        let filled = ImageExtent {
            width: 610.0,
            height: 790.0,
        };
        let mut a = two_column_page(0);
        let mut b = two_column_page(1);
        a.embedded_images.push(filled);
        let stats = Stage01DocumentStatistics::new().process(&[a.clone(), b.clone()]);
        assert!(!stats.body_is_image);

        b.embedded_images.push(filled);
        let stats = Stage01DocumentStatistics::new().process(&[a, b]);
        assert!(stats.body_is_image);
    }

    #[test]
    fn test_bold_centers() {
        let mut lines = vec![];
        for row in 0..3 {
            let t = 100.0 + f64::from(row) * 200.0;
            lines.push(TextLine {
                words: vec![make_word("Heading", 300.0, t, 500.0, 12.0, true)],
            });
        }
        for row in 0..20 {
            lines.push(make_line(72.0, 110.0 + f64::from(row) * 12.0, 778.0));
        }
        let stats = Stage01DocumentStatistics::new().process(&[make_page(0, lines)]);
        assert!(!stats.two_column);
        assert_eq!(stats.right_margin_first, 778.0);
        assert!(!stats.is_bold_centered(300.0, 500.0));
        assert_eq!(stats.bold_centers_down.get(&400), Some(&3));
        assert_eq!(stats.bold_centers_up.get(&401), Some(&3));
    }
}
