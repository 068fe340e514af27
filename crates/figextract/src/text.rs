//! Reading-order text model consumed by the pipeline
//!
//! Pages are produced by an external text extractor and handed over as
//! owned, ordered `block -> line -> word` sequences. Coordinates are raster
//! pixels at the pipeline DPI. Nothing in this module is mutated after load.

use crate::pipeline::types::BBox;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static BOLD_FONT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Medi|Bold)").expect("Invalid bold font regex"));
static ITALIC_FONT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(Slant|Italic|Oblique)").expect("Invalid italic font regex")
});

/// Atomic text token on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub bbox: BBox,
    pub font_size: f64,
    #[serde(default)]
    pub font_name: Option<String>,
    /// Bold flag reported by the font descriptor
    #[serde(default)]
    pub bold: bool,
    /// Italic flag reported by the font descriptor
    #[serde(default)]
    pub italic: bool,
    /// Rotation in quarter turns (0 = upright)
    #[serde(default)]
    pub rotation: u8,
}

impl Word {
    /// Bold by font flag, or by a font name containing "Medi" or "Bold"
    #[must_use = "returns whether the word is bold"]
    pub fn is_bold(&self) -> bool {
        self.bold || self.font_name.as_deref().is_some_and(|name| BOLD_FONT.is_match(name))
    }

    /// Italic by font flag, or by a slanted font name
    #[must_use = "returns whether the word is italic"]
    pub fn is_italic(&self) -> bool {
        self.italic
            || self
                .font_name
                .as_deref()
                .is_some_and(|name| ITALIC_FONT.is_match(name))
    }

    #[inline]
    #[must_use = "returns whether the word ends with a period"]
    pub fn ends_with_period(&self) -> bool {
        self.text.ends_with('.')
    }

    /// Word box rounded to whole pixels
    #[inline]
    #[must_use = "returns the rounded word box"]
    pub fn rounded_bbox(&self) -> BBox {
        let round = |v: f64| (v + 0.5).floor();
        BBox::new(
            round(self.bbox.l),
            round(self.bbox.t),
            round(self.bbox.r),
            round(self.bbox.b),
        )
    }
}

/// One line of words in reading order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextLine {
    pub words: Vec<Word>,
}

impl TextLine {
    /// Union of the word boxes, `None` for an empty line
    #[must_use = "returns the line bounding box"]
    pub fn bbox(&self) -> Option<BBox> {
        BBox::extent(self.words.iter().map(|w| &w.bbox))
    }

    #[inline]
    #[must_use = "returns the first word"]
    pub fn first_word(&self) -> Option<&Word> {
        self.words.first()
    }

    /// Concatenated word text without separators
    #[must_use = "returns the line text"]
    pub fn joined_text(&self) -> String {
        self.words.iter().map(|w| w.text.as_str()).collect()
    }

    #[inline]
    #[must_use = "returns whether the line is rotated"]
    pub fn is_rotated(&self) -> bool {
        self.first_word().is_some_and(|w| w.rotation != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
}

/// Size of an embedded raster image as drawn on the page, in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageExtent {
    pub width: f64,
    pub height: f64,
}

/// Text of one page
///
/// `width`/`height` are the raster size in pixels, `media_width` and
/// `media_height` the page size in points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextPage {
    pub index: usize,
    pub width: f64,
    pub height: f64,
    pub media_width: f64,
    pub media_height: f64,
    #[serde(default)]
    pub blocks: Vec<TextBlock>,
    #[serde(default)]
    pub embedded_images: Vec<ImageExtent>,
}

/// A word together with its position in the page's reading order
#[derive(Debug, Clone, Copy)]
pub struct RankedWord<'a> {
    /// Position in the flattened reading order
    pub rank: usize,
    /// Index of the containing line across the whole page
    pub line: usize,
    pub line_start: bool,
    pub block_start: bool,
    /// The next word on the same line
    pub next: Option<&'a Word>,
    /// A word follows `next` on the same line
    pub has_word_after_next: bool,
    pub word: &'a Word,
}

impl TextPage {
    /// Iterate lines in reading order, skipping empty lines
    pub fn lines(&self) -> impl Iterator<Item = &TextLine> + '_ {
        self.blocks
            .iter()
            .flat_map(|block| block.lines.iter())
            .filter(|line| !line.words.is_empty())
    }

    /// Flattened words in reading order
    ///
    /// The returned ranks are the stable word identifiers used by caption
    /// anchors and caption regions.
    #[must_use = "returns the flattened words"]
    pub fn words(&self) -> Vec<RankedWord<'_>> {
        let mut words = Vec::new();
        let mut line_index = 0;
        for block in &self.blocks {
            let mut block_start = true;
            for line in block.lines.iter().filter(|l| !l.words.is_empty()) {
                for (i, word) in line.words.iter().enumerate() {
                    words.push(RankedWord {
                        rank: words.len(),
                        line: line_index,
                        line_start: i == 0,
                        block_start,
                        next: line.words.get(i + 1),
                        has_word_after_next: line.words.len() > i + 2,
                        word,
                    });
                }
                line_index += 1;
                block_start = false;
            }
        }
        words
    }

    /// True when the page has no words at all
    #[must_use = "returns whether the page is empty"]
    pub fn is_empty(&self) -> bool {
        self.lines().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_word(text: &str, l: f64, font: Option<&str>) -> Word {
        Word {
            text: text.to_string(),
            bbox: BBox::new(l, 10.0, l + 20.0, 20.0),
            font_size: 10.0,
            font_name: font.map(str::to_string),
            bold: false,
            italic: false,
            rotation: 0,
        }
    }

    #[test]
    fn test_bold_and_italic_by_font_name() {
        assert!(make_word("a", 0.0, Some("NimbusRomNo9L-Medi")).is_bold());
        assert!(make_word("a", 0.0, Some("Helvetica-Bold")).is_bold());
        assert!(!make_word("a", 0.0, Some("Times-Roman")).is_bold());
        assert!(!make_word("a", 0.0, None).is_bold());
        assert!(make_word("a", 0.0, Some("CMSlant10")).is_italic());

        let mut flagged = make_word("a", 0.0, None);
        flagged.bold = true;
        assert!(flagged.is_bold());
    }

    #[test]
    fn test_words_ranks_and_flags() {
        let page = TextPage {
            blocks: vec![
                TextBlock {
                    lines: vec![
                        TextLine {
                            words: vec![
                                make_word("Figure", 0.0, None),
                                make_word("1:", 30.0, None),
                            ],
                        },
                        TextLine {
                            words: vec![make_word("next", 0.0, None)],
                        },
                    ],
                },
                TextBlock {
                    lines: vec![
                        TextLine { words: vec![] },
                        TextLine {
                            words: vec![
                                make_word("Table", 0.0, None),
                                make_word("2", 30.0, None),
                                make_word("x", 60.0, None),
                            ],
                        },
                    ],
                },
            ],
            ..TextPage::default()
        };
        let words = page.words();
        assert_eq!(words.len(), 6);
        assert_eq!(words[0].rank, 0);
        assert!(words[0].line_start && words[0].block_start);
        assert!(!words[0].has_word_after_next);
        assert!(words[2].line_start && !words[2].block_start);
        assert_eq!(words[3].line, 2);
        assert!(words[3].block_start);
        assert!(words[3].has_word_after_next);
        assert_eq!(page.lines().count(), 3);
    }
}
