// Stage 2: Caption Candidates - anchor word scan
// ZST struct methods use &self for API consistency
#![allow(clippy::trivially_copy_pass_by_ref)]

use crate::pipeline::types::{CaptionCandidate, FigureType};
use crate::text::{RankedWord, TextPage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Figure|Fig\.?|FIG|Table)$").expect("Invalid caption anchor regex"));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)(:|\.)?$").expect("Invalid caption number regex"));

/// Candidates keyed by signed group id (tables negative)
pub type CandidateGroups = BTreeMap<i64, Vec<CaptionCandidate>>;

/// Stage 2: Caption Candidate Extraction
///
/// Scans every page's words for an anchor (`Figure`, `Fig`, `Fig.`, `FIG`,
/// `Table`) immediately followed on the same line by a number token such as
/// `3`, `3:` or `3.`.
///
/// Input: `TextPage`s
/// Output: candidates grouped by `CaptionCandidate::id`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage02CaptionCandidates;

impl Stage02CaptionCandidates {
    #[inline]
    #[must_use = "candidate extractor is created but not used"]
    pub const fn new() -> Self {
        Self
    }

    /// Candidates on a single page, in reading order
    #[must_use = "candidates are returned but not used"]
    pub fn page_candidates(&self, page: &TextPage) -> Vec<CaptionCandidate> {
        page.words()
            .iter()
            .filter_map(|ranked| candidate_at(page.index, ranked))
            .collect()
    }

    /// Candidates over the whole document, grouped by id
    #[must_use = "candidate groups are returned but not used"]
    pub fn process(&self, pages: &[TextPage]) -> CandidateGroups {
        let mut groups = CandidateGroups::new();
        for page in pages {
            for candidate in self.page_candidates(page) {
                groups.entry(candidate.id()).or_default().push(candidate);
            }
        }
        log::debug!(
            "{} caption candidates in {} groups",
            groups.values().map(Vec::len).sum::<usize>(),
            groups.len()
        );
        groups
    }
}

fn candidate_at(page: usize, ranked: &RankedWord<'_>) -> Option<CaptionCandidate> {
    let anchor = ranked.word.text.as_str();
    if !ANCHOR.is_match(anchor) {
        return None;
    }
    let next = ranked.next?;
    let captures = NUMBER.captures(&next.text)?;
    // Overlong digit runs are not figure numbers
    let number: u32 = captures.get(1)?.as_str().parse().ok()?;
    let punctuation = captures.get(2).map(|m| m.as_str());

    let figure_type = if anchor.starts_with('T') {
        FigureType::Table
    } else {
        FigureType::Figure
    };
    Some(CaptionCandidate {
        page,
        word_rank: ranked.rank,
        anchor_bbox: ranked.word.bbox,
        figure_type,
        number,
        line_start: ranked.line_start,
        block_start: ranked.block_start,
        colon: punctuation == Some(":"),
        period: punctuation == Some("."),
        caps: anchor == "FIG",
        abbreviated: anchor == "Fig.",
        bold: ranked.word.is_bold(),
        italic: ranked.word.is_italic(),
        has_next_word: ranked.has_word_after_next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BBox;
    use crate::text::{TextBlock, TextLine, Word};

    fn make_word(text: &str, l: f64) -> Word {
        Word {
            text: text.to_string(),
            bbox: BBox::new(l, 100.0, l + 30.0, 110.0),
            font_size: 10.0,
            font_name: None,
            bold: false,
            italic: false,
            rotation: 0,
        }
    }

    fn make_page(index: usize, lines: &[&[&str]]) -> TextPage {
        TextPage {
            index,
            blocks: vec![TextBlock {
                lines: lines
                    .iter()
                    .map(|words| TextLine {
                        words: words
                            .iter()
                            .enumerate()
                            .map(|(i, w)| make_word(w, 50.0 + 40.0 * i as f64))
                            .collect(),
                    })
                    .collect(),
            }],
            ..TextPage::default()
        }
    }

    #[test]
    fn test_anchor_vocabulary_and_flags() {
        let page = make_page(
            0,
            &[
                &["Figure", "1:", "Overview"],
                &["see", "Fig.", "2."],
                &["FIG", "3"],
                &["Table", "4", "lists"],
                &["Figures", "5"],
                &["Figure", "six"],
            ],
        );
        let candidates = Stage02CaptionCandidates::new().page_candidates(&page);
        assert_eq!(candidates.len(), 4);

        let fig1 = &candidates[0];
        assert_eq!((fig1.figure_type, fig1.number), (FigureType::Figure, 1));
        assert!(fig1.colon && !fig1.period && fig1.line_start && fig1.block_start);
        assert!(fig1.has_next_word);
        assert!(!fig1.abbreviated);

        let fig2 = &candidates[1];
        assert!(fig2.period && fig2.abbreviated && !fig2.line_start);
        assert!(!fig2.has_next_word);

        assert!(candidates[2].caps && !candidates[2].abbreviated);

        let table = &candidates[3];
        assert_eq!(table.figure_type, FigureType::Table);
        assert_eq!(table.id(), -4);
    }

    #[test]
    fn test_number_must_follow_on_same_line() {
        let page = make_page(0, &[&["as", "shown", "in", "Figure"], &["7", "the"]]);
        assert!(Stage02CaptionCandidates::new().page_candidates(&page).is_empty());
    }

    #[test]
    fn test_groups_span_pages() {
        let pages = vec![
            make_page(0, &[&["Figure", "1"], &["Table", "1"]]),
            make_page(1, &[&["Figure", "1:", "Results"]]),
        ];
        let groups = Stage02CaptionCandidates::new().process(&pages);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&1].len(), 2);
        assert_eq!(groups[&1][1].page, 1);
        assert_eq!(groups[&-1].len(), 1);
    }

    #[test]
    fn test_overflowing_number_is_ignored() {
        let page = make_page(0, &[&["Figure", "99999999999999"]]);
        assert!(Stage02CaptionCandidates::new().page_candidates(&page).is_empty());
    }

    #[test]
    fn test_only_dotted_fig_is_abbreviated() {
        let page = make_page(0, &[&["Fig", "1"], &["Fig.", "2"], &["Figure", "3"]]);
        let abbreviated: Vec<bool> = Stage02CaptionCandidates::new()
            .page_candidates(&page)
            .iter()
            .map(|c| c.abbreviated)
            .collect();
        assert_eq!(abbreviated, vec![false, true, false]);
    }
}
