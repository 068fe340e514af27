// Stage 3: Candidate Disambiguation - filter cascade over candidate groups
// ZST struct methods use &self for API consistency
#![allow(clippy::trivially_copy_pass_by_ref)]

use crate::pipeline::stage02_caption_candidates::CandidateGroups;
use crate::pipeline::types::{CaptionCandidate, CaptionStart, FigureType};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Accepted caption anchors per page, ordered by reading-order rank
pub type CaptionStarts = BTreeMap<usize, Vec<CaptionStart>>;

/// Configuration for Stage 3 (Candidate Disambiguation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage03Config {
    /// Groups still holding at most this many candidates are kept whole
    pub max_ambiguous_kept: usize,
}

impl Default for Stage03Config {
    #[inline]
    fn default() -> Self {
        Self {
            max_ambiguous_kept: 2,
        }
    }
}

/// One predicate of the disambiguation cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateFilter {
    Colon,
    Period,
    Bold,
    Italic,
    /// All-caps `FIG` anchors; tables pass
    CapsFigures,
    /// `Fig.` anchors; tables pass
    AbbreviatedFigures,
    NoNextWord,
    BlockStart,
    LineStart,
    NextWord,
}

impl CandidateFilter {
    /// Filters in the order they are tried
    pub const PRIORITY: [Self; 10] = [
        Self::Colon,
        Self::Period,
        Self::Bold,
        Self::Italic,
        Self::CapsFigures,
        Self::AbbreviatedFigures,
        Self::NoNextWord,
        Self::BlockStart,
        Self::LineStart,
        Self::NextWord,
    ];

    #[must_use = "returns whether the candidate passes the filter"]
    pub const fn passes(&self, candidate: &CaptionCandidate) -> bool {
        let is_table = matches!(candidate.figure_type, FigureType::Table);
        match self {
            Self::Colon => candidate.colon,
            Self::Period => candidate.period,
            Self::Bold => candidate.bold,
            Self::Italic => candidate.italic,
            Self::CapsFigures => is_table || candidate.caps,
            Self::AbbreviatedFigures => is_table || candidate.abbreviated,
            Self::NoNextWord => !candidate.has_next_word,
            Self::BlockStart => candidate.block_start,
            Self::LineStart => candidate.line_start,
            Self::NextWord => candidate.has_next_word,
        }
    }

    /// Group-required filters describe a document-wide caption style, so
    /// they may not leave any group (ambiguous or not) without a candidate
    #[must_use = "returns whether the filter is group-required"]
    pub const fn group_required(&self) -> bool {
        !matches!(self, Self::BlockStart | Self::LineStart | Self::NextWord)
    }
}

/// Stage 3: Candidate Disambiguation
///
/// Shrinks ambiguous candidate groups with a priority-ordered filter
/// cascade, then turns the surviving groups into `CaptionStart`s.
///
/// Algorithm (repeated until no filter fires):
/// 1. For each filter in priority order, count passing candidates per group
/// 2. A filter fires if it strictly shrinks some ambiguous group and, when
///    group-required, leaves no group at zero passing candidates
/// 3. On firing, prune failing candidates from every ambiguous group that
///    keeps at least one candidate, and restart at the first filter
///
/// Groups still larger than `max_ambiguous_kept` are dropped with a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage03CandidateDisambiguator {
    config: Stage03Config,
}

impl Stage03CandidateDisambiguator {
    #[inline]
    #[must_use = "disambiguator is created but not used"]
    pub fn new() -> Self {
        Self {
            config: Stage03Config::default(),
        }
    }

    #[inline]
    #[must_use = "disambiguator is created but not used"]
    pub const fn with_config(config: Stage03Config) -> Self {
        Self { config }
    }

    /// Run the filter cascade in place
    pub fn disambiguate(&self, groups: &mut CandidateGroups) {
        while groups.values().any(|group| group.len() > 1) {
            let Some(filter) = CandidateFilter::PRIORITY
                .into_iter()
                .find(|filter| fires(*filter, groups))
            else {
                break;
            };
            for (id, group) in groups.iter_mut() {
                let passing = group.iter().filter(|c| filter.passes(c)).count();
                if group.len() > 1 && passing > 0 && passing < group.len() {
                    debug!("{filter:?} filter: group {id} {} -> {passing}", group.len());
                    group.retain(|c| filter.passes(c));
                }
            }
        }
    }

    /// Disambiguate and select caption starts per page
    #[must_use = "caption starts are returned but not used"]
    pub fn process(&self, mut groups: CandidateGroups) -> CaptionStarts {
        self.disambiguate(&mut groups);
        report_numbering_gaps(&groups);

        let mut starts = CaptionStarts::new();
        for (id, group) in &groups {
            if group.len() > self.config.max_ambiguous_kept.max(1) {
                warn!("Dropping {} ambiguous candidates for group {id}", group.len());
                continue;
            }
            if group.len() > 1 {
                info!("Keeping {} ambiguous candidates for group {id}", group.len());
            }
            for candidate in group {
                starts
                    .entry(candidate.page)
                    .or_default()
                    .push(CaptionStart::from(candidate));
            }
        }
        for page_starts in starts.values_mut() {
            page_starts.sort_by_key(|s| s.word_rank);
        }
        starts
    }
}

fn fires(filter: CandidateFilter, groups: &CandidateGroups) -> bool {
    let mut shrinks = false;
    for group in groups.values() {
        let passing = group.iter().filter(|c| filter.passes(c)).count();
        if passing == 0 && filter.group_required() {
            return false;
        }
        if group.len() > 1 && passing > 0 && passing < group.len() {
            shrinks = true;
        }
    }
    shrinks
}

fn report_numbering_gaps(groups: &CandidateGroups) {
    for figure_type in [FigureType::Figure, FigureType::Table] {
        let numbers: BTreeSet<u32> = groups
            .values()
            .flatten()
            .filter(|c| c.figure_type == figure_type)
            .map(|c| c.number)
            .collect();
        if let Some(&max) = numbers.last() {
            if max as usize != numbers.len() {
                warn!(
                    "{figure_type} numbering is not consecutive ({} numbers, highest {max})",
                    numbers.len()
                );
            }
        }
    }
}
