//! Trials and clean segments grouped by condition.
//!
//! [`build_hierarchy`] walks a marker stream once per marker group (markers
//! sharing a leading character).  Every marker ending in `'1'` opens a span
//! that the next marker of the same group closes.  The result is immutable;
//! every later correction returns a new [`EventHierarchy`].
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::marker::Marker;
use crate::error::PipelineError;

/// Sample span `[start, stop]` with `stop >= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u64,
    pub stop: u64,
}

impl Span {
    pub const fn new(start: u64, stop: u64) -> Self {
        Self { start, stop }
    }

    /// Length in samples.
    #[inline]
    pub fn len(&self) -> u64 {
        self.stop - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }
}

/// One analysis condition and the marker characters that denote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Name used in result columns (`eyesc` → `_EYESC`).
    pub name: String,
    /// Leading letter of the clean-segment markers (`'C'` → `C1`/`C2`).
    pub segment_char: char,
    /// Leading digit of the trial markers (`'0'` → `01`/`02`), if the
    /// protocol has trials for this condition.
    pub trial_char: Option<char>,
}

/// The set of conditions analysed for every subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionTaxonomy {
    pub conditions: Vec<Condition>,
}

impl ConditionTaxonomy {
    /// Resting-state protocol: eyes closed (`C`, trials `0x`) and eyes open
    /// (`O`, trials `1x`).
    pub fn resting_state() -> Self {
        Self {
            conditions: vec![
                Condition { name: "eyesc".into(), segment_char: 'C', trial_char: Some('0') },
                Condition { name: "eyeso".into(), segment_char: 'O', trial_char: Some('1') },
            ],
        }
    }

    /// Go/No-Go protocol: a single clean-space condition without trial
    /// markers.  The Go and No-Go prompts are analysed as
    /// [`PromptEpoch`](super::PromptEpoch)s next to it.
    pub fn go_nogo() -> Self {
        Self {
            conditions: vec![Condition { name: "clean".into(), segment_char: 'C', trial_char: None }],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.name.as_str())
    }

    /// Every character that starts a trial marker.
    pub fn trial_chars(&self) -> Vec<char> {
        self.conditions.iter().filter_map(|c| c.trial_char).collect()
    }

    /// Letters must mark segments and digits must mark trials, all distinct.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::InvalidConfiguration(msg));
        if self.conditions.is_empty() {
            return bad("condition taxonomy is empty".into());
        }
        let mut names = HashSet::new();
        let mut chars = HashSet::new();
        for c in &self.conditions {
            if !names.insert(c.name.as_str()) {
                return bad(format!("duplicate condition name '{}'", c.name));
            }
            if !c.segment_char.is_alphabetic() {
                return bad(format!("segment marker of '{}' must be a letter, got '{}'", c.name, c.segment_char));
            }
            if !chars.insert(c.segment_char) {
                return bad(format!("marker character '{}' used twice", c.segment_char));
            }
            if let Some(t) = c.trial_char {
                if !t.is_ascii_digit() {
                    return bad(format!("trial marker of '{}' must be a digit, got '{t}'", c.name));
                }
                if !chars.insert(t) {
                    return bad(format!("marker character '{t}' used twice"));
                }
            }
        }
        Ok(())
    }
}

impl Default for ConditionTaxonomy {
    fn default() -> Self {
        Self::resting_state()
    }
}

/// Trials and clean segments of one condition, latency-ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionEvents {
    pub trials: Vec<Span>,
    pub segments: Vec<Span>,
}

/// Per-condition trial and clean-segment spans of one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventHierarchy {
    pub conditions: BTreeMap<String, ConditionEvents>,
}

impl EventHierarchy {
    /// Clean segments of `condition` (empty if unknown).
    pub fn segments(&self, condition: &str) -> &[Span] {
        self.conditions.get(condition).map(|c| c.segments.as_slice()).unwrap_or(&[])
    }

    /// Trials of `condition` (empty if unknown).
    pub fn trials(&self, condition: &str) -> &[Span] {
        self.conditions.get(condition).map(|c| c.trials.as_slice()).unwrap_or(&[])
    }

    /// Every trial of every condition, sorted by start.
    pub fn all_trials(&self) -> Vec<Span> {
        let mut t: Vec<Span> = self.conditions.values().flat_map(|c| c.trials.iter().copied()).collect();
        t.sort();
        t
    }

    /// Total number of clean segments.
    pub fn n_segments(&self) -> usize {
        self.conditions.values().map(|c| c.segments.len()).sum()
    }

    /// Drop clean segments shorter than `min_len` samples.
    pub fn drop_short_segments(&self, min_len: u64) -> EventHierarchy {
        let conditions = self
            .conditions
            .iter()
            .map(|(name, ev)| {
                let segments = ev.segments.iter().copied().filter(|s| s.len() >= min_len).collect();
                (name.clone(), ConditionEvents { trials: ev.trials.clone(), segments })
            })
            .collect();
        EventHierarchy { conditions }
    }
}

/// Build the per-condition hierarchy from a normalised marker stream.
///
/// # Errors
///
/// [`PipelineError::MalformedMarkerSequence`] when an opening marker is the
/// last of its group, or its closing marker has a smaller latency.
pub fn build_hierarchy(
    subject: &str,
    markers: &[Marker],
    taxonomy: &ConditionTaxonomy,
) -> Result<EventHierarchy, PipelineError> {
    let mut conditions = BTreeMap::new();
    for cond in taxonomy.iter() {
        let segments = pair_spans(subject, markers, cond.segment_char)?;
        let trials = match cond.trial_char {
            Some(t) => pair_spans(subject, markers, t)?,
            None => vec![],
        };
        conditions.insert(cond.name.clone(), ConditionEvents { trials, segments });
    }
    Ok(EventHierarchy { conditions })
}

/// Pair the structural markers whose code starts with `lead` into spans.
fn pair_spans(subject: &str, markers: &[Marker], lead: char) -> Result<Vec<Span>, PipelineError> {
    let group: Vec<(usize, &Marker)> = markers
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_structural() && m.condition_char() == Some(lead))
        .collect();

    let mut spans = Vec::new();
    for (pos, &(idx, m)) in group.iter().enumerate() {
        if !m.is_open() {
            continue;
        }
        let malformed = || PipelineError::MalformedMarkerSequence {
            subject: subject.to_string(),
            index: idx,
            code: m.code.clone(),
        };
        let &(_, close) = group.get(pos + 1).ok_or_else(malformed)?;
        if close.latency < m.latency {
            return Err(malformed());
        }
        spans.push(Span::new(m.latency, close.latency));
    }
    Ok(spans)
}
