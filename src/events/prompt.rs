//! Fixed epochs locked to stimulus prompts.
//!
//! Task recordings mark every stimulus with a prompt code (`GO_PROMPT`,
//! `NOGO_PROMPT`).  A [`PromptEpoch`] names one post-stimulus interval:
//! `len` samples starting `offset` samples after each matching prompt.
//!
//! ```text
//! prompt ─┬─ offset ─┬──── len ────┐
//!         │          └─ epoch span ┘
//! ```
use serde::{Deserialize, Serialize};

use super::hierarchy::Span;
use super::marker::Marker;

/// One prompt-locked analysis interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEpoch {
    /// Name used in result columns (`go_a` → `AVG_GO_A_DELTA`).
    pub name: String,
    /// Marker code of the prompt, matched exactly.
    pub code: String,
    /// Samples between the prompt and the epoch start.
    pub offset: u64,
    /// Epoch length in samples.
    pub len: u64,
}

impl PromptEpoch {
    pub fn new(name: &str, code: &str, offset: u64, len: u64) -> Self {
        Self { name: name.to_string(), code: code.to_string(), offset, len }
    }

    /// The Go/No-Go epochs at 512 Hz: `a` = 150–300 ms and `b` = 300–600 ms
    /// after each `GO_PROMPT` and `NOGO_PROMPT`.
    pub fn go_nogo() -> Vec<PromptEpoch> {
        vec![
            PromptEpoch::new("go_a", "GO_PROMPT", 77, 77),
            PromptEpoch::new("go_b", "GO_PROMPT", 154, 154),
            PromptEpoch::new("nogo_a", "NOGO_PROMPT", 77, 77),
            PromptEpoch::new("nogo_b", "NOGO_PROMPT", 154, 154),
        ]
    }
}

/// Epoch spans of every `epoch.code` prompt, in marker order.
///
/// Spans ending past `n_samples` are left out.
pub fn prompt_spans(markers: &[Marker], epoch: &PromptEpoch, n_samples: usize) -> Vec<Span> {
    let spans: Vec<Span> = markers
        .iter()
        .filter(|m| m.code == epoch.code)
        .map(|m| Span::new(m.latency + epoch.offset, m.latency + epoch.offset + epoch.len))
        .collect();
    let total = spans.len();
    let kept: Vec<Span> = spans.into_iter().filter(|s| s.stop <= n_samples as u64).collect();
    if kept.len() < total {
        tracing::warn!(epoch = %epoch.name, dropped = total - kept.len(), "prompt epochs past the end of the recording");
    }
    kept
}
