//! Event hierarchy builder.
//!
//! - [`marker`]: marker type and 3-character code canonicalisation.
//! - [`hierarchy`]: pairing of start/stop markers into per-condition trials
//!   and clean segments.
//! - [`intertrial`]: removal of clean-segment time that falls between trials,
//!   and trial-length normalisation.
//! - [`artifact`]: clean segments derived from blink/artifact flags.
//! - [`prompt`]: fixed epochs after stimulus prompts (Go/No-Go task).
//!
//! Every step takes its input by reference and returns a new value; no
//! stage edits a structure another stage is still reading.

pub mod artifact;
pub mod hierarchy;
pub mod intertrial;
pub mod marker;
pub mod prompt;

pub use artifact::clean_segments_from_artifacts;
pub use hierarchy::{build_hierarchy, Condition, ConditionEvents, ConditionTaxonomy, EventHierarchy, Span};
pub use intertrial::{modify_trial_length, remove_intertrial_segments, start_in_intertrial, stop_in_intertrial};
pub use marker::{normalize_code, normalize_codes, sort_by_latency, Marker};
pub use prompt::{prompt_spans, PromptEpoch};
