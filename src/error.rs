//! Domain error taxonomy.
//!
//! Run-level failures (configuration, metadata, malformed markers) abort the
//! whole cohort.  Per-channel failures ([`PipelineError::EmptyCondition`],
//! [`PipelineError::NonPositivePower`], [`PipelineError::DegenerateFit`]) are
//! stored in the subject's result slot and exported as missing values.
use thiserror::Error;

/// Errors raised by the spectral-slope pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// One or more recordings have no row in the subject metadata table.
    #[error("no metadata for subject(s): {}", subjects.join(", "))]
    MissingMetadata {
        /// Every offending identifier, sorted.
        subjects: Vec<String>,
    },

    /// A start marker was never closed, or closed before it opened.
    #[error("malformed marker sequence for subject {subject}: marker #{index} ({code}) has no valid closing marker")]
    MalformedMarkerSequence {
        /// Subject identifier.
        subject: String,
        /// Index of the offending marker in the full marker stream.
        index: usize,
        /// Code of the offending marker.
        code: String,
    },

    /// No usable window for a channel/condition.
    #[error("no usable windows for channel {channel} in condition {condition}")]
    EmptyCondition {
        /// Channel index.
        channel: usize,
        /// Condition name.
        condition: String,
    },

    /// A PSD bin entering the log transform is zero, negative or not finite.
    #[error("non-positive power {value:e} at {freq} Hz")]
    NonPositivePower {
        /// Bin centre frequency (Hz).
        freq: f64,
        /// Offending power value.
        value: f64,
    },

    /// Too few distinct points left in the fitting band to define a line.
    #[error("degenerate fit: {n_points} usable point(s) in fitting band")]
    DegenerateFit {
        /// Number of points that survived band selection.
        n_points: usize,
    },

    /// Out-of-range or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl PipelineError {
    /// `true` for errors that are recorded as a missing value instead of
    /// aborting the run.
    pub fn is_per_channel(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyCondition { .. }
                | PipelineError::NonPositivePower { .. }
                | PipelineError::DegenerateFit { .. }
        )
    }
}
