//! Per-subject results.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bands::BandPowers;
use crate::error::PipelineError;
use crate::fit::SlopeFit;
use crate::psd::Psd;

/// One metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectMeta {
    /// Subject identifier, also the recording's file stem.
    pub name: String,
    /// Cohort / class label (`CLASS` column).
    pub group: String,
    /// Age as written in the metadata (`AGE` column).
    pub age: String,
    /// `SEX` column.
    pub sex: String,
}

/// Everything computed for one condition of one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionResult {
    /// Windows that entered every channel's PSD.
    pub n_windows: usize,
    /// `None` for channels without windows.
    pub channel_psds: Vec<Option<Psd>>,
    pub channel_fits: Vec<Result<SlopeFit, PipelineError>>,
    /// Mean of the defined channel PSDs.
    pub mean_psd: Option<Psd>,
    /// Fit on [`Self::mean_psd`].
    pub mean_fit: Result<SlopeFit, PipelineError>,
    /// Channel mean of per-channel band powers, when enabled.
    pub band_power: Option<BandPowers>,
}

impl ConditionResult {
    /// Slope of channel `ch`, `None` when missing.
    pub fn channel_slope(&self, ch: usize) -> Option<f64> {
        self.channel_fits.get(ch)?.as_ref().ok().map(|f| f.slope)
    }

    /// Slope of the subject-average PSD.
    pub fn mean_slope(&self) -> Option<f64> {
        self.mean_fit.as_ref().ok().map(|f| f.slope)
    }
}

/// Band powers of one prompt-locked epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptResult {
    /// Prompts whose epoch fits in the recording.
    pub n_prompts: usize,
    /// PSD of the joined epochs, `None` when they are shorter than one
    /// Welch segment.
    pub channel_psds: Vec<Option<Psd>>,
    pub channel_bands: Vec<Option<BandPowers>>,
    /// Band-wise mean over the channels that have a value.
    pub mean_bands: Option<BandPowers>,
}

/// A processed subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub meta: SubjectMeta,
    /// Channel labels, one per data row.
    pub channels: Vec<String>,
    /// Condition name → result.
    pub conditions: BTreeMap<String, ConditionResult>,
    /// Prompt epoch name → result.
    pub prompts: BTreeMap<String, PromptResult>,
}

impl Subject {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn condition(&self, name: &str) -> Option<&ConditionResult> {
        self.conditions.get(name)
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptResult> {
        self.prompts.get(name)
    }
}
