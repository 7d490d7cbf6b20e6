//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the spectral-slope
//! pipeline.  All fields have defaults matching the resting-state analysis
//! (512 Hz recordings, 2 s windows at 50 % overlap, RANSAC over 2–24 Hz with
//! the 7–14 Hz alpha band excluded).
//!
//! The struct deserialises from JSON with every field optional, so a config
//! file only needs to name what it changes:
//!
//! ```json
//! { "method": "ordinary", "fit_band": { "lo": 1.0, "hi": 30.0 } }
//! ```
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::events::{ConditionTaxonomy, PromptEpoch};

/// Line-fitting method used by the slope fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Closed-form least squares over every selected point.
    #[serde(alias = "linreg")]
    Ordinary,
    /// Random-sample consensus followed by least squares on the inliers.
    #[serde(alias = "ransac")]
    Robust,
}

impl std::str::FromStr for FitMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ordinary" | "linreg" => Ok(FitMethod::Ordinary),
            "robust" | "ransac" => Ok(FitMethod::Robust),
            other => Err(PipelineError::InvalidConfiguration(format!(
                "unknown fitting method '{other}' (expected ordinary|robust)"
            ))),
        }
    }
}

/// Closed frequency interval `[lo, hi]` in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreqBand {
    pub lo: f64,
    pub hi: f64,
}

impl FreqBand {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// `true` when `f` lies in `[lo, hi]`.
    #[inline]
    pub fn contains(&self, f: f64) -> bool {
        f >= self.lo && f <= self.hi
    }
}

/// Upper bound on the number of windows used per subject and condition.
///
/// Excess windows are dropped from the tail of the window sequence, so the
/// same input always yields the same PSD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowCap {
    /// Cap applied to every cohort without its own entry. `None` = no cap.
    pub default: Option<usize>,
    /// Cohort label (metadata `CLASS`) → cap.
    pub per_cohort: BTreeMap<String, usize>,
}

impl WindowCap {
    /// Cap in force for subjects of `cohort`.
    pub fn for_cohort(&self, cohort: &str) -> Option<usize> {
        self.per_cohort.get(cohort).copied().or(self.default)
    }
}

/// Trial-length normalisation applied to one cohort.
///
/// Every trial of a matching subject is re-cut to
/// `[start + lower_s, start + upper_s]` seconds, then clean segments are
/// re-checked against the new trial bounds.  Used to match a cohort that
/// recorded 60 s trials against one that recorded 30 s trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialNormalization {
    /// Cohort label (metadata `CLASS`) the normalisation applies to.
    pub cohort: String,
    /// New trial start, seconds after the original start.
    pub lower_s: f64,
    /// New trial stop, seconds after the original start.
    pub upper_s: f64,
}

/// RANSAC parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Maximum number of random 2-point candidate lines.
    ///
    /// Default: `100`.
    pub max_trials: usize,

    /// Absolute residual (log10 power units) below which a point counts as
    /// an inlier.  `None` uses the median absolute deviation of the fitted
    /// log-power values.
    ///
    /// Default: `None`.
    pub residual_threshold: Option<f64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self { max_trials: 100, residual_threshold: None }
    }
}

/// Configuration for the full spectral-slope pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use specslope::{FitMethod, FreqBand, PipelineConfig};
///
/// let cfg = PipelineConfig {
///     method:   FitMethod::Ordinary,
///     fit_band: FreqBand::new(1.0, 30.0),
///     ..PipelineConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Regression used for the slope.
    ///
    /// Default: [`FitMethod::Robust`].
    pub method: FitMethod,

    /// Frequencies (Hz) the line is fitted over.  `lo` must be strictly
    /// positive because the fit runs on log-frequency.
    ///
    /// Default: `[2, 24]` Hz.
    pub fit_band: FreqBand,

    /// Band excluded from fitting, typically alpha.  `None` disables it.
    ///
    /// Default: `[7, 14]` Hz.
    pub buffer_band: Option<FreqBand>,

    /// Analysis window length in samples.  Sets the PSD resolution to
    /// `srate / window_len` Hz per bin.
    ///
    /// Default: `1024` (2 s at 512 Hz).
    pub window_len: usize,

    /// Distance in samples between consecutive window starts.
    ///
    /// Default: `512` (50 % overlap).
    pub window_step: usize,

    /// Optional per-cohort window-count cap.
    pub window_cap: WindowCap,

    /// Clean segments shorter than this many samples are discarded after
    /// intertrial correction.  `None` keeps every segment (segments shorter
    /// than one window still contribute no windows).
    ///
    /// Default: `None`.
    pub min_segment_samples: Option<u64>,

    /// Optional trial-length normalisation for one cohort.
    pub trial_normalization: Option<TrialNormalization>,

    /// Canonicalise 3-character marker codes by reversing their first two
    /// characters (and dropping the third).  Some exports transpose the
    /// condition digit; others never emit 3-character codes.
    ///
    /// Default: `true`.
    pub reverse_three_char_codes: bool,

    /// Derive clean segments from `BLINK`/`ARTFCT` flags instead of reading
    /// explicit clean-segment markers (Go/No-Go recordings).
    ///
    /// Default: `false`.
    pub derive_clean_from_artifacts: bool,

    /// Conditions to analyse and the marker characters that denote them.
    pub taxonomy: ConditionTaxonomy,

    /// RANSAC tuning (ignored by [`FitMethod::Ordinary`]).
    pub ransac: RansacConfig,

    /// Compute traditional band powers per channel for every condition.
    ///
    /// Default: `false`.
    pub band_power: bool,

    /// Prompt-locked epochs analysed for band power (Go/No-Go task).
    ///
    /// Default: none.
    pub prompt_epochs: Vec<PromptEpoch>,

    /// Welch segment length for the joined prompt epochs, in samples.
    ///
    /// Default: `256`.
    pub prompt_window_len: usize,

    /// Welch step for the joined prompt epochs, in samples.
    ///
    /// Default: `128` (50 % overlap).
    pub prompt_window_step: usize,

    /// Process subjects on a rayon worker pool.
    ///
    /// Default: `false`.
    pub parallel: bool,

    /// Channel labels (montage).  Empty = use the recording's own channel
    /// names, or `CH<idx>` when it has none.
    pub channels: Vec<String>,
}

impl Default for PipelineConfig {
    /// Resting-state settings: RANSAC · 2–24 Hz · alpha 7–14 Hz excluded ·
    /// 1024-sample windows stepped by 512.
    fn default() -> Self {
        Self {
            method: FitMethod::Robust,
            fit_band: FreqBand::new(2.0, 24.0),
            buffer_band: Some(FreqBand::new(7.0, 14.0)),
            window_len: 1024,
            window_step: 512,
            window_cap: WindowCap::default(),
            min_segment_samples: None,
            trial_normalization: None,
            reverse_three_char_codes: true,
            derive_clean_from_artifacts: false,
            taxonomy: ConditionTaxonomy::resting_state(),
            ransac: RansacConfig::default(),
            band_power: false,
            prompt_epochs: vec![],
            prompt_window_len: 256,
            prompt_window_step: 128,
            parallel: false,
            channels: vec![],
        }
    }
}

impl PipelineConfig {
    /// Go/No-Go settings: clean space from artifact flags (2 s minimum),
    /// plus the four prompt epochs of [`PromptEpoch::go_nogo`].
    pub fn go_nogo() -> Self {
        Self {
            taxonomy: ConditionTaxonomy::go_nogo(),
            derive_clean_from_artifacts: true,
            min_segment_samples: Some(1024),
            prompt_epochs: PromptEpoch::go_nogo(),
            ..Self::default()
        }
    }

    /// Load a (partial) configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: PipelineConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Check ranges and consistency.  Run before any subject is touched.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::InvalidConfiguration(msg));

        let FreqBand { lo, hi } = self.fit_band;
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || hi < 0.0 {
            return bad(format!("fitting band [{lo}, {hi}] must be finite and non-negative"));
        }
        if lo == 0.0 {
            return bad("fitting band must start above 0 Hz (log-frequency fit)".into());
        }
        if lo >= hi {
            return bad(format!("fitting band requires lo < hi, got [{lo}, {hi}]"));
        }

        if let Some(FreqBand { lo: blo, hi: bhi }) = self.buffer_band {
            if !blo.is_finite() || !bhi.is_finite() || blo < 0.0 || bhi < 0.0 {
                return bad(format!("buffer band [{blo}, {bhi}] must be finite and non-negative"));
            }
            if blo > bhi {
                return bad(format!("buffer band requires lo <= hi, got [{blo}, {bhi}]"));
            }
            if blo <= lo && bhi >= hi {
                return bad(format!(
                    "buffer band [{blo}, {bhi}] covers the whole fitting band [{lo}, {hi}]"
                ));
            }
        }

        if self.window_len < 2 {
            return bad(format!("window_len must be >= 2, got {}", self.window_len));
        }
        if self.window_step == 0 || self.window_step > self.window_len {
            return bad(format!(
                "window_step must be in 1..={}, got {}",
                self.window_len, self.window_step
            ));
        }
        if self.window_cap.default == Some(0) || self.window_cap.per_cohort.values().any(|&c| c == 0) {
            return bad("window caps must be >= 1".into());
        }

        if let Some(tn) = &self.trial_normalization {
            if !(tn.lower_s >= 0.0 && tn.lower_s < tn.upper_s && tn.upper_s.is_finite()) {
                return bad(format!(
                    "trial normalisation needs 0 <= lower_s < upper_s, got [{}, {}]",
                    tn.lower_s, tn.upper_s
                ));
            }
        }

        if self.prompt_window_len < 2
            || self.prompt_window_step == 0
            || self.prompt_window_step > self.prompt_window_len
        {
            return bad(format!(
                "prompt windows need len >= 2 and step in 1..=len, got len {} step {}",
                self.prompt_window_len, self.prompt_window_step
            ));
        }
        let mut epoch_names = std::collections::HashSet::new();
        for e in &self.prompt_epochs {
            if e.len == 0 || e.code.is_empty() {
                return bad(format!("prompt epoch '{}' needs a prompt code and a length", e.name));
            }
            if !epoch_names.insert(e.name.as_str()) || self.taxonomy.names().any(|c| c == e.name) {
                return bad(format!("prompt epoch name '{}' used twice", e.name));
            }
        }

        if self.method == FitMethod::Robust {
            if self.ransac.max_trials == 0 {
                return bad("ransac.max_trials must be >= 1".into());
            }
            if let Some(t) = self.ransac.residual_threshold {
                if !(t.is_finite() && t > 0.0) {
                    return bad(format!("ransac.residual_threshold must be > 0, got {t}"));
                }
            }
        }

        self.taxonomy.validate()
    }

    /// Channel label for index `ch`, preferring the configured montage.
    pub fn channel_label(&self, ch: usize, recording_names: &[String]) -> String {
        self.channels
            .get(ch)
            .or_else(|| recording_names.get(ch))
            .cloned()
            .unwrap_or_else(|| format!("CH{ch}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_fit_band_rejected() {
        let cfg = PipelineConfig { fit_band: FreqBand::new(24.0, 2.0), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfiguration(_))));
    }

    #[test]
    fn negative_buffer_rejected() {
        let cfg = PipelineConfig {
            buffer_band: Some(FreqBand::new(-1.0, 14.0)),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn step_longer_than_window_rejected() {
        let cfg = PipelineConfig { window_step: 2048, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{ "method": "linreg", "window_cap": { "per_cohort": { "YA": 40 } } }"#)
                .unwrap();
        assert_eq!(cfg.method, FitMethod::Ordinary);
        assert_eq!(cfg.window_len, 1024);
        assert_eq!(cfg.window_cap.for_cohort("YA"), Some(40));
        assert_eq!(cfg.window_cap.for_cohort("OA"), None);
    }

    #[test]
    fn go_nogo_preset_is_valid() {
        let cfg = PipelineConfig::go_nogo();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.prompt_epochs.len(), 4);
    }

    #[test]
    fn duplicate_prompt_epoch_rejected() {
        let mut cfg = PipelineConfig::go_nogo();
        cfg.prompt_epochs.push(PromptEpoch::new("go_a", "GO_PROMPT", 0, 10));
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfiguration(_))));
    }

    #[test]
    fn method_from_str() {
        assert_eq!("RANSAC".parse::<FitMethod>().unwrap(), FitMethod::Robust);
        assert!("lasso".parse::<FitMethod>().is_err());
    }

    #[test]
    fn channel_label_fallbacks() {
        let cfg = PipelineConfig { channels: vec!["PCC".into()], ..Default::default() };
        let rec = vec!["A01".to_string(), "A02".to_string()];
        assert_eq!(cfg.channel_label(0, &rec), "PCC");
        assert_eq!(cfg.channel_label(1, &rec), "A02");
        assert_eq!(cfg.channel_label(2, &rec), "CH2");
    }
}
