//! # specslope — EEG spectral slopes in Rust
//!
//! `specslope` estimates the aperiodic (1/f) slope of resting-state and task
//! EEG.  Clean, in-trial segments are located from the recording's event
//! markers, cut into overlapping windows, turned into Welch power spectra and
//! summarised by a straight-line fit of log-power against log-frequency,
//! per channel and per subject average.
//!
//! ## Pipeline overview
//!
//! ```text
//! <subject>.safetensors + <subject>.evt
//!   │
//!   ├─ events::normalize_codes          3-char codes → canonical 2-char form
//!   ├─ events::build_hierarchy          start/stop pairs per condition
//!   ├─ events::remove_intertrial_segments  clean time restricted to trials
//!   ├─ window::extract_windows          W-sample windows stepped by S
//!   ├─ psd::welch                       detrend · Hamming · |FFT|² density
//!   ├─ fit::fit_slope                   buffer removed · OLS | RANSAC · ×10
//!   └─ bands::band_powers               delta … beta per channel (optional)
//!
//! task recordings, per prompt epoch:
//!   events::prompt_spans → psd::tapered_concat → psd::welch → bands::band_powers
//!        │
//!        └─→ Subject { per condition: PSDs, slopes, band powers;
//!                      per prompt epoch: band powers }
//!
//! pipeline::run_cohort → slopes.csv + psds.safetensors
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use specslope::{run_cohort, PipelineConfig, RunContext, SubjectJob};
//! use specslope::io::read_metadata;
//! use std::path::Path;
//!
//! let jobs = SubjectJob::discover(Path::new("data/rest")).unwrap();
//! let metadata = read_metadata(Path::new("data/subjects.csv")).unwrap();
//! let ctx = RunContext { seed: 42, ..RunContext::new("out") };
//!
//! let cohort = run_cohort(&ctx, &PipelineConfig::default(), &jobs, &metadata).unwrap();
//! for s in &cohort.subjects {
//!     let slope = s.condition("eyesc").and_then(|r| r.mean_slope());
//!     println!("{}: {slope:?} dB/decade", s.name());
//! }
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use specslope::events::{build_hierarchy, remove_intertrial_segments, ConditionTaxonomy};
//! use specslope::fit::{fit_slope, FitParams};
//! use specslope::io::{read_markers, Recording};
//! use specslope::psd::welch;
//! use specslope::window::extract_windows;
//! use specslope::PipelineConfig;
//! use rand::{rngs::StdRng, SeedableRng};
//! use std::path::Path;
//!
//! let cfg = PipelineConfig::default();
//! let rec = Recording::load(Path::new("s01.safetensors")).unwrap();
//! let markers = read_markers(Path::new("s01.evt")).unwrap();
//!
//! let h = build_hierarchy("s01", &markers, &ConditionTaxonomy::resting_state()).unwrap();
//! let h = remove_intertrial_segments(&h);
//! let windows = extract_windows(h.segments("eyesc"), 1024, 512, rec.n_samples());
//! let psd = welch(rec.data.row(0), &windows, rec.srate).unwrap();
//! let fit = fit_slope(&psd, &FitParams::from(&cfg), &mut StdRng::seed_from_u64(0)).unwrap();
//! println!("slope {:.2}", fit.slope);
//! ```

pub mod bands;
pub mod config;
pub mod error;
pub mod events;
pub mod fit;
pub mod io;
pub mod pipeline;
pub mod psd;
pub mod subject;
pub mod table;
pub mod window;

use rand::Rng;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use bands::{band_power, band_powers, mean_band_powers, BandPowers, TRADITIONAL_BANDS};
pub use config::{FitMethod, FreqBand, PipelineConfig, RansacConfig, TrialNormalization, WindowCap};
pub use error::PipelineError;
pub use events::{ConditionTaxonomy, EventHierarchy, Marker, PromptEpoch, Span};
pub use fit::{fit_slope, FitParams, SlopeFit, SLOPE_SCALE};
pub use io::{Recording, StWriter};
pub use pipeline::{run_cohort, CohortResult, RunContext, SubjectJob};
pub use psd::{mean_psd, welch, Psd};
pub use subject::{ConditionResult, PromptResult, Subject, SubjectMeta};
pub use table::ResultTable;
pub use window::{extract_windows, Window};

/// Run every per-subject stage on one loaded recording.
///
/// # Steps
///
/// 1. Canonicalise marker codes ([`PipelineConfig::reverse_three_char_codes`])
///    and, for artifact-flagged exports, derive clean-segment markers.
/// 2. Pair markers into trials and clean segments, restrict clean time to
///    trials, normalise trial length for the configured cohort and drop
///    short segments.
/// 3. Per condition: cut windows (capped per cohort), Welch PSD per channel,
///    slope per channel and on the channel mean, band powers if enabled.
/// 4. Per prompt epoch: joined epochs after every prompt, Welch PSD and band
///    powers per channel, channel mean.
///
/// `rng` drives the robust fitter; seed it per subject for reproducible runs.
///
/// # Errors
///
/// [`PipelineError::MalformedMarkerSequence`] from step 2.  Per-channel
/// failures are stored in the result, not returned.
pub fn analyze_recording<R: Rng + ?Sized>(
    rec: &Recording,
    markers: &[Marker],
    meta: &SubjectMeta,
    cfg: &PipelineConfig,
    rng: &mut R,
) -> Result<Subject, PipelineError> {
    let markers = pipeline::prepare_markers(markers, cfg);
    let h = pipeline::subject_hierarchy(&meta.name, &markers, cfg, &meta.group, rec.srate)?;

    let cap = cfg.window_cap.for_cohort(&meta.group);
    let conditions = cfg
        .taxonomy
        .iter()
        .map(|cond| {
            let res = pipeline::analyze_condition(
                &rec.data,
                rec.srate,
                &cond.name,
                h.segments(&cond.name),
                cfg,
                cap,
                rng,
            );
            tracing::debug!(
                subject = %meta.name,
                condition = %cond.name,
                windows = res.n_windows,
                slope = ?res.mean_slope(),
                "condition analysed"
            );
            (cond.name.clone(), res)
        })
        .collect();

    let prompts = cfg
        .prompt_epochs
        .iter()
        .map(|e| (e.name.clone(), pipeline::analyze_prompt_epoch(&rec.data, rec.srate, &markers, e, cfg)))
        .collect();

    let channels = (0..rec.n_channels()).map(|ch| cfg.channel_label(ch, &rec.ch_names)).collect();
    Ok(Subject { meta: meta.clone(), channels, conditions, prompts })
}
