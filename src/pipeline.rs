//! Cohort orchestration.
//!
//! [`run_cohort`] checks configuration and metadata up front, then runs
//! every subject through [`crate::analyze_recording`] (sequentially, or on
//! a rayon pool when [`PipelineConfig::parallel`] is set), writes the
//! results table and PSD dump into [`RunContext::output_dir`] and returns
//! everything it computed.
//!
//! The per-subject stages are public so tools can inspect intermediates:
//!
//! ```text
//! markers ─► prepare_markers ─┬─► subject_hierarchy ─► analyze_condition (× conditions)
//!                             └─► analyze_prompt_epoch (× prompt epochs)
//! ```
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::bands::{band_powers, mean_band_powers, BandPowers};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::{
    build_hierarchy, clean_segments_from_artifacts, modify_trial_length, normalize_codes, prompt_spans,
    remove_intertrial_segments, sort_by_latency, EventHierarchy, Marker, PromptEpoch, Span,
};
use crate::fit::{fit_slope, FitParams};
use crate::io::{read_markers, Recording, StWriter};
use crate::psd::{self, tapered_concat, welch, Psd};
use crate::subject::{ConditionResult, PromptResult, Subject, SubjectMeta};
use crate::table::ResultTable;
use crate::window::{cap_windows, extract_windows};

/// Explicit run state shared by every subject.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Directory receiving the results table and PSD dump.
    pub output_dir: PathBuf,
    /// Tag appended to output file names (usually a VCS revision).
    pub commit: Option<String>,
    /// Base seed for the robust fitter.
    pub seed: u64,
}

impl RunContext {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into(), commit: None, seed: 0 }
    }

    fn tagged(&self, stem: &str, ext: &str) -> PathBuf {
        let file = match &self.commit {
            Some(c) => format!("{stem}_{c}.{ext}"),
            None => format!("{stem}.{ext}"),
        };
        self.output_dir.join(file)
    }

    /// `slopes[_<commit>].csv`
    pub fn results_path(&self) -> PathBuf {
        self.tagged("slopes", "csv")
    }

    /// `psds[_<commit>].safetensors`
    pub fn psd_dump_path(&self) -> PathBuf {
        self.tagged("psds", "safetensors")
    }
}

/// One subject to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectJob {
    /// Identifier, matched against the metadata `SUBJECT` column.
    pub name: String,
    pub recording: PathBuf,
    /// Event table; `None` uses the events embedded in the recording.
    pub events: Option<PathBuf>,
}

impl SubjectJob {
    /// Every `<name>.safetensors` in `dir`, paired with `<name>.evt` when
    /// present, sorted by name.
    pub fn discover(dir: &Path) -> Result<Vec<SubjectJob>> {
        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("safetensors") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            let evt = path.with_extension("evt");
            let events = evt.is_file().then_some(evt);
            jobs.push(SubjectJob { name, recording: path, events });
        }
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }
}

/// Everything a cohort run produced.
#[derive(Debug, Clone)]
pub struct CohortResult {
    /// Sorted by identifier.
    pub subjects: Vec<Subject>,
    pub table: ResultTable,
    /// Condition → mean of the subjects' mean PSDs.
    pub grand_average: BTreeMap<String, Psd>,
}

/// Identifiers of `jobs` without a metadata row, sorted.
pub fn missing_metadata(jobs: &[SubjectJob], metadata: &BTreeMap<String, SubjectMeta>) -> Vec<String> {
    let mut missing: Vec<String> =
        jobs.iter().filter(|j| !metadata.contains_key(&j.name)).map(|j| j.name.clone()).collect();
    missing.sort();
    missing.dedup();
    missing
}

/// RNG seed of one subject, independent of scheduling order.
pub fn subject_seed(seed: u64, name: &str) -> u64 {
    // FNV-1a over the name, folded into the base seed.
    let h = name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3));
    h ^ seed.rotate_left(32)
}

/// Run the cohort.
///
/// # Errors
///
/// * [`PipelineError::InvalidConfiguration`] before anything is read.
/// * [`PipelineError::MissingMetadata`] before anything is read or written.
/// * I/O failures and [`PipelineError::MalformedMarkerSequence`] from any
///   subject abort the run; no output is written.
pub fn run_cohort(
    ctx: &RunContext,
    cfg: &PipelineConfig,
    jobs: &[SubjectJob],
    metadata: &BTreeMap<String, SubjectMeta>,
) -> Result<CohortResult> {
    cfg.validate()?;

    let missing = missing_metadata(jobs, metadata);
    if !missing.is_empty() {
        return Err(PipelineError::MissingMetadata { subjects: missing }.into());
    }

    tracing::info!(subjects = jobs.len(), parallel = cfg.parallel, method = ?cfg.method, "cohort run started");

    let run_one = |job: &SubjectJob| -> Result<Subject> {
        let meta = &metadata[&job.name];
        process_job(ctx, cfg, job, meta).with_context(|| format!("subject {}", job.name))
    };
    let mut subjects: Vec<Subject> = if cfg.parallel {
        jobs.par_iter().map(run_one).collect::<Result<_>>()?
    } else {
        jobs.iter().map(run_one).collect::<Result<_>>()?
    };
    subjects.sort_by(|a, b| a.name().cmp(b.name()));

    let conditions: Vec<String> = cfg.taxonomy.names().map(String::from).collect();
    let grand_average = grand_average(&subjects, &conditions);
    let table = ResultTable::from_subjects(&subjects, cfg);

    std::fs::create_dir_all(&ctx.output_dir)
        .with_context(|| format!("creating {}", ctx.output_dir.display()))?;
    let results = ctx.results_path();
    table.write_csv_file(&results)?;
    write_psd_dump(&subjects, &grand_average, &ctx.psd_dump_path())?;
    tracing::info!(path = %results.display(), rows = table.rows.len(), "results written");

    Ok(CohortResult { subjects, table, grand_average })
}

fn process_job(ctx: &RunContext, cfg: &PipelineConfig, job: &SubjectJob, meta: &SubjectMeta) -> Result<Subject> {
    let rec = Recording::load(&job.recording)?;
    let markers = match (&job.events, &rec.events) {
        (Some(path), _) => read_markers(path)?,
        (None, Some(ev)) => ev.clone(),
        (None, None) => anyhow::bail!("no event file and no events in {}", job.recording.display()),
    };
    tracing::info!(
        subject = %job.name,
        channels = rec.n_channels(),
        samples = rec.n_samples(),
        srate = rec.srate,
        markers = markers.len(),
        "processing subject"
    );
    let mut rng = StdRng::seed_from_u64(subject_seed(ctx.seed, &job.name));
    let subject = crate::analyze_recording(&rec, &markers, meta, cfg, &mut rng)?;
    // `rec` is dropped here; only spectra outlive the subject.
    Ok(subject)
}

/// Mean of every subject's mean PSD, per condition.
pub fn grand_average(subjects: &[Subject], conditions: &[String]) -> BTreeMap<String, Psd> {
    conditions
        .iter()
        .filter_map(|c| {
            let psds = subjects.iter().filter_map(|s| s.condition(c)?.mean_psd.as_ref());
            psd::mean_psd(psds).map(|p| (c.clone(), p))
        })
        .collect()
}

/// Normalise codes (when enabled) and, for artifact-flagged exports,
/// derive the clean-segment markers.
pub fn prepare_markers(markers: &[Marker], cfg: &PipelineConfig) -> Vec<Marker> {
    let mut out = if cfg.reverse_three_char_codes { normalize_codes(markers) } else { markers.to_vec() };
    if cfg.derive_clean_from_artifacts {
        let min_len = cfg.min_segment_samples.unwrap_or(0);
        let derived: Vec<Marker> = cfg
            .taxonomy
            .iter()
            .flat_map(|c| clean_segments_from_artifacts(&out, c.segment_char, min_len))
            .collect();
        tracing::debug!(derived = derived.len(), "clean-segment markers derived from artifact flags");
        out.extend(derived);
        sort_by_latency(&mut out);
    }
    out
}

/// Build the corrected event hierarchy of one subject.
///
/// Pairing, then intertrial correction against the recorded trials or, when
/// `group` is the configured cohort, against the re-cut trials, then the
/// minimum-length filter.
///
/// Re-cutting happens on the uncorrected pairs, so a lengthened trial keeps
/// the clean time recorded past its original stop.
pub fn subject_hierarchy(
    subject: &str,
    markers: &[Marker],
    cfg: &PipelineConfig,
    group: &str,
    srate: f64,
) -> Result<EventHierarchy, PipelineError> {
    let raw = build_hierarchy(subject, markers, &cfg.taxonomy)?;
    let mut h = match cfg.trial_normalization.as_ref().filter(|tn| tn.cohort == group) {
        Some(tn) => {
            let lower = (tn.lower_s * srate).round() as u64;
            let upper = (tn.upper_s * srate).round() as u64;
            tracing::debug!(subject, lower, upper, "trial length normalised");
            modify_trial_length(&raw, lower, upper)
        }
        None => remove_intertrial_segments(&raw),
    };
    if let Some(min_len) = cfg.min_segment_samples {
        h = h.drop_short_segments(min_len);
    }
    tracing::debug!(subject, segments = h.n_segments(), "event hierarchy built");
    Ok(h)
}

/// Spectra and fits of one condition.
///
/// Every channel uses the same windows.  A condition without windows
/// reports [`PipelineError::EmptyCondition`] for every channel and, against
/// channel 0, for the subject mean.
pub fn analyze_condition<R: Rng + ?Sized>(
    data: &Array2<f32>,
    srate: f64,
    condition: &str,
    segments: &[Span],
    cfg: &PipelineConfig,
    cap: Option<usize>,
    rng: &mut R,
) -> ConditionResult {
    let windows = cap_windows(extract_windows(segments, cfg.window_len, cfg.window_step, data.ncols()), cap);
    let n_windows = windows.len();
    let params = FitParams::from(cfg);
    let empty = |channel: usize| PipelineError::EmptyCondition { channel, condition: condition.to_string() };

    let channel_psds: Vec<Option<Psd>> = data.rows().into_iter().map(|row| welch(row, &windows, srate)).collect();
    let mut channel_fits = Vec::with_capacity(channel_psds.len());
    for (ch, p) in channel_psds.iter().enumerate() {
        let fit = match p {
            Some(p) => fit_slope(p, &params, rng),
            None => Err(empty(ch)),
        };
        if let Err(e) = &fit {
            tracing::warn!(channel = ch, condition, error = %e, "channel slope missing");
        }
        channel_fits.push(fit);
    }

    let mean_psd = psd::mean_psd(channel_psds.iter().flatten());
    let mean_fit = match &mean_psd {
        Some(p) => fit_slope(p, &params, rng),
        None => Err(empty(0)),
    };
    let band_power = if cfg.band_power {
        let per_channel: Vec<BandPowers> = channel_psds.iter().flatten().map(band_powers).collect();
        mean_band_powers(&per_channel)
    } else {
        None
    };

    ConditionResult { n_windows, channel_psds, channel_fits, mean_psd, mean_fit, band_power }
}

/// Band powers of one prompt-locked epoch.
///
/// Per channel, the epochs after every prompt are tapered and joined
/// ([`tapered_concat`]), then Welch-averaged over
/// [`PipelineConfig::prompt_window_len`]-sample segments.  Joined epochs
/// shorter than one segment leave the channel without a value.
pub fn analyze_prompt_epoch(
    data: &Array2<f32>,
    srate: f64,
    markers: &[Marker],
    epoch: &PromptEpoch,
    cfg: &PipelineConfig,
) -> PromptResult {
    let spans = prompt_spans(markers, epoch, data.ncols());
    let mut channel_psds = Vec::with_capacity(data.nrows());
    for row in data.rows() {
        let joined = tapered_concat(row, &spans);
        let whole = [Span::new(0, joined.len() as u64)];
        let windows = extract_windows(&whole, cfg.prompt_window_len, cfg.prompt_window_step, joined.len());
        channel_psds.push(welch(joined.view(), &windows, srate));
    }
    if channel_psds.iter().all(Option::is_none) {
        tracing::warn!(
            epoch = %epoch.name,
            prompts = spans.len(),
            samples = spans.len() as u64 * epoch.len,
            "joined prompt epochs shorter than one Welch segment"
        );
    }
    let channel_bands: Vec<Option<BandPowers>> = channel_psds.iter().map(|p| p.as_ref().map(band_powers)).collect();
    let mean_bands = mean_band_powers(channel_bands.iter().flatten());
    PromptResult { n_prompts: spans.len(), channel_psds, channel_bands, mean_bands }
}

/// Write every subject's channel PSDs and fit lines, plus the grand
/// averages.
///
/// Keys: `freqs` [F], `psd_<subject>_<cond>` and `fit_<subject>_<cond>`
/// [C, F] (missing channels are `NaN` rows), `grand_<cond>` [F], and per
/// prompt epoch `prompt_freqs_<epoch>` [P] with `prompt_psd_<subject>_<epoch>`
/// [C, P].
pub fn write_psd_dump(subjects: &[Subject], grand_average: &BTreeMap<String, Psd>, path: &Path) -> Result<()> {
    let freqs = subjects
        .iter()
        .flat_map(|s| s.conditions.values())
        .flat_map(|r| r.channel_psds.iter().flatten())
        .map(|p| p.freqs.clone())
        .next()
        .unwrap_or_default();
    let nf = freqs.len();

    let mut w = StWriter::new();
    w.add("freqs", &freqs, &[nf]);
    for s in subjects {
        for (cond, r) in &s.conditions {
            let psd_rows = psd_matrix(&r.channel_psds, nf);
            let mut fit_rows = Array2::<f64>::from_elem((r.channel_fits.len(), nf), f64::NAN);
            for (ch, f) in r.channel_fits.iter().enumerate() {
                match f {
                    Ok(f) if f.fit_line.len() == nf => {
                        fit_rows.row_mut(ch).assign(&ndarray::ArrayView1::from(&f.fit_line[..]));
                    }
                    _ => {}
                }
            }
            w.add_arr2(&format!("psd_{}_{cond}", s.name()), &psd_rows);
            w.add_arr2(&format!("fit_{}_{cond}", s.name()), &fit_rows);
        }
    }
    for (cond, p) in grand_average {
        w.add(&format!("grand_{cond}"), &p.power, &[p.len()]);
    }

    let mut prompt_bins: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (epoch, r) in subjects.iter().flat_map(|s| &s.prompts) {
        if let Some(p) = r.channel_psds.iter().flatten().next() {
            prompt_bins.entry(epoch.as_str()).or_insert_with(|| p.freqs.clone());
        }
    }
    for (epoch, f) in &prompt_bins {
        w.add(&format!("prompt_freqs_{epoch}"), f, &[f.len()]);
    }
    for s in subjects {
        for (epoch, r) in &s.prompts {
            let nf = prompt_bins.get(epoch.as_str()).map_or(0, Vec::len);
            w.add_arr2(&format!("prompt_psd_{}_{epoch}", s.name()), &psd_matrix(&r.channel_psds, nf));
        }
    }
    w.write(path)
}

/// `[C, nf]` matrix of channel PSDs; missing or mis-sized rows are `NaN`.
fn psd_matrix(psds: &[Option<Psd>], nf: usize) -> Array2<f64> {
    let mut m = Array2::<f64>::from_elem((psds.len(), nf), f64::NAN);
    for (ch, p) in psds.iter().enumerate() {
        if let Some(p) = p.as_ref().filter(|p| p.len() == nf) {
            m.row_mut(ch).assign(&ndarray::ArrayView1::from(&p.power[..]));
        }
    }
    m
}
