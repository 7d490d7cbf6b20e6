/// subject_steps: run one subject through each pipeline stage and write every
/// intermediate to a safetensors file for inspection.
///
/// Output keys (per condition `<c>`):
///   markers          [B]       U8   normalised `code\tlatency` lines
///   spans_raw_<c>    [N, 2]    f64  clean segments straight from pairing
///   spans_<c>        [M, 2]    f64  after intertrial correction etc.
///   trials_<c>       [K, 2]    f64  trial spans used for the correction
///   windows_<c>      [W]       f64  window start samples (after the cap)
///   freqs            [F]       f64
///   psd_<c>          [C, F]    f64  per-channel Welch PSD (NaN rows if none)
///   fit_<c>          [C, F]    f64  per-channel fit line, log10 power
///   slope_<c>        [C]       f64  per-channel slope (NaN if missing)
///   mean_psd_<c>     [F]       f64
///   mean_slope_<c>   [1]       f64
///
/// and per prompt epoch `<e>`:
///   prompt_spans_<e> [N, 2]    f64  epoch spans after each prompt
///   prompt_freqs_<e> [P]       f64
///   prompt_psd_<e>   [C, P]    f64  Welch PSD of the joined epochs
///   prompt_bands_<e> [C, B]    f64  delta, theta, alpha, beta per channel
use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use specslope::{
    events::build_hierarchy,
    io::{read_markers, Recording, StWriter},
    events::prompt_spans,
    pipeline::{analyze_condition, analyze_prompt_epoch, prepare_markers, subject_hierarchy, subject_seed},
    PipelineConfig, Span, TRADITIONAL_BANDS,
};

#[derive(Parser, Debug)]
#[command(name = "subject_steps")]
struct Args {
    /// Input recording (.safetensors).
    #[arg(long)]
    recording: PathBuf,

    /// Event table; defaults to the events stored in the recording.
    #[arg(long)]
    events: Option<PathBuf>,

    /// Output safetensors path.
    #[arg(long)]
    output: PathBuf,

    /// JSON configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cohort label (selects window cap and trial normalisation).
    #[arg(long, default_value = "")]
    group: String,

    /// Seed for the robust fitter.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Logging verbosity level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn spans(v: &[Span]) -> (Vec<f64>, [usize; 2]) {
    let flat = v.iter().flat_map(|s| [s.start as f64, s.stop as f64]).collect();
    (flat, [v.len(), 2])
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(level).with_writer(std::io::stderr).finish(),
    )?;

    let cfg = match &args.config {
        Some(p) => PipelineConfig::from_json_file(p)?,
        None => PipelineConfig::default(),
    };
    cfg.validate()?;

    // ── 1. Load ────────────────────────────────────────────────────────────
    let rec = Recording::load(&args.recording)?;
    let markers = match (&args.events, &rec.events) {
        (Some(p), _) => read_markers(p)?,
        (None, Some(ev)) => ev.clone(),
        (None, None) => anyhow::bail!("{} carries no events; pass --events", args.recording.display()),
    };
    let (n_ch, n_t) = rec.data.dim();
    info!(subject = %rec.name, n_ch, n_t, srate = rec.srate, markers = markers.len(), "loaded");

    // ── 2. Markers and hierarchy ───────────────────────────────────────────
    let markers = prepare_markers(&markers, &cfg);
    let raw = build_hierarchy(&rec.name, &markers, &cfg.taxonomy)?;
    let h = subject_hierarchy(&rec.name, &markers, &cfg, &args.group, rec.srate)?;

    let mut w = StWriter::new();
    let lines: Vec<String> = markers.iter().map(|m| format!("{}\t{}", m.code, m.latency)).collect();
    w.add_str("markers", &lines.join("\n"));

    // ── 3. Windows, PSDs, fits ─────────────────────────────────────────────
    let mut rng = StdRng::seed_from_u64(subject_seed(args.seed, &rec.name));
    let cap = cfg.window_cap.for_cohort(&args.group);
    let mut freqs_written = false;
    for cond in cfg.taxonomy.iter() {
        let c = &cond.name;
        for (key, v) in [
            (format!("spans_raw_{c}"), raw.segments(c)),
            (format!("spans_{c}"), h.segments(c)),
            (format!("trials_{c}"), h.trials(c)),
        ] {
            let (flat, shape) = spans(v);
            w.add(&key, &flat, &shape);
        }

        let windows = specslope::window::cap_windows(
            specslope::window::extract_windows(h.segments(c), cfg.window_len, cfg.window_step, n_t),
            cap,
        );
        let starts: Vec<f64> = windows.iter().map(|w| w.start as f64).collect();
        w.add(&format!("windows_{c}"), &starts, &[starts.len()]);

        let res = analyze_condition(&rec.data, rec.srate, c, h.segments(c), &cfg, cap, &mut rng);
        let Some(mean) = &res.mean_psd else {
            info!(condition = %c, "no windows");
            continue;
        };
        let nf = mean.len();
        if !freqs_written {
            w.add("freqs", &mean.freqs, &[nf]);
            freqs_written = true;
        }

        let mut psd = Array2::<f64>::from_elem((n_ch, nf), f64::NAN);
        let mut fit = Array2::<f64>::from_elem((n_ch, nf), f64::NAN);
        let mut slope = vec![f64::NAN; n_ch];
        for ch in 0..n_ch {
            if let Some(p) = &res.channel_psds[ch] {
                psd.row_mut(ch).iter_mut().zip(&p.power).for_each(|(d, s)| *d = *s);
            }
            if let Ok(f) = &res.channel_fits[ch] {
                fit.row_mut(ch).iter_mut().zip(&f.fit_line).for_each(|(d, s)| *d = *s);
                slope[ch] = f.slope;
            }
        }
        w.add_arr2(&format!("psd_{c}"), &psd);
        w.add_arr2(&format!("fit_{c}"), &fit);
        w.add(&format!("slope_{c}"), &slope, &[n_ch]);
        w.add(&format!("mean_psd_{c}"), &mean.power, &[nf]);
        w.add(&format!("mean_slope_{c}"), &[res.mean_slope().unwrap_or(f64::NAN)], &[1]);

        info!(condition = %c, windows = res.n_windows, slope = ?res.mean_slope(), "condition done");
    }

    // ── 4. Prompt epochs ───────────────────────────────────────────────────
    let nb = TRADITIONAL_BANDS.len();
    for epoch in &cfg.prompt_epochs {
        let e = &epoch.name;
        let (flat, shape) = spans(&prompt_spans(&markers, epoch, n_t));
        w.add(&format!("prompt_spans_{e}"), &flat, &shape);

        let res = analyze_prompt_epoch(&rec.data, rec.srate, &markers, epoch, &cfg);
        let Some(first) = res.channel_psds.iter().flatten().next() else {
            info!(epoch = %e, prompts = res.n_prompts, "joined epochs too short for a PSD");
            continue;
        };
        let nf = first.len();
        w.add(&format!("prompt_freqs_{e}"), &first.freqs, &[nf]);

        let mut psd = Array2::<f64>::from_elem((n_ch, nf), f64::NAN);
        let mut bands = Array2::<f64>::from_elem((n_ch, nb), f64::NAN);
        for ch in 0..n_ch {
            if let Some(p) = &res.channel_psds[ch] {
                psd.row_mut(ch).iter_mut().zip(&p.power).for_each(|(d, s)| *d = *s);
            }
            if let Some(bp) = &res.channel_bands[ch] {
                bands.row_mut(ch).iter_mut().zip(&bp.bands).for_each(|(d, b)| *d = b.power);
            }
        }
        w.add_arr2(&format!("prompt_psd_{e}"), &psd);
        w.add_arr2(&format!("prompt_bands_{e}"), &bands);
        info!(epoch = %e, prompts = res.n_prompts, "prompt epoch done");
    }

    w.write(&args.output).with_context(|| format!("writing {}", args.output.display()))?;
    eprintln!("Written → {}", args.output.display());
    Ok(())
}
