use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use specslope::{
    io::read_metadata, run_cohort, FitMethod, PipelineConfig, RunContext, SubjectJob,
};

#[derive(Parser, Debug)]
#[command(name = "slopes", version, about = "EEG spectral-slope estimation for a cohort")]
struct Args {
    /// Directory of <subject>.safetensors recordings (with <subject>.evt)
    #[arg(long)]
    input_dir: PathBuf,

    /// Subject metadata CSV (SUBJECT, CLASS, AGE, SEX)
    #[arg(long)]
    metadata: PathBuf,

    /// Output directory for slopes.csv and psds.safetensors
    #[arg(long)]
    output_dir: PathBuf,

    /// JSON configuration; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fitting method: robust (ransac) or ordinary (linreg)
    #[arg(long)]
    method: Option<FitMethod>,

    /// Fitting band low edge (Hz)
    #[arg(long)]
    fit_lo: Option<f64>,

    /// Fitting band high edge (Hz)
    #[arg(long)]
    fit_hi: Option<f64>,

    /// Fit over the whole band, no alpha exclusion
    #[arg(long)]
    no_buffer: bool,

    /// Window length in samples
    #[arg(long)]
    window_len: Option<usize>,

    /// Window step in samples
    #[arg(long)]
    window_step: Option<usize>,

    /// Window cap applied to every cohort
    #[arg(long)]
    max_windows: Option<usize>,

    /// Go/No-Go recordings: clean space from artifact flags plus
    /// Go and No-Go prompt epochs
    #[arg(long)]
    go_nogo: bool,

    /// Add per-condition band-power columns
    #[arg(long)]
    band_power: bool,

    /// Process subjects in parallel
    #[arg(long)]
    parallel: bool,

    /// Seed for the robust fitter
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Tag appended to output file names
    #[arg(long)]
    commit: Option<String>,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(m) = args.method {
        cfg.method = m;
    }
    if let Some(lo) = args.fit_lo {
        cfg.fit_band.lo = lo;
    }
    if let Some(hi) = args.fit_hi {
        cfg.fit_band.hi = hi;
    }
    if args.no_buffer {
        cfg.buffer_band = None;
    }
    if let Some(w) = args.window_len {
        cfg.window_len = w;
    }
    if let Some(s) = args.window_step {
        cfg.window_step = s;
    }
    if let Some(c) = args.max_windows {
        cfg.window_cap.default = Some(c);
    }
    if args.go_nogo {
        let preset = PipelineConfig::go_nogo();
        cfg.taxonomy = preset.taxonomy;
        cfg.derive_clean_from_artifacts = true;
        cfg.min_segment_samples = cfg.min_segment_samples.or(preset.min_segment_samples);
        if cfg.prompt_epochs.is_empty() {
            cfg.prompt_epochs = preset.prompt_epochs;
        }
    }
    cfg.band_power |= args.band_power;
    cfg.parallel |= args.parallel;

    let jobs = SubjectJob::discover(&args.input_dir)?;
    let metadata = read_metadata(&args.metadata)?;
    info!(
        subjects = jobs.len(),
        fit_lo = cfg.fit_band.lo,
        fit_hi = cfg.fit_band.hi,
        method = ?cfg.method,
        "slopes v{}",
        env!("CARGO_PKG_VERSION")
    );

    let ctx = RunContext { output_dir: args.output_dir.clone(), commit: args.commit.clone(), seed: args.seed };
    let cohort = run_cohort(&ctx, &cfg, &jobs, &metadata).context("cohort run failed")?;

    for (cond, psd) in &cohort.grand_average {
        info!(condition = %cond, subjects = psd.n_averaged, "grand average");
    }
    eprintln!("Written → {}", ctx.results_path().display());
    Ok(())
}
