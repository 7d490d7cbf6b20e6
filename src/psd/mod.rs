//! Power spectral density estimation.
//!
//! - [`taper`]: symmetric and periodic Hamming windows.
//! - [`periodogram`]: detrended, tapered, density-scaled one-sided
//!   periodogram of one window.
//!
//! [`welch`] averages the periodograms of every analysis window of one
//! channel/condition.  Windows come from [`crate::window::extract_windows`]
//! and may overlap; each window is transformed whole (no further
//! sub-segmentation).  Zero windows give `None`, never a zero spectrum.
//!
//! ```text
//! windows ──► detrend ─► Hamming ─► |FFT|² / (fs·Σw²) ─► mean ─► Psd
//! ```

pub mod periodogram;
pub mod taper;

use ndarray::{s, Array1, ArrayView1};

use crate::events::Span;
use crate::window::Window;

pub use periodogram::{periodogram, Periodogram};
pub use taper::{hamming, hamming_periodic};

/// A one-sided power spectral density.
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    /// Bin centre frequencies in Hz, `0 ..= srate / 2`.
    pub freqs: Vec<f64>,
    /// Power density per bin (signal units² / Hz).
    pub power: Vec<f64>,
    /// Number of periodograms (or PSDs) averaged into this one.
    pub n_averaged: usize,
}

impl Psd {
    #[inline]
    pub fn len(&self) -> usize {
        self.power.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Frequency resolution in Hz per bin.
    pub fn resolution(&self) -> f64 {
        if self.freqs.len() < 2 {
            0.0
        } else {
            self.freqs[1] - self.freqs[0]
        }
    }
}

/// Bin centre frequencies for `window_len`-sample windows at `srate` Hz.
///
/// ```
/// let f = specslope::psd::frequencies(512.0, 1024);
/// assert_eq!(f.len(), 513);
/// assert_eq!(f[1], 0.5);
/// assert_eq!(f[512], 256.0);
/// ```
pub fn frequencies(srate: f64, window_len: usize) -> Vec<f64> {
    (0..=window_len / 2)
        .map(|k| k as f64 * srate / window_len as f64)
        .collect()
}

/// Mean periodogram of `windows` cut from `signal`.
///
/// All windows must share one length.  Returns `None` for an empty window
/// list.
pub fn welch(signal: ArrayView1<'_, f32>, windows: &[Window], srate: f64) -> Option<Psd> {
    let first = windows.first()?;
    let n = first.len;
    let mut pg = Periodogram::new(n, srate);
    let mut acc = vec![0.0; pg.n_bins()];
    for w in windows {
        debug_assert_eq!(w.len, n);
        pg.accumulate(w.slice(signal).iter().map(|&v| v as f64), &mut acc);
    }
    let inv = 1.0 / windows.len() as f64;
    acc.iter_mut().for_each(|v| *v *= inv);
    Some(Psd { freqs: frequencies(srate, n), power: acc, n_averaged: windows.len() })
}

/// Join the samples of `spans`, each multiplied by a symmetric Hamming
/// taper of its own length, into one contiguous signal.
///
/// Prompt-locked task epochs are joined this way before [`welch`].
///
/// # Panics
///
/// If a span runs past the end of `signal`.
pub fn tapered_concat(signal: ArrayView1<'_, f32>, spans: &[Span]) -> Array1<f32> {
    let mut out = Vec::with_capacity(spans.iter().map(|sp| sp.len() as usize).sum());
    for sp in spans {
        let seg = signal.slice(s![sp.start as usize..sp.stop as usize]);
        let taper = hamming(seg.len());
        out.extend(seg.iter().zip(&taper).map(|(&x, &w)| (x as f64 * w) as f32));
    }
    Array1::from(out)
}

/// Unweighted element-wise mean of several PSDs.
///
/// Used for the subject PSD (mean over channels) and the cohort
/// grand-average (mean over subjects).  PSDs whose frequency axis differs
/// from the first one are left out with a warning.  Returns `None` when
/// nothing is left to average.
pub fn mean_psd<'a, I>(psds: I) -> Option<Psd>
where
    I: IntoIterator<Item = &'a Psd>,
{
    let mut it = psds.into_iter();
    let first = it.next()?;
    let mut sum = first.power.clone();
    let mut count = 1usize;
    for p in it {
        if p.freqs != first.freqs {
            tracing::warn!(
                bins = p.len(),
                expected = first.len(),
                "PSD with a different frequency axis left out of the mean"
            );
            continue;
        }
        for (s, v) in sum.iter_mut().zip(&p.power) {
            *s += v;
        }
        count += 1;
    }
    let inv = 1.0 / count as f64;
    sum.iter_mut().for_each(|v| *v *= inv);
    Some(Psd { freqs: first.freqs.clone(), power: sum, n_averaged: count })
}
