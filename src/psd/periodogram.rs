//! Single-window periodogram, matching
//! `scipy.signal.welch(x, fs, nperseg=len(x), window='hamming')`:
//!
//! 1. constant detrend (window mean removed),
//! 2. periodic Hamming taper,
//! 3. real DFT (RustFFT, complex transform of the real input),
//! 4. one-sided density scaling `|X_k|² / (fs · Σ w²)`, every bin doubled
//!    except DC and, for even lengths, Nyquist.
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::taper::hamming_periodic;

/// Reusable periodogram for windows of one fixed length.
///
/// The FFT plan, taper and scratch buffer are built once and shared by every
/// window of a channel.
pub struct Periodogram {
    n: usize,
    taper: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
    buf: Vec<Complex<f64>>,
}

impl Periodogram {
    /// Plan a periodogram for `n`-sample windows at `srate` Hz.
    pub fn new(n: usize, srate: f64) -> Self {
        let taper = hamming_periodic(n);
        let win_pow: f64 = taper.iter().map(|w| w * w).sum();
        let mut planner: FftPlanner<f64> = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        Self {
            n,
            taper,
            scale: 1.0 / (srate * win_pow),
            fft,
            buf: vec![Complex::default(); n],
        }
    }

    /// Window length in samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of one-sided frequency bins, `n / 2 + 1`.
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n / 2 + 1
    }

    /// Add this window's periodogram to `acc` (length [`Self::n_bins`]).
    ///
    /// # Panics
    ///
    /// If `x` or `acc` has the wrong length.
    pub fn accumulate<I>(&mut self, x: I, acc: &mut [f64])
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let it = x.into_iter();
        let mean = it.clone().sum::<f64>() / self.n as f64;

        let mut filled = 0;
        for ((b, v), w) in self.buf.iter_mut().zip(it).zip(&self.taper) {
            *b = Complex { re: (v - mean) * w, im: 0.0 };
            filled += 1;
        }
        assert_eq!(filled, self.n, "window length does not match the planned periodogram");
        assert_eq!(acc.len(), self.n_bins());

        self.fft.process(&mut self.buf);

        let nyquist = if self.n % 2 == 0 { Some(self.n / 2) } else { None };
        for (k, a) in acc.iter_mut().enumerate() {
            let mut p = self.buf[k].norm_sqr() * self.scale;
            if k != 0 && Some(k) != nyquist {
                p *= 2.0;
            }
            *a += p;
        }
    }

    /// Periodogram of one window.
    pub fn compute(&mut self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_bins()];
        self.accumulate(x.iter().copied(), &mut out);
        out
    }
}

/// One-shot periodogram of `x` sampled at `srate` Hz.
pub fn periodogram(x: &[f64], srate: f64) -> Vec<f64> {
    Periodogram::new(x.len(), srate).compute(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn sine_peaks_at_its_bin() {
        let (n, fs, f0) = (1024usize, 512.0, 40.0);
        let x: Vec<f64> = (0..n).map(|i| (2.0 * PI * f0 * i as f64 / fs).sin()).collect();
        let p = periodogram(&x, fs);
        assert_eq!(p.len(), 513);
        let peak = p
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 80); // 40 Hz at 0.5 Hz/bin
    }

    #[test]
    fn constant_signal_has_no_power() {
        let p = periodogram(&vec![3.0; 256], 256.0);
        assert!(p.iter().all(|&v| v.abs() < 1e-20));
    }

    #[test]
    fn white_noise_density_integrates_to_variance() {
        // Deterministic pseudo-noise: Parseval with density scaling means
        // sum(P) * df ≈ variance of the tapered-and-rescaled signal.
        let n = 4096usize;
        let fs = 512.0;
        let mut state = 12345u64;
        let x: Vec<f64> = (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
            })
            .collect();
        let mean = x.iter().sum::<f64>() / n as f64;
        let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let p = periodogram(&x, fs);
        let total: f64 = p.iter().sum::<f64>() * fs / n as f64;
        assert!((total / var - 1.0).abs() < 0.1, "total={total} var={var}");
    }
}
