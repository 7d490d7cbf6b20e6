//! Spectral slope fitting.
//!
//! - [`ols`]: closed-form least squares.
//! - [`ransac`]: random-sample consensus with a least-squares refit.
//!
//! [`fit_slope`] regresses `log10(power)` on `log10(frequency)` over the
//! fitting band with the buffer band (alpha) removed:
//!
//! ```text
//! Psd ─► drop buffer bins ─► keep fit band ─► log10 / log10 ─► OLS | RANSAC
//!     ─► slope = coef · SLOPE_SCALE,  fit line over the full axis
//! ```

pub mod ols;
pub mod ransac;

use rand::Rng;

use crate::config::{FitMethod, FreqBand, PipelineConfig, RansacConfig};
use crate::error::PipelineError;
use crate::psd::Psd;

pub use ols::{least_squares, Line};
pub use ransac::{median_abs_deviation, ransac, RansacFit};

/// Factor turning a log10-power-per-log10-frequency coefficient into
/// power per decade in dB (`10 · log10`).  A `1/f²` spectrum reports `-20`.
pub const SLOPE_SCALE: f64 = 10.0;

/// Fitting parameters, the slice of [`PipelineConfig`] the fitter reads.
#[derive(Debug, Clone, PartialEq)]
pub struct FitParams {
    pub method: FitMethod,
    pub fit_band: FreqBand,
    pub buffer_band: Option<FreqBand>,
    pub ransac: RansacConfig,
}

impl From<&PipelineConfig> for FitParams {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            method: cfg.method,
            fit_band: cfg.fit_band,
            buffer_band: cfg.buffer_band,
            ransac: cfg.ransac.clone(),
        }
    }
}

/// A fitted spectral slope.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeFit {
    /// Slope in dB per decade (`coef · SLOPE_SCALE`).
    pub slope: f64,
    /// Raw coefficient of `log10(power)` on `log10(freq)`.
    pub coef: f64,
    /// Intercept of the raw regression.
    pub intercept: f64,
    /// Predicted `log10(power)` at every bin of the full, unbuffered axis
    /// (`NaN` at 0 Hz).
    pub fit_line: Vec<f64>,
    /// Points that entered the regression.
    pub n_points: usize,
    /// Points the final model was fitted on (`n_points` for OLS).
    pub n_inliers: usize,
}

/// Remove every bin with `band.lo <= f <= band.hi` from both vectors.
pub fn remove_buffer(freqs: &[f64], power: &[f64], band: FreqBand) -> (Vec<f64>, Vec<f64>) {
    freqs
        .iter()
        .zip(power)
        .filter(|&(&f, _)| !band.contains(f))
        .map(|(&f, &p)| (f, p))
        .unzip()
}

/// Keep only bins with `band.lo <= f <= band.hi`.
pub fn select_band(freqs: &[f64], power: &[f64], band: FreqBand) -> (Vec<f64>, Vec<f64>) {
    freqs
        .iter()
        .zip(power)
        .filter(|&(&f, _)| band.contains(f))
        .map(|(&f, &p)| (f, p))
        .unzip()
}

/// Fit the slope of `psd`.
///
/// # Errors
///
/// * [`PipelineError::NonPositivePower`] if a selected bin has power `<= 0`
///   (or not finite).
/// * [`PipelineError::DegenerateFit`] if fewer than two distinct
///   frequencies remain.
pub fn fit_slope<R: Rng + ?Sized>(psd: &Psd, params: &FitParams, rng: &mut R) -> Result<SlopeFit, PipelineError> {
    fit_spectrum(&psd.freqs, &psd.power, params, rng)
}

/// [`fit_slope`] on bare frequency / power vectors.
pub fn fit_spectrum<R: Rng + ?Sized>(
    freqs: &[f64],
    power: &[f64],
    params: &FitParams,
    rng: &mut R,
) -> Result<SlopeFit, PipelineError> {
    let (f, p) = match params.buffer_band {
        Some(b) => remove_buffer(freqs, power, b),
        None => (freqs.to_vec(), power.to_vec()),
    };
    let (f, p) = select_band(&f, &p, params.fit_band);

    let mut x = Vec::with_capacity(f.len());
    let mut y = Vec::with_capacity(p.len());
    for (&fi, &pi) in f.iter().zip(&p) {
        if !(pi > 0.0 && pi.is_finite()) {
            return Err(PipelineError::NonPositivePower { freq: fi, value: pi });
        }
        if fi <= 0.0 {
            continue;
        }
        x.push(fi.log10());
        y.push(pi.log10());
    }
    let n_points = x.len();
    let degenerate = || PipelineError::DegenerateFit { n_points };

    let (line, n_inliers) = match params.method {
        FitMethod::Ordinary => (least_squares(&x, &y).ok_or_else(degenerate)?, n_points),
        FitMethod::Robust => {
            let fit = ransac(&x, &y, &params.ransac, rng).ok_or_else(degenerate)?;
            let n = fit.n_inliers();
            (fit.line, n)
        }
    };

    let fit_line = freqs
        .iter()
        .map(|&fi| if fi > 0.0 { line.predict(fi.log10()) } else { f64::NAN })
        .collect();

    Ok(SlopeFit {
        slope: line.coef * SLOPE_SCALE,
        coef: line.coef,
        intercept: line.intercept,
        fit_line,
        n_points,
        n_inliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psd::frequencies;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(method: FitMethod, buffer: Option<FreqBand>) -> FitParams {
        FitParams { method, fit_band: FreqBand::new(2.0, 24.0), buffer_band: buffer, ransac: RansacConfig::default() }
    }

    #[test]
    fn buffer_removal_is_paired() {
        let f = frequencies(512.0, 1024);
        let p: Vec<f64> = (0..f.len()).map(|i| i as f64).collect();
        let (rf, rp) = remove_buffer(&f, &p, FreqBand::new(7.0, 14.0));
        assert_eq!(rf.len(), rp.len());
        assert_eq!(rf.len(), f.len() - 15);
        assert!(rf.iter().all(|&v| !(7.0..=14.0).contains(&v)));
        for (fv, pv) in rf.iter().zip(&rp) {
            assert_eq!(*pv, fv * 2.0);
        }
    }

    #[test]
    fn zero_power_is_reported() {
        let f = frequencies(512.0, 1024);
        let mut p: Vec<f64> = f.iter().map(|&v| if v > 0.0 { v.powi(-2) } else { 1.0 }).collect();
        p[10] = 0.0; // 5 Hz
        let err = fit_spectrum(&f, &p, &params(FitMethod::Ordinary, None), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(err, PipelineError::NonPositivePower { freq: 5.0, value: 0.0 });
    }

    #[test]
    fn zero_power_inside_buffer_is_ignored() {
        let f = frequencies(512.0, 1024);
        let mut p: Vec<f64> = f.iter().map(|&v| if v > 0.0 { v.powi(-2) } else { 1.0 }).collect();
        p[20] = 0.0; // 10 Hz
        let fit = fit_spectrum(
            &f,
            &p,
            &params(FitMethod::Ordinary, Some(FreqBand::new(7.0, 14.0))),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        approx::assert_abs_diff_eq!(fit.slope, -20.0, epsilon = 1e-9);
    }

    #[test]
    fn band_above_nyquist_is_degenerate() {
        let f = frequencies(32.0, 32);
        let p = vec![1.0; f.len()];
        let par = FitParams { fit_band: FreqBand::new(20.0, 30.0), ..params(FitMethod::Ordinary, None) };
        let err = fit_spectrum(&f, &p, &par, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert_eq!(err, PipelineError::DegenerateFit { n_points: 0 });
    }

    #[test]
    fn fit_line_spans_full_axis() {
        let f = frequencies(512.0, 1024);
        let p: Vec<f64> = f.iter().map(|&v| if v > 0.0 { v.powi(-2) } else { 1.0 }).collect();
        let fit = fit_spectrum(&f, &p, &params(FitMethod::Ordinary, Some(FreqBand::new(7.0, 14.0))), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(fit.fit_line.len(), f.len());
        assert!(fit.fit_line[0].is_nan());
        approx::assert_abs_diff_eq!(fit.fit_line[20], -2.0, epsilon = 1e-9); // log10(10^-2) at 10 Hz
    }
}
