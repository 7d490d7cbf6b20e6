//! Hamming tapers.
use std::f64::consts::PI;

/// Symmetric Hamming window of length `n` (filter design convention,
/// `w[0] == w[n-1]`).
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Periodic Hamming window of length `n` (spectral analysis convention,
/// the symmetric window of length `n + 1` without its last sample).
///
/// This is the taper `scipy.signal.welch(..., window='hamming')` applies.
pub fn hamming_periodic(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}
