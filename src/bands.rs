//! Power in the traditional EEG bands.
//!
//! Band power is the trapezoidal integral of the density over the band's
//! bins (`lo <= f <= hi`), in signal units².  Values are computed per
//! channel and averaged over channels, never taken from a channel-mean PSD.
use crate::config::FreqBand;
use crate::psd::Psd;

/// A named frequency band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub range: FreqBand,
}

/// delta, theta, alpha, beta.
pub const TRADITIONAL_BANDS: [Band; 4] = [
    Band { name: "delta", range: FreqBand::new(0.5, 4.0) },
    Band { name: "theta", range: FreqBand::new(4.0, 7.0) },
    Band { name: "alpha", range: FreqBand::new(7.0, 13.0) },
    Band { name: "beta", range: FreqBand::new(13.0, 30.0) },
];

/// Power of one band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPower {
    pub name: &'static str,
    pub power: f64,
}

/// Powers of [`TRADITIONAL_BANDS`], in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPowers {
    pub bands: Vec<BandPower>,
}

impl BandPowers {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.bands.iter().find(|b| b.name == name).map(|b| b.power)
    }
}

/// Trapezoidal integral of `psd` over `band`.
///
/// Fewer than two bins inside the band integrate to `0`.
pub fn band_power(psd: &Psd, band: FreqBand) -> f64 {
    let pts: Vec<(f64, f64)> = psd
        .freqs
        .iter()
        .zip(&psd.power)
        .filter(|&(&f, _)| band.contains(f))
        .map(|(&f, &p)| (f, p))
        .collect();
    pts.windows(2)
        .map(|w| 0.5 * (w[1].0 - w[0].0) * (w[0].1 + w[1].1))
        .sum()
}

/// Power in every traditional band of one PSD.
pub fn band_powers(psd: &Psd) -> BandPowers {
    let bands = TRADITIONAL_BANDS
        .iter()
        .map(|b| BandPower { name: b.name, power: band_power(psd, b.range) })
        .collect();
    BandPowers { bands }
}

/// Band-wise mean over channels.  `None` when no channel has a value.
pub fn mean_band_powers<'a, I>(channels: I) -> Option<BandPowers>
where
    I: IntoIterator<Item = &'a BandPowers>,
{
    let mut it = channels.into_iter();
    let mut sum = it.next()?.clone();
    let mut n = 1usize;
    for bp in it {
        for (s, b) in sum.bands.iter_mut().zip(&bp.bands) {
            s.power += b.power;
        }
        n += 1;
    }
    sum.bands.iter_mut().for_each(|b| b.power /= n as f64);
    Some(sum)
}
