/// Shared helpers: synthetic recordings, marker streams and cohort files.
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use specslope::io::Recording;
use specslope::Marker;

#[allow(unused)]
pub const SRATE: f64 = 512.0;

#[allow(unused)]
/// Sum of random-phase sinusoids on a 0.25 Hz grid up to 100 Hz with
/// amplitude `f^(-exponent / 2)`, i.e. power falling as `f^-exponent`.
pub fn power_law_signal(n: usize, srate: f64, exponent: f64, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let comps: Vec<(f64, f64, f64)> = (1..=400)
        .map(|k| {
            let f = k as f64 * 0.25;
            (f, f.powf(-exponent / 2.0), rng.gen_range(0.0..2.0 * PI))
        })
        .collect();
    (0..n)
        .map(|i| {
            let t = i as f64 / srate;
            comps.iter().map(|&(f, a, ph)| a * (2.0 * PI * f * t + ph).sin()).sum::<f64>() as f32
        })
        .collect()
}

#[allow(unused)]
/// [C, T] power-law data, one seed per channel.
pub fn power_law_data(n_ch: usize, n: usize, exponent: f64, seed: u64) -> Array2<f32> {
    let mut data = Array2::<f32>::zeros((n_ch, n));
    for ch in 0..n_ch {
        let sig = power_law_signal(n, SRATE, exponent, seed + ch as u64);
        data.row_mut(ch).iter_mut().zip(sig).for_each(|(d, s)| *d = s);
    }
    data
}

#[allow(unused)]
pub fn markers(codes: &[(&str, u64)]) -> Vec<Marker> {
    codes.iter().map(|&(c, l)| Marker::new(c, l)).collect()
}

#[allow(unused)]
/// Eyes-closed trial `[0, 2200]` holding one clean segment `[100, 2150]`.
pub fn single_segment_markers() -> Vec<Marker> {
    markers(&[("01", 0), ("C1", 100), ("C2", 2150), ("02", 2200)])
}

#[allow(unused)]
/// Write `<dir>/<name>.safetensors` and `<dir>/<name>.evt`.
pub fn write_subject(dir: &Path, name: &str, data: Array2<f32>, events: &[Marker]) -> PathBuf {
    let rec = Recording {
        name: name.to_string(),
        srate: SRATE,
        data,
        ch_names: vec![],
        events: None,
    };
    let path = dir.join(format!("{name}.safetensors"));
    rec.save(&path).unwrap();

    let mut evt = String::from("Type\tLatency\n");
    for m in events {
        evt.push_str(&format!("{}\t{}\n", m.code, m.latency));
    }
    std::fs::write(dir.join(format!("{name}.evt")), evt).unwrap();
    path
}

#[allow(unused)]
/// Write a metadata CSV with one row per `(subject, class)`.
pub fn write_metadata(dir: &Path, rows: &[(&str, &str)]) -> PathBuf {
    let mut text = String::from("SUBJECT,CLASS,AGE,SEX\n");
    for (i, (s, c)) in rows.iter().enumerate() {
        text.push_str(&format!("{s},{c},{},{}\n", 20 + i, if i % 2 == 0 { "F" } else { "M" }));
    }
    let path = dir.join("subjects.csv");
    std::fs::write(&path, text).unwrap();
    path
}
