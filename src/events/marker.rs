//! Time-stamped event markers and code normalisation.
//!
//! After normalisation every structural code is two characters:
//! `(condition, phase)`.  Phase `'1'` opens a span, `'2'` closes it.
//! Condition letters mark clean segments, condition digits mark trials:
//!
//! ```text
//! 01 / 02   eyes-closed trial start / stop
//! 11 / 12   eyes-open   trial start / stop
//! C1 / C2   eyes-closed clean segment start / stop
//! O1 / O2   eyes-open   clean segment start / stop
//! ```
//!
//! Any other code (stimulus prompts, responses, artifact flags) is carried
//! through untouched.
use serde::{Deserialize, Serialize};

/// One marker of a subject's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker {
    /// Type code, e.g. `"C1"`, `"02"`, `"BLINK1"`.
    pub code: String,
    /// Position in samples from the start of the recording.
    pub latency: u64,
}

impl Marker {
    pub fn new(code: impl Into<String>, latency: u64) -> Self {
        Self { code: code.into(), latency }
    }

    /// Leading (condition) character of the code.
    #[inline]
    pub fn condition_char(&self) -> Option<char> {
        self.code.chars().next()
    }

    /// `true` when the code ends in `'1'`.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.code.ends_with('1')
    }

    /// Two-character `(condition, phase)` code with phase `'1'` or `'2'`.
    #[inline]
    pub fn is_structural(&self) -> bool {
        self.code.chars().count() == 2 && (self.is_open() || self.is_close())
    }

    /// `true` when the code ends in `'2'`.
    #[inline]
    pub fn is_close(&self) -> bool {
        self.code.ends_with('2')
    }
}

/// Canonicalise one code.
///
/// Some exports write a 3-character code with the condition and phase
/// transposed; the canonical form is the first two characters reversed
/// (the third is dropped).  Every other code is returned unchanged.
///
/// ```
/// use specslope::events::normalize_code;
/// assert_eq!(normalize_code("1C "), "C1");
/// assert_eq!(normalize_code("C1"), "C1");
/// assert_eq!(normalize_code("BLINK1"), "BLINK1");
/// ```
pub fn normalize_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() == 3 {
        [chars[1], chars[0]].iter().collect()
    } else {
        code.to_string()
    }
}

/// Return a copy of `markers` with every code canonicalised.
pub fn normalize_codes(markers: &[Marker]) -> Vec<Marker> {
    markers
        .iter()
        .map(|m| Marker { code: normalize_code(&m.code), latency: m.latency })
        .collect()
}

/// Stable sort by latency, keeping stream order among equal latencies.
pub fn sort_by_latency(markers: &mut [Marker]) {
    markers.sort_by_key(|m| m.latency);
}
