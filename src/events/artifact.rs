//! Clean-segment markers derived from blink and artifact flags.
//!
//! Go/No-Go exports carry no explicit clean-segment markers.  Instead the
//! recorder flags blinks (`BLINK1` … `BLINK2`) and artifacts (`ARTFCT1` …
//! `ARTFCT2`).  Clean space starts at the first `ARTFCT2` (the end of the
//! pre-task artifact span), or at the first flag of any kind when the export
//! has no `ARTFCT2`, and is interrupted by every flagged span.
use super::marker::Marker;

const FLAG_OPEN: [&str; 2] = ["BLINK1", "ARTFCT1"];
const FLAG_CLOSE: [&str; 2] = ["BLINK2", "ARTFCT2"];

/// Derive `<segment_char>1` / `<segment_char>2` markers from artifact flags.
///
/// Nested or overlapping flags are handled with a depth counter: clean space
/// resumes only once every open flag is closed.  Segments shorter than
/// `min_len` samples are dropped, as is a trailing segment that never
/// closes.  Without any `ARTFCT2` flag clean space starts at the first
/// flag; without any flag there is none.
pub fn clean_segments_from_artifacts(markers: &[Marker], segment_char: char, min_len: u64) -> Vec<Marker> {
    let flags: Vec<&Marker> = markers
        .iter()
        .filter(|m| FLAG_OPEN.contains(&m.code.as_str()) || FLAG_CLOSE.contains(&m.code.as_str()))
        .collect();

    if flags.is_empty() {
        return vec![];
    }
    let first = flags.iter().position(|m| m.code == "ARTFCT2").unwrap_or(0);

    let open_code = format!("{segment_char}1");
    let close_code = format!("{segment_char}2");

    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut seg_start = Some(flags[first].latency);

    for m in &flags[first + 1..] {
        if FLAG_OPEN.contains(&m.code.as_str()) {
            if depth == 0 {
                if let Some(start) = seg_start.take() {
                    if m.latency >= start && m.latency - start >= min_len {
                        out.push(Marker::new(open_code.as_str(), start));
                        out.push(Marker::new(close_code.as_str(), m.latency));
                    }
                }
            }
            depth += 1;
        } else {
            depth = depth.saturating_sub(1);
            if depth == 0 && seg_start.is_none() {
                seg_start = Some(m.latency);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codes: &[(&str, u64)]) -> Vec<Marker> {
        codes.iter().map(|&(c, l)| Marker::new(c, l)).collect()
    }

    #[test]
    fn segments_between_flags() {
        let m = stream(&[
            ("ARTFCT1", 0), ("ARTFCT2", 1000),
            ("GO", 1500),
            ("BLINK1", 4000), ("BLINK2", 4100),
            ("ARTFCT1", 8000), ("ARTFCT2", 9000),
            ("BLINK1", 12000),
        ]);
        let out = clean_segments_from_artifacts(&m, 'C', 1024);
        assert_eq!(
            out,
            stream(&[("C1", 1000), ("C2", 4000), ("C1", 4100), ("C2", 8000), ("C1", 9000), ("C2", 12000)])
        );
    }

    #[test]
    fn short_segments_and_trailing_open_dropped() {
        let m = stream(&[("ARTFCT2", 0), ("BLINK1", 500), ("BLINK2", 600), ("BLINK1", 3000), ("BLINK2", 3100)]);
        let out = clean_segments_from_artifacts(&m, 'C', 1024);
        assert_eq!(out, stream(&[("C1", 600), ("C2", 3000)]));
    }

    #[test]
    fn nested_flags_keep_space_closed() {
        let m = stream(&[
            ("ARTFCT2", 0), ("ARTFCT1", 2000), ("BLINK1", 2100), ("BLINK2", 2200), ("ARTFCT2", 2500),
            ("BLINK1", 5000),
        ]);
        let out = clean_segments_from_artifacts(&m, 'C', 0);
        assert_eq!(out, stream(&[("C1", 0), ("C2", 2000), ("C1", 2500), ("C2", 5000)]));
    }

    #[test]
    fn without_artfct2_clean_space_starts_at_first_flag() {
        let m = stream(&[("BLINK1", 10), ("BLINK2", 20), ("BLINK1", 1500), ("BLINK2", 1600), ("BLINK1", 3000)]);
        let out = clean_segments_from_artifacts(&m, 'C', 1024);
        assert_eq!(out, stream(&[("C1", 10), ("C2", 1500), ("C1", 1600), ("C2", 3000)]));
    }

    #[test]
    fn no_flags_means_no_clean_space() {
        let m = stream(&[("GO_PROMPT", 10), ("NOGO_PROMPT", 20)]);
        assert!(clean_segments_from_artifacts(&m, 'C', 0).is_empty());
    }
}
