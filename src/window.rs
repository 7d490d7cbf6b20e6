//! Fixed-length, overlapping analysis windows inside clean segments.
//!
//! A segment of `L` samples yields `floor((L - W) / S) + 1` windows of `W`
//! samples stepped by `S`, all starting inside the segment and never
//! crossing its end.  Segments shorter than `W` yield none.
use ndarray::{s, ArrayView1};

use crate::events::Span;

/// One analysis window: `len` samples from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub len: usize,
}

impl Window {
    /// The window's samples in `signal`.
    ///
    /// # Panics
    ///
    /// If the window runs past the end of `signal`; [`extract_windows`]
    /// never produces such a window for the `n_samples` it was given.
    pub fn slice<'a>(&self, signal: ArrayView1<'a, f32>) -> ArrayView1<'a, f32> {
        signal.slice_move(s![self.start..self.start + self.len])
    }
}

/// Number of windows a segment of `seg_len` samples yields.
///
/// ```
/// use specslope::window::window_count;
/// assert_eq!(window_count(3072, 1024, 512), 5);
/// assert_eq!(window_count(1000, 1024, 512), 0);
/// ```
pub fn window_count(seg_len: usize, window_len: usize, step: usize) -> usize {
    if seg_len < window_len || step == 0 {
        return 0;
    }
    (seg_len - window_len) / step + 1
}

/// Cut every segment into windows, in segment order.
///
/// Segments extending past `n_samples` are clamped to the recording.
pub fn extract_windows(segments: &[Span], window_len: usize, step: usize, n_samples: usize) -> Vec<Window> {
    let mut out = Vec::new();
    for seg in segments {
        let start = seg.start as usize;
        let stop = (seg.stop as usize).min(n_samples);
        if stop < seg.stop as usize {
            tracing::warn!(
                start = seg.start,
                stop = seg.stop,
                n_samples,
                "clean segment runs past the end of the recording, clamped"
            );
        }
        if stop <= start {
            continue;
        }
        let n = window_count(stop - start, window_len, step);
        out.extend((0..n).map(|i| Window { start: start + i * step, len: window_len }));
    }
    out
}

/// Keep at most `cap` windows, dropping the excess from the tail.
pub fn cap_windows(mut windows: Vec<Window>, cap: Option<usize>) -> Vec<Window> {
    if let Some(cap) = cap {
        windows.truncate(cap);
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn count_formula() {
        assert_eq!(window_count(1024, 1024, 512), 1);
        assert_eq!(window_count(1535, 1024, 512), 1);
        assert_eq!(window_count(1536, 1024, 512), 2);
        assert_eq!(window_count(2050, 1024, 512), 3);
    }

    #[test]
    fn windows_start_at_segment_start() {
        let w = extract_windows(&[Span::new(100, 2148)], 1024, 512, 10_000);
        assert_eq!(w.iter().map(|w| w.start).collect::<Vec<_>>(), vec![100, 612, 1124]);
        assert!(w.iter().all(|w| w.start + w.len <= 2148));
    }

    #[test]
    fn short_segments_contribute_nothing() {
        let w = extract_windows(&[Span::new(0, 1000), Span::new(2000, 3024)], 1024, 512, 10_000);
        assert_eq!(w, vec![Window { start: 2000, len: 1024 }]);
    }

    #[test]
    fn clamped_to_recording() {
        let w = extract_windows(&[Span::new(0, 5000)], 1024, 512, 2048);
        assert_eq!(w.len(), 3);
        assert_eq!(w.last().unwrap().start + 1024, 2048);
    }

    #[test]
    fn cap_drops_tail() {
        let w = extract_windows(&[Span::new(0, 3072)], 1024, 512, 3072);
        let capped = cap_windows(w.clone(), Some(2));
        assert_eq!(capped, w[..2].to_vec());
        assert_eq!(cap_windows(w.clone(), None), w);
    }

    #[test]
    fn slice_views_samples() {
        let x = Array1::from_iter((0..10).map(|v| v as f32));
        let w = Window { start: 3, len: 4 };
        assert_eq!(w.slice(x.view()).to_vec(), vec![3.0, 4.0, 5.0, 6.0]);
    }
}
