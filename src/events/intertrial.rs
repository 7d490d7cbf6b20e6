//! Intertrial correction and trial-length normalisation.
//!
//! A clean segment may only cover recording time that belongs to a trial.
//! A latency is *intertrial* when the closest trial boundary at or before it
//! is a trial stop, or when no trial boundary precedes it at all.
//!
//! | segment start | segment stop | action                                  |
//! |---------------|--------------|-----------------------------------------|
//! | intertrial    | intertrial   | drop the segment                        |
//! | intertrial    | in trial     | advance start to the next trial start   |
//! | in trial      | intertrial   | retract stop to the previous trial stop |
//! | in trial      | in trial     | split at every trial stop it spans      |
//!
//! Segments left empty by trimming are dropped.  The correction is a fixed
//! point: applying it to its own output changes nothing.
use super::hierarchy::{ConditionEvents, EventHierarchy, Span};

/// Return a new hierarchy whose clean segments lie inside trials.
///
/// Trials of every condition bound every segment, matching how the marker
/// stream interleaves conditions.  A hierarchy without any trial returns
/// unchanged: there is nothing to correct against.
pub fn remove_intertrial_segments(h: &EventHierarchy) -> EventHierarchy {
    let trials: Vec<Span> = h.all_trials().into_iter().filter(|t| !t.is_empty()).collect();
    if trials.is_empty() {
        tracing::debug!("no trial markers, intertrial correction skipped");
        return h.clone();
    }

    let conditions = h
        .conditions
        .iter()
        .map(|(name, ev)| {
            let segments = ev
                .segments
                .iter()
                .flat_map(|&seg| correct_segment(seg, &trials))
                .collect();
            (name.clone(), ConditionEvents { trials: ev.trials.clone(), segments })
        })
        .collect();
    EventHierarchy { conditions }
}

/// Re-cut every trial to `[start + lower, start + upper]` samples, then
/// re-run the intertrial correction against the new bounds.
pub fn modify_trial_length(h: &EventHierarchy, lower: u64, upper: u64) -> EventHierarchy {
    let conditions = h
        .conditions
        .iter()
        .map(|(name, ev)| {
            let trials = ev
                .trials
                .iter()
                .map(|t| Span::new(t.start + lower, t.start + upper))
                .collect();
            (name.clone(), ConditionEvents { trials, segments: ev.segments.clone() })
        })
        .collect();
    remove_intertrial_segments(&EventHierarchy { conditions })
}

/// `true` when a segment *start* at `lat` falls outside every trial.
///
/// A start on a trial's first sample is inside; a start on its stop is not.
pub fn start_in_intertrial(lat: u64, trials: &[Span]) -> bool {
    !trials.iter().any(|t| t.start <= lat && lat < t.stop)
}

/// `true` when a segment *stop* at `lat` falls outside every trial.
///
/// A stop on a trial's stop is inside; a stop on its first sample is not.
pub fn stop_in_intertrial(lat: u64, trials: &[Span]) -> bool {
    !trials.iter().any(|t| t.start < lat && lat <= t.stop)
}

fn next_trial_start(lat: u64, trials: &[Span]) -> Option<u64> {
    trials.iter().map(|t| t.start).filter(|&s| s >= lat).min()
}

fn prev_trial_stop(lat: u64, trials: &[Span]) -> Option<u64> {
    trials.iter().map(|t| t.stop).filter(|&s| s <= lat).max()
}

fn correct_segment(seg: Span, trials: &[Span]) -> Vec<Span> {
    let head_out = start_in_intertrial(seg.start, trials);
    let tail_out = stop_in_intertrial(seg.stop, trials);

    if head_out && tail_out {
        return vec![];
    }

    let start = if head_out {
        match next_trial_start(seg.start, trials) {
            Some(s) => s,
            None => return vec![],
        }
    } else {
        seg.start
    };
    let stop = if tail_out {
        match prev_trial_stop(seg.stop, trials) {
            Some(s) => s,
            None => return vec![],
        }
    } else {
        seg.stop
    };
    if stop <= start {
        return vec![];
    }

    // Split wherever the segment runs across a trial stop.
    let mut stops: Vec<u64> = trials
        .iter()
        .map(|t| t.stop)
        .filter(|&s| s > start && s < stop)
        .collect();
    stops.sort_unstable();
    stops.dedup();

    let mut pieces = Vec::new();
    let mut cur = start;
    for s in stops {
        if s <= cur {
            continue;
        }
        if !start_in_intertrial(s, trials) {
            // Another trial continues through this stop.
            continue;
        }
        pieces.push(Span::new(cur, s));
        match next_trial_start(s, trials) {
            Some(n) if n < stop => cur = n,
            _ => {
                cur = stop;
                break;
            }
        }
    }
    if cur < stop {
        pieces.push(Span::new(cur, stop));
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn hierarchy(trials: &[(u64, u64)], segs: &[(u64, u64)]) -> EventHierarchy {
        let mut conditions = BTreeMap::new();
        conditions.insert(
            "eyesc".to_string(),
            ConditionEvents {
                trials: trials.iter().map(|&(a, b)| Span::new(a, b)).collect(),
                segments: segs.iter().map(|&(a, b)| Span::new(a, b)).collect(),
            },
        );
        EventHierarchy { conditions }
    }

    #[test]
    fn wholly_intertrial_segment_dropped() {
        let h = hierarchy(&[(0, 1000), (2000, 3000)], &[(1100, 1900)]);
        assert!(remove_intertrial_segments(&h).segments("eyesc").is_empty());
    }

    #[test]
    fn head_trimmed_to_next_trial_start() {
        let h = hierarchy(&[(0, 1000), (2000, 3000)], &[(1500, 2500)]);
        assert_eq!(remove_intertrial_segments(&h).segments("eyesc"), &[Span::new(2000, 2500)]);
    }

    #[test]
    fn tail_trimmed_to_previous_trial_stop() {
        let h = hierarchy(&[(0, 1000), (2000, 3000)], &[(500, 1500)]);
        assert_eq!(remove_intertrial_segments(&h).segments("eyesc"), &[Span::new(500, 1000)]);
    }

    #[test]
    fn segment_before_first_trial_is_intertrial() {
        let h = hierarchy(&[(1000, 2000)], &[(100, 900)]);
        assert!(remove_intertrial_segments(&h).segments("eyesc").is_empty());
    }

    #[test]
    fn segment_spanning_a_gap_is_split() {
        let h = hierarchy(&[(0, 1000), (2000, 3000)], &[(500, 2500)]);
        assert_eq!(
            remove_intertrial_segments(&h).segments("eyesc"),
            &[Span::new(500, 1000), Span::new(2000, 2500)]
        );
    }

    #[test]
    fn boundary_latencies_are_inside() {
        let h = hierarchy(&[(0, 1000)], &[(0, 1000)]);
        assert_eq!(remove_intertrial_segments(&h).segments("eyesc"), &[Span::new(0, 1000)]);
    }

    #[test]
    fn no_trials_leaves_segments_alone() {
        let h = hierarchy(&[], &[(10, 20)]);
        assert_eq!(remove_intertrial_segments(&h), h);
    }

    #[test]
    fn trial_length_cut() {
        let h = hierarchy(&[(0, 60_000)], &[(100, 50_000)]);
        let cut = modify_trial_length(&h, 0, 30 * 512);
        assert_eq!(cut.trials("eyesc"), &[Span::new(0, 15_360)]);
        assert_eq!(cut.segments("eyesc"), &[Span::new(100, 15_360)]);
    }
}
