mod common;
use common::markers;
use specslope::events::{
    build_hierarchy, modify_trial_length, normalize_codes, prompt_spans, remove_intertrial_segments, sort_by_latency,
    ConditionTaxonomy, EventHierarchy, PromptEpoch, Span,
};
use specslope::pipeline::{prepare_markers, subject_hierarchy};
use specslope::{PipelineConfig, PipelineError};

fn inside_some_trial(seg: &Span, h: &EventHierarchy) -> bool {
    h.all_trials().iter().any(|t| t.start <= seg.start && seg.stop <= t.stop)
}

#[test]
fn three_char_codes_pair_after_normalisation() {
    let m = markers(&[("01", 0), ("1C_", 100), ("2C_", 900), ("02", 1000)]);
    let h = build_hierarchy("s", &normalize_codes(&m), &ConditionTaxonomy::resting_state()).unwrap();
    assert_eq!(h.segments("eyesc"), &[Span::new(100, 900)]);
}

#[test]
fn three_char_switch_off_leaves_codes_alone() {
    let cfg = PipelineConfig { reverse_three_char_codes: false, ..PipelineConfig::default() };
    let m = markers(&[("1C_", 100), ("2C_", 900)]);
    assert_eq!(prepare_markers(&m, &cfg), m);
}

#[test]
fn malformed_stream_aborts_with_position() {
    let m = markers(&[("01", 0), ("C1", 100), ("C2", 200), ("O1", 300), ("02", 400)]);
    let err = build_hierarchy("s03", &m, &ConditionTaxonomy::resting_state()).unwrap_err();
    assert_eq!(err, PipelineError::MalformedMarkerSequence { subject: "s03".into(), index: 3, code: "O1".into() });
}

#[test]
fn intertrial_correction_is_idempotent() {
    // A deterministic spread of segment placements around two trials per
    // condition.
    let tax = ConditionTaxonomy::resting_state();
    for shift in (0..4000).step_by(250) {
        let mut m = markers(&[
            ("01", 1000), ("02", 3000),
            ("11", 4000), ("12", 6000),
            ("C1", shift), ("C2", shift + 1700),
            ("O1", shift + 2000), ("O2", shift + 4200),
        ]);
        sort_by_latency(&mut m);
        let h = build_hierarchy("s", &m, &tax).unwrap();
        let once = remove_intertrial_segments(&h);
        let twice = remove_intertrial_segments(&once);
        assert_eq!(once, twice, "shift {shift}");
        for seg in once.conditions.values().flat_map(|c| &c.segments) {
            assert!(inside_some_trial(seg, &once), "shift {shift}: {seg:?} escapes every trial");
            assert!(!seg.is_empty());
        }
    }
}

#[test]
fn trial_length_normalisation_recuts_segments() {
    // 60 s trial at 512 Hz cut down to its first 30 s.
    let m = markers(&[("01", 0), ("C1", 100), ("C2", 25_000), ("02", 30_720)]);
    let h = build_hierarchy("s", &m, &ConditionTaxonomy::resting_state()).unwrap();
    let h = modify_trial_length(&h, 0, 15_360);
    assert_eq!(h.trials("eyesc"), &[Span::new(0, 15_360)]);
    assert_eq!(h.segments("eyesc"), &[Span::new(100, 15_360)]);
}

#[test]
fn trial_normalisation_only_for_its_cohort() {
    let cfg = PipelineConfig {
        trial_normalization: Some(specslope::TrialNormalization { cohort: "PD".into(), lower_s: 0.0, upper_s: 30.0 }),
        ..PipelineConfig::default()
    };
    let m = markers(&[("01", 0), ("C1", 100), ("C2", 25_000), ("02", 30_720)]);
    let hc = subject_hierarchy("s", &m, &cfg, "HC", 512.0).unwrap();
    let pd = subject_hierarchy("s", &m, &cfg, "PD", 512.0).unwrap();
    assert_eq!(hc.segments("eyesc"), &[Span::new(100, 25_000)]);
    assert_eq!(pd.segments("eyesc"), &[Span::new(100, 15_360)]);
}

#[test]
fn lengthened_trial_keeps_clean_time_past_its_old_stop() {
    let cfg = PipelineConfig {
        trial_normalization: Some(specslope::TrialNormalization {
            cohort: "PD".into(),
            lower_s: 0.0,
            upper_s: 20_000.0 / 512.0,
        }),
        ..PipelineConfig::default()
    };
    // Recorded trial stops at 10 000; the clean segment runs on to 14 000.
    let m = markers(&[("01", 0), ("C1", 100), ("02", 10_000), ("C2", 14_000)]);
    let hc = subject_hierarchy("s", &m, &cfg, "HC", 512.0).unwrap();
    let pd = subject_hierarchy("s", &m, &cfg, "PD", 512.0).unwrap();
    assert_eq!(hc.segments("eyesc"), &[Span::new(100, 10_000)]);
    assert_eq!(pd.trials("eyesc"), &[Span::new(0, 20_000)]);
    assert_eq!(pd.segments("eyesc"), &[Span::new(100, 14_000)]);
}

#[test]
fn minimum_segment_length_applies_after_correction() {
    let cfg = PipelineConfig { min_segment_samples: Some(1024), ..PipelineConfig::default() };
    let m = markers(&[("01", 0), ("C1", 100), ("C2", 900), ("C1", 1000), ("C2", 2500), ("02", 3000)]);
    let h = subject_hierarchy("s", &m, &cfg, "", 512.0).unwrap();
    assert_eq!(h.segments("eyesc"), &[Span::new(1000, 2500)]);
}

#[test]
fn go_nogo_segments_from_artifact_flags() {
    let cfg = PipelineConfig {
        taxonomy: ConditionTaxonomy::go_nogo(),
        derive_clean_from_artifacts: true,
        min_segment_samples: Some(1024),
        ..PipelineConfig::default()
    };
    let m = markers(&[
        ("ARTFCT1", 0), ("ARTFCT2", 500),
        ("GO", 800), ("NOGO", 1900),
        ("BLINK1", 3000), ("BLINK2", 3050),
        ("BLINK1", 3500), ("BLINK2", 3600),
        ("ARTFCT1", 7000),
    ]);
    let prepared = prepare_markers(&m, &cfg);
    let h = subject_hierarchy("s", &prepared, &cfg, "", 512.0).unwrap();
    assert_eq!(h.segments("clean"), &[Span::new(500, 3000), Span::new(3600, 7000)]);
}

#[test]
fn go_and_nogo_epochs_from_prompt_markers() {
    let m = markers(&[
        ("GO_PROMPT", 1000), ("RESPONSE", 1200),
        ("NOGO_PROMPT", 2000),
        ("GO_PROMPT", 3000),
    ]);
    let spans: Vec<Vec<Span>> = PromptEpoch::go_nogo().iter().map(|e| prompt_spans(&m, e, 10_000)).collect();
    assert_eq!(spans[0], vec![Span::new(1077, 1154), Span::new(3077, 3154)]);
    assert_eq!(spans[1], vec![Span::new(1154, 1308), Span::new(3154, 3308)]);
    assert_eq!(spans[2], vec![Span::new(2077, 2154)]);
    assert_eq!(spans[3], vec![Span::new(2154, 2308)]);
}
