// Integration test: Matcher and decomposer properties over random input
//
// Seeded random patterns and tap lists; the properties must hold for all of them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rhythm_trainer::sequencer::pattern::DURATION_EPSILON;
use rhythm_trainer::{
    BeatMatcher, Classification, LatencyCompensator, NoteElement, NoteValue, Pattern, Tap, Tempo,
    TimeSignature, decompose,
};
use std::collections::HashSet;

const CASES: usize = 300;

fn random_element(rng: &mut StdRng) -> NoteElement {
    let value = match rng.gen_range(0..5) {
        0 => NoteValue::Whole,
        1 => NoteValue::Half,
        2 => NoteValue::Quarter,
        3 => NoteValue::Eighth,
        _ => NoteValue::Sixteenth,
    };
    let element = if rng.gen_bool(0.25) {
        NoteElement::rest(value)
    } else {
        NoteElement::note(value)
    };
    // A dotted sixteenth leaves gaps no padding rest can fill
    if value != NoteValue::Sixteenth && rng.gen_bool(0.2) {
        element.dotted()
    } else {
        element
    }
}

fn random_pattern(rng: &mut StdRng) -> Pattern {
    let bars: Vec<Vec<NoteElement>> = (0..rng.gen_range(1..5))
        .map(|_| {
            (0..rng.gen_range(1..9))
                .map(|_| random_element(rng))
                .collect::<Vec<NoteElement>>()
        })
        .collect();
    Pattern::from_elements("random", bars)
}

#[test]
fn test_decomposed_beats_fill_a_quarter() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let tempo = Tempo::new(90.0);

    for _ in 0..CASES {
        let pattern = random_pattern(&mut rng);
        let beats = decompose(&pattern, &TimeSignature::four_four(), &tempo).unwrap();

        // Normalized 4/4 bars always give four full beats each
        assert_eq!(beats.len(), pattern.bars.len() * 4);
        for (i, beat) in beats.iter().enumerate() {
            assert_eq!(beat.index, i);
            assert!((beat.quarter_beats() - 1.0).abs() < DURATION_EPSILON);
            assert_eq!(beat.is_rest, beat.elements.iter().all(|e| e.element.is_rest));
            assert!((beat.expected_duration_ms - tempo.interval_ms()).abs() < 1e-6);
        }
    }
}

#[test]
fn test_decompose_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let pattern = random_pattern(&mut rng);
        let first = decompose(&pattern, &TimeSignature::three_four(), &Tempo::new(140.0));
        let second = decompose(&pattern, &TimeSignature::three_four(), &Tempo::new(140.0));
        assert_eq!(first, second);
    }
}

#[test]
fn test_taps_assigned_at_most_once() {
    let mut rng = StdRng::seed_from_u64(7);
    let matcher = BeatMatcher::default();
    let interval = 500.0;

    for _ in 0..CASES {
        let pattern = random_pattern(&mut rng);
        let beats = decompose(&pattern, &TimeSignature::four_four(), &Tempo::new(120.0)).unwrap();
        let span = beats.len() as f64 * interval;

        let mut times: Vec<f64> = (0..rng.gen_range(0..beats.len() * 2 + 1))
            .map(|_| rng.gen_range(-400.0..span + 400.0))
            .collect();
        // Mostly in order, like real input, with occasional swaps
        times.sort_by(|a, b| a.total_cmp(b));
        if times.len() > 2 && rng.gen_bool(0.3) {
            times.swap(0, 1);
        }
        let taps: Vec<Tap> = times.into_iter().map(Tap::new).collect();

        let comp = LatencyCompensator::with_base_offset(Default::default(), rng.gen_range(0.0..150.0));
        let results = matcher.match_beats(&beats, &taps, 0.0, interval, &comp);

        assert_eq!(results.len(), beats.len());
        let assigned: Vec<usize> = results.iter().filter_map(|r| r.tap_index).collect();
        let distinct: HashSet<usize> = assigned.iter().copied().collect();
        assert_eq!(assigned.len(), distinct.len(), "a tap was assigned twice");
        assert!(assigned.len() <= taps.len());
        assert!(assigned.iter().all(|i| *i < taps.len()));

        for r in &results {
            assert!((0.0..=100.0).contains(&r.timing_score));
            assert!((0.0..=100.0).contains(&r.duration_score));
            assert_eq!(r.matched_tap.is_some(), r.tap_index.is_some());
        }
    }
}

#[test]
fn test_zero_taps_on_random_patterns() {
    let mut rng = StdRng::seed_from_u64(99);
    let matcher = BeatMatcher::default();
    let comp = LatencyCompensator::default();

    for _ in 0..CASES {
        let pattern = random_pattern(&mut rng);
        let beats = decompose(&pattern, &TimeSignature::four_four(), &Tempo::new(100.0)).unwrap();
        let results = matcher.match_beats(&beats, &[], 1_000.0, 600.0, &comp);

        for (beat, result) in beats.iter().zip(&results) {
            let expected = if beat.has_onset() {
                Classification::Miss
            } else {
                Classification::Perfect
            };
            assert_eq!(result.classification, expected);
        }
    }
}

#[test]
fn test_round_trip_on_random_patterns() {
    let mut rng = StdRng::seed_from_u64(2024);
    let matcher = BeatMatcher::default();

    for _ in 0..CASES {
        let pattern = random_pattern(&mut rng);
        let tempo = Tempo::new(rng.gen_range(60.0..180.0));
        let interval = tempo.interval_ms();
        let beats = decompose(&pattern, &TimeSignature::four_four(), &tempo).unwrap();
        let comp = LatencyCompensator::with_base_offset(Default::default(), rng.gen_range(0.0..200.0));

        let taps: Vec<Tap> = beats
            .iter()
            .filter(|b| b.has_onset())
            .map(|b| Tap::new(comp.compensate(5_000.0 + b.index as f64 * interval)))
            .collect();
        let results = matcher.match_beats(&beats, &taps, 5_000.0, interval, &comp);

        assert!(
            results.iter().all(|r| r.classification == Classification::Perfect),
            "round trip failed at {}",
            tempo
        );
    }
}
