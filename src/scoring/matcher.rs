// Beat Matcher - Greedy assignment of recorded taps to scoring beats
// One pass in beat order, each tap used at most once

use crate::latency::compensator::LatencyCompensator;
use crate::scoring::types::{BeatResult, Classification};
use crate::sequencer::pattern::ScoringBeat;
use crate::sequencer::tap_recorder::Tap;
use crate::session::config::MatchingConfig;

/// Tolerance thresholds for one beat
#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
    perfect_ms: f64,
    good_ms: f64,
    /// Maximum distance for a tap to be considered at all
    match_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BeatMatcher {
    config: MatchingConfig,
}

impl BeatMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    fn window_for(&self, position: usize, expects_silence: bool) -> Window {
        let c = &self.config;
        let (perfect_ms, good_ms) = if position == 0 {
            (c.first_beat_perfect_ms, c.first_beat_good_ms)
        } else {
            (c.perfect_ms, c.good_ms)
        };
        let match_ms = if expects_silence { c.rest_tolerance_ms } else { good_ms };
        Window {
            perfect_ms,
            good_ms,
            match_ms,
        }
    }

    /// Match `taps` (recording order) against `beats`
    ///
    /// Beat `i` is expected at `compensate(pattern_anchor_ms + i * interval_ms)`.
    /// Always returns one result per beat; taps that fit no beat are left out.
    pub fn match_beats(
        &self,
        beats: &[ScoringBeat],
        taps: &[Tap],
        pattern_anchor_ms: f64,
        interval_ms: f64,
        compensator: &LatencyCompensator,
    ) -> Vec<BeatResult> {
        let mut used = vec![false; taps.len()];
        let mut highest_assigned: Option<usize> = None;
        let mut results = Vec::with_capacity(beats.len());

        for (position, beat) in beats.iter().enumerate() {
            let raw_expected = pattern_anchor_ms + beat.index as f64 * interval_ms;
            let expected = compensator.compensate(raw_expected);
            let expects_silence = !beat.has_onset();
            let window = self.window_for(position, expects_silence);

            let chosen = self.pick_tap(taps, &used, highest_assigned, expected, window.match_ms);
            if let Some(index) = chosen {
                used[index] = true;
                highest_assigned = Some(highest_assigned.map_or(index, |h| h.max(index)));
            }

            results.push(self.score_beat(beat, expected, chosen.map(|i| (i, taps[i])), window));
        }

        log::debug!(
            "Matched {} of {} taps against {} beats",
            used.iter().filter(|u| **u).count(),
            taps.len(),
            beats.len()
        );
        results
    }

    /// Lowest score wins; ties go to the earlier tap
    fn pick_tap(
        &self,
        taps: &[Tap],
        used: &[bool],
        highest_assigned: Option<usize>,
        expected: f64,
        match_ms: f64,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;

        for (index, tap) in taps.iter().enumerate() {
            if used[index] {
                continue;
            }
            let error = (tap.timestamp_ms - expected).abs();
            if error > match_ms {
                continue;
            }

            let in_order = highest_assigned.is_none_or(|h| index > h);
            let score = if in_order {
                error - self.config.order_bonus_ms
            } else {
                error
            };

            if best.is_none_or(|(_, best_score)| score < best_score) {
                best = Some((index, score));
            }
        }

        best.map(|(index, _)| index)
    }

    fn score_beat(
        &self,
        beat: &ScoringBeat,
        expected: f64,
        matched: Option<(usize, Tap)>,
        window: Window,
    ) -> BeatResult {
        let expects_silence = !beat.has_onset();
        let timing_error_ms = matched.map(|(_, tap)| tap.timestamp_ms - expected);

        let (classification, timing_score, duration_score) = match (expects_silence, matched) {
            // Silence kept
            (true, None) => (Classification::Perfect, 100.0, 100.0),
            // Tap during a rest or a held note
            (true, Some(_)) => (Classification::Miss, 0.0, 0.0),
            (false, None) => (Classification::Miss, 0.0, 0.0),
            (false, Some((_, tap))) => {
                let error = (tap.timestamp_ms - expected).abs();
                let classification = if error <= window.perfect_ms {
                    Classification::Perfect
                } else if error <= window.good_ms {
                    Classification::Good
                } else {
                    Classification::Miss
                };
                let timing = timing_score(error, window.perfect_ms, window.good_ms);
                let duration = if classification.is_accurate() {
                    self.duration_score(&tap, beat.hold_target_ms)
                } else {
                    0.0
                };
                (classification, timing, duration)
            }
        };

        BeatResult {
            beat_index: beat.index,
            expected_time_ms: expected,
            matched_tap: matched.map(|(_, tap)| tap),
            tap_index: matched.map(|(index, _)| index),
            classification,
            timing_error_ms,
            timing_score,
            duration_score,
            expects_silence,
        }
    }

    /// Closeness of the hold to the note's written length
    fn duration_score(&self, tap: &Tap, hold_target_ms: f64) -> f64 {
        match tap.hold_duration_ms() {
            Some(hold) if hold_target_ms > 0.0 => {
                (100.0 * (1.0 - (hold - hold_target_ms).abs() / hold_target_ms)).clamp(0.0, 100.0)
            }
            _ => self.config.duration_score_floor,
        }
    }
}

/// 100 inside the perfect window, falling linearly to 50 at the good edge
fn timing_score(error_ms: f64, perfect_ms: f64, good_ms: f64) -> f64 {
    if error_ms <= perfect_ms {
        100.0
    } else if error_ms <= good_ms {
        100.0 - 50.0 * (error_ms - perfect_ms) / (good_ms - perfect_ms)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::note::{NoteElement, NoteValue};
    use crate::sequencer::pattern::{Pattern, decompose};
    use crate::sequencer::timeline::{Tempo, TimeSignature};

    const ANCHOR: f64 = 10_000.0;

    fn beats(elements: Vec<NoteElement>, bpm: f64) -> Vec<ScoringBeat> {
        let pattern = Pattern::from_elements("test", vec![elements]);
        decompose(&pattern, &TimeSignature::four_four(), &Tempo::new(bpm)).unwrap()
    }

    fn quarters() -> Vec<NoteElement> {
        vec![NoteElement::note(NoteValue::Quarter); 4]
    }

    fn no_latency() -> LatencyCompensator {
        let mut comp = LatencyCompensator::default();
        comp.set_enabled(false);
        comp
    }

    #[test]
    fn test_exact_taps_all_perfect() {
        let beats = beats(quarters(), 100.0);
        let comp = LatencyCompensator::with_base_offset(Default::default(), 80.0);
        let taps: Vec<Tap> = (0..4)
            .map(|i| Tap::new(comp.compensate(ANCHOR + i as f64 * 600.0)))
            .collect();

        let results = BeatMatcher::default().match_beats(&beats, &taps, ANCHOR, 600.0, &comp);

        assert_eq!(results.len(), 4);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.classification, Classification::Perfect);
            assert_eq!(r.tap_index, Some(i));
            assert_eq!(r.timing_error_ms, Some(0.0));
            assert_eq!(r.timing_score, 100.0);
            // No release data
            assert_eq!(r.duration_score, 60.0);
        }
    }

    #[test]
    fn test_zero_taps() {
        let beats = beats(
            vec![
                NoteElement::note(NoteValue::Quarter),
                NoteElement::rest(NoteValue::Quarter),
                NoteElement::note(NoteValue::Half),
            ],
            100.0,
        );
        let results = BeatMatcher::default().match_beats(&beats, &[], ANCHOR, 600.0, &no_latency());

        let classes: Vec<_> = results.iter().map(|r| r.classification).collect();
        // Beat 3 is the held half of the half note
        assert_eq!(
            classes,
            vec![
                Classification::Miss,
                Classification::Perfect,
                Classification::Miss,
                Classification::Perfect
            ]
        );
        assert!(results.iter().all(|r| r.matched_tap.is_none()));
    }

    #[test]
    fn test_rest_window() {
        let elements = vec![
            NoteElement::note(NoteValue::Quarter),
            NoteElement::rest(NoteValue::Quarter),
            NoteElement::note(NoteValue::Quarter),
            NoteElement::note(NoteValue::Quarter),
        ];
        let beats = beats(elements, 100.0);
        let matcher = BeatMatcher::default();
        let exact = |i: f64| Tap::new(ANCHOR + i * 600.0);

        // 200 ms after the rest: outside the rest window
        let taps = vec![exact(0.0), Tap::new(ANCHOR + 800.0), exact(2.0), exact(3.0)];
        let results = matcher.match_beats(&beats, &taps, ANCHOR, 600.0, &no_latency());
        assert_eq!(results[1].classification, Classification::Perfect);
        assert_eq!(results[1].duration_score, 100.0);
        assert!(results.iter().all(|r| r.tap_index != Some(1)));

        // 100 ms after the rest: inside
        let taps = vec![exact(0.0), Tap::new(ANCHOR + 700.0), exact(2.0), exact(3.0)];
        let results = matcher.match_beats(&beats, &taps, ANCHOR, 600.0, &no_latency());
        assert_eq!(results[1].classification, Classification::Miss);
        assert_eq!(results[1].tap_index, Some(1));
        assert_eq!(results[2].classification, Classification::Perfect);
    }

    #[test]
    fn test_first_beat_relaxed_window() {
        let beats = beats(quarters(), 100.0);
        let taps = vec![
            Tap::new(ANCHOR + 250.0),
            Tap::new(ANCHOR + 600.0 + 120.0),
        ];
        let results = BeatMatcher::default().match_beats(&beats, &taps, ANCHOR, 600.0, &no_latency());

        // 250 ms late is still good on the first beat
        assert_eq!(results[0].classification, Classification::Good);
        assert_eq!(results[0].timing_error_ms, Some(250.0));
        // 120 ms late on an interior beat
        assert_eq!(results[1].classification, Classification::Good);
        assert_eq!(results[1].tap_index, Some(1));
        assert_eq!(results[2].classification, Classification::Miss);
    }

    #[test]
    fn test_timing_score_slope() {
        assert_eq!(timing_score(0.0, 70.0, 170.0), 100.0);
        assert_eq!(timing_score(70.0, 70.0, 170.0), 100.0);
        assert_eq!(timing_score(120.0, 70.0, 170.0), 75.0);
        assert_eq!(timing_score(170.0, 70.0, 170.0), 50.0);
        assert_eq!(timing_score(171.0, 70.0, 170.0), 0.0);
    }

    #[test]
    fn test_duration_score() {
        let beats = beats(
            vec![
                NoteElement::note(NoteValue::Half),
                NoteElement::note(NoteValue::Quarter),
                NoteElement::note(NoteValue::Quarter),
            ],
            100.0,
        );
        let taps = vec![
            // Held 900 of 1200 ms
            Tap::with_release(ANCHOR, ANCHOR + 900.0),
            // Held 3x too long
            Tap::with_release(ANCHOR + 1200.0, ANCHOR + 3000.0),
            Tap::new(ANCHOR + 1800.0),
        ];
        let results = BeatMatcher::default().match_beats(&beats, &taps, ANCHOR, 600.0, &no_latency());

        assert_eq!(results[0].duration_score, 75.0);
        // Sustain beat stays clean
        assert_eq!(results[1].classification, Classification::Perfect);
        assert_eq!(results[2].duration_score, 0.0);
        assert_eq!(results[3].duration_score, 60.0);
    }

    #[test]
    fn test_each_tap_used_once() {
        let beats = beats(quarters(), 240.0);
        // A single tap between beats 1 and 2 is within both windows
        let taps = vec![Tap::new(ANCHOR), Tap::new(ANCHOR + 375.0)];
        let results = BeatMatcher::default().match_beats(&beats, &taps, ANCHOR, 250.0, &no_latency());

        let assigned: Vec<_> = results.iter().filter_map(|r| r.tap_index).collect();
        assert_eq!(assigned, vec![0, 1]);
        assert_eq!(results[2].classification, Classification::Miss);
    }

    #[test]
    fn test_order_bonus_prefers_later_tap() {
        let beats = beats(quarters(), 100.0);
        // Beat 1 expected at +600. Tap 0 sits unused at +570 after beat 0 took
        // tap 1; tap 2 at +650 is in order and wins despite being farther.
        let taps = vec![
            Tap::new(ANCHOR + 570.0),
            Tap::new(ANCHOR + 10.0),
            Tap::new(ANCHOR + 650.0),
        ];
        let results = BeatMatcher::default().match_beats(&beats, &taps, ANCHOR, 600.0, &no_latency());

        assert_eq!(results[0].tap_index, Some(1));
        // |570-600| = 30 vs |650-600| - 25 = 25
        assert_eq!(results[1].tap_index, Some(2));
    }

    #[test]
    fn test_compensation_shifts_expected_times() {
        let beats = beats(quarters(), 120.0);
        let comp = LatencyCompensator::with_base_offset(Default::default(), 100.0);
        // Raw-time taps are 100 ms late relative to compensated times
        let taps: Vec<Tap> = (0..4).map(|i| Tap::new(ANCHOR + i as f64 * 500.0)).collect();
        let results = BeatMatcher::default().match_beats(&beats, &taps, ANCHOR, 500.0, &comp);

        assert_eq!(results[0].expected_time_ms, ANCHOR - 100.0);
        assert_eq!(results[0].classification, Classification::Perfect);
        for r in &results[1..] {
            assert_eq!(r.timing_error_ms, Some(100.0));
            assert_eq!(r.classification, Classification::Good);
        }
    }
}
