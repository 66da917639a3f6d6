// Pattern - Hierarchical rhythm (bars > beat groups > note elements)
// and its decomposition into flat quarter-beat scoring beats

use crate::error::TimingError;
use crate::sequencer::note::{NoteElement, NoteValue};
use crate::sequencer::timeline::{Tempo, TimeSignature};
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing accumulated quarter-beat durations
pub const DURATION_EPSILON: f64 = 1e-6;

/// A group of elements occupying one written beat
///
/// Older catalog entries store a bare element instead of a list; both shapes
/// are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BeatGroup {
    Elements(Vec<NoteElement>),
    Single(NoteElement),
}

impl BeatGroup {
    pub fn elements(&self) -> &[NoteElement] {
        match self {
            BeatGroup::Elements(elements) => elements,
            BeatGroup::Single(element) => std::slice::from_ref(element),
        }
    }
}

impl From<Vec<NoteElement>> for BeatGroup {
    fn from(elements: Vec<NoteElement>) -> Self {
        BeatGroup::Elements(elements)
    }
}

impl From<NoteElement> for BeatGroup {
    fn from(element: NoteElement) -> Self {
        BeatGroup::Single(element)
    }
}

/// One bar of a pattern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bar {
    pub groups: Vec<BeatGroup>,
}

impl Bar {
    pub fn new(groups: Vec<BeatGroup>) -> Self {
        Self { groups }
    }

    /// All elements of the bar in playing order
    pub fn elements(&self) -> impl Iterator<Item = &NoteElement> {
        self.groups.iter().flat_map(|group| group.elements().iter())
    }

    /// Written length in quarter-beats (before normalization)
    pub fn quarter_beats(&self) -> f64 {
        self.elements().map(|e| e.quarter_beats()).sum()
    }
}

/// A rhythm pattern as supplied by the pattern catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default)]
    pub name: String,
    pub bars: Vec<Bar>,
}

impl Pattern {
    pub fn new(name: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            name: name.into(),
            bars,
        }
    }

    /// Build a single-voice pattern where every bar is a flat list of elements
    pub fn from_elements(name: impl Into<String>, bars: Vec<Vec<NoteElement>>) -> Self {
        Self::new(
            name,
            bars.into_iter()
                .map(|elements| {
                    Bar::new(elements.into_iter().map(BeatGroup::Single).collect())
                })
                .collect(),
        )
    }

    /// Parse a pattern from catalog JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// An element's share of one scoring beat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatElement {
    pub element: NoteElement,
    /// Portion of the element that falls inside this beat
    pub quarter_beats: f64,
    /// Continuation of an element that started in an earlier beat
    pub tied: bool,
}

impl BeatElement {
    /// A sounded element starting in this beat (a tap is expected here)
    pub fn is_onset(&self) -> bool {
        !self.element.is_rest && !self.tied
    }
}

/// One quarter-beat slot used as the unit of timing judgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringBeat {
    pub index: usize,
    pub elements: Vec<BeatElement>,
    /// True iff every element is a rest
    pub is_rest: bool,
    /// Summed element duration at the decomposition tempo
    pub expected_duration_ms: f64,
    /// Full length of the first note starting in this beat (0 when none)
    pub hold_target_ms: f64,
}

impl ScoringBeat {
    /// Whether a new tap is expected in this beat
    ///
    /// False for rests and for beats made only of a note held over from a
    /// previous beat.
    pub fn has_onset(&self) -> bool {
        self.elements.iter().any(BeatElement::is_onset)
    }

    /// Beat carries only the continuation of an earlier note
    pub fn is_sustain(&self) -> bool {
        !self.is_rest && !self.has_onset()
    }

    pub fn quarter_beats(&self) -> f64 {
        self.elements.iter().map(|e| e.quarter_beats).sum()
    }

    /// Slot is shorter than a full quarter-beat (only possible for the last beat)
    pub fn is_partial(&self) -> bool {
        self.quarter_beats() < 1.0 - DURATION_EPSILON
    }
}

/// Fit a bar to its capacity
///
/// Elements that would overflow the bar are dropped together with everything
/// after them. Underfilled bars get trailing rests, longest fitting value first.
pub fn normalize_bar(bar: &Bar, capacity: f64) -> Vec<NoteElement> {
    let mut elements = Vec::new();
    let mut total = 0.0;

    for element in bar.elements() {
        let length = element.quarter_beats();
        if total + length > capacity + DURATION_EPSILON {
            log::debug!(
                "Bar overflows {} quarter-beats, truncating at {}",
                capacity,
                element
            );
            break;
        }
        total += length;
        elements.push(*element);
    }

    // An unbounded bar has nothing to pad
    let mut remaining = if capacity.is_finite() {
        capacity - total
    } else {
        0.0
    };
    while remaining > DURATION_EPSILON {
        let Some(value) = NoteValue::PADDING
            .iter()
            .find(|v| v.quarter_beats() <= remaining + DURATION_EPSILON)
        else {
            break;
        };
        elements.push(NoteElement::rest(*value));
        remaining -= value.quarter_beats();
    }

    elements
}

/// Accumulates elements into quarter-beat scoring beats
struct BeatBuilder {
    interval_ms: f64,
    current: Vec<BeatElement>,
    filled: f64,
    beats: Vec<ScoringBeat>,
}

impl BeatBuilder {
    fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            current: Vec::new(),
            filled: 0.0,
            beats: Vec::new(),
        }
    }

    fn push(&mut self, element: NoteElement) {
        let mut remaining = element.quarter_beats();
        let mut tied = false;

        // Elements longer than the room left are split across beats
        while remaining > DURATION_EPSILON {
            let room = 1.0 - self.filled;
            let portion = if remaining <= room + DURATION_EPSILON {
                remaining
            } else {
                room
            };

            self.current.push(BeatElement {
                element,
                quarter_beats: portion,
                tied,
            });
            self.filled += portion;
            remaining -= portion;
            tied = true;

            if self.filled >= 1.0 - DURATION_EPSILON {
                self.close_beat();
            }
        }
    }

    fn close_beat(&mut self) {
        let elements = std::mem::take(&mut self.current);
        let is_rest = elements.iter().all(|e| e.element.is_rest);
        let hold_target_ms = elements
            .iter()
            .find(|e| e.is_onset())
            .map(|e| e.element.quarter_beats() * self.interval_ms)
            .unwrap_or(0.0);

        self.beats.push(ScoringBeat {
            index: self.beats.len(),
            elements,
            is_rest,
            expected_duration_ms: self.filled * self.interval_ms,
            hold_target_ms,
        });
        self.filled = 0.0;
    }

    fn finish(mut self) -> Vec<ScoringBeat> {
        if !self.current.is_empty() {
            self.close_beat();
        }
        self.beats
    }
}

/// Flatten a pattern into scoring beats
///
/// Pure and deterministic: the same pattern, time signature and tempo always
/// produce the same beats.
pub fn decompose(
    pattern: &Pattern,
    time_signature: &TimeSignature,
    tempo: &Tempo,
) -> Result<Vec<ScoringBeat>, TimingError> {
    if pattern.bars.is_empty() {
        return Err(TimingError::InvalidPattern(format!(
            "pattern '{}' has no bars",
            pattern.name
        )));
    }

    let capacity = time_signature.quarter_beats_per_bar();
    let smallest = NoteValue::Sixteenth.quarter_beats();
    if !capacity.is_finite() || capacity < smallest - DURATION_EPSILON {
        return Err(TimingError::InvalidPattern(format!(
            "time signature {} cannot hold a sixteenth note",
            time_signature
        )));
    }
    let mut builder = BeatBuilder::new(tempo.interval_ms());

    for bar in &pattern.bars {
        for element in normalize_bar(bar, capacity) {
            builder.push(element);
        }
    }

    let beats = builder.finish();
    if beats.is_empty() {
        return Err(TimingError::InvalidPattern(format!(
            "pattern '{}' produced no scoring beats",
            pattern.name
        )));
    }

    Ok(beats)
}
