// Note representation for rhythm patterns
// A note element is a duration value that is either sounded or silent

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rhythmic value of a note or rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    /// Length in quarter-beats (quarter note = 1.0)
    pub fn quarter_beats(&self) -> f64 {
        match self {
            NoteValue::Whole => 4.0,
            NoteValue::Half => 2.0,
            NoteValue::Quarter => 1.0,
            NoteValue::Eighth => 0.5,
            NoteValue::Sixteenth => 0.25,
        }
    }

    /// Values used to pad underfilled bars, longest first
    pub const PADDING: [NoteValue; 3] = [NoteValue::Quarter, NoteValue::Eighth, NoteValue::Sixteenth];
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NoteValue::Whole => "whole",
            NoteValue::Half => "half",
            NoteValue::Quarter => "quarter",
            NoteValue::Eighth => "eighth",
            NoteValue::Sixteenth => "sixteenth",
        };
        write!(f, "{}", name)
    }
}

/// A single note or rest in a pattern
///
/// Field names follow the pattern catalog format (`type`, `isRest`, `dotted`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteElement {
    #[serde(rename = "type")]
    pub value: NoteValue,

    #[serde(rename = "isRest", default)]
    pub is_rest: bool,

    #[serde(default)]
    pub dotted: bool,
}

impl NoteElement {
    pub fn note(value: NoteValue) -> Self {
        Self {
            value,
            is_rest: false,
            dotted: false,
        }
    }

    pub fn rest(value: NoteValue) -> Self {
        Self {
            value,
            is_rest: true,
            dotted: false,
        }
    }

    /// Dotted variant (1.5x length)
    pub fn dotted(mut self) -> Self {
        self.dotted = true;
        self
    }

    /// Length in quarter-beats, including the dot
    pub fn quarter_beats(&self) -> f64 {
        let base = self.value.quarter_beats();
        if self.dotted { base * 1.5 } else { base }
    }
}

impl fmt::Display for NoteElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.dotted { "dotted " } else { "" },
            self.value,
            if self.is_rest { " rest" } else { "" }
        )
    }
}
