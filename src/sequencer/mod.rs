// Sequencer module
// Musical time, patterns, the beat scheduler and tap capture

pub mod metronome;
pub mod note;
pub mod pattern;
pub mod scheduler;
pub mod tap_recorder;
pub mod timeline;

pub use metronome::{ClickSink, ClickType, Metronome, Tick, TickSink};
pub use note::{NoteElement, NoteValue};
pub use pattern::{Bar, BeatGroup, Pattern, ScoringBeat, decompose};
pub use scheduler::{BeatScheduler, SchedulerPhase, SchedulerState};
pub use tap_recorder::{InputSource, Tap, TapRecorder};
pub use timeline::{Tempo, TimeSignature};
