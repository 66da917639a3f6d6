// Session - One practice run from the first click to the scored report
// Owns the metronome and tap recorder; the compensator is shared with the caller

pub mod config;

use crate::audio::timing::Clock;
use crate::error::TimingError;
use crate::latency::compensator::SharedCompensator;
use crate::messaging::channels::{
    ChannelTickSink, NotificationConsumer, NotificationProducer, TickConsumer,
    create_notification_channel, create_tick_channel,
};
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::scoring::matcher::BeatMatcher;
use crate::scoring::stats::CumulativeStats;
use crate::scoring::types::{BeatResult, SessionStats};
use crate::sequencer::metronome::{ClickSink, Metronome, TickSink};
use crate::sequencer::pattern::{Pattern, ScoringBeat, decompose};
use crate::sequencer::tap_recorder::{InputSource, TapRecorder};
use crate::sequencer::timeline::{Tempo, TimeSignature};
use chrono::{DateTime, Utc};
use config::EngineConfig;
use parking_lot::Mutex;
use ringbuf::traits::Producer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

type SharedNotifier = Arc<Mutex<NotificationProducer>>;

fn notify(notifier: &SharedNotifier, notification: Notification) {
    // Dropped when the UI is not draining the channel
    if notifier.lock().try_push(notification).is_err() {
        log::debug!("Notification channel full, dropping notification");
    }
}

/// Times fixed when the session starts
#[derive(Debug, Clone, Copy, PartialEq)]
struct SessionWindow {
    /// Metronome tick 0
    scheduler_anchor_ms: f64,
    /// First pattern beat (after the count-in)
    pattern_anchor_ms: f64,
    /// Recording window start
    start_ms: f64,
    /// Recording window end
    end_ms: f64,
}

/// Cloneable input handle for one session
///
/// Stray presses are counted, logged and reported as notifications; they
/// never fail the session.
#[derive(Clone)]
pub struct TapHandle {
    recorder: Arc<Mutex<TapRecorder>>,
    clock: Arc<dyn Clock>,
    notifier: SharedNotifier,
}

impl TapHandle {
    /// Press stamped by the session clock
    pub fn press(&self, source: InputSource) -> Option<usize> {
        let Some(now) = self.clock.now_ms() else {
            log::warn!("Clock unavailable, press from {} dropped", source);
            return None;
        };
        self.press_at(source, now)
    }

    /// Press at an explicit monotonic timestamp (e.g. an input event time)
    pub fn press_at(&self, source: InputSource, timestamp_ms: f64) -> Option<usize> {
        let result = self.recorder.lock().on_press(source, timestamp_ms);
        match result {
            Ok(index) => Some(index),
            Err(e) => {
                log::debug!("Discarded press from {}: {}", source, e);
                notify(&self.notifier, Notification::from_error(&e));
                None
            }
        }
    }

    pub fn release(&self, source: InputSource) -> bool {
        let Some(now) = self.clock.now_ms() else {
            log::warn!("Clock unavailable, release from {} dropped", source);
            return false;
        };
        self.release_at(source, now)
    }

    pub fn release_at(&self, source: InputSource, timestamp_ms: f64) -> bool {
        self.recorder.lock().on_release(source, timestamp_ms)
    }
}

/// Scored performance of one input source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub source: InputSource,
    pub tap_count: usize,
    pub results: Vec<BeatResult>,
    pub stats: SessionStats,
}

/// Everything a finished session produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub id: SessionId,
    pub pattern_name: String,
    pub tempo_bpm: f64,
    /// One report per source, primary source first
    pub reports: Vec<SessionReport>,
    /// Presses rejected for falling outside the recording window
    pub discarded_taps: usize,
    /// Monotonic time of the first metronome tick
    pub started_at_ms: f64,
    pub ended_at_ms: f64,
    /// Change in adaptive latency offset from this session's feedback
    pub latency_adjustment_ms: f64,
    pub finished_at: DateTime<Utc>,
}

impl SessionOutcome {
    pub fn report(&self, source: InputSource) -> Option<&SessionReport> {
        self.reports.iter().find(|r| r.source == source)
    }

    pub fn primary(&self) -> Option<&SessionReport> {
        self.report(InputSource::PRIMARY)
    }

    /// Record every source's stats in the practice history
    pub fn fold_into(&self, cumulative: &mut CumulativeStats) {
        for report in &self.reports {
            cumulative.record_at(&report.stats, self.finished_at);
        }
    }
}

/// A practice session over one pattern at a fixed tempo
pub struct Session {
    id: SessionId,
    config: EngineConfig,
    pattern_name: String,
    tempo: Tempo,
    beats: Vec<ScoringBeat>,
    clock: Arc<dyn Clock>,
    metronome: Metronome,
    recorder: Arc<Mutex<TapRecorder>>,
    compensator: SharedCompensator,
    matcher: BeatMatcher,
    notifier: SharedNotifier,
    notification_rx: Option<NotificationConsumer>,
    window: Option<SessionWindow>,
}

impl Session {
    /// Session in 4/4
    pub fn new(
        config: EngineConfig,
        pattern: &Pattern,
        tempo: Tempo,
        clock: Arc<dyn Clock>,
        compensator: SharedCompensator,
    ) -> Result<Self, TimingError> {
        Self::with_time_signature(
            config,
            pattern,
            TimeSignature::four_four(),
            tempo,
            clock,
            compensator,
        )
    }

    pub fn with_time_signature(
        config: EngineConfig,
        pattern: &Pattern,
        time_signature: TimeSignature,
        tempo: Tempo,
        clock: Arc<dyn Clock>,
        compensator: SharedCompensator,
    ) -> Result<Self, TimingError> {
        let beats = decompose(pattern, &time_signature, &tempo)?;

        let mut metronome = Metronome::new(Arc::clone(&clock), time_signature);
        metronome.arm(tempo.interval_ms())?;
        metronome.set_count_in(config.session.count_in_beats as u64);
        metronome.set_tick_limit(Some(
            config.session.count_in_beats as u64 + beats.len() as u64,
        ));

        let (notification_tx, notification_rx) =
            create_notification_channel(config.session.notification_channel_capacity);

        Ok(Self {
            id: SessionId::new(),
            matcher: BeatMatcher::new(config.matching.clone()),
            config,
            pattern_name: pattern.name.clone(),
            tempo,
            beats,
            clock,
            metronome,
            recorder: Arc::new(Mutex::new(TapRecorder::new())),
            compensator,
            notifier: Arc::new(Mutex::new(notification_tx)),
            notification_rx: Some(notification_rx),
            window: None,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn beats(&self) -> &[ScoringBeat] {
        &self.beats
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compensator(&self) -> &SharedCompensator {
        &self.compensator
    }

    /// Enable/disable audible clicks; ticks are delivered either way
    pub fn set_click_enabled(&mut self, enabled: bool) {
        self.metronome.set_enabled(enabled);
    }

    /// Receiver for diagnostics (only the first call gets it)
    pub fn take_notifications(&mut self) -> Option<NotificationConsumer> {
        self.notification_rx.take()
    }

    pub fn tap_handle(&self) -> TapHandle {
        TapHandle {
            recorder: Arc::clone(&self.recorder),
            clock: Arc::clone(&self.clock),
            notifier: Arc::clone(&self.notifier),
        }
    }

    /// Start the metronome and open the recording window
    ///
    /// Returns the time of the first pattern beat.
    pub fn start(
        &mut self,
        tick_sink: Box<dyn TickSink>,
        click_sink: Box<dyn ClickSink>,
    ) -> Result<f64, TimingError> {
        if self.window.is_some() {
            return Err(TimingError::SchedulerNotArmed);
        }

        // The window opens before tick 0 fires so no early press is lost
        let window = match self.clock.now_ms() {
            Some(anchor) => self.window_from(anchor),
            None => {
                let e = TimingError::SchedulerUnavailable("clock returned no reading".to_string());
                notify(&self.notifier, Notification::from_error(&e));
                return Err(e);
            }
        };
        self.recorder.lock().open(window.start_ms, window.end_ms);

        if let Err(e) =
            self.metronome
                .start_at(Some(window.scheduler_anchor_ms), tick_sink, click_sink)
        {
            self.recorder.lock().close();
            notify(&self.notifier, Notification::from_error(&e));
            return Err(e);
        }
        self.window = Some(window);
        let pattern_anchor_ms = window.pattern_anchor_ms;

        log::info!(
            "Session {} started: '{}' at {}, {} beats, first beat at {:.1} ms",
            self.id,
            self.pattern_name,
            self.tempo,
            self.beats.len(),
            pattern_anchor_ms
        );
        notify(
            &self.notifier,
            Notification::info(NotificationCategory::Session, "Session started"),
        );
        Ok(pattern_anchor_ms)
    }

    /// Session timeline for a metronome started at `scheduler_anchor_ms`
    fn window_from(&self, scheduler_anchor_ms: f64) -> SessionWindow {
        let interval = self.tempo.interval_ms();
        let pattern_anchor_ms =
            scheduler_anchor_ms + self.config.session.count_in_beats as f64 * interval;
        let raw_end_ms = pattern_anchor_ms
            + self.beats.len() as f64 * interval
            + self.config.session.trailing_grace_ms;

        // Compensated beat times may fall outside the raw timeline
        let (first_expected_ms, compensated_end_ms) = {
            let compensator = self.compensator.lock();
            (
                compensator.compensate(pattern_anchor_ms),
                compensator.compensate(raw_end_ms),
            )
        };

        SessionWindow {
            scheduler_anchor_ms,
            pattern_anchor_ms,
            start_ms: scheduler_anchor_ms
                .min(first_expected_ms - self.config.matching.first_beat_good_ms),
            end_ms: raw_end_ms.max(compensated_end_ms),
        }
    }

    /// Start with ticks delivered over a lock-free channel
    pub fn start_with_tick_channel(
        &mut self,
        click_sink: Box<dyn ClickSink>,
    ) -> Result<(f64, TickConsumer), TimingError> {
        let (tx, rx) = create_tick_channel(self.config.session.tick_channel_capacity);
        let anchor = self.start(Box::new(ChannelTickSink::new(tx)), click_sink)?;
        Ok((anchor, rx))
    }

    pub fn is_started(&self) -> bool {
        self.window.is_some()
    }

    pub fn pattern_anchor_ms(&self) -> Option<f64> {
        self.window.map(|w| w.pattern_anchor_ms)
    }

    /// End of the recording window
    pub fn end_time_ms(&self) -> Option<f64> {
        self.window.map(|w| w.end_ms)
    }

    /// Whether the clock has passed the end of the recording window
    pub fn is_complete(&self) -> bool {
        match (self.window, self.clock.now_ms()) {
            (Some(window), Some(now)) => now > window.end_ms,
            _ => false,
        }
    }

    /// Stop, score every source and feed the results back to the compensator
    pub fn finish(&mut self) -> Result<SessionOutcome, TimingError> {
        let window = self.window.take().ok_or(TimingError::SessionNotStarted)?;
        self.metronome.stop();

        let (snapshots, discarded_taps) = {
            let mut recorder = self.recorder.lock();
            recorder.close();
            let mut sources = vec![InputSource::PRIMARY];
            sources.extend(
                recorder
                    .sources()
                    .into_iter()
                    .filter(|s| *s != InputSource::PRIMARY),
            );
            let snapshots: Vec<_> = sources
                .into_iter()
                .map(|source| (source, recorder.snapshot(source)))
                .collect();
            (snapshots, recorder.discarded())
        };

        let interval = self.tempo.interval_ms();
        let threshold = self.config.matching.tendency_threshold_ms;
        let mut compensator = self.compensator.lock();

        // Match every source under the same compensation before learning
        let reports: Vec<SessionReport> = snapshots
            .into_iter()
            .map(|(source, taps)| {
                let results = self.matcher.match_beats(
                    &self.beats,
                    &taps,
                    window.pattern_anchor_ms,
                    interval,
                    &compensator,
                );
                let stats = SessionStats::from_results(&results, threshold);
                SessionReport {
                    source,
                    tap_count: taps.len(),
                    results,
                    stats,
                }
            })
            .collect();

        let latency_adjustment_ms = if self.config.session.learn_after_session {
            reports
                .iter()
                .map(|report| compensator.learn_from_results(&report.results))
                .sum::<f64>()
        } else {
            0.0
        };
        drop(compensator);

        for report in &reports {
            log::info!(
                "Session {} {}: {:.0}% accuracy ({} perfect, {} good, {} miss)",
                self.id,
                report.source,
                report.stats.accuracy_percent(),
                report.stats.perfect,
                report.stats.good,
                report.stats.miss
            );
        }
        if discarded_taps > 0 {
            log::info!("Session {}: {} taps outside the window", self.id, discarded_taps);
        }
        notify(
            &self.notifier,
            Notification::info(NotificationCategory::Session, "Session finished"),
        );

        Ok(SessionOutcome {
            id: self.id,
            pattern_name: self.pattern_name.clone(),
            tempo_bpm: self.tempo.bpm(),
            reports,
            discarded_taps,
            started_at_ms: window.scheduler_anchor_ms,
            ended_at_ms: self.clock.now_ms().unwrap_or(window.end_ms),
            latency_adjustment_ms,
            finished_at: Utc::now(),
        })
    }
}
