// Metronome - Threaded driver for the beat scheduler
// Fires ticks on a timer thread and forwards them to tick and click sinks

use crate::audio::timing::Clock;
use crate::error::TimingError;
use crate::sequencer::scheduler::{BeatScheduler, SchedulerPhase, SchedulerState};
use crate::sequencer::timeline::TimeSignature;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClickType {
    /// Click on first beat of bar (accent/downbeat)
    Accent,
    /// Click on other beats
    Regular,
}

impl ClickType {
    /// Click for tick `number` (0-based), one tick per quarter-beat
    ///
    /// Bars are counted from tick `count_in`, so the first pattern beat is
    /// always a downbeat. Lead-in ticks follow the same grid backwards.
    pub fn for_tick(number: u64, count_in: u64, time_signature: &TimeSignature) -> Self {
        let ticks_per_bar = (time_signature.quarter_beats_per_bar().round() as i64).max(1);
        let position = number as i64 - count_in as i64;
        if position.rem_euclid(ticks_per_bar) == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }
}

/// One delivered metronome tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// 0-based tick number since start
    pub number: u64,
    /// Drift-free due time (anchor + number * interval)
    pub scheduled_ms: f64,
    /// Clock reading when the tick was delivered
    pub fired_ms: f64,
    pub click: ClickType,
}

impl Tick {
    /// How late this tick was delivered
    pub fn jitter_ms(&self) -> f64 {
        self.fired_ms - self.scheduled_ms
    }

    /// Pattern beat index for this tick, after `count_in` lead-in ticks
    pub fn pattern_beat(&self, count_in: u64) -> Option<u64> {
        self.number.checked_sub(count_in)
    }
}

/// Observer of metronome ticks (notation highlighting, animation)
///
/// Called on the timer thread while the metronome lock is held: it must not
/// block and must not call back into the metronome.
pub trait TickSink: Send {
    fn on_tick(&mut self, tick: &Tick);
}

/// Tick sink that ignores everything
#[derive(Debug, Default)]
pub struct NullTickSink;

impl TickSink for NullTickSink {
    fn on_tick(&mut self, _tick: &Tick) {}
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Click playback failed: {0}")]
pub struct ClickError(pub String);

/// Audio output for metronome clicks (fire-and-forget)
pub trait ClickSink: Send {
    fn play_click(&mut self, click: ClickType) -> Result<(), ClickError>;
}

/// Click sink for silent sessions
#[derive(Debug, Default)]
pub struct SilentClick;

impl ClickSink for SilentClick {
    fn play_click(&mut self, _click: ClickType) -> Result<(), ClickError> {
        Ok(())
    }
}

struct DriverState {
    scheduler: BeatScheduler,
    time_signature: TimeSignature,
    /// Lead-in ticks before the first downbeat
    count_in: u64,
    tick_limit: Option<u64>,
    click_enabled: bool,
    /// Bumped on every start/stop so a stale timer thread exits
    generation: u64,
    tick_sink: Box<dyn TickSink>,
    click_sink: Box<dyn ClickSink>,
}

struct Shared {
    state: Mutex<DriverState>,
    wake: Condvar,
}

/// Deliver the due tick and advance the scheduler
/// Returns the wait until the next tick, `None` when the run has ended
fn fire_due_tick(state: &mut DriverState, now: f64) -> Option<Duration> {
    let number = state.scheduler.next_tick_number()?;
    let scheduled_ms = state.scheduler.next_due_ms()?;

    if state.tick_limit.is_some_and(|limit| number >= limit) {
        log::debug!("Metronome reached tick limit {}", number);
        state.scheduler.stop();
        return None;
    }

    let tick = Tick {
        number,
        scheduled_ms,
        fired_ms: now,
        click: ClickType::for_tick(number, state.count_in, &state.time_signature),
    };

    if state.click_enabled {
        // Audio failures must not stop the timeline
        if let Err(e) = state.click_sink.play_click(tick.click) {
            log::warn!("Metronome click {} failed: {}", number, e);
        }
    }
    state.tick_sink.on_tick(&tick);

    state.scheduler.complete_tick(now)
}

fn run_timer(shared: Arc<Shared>, clock: Arc<dyn Clock>, generation: u64) {
    let mut guard = shared.state.lock();
    loop {
        if guard.generation != generation || !guard.scheduler.is_running() {
            break;
        }
        let Some(now) = clock.now_ms() else {
            log::warn!("Metronome clock became unavailable, stopping");
            guard.scheduler.stop();
            break;
        };
        let Some(due) = guard.scheduler.next_due_ms() else {
            break;
        };

        if now < due {
            let wait = Duration::from_micros(((due - now) * 1000.0).ceil() as u64);
            shared.wake.wait_for(&mut guard, wait);
            continue;
        }

        match fire_due_tick(&mut guard, now) {
            Some(wait) if !wait.is_zero() => {
                shared.wake.wait_for(&mut guard, wait);
            }
            Some(_) => {}
            None => break,
        }
    }
}

/// Metronome driving a drift-corrected beat scheduler on its own thread
pub struct Metronome {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    worker: Option<JoinHandle<()>>,
}

impl Metronome {
    /// Create new metronome
    pub fn new(clock: Arc<dyn Clock>, time_signature: TimeSignature) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DriverState {
                    scheduler: BeatScheduler::new(),
                    time_signature,
                    count_in: 0,
                    tick_limit: None,
                    click_enabled: true,
                    generation: 0,
                    tick_sink: Box::new(NullTickSink),
                    click_sink: Box::new(SilentClick),
                }),
                wake: Condvar::new(),
            }),
            clock,
            worker: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.shared.state.lock()
    }

    /// Set the tick interval (stops a running metronome first)
    pub fn arm(&mut self, interval_ms: f64) -> Result<(), TimingError> {
        if self.is_running() {
            self.stop();
        }
        self.lock().scheduler.arm(interval_ms)
    }

    /// Stop clicking after `limit` ticks (`None` = run until stopped)
    pub fn set_tick_limit(&mut self, limit: Option<u64>) {
        self.lock().tick_limit = limit;
    }

    /// Number of lead-in ticks before the first accented bar
    pub fn set_count_in(&mut self, ticks: u64) {
        self.lock().count_in = ticks;
    }

    /// Enable/disable click output; ticks keep flowing either way
    pub fn set_enabled(&mut self, enabled: bool) {
        self.lock().click_enabled = enabled;
    }

    /// Check if clicks are enabled
    pub fn is_enabled(&self) -> bool {
        self.lock().click_enabled
    }

    /// Start ticking and return the anchor time
    ///
    /// Tick 0 fires synchronously before this returns. Either the metronome is
    /// fully running afterwards or nothing changed.
    pub fn start(
        &mut self,
        tick_sink: Box<dyn TickSink>,
        click_sink: Box<dyn ClickSink>,
    ) -> Result<f64, TimingError> {
        let now = self.clock.now_ms();
        self.start_at(now, tick_sink, click_sink)
    }

    /// Start with tick 0 anchored at a clock reading the caller already took
    ///
    /// `None` (no reading) fails with `SchedulerUnavailable`.
    pub fn start_at(
        &mut self,
        now: Option<f64>,
        tick_sink: Box<dyn TickSink>,
        click_sink: Box<dyn ClickSink>,
    ) -> Result<f64, TimingError> {
        if self.lock().scheduler.phase() != SchedulerPhase::Armed {
            return Err(TimingError::SchedulerNotArmed);
        }
        // A previous run's thread has already been told to exit
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        let mut guard = self.shared.state.lock();
        let anchor = guard.scheduler.start(now)?;

        let generation = guard.generation + 1;
        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        // The thread blocks on the lock held here until tick 0 is out
        let worker = match thread::Builder::new()
            .name("metronome".to_string())
            .spawn(move || run_timer(shared, clock, generation))
        {
            Ok(worker) => worker,
            Err(e) => {
                guard.scheduler.abort_start();
                return Err(TimingError::SchedulerUnavailable(format!(
                    "failed to spawn timer thread: {}",
                    e
                )));
            }
        };

        guard.generation = generation;
        guard.tick_sink = tick_sink;
        guard.click_sink = click_sink;
        fire_due_tick(&mut guard, anchor);
        drop(guard);

        self.worker = Some(worker);
        log::debug!("Metronome started at {:.3} ms", anchor);
        Ok(anchor)
    }

    /// Stop ticking; no tick fires after this returns
    ///
    /// Safe to call repeatedly. Must not be called from a tick sink.
    pub fn stop(&mut self) {
        {
            let mut guard = self.lock();
            guard.scheduler.stop();
            guard.generation += 1;
        }
        self.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().scheduler.is_running()
    }

    /// Timing state of the current or most recent run
    pub fn state(&self) -> Option<SchedulerState> {
        self.lock().scheduler.state().copied()
    }

    pub fn anchor_time(&self) -> Option<f64> {
        self.lock().scheduler.anchor_time()
    }

    pub fn beat_time(&self, n: u64) -> Option<f64> {
        self.lock().scheduler.beat_time(n)
    }

    pub fn interval_ms(&self) -> f64 {
        self.lock().scheduler.interval_ms()
    }

    pub fn ticks_fired(&self) -> u64 {
        self.state().map(|s| s.ticks_fired).unwrap_or(0)
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::{ManualClock, MonotonicClock};

    #[derive(Clone, Default)]
    struct RecordingSink {
        ticks: Arc<Mutex<Vec<Tick>>>,
    }

    impl TickSink for RecordingSink {
        fn on_tick(&mut self, tick: &Tick) {
            self.ticks.lock().push(*tick);
        }
    }

    struct FailingClick {
        attempts: Arc<Mutex<u32>>,
    }

    impl ClickSink for FailingClick {
        fn play_click(&mut self, _click: ClickType) -> Result<(), ClickError> {
            *self.attempts.lock() += 1;
            Err(ClickError("device lost".to_string()))
        }
    }

    #[test]
    fn test_click_type_accent_pattern() {
        let ts = TimeSignature::four_four();
        let clicks: Vec<ClickType> = (0..8).map(|n| ClickType::for_tick(n, 0, &ts)).collect();
        assert_eq!(clicks[0], ClickType::Accent);
        assert_eq!(clicks[1], ClickType::Regular);
        assert_eq!(clicks[3], ClickType::Regular);
        assert_eq!(clicks[4], ClickType::Accent);

        let ts = TimeSignature::three_four();
        assert_eq!(ClickType::for_tick(3, 0, &ts), ClickType::Accent);
        assert_eq!(ClickType::for_tick(4, 0, &ts), ClickType::Regular);
    }

    #[test]
    fn test_click_type_compound_meter() {
        // 6/8 is three quarter-beat ticks per bar
        let ts = TimeSignature::six_eight();
        assert_eq!(ClickType::for_tick(0, 0, &ts), ClickType::Accent);
        assert_eq!(ClickType::for_tick(2, 0, &ts), ClickType::Regular);
        assert_eq!(ClickType::for_tick(3, 0, &ts), ClickType::Accent);
        assert_eq!(ClickType::for_tick(6, 0, &ts), ClickType::Accent);
    }

    #[test]
    fn test_click_type_after_partial_bar_count_in() {
        // Four lead-in ticks in 3/4: the pattern downbeat is tick 4
        let ts = TimeSignature::three_four();
        assert_eq!(ClickType::for_tick(4, 4, &ts), ClickType::Accent);
        assert_eq!(ClickType::for_tick(5, 4, &ts), ClickType::Regular);
        assert_eq!(ClickType::for_tick(7, 4, &ts), ClickType::Accent);
        // Lead-in accents line up with the pattern's bars
        assert_eq!(ClickType::for_tick(0, 4, &ts), ClickType::Regular);
        assert_eq!(ClickType::for_tick(1, 4, &ts), ClickType::Accent);
    }

    #[test]
    fn test_click_type_degenerate_meter_does_not_panic() {
        let zero = TimeSignature {
            numerator: 0,
            denominator: 4,
        };
        assert_eq!(ClickType::for_tick(3, 0, &zero), ClickType::Accent);
    }

    #[test]
    fn test_tick_pattern_beat() {
        let tick = Tick {
            number: 5,
            scheduled_ms: 3000.0,
            fired_ms: 3002.5,
            click: ClickType::Regular,
        };
        assert_eq!(tick.pattern_beat(4), Some(1));
        assert_eq!(tick.pattern_beat(6), None);
        assert_eq!(tick.jitter_ms(), 2.5);
    }

    #[test]
    fn test_start_requires_arm() {
        let mut metronome = Metronome::new(Arc::new(ManualClock::new(0.0)), TimeSignature::default());
        let result = metronome.start(Box::new(NullTickSink), Box::new(SilentClick));
        assert_eq!(result, Err(TimingError::SchedulerNotArmed));
    }

    #[test]
    fn test_start_without_clock_is_atomic() {
        let clock = ManualClock::new(0.0);
        clock.set_available(false);
        let mut metronome = Metronome::new(Arc::new(clock.clone()), TimeSignature::default());
        metronome.arm(500.0).unwrap();

        let sink = RecordingSink::default();
        let result = metronome.start(Box::new(sink.clone()), Box::new(SilentClick));
        assert!(matches!(result, Err(TimingError::SchedulerUnavailable(_))));
        assert!(!metronome.is_running());
        assert!(sink.ticks.lock().is_empty());

        // Clock back: the same metronome starts normally
        clock.set_available(true);
        assert_eq!(
            metronome.start(Box::new(sink.clone()), Box::new(SilentClick)),
            Ok(0.0)
        );
        metronome.stop();
    }

    #[test]
    fn test_tick_zero_fires_synchronously() {
        let clock = ManualClock::new(250.0);
        let mut metronome = Metronome::new(Arc::new(clock), TimeSignature::default());
        metronome.arm(500.0).unwrap();

        let sink = RecordingSink::default();
        let anchor = metronome
            .start(Box::new(sink.clone()), Box::new(SilentClick))
            .unwrap();

        assert_eq!(anchor, 250.0);
        {
            let ticks = sink.ticks.lock();
            assert_eq!(ticks.len(), 1);
            assert_eq!(ticks[0].number, 0);
            assert_eq!(ticks[0].click, ClickType::Accent);
            assert_eq!(ticks[0].scheduled_ms, 250.0);
        }
        assert_eq!(metronome.beat_time(2), Some(1250.0));
        metronome.stop();
    }

    #[test]
    fn test_manual_clock_drives_ticks() {
        let clock = ManualClock::new(0.0);
        let mut metronome = Metronome::new(Arc::new(clock.clone()), TimeSignature::default());
        metronome.arm(100.0).unwrap();

        let sink = RecordingSink::default();
        metronome
            .start(Box::new(sink.clone()), Box::new(SilentClick))
            .unwrap();

        // Jump past three more ticks; the timer catches up without drift
        clock.set(350.0);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while sink.ticks.lock().len() < 4 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        metronome.stop();

        let ticks = sink.ticks.lock();
        assert_eq!(ticks.len(), 4);
        let scheduled: Vec<f64> = ticks.iter().map(|t| t.scheduled_ms).collect();
        assert_eq!(scheduled, vec![0.0, 100.0, 200.0, 300.0]);
        assert_eq!(metronome.state().unwrap().expected_next_tick_ms, 400.0);
    }

    #[test]
    fn test_no_ticks_after_stop() {
        let mut metronome = Metronome::new(Arc::new(MonotonicClock::new()), TimeSignature::default());
        metronome.arm(10.0).unwrap();

        let sink = RecordingSink::default();
        metronome
            .start(Box::new(sink.clone()), Box::new(SilentClick))
            .unwrap();
        thread::sleep(Duration::from_millis(60));
        metronome.stop();

        let count = sink.ticks.lock().len();
        assert!(count >= 2, "expected several ticks, got {}", count);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.ticks.lock().len(), count);

        // Idempotent
        metronome.stop();
        assert!(!metronome.is_running());
    }

    #[test]
    fn test_tick_limit() {
        let clock = ManualClock::new(0.0);
        let mut metronome = Metronome::new(Arc::new(clock.clone()), TimeSignature::default());
        metronome.arm(100.0).unwrap();
        metronome.set_tick_limit(Some(3));

        let sink = RecordingSink::default();
        metronome
            .start(Box::new(sink.clone()), Box::new(SilentClick))
            .unwrap();

        clock.set(1000.0);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while metronome.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(!metronome.is_running());
        assert_eq!(sink.ticks.lock().len(), 3);
        metronome.stop();
    }

    #[test]
    fn test_count_in_accents_pattern_downbeat() {
        let clock = ManualClock::new(0.0);
        let mut metronome = Metronome::new(Arc::new(clock.clone()), TimeSignature::three_four());
        metronome.arm(100.0).unwrap();
        metronome.set_count_in(4);
        metronome.set_tick_limit(Some(7));

        let sink = RecordingSink::default();
        metronome
            .start(Box::new(sink.clone()), Box::new(SilentClick))
            .unwrap();

        clock.set(1000.0);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while metronome.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        metronome.stop();

        let clicks: Vec<ClickType> = sink.ticks.lock().iter().map(|t| t.click).collect();
        assert_eq!(clicks.len(), 7);
        assert_eq!(clicks[4], ClickType::Accent);
        assert_eq!(clicks[5], ClickType::Regular);
        assert_eq!(clicks[6], ClickType::Regular);
        assert_eq!(clicks[1], ClickType::Accent);
    }

    #[test]
    fn test_start_at_uses_given_anchor() {
        let clock = ManualClock::new(900.0);
        let mut metronome = Metronome::new(Arc::new(clock), TimeSignature::default());
        metronome.arm(500.0).unwrap();

        let anchor = metronome
            .start_at(Some(800.0), Box::new(NullTickSink), Box::new(SilentClick))
            .unwrap();
        assert_eq!(anchor, 800.0);
        assert_eq!(metronome.beat_time(1), Some(1300.0));
        metronome.stop();

        metronome.arm(500.0).unwrap();
        let result = metronome.start_at(None, Box::new(NullTickSink), Box::new(SilentClick));
        assert!(matches!(result, Err(TimingError::SchedulerUnavailable(_))));
        assert!(!metronome.is_running());
    }

    #[test]
    fn test_click_failures_do_not_stop_scheduler() {
        let clock = ManualClock::new(0.0);
        let mut metronome = Metronome::new(Arc::new(clock.clone()), TimeSignature::default());
        metronome.arm(100.0).unwrap();

        let attempts = Arc::new(Mutex::new(0));
        let sink = RecordingSink::default();
        metronome
            .start(
                Box::new(sink.clone()),
                Box::new(FailingClick {
                    attempts: Arc::clone(&attempts),
                }),
            )
            .unwrap();

        clock.set(200.0);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while sink.ticks.lock().len() < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        metronome.stop();

        assert_eq!(sink.ticks.lock().len(), 3);
        assert_eq!(*attempts.lock(), 3);
    }

    #[test]
    fn test_disabled_clicks_still_tick() {
        let attempts = Arc::new(Mutex::new(0));
        let mut metronome = Metronome::new(Arc::new(ManualClock::new(0.0)), TimeSignature::default());
        metronome.arm(100.0).unwrap();
        metronome.set_enabled(false);
        assert!(!metronome.is_enabled());

        let sink = RecordingSink::default();
        metronome
            .start(
                Box::new(sink.clone()),
                Box::new(FailingClick {
                    attempts: Arc::clone(&attempts),
                }),
            )
            .unwrap();
        metronome.stop();

        assert_eq!(sink.ticks.lock().len(), 1);
        assert_eq!(*attempts.lock(), 0);
    }
}
