// Terminal demo: plays one pattern against a simulated player and prints the report
// Run with: cargo run -- [config.ron|config.json] [bpm]

use rhythm_trainer::sequencer::metronome::SilentClick;
use rhythm_trainer::{
    Clock, CumulativeStats, EngineConfig, InputSource, LatencyCompensator, MonotonicClock,
    NoteElement, NoteValue, Pattern, Session, Tempo,
};
use ringbuf::traits::Consumer;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Human timing error of the simulated player, cycled per beat (ms)
const PLAYER_JITTER_MS: [f64; 8] = [12.0, -25.0, 40.0, 5.0, -60.0, 18.0, 95.0, -8.0];

fn demo_pattern() -> Pattern {
    let q = NoteElement::note(NoteValue::Quarter);
    let e = NoteElement::note(NoteValue::Eighth);
    Pattern::from_elements(
        "Demo groove",
        vec![
            vec![q, q, NoteElement::rest(NoteValue::Quarter), q],
            vec![e, e, q, NoteElement::note(NoteValue::Half)],
        ],
    )
}

fn main() {
    env_logger::init();

    println!("=== Rhythm Trainer ===\n");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.first() {
        Some(path) => EngineConfig::load(path),
        None => match EngineConfig::default_path() {
            Some(path) => EngineConfig::load_or_default(path),
            None => Ok(EngineConfig::default()),
        },
    };
    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };
    config.session.count_in_beats = config.session.count_in_beats.max(4);

    let bpm = args.get(1).and_then(|s| s.parse::<f64>().ok()).unwrap_or(100.0);
    let Some(tempo) = Tempo::try_new(bpm) else {
        eprintln!("ERROR: tempo must be between {} and {} BPM", Tempo::MIN_BPM, Tempo::MAX_BPM);
        return;
    };

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let compensator =
        LatencyCompensator::for_environment(config.latency.clone(), std::env::consts::OS)
            .into_shared();
    println!(
        "Latency estimate for '{}': {} ms",
        std::env::consts::OS,
        compensator.lock().base_offset_ms()
    );

    let pattern = demo_pattern();
    let mut session = match Session::new(
        config,
        &pattern,
        tempo,
        Arc::clone(&clock),
        Arc::clone(&compensator),
    ) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("ERROR: session could not start: {}", e);
            return;
        }
    };
    println!(
        "Pattern '{}' at {}: {} scoring beats\n",
        pattern.name,
        tempo,
        session.beats().len()
    );

    let (anchor, mut ticks) = match session.start_with_tick_channel(Box::new(SilentClick)) {
        Ok(started) => started,
        Err(e) => {
            eprintln!("ERROR: session could not start: {}", e);
            return;
        }
    };

    // Simulated player: taps every sounded beat with a bit of human error
    let interval = tempo.interval_ms();
    let plan: Vec<(f64, f64)> = session
        .beats()
        .iter()
        .filter(|beat| beat.has_onset())
        .enumerate()
        .map(|(n, beat)| {
            let expected = compensator.lock().compensate(anchor + beat.index as f64 * interval);
            let press = expected + PLAYER_JITTER_MS[n % PLAYER_JITTER_MS.len()];
            (press, press + beat.hold_target_ms * 0.8)
        })
        .collect();
    let taps = session.tap_handle();
    let player_clock = Arc::clone(&clock);
    let player = thread::spawn(move || {
        for (press, release) in plan {
            sleep_until(player_clock.as_ref(), press);
            taps.press(InputSource::PRIMARY);
            sleep_until(player_clock.as_ref(), release);
            taps.release(InputSource::PRIMARY);
        }
    });

    let count_in = session.config().session.count_in_beats as u64;
    while !session.is_complete() {
        while let Some(tick) = ticks.try_pop() {
            match tick.pattern_beat(count_in) {
                Some(beat) => println!("  beat {:>2}  ({:?}, jitter {:+.2} ms)", beat, tick.click, tick.jitter_ms()),
                None => println!("  count {}", tick.number + 1),
            }
        }
        thread::sleep(Duration::from_millis(5));
    }
    let _ = player.join();

    let outcome = match session.finish() {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };

    println!("\n=== Results ===");
    if let Some(report) = outcome.primary() {
        for result in &report.results {
            let error = result
                .timing_error_ms
                .map(|e| format!("{:+.0} ms", e))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  beat {:>2}: {:<8} error {:>8}  timing {:>5.1}  duration {:>5.1}",
                result.beat_index,
                result.classification.to_string(),
                error,
                result.timing_score,
                result.duration_score
            );
        }
        println!();
        for line in report.stats.feedback() {
            println!("{}", line);
        }
    }
    println!(
        "Latency adjustment: {:+} ms (adaptive offset now {} ms)",
        outcome.latency_adjustment_ms,
        compensator.lock().adaptive_offset_ms()
    );

    let mut history = CumulativeStats::new();
    outcome.fold_into(&mut history);
    match serde_json::to_string_pretty(&history) {
        Ok(json) => println!("\nPractice history:\n{}", json),
        Err(e) => eprintln!("ERROR: {}", e),
    }
}

fn sleep_until(clock: &dyn Clock, target_ms: f64) {
    if let Some(now) = clock.now_ms() {
        if target_ms > now {
            thread::sleep(Duration::from_secs_f64((target_ms - now) / 1000.0));
        }
    }
}
