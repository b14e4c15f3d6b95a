//! Integration tests for the pipeline manager and monitor working together

use mseplayer_core::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

struct Session {
    clock: Arc<ManualClock>,
    pipeline: Arc<PipelineManager>,
    monitor: PipelineMonitor,
    ranges: Arc<Mutex<Vec<BufferedRange>>>,
    states: Arc<Mutex<Vec<PlaybackState>>>,
    ready: Arc<Mutex<Vec<ReadyState>>>,
    seeks: Arc<Mutex<usize>>,
}

fn session(config: MonitorConfig) -> Session {
    let clock = Arc::new(ManualClock::new(0.0));
    let states = Arc::new(Mutex::new(Vec::new()));
    let seeks = Arc::new(Mutex::new(0));
    let ranges = Arc::new(Mutex::new(Vec::new()));
    let ready = Arc::new(Mutex::new(Vec::new()));

    let states_cb = states.clone();
    let seeks_cb = seeks.clone();
    let pipeline = Arc::new(PipelineManager::new(
        Box::new(move |state| states_cb.lock().push(state)),
        Box::new(move || *seeks_cb.lock() += 1),
        clock.clone(),
    ));

    let ranges_cb = ranges.clone();
    let ready_cb = ready.clone();
    let monitor = PipelineMonitor::new(
        Box::new(move || ranges_cb.lock().clone()),
        Box::new(move |state| ready_cb.lock().push(state)),
        clock.clone(),
        pipeline.clone(),
        config,
    );

    Session {
        clock,
        pipeline,
        monitor,
        ranges,
        states,
        ready,
        seeks,
    }
}

fn set_ranges(session: &Session, ranges: &[(f64, f64)]) {
    *session.ranges.lock() = ranges
        .iter()
        .map(|&(start, end)| BufferedRange::new(start, end))
        .collect();
}

#[test]
fn test_play_before_data_starts_once_buffered() {
    let s = session(MonitorConfig::default());
    s.pipeline.play();
    s.pipeline.set_duration(30.0);
    s.pipeline.done_initializing();
    s.monitor.poll();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Buffering);

    set_ranges(&s, &[(0.0, 1.0)]);
    s.monitor.poll();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Buffering);

    set_ranges(&s, &[(0.0, 8.0)]);
    s.monitor.poll();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Playing);
    assert_eq!(
        *s.states.lock(),
        vec![PlaybackState::Buffering, PlaybackState::Playing]
    );
}

#[test]
fn test_readiness_tracks_buffer_growth_and_shrink() {
    let s = session(MonitorConfig::default());
    s.pipeline.done_initializing();

    let mut last = ReadyState::NotAttached;
    for end in [0.0, 0.3, 1.0, 1.5, 3.0, 6.0] {
        set_ranges(&s, &[(0.0, end)]);
        s.monitor.poll();
        let ready = s.monitor.ready_state();
        assert!(ready >= last, "{} regressed to {} at end {}", last, ready, end);
        last = ready;
    }
    assert_eq!(last, ReadyState::HaveEnoughData);

    set_ranges(&s, &[(0.0, 0.3)]);
    s.monitor.poll();
    assert_eq!(s.monitor.ready_state(), ReadyState::HaveCurrentData);

    assert_eq!(
        *s.ready.lock(),
        vec![
            ReadyState::HaveMetadata,
            ReadyState::HaveCurrentData,
            ReadyState::HaveFutureData,
            ReadyState::HaveEnoughData,
            ReadyState::HaveCurrentData,
        ]
    );
}

#[test]
fn test_playback_runs_until_buffer_is_exhausted() {
    let s = session(MonitorConfig::default());
    s.pipeline.done_initializing();
    set_ranges(&s, &[(0.0, 4.0)]);
    s.monitor.poll();
    s.pipeline.play();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Playing);

    s.clock.advance(1.0);
    s.monitor.poll();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Playing);

    s.clock.advance(1.5);
    s.monitor.poll();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Buffering);
    assert_eq!(s.pipeline.current_time(), 2.5);

    // Time is frozen while buffering
    s.clock.advance(10.0);
    assert_eq!(s.pipeline.current_time(), 2.5);

    set_ranges(&s, &[(0.0, 10.0)]);
    s.monitor.poll();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Playing);
}

#[test]
fn test_seek_while_playing_settles_without_replay() {
    let s = session(MonitorConfig::default());
    s.pipeline.set_duration(30.0);
    s.pipeline.done_initializing();
    set_ranges(&s, &[(0.0, 30.0)]);
    s.monitor.poll();
    s.pipeline.play();
    s.states.lock().clear();

    s.pipeline.set_current_time(12.5);
    assert_eq!(s.pipeline.current_time(), 12.5);
    assert_eq!(*s.seeks.lock(), 1);

    s.monitor.poll();
    assert_eq!(
        *s.states.lock(),
        vec![PlaybackState::Seeking, PlaybackState::Playing]
    );
}

#[test]
fn test_playing_to_end() {
    let s = session(MonitorConfig::default());
    s.pipeline.set_duration(5.0);
    s.pipeline.done_initializing();
    set_ranges(&s, &[(0.0, 5.0)]);
    s.monitor.poll();
    s.pipeline.play();

    s.clock.advance(6.0);
    s.monitor.poll();
    assert_eq!(s.pipeline.playback_state(), PlaybackState::Ended);
    assert_eq!(s.pipeline.current_time(), 5.0);
    assert_eq!(s.monitor.ready_state(), ReadyState::HaveEnoughData);
}

#[test]
fn test_monitor_thread_drives_pipeline() {
    let clock = Arc::new(SystemClock::new());
    let pipeline = Arc::new(PipelineManager::new(
        Box::new(|_| {}),
        Box::new(|| {}),
        clock.clone(),
    ));
    let monitor = PipelineMonitor::new(
        Box::new(|| vec![BufferedRange::new(0.0, 100.0)]),
        Box::new(|_| {}),
        clock,
        pipeline.clone(),
        MonitorConfig::low_latency(),
    );

    pipeline.play();
    pipeline.done_initializing();
    assert_ok!(monitor.start());

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.playback_state() != PlaybackState::Playing && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    monitor.stop();

    assert_eq!(pipeline.playback_state(), PlaybackState::Playing);
    assert_eq!(monitor.ready_state(), ReadyState::HaveEnoughData);
    assert!(!monitor.is_running());
}

#[test]
fn test_monitor_config_from_json() {
    let config: MonitorConfig =
        serde_json::from_str(r#"{ "future_data_seconds": 0.25, "enough_data_seconds": 1.0 }"#)
            .unwrap();
    assert_eq!(config.future_data_seconds, 0.25);
    assert_eq!(config.gap_tolerance, DEFAULT_GAP_TOLERANCE);
    assert_ok!(config.validate());

    let broken = MonitorConfig {
        gap_tolerance: -1.0,
        ..MonitorConfig::default()
    };
    let err = assert_err!(broken.validate());
    assert_eq!(err.category(), ErrorCategory::Configuration);
}
