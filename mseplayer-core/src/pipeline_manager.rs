//! Playback state machine and media clock
//!
//! The [`PipelineManager`] is the single source of truth for whether the
//! session is playing, and for the current media time. Media time only
//! advances while the state is [`PlaybackState::Playing`]; every other state
//! freezes it at the last sync point.

use crate::clock::Clock;
use crate::state::PlaybackState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Invoked with the new state on every transition, under the manager's lock.
///
/// Implementations must not call back into the manager.
pub type StatusCallback = Box<dyn Fn(PlaybackState) + Send + Sync>;

/// Invoked once per seek, after the manager's lock has been released.
pub type SeekCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
struct ManagerState {
    status: PlaybackState,
    /// Media time at the last sync point
    prev_media_time: f64,
    /// Wall-clock time at the last sync point
    prev_wall_time: f64,
    /// NaN while unknown
    duration: f64,
    rate: f64,
    will_play: bool,
    stalled: bool,
}

impl ManagerState {
    fn initial(now: f64) -> Self {
        Self {
            status: PlaybackState::Initializing,
            prev_media_time: 0.0,
            prev_wall_time: now,
            duration: f64::NAN,
            rate: 1.0,
            will_play: false,
            stalled: true,
        }
    }

    fn clamp_to_duration(&self, time: f64) -> f64 {
        let time = time.max(0.0);
        if self.duration.is_finite() {
            time.min(self.duration)
        } else {
            time
        }
    }

    fn current_time(&self, now: f64) -> f64 {
        if self.status == PlaybackState::Playing {
            let elapsed = now - self.prev_wall_time;
            self.clamp_to_duration(self.prev_media_time + elapsed * self.rate)
        } else {
            self.prev_media_time
        }
    }

    /// Freeze the running time so the state or rate can change
    fn sync_point(&mut self, now: f64) {
        self.prev_media_time = self.current_time(now);
        self.prev_wall_time = now;
    }
}

/// Owns the playback state machine, the playback clock and seek bookkeeping
pub struct PipelineManager {
    state: Mutex<ManagerState>,
    clock: Arc<dyn Clock>,
    on_status_changed: StatusCallback,
    on_seek: SeekCallback,
}

impl PipelineManager {
    /// Create a manager in the `Initializing` state
    pub fn new(
        on_status_changed: StatusCallback,
        on_seek: SeekCallback,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(ManagerState::initial(now)),
            clock,
            on_status_changed,
            on_seek,
        }
    }

    /// Return to `Initializing` with time 0, unknown duration and rate 1
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let old = state.status;
        *state = ManagerState::initial(now);
        debug!("Pipeline reset from {}", old);
        if old != PlaybackState::Initializing {
            (self.on_status_changed)(PlaybackState::Initializing);
        }
    }

    /// Metadata is loaded; leave `Initializing`
    pub fn done_initializing(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.status != PlaybackState::Initializing {
            return;
        }
        state.prev_wall_time = now;
        let next = if state.will_play {
            PlaybackState::Buffering
        } else {
            PlaybackState::Paused
        };
        info!(
            "Pipeline initialized at {:.3}s, entering {}",
            state.prev_media_time, next
        );
        self.change_status(&mut state, next);
    }

    /// Current media time in seconds
    pub fn current_time(&self) -> f64 {
        let now = self.clock.now();
        self.state.lock().current_time(now)
    }

    /// Seek to `time`.
    ///
    /// While initializing this only records the start time. Otherwise the
    /// time is clamped to the duration, the state becomes `Seeking`, and the
    /// seek callback fires once.
    pub fn set_current_time(&self, time: f64) {
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            match state.status {
                PlaybackState::Initializing => {
                    state.prev_media_time = time.max(0.0);
                    state.prev_wall_time = now;
                    return;
                }
                PlaybackState::Errored | PlaybackState::Detached => return,
                _ => {}
            }

            state.prev_media_time = state.clamp_to_duration(time);
            state.prev_wall_time = now;
            debug!("Seeking to {:.3}s", state.prev_media_time);
            self.change_status(&mut state, PlaybackState::Seeking);
        }
        (self.on_seek)();
    }

    /// Duration in seconds, NaN when unknown
    pub fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    /// Set the duration; the current time is clamped to it
    pub fn set_duration(&self, duration: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.sync_point(now);
        state.duration = duration;
        state.prev_media_time = state.clamp_to_duration(state.prev_media_time);
    }

    /// Playback rate, 1.0 is normal speed
    pub fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// Change the playback rate without moving the play head
    pub fn set_playback_rate(&self, rate: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.sync_point(now);
        state.rate = rate;
    }

    /// Current playback state
    pub fn playback_state(&self) -> PlaybackState {
        self.state.lock().status
    }

    /// Request playback
    pub fn play(&self) {
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            match state.status {
                PlaybackState::Errored | PlaybackState::Detached => return,
                PlaybackState::Paused => {
                    state.will_play = true;
                    state.sync_point(now);
                    let next = if state.stalled {
                        PlaybackState::Buffering
                    } else {
                        PlaybackState::Playing
                    };
                    self.change_status(&mut state, next);
                    return;
                }
                PlaybackState::Ended => {
                    state.will_play = true;
                    state.prev_media_time = 0.0;
                    state.prev_wall_time = now;
                    debug!("Restarting playback from the beginning");
                    self.change_status(&mut state, PlaybackState::Seeking);
                }
                _ => {
                    state.will_play = true;
                    return;
                }
            }
        }
        (self.on_seek)();
    }

    /// Request a pause
    pub fn pause(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        match state.status {
            PlaybackState::Errored | PlaybackState::Detached => {}
            PlaybackState::Playing | PlaybackState::Buffering => {
                state.will_play = false;
                state.sync_point(now);
                self.change_status(&mut state, PlaybackState::Paused);
            }
            _ => state.will_play = false,
        }
    }

    /// Enough data is buffered to play
    pub fn can_play(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.stalled = false;
        match state.status {
            PlaybackState::Buffering => {
                state.sync_point(now);
                self.change_status(&mut state, PlaybackState::Playing);
            }
            PlaybackState::Seeking => {
                state.sync_point(now);
                let next = if state.will_play {
                    PlaybackState::Playing
                } else {
                    PlaybackState::Paused
                };
                self.change_status(&mut state, next);
            }
            _ => {}
        }
    }

    /// Not enough data is buffered to keep playing
    pub fn stalled(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.stalled = true;
        if state.status == PlaybackState::Playing {
            state.sync_point(now);
            debug!("Playback stalled at {:.3}s", state.prev_media_time);
            self.change_status(&mut state, PlaybackState::Buffering);
        }
    }

    /// The play head reached the end of the media
    pub fn on_ended(&self) {
        let mut state = self.state.lock();
        match state.status {
            PlaybackState::Playing | PlaybackState::Buffering | PlaybackState::Seeking => {
                state.prev_wall_time = self.clock.now();
                if state.duration.is_finite() {
                    state.prev_media_time = state.duration;
                }
                info!("Playback ended at {:.3}s", state.prev_media_time);
                self.change_status(&mut state, PlaybackState::Ended);
            }
            _ => {}
        }
    }

    /// A fatal error occurred
    pub fn on_error(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return;
        }
        state.sync_point(now);
        warn!("Pipeline entering errored state from {}", state.status);
        self.change_status(&mut state, PlaybackState::Errored);
    }

    /// The media source was detached
    pub fn on_detach(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.status == PlaybackState::Detached {
            return;
        }
        state.sync_point(now);
        self.change_status(&mut state, PlaybackState::Detached);
    }

    /// The decoder is waiting for a key
    pub fn on_waiting_for_key(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        match state.status {
            PlaybackState::Initializing
            | PlaybackState::WaitingForKey
            | PlaybackState::Errored
            | PlaybackState::Detached => {}
            _ => {
                state.sync_point(now);
                self.change_status(&mut state, PlaybackState::WaitingForKey);
            }
        }
    }

    /// A key arrived and decoding resumed
    pub fn on_key_available(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.status != PlaybackState::WaitingForKey {
            return;
        }
        state.sync_point(now);
        let next = match (state.will_play, state.stalled) {
            (true, false) => PlaybackState::Playing,
            (true, true) => PlaybackState::Buffering,
            (false, _) => PlaybackState::Paused,
        };
        self.change_status(&mut state, next);
    }

    fn change_status(&self, state: &mut ManagerState, next: PlaybackState) {
        if state.status == next {
            return;
        }
        debug!("Playback state {} -> {}", state.status, next);
        state.status = next;
        (self.on_status_changed)(next);
    }
}

impl fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PipelineManager")
            .field("status", &state.status)
            .field("duration", &state.duration)
            .field("rate", &state.rate)
            .field("will_play", &state.will_play)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    struct Harness {
        manager: PipelineManager,
        clock: Arc<ManualClock>,
        states: Arc<Mutex<Vec<PlaybackState>>>,
        seeks: Arc<Mutex<usize>>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(100.0));
        let states = Arc::new(Mutex::new(Vec::new()));
        let seeks = Arc::new(Mutex::new(0));
        let states_cb = states.clone();
        let seeks_cb = seeks.clone();
        let manager = PipelineManager::new(
            Box::new(move |state| states_cb.lock().push(state)),
            Box::new(move || *seeks_cb.lock() += 1),
            clock.clone(),
        );
        Harness {
            manager,
            clock,
            states,
            seeks,
        }
    }

    #[test]
    fn test_initial_state() {
        let h = harness();
        assert_eq!(h.manager.playback_state(), PlaybackState::Initializing);
        assert_eq!(h.manager.current_time(), 0.0);
        assert!(h.manager.duration().is_nan());
        assert_eq!(h.manager.playback_rate(), 1.0);
    }

    #[test]
    fn test_play_before_initialized_buffers_then_plays() {
        let h = harness();
        h.manager.play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Initializing);

        h.manager.done_initializing();
        assert_eq!(h.manager.playback_state(), PlaybackState::Buffering);

        h.manager.can_play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Playing);
        assert_eq!(
            *h.states.lock(),
            vec![PlaybackState::Buffering, PlaybackState::Playing]
        );
    }

    #[test]
    fn test_time_advances_only_while_playing() {
        let h = harness();
        h.manager.set_duration(30.0);
        h.manager.done_initializing();
        h.clock.advance(5.0);
        assert_eq!(h.manager.current_time(), 0.0);

        h.manager.can_play();
        h.manager.play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Playing);
        h.clock.advance(2.0);
        assert_eq!(h.manager.current_time(), 2.0);

        h.manager.pause();
        h.clock.advance(3.0);
        assert_eq!(h.manager.current_time(), 2.0);
    }

    #[test]
    fn test_rate_change_keeps_play_head() {
        let h = harness();
        h.manager.done_initializing();
        h.manager.can_play();
        h.manager.play();
        h.clock.advance(1.0);
        h.manager.set_playback_rate(2.0);
        assert_eq!(h.manager.current_time(), 1.0);
        h.clock.advance(1.0);
        assert_eq!(h.manager.current_time(), 3.0);
    }

    #[test]
    fn test_seek_while_playing() {
        let h = harness();
        h.manager.set_duration(30.0);
        h.manager.done_initializing();
        h.manager.can_play();
        h.manager.play();
        h.states.lock().clear();

        h.manager.set_current_time(12.5);
        assert_eq!(h.manager.playback_state(), PlaybackState::Seeking);
        assert_eq!(h.manager.current_time(), 12.5);
        assert_eq!(*h.seeks.lock(), 1);
        assert_eq!(*h.states.lock(), vec![PlaybackState::Seeking]);

        // A second seek while seeking fires the seek callback but no new state
        h.manager.set_current_time(14.0);
        assert_eq!(*h.seeks.lock(), 2);
        assert_eq!(h.states.lock().len(), 1);

        h.manager.can_play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn test_seek_is_clamped_to_duration() {
        let h = harness();
        h.manager.set_duration(10.0);
        h.manager.done_initializing();
        h.manager.set_current_time(25.0);
        assert_eq!(h.manager.current_time(), 10.0);
        h.manager.set_current_time(-3.0);
        assert_eq!(h.manager.current_time(), 0.0);
    }

    #[test]
    fn test_seek_during_initializing_only_stores_time() {
        let h = harness();
        h.manager.set_current_time(7.0);
        assert_eq!(h.manager.current_time(), 7.0);
        assert_eq!(*h.seeks.lock(), 0);
        assert!(h.states.lock().is_empty());
    }

    #[test]
    fn test_stall_and_resume() {
        let h = harness();
        h.manager.done_initializing();
        h.manager.can_play();
        h.manager.play();
        h.manager.stalled();
        assert_eq!(h.manager.playback_state(), PlaybackState::Buffering);
        h.manager.can_play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn test_play_while_stalled_buffers() {
        let h = harness();
        h.manager.done_initializing();
        h.manager.stalled();
        h.manager.play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Buffering);
    }

    #[test]
    fn test_ended_then_play_restarts() {
        let h = harness();
        h.manager.set_duration(4.0);
        h.manager.done_initializing();
        h.manager.can_play();
        h.manager.play();
        h.clock.advance(10.0);
        assert_eq!(h.manager.current_time(), 4.0);

        h.manager.on_ended();
        assert_eq!(h.manager.playback_state(), PlaybackState::Ended);
        assert_eq!(h.manager.current_time(), 4.0);

        h.manager.play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Seeking);
        assert_eq!(h.manager.current_time(), 0.0);
        assert_eq!(*h.seeks.lock(), 1);
        h.manager.can_play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn test_terminal_states_ignore_requests() {
        let h = harness();
        h.manager.done_initializing();
        h.manager.on_error();
        assert_eq!(h.manager.playback_state(), PlaybackState::Errored);

        h.manager.play();
        h.manager.set_current_time(3.0);
        h.manager.can_play();
        assert_eq!(h.manager.playback_state(), PlaybackState::Errored);
        assert_eq!(*h.seeks.lock(), 0);

        h.manager.reset();
        assert_eq!(h.manager.playback_state(), PlaybackState::Initializing);
    }

    #[test]
    fn test_waiting_for_key_returns_to_prior_intent() {
        let h = harness();
        h.manager.done_initializing();
        h.manager.can_play();
        h.manager.play();
        h.manager.on_waiting_for_key();
        assert_eq!(h.manager.playback_state(), PlaybackState::WaitingForKey);
        h.manager.on_key_available();
        assert_eq!(h.manager.playback_state(), PlaybackState::Playing);

        h.manager.pause();
        h.manager.on_waiting_for_key();
        h.manager.on_key_available();
        assert_eq!(h.manager.playback_state(), PlaybackState::Paused);
    }

    #[test]
    fn test_detach_is_terminal() {
        let h = harness();
        h.manager.done_initializing();
        h.manager.on_detach();
        assert_eq!(h.manager.playback_state(), PlaybackState::Detached);
        h.manager.on_error();
        assert_eq!(h.manager.playback_state(), PlaybackState::Detached);
    }
}
