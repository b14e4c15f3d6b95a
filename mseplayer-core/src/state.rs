//! Playback and ready state enumerations shared by every layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback state machine owned by the pipeline manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Waiting for metadata to load
    Initializing,
    /// Media time is advancing
    Playing,
    /// Paused by request
    Paused,
    /// A seek is in progress
    Seeking,
    /// Play was requested but there is not enough data ahead of the play head
    Buffering,
    /// The decoder needs a key that has not arrived yet
    WaitingForKey,
    /// A fatal error occurred; only `reset` leaves this state
    Errored,
    /// The play head reached the end of the media
    Ended,
    /// The media source was detached; only `reset` leaves this state
    Detached,
}

impl PlaybackState {
    /// Errored and Detached ignore every request until reset
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Errored | PlaybackState::Detached)
    }

    /// Get the state name as a string
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Initializing => "initializing",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Buffering => "buffering",
            PlaybackState::WaitingForKey => "waiting_for_key",
            PlaybackState::Errored => "errored",
            PlaybackState::Ended => "ended",
            PlaybackState::Detached => "detached",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTML-media-style readiness ladder.
///
/// Variants are ordered, so `ready >= ReadyState::HaveFutureData` reads as
/// "at least future data".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ReadyState {
    /// No media source is attached
    NotAttached,
    /// Attached, but nothing is known yet
    HaveNothing,
    /// Metadata loaded, no data at the play head
    HaveMetadata,
    /// Data at the play head, but very little beyond it
    HaveCurrentData,
    /// Some data ahead of the play head
    HaveFutureData,
    /// Enough data ahead to play through
    HaveEnoughData,
}

impl ReadyState {
    /// Get the state name as a string
    pub fn as_str(self) -> &'static str {
        match self {
            ReadyState::NotAttached => "not_attached",
            ReadyState::HaveNothing => "have_nothing",
            ReadyState::HaveMetadata => "have_metadata",
            ReadyState::HaveCurrentData => "have_current_data",
            ReadyState::HaveFutureData => "have_future_data",
            ReadyState::HaveEnoughData => "have_enough_data",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
