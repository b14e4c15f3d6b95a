//! Player events for async consumers

use crate::clients::{Client, ClientId, ClientList};
use futures::Stream;
use mseplayer_core::{PlaybackState, ReadyState};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Everything a [`Client`] can be told, as a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// An MSE session was attached
    AttachMse,
    /// The session was detached
    Detach,
    /// Playback resumed from a pause
    Play,
    /// A seek started
    Seeking,
    /// Playback failed
    Error {
        /// Decoder message
        message: String,
    },
    /// Decoding is blocked on a missing key
    WaitingForKey,
    /// The playback state changed
    PlaybackStateChanged {
        /// Previous state
        old: PlaybackState,
        /// New state
        new: PlaybackState,
    },
    /// The ready state changed
    ReadyStateChanged {
        /// Previous state
        old: ReadyState,
        /// New state
        new: ReadyState,
    },
}

impl PlayerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::AttachMse => "attach_mse",
            PlayerEvent::Detach => "detach",
            PlayerEvent::Play => "play",
            PlayerEvent::Seeking => "seeking",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::WaitingForKey => "waiting_for_key",
            PlayerEvent::PlaybackStateChanged { .. } => "playback_state_changed",
            PlayerEvent::ReadyStateChanged { .. } => "ready_state_changed",
        }
    }

    /// Check if this is a state-change event
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            PlayerEvent::PlaybackStateChanged { .. } | PlayerEvent::ReadyStateChanged { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, PlayerEvent::Error { .. })
    }

    /// Call the matching [`Client`] method
    pub fn deliver(&self, client: &dyn Client) {
        match self {
            PlayerEvent::AttachMse => client.on_attach_mse(),
            PlayerEvent::Detach => client.on_detach(),
            PlayerEvent::Play => client.on_play(),
            PlayerEvent::Seeking => client.on_seeking(),
            PlayerEvent::Error { message } => client.on_error(message),
            PlayerEvent::WaitingForKey => client.on_waiting_for_key(),
            PlayerEvent::PlaybackStateChanged { old, new } => {
                client.on_playback_state_changed(*old, *new)
            }
            PlayerEvent::ReadyStateChanged { old, new } => client.on_ready_state_changed(*old, *new),
        }
    }
}

/// Client that forwards every notification into a channel
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<PlayerEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: PlayerEvent) {
        // The stream removes this client when dropped; until then a closed
        // receiver only means the consumer stopped reading.
        let _ = self.tx.send(event);
    }
}

impl Client for EventSink {
    fn on_attach_mse(&self) {
        self.send(PlayerEvent::AttachMse);
    }

    fn on_detach(&self) {
        self.send(PlayerEvent::Detach);
    }

    fn on_play(&self) {
        self.send(PlayerEvent::Play);
    }

    fn on_seeking(&self) {
        self.send(PlayerEvent::Seeking);
    }

    fn on_error(&self, message: &str) {
        self.send(PlayerEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_waiting_for_key(&self) {
        self.send(PlayerEvent::WaitingForKey);
    }

    fn on_playback_state_changed(&self, old: PlaybackState, new: PlaybackState) {
        self.send(PlayerEvent::PlaybackStateChanged { old, new });
    }

    fn on_ready_state_changed(&self, old: ReadyState, new: ReadyState) {
        self.send(PlayerEvent::ReadyStateChanged { old, new });
    }
}

/// Stream of player events for async iteration
///
/// Events arrive in the order clients observe them. Dropping the stream
/// unregisters it from the player.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<PlayerEvent>,
    registration: Option<(ClientId, Weak<ClientList>)>,
}

impl EventStream {
    /// Create an event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<PlayerEvent>) -> Self {
        Self {
            receiver,
            registration: None,
        }
    }

    pub(crate) fn registered(
        receiver: mpsc::UnboundedReceiver<PlayerEvent>,
        id: ClientId,
        clients: Weak<ClientList>,
    ) -> Self {
        Self {
            receiver,
            registration: Some((id, clients)),
        }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<PlayerEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<PlayerEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Drain every event already queued
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop receiving; queued events can still be read
    pub fn close(&mut self) {
        self.receiver.close();
        self.unregister();
    }

    fn unregister(&mut self) {
        if let Some((id, clients)) = self.registration.take() {
            if let Some(clients) = clients.upgrade() {
                clients.remove(id);
                debug!("Event stream {} unregistered", id);
            }
        }
    }
}

impl Stream for EventStream {
    type Item = PlayerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PlayerEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.unregister();
    }
}
