//! Client observers and ordered notification delivery

use crate::event::PlayerEvent;
use mseplayer_core::{PlaybackState, ReadyState};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Observer of player notifications. Every method defaults to doing nothing.
///
/// Methods are called with no player lock held and may call back into the
/// player.
pub trait Client: Send + Sync {
    /// An MSE session was attached
    fn on_attach_mse(&self) {}

    /// The session was detached
    fn on_detach(&self) {}

    /// Playback resumed from a pause
    fn on_play(&self) {}

    /// A seek started
    fn on_seeking(&self) {}

    /// Playback failed
    fn on_error(&self, _message: &str) {}

    /// Decoding is blocked on a missing key
    fn on_waiting_for_key(&self) {}

    /// The playback state changed
    fn on_playback_state_changed(&self, _old: PlaybackState, _new: PlaybackState) {}

    /// The ready state changed
    fn on_ready_state_changed(&self, _old: ReadyState, _new: ReadyState) {}
}

/// Handle returned by [`ClientList::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered clients, notified in registration order
#[derive(Default)]
pub struct ClientList {
    clients: RwLock<Vec<(ClientId, Arc<dyn Client>)>>,
}

impl ClientList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client
    pub fn add(&self, client: Arc<dyn Client>) -> ClientId {
        let id = ClientId::new();
        self.clients.write().push((id, client));
        id
    }

    /// Unregister a client; false if it was not registered
    pub fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|(client_id, _)| *client_id != id);
        clients.len() != before
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// True when nobody is listening
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Deliver `event` to every client registered right now
    pub fn dispatch(&self, event: &PlayerEvent) {
        let clients: Vec<Arc<dyn Client>> = self
            .clients
            .read()
            .iter()
            .map(|(_, client)| client.clone())
            .collect();
        for client in clients {
            event.deliver(client.as_ref());
        }
    }
}

impl fmt::Debug for ClientList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientList")
            .field("clients", &self.len())
            .finish()
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PlayerEvent>,
    draining: bool,
}

/// FIFO of notifications computed under the player lock and delivered after
/// it is released.
///
/// Only one thread drains at a time. A thread that pushes while another is
/// draining (including a client re-entering the player from a callback) leaves
/// its events for the active drainer, so delivery order always matches push
/// order.
#[derive(Default)]
pub struct NotificationQueue {
    state: Mutex<QueueState>,
}

impl NotificationQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&self, event: PlayerEvent) {
        self.state.lock().pending.push_back(event);
    }

    /// Number of undelivered events
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Deliver pending events, unless another thread already is
    pub fn drain(&self, mut deliver: impl FnMut(&PlayerEvent)) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let _reset = DrainGuard(self);
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.pending.pop_front();
                if next.is_none() {
                    state.draining = false;
                }
                next
            };
            match next {
                Some(event) => deliver(&event),
                None => return,
            }
        }
    }
}

/// Releases the drain flag if a client panics mid-delivery
struct DrainGuard<'a>(&'a NotificationQueue);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.state.lock().draining = false;
        }
    }
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Client for Recorder {
        fn on_play(&self) {
            self.calls.lock().push("play".to_string());
        }

        fn on_error(&self, message: &str) {
            self.calls.lock().push(format!("error: {}", message));
        }
    }

    #[test]
    fn test_client_list_add_remove() {
        let list = ClientList::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let first_id = list.add(first.clone());
        list.add(second.clone());
        assert_eq!(list.len(), 2);

        list.dispatch(&PlayerEvent::Play);
        assert!(list.remove(first_id));
        assert!(!list.remove(first_id));
        list.dispatch(&PlayerEvent::Error {
            message: "boom".to_string(),
        });

        assert_eq!(*first.calls.lock(), vec!["play"]);
        assert_eq!(*second.calls.lock(), vec!["play", "error: boom"]);
    }

    #[test]
    fn test_default_methods_ignore_events() {
        struct Silent;
        impl Client for Silent {}

        let list = ClientList::new();
        list.add(Arc::new(Silent));
        list.dispatch(&PlayerEvent::Seeking);
        list.dispatch(&PlayerEvent::WaitingForKey);
    }

    #[test]
    fn test_queue_delivers_in_push_order() {
        let queue = NotificationQueue::new();
        queue.push(PlayerEvent::AttachMse);
        queue.push(PlayerEvent::Seeking);
        let mut seen = Vec::new();
        queue.drain(|event| seen.push(event.clone()));
        assert_eq!(seen, vec![PlayerEvent::AttachMse, PlayerEvent::Seeking]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reentrant_push_is_delivered_by_outer_drain() {
        let queue = NotificationQueue::new();
        queue.push(PlayerEvent::Play);
        let mut seen = Vec::new();
        queue.drain(|event| {
            seen.push(event.clone());
            if *event == PlayerEvent::Play {
                queue.push(PlayerEvent::Seeking);
                // Nested drain is a no-op; the outer loop picks the event up
                queue.drain(|_| panic!("nested drain must not deliver"));
            }
        });
        assert_eq!(seen, vec![PlayerEvent::Play, PlayerEvent::Seeking]);
    }

    #[test]
    fn test_queue_recovers_after_panicking_client() {
        let queue = Arc::new(NotificationQueue::new());
        queue.push(PlayerEvent::Play);
        let q = queue.clone();
        let result = std::thread::spawn(move || q.drain(|_| panic!("client failed"))).join();
        assert!(result.is_err());

        queue.push(PlayerEvent::Detach);
        let mut seen = Vec::new();
        queue.drain(|event| seen.push(event.clone()));
        assert_eq!(seen, vec![PlayerEvent::Detach]);
    }
}
