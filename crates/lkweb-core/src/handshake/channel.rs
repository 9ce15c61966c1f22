//! The inter-context message channel.
//!
//! Senders `post` envelopes; every registered `Listener` receives a copy.
//! A listener deregisters itself when dropped, so a released attempt never
//! sees later deliveries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use super::message::InboundEnvelope;

type Registry = HashMap<u64, mpsc::UnboundedSender<InboundEnvelope>>;

#[derive(Clone, Default)]
pub struct MessageChannel {
    listeners: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl MessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener for subsequent posts.
    pub fn subscribe(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry().insert(id, tx);
        trace!(listener = id, "Listener registered");
        Listener {
            id,
            rx,
            listeners: Arc::clone(&self.listeners),
            registered: true,
        }
    }

    /// Deliver an envelope to every current listener. Returns how many received it.
    pub fn post(&self, envelope: InboundEnvelope) -> usize {
        let registry = self.registry();
        registry
            .values()
            .filter(|tx| tx.send(envelope.clone()).is_ok())
            .count()
    }

    pub fn listener_count(&self) -> usize {
        self.registry().len()
    }
}

/// A registered receiver on a `MessageChannel`.
pub struct Listener {
    id: u64,
    rx: mpsc::UnboundedReceiver<InboundEnvelope>,
    listeners: Arc<Mutex<Registry>>,
    registered: bool,
}

impl Listener {
    pub async fn recv(&mut self) -> Option<InboundEnvelope> {
        self.rx.recv().await
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Deregister and drop anything still queued. Safe to call repeatedly.
    pub fn release(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        trace!(listener = self.id, "Listener released");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_post_reaches_all_listeners() {
        let channel = MessageChannel::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        assert_eq!(channel.post(InboundEnvelope::new("https://lk.example", json!(1))), 2);
        assert_eq!(a.recv().await.unwrap().data, json!(1));
        assert_eq!(b.recv().await.unwrap().data, json!(1));
    }

    #[test]
    fn test_drop_deregisters() {
        let channel = MessageChannel::new();
        let listener = channel.subscribe();
        assert_eq!(channel.listener_count(), 1);
        drop(listener);
        assert_eq!(channel.listener_count(), 0);
        assert_eq!(channel.post(InboundEnvelope::new("x", json!(null))), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let channel = MessageChannel::new();
        let mut listener = channel.subscribe();
        let _other = channel.subscribe();
        listener.release();
        listener.release();
        assert!(!listener.is_registered());
        assert_eq!(channel.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_released_listener_discards_queue() {
        let channel = MessageChannel::new();
        let mut listener = channel.subscribe();
        channel.post(InboundEnvelope::new("x", json!("queued")));
        listener.release();
        assert!(listener.recv().await.is_none());
    }
}
