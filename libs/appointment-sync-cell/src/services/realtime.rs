// libs/appointment-sync-cell/src/services/realtime.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::{RealtimeEvent, RealtimeEventKind};

pub type EventReceiver = broadcast::Receiver<RealtimeEvent>;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Malformed realtime frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),

    #[error("Realtime connection is closed")]
    Closed,
}

/// Push-event connection owned by one authenticated session.
///
/// The transport that receives frames from the server hands them to
/// [`RealtimeConnection::publish_raw`]; components subscribe by event name.
pub struct RealtimeConnection {
    channels: RwLock<HashMap<RealtimeEventKind, broadcast::Sender<RealtimeEvent>>>,
    open: AtomicBool,
}

impl RealtimeConnection {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self, kind: RealtimeEventKind) -> Result<EventReceiver, RealtimeError> {
        if !self.is_open() {
            return Err(RealtimeError::Closed);
        }

        let mut channels = self.channels.write().map_err(|_| RealtimeError::Closed)?;
        let sender = channels
            .entry(kind)
            .or_insert_with(|| broadcast::channel(100).0);

        debug!("Subscribed to {}", kind.name());
        Ok(sender.subscribe())
    }

    /// Drops the channel for `kind`; every receiver of it sees the stream end.
    pub fn unsubscribe(&self, kind: RealtimeEventKind) {
        if let Ok(mut channels) = self.channels.write() {
            if channels.remove(&kind).is_some() {
                debug!("Unsubscribed from {}", kind.name());
            }
        }
    }

    pub fn subscriber_count(&self, kind: RealtimeEventKind) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|channels| channels.get(&kind).map(|sender| sender.receiver_count()))
            .unwrap_or(0)
    }

    /// Delivers an event and returns how many subscribers received it.
    pub fn publish(&self, event: RealtimeEvent) -> Result<usize, RealtimeError> {
        if !self.is_open() {
            return Err(RealtimeError::Closed);
        }

        let channels = self.channels.read().map_err(|_| RealtimeError::Closed)?;
        let delivered = match channels.get(&event.kind()) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };

        Ok(delivered)
    }

    /// Parses a `{ "event": ..., "payload": ... }` frame and publishes it.
    pub fn publish_raw(&self, frame: &str) -> Result<usize, RealtimeError> {
        let event: RealtimeEvent = serde_json::from_str(frame)?;
        self.publish(event)
    }

    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Ok(mut channels) = self.channels.write() {
                channels.clear();
            }
            info!("Realtime connection closed");
        }
    }
}

impl Default for RealtimeConnection {
    fn default() -> Self {
        Self::new()
    }
}
