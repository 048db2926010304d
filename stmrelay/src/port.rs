//! Frame ports: named channels to a frame source
//!
//! A port is opened with [`FrameSource::connect`] and closed by dropping it.
//! Closing drops the receiving end, so the source sees the disconnection
//! and any message still in flight is discarded with it.

use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Name under which the relay connects to its frame source
pub const FRAME_PORT_NAME: &str = "video-frames";

/// Default number of frames buffered in a port
pub const DEFAULT_PORT_CAPACITY: usize = 4;

/// A producer of still frames
pub trait FrameSource: Send + Sync {
    /// Opens a port; each message received on it is one encoded frame
    fn connect(&self, name: &str) -> Result<FramePort>;
}

/// Receiving end of an open port
#[derive(Debug)]
pub struct FramePort {
    name: String,
    receiver: mpsc::Receiver<String>,
}

impl FramePort {
    pub fn new(name: impl Into<String>, receiver: mpsc::Receiver<String>) -> Self {
        Self {
            name: name.into(),
            receiver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next frame message, `None` once the source has gone away
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Next frame message if one is already buffered
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

type SenderSlot = Arc<Mutex<Option<mpsc::Sender<String>>>>;

fn slot(sender: &SenderSlot) -> MutexGuard<'_, Option<mpsc::Sender<String>>> {
    sender.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process frame source backed by a tokio channel
///
/// The producing side is a [`FrameFeed`]: it publishes into whichever port
/// is currently connected and drops frames when none is.
#[derive(Debug, Clone)]
pub struct ChannelFrameSource {
    sender: SenderSlot,
    capacity: usize,
}

impl ChannelFrameSource {
    pub fn new() -> (Self, FrameFeed) {
        Self::with_capacity(DEFAULT_PORT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, FrameFeed) {
        let sender: SenderSlot = Arc::default();
        let source = Self {
            sender: sender.clone(),
            capacity: capacity.max(1),
        };
        (source, FrameFeed { sender })
    }
}

impl FrameSource for ChannelFrameSource {
    fn connect(&self, name: &str) -> Result<FramePort> {
        let (tx, rx) = mpsc::channel(self.capacity);
        *slot(&self.sender) = Some(tx);
        tracing::trace!(port = name, "Frame port connected");
        Ok(FramePort::new(name, rx))
    }
}

/// Producing side of a [`ChannelFrameSource`]
#[derive(Debug, Clone)]
pub struct FrameFeed {
    sender: SenderSlot,
}

impl FrameFeed {
    /// True while a port is connected and listening
    pub fn is_connected(&self) -> bool {
        slot(&self.sender)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Publishes a frame message to the connected port
    ///
    /// Returns `false` when the frame was dropped (no listener, or the
    /// port buffer is full).
    pub fn publish(&self, message: impl Into<String>) -> bool {
        let mut guard = slot(&self.sender);
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        match tx.try_send(message.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *guard = None;
                false
            }
        }
    }

    /// Disconnects from the source side: the listening port sees its end
    pub fn disconnect(&self) -> Result<()> {
        match slot(&self.sender).take() {
            Some(_) => Ok(()),
            None => Err(Error::FrameSource("no port connected".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feed_reaches_connected_port() {
        let (source, feed) = ChannelFrameSource::new();
        assert!(!feed.is_connected());
        assert!(!feed.publish("dropped"));

        let mut port = source.connect(FRAME_PORT_NAME).unwrap();
        assert_eq!(port.name(), FRAME_PORT_NAME);
        assert!(feed.is_connected());
        assert!(feed.publish("frame-1"));
        assert_eq!(port.recv().await.as_deref(), Some("frame-1"));
    }

    #[tokio::test]
    async fn test_dropping_port_disconnects_feed() {
        let (source, feed) = ChannelFrameSource::new();
        let port = source.connect(FRAME_PORT_NAME).unwrap();
        drop(port);

        assert!(!feed.is_connected());
        assert!(!feed.publish("late"));
    }

    #[tokio::test]
    async fn test_source_disconnect_ends_port() {
        let (source, feed) = ChannelFrameSource::new();
        let mut port = source.connect(FRAME_PORT_NAME).unwrap();
        feed.disconnect().unwrap();

        assert_eq!(port.recv().await, None);
        assert!(feed.disconnect().is_err());
    }

    #[test]
    fn test_full_port_drops_frames() {
        let (source, feed) = ChannelFrameSource::with_capacity(1);
        let mut port = source.connect(FRAME_PORT_NAME).unwrap();

        assert!(feed.publish("a"));
        assert!(!feed.publish("b"));
        assert_eq!(port.try_recv().as_deref(), Some("a"));
        assert_eq!(port.try_recv(), None);
    }
}
