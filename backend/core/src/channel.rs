use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::event::PresenceEvent;

/// Default channel buffer size for presence events.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// Bounded queue between the platform adapter and the single presence processor.
///
/// Senders are cheap to clone; the receiver can be taken exactly once so that
/// events are applied by one logical writer in arrival order.
pub struct PresenceBus {
    pub presence_tx: mpsc::Sender<PresenceEvent>,
    presence_rx: Option<mpsc::Receiver<PresenceEvent>>,
}

impl PresenceBus {
    /// Create a new bus with the default buffer size.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with a custom buffer size.
    pub fn with_buffer_size(buffer: usize) -> Self {
        let (presence_tx, presence_rx) = mpsc::channel(buffer);
        info!(buffer_size = buffer, "PresenceBus initialized");
        Self {
            presence_tx,
            presence_rx: Some(presence_rx),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<PresenceEvent> {
        self.presence_tx.clone()
    }

    /// Take the processor receiver (can only be called once).
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<PresenceEvent>> {
        debug!("Presence receiver taken");
        self.presence_rx.take()
    }
}

impl Default for PresenceBus {
    fn default() -> Self {
        Self::new()
    }
}
