//! Outbound notification seam.
//!
//! Detectors hand structured [`ChangeEvent`]s to a [`Notifier`]. The
//! production implementation publishes them on a broadcast channel that
//! the chat transport subscribes to.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::NotifyError;
use crate::models::event::{ChangeEvent, Dispatch, RecipientId};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipients: &[RecipientId], event: &ChangeEvent) -> Result<(), NotifyError>;
}

/// Broadcast bus for [`Dispatch`]es.
///
/// When the ring buffer is full, the oldest dispatches are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Dispatch>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Dispatch> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, recipients: &[RecipientId], event: &ChangeEvent) -> Result<(), NotifyError> {
        if recipients.is_empty() {
            tracing::debug!("No recipients for {}, skipping", event.kind());
            return Ok(());
        }

        let dispatch = Dispatch {
            recipients: recipients.to_vec(),
            event: event.clone(),
        };

        // A send error means nobody is listening, which is a delivery failure
        self.sender
            .send(dispatch)
            .map(|receivers| {
                tracing::debug!("Published {} to {} receiver(s)", event.kind(), receivers);
            })
            .map_err(|_| NotifyError::Delivery("no transport subscribed".to_string()))
    }
}
