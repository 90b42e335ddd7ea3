//! Ways updates get into the runtime.
//!
//! Webhook style integrations push through an [`UpdateSender`]; long-polling
//! integrations implement [`UpdateSource`] and let the runtime drive them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chatflow_core::Update;
use chatflow_framework::BoxError;

use crate::error::{RuntimeError, RuntimeResult};

/// A pull-based feed of updates, e.g. a `getUpdates` long poll.
///
/// The runtime calls [`poll`](Self::poll) in a loop until shutdown. The call
/// may wait as long as it likes; it is dropped when the runtime stops. After
/// an error the runtime waits `poll_retry_ms` before polling again.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        "source"
    }

    /// Returns the next batch of updates.
    async fn poll(&self) -> Result<Vec<Update>, BoxError>;
}

pub type BoxedUpdateSource = Arc<dyn UpdateSource>;

/// Pushes updates into a running (or not yet started) runtime.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<Update>,
}

impl UpdateSender {
    pub(crate) fn new(tx: mpsc::Sender<Update>) -> Self {
        Self { tx }
    }

    /// Queues `update`, waiting while the queue is full.
    pub async fn send(&self, update: Update) -> RuntimeResult<()> {
        self.tx.send(update).await.map_err(|_| RuntimeError::Closed)
    }

    /// Queues `update` without waiting.
    pub fn try_send(&self, update: Update) -> RuntimeResult<()> {
        self.tx.try_send(update).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RuntimeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RuntimeError::Closed,
        })
    }

    /// Returns `true` once the runtime has stopped accepting updates.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
