//! The outbound send capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::integration::wire::{OutboundMessage, SentMessage};

/// Delivers rendered messages to the remote chat API.
///
/// Implementations own everything network related: retries, timeouts,
/// connection pooling. The core only awaits the result, so a send may be slow
/// or be cancelled by dropping the future; callback ids rendered into the
/// message stay unbound until it resolves successfully.
///
/// ```rust,ignore
/// struct HttpTransport { client: reqwest::Client, token: String }
///
/// #[async_trait]
/// impl Transport for HttpTransport {
///     async fn send(&self, message: OutboundMessage) -> TransportResult<SentMessage> {
///         // POST sendMessage, map the response
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `message` and reports where it landed.
    async fn send(&self, message: OutboundMessage) -> TransportResult<SentMessage>;
}

/// A shared transport trait object.
pub type BoxedTransport = Arc<dyn Transport>;

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, message: OutboundMessage) -> TransportResult<SentMessage> {
        (**self).send(message).await
    }
}
