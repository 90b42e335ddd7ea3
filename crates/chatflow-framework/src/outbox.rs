//! Rendering and sending messages with action keyboards.

use std::sync::Arc;

use tracing::{debug, warn};

use chatflow_core::{BoxedTransport, ChatId, OutboundMessage, SentMessage};

use crate::error::SendError;
use crate::markup::Markup;
use crate::registry::CallbackRegistry;

/// Sends messages and keeps the callback registry in step with them.
///
/// Sending resolves the markup (issuing callback ids), awaits the transport
/// and only then binds every issued id to the chat the message landed in. If
/// the transport fails the issued ids are dropped again. A send that is
/// cancelled mid-flight leaves its ids unbound; they can never be resolved and
/// age out of the registry.
#[derive(Clone)]
pub struct Outbox {
    registry: Arc<CallbackRegistry>,
    transport: BoxedTransport,
}

impl Outbox {
    /// Creates an outbox over `registry` and `transport`.
    pub fn new(registry: Arc<CallbackRegistry>, transport: BoxedTransport) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// The registry buttons are issued from.
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Sends `text` with an optional keyboard to `chat`.
    pub async fn send(
        &self,
        chat: ChatId,
        text: impl Into<String>,
        markup: Option<Markup>,
    ) -> Result<SentMessage, SendError> {
        let (keyboard, issued) = match markup {
            Some(markup) => {
                let (keyboard, issued) = markup.resolve(&self.registry)?;
                (Some(keyboard), issued)
            }
            None => (None, Vec::new()),
        };

        let message = OutboundMessage {
            chat,
            text: text.into(),
            keyboard,
        };

        let sent = match self.transport.send(message).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(chat, error = %e, callbacks = issued.len(), "Send failed, dropping issued callbacks");
                for id in issued {
                    self.registry.remove(id);
                }
                return Err(e.into());
            }
        };

        // The message is out; an id that can no longer be bound (evicted or
        // reissued meanwhile) only costs that one button.
        for id in &issued {
            if let Err(e) = self.registry.bind_chat(*id, sent.chat) {
                warn!(chat = sent.chat, callback = %id, error = %e, "Could not bind callback");
            }
        }
        debug!(
            chat = sent.chat,
            message_id = sent.message_id,
            callbacks = issued.len(),
            "Message sent"
        );
        Ok(sent)
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
