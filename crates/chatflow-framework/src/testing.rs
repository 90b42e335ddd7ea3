//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use chatflow_core::{
    OutboundMessage, SentMessage, Transport, TransportError, TransportResult, Update,
};

use crate::context::{FlowContext, Services};
use crate::registry::CallbackRegistry;

/// Records every message and answers with increasing message ids.
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    failure: Option<TransportError>,
    next_id: AtomicI64,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failure: None,
            next_id: AtomicI64::new(1),
        })
    }

    pub(crate) fn failing(error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(error),
            next_id: AtomicI64::new(1),
        })
    }

    pub(crate) fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: OutboundMessage) -> TransportResult<SentMessage> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let chat = message.chat;
        self.sent.lock().push(message);
        Ok(SentMessage {
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            chat,
        })
    }
}

pub(crate) fn services() -> Arc<Services> {
    Arc::new(Services::new(
        Arc::new(CallbackRegistry::default()),
        RecordingTransport::new(),
    ))
}

pub(crate) fn context(update: Update) -> FlowContext {
    context_with(update, &services())
}

pub(crate) fn context_with(update: Update, services: &Arc<Services>) -> FlowContext {
    FlowContext::new(
        Arc::new(update),
        Arc::clone(services),
        Arc::new(AtomicBool::new(true)),
    )
}
