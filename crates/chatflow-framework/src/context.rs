//! Handler context and per-user / per-chat data.
//!
//! One [`FlowContext`] is built for every handler invocation. Handlers fill in
//! what they extracted from the update during
//! [`collect_context`](crate::handler::Handler::collect_context): the resolved
//! payload, command arguments or regex captures. The callback then receives
//! the context as `Arc<FlowContext>`.
//!
//! Contexts of the same update share their propagation flag, so
//! [`stop_propagation`](FlowContext::stop_propagation) in one handler group
//! prevents every later group from seeing the update.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use chatflow_core::{
    BoxedTransport, CallbackId, ChatId, ConversationKey, SentMessage, Update, UserId, codec,
};

use crate::action::{Action, Payload};
use crate::error::SendError;
use crate::markup::Markup;
use crate::outbox::Outbox;
use crate::registry::CallbackRegistry;

// =============================================================================
// DataMap: type-keyed storage shared across updates
// =============================================================================

/// A map holding at most one value per type.
///
/// The dispatcher keeps one per user and one per chat, so handlers can carry
/// data from one update to the next.
#[derive(Default)]
pub struct DataMap {
    values: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl DataMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any previous value of the same type.
    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        self.values.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of the stored `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if a `T` is stored.
    pub fn has<T: 'static>(&self) -> bool {
        self.values.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the stored `T`.
    pub fn take<T: 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Runs `f` on the stored `T`, inserting `T::default()` first if absent.
    ///
    /// The map stays locked while `f` runs; do not touch the same map from
    /// inside `f`.
    pub fn with<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default + Send + Sync + 'static,
    {
        let mut values = self.values.lock();
        let mut value: Box<T> = values
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .unwrap_or_default();
        let result = f(value.as_mut());
        values.insert(TypeId::of::<T>(), value);
        result
    }
}

impl std::fmt::Debug for DataMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataMap")
            .field("len", &self.values.lock().len())
            .finish()
    }
}

// =============================================================================
// Services: shared by every context of one dispatcher
// =============================================================================

/// Long-lived collaborators every context can reach.
pub(crate) struct Services {
    pub(crate) outbox: Outbox,
    user_data: DashMap<UserId, Arc<DataMap>>,
    chat_data: DashMap<ChatId, Arc<DataMap>>,
}

impl Services {
    pub(crate) fn new(registry: Arc<CallbackRegistry>, transport: BoxedTransport) -> Self {
        Self {
            outbox: Outbox::new(registry, transport),
            user_data: DashMap::new(),
            chat_data: DashMap::new(),
        }
    }

    pub(crate) fn registry(&self) -> &Arc<CallbackRegistry> {
        self.outbox.registry()
    }

    pub(crate) fn user_data(&self, user: UserId) -> Arc<DataMap> {
        Arc::clone(self.user_data.entry(user).or_default().value())
    }

    pub(crate) fn chat_data(&self, chat: ChatId) -> Arc<DataMap> {
        Arc::clone(self.chat_data.entry(chat).or_default().value())
    }
}

// =============================================================================
// FlowContext: handed to callbacks
// =============================================================================

/// Everything a callback knows about the update it handles.
pub struct FlowContext {
    update: Arc<Update>,
    services: Arc<Services>,
    propagating: Arc<AtomicBool>,
    pub(crate) action: Option<Arc<Action>>,
    pub(crate) payload: Option<Payload>,
    pub(crate) callback: Option<CallbackId>,
    pub(crate) args: Vec<String>,
    pub(crate) captures: Vec<Option<String>>,
    pub(crate) named: HashMap<String, String>,
    pub(crate) rerouted: bool,
}

impl FlowContext {
    pub(crate) fn new(
        update: Arc<Update>,
        services: Arc<Services>,
        propagating: Arc<AtomicBool>,
    ) -> Self {
        Self {
            update,
            services,
            propagating,
            action: None,
            payload: None,
            callback: None,
            args: Vec::new(),
            captures: Vec::new(),
            named: HashMap::new(),
            rerouted: false,
        }
    }

    /// A context for a reroute into `action`, skipping context collection.
    pub(crate) fn rerouted(
        update: Arc<Update>,
        services: Arc<Services>,
        propagating: Arc<AtomicBool>,
        action: Arc<Action>,
        payload: Option<Payload>,
    ) -> Self {
        let mut ctx = Self::new(update, services, propagating);
        ctx.action = Some(action);
        ctx.payload = payload;
        ctx.rerouted = true;
        ctx
    }

    // ─── Update ───────────────────────────────────────────────────────────────

    /// The update being handled.
    pub fn update(&self) -> &Update {
        &self.update
    }

    /// The sender of the update.
    pub fn sender(&self) -> UserId {
        self.update.sender
    }

    /// The chat of the update, if any.
    pub fn chat(&self) -> Option<ChatId> {
        self.update.chat
    }

    /// The conversation key of the update.
    pub fn key(&self) -> ConversationKey {
        self.update.key()
    }

    /// The message text without any embedded callback token.
    pub fn text(&self) -> Option<&str> {
        self.update.text().map(codec::strip)
    }

    // ─── Collected context ────────────────────────────────────────────────────

    /// The action whose handler is running, if the handler belongs to one.
    pub fn action(&self) -> Option<&Arc<Action>> {
        self.action.as_ref()
    }

    /// The payload of the pressed button or of the reroute.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// The payload, if it is a `T`.
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    /// The resolved callback id of a button press.
    pub fn callback_id(&self) -> Option<CallbackId> {
        self.callback
    }

    /// Command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Positional regex captures; index 0 is the whole match.
    pub fn captures(&self) -> &[Option<String>] {
        &self.captures
    }

    /// A positional regex capture.
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).and_then(|c| c.as_deref())
    }

    /// A named regex capture.
    pub fn named_capture(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Whether this invocation was reached through a reroute.
    pub fn is_rerouted(&self) -> bool {
        self.rerouted
    }

    // ─── Shared data ──────────────────────────────────────────────────────────

    /// Data kept for the sender across updates.
    pub fn user_data(&self) -> Arc<DataMap> {
        self.services.user_data(self.update.sender)
    }

    /// Data kept for the chat across updates. `None` for chat-less updates.
    pub fn chat_data(&self) -> Option<Arc<DataMap>> {
        self.update.chat.map(|chat| self.services.chat_data(chat))
    }

    /// The callback registry.
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        self.services.registry()
    }

    /// The outbox used by [`reply`](Self::reply) and [`send`](Self::send).
    pub fn outbox(&self) -> &Outbox {
        &self.services.outbox
    }

    // ─── Propagation ──────────────────────────────────────────────────────────

    /// Stops later handler groups from seeing this update.
    pub fn stop_propagation(&self) {
        self.propagating.store(false, Ordering::SeqCst);
    }

    /// Returns `true` if later handler groups will still run.
    pub fn is_propagating(&self) -> bool {
        self.propagating.load(Ordering::SeqCst)
    }

    // ─── Sending ──────────────────────────────────────────────────────────────

    /// Sends a message to the chat of the update.
    pub async fn reply(
        &self,
        text: impl Into<String>,
        markup: Option<Markup>,
    ) -> Result<SentMessage, SendError> {
        let chat = self.update.chat.ok_or(SendError::NoChat(self.update.id))?;
        self.services.outbox.send(chat, text, markup).await
    }

    /// Sends a message to `chat`.
    pub async fn send(
        &self,
        chat: ChatId,
        text: impl Into<String>,
        markup: Option<Markup>,
    ) -> Result<SentMessage, SendError> {
        self.services.outbox.send(chat, text, markup).await
    }
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("update", &self.update.id)
            .field("key", &self.key())
            .field("action", &self.action.as_ref().map(|a| a.id()))
            .field("payload", &self.payload)
            .field("rerouted", &self.rerouted)
            .field("is_propagating", &self.is_propagating())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_data_map() {
        let data = DataMap::new();
        assert!(!data.has::<Vec<String>>());

        data.with(|items: &mut Vec<String>| items.push("milk".into()));
        data.with(|items: &mut Vec<String>| items.push("eggs".into()));
        assert_eq!(
            data.get::<Vec<String>>(),
            Some(vec!["milk".to_string(), "eggs".to_string()])
        );

        data.set(5u32);
        assert_eq!(data.take::<u32>(), Some(5));
        assert!(!data.has::<u32>());
    }

    #[test]
    fn test_user_and_chat_data_are_shared_per_id() {
        let services = testing::services();
        let first = FlowContext::new(
            Arc::new(Update::message(1, 10, 20, "a")),
            Arc::clone(&services),
            Arc::new(AtomicBool::new(true)),
        );
        let second = FlowContext::new(
            Arc::new(Update::message(2, 10, 21, "b")),
            Arc::clone(&services),
            Arc::new(AtomicBool::new(true)),
        );

        first.user_data().set("shared".to_string());
        assert_eq!(second.user_data().get::<String>().as_deref(), Some("shared"));

        first.chat_data().unwrap().set(1u8);
        assert!(!second.chat_data().unwrap().has::<u8>());
    }

    #[test]
    fn test_text_hides_token_and_propagation_is_shared() {
        let flag = Arc::new(AtomicBool::new(true));
        let ctx = FlowContext::new(
            Arc::new(Update::message(1, 1, 1, codec::embed("Add", 3))),
            testing::services(),
            Arc::clone(&flag),
        );
        assert_eq!(ctx.text(), Some("Add"));

        ctx.stop_propagation();
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reply_without_chat_fails() {
        let ctx = FlowContext::new(
            Arc::new(Update::chosen_result(1, 1, "r", "q")),
            testing::services(),
            Arc::new(AtomicBool::new(true)),
        );
        assert!(matches!(
            ctx.reply("hi", None).await,
            Err(SendError::NoChat(1))
        ));
    }
}
