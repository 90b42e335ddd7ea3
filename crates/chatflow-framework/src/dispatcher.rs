//! Update dispatcher for the chatflow framework.
//!
//! The [`Dispatcher`] owns the handler chain and feeds every inbound
//! [`Update`] through it.
//!
//! # Groups
//!
//! Handlers are registered into numbered groups. Groups run in ascending
//! order and each group runs at most one handler: the first one, in
//! registration order, whose check passes. A handler can end processing of
//! the update early with [`FlowContext::stop_propagation`].
//!
//! # Processing one update
//!
//! 1. Take the lock of the update's conversation key, so one user's updates
//!    in one chat never run concurrently
//! 2. For every group, find the first matching handler
//! 3. Collect its context and invoke it
//! 4. Follow reroutes straight into the target action's handler
//! 5. Hand the final outcome to the conversation that owns the handler
//!
//! Errors at any step are logged, passed to the error handlers and leave the
//! conversation state as it was.
//!
//! ```rust,ignore
//! let mut dispatcher = Dispatcher::new(registry, transport);
//! dispatcher.add_conversation(0, todo_conversation);
//! dispatcher.add_handler(1, ActionHandler::new(&start, show_list));
//! dispatcher.add_error_handler(|update: Arc<Update>, error: Arc<FlowError>| async move {
//!     tracing::error!(update_id = update.id, %error, "Handler failed");
//! });
//!
//! dispatcher.process_update(update).await;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use tracing::{Instrument, Level, debug, span, trace, warn};

use chatflow_core::{ActionId, BoxedTransport, ConversationKey, Update};

use crate::context::{FlowContext, Services};
use crate::conversation::Conversation;
use crate::error::FlowError;
use crate::handler::{BoxedHandler, Handler, MatchEnv, MatchExtra, MatchResult};
use crate::outbox::Outbox;
use crate::outcome::Outcome;
use crate::registry::CallbackRegistry;
use crate::sync::KeyedLocks;

/// Default limit on chained reroutes for one update.
pub const DEFAULT_MAX_REROUTE_DEPTH: usize = 16;

/// A function notified of every failed update.
pub type ErrorHandler =
    Arc<dyn Fn(Arc<Update>, Arc<FlowError>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A handler in the chain, with the conversation whose state it drives.
#[derive(Clone)]
struct Slot {
    handler: BoxedHandler,
    owner: Option<Arc<Conversation>>,
}

/// The central update dispatcher.
///
/// `Dispatcher` is `Send + Sync`; share it behind an `Arc` to process
/// updates from several tasks at once.
pub struct Dispatcher {
    services: Arc<Services>,
    groups: BTreeMap<i32, Vec<Slot>>,
    /// Handlers answering for each action, for reroutes.
    routes: HashMap<ActionId, Vec<Slot>>,
    conversations: Vec<Arc<Conversation>>,
    error_handlers: Vec<ErrorHandler>,
    locks: KeyedLocks<ConversationKey>,
    max_reroute_depth: usize,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    ///
    /// Buttons are issued from `registry`; callbacks reply through
    /// `transport`.
    pub fn new(registry: Arc<CallbackRegistry>, transport: BoxedTransport) -> Self {
        Self {
            services: Arc::new(Services::new(registry, transport)),
            groups: BTreeMap::new(),
            routes: HashMap::new(),
            conversations: Vec::new(),
            error_handlers: Vec::new(),
            locks: KeyedLocks::new(),
            max_reroute_depth: DEFAULT_MAX_REROUTE_DEPTH,
        }
    }

    /// Sets the limit on chained reroutes (builder pattern).
    pub fn with_max_reroute_depth(mut self, depth: usize) -> Self {
        self.max_reroute_depth = depth;
        self
    }

    // ─── Registration ─────────────────────────────────────────────────────────

    /// Adds a standalone handler to `group`.
    ///
    /// Use [`add_conversation`](Self::add_conversation) for conversations;
    /// added here, their state would never change.
    pub fn add_handler(&mut self, group: i32, handler: impl Handler) {
        self.add_slot(
            group,
            Slot {
                handler: Arc::new(handler),
                owner: None,
            },
        );
    }

    /// Adds a handler to `group` (builder pattern).
    pub fn with_handler(mut self, group: i32, handler: impl Handler) -> Self {
        self.add_handler(group, handler);
        self
    }

    /// Adds a conversation to `group` and returns a handle to it.
    pub fn add_conversation(&mut self, group: i32, conversation: Conversation) -> Arc<Conversation> {
        let conversation = Arc::new(conversation);
        for handler in conversation.handlers() {
            for action in handler.actions() {
                self.routes.entry(action).or_default().push(Slot {
                    handler: Arc::clone(handler),
                    owner: Some(Arc::clone(&conversation)),
                });
            }
        }

        self.groups.entry(group).or_default().push(Slot {
            handler: Arc::clone(&conversation) as BoxedHandler,
            owner: Some(Arc::clone(&conversation)),
        });
        self.conversations.push(Arc::clone(&conversation));
        debug!(conversation = conversation.name(), group, "Conversation registered");
        conversation
    }

    /// Adds a conversation to `group` (builder pattern).
    pub fn with_conversation(mut self, group: i32, conversation: Conversation) -> Self {
        self.add_conversation(group, conversation);
        self
    }

    /// Registers a function notified of every failed update.
    pub fn add_error_handler<F, Fut>(&mut self, f: F)
    where
        F: Fn(Arc<Update>, Arc<FlowError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.error_handlers
            .push(Arc::new(move |update, error| Box::pin(f(update, error))));
    }

    fn add_slot(&mut self, group: i32, slot: Slot) {
        for action in slot.handler.actions() {
            self.routes.entry(action).or_default().push(slot.clone());
        }
        debug!(handler = slot.handler.name(), group, "Handler registered");
        self.groups.entry(group).or_default().push(slot);
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    /// The callback registry.
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        self.services.registry()
    }

    /// The outbox callbacks reply through.
    pub fn outbox(&self) -> &Outbox {
        &self.services.outbox
    }

    /// Every registered conversation.
    pub fn conversations(&self) -> &[Arc<Conversation>] {
        &self.conversations
    }

    /// Total number of registered handlers, counting a conversation as one.
    pub fn handler_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Drops expired state from every conversation.
    pub fn sweep_expired(&self) -> usize {
        self.conversations.iter().map(|c| c.sweep_expired()).sum()
    }

    // ─── Dispatch ─────────────────────────────────────────────────────────────

    /// Runs `update` through the handler chain.
    ///
    /// Returns `true` if any handler matched, whether or not it succeeded.
    pub async fn process_update(&self, update: Update) -> bool {
        let update = Arc::new(update);
        let key = update.key();
        let span = span!(
            Level::DEBUG,
            "dispatch",
            update_id = update.id,
            user = update.sender,
            chat = ?update.chat,
            kind = update.kind.name(),
        );

        async {
            let lock = self.locks.get(&key);
            let handled = {
                let _guard = lock.lock().await;
                self.dispatch_locked(&update).await
            };
            drop(lock);
            self.locks.release(&key);
            handled
        }
        .instrument(span)
        .await
    }

    async fn dispatch_locked(&self, update: &Arc<Update>) -> bool {
        let propagating = Arc::new(AtomicBool::new(true));
        let env = MatchEnv {
            registry: self.services.registry(),
        };
        let mut handled = false;

        for (group, slots) in &self.groups {
            let matched = slots
                .iter()
                .find_map(|slot| match slot.handler.check(update, &env) {
                    MatchResult::Matched(extra) => Some((slot, extra)),
                    MatchResult::NoMatch => None,
                });
            let Some((slot, extra)) = matched else {
                continue;
            };

            handled = true;
            debug!(group, handler = slot.handler.name(), "Handler matched");
            if let Err(error) = self.run(slot, extra, update, &propagating).await {
                self.report(update, error).await;
            }

            if !propagating.load(Ordering::SeqCst) {
                debug!(group, "Propagation stopped");
                break;
            }
        }

        if !handled {
            trace!("No handler matched");
        }
        handled
    }

    async fn run(
        &self,
        slot: &Slot,
        extra: MatchExtra,
        update: &Arc<Update>,
        propagating: &Arc<AtomicBool>,
    ) -> Result<(), FlowError> {
        let mut ctx = FlowContext::new(
            Arc::clone(update),
            Arc::clone(&self.services),
            Arc::clone(propagating),
        );
        slot.handler.collect_context(&mut ctx, &extra)?;
        let mut outcome = slot.handler.invoke(Arc::new(ctx), &extra).await?;

        let mut owner = slot.owner.clone();
        let mut depth = 0;
        let outcome = loop {
            let reroute = match outcome {
                Outcome::Reroute(reroute) => reroute,
                done => break done,
            };

            depth += 1;
            if depth > self.max_reroute_depth {
                return Err(FlowError::RerouteDepthExceeded(self.max_reroute_depth));
            }

            let route = self.route(reroute.action.id(), owner.as_ref())?;
            debug!(action = %reroute.action.id(), handler = route.handler.name(), depth, "Rerouting");
            let ctx = FlowContext::rerouted(
                Arc::clone(update),
                Arc::clone(&self.services),
                Arc::clone(propagating),
                reroute.action,
                reroute.payload,
            );
            outcome = route.handler.invoke(Arc::new(ctx), &MatchExtra::Rerouted).await?;
            owner = route.owner.clone().or_else(|| slot.owner.clone());
        };

        trace!(outcome = %outcome.describe(), "Handler finished");
        if let Some(conversation) = owner {
            conversation.apply(&update.key(), &outcome);
        }
        Ok(())
    }

    /// Picks the handler a reroute into `action` runs.
    ///
    /// Prefers a handler of the current conversation, then a standalone one,
    /// then the first registered.
    fn route(&self, action: &ActionId, owner: Option<&Arc<Conversation>>) -> Result<&Slot, FlowError> {
        let routes = self
            .routes
            .get(action)
            .ok_or_else(|| FlowError::UnknownAction(action.clone()))?;

        let own = owner.and_then(|owner| {
            routes.iter().find(|route| {
                route
                    .owner
                    .as_ref()
                    .is_some_and(|candidate| Arc::ptr_eq(candidate, owner))
            })
        });
        own.or_else(|| routes.iter().find(|route| route.owner.is_none()))
            .or_else(|| routes.first())
            .ok_or_else(|| FlowError::UnknownAction(action.clone()))
    }

    async fn report(&self, update: &Arc<Update>, error: FlowError) {
        warn!(error = %error, update = ?update, "Update handling failed");
        let error = Arc::new(error);
        for handler in &self.error_handlers {
            handler(Arc::clone(update), Arc::clone(&error)).await;
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("groups", &self.groups.keys().collect::<Vec<_>>())
            .field("handler_count", &self.handler_count())
            .field("conversations", &self.conversations.len())
            .field("error_handlers", &self.error_handlers.len())
            .field("max_reroute_depth", &self.max_reroute_depth)
            .finish()
    }
}
