//! Multi-step conversations.
//!
//! A [`Conversation`] tracks one state per [`ConversationKey`] (user and
//! chat). Which of its handlers may match depends on that state:
//!
//! - in [`ConversationState::Entry`] only the entry points are eligible
//! - in [`ConversationState::In`] the handlers registered for the state are
//!   tried first, then the fallbacks; with
//!   [`allow_reentry`](ConversationBuilder::allow_reentry) the entry points
//!   come before both
//!
//! Handlers outside the eligible set never match, however well their
//! predicate fits. A conversation that sees no activity for its timeout falls
//! back to `Entry` before the next update is matched.
//!
//! ```rust,ignore
//! let todo = Conversation::builder("todo")
//!     .entry_point(ActionHandler::new(&add, add_init))
//!     .state("AWAITING_TEXT", vec![Arc::new(MessageHandler::new(Filter::text(), add_item))])
//!     .fallback(ActionHandler::new(&start, show_list))
//!     .timeout(Duration::from_secs(600))
//!     .build();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use chatflow_core::{ActionId, ConversationKey, Update};

use crate::context::FlowContext;
use crate::error::FlowError;
use crate::handler::{BoxedHandler, Handler, MatchEnv, MatchExtra, MatchResult};
use crate::outcome::{Outcome, StateId};

/// Where a conversation stands for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    /// Not started, ended, or expired.
    Entry,
    /// Waiting in a declared state.
    In(StateId),
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("<entry>"),
            Self::In(state) => write!(f, "{state}"),
        }
    }
}

#[derive(Debug, Clone)]
struct StateRecord {
    state: StateId,
    last_activity: Instant,
}

/// A state machine over handlers, kept per user and chat.
pub struct Conversation {
    name: String,
    entry_points: Vec<BoxedHandler>,
    states: HashMap<StateId, Vec<BoxedHandler>>,
    fallbacks: Vec<BoxedHandler>,
    timeout: Option<Duration>,
    allow_reentry: bool,
    records: DashMap<ConversationKey, StateRecord>,
}

impl Conversation {
    /// Starts building a conversation.
    pub fn builder(name: impl Into<String>) -> ConversationBuilder {
        ConversationBuilder {
            conversation: Conversation {
                name: name.into(),
                entry_points: Vec::new(),
                states: HashMap::new(),
                fallbacks: Vec::new(),
                timeout: None,
                allow_reentry: false,
                records: DashMap::new(),
            },
        }
    }

    /// The conversation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The inactivity timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of keys currently inside the conversation, expired ones included.
    pub fn active(&self) -> usize {
        self.records.len()
    }

    /// The state for `key`. Expired states read as [`ConversationState::Entry`].
    pub fn current_state(&self, key: &ConversationKey) -> ConversationState {
        match self.records.get(key) {
            Some(record) if !self.is_expired(&record, Instant::now()) => {
                ConversationState::In(record.state.clone())
            }
            _ => ConversationState::Entry,
        }
    }

    /// Stores the result of a handler run for `key`.
    ///
    /// [`Outcome::Reroute`] must be resolved by the caller first; it leaves
    /// the state untouched.
    pub fn apply(&self, key: &ConversationKey, outcome: &Outcome) {
        let now = Instant::now();
        match outcome {
            Outcome::Stay => {
                let expired = match self.records.get_mut(key) {
                    Some(mut record) if !self.is_expired(&record, now) => {
                        record.last_activity = now;
                        false
                    }
                    Some(_) => true,
                    None => false,
                };
                if expired {
                    self.records.remove(key);
                    debug!(conversation = %self.name, %key, "Conversation expired");
                }
            }
            Outcome::Transition(state) => {
                if !self.states.contains_key(state) {
                    warn!(
                        conversation = %self.name,
                        %state,
                        "Transition into a state without handlers, only fallbacks will match"
                    );
                }
                self.records.insert(
                    *key,
                    StateRecord {
                        state: state.clone(),
                        last_activity: now,
                    },
                );
                trace!(conversation = %self.name, %key, %state, "Conversation state changed");
            }
            Outcome::End => {
                if self.records.remove(key).is_some() {
                    trace!(conversation = %self.name, %key, "Conversation ended");
                }
            }
            Outcome::Reroute(_) => {}
        }
    }

    /// Drops every expired state and returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let Some(timeout) = self.timeout else {
            return 0;
        };
        let now = Instant::now();
        let before = self.records.len();
        self.records
            .retain(|_, record| now.duration_since(record.last_activity) < timeout);
        let swept = before.saturating_sub(self.records.len());
        if swept > 0 {
            debug!(conversation = %self.name, swept, "Swept expired conversation states");
        }
        swept
    }

    /// Every handler of the conversation, in no particular order.
    pub fn handlers(&self) -> impl Iterator<Item = &BoxedHandler> {
        self.entry_points
            .iter()
            .chain(self.states.values().flatten())
            .chain(self.fallbacks.iter())
    }

    /// The handlers eligible in `state`, in matching order.
    pub fn eligible(&self, state: &ConversationState) -> Vec<&BoxedHandler> {
        match state {
            ConversationState::Entry => self.entry_points.iter().collect(),
            ConversationState::In(id) => {
                let reentry = self.entry_points.iter().filter(|_| self.allow_reentry);
                reentry
                    .chain(self.states.get(id).into_iter().flatten())
                    .chain(self.fallbacks.iter())
                    .collect()
            }
        }
    }

    fn is_expired(&self, record: &StateRecord, now: Instant) -> bool {
        self.timeout
            .is_some_and(|timeout| now.duration_since(record.last_activity) >= timeout)
    }
}

impl Handler for Conversation {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, env: &MatchEnv<'_>) -> MatchResult {
        let state = self.current_state(&update.key());
        self.eligible(&state)
            .into_iter()
            .find_map(|handler| match handler.check(update, env) {
                MatchResult::Matched(inner) => Some(MatchResult::Matched(MatchExtra::Delegated {
                    handler: Arc::clone(handler),
                    inner: Box::new(inner),
                })),
                MatchResult::NoMatch => None,
            })
            .unwrap_or(MatchResult::NoMatch)
    }

    fn collect_context(&self, ctx: &mut FlowContext, extra: &MatchExtra) -> Result<(), FlowError> {
        match extra {
            MatchExtra::Delegated { handler, inner } => handler.collect_context(ctx, inner),
            _ => Err(FlowError::InvalidMatch(self.name.clone())),
        }
    }

    fn invoke(
        &self,
        ctx: Arc<FlowContext>,
        extra: &MatchExtra,
    ) -> BoxFuture<'static, Result<Outcome, FlowError>> {
        match extra {
            MatchExtra::Delegated { handler, inner } => handler.invoke(ctx, inner),
            _ => {
                let error = FlowError::InvalidMatch(self.name.clone());
                Box::pin(async move { Err(error) })
            }
        }
    }

    fn actions(&self) -> Vec<ActionId> {
        self.handlers().flat_map(|handler| handler.actions()).collect()
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("name", &self.name)
            .field("entry_points", &self.entry_points.len())
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .field("fallbacks", &self.fallbacks.len())
            .field("timeout", &self.timeout)
            .field("allow_reentry", &self.allow_reentry)
            .field("active", &self.records.len())
            .finish()
    }
}

/// Builder for [`Conversation`].
#[derive(Debug)]
pub struct ConversationBuilder {
    conversation: Conversation,
}

impl ConversationBuilder {
    /// Adds a handler that may start the conversation.
    pub fn entry_point(mut self, handler: impl Handler) -> Self {
        self.conversation.entry_points.push(Arc::new(handler));
        self
    }

    /// Registers the handlers eligible while in `state`.
    ///
    /// Calling this twice for the same state appends.
    pub fn state(mut self, state: impl Into<StateId>, handlers: Vec<BoxedHandler>) -> Self {
        self.conversation
            .states
            .entry(state.into())
            .or_default()
            .extend(handlers);
        self
    }

    /// Adds a handler eligible in every declared state.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.conversation.fallbacks.push(Arc::new(handler));
        self
    }

    /// Resets a key to `Entry` after `timeout` without activity.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.conversation.timeout = Some(timeout);
        self
    }

    /// Lets entry points match while the conversation is in progress.
    pub fn allow_reentry(mut self, allow: bool) -> Self {
        self.conversation.allow_reentry = allow;
        self
    }

    /// Finishes the conversation.
    pub fn build(self) -> Conversation {
        self.conversation
    }
}
