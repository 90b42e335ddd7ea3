//! The handler contract and user callbacks.
//!
//! Handling an update takes three steps:
//!
//! 1. [`Handler::check`] decides whether the handler applies. It may read the
//!    registry but never changes anything.
//! 2. [`Handler::collect_context`] moves what `check` found into the
//!    [`FlowContext`]: resolved payloads, command arguments, regex captures.
//! 3. [`Handler::invoke`] runs the user callback and yields an [`Outcome`].

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use chatflow_core::{ActionId, CallbackId, Update};

use crate::context::FlowContext;
use crate::error::{BoxError, FlowError};
use crate::outcome::{IntoOutcome, Outcome};
use crate::registry::CallbackRegistry;

// ============================================================================
// Matching
// ============================================================================

/// Read-only view of the dispatcher available while matching.
#[derive(Debug, Clone, Copy)]
pub struct MatchEnv<'a> {
    /// The callback registry, for peeking at callback actions.
    pub registry: &'a CallbackRegistry,
}

/// What a handler found while checking an update.
#[derive(Debug, Clone)]
pub enum MatchExtra {
    /// Matched, nothing extra to carry.
    Plain,
    /// A text command with its arguments.
    Command {
        /// Whitespace-separated arguments.
        args: Vec<String>,
    },
    /// A regex match on the message text.
    Captures {
        /// Positional groups; index 0 is the whole match.
        groups: Vec<Option<String>>,
        /// Named groups that participated in the match.
        named: Vec<(String, String)>,
    },
    /// A button press whose callback must be resolved against the chat.
    Callback {
        /// The pressed callback.
        id: CallbackId,
    },
    /// A chosen inline result; resolved without a chat.
    Chosen {
        /// The chosen callback.
        id: CallbackId,
    },
    /// A composite handler matched through one of its children.
    Delegated {
        /// The child that matched.
        handler: Arc<dyn Handler>,
        /// What the child found.
        inner: Box<MatchExtra>,
    },
    /// The handler is invoked as a reroute target, without a match.
    Rerouted,
}

/// Result of [`Handler::check`].
#[derive(Debug, Clone)]
pub enum MatchResult {
    /// The handler does not apply.
    NoMatch,
    /// The handler applies.
    Matched(MatchExtra),
}

impl MatchResult {
    /// Returns `true` for [`MatchResult::Matched`].
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// Something that can handle an update.
pub trait Handler: Send + Sync + 'static {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Decides whether this handler applies to `update`. Must not mutate state.
    fn check(&self, update: &Update, env: &MatchEnv<'_>) -> MatchResult;

    /// Copies what `check` found into the context.
    fn collect_context(&self, _ctx: &mut FlowContext, _extra: &MatchExtra) -> Result<(), FlowError> {
        Ok(())
    }

    /// Runs the handler.
    fn invoke(
        &self,
        ctx: Arc<FlowContext>,
        extra: &MatchExtra,
    ) -> BoxFuture<'static, Result<Outcome, FlowError>>;

    /// Actions this handler answers for when another handler reroutes to them.
    fn actions(&self) -> Vec<ActionId> {
        Vec::new()
    }
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({})", self.name())
    }
}

/// A shared handler trait object.
pub type BoxedHandler = Arc<dyn Handler>;

// ============================================================================
// Callbacks
// ============================================================================

/// A user callback: an async function of the context.
///
/// Implemented for every `Fn(Arc<FlowContext>) -> impl Future` whose output
/// implements [`IntoOutcome`]:
///
/// ```rust,ignore
/// async fn start(ctx: Arc<FlowContext>) -> Result<Outcome, SendError> {
///     ctx.reply("Your to-do list", Some(menu(&ctx)?)).await?;
///     Ok(Outcome::End)
/// }
/// ```
pub trait Callback: Send + Sync + 'static {
    /// Runs the callback.
    fn call(&self, ctx: Arc<FlowContext>) -> BoxFuture<'static, Result<Outcome, BoxError>>;
}

impl<F, Fut, R> Callback for F
where
    F: Fn(Arc<FlowContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome,
{
    fn call(&self, ctx: Arc<FlowContext>) -> BoxFuture<'static, Result<Outcome, BoxError>> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// A shared callback trait object.
pub type BoxedCallback = Arc<dyn Callback>;

/// Runs `callback` and attributes any error to `handler`.
pub(crate) fn run_callback(
    handler: &str,
    callback: &BoxedCallback,
    ctx: Arc<FlowContext>,
) -> BoxFuture<'static, Result<Outcome, FlowError>> {
    let handler = handler.to_string();
    let fut = callback.call(ctx);
    Box::pin(async move {
        fut.await
            .map_err(|source| FlowError::Callback { handler, source })
    })
}
