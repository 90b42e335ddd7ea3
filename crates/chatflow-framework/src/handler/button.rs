//! Handlers for button presses and chosen inline results.
//!
//! Each of these answers for a single action. Matching peeks at the registry
//! to see which action the inbound id was issued for; the payload is resolved
//! only during context collection.

use std::sync::Arc;

use futures::future::BoxFuture;

use chatflow_core::{ActionId, CallbackId, Update, UpdateKind, codec};

use super::traits::{
    BoxedCallback, Callback, Handler, MatchEnv, MatchExtra, MatchResult, run_callback,
};
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::outcome::Outcome;

fn match_action(env: &MatchEnv<'_>, action: &ActionId, id: CallbackId) -> bool {
    env.registry
        .peek_action(id)
        .is_ok_and(|issued| &issued == action)
}

/// Resolves a chat-bound callback into the context.
fn collect_chat_bound(ctx: &mut FlowContext, extra: &MatchExtra) -> Result<(), FlowError> {
    let MatchExtra::Callback { id } = extra else {
        return Ok(());
    };
    let update = ctx.update();
    let chat = update.chat.ok_or(FlowError::NoChat(update.id))?;
    ctx.payload = ctx.registry().lookup_chat_bound(chat, *id)?;
    ctx.callback = Some(*id);
    Ok(())
}

// ============================================================================
// Inline keyboard presses
// ============================================================================

/// Handles inline-keyboard presses of one action.
pub struct CallbackQueryHandler {
    name: String,
    action: ActionId,
    callback: BoxedCallback,
}

impl CallbackQueryHandler {
    /// Handles inline presses of buttons issued for `action`.
    pub fn new(action: impl Into<ActionId>, callback: impl Callback) -> Self {
        Self::with_callback(action.into(), Arc::new(callback))
    }

    pub(crate) fn with_callback(action: ActionId, callback: BoxedCallback) -> Self {
        Self {
            name: format!("callback_query({action})"),
            action,
            callback,
        }
    }
}

impl Handler for CallbackQueryHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, env: &MatchEnv<'_>) -> MatchResult {
        let id = update.callback_data().and_then(CallbackId::parse);
        match id {
            Some(id) if match_action(env, &self.action, id) => {
                MatchResult::Matched(MatchExtra::Callback { id })
            }
            _ => MatchResult::NoMatch,
        }
    }

    fn collect_context(&self, ctx: &mut FlowContext, extra: &MatchExtra) -> Result<(), FlowError> {
        collect_chat_bound(ctx, extra)
    }

    fn invoke(
        &self,
        ctx: Arc<FlowContext>,
        _extra: &MatchExtra,
    ) -> BoxFuture<'static, Result<Outcome, FlowError>> {
        run_callback(&self.name, &self.callback, ctx)
    }

    fn actions(&self) -> Vec<ActionId> {
        vec![self.action.clone()]
    }
}

// ============================================================================
// Reply keyboard presses
// ============================================================================

/// Handles reply-keyboard presses of one action.
///
/// A reply key sends its caption back as an ordinary text message; the
/// callback id is recovered from the invisible token in front of it.
pub struct ReplyButtonHandler {
    name: String,
    action: ActionId,
    callback: BoxedCallback,
}

impl ReplyButtonHandler {
    /// Handles reply presses of buttons issued for `action`.
    pub fn new(action: impl Into<ActionId>, callback: impl Callback) -> Self {
        Self::with_callback(action.into(), Arc::new(callback))
    }

    pub(crate) fn with_callback(action: ActionId, callback: BoxedCallback) -> Self {
        Self {
            name: format!("reply_button({action})"),
            action,
            callback,
        }
    }
}

impl Handler for ReplyButtonHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, env: &MatchEnv<'_>) -> MatchResult {
        let UpdateKind::Text { text } = &update.kind else {
            return MatchResult::NoMatch;
        };
        let id = codec::extract(text)
            .and_then(|n| u32::try_from(n).ok())
            .map(CallbackId::Counter);
        match id {
            Some(id) if match_action(env, &self.action, id) => {
                MatchResult::Matched(MatchExtra::Callback { id })
            }
            _ => MatchResult::NoMatch,
        }
    }

    fn collect_context(&self, ctx: &mut FlowContext, extra: &MatchExtra) -> Result<(), FlowError> {
        collect_chat_bound(ctx, extra)
    }

    fn invoke(
        &self,
        ctx: Arc<FlowContext>,
        _extra: &MatchExtra,
    ) -> BoxFuture<'static, Result<Outcome, FlowError>> {
        run_callback(&self.name, &self.callback, ctx)
    }

    fn actions(&self) -> Vec<ActionId> {
        vec![self.action.clone()]
    }
}

// ============================================================================
// Chosen inline results
// ============================================================================

/// Handles chosen inline results of one action.
///
/// The result id is expected to be a callback id; failing that, a token
/// embedded in the query text is used. Chosen results carry no chat, so the
/// payload is resolved without the chat check.
pub struct ChosenResultHandler {
    name: String,
    action: ActionId,
    callback: BoxedCallback,
}

impl ChosenResultHandler {
    /// Handles chosen results issued for `action`.
    pub fn new(action: impl Into<ActionId>, callback: impl Callback) -> Self {
        Self::with_callback(action.into(), Arc::new(callback))
    }

    pub(crate) fn with_callback(action: ActionId, callback: BoxedCallback) -> Self {
        Self {
            name: format!("chosen_result({action})"),
            action,
            callback,
        }
    }
}

impl Handler for ChosenResultHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, env: &MatchEnv<'_>) -> MatchResult {
        let UpdateKind::ChosenResult { result_id, query } = &update.kind else {
            return MatchResult::NoMatch;
        };
        // A numeric result id is not necessarily ours; fall back to the query.
        let from_result = CallbackId::parse(result_id);
        let from_query = codec::extract(query)
            .and_then(|n| u32::try_from(n).ok())
            .map(CallbackId::Counter);
        match from_result
            .into_iter()
            .chain(from_query)
            .find(|id| match_action(env, &self.action, *id))
        {
            Some(id) => MatchResult::Matched(MatchExtra::Chosen { id }),
            None => MatchResult::NoMatch,
        }
    }

    fn collect_context(&self, ctx: &mut FlowContext, extra: &MatchExtra) -> Result<(), FlowError> {
        if let MatchExtra::Chosen { id } = extra {
            let entry = ctx.registry().lookup(*id)?;
            ctx.payload = entry.payload().cloned();
            ctx.callback = Some(*id);
        }
        Ok(())
    }

    fn invoke(
        &self,
        ctx: Arc<FlowContext>,
        _extra: &MatchExtra,
    ) -> BoxFuture<'static, Result<Outcome, FlowError>> {
        run_callback(&self.name, &self.callback, ctx)
    }

    fn actions(&self) -> Vec<ActionId> {
        vec![self.action.clone()]
    }
}
