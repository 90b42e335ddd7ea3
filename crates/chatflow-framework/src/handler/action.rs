//! The composite handler behind an [`Action`].

use std::sync::Arc;

use futures::future::BoxFuture;

use chatflow_core::{ActionId, Update};

use super::button::{CallbackQueryHandler, ChosenResultHandler, ReplyButtonHandler};
use super::command::CommandHandler;
use super::traits::{
    BoxedCallback, BoxedHandler, Callback, Handler, MatchEnv, MatchExtra, MatchResult,
    run_callback,
};
use crate::action::Action;
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::outcome::Outcome;

/// Handles every way an action can be triggered.
///
/// Depending on the action's flags this combines a reply-button handler, an
/// inline-button handler, a chosen-result handler and a command handler, all
/// running the same callback. The first sub-handler that matches wins, in
/// that order.
///
/// An `ActionHandler` is also what a [reroute](Action::reroute) into the
/// action invokes.
pub struct ActionHandler {
    name: String,
    action: Arc<Action>,
    handlers: Vec<BoxedHandler>,
    callback: BoxedCallback,
}

impl ActionHandler {
    /// Builds the handler for `action`.
    pub fn new(action: &Arc<Action>, callback: impl Callback) -> Self {
        let callback: BoxedCallback = Arc::new(callback);
        let id = action.id().clone();

        let mut handlers: Vec<BoxedHandler> = Vec::new();
        if action.allows_reply_buttons() {
            handlers.push(Arc::new(ReplyButtonHandler::with_callback(
                id.clone(),
                Arc::clone(&callback),
            )));
        }
        if action.allows_inline_buttons() {
            handlers.push(Arc::new(CallbackQueryHandler::with_callback(
                id.clone(),
                Arc::clone(&callback),
            )));
            handlers.push(Arc::new(ChosenResultHandler::with_callback(
                id.clone(),
                Arc::clone(&callback),
            )));
        }
        if !action.commands().is_empty() {
            handlers.push(Arc::new(CommandHandler::with_callback(
                action.commands(),
                Arc::clone(&callback),
            )));
        }

        Self {
            name: format!("action({id})"),
            action: Arc::clone(action),
            handlers,
            callback,
        }
    }

    /// The action this handler serves.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }
}

impl Handler for ActionHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, env: &MatchEnv<'_>) -> MatchResult {
        self.handlers
            .iter()
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
        ctx.action = Some(Arc::clone(&self.action));
        match extra {
            MatchExtra::Delegated { handler, inner } => handler.collect_context(ctx, inner),
            _ => Ok(()),
        }
    }

    fn invoke(
        &self,
        ctx: Arc<FlowContext>,
        _extra: &MatchExtra,
    ) -> BoxFuture<'static, Result<Outcome, FlowError>> {
        run_callback(&self.name, &self.callback, ctx)
    }

    fn actions(&self) -> Vec<ActionId> {
        vec![self.action.id().clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Payload;
    use crate::testing;
    use chatflow_core::codec;

    async fn noop(_ctx: Arc<FlowContext>) {}

    #[test]
    fn test_sub_handlers_follow_action_flags() {
        let services = testing::services();
        let registry = Arc::clone(services.registry());
        let env = MatchEnv {
            registry: &registry,
        };

        let inline_only = Action::builder("done").buttons(false).build();
        let handler = ActionHandler::new(&inline_only, noop);

        let reply = registry.create(inline_only.id(), None, false);
        let n = u64::from(reply.id().as_counter().unwrap());
        assert!(!handler.check(&Update::message(1, 1, 1, codec::embed("Done", n)), &env).is_match());

        let inline = registry.create(inline_only.id(), None, true);
        let press = Update::callback_query(2, 1, 1, inline.id().to_string());
        assert!(matches!(
            handler.check(&press, &env),
            MatchResult::Matched(MatchExtra::Delegated { .. })
        ));
        assert!(!handler.check(&Update::message(3, 1, 1, "/done"), &env).is_match());
    }

    #[test]
    fn test_command_and_collect_sets_action() {
        let services = testing::services();
        let registry = Arc::clone(services.registry());
        let env = MatchEnv {
            registry: &registry,
        };
        let add = Action::builder("add").commands(["add", "todo"]).build();
        let handler = ActionHandler::new(&add, noop);
        assert_eq!(handler.actions(), vec![ActionId::from("add")]);

        let update = Update::message(1, 1, 1, "/todo milk");
        let MatchResult::Matched(extra) = handler.check(&update, &env) else {
            panic!("expected the command to match");
        };
        let mut ctx = testing::context_with(update, &services);
        handler.collect_context(&mut ctx, &extra).unwrap();
        assert_eq!(ctx.action().map(|a| a.id().as_str()), Some("add"));
        assert_eq!(ctx.args(), ["milk"]);
    }

    #[tokio::test]
    async fn test_invoke_runs_shared_callback() {
        let services = testing::services();
        let registry = Arc::clone(services.registry());
        let env = MatchEnv {
            registry: &registry,
        };
        let toggle = Action::builder("toggle").payload_type::<u32>().build();
        let handler = ActionHandler::new(&toggle, |ctx: Arc<FlowContext>| async move {
            let index = ctx.payload_as::<u32>().copied().unwrap_or_default();
            Outcome::to(format!("item-{index}"))
        });

        let entry = registry.create(toggle.id(), Some(Payload::new(3u32)), true);
        registry.bind_chat(entry.id(), 1).unwrap();
        let press = Update::callback_query(1, 1, 1, entry.id().to_string());
        let MatchResult::Matched(extra) = handler.check(&press, &env) else {
            panic!("expected the press to match");
        };

        let mut ctx = testing::context_with(press, &services);
        handler.collect_context(&mut ctx, &extra).unwrap();
        let outcome = handler.invoke(Arc::new(ctx), &extra).await.unwrap();
        assert!(matches!(outcome, Outcome::Transition(state) if state.as_str() == "item-3"));
    }
}
