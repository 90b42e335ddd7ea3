//! `/command` handler.

use std::sync::Arc;

use futures::future::BoxFuture;

use chatflow_core::Update;

use super::traits::{
    BoxedCallback, Callback, Handler, MatchEnv, MatchExtra, MatchResult, run_callback,
};
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::filter::Filter;
use crate::outcome::Outcome;

/// Handles `/command` messages for a set of command names.
///
/// Names are compared case-insensitively and without the leading slash. The
/// command arguments are available through [`FlowContext::args`].
pub struct CommandHandler {
    name: String,
    commands: Vec<String>,
    filter: Option<Filter>,
    callback: BoxedCallback,
}

impl CommandHandler {
    /// Handles any of `commands`.
    pub fn new<I, S>(commands: I, callback: impl Callback) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_callback(commands, Arc::new(callback))
    }

    pub(crate) fn with_callback<I, S>(commands: I, callback: BoxedCallback) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let commands: Vec<String> = commands
            .into_iter()
            .map(|c| c.as_ref().trim_start_matches('/').to_ascii_lowercase())
            .collect();
        Self {
            name: format!("command(/{})", commands.join("|/")),
            commands,
            filter: None,
            callback,
        }
    }

    /// Additionally requires `filter` to pass.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl Handler for CommandHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, _env: &MatchEnv<'_>) -> MatchResult {
        let Some((command, args)) = update.command() else {
            return MatchResult::NoMatch;
        };
        if !self.commands.iter().any(|c| c == command) {
            return MatchResult::NoMatch;
        }
        if self.filter.as_ref().is_some_and(|f| !f.check(update)) {
            return MatchResult::NoMatch;
        }
        MatchResult::Matched(MatchExtra::Command {
            args: args.to_vec(),
        })
    }

    fn collect_context(&self, ctx: &mut FlowContext, extra: &MatchExtra) -> Result<(), FlowError> {
        if let MatchExtra::Command { args } = extra {
            ctx.args = args.clone();
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CallbackRegistry;

    async fn noop(_ctx: Arc<FlowContext>) {}

    #[test]
    fn test_matches_command_names() {
        let registry = CallbackRegistry::default();
        let env = MatchEnv {
            registry: &registry,
        };
        let handler = CommandHandler::new(["/Add", "todo"], noop);

        let MatchResult::Matched(MatchExtra::Command { args }) =
            handler.check(&Update::message(1, 1, 1, "/todo buy milk"), &env)
        else {
            panic!("expected a command match");
        };
        assert_eq!(args, ["buy", "milk"]);

        assert!(handler.check(&Update::message(2, 1, 1, "/ADD"), &env).is_match());
        assert!(!handler.check(&Update::message(3, 1, 1, "/start"), &env).is_match());
        assert!(!handler.check(&Update::message(4, 1, 1, "add"), &env).is_match());
        assert_eq!(handler.name(), "command(/add|/todo)");
    }

    #[test]
    fn test_filter_narrows_match() {
        let registry = CallbackRegistry::default();
        let env = MatchEnv {
            registry: &registry,
        };
        let handler = CommandHandler::new(["start"], noop).filter(Filter::chat(5));

        assert!(handler.check(&Update::message(1, 1, 5, "/start"), &env).is_match());
        assert!(!handler.check(&Update::message(2, 1, 6, "/start"), &env).is_match());
    }
}
