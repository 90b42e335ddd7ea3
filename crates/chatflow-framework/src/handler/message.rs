//! Free-text handlers.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use chatflow_core::{Update, codec};

use super::traits::{
    BoxedCallback, Callback, Handler, MatchEnv, MatchExtra, MatchResult, run_callback,
};
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::filter::Filter;
use crate::outcome::Outcome;

/// Handles messages accepted by a [`Filter`].
pub struct MessageHandler {
    name: String,
    filter: Filter,
    callback: BoxedCallback,
}

impl MessageHandler {
    /// Handles every update `filter` accepts.
    pub fn new(filter: Filter, callback: impl Callback) -> Self {
        Self {
            name: format!("message({filter:?})"),
            filter,
            callback: Arc::new(callback),
        }
    }
}

impl Handler for MessageHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, _env: &MatchEnv<'_>) -> MatchResult {
        if update.text().is_some() && self.filter.check(update) {
            MatchResult::Matched(MatchExtra::Plain)
        } else {
            MatchResult::NoMatch
        }
    }

    fn invoke(
        &self,
        ctx: Arc<FlowContext>,
        _extra: &MatchExtra,
    ) -> BoxFuture<'static, Result<Outcome, FlowError>> {
        run_callback(&self.name, &self.callback, ctx)
    }
}

/// Handles messages whose visible text matches a regular expression.
///
/// Captures are exposed through [`FlowContext::captures`] and
/// [`FlowContext::named_capture`].
pub struct RegexHandler {
    name: String,
    regex: Regex,
    callback: BoxedCallback,
}

impl RegexHandler {
    /// Compiles `pattern` and handles matching messages.
    pub fn new(pattern: &str, callback: impl Callback) -> Result<Self, regex::Error> {
        Ok(Self {
            name: format!("regex({pattern})"),
            regex: Regex::new(pattern)?,
            callback: Arc::new(callback),
        })
    }
}

impl Handler for RegexHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, update: &Update, _env: &MatchEnv<'_>) -> MatchResult {
        let Some(text) = update.text().map(codec::strip) else {
            return MatchResult::NoMatch;
        };
        let Some(captures) = self.regex.captures(text) else {
            return MatchResult::NoMatch;
        };

        let groups = captures
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let named = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        MatchResult::Matched(MatchExtra::Captures { groups, named })
    }

    fn collect_context(&self, ctx: &mut FlowContext, extra: &MatchExtra) -> Result<(), FlowError> {
        if let MatchExtra::Captures { groups, named } = extra {
            ctx.captures = groups.clone();
            ctx.named = named.iter().cloned().collect();
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
    use crate::testing;

    async fn noop(_ctx: Arc<FlowContext>) {}

    #[test]
    fn test_message_handler_requires_text() {
        let registry = CallbackRegistry::default();
        let env = MatchEnv {
            registry: &registry,
        };
        let handler = MessageHandler::new(Filter::all(), noop);

        assert!(handler.check(&Update::message(1, 1, 1, "hi"), &env).is_match());
        assert!(!handler.check(&Update::callback_query(2, 1, 1, "x"), &env).is_match());
        assert!(!handler.check(&Update::chosen_result(3, 1, "r", "q"), &env).is_match());
    }

    #[test]
    fn test_regex_handler_collects_captures() {
        let registry = CallbackRegistry::default();
        let env = MatchEnv {
            registry: &registry,
        };
        let handler = RegexHandler::new(r"^buy (?P<what>\w+)(?: x(\d+))?$", noop).unwrap();

        let update = Update::message(1, 1, 1, codec::embed("buy milk", 9));
        let MatchResult::Matched(extra) = handler.check(&update, &env) else {
            panic!("expected a regex match");
        };

        let mut ctx = testing::context(update);
        handler.collect_context(&mut ctx, &extra).unwrap();
        assert_eq!(ctx.capture(0), Some("buy milk"));
        assert_eq!(ctx.capture(1), Some("milk"));
        assert_eq!(ctx.capture(2), None);
        assert_eq!(ctx.named_capture("what"), Some("milk"));

        assert!(!handler.check(&Update::message(2, 1, 1, "sell milk"), &env).is_match());
    }
}
