//! Composable update predicates.
//!
//! Filters are cheap to clone and combine with `&`, `|` and `!`:
//!
//! ```rust,ignore
//! let plain_text_here = Filter::text() & Filter::chat(42) & !Filter::regex("^skip")?;
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use regex::Regex;

use chatflow_core::{ChatId, Update, UpdateKind, UserId, codec};

type Predicate = Arc<dyn Fn(&Update) -> bool + Send + Sync>;

/// A predicate over updates.
#[derive(Clone)]
pub struct Filter {
    predicate: Predicate,
    name: Arc<str>,
}

impl Filter {
    /// Wraps a custom predicate.
    pub fn new<F>(name: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(f),
            name: Arc::from(name.as_ref()),
        }
    }

    /// Evaluates the filter.
    pub fn check(&self, update: &Update) -> bool {
        (self.predicate)(update)
    }

    /// Matches every update.
    pub fn all() -> Self {
        Self::new("all", |_| true)
    }

    /// Plain text messages that are neither commands nor reply-keyboard
    /// presses carrying a callback token.
    pub fn text() -> Self {
        Self::new("text", |update| {
            matches!(&update.kind, UpdateKind::Text { text } if codec::extract(text).is_none())
        })
    }

    /// Any non-command text message, including reply-keyboard presses.
    pub fn any_text() -> Self {
        Self::new("any_text", |update| {
            matches!(update.kind, UpdateKind::Text { .. })
        })
    }

    /// Any `/command` message.
    pub fn command() -> Self {
        Self::new("command", |update| {
            matches!(update.kind, UpdateKind::Command { .. })
        })
    }

    /// Messages whose visible text matches `pattern`.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(Self::new(format!("regex({pattern})"), move |update| {
            update
                .text()
                .is_some_and(|text| regex.is_match(codec::strip(text)))
        }))
    }

    /// Updates from `chat`.
    pub fn chat(chat: ChatId) -> Self {
        Self::new(format!("chat({chat})"), move |update| update.chat == Some(chat))
    }

    /// Updates sent by `user`.
    pub fn user(user: UserId) -> Self {
        Self::new(format!("user({user})"), move |update| update.sender == user)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({})", self.name)
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Self) -> Self::Output {
        let name = format!("({} & {})", self.name, rhs.name);
        Filter::new(name, move |update| self.check(update) && rhs.check(update))
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Self) -> Self::Output {
        let name = format!("({} | {})", self.name, rhs.name);
        Filter::new(name, move |update| self.check(update) || rhs.check(update))
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Self::Output {
        let name = format!("!{}", self.name);
        Filter::new(name, move |update| !self.check(update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_excludes_commands_and_tokens() {
        let text = Filter::text();
        assert!(text.check(&Update::message(1, 1, 1, "buy milk")));
        assert!(!text.check(&Update::message(2, 1, 1, "/start")));
        assert!(!text.check(&Update::message(3, 1, 1, codec::embed("Add", 4))));
        assert!(!text.check(&Update::callback_query(4, 1, 1, "data")));

        assert!(Filter::any_text().check(&Update::message(5, 1, 1, codec::embed("Add", 4))));
    }

    #[test]
    fn test_combinators() {
        let filter = (Filter::text() & Filter::chat(10)) | Filter::user(99);
        assert!(filter.check(&Update::message(1, 1, 10, "hi")));
        assert!(!filter.check(&Update::message(2, 1, 11, "hi")));
        assert!(filter.check(&Update::message(3, 99, 11, "/cmd")));

        let not_command = !Filter::command();
        assert!(not_command.check(&Update::message(4, 1, 1, "hi")));
        assert!(!not_command.check(&Update::message(5, 1, 1, "/hi")));
        assert_eq!(
            format!("{:?}", filter),
            "Filter(((text & chat(10)) | user(99)))"
        );
    }

    #[test]
    fn test_regex_matches_visible_text() {
        let filter = Filter::regex(r"^buy (\w+)$").unwrap();
        assert!(filter.check(&Update::message(1, 1, 1, "buy milk")));
        assert!(filter.check(&Update::message(2, 1, 1, codec::embed("buy eggs", 3))));
        assert!(!filter.check(&Update::message(3, 1, 1, "sell milk")));
        assert!(Filter::regex("(").is_err());
    }
}
