//! Identifiers for actions and issued callbacks.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The largest counter-mode callback id. Counter ids fit in 20 bits so their
/// zero-width encoding stays short enough to ride along in a button caption.
pub const COUNTER_CEILING: u32 = (1 << 20) - 1;

/// Stable identifier of an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Arc<str>);

impl ActionId {
    /// Creates an action id from any string.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an entry in the callback registry.
///
/// Random ids are 128-bit UUIDs and are used wherever a structured data field
/// is available. Counter ids are small, wrap around at [`COUNTER_CEILING`] and
/// are used where the id has to be smuggled through visible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackId {
    /// A globally unique random token.
    Random(Uuid),
    /// A value of the shared wrapping counter.
    Counter(u32),
}

impl CallbackId {
    /// Mints a fresh random id.
    pub fn random() -> Self {
        Self::Random(Uuid::new_v4())
    }

    /// Parses the textual form produced by [`Display`](fmt::Display).
    ///
    /// Returns `None` for anything that is neither a UUID nor a decimal counter
    /// value within the ceiling.
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(uuid) = Uuid::parse_str(text) {
            return Some(Self::Random(uuid));
        }
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        text.parse::<u32>()
            .ok()
            .filter(|n| *n <= COUNTER_CEILING)
            .map(Self::Counter)
    }

    /// The counter value, if this is a counter-mode id.
    pub fn as_counter(&self) -> Option<u32> {
        match self {
            Self::Counter(n) => Some(*n),
            Self::Random(_) => None,
        }
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random(uuid) => write!(f, "{}", uuid.hyphenated()),
            Self::Counter(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_id_text_form() {
        let random = CallbackId::random();
        assert_eq!(random.to_string().len(), 36);
        assert_eq!(CallbackId::parse(&random.to_string()), Some(random));

        assert_eq!(CallbackId::parse("1048575"), Some(CallbackId::Counter(COUNTER_CEILING)));
        assert_eq!(CallbackId::parse("1048576"), None);
        assert_eq!(CallbackId::parse("+5"), None);
        assert_eq!(CallbackId::parse(""), None);
        assert_eq!(CallbackId::parse("delete:3"), None);
    }

    #[test]
    fn test_action_id_display() {
        let id = ActionId::from("add_init");
        assert_eq!(id.as_str(), "add_init");
        assert_eq!(id, ActionId::new(String::from("add_init")));
        assert_eq!(format!("{id}"), "add_init");
    }
}
