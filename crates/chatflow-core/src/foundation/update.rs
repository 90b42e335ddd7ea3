//! Inbound update model.
//!
//! An [`Update`] is the unit the dispatcher consumes. It is deliberately small:
//! the sender, the chat (absent for chosen inline results), and a tagged
//! [`UpdateKind`] carrying the raw text or callback data. Transports translate
//! whatever their remote API delivers into this shape.

use serde::{Deserialize, Serialize};

/// Identifier of a user on the remote platform.
pub type UserId = i64;

/// Identifier of a chat on the remote platform.
pub type ChatId = i64;

/// The key under which per-conversation state is stored and serialized.
///
/// Updates that share a key are processed strictly one after another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// The user that produced the update.
    pub user: UserId,
    /// The chat the update belongs to, if known.
    pub chat: Option<ChatId>,
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chat {
            Some(chat) => write!(f, "{}@{}", self.user, chat),
            None => write!(f, "{}@-", self.user),
        }
    }
}

/// The payload of an [`Update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    /// A text message that starts with a `/command`.
    Command {
        /// The command name, lowercased, without the leading slash or `@bot` suffix.
        command: String,
        /// Whitespace-separated arguments following the command.
        args: Vec<String>,
        /// The full original text.
        text: String,
    },
    /// Any other text message, including presses of reply-keyboard buttons.
    Text {
        /// The raw message text.
        text: String,
    },
    /// A press of an inline button carrying structured callback data.
    CallbackQuery {
        /// The raw callback data.
        data: String,
    },
    /// The user picked a result from an inline query.
    ChosenResult {
        /// Identifier of the chosen result.
        result_id: String,
        /// The inline query text that produced the result.
        query: String,
    },
}

impl UpdateKind {
    /// A short, stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Text { .. } => "text",
            Self::CallbackQuery { .. } => "callback_query",
            Self::ChosenResult { .. } => "chosen_result",
        }
    }
}

/// An inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonic identifier assigned by the remote API.
    pub id: u64,
    /// The user that produced the update.
    pub sender: UserId,
    /// The chat the update happened in. `None` for chosen inline results.
    pub chat: Option<ChatId>,
    /// What happened.
    pub kind: UpdateKind,
}

impl Update {
    /// Builds a message update, classifying `/command args` texts as
    /// [`UpdateKind::Command`] and everything else as [`UpdateKind::Text`].
    pub fn message(id: u64, sender: UserId, chat: ChatId, text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = match parse_command(&text) {
            Some((command, args)) => UpdateKind::Command {
                command,
                args,
                text,
            },
            None => UpdateKind::Text { text },
        };
        Self {
            id,
            sender,
            chat: Some(chat),
            kind,
        }
    }

    /// Builds an inline-button press.
    pub fn callback_query(id: u64, sender: UserId, chat: ChatId, data: impl Into<String>) -> Self {
        Self {
            id,
            sender,
            chat: Some(chat),
            kind: UpdateKind::CallbackQuery { data: data.into() },
        }
    }

    /// Builds a chosen inline result. These arrive without a chat.
    pub fn chosen_result(
        id: u64,
        sender: UserId,
        result_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sender,
            chat: None,
            kind: UpdateKind::ChosenResult {
                result_id: result_id.into(),
                query: query.into(),
            },
        }
    }

    /// The conversation this update belongs to.
    pub fn key(&self) -> ConversationKey {
        ConversationKey {
            user: self.sender,
            chat: self.chat,
        }
    }

    /// The message text for command and text updates.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::Command { text, .. } | UpdateKind::Text { text } => Some(text),
            _ => None,
        }
    }

    /// The callback data of an inline-button press.
    pub fn callback_data(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::CallbackQuery { data } => Some(data),
            _ => None,
        }
    }

    /// The command name and arguments of a command update.
    pub fn command(&self) -> Option<(&str, &[String])> {
        match &self.kind {
            UpdateKind::Command { command, args, .. } => Some((command, args)),
            _ => None,
        }
    }
}

/// Splits `/name@bot arg1 arg2` into `("name", ["arg1", "arg2"])`.
fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let rest = text.strip_prefix('/')?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((
        name.to_ascii_lowercase(),
        parts.map(str::to_string).collect(),
    ))
}
