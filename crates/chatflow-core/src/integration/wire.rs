//! Outbound wire types.
//!
//! These are the already-rendered shapes a transport serializes: every button
//! caption is final, every callback id has been issued, and the keyboard knows
//! which surface it targets.

use serde::{Deserialize, Serialize};

use crate::foundation::ChatId;

/// The kind of keyboard a button is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// A reply keyboard. Pressing a key sends its caption back as plain text,
    /// so the callback id must travel inside the caption.
    Reply,
    /// An inline keyboard attached to a message. Keys carry structured
    /// callback data next to their caption.
    Inline,
}

impl SurfaceKind {
    /// Returns `true` for [`SurfaceKind::Inline`].
    pub fn is_inline(self) -> bool {
        matches!(self, Self::Inline)
    }
}

/// A single key, ready to be serialized.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedButton {
    /// The caption shown to the user. For reply keys this may carry an
    /// invisible token prefix.
    pub text: String,
    /// Structured callback data for inline keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    /// Inline query to prefill in any chat the user picks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_inline_query: Option<String>,
    /// Inline query to prefill in the current chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_inline_query_current_chat: Option<String>,
}

impl RenderedButton {
    /// A key without any callback, e.g. a plain reply-keyboard shortcut.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// A grid of rendered keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    /// Which surface every key in this keyboard targets.
    pub surface: SurfaceKind,
    /// Rows of keys, top to bottom.
    pub rows: Vec<Vec<RenderedButton>>,
}

impl Keyboard {
    /// Iterates over every key, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &RenderedButton> {
        self.rows.iter().flatten()
    }
}

/// A message the core asks the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Destination chat.
    pub chat: ChatId,
    /// Message body.
    pub text: String,
    /// Optional keyboard attached to the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    /// A text message without a keyboard.
    pub fn text(chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat,
            text: text.into(),
            keyboard: None,
        }
    }
}

/// What the remote API reports back after a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Identifier of the delivered message.
    pub message_id: i64,
    /// The chat the message actually landed in.
    pub chat: ChatId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_message_serialization_skips_empty_fields() {
        let message = OutboundMessage {
            chat: 7,
            text: "menu".into(),
            keyboard: Some(Keyboard {
                surface: SurfaceKind::Inline,
                rows: vec![vec![RenderedButton {
                    text: "Add".into(),
                    callback_data: Some("42".into()),
                    ..RenderedButton::default()
                }]],
            }),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["keyboard"]["surface"], "inline");
        let key = &json["keyboard"]["rows"][0][0];
        assert_eq!(key["callback_data"], "42");
        assert!(key.get("switch_inline_query").is_none());

        let plain = serde_json::to_value(OutboundMessage::text(7, "hi")).unwrap();
        assert!(plain.get("keyboard").is_none());
    }
}
