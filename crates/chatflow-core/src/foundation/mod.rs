//! Foundation layer - the data every other layer speaks.
//!
//! - Inbound update model and conversation keys
//! - Action and callback identifiers
//! - The zero-width binary token codec

pub mod codec;
pub mod ids;
pub mod update;

pub use ids::{ActionId, COUNTER_CEILING, CallbackId};
pub use update::{ChatId, ConversationKey, Update, UpdateKind, UserId};
