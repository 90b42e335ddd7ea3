//! # Chatflow Core
//!
//! The foundation of the chatflow dispatch stack.
//!
//! This crate holds the vocabulary shared by the framework and the runtime:
//! what an inbound update looks like, how callbacks are identified, how an
//! identifier is hidden inside visible text, and what the outbound transport
//! has to provide.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Updates**: [`Update`], [`UpdateKind`] and the [`ConversationKey`] that
//!   orders them
//! - **Identifiers**: [`ActionId`] and [`CallbackId`] (random or wrapping counter)
//! - **Token codec**: [`codec`] turns an integer into zero-width characters
//!   and back
//!
//! ### Integration Layer
//!
//! - **Wire types**: [`OutboundMessage`], [`Keyboard`], [`RenderedButton`]
//! - **Transport**: the [`Transport`] trait, the only thing the core needs
//!   from the network
//!
//! ## Example
//!
//! ```rust
//! use chatflow_core::codec;
//!
//! let caption = codec::embed("Add ➕", 42);
//! assert_eq!(codec::extract(&caption), Some(42));
//! assert_eq!(codec::strip(&caption), "Add ➕");
//! ```

pub mod error;
pub mod foundation;
pub mod integration;

pub use foundation::codec;

pub use error::{CodecError, TransportError, TransportResult};

pub use foundation::{
    ActionId, COUNTER_CEILING, CallbackId, ChatId, ConversationKey, Update, UpdateKind, UserId,
};

pub use integration::{
    BoxedTransport, Keyboard, OutboundMessage, RenderedButton, SentMessage, SurfaceKind,
    Transport,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::integration::{OutboundMessage, SentMessage, SurfaceKind, Transport};
    pub use super::{TransportError, TransportResult, codec};
}
