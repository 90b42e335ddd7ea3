//! Integration layer - the boundary to the remote chat API.
//!
//! The core never talks to the network itself. It renders [`OutboundMessage`]s
//! and hands them to whatever [`Transport`] the embedder supplies.

pub mod transport;
pub mod wire;

pub use transport::{BoxedTransport, Transport};
pub use wire::{Keyboard, OutboundMessage, RenderedButton, SentMessage, SurfaceKind};
