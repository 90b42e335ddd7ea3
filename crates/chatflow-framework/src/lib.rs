//! # Chatflow Framework
//!
//! Building blocks for button-driven chat bots.
//!
//! This layer provides:
//! - **Actions and buttons**: an [`Action`] is a named piece of bot
//!   functionality; a [`Button`] triggers it from a reply or inline keyboard
//! - **Callback registry**: [`CallbackRegistry`] maps issued callback ids to
//!   actions and payloads, bound to the chat the button was sent to
//! - **Handlers**: commands, text, regex, button presses and chosen results,
//!   all behind the [`Handler`] trait
//! - **Conversations**: per user and chat state machines over handlers
//! - **Dispatcher**: runs updates through handler groups, follows reroutes
//!   and applies outcomes
//!
//! ```rust,ignore
//! use chatflow_framework::prelude::*;
//!
//! let add = Action::builder("add").caption("Add ➕").command("add").build();
//!
//! let mut dispatcher = Dispatcher::new(registry, transport);
//! dispatcher.add_handler(0, ActionHandler::new(&add, |ctx: Arc<FlowContext>| async move {
//!     ctx.reply("What should I add?", None).await?;
//!     Ok::<_, SendError>(Outcome::to("AWAITING_TEXT"))
//! }));
//! ```

pub mod action;
pub mod button;
pub mod context;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod handler;
pub mod markup;
pub mod outbox;
pub mod outcome;
pub mod registry;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Action, ActionBuilder, Caption, CaptionFn, Payload, PayloadType};
pub use button::{Button, MAX_CAPTION_LEN, PLATFORM_TEXT_LIMIT, SwitchInline};
pub use context::{DataMap, FlowContext};
pub use conversation::{Conversation, ConversationBuilder, ConversationState};
pub use dispatcher::{DEFAULT_MAX_REROUTE_DEPTH, Dispatcher, ErrorHandler};
pub use error::{
    ActionError, BoxError, ButtonError, FlowError, FlowResult, RegistryError, SendError,
};
pub use filter::Filter;
pub use handler::{
    ActionHandler, BoxedCallback, BoxedHandler, Callback, CallbackQueryHandler,
    ChosenResultHandler, CommandHandler, Handler, MatchEnv, MatchExtra, MatchResult,
    MessageHandler, RegexHandler, ReplyButtonHandler,
};
pub use markup::{Key, Markup};
pub use outbox::Outbox;
pub use outcome::{IntoOutcome, Outcome, Reroute, StateId};
pub use registry::{CallbackEntry, CallbackRegistry, DEFAULT_CAPACITY, RegistryConfig};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Action, ActionHandler, Button, CallbackRegistry, CommandHandler, Conversation,
        Dispatcher, Filter, FlowContext, FlowError, Key, Markup, MessageHandler, Outcome,
        Payload, RegexHandler, SendError, StateId, SwitchInline,
    };
    pub use chatflow_core::prelude::*;
    pub use std::sync::Arc;
}
