//! # Chatflow
//!
//! Menu-driven chat bots: buttons that remember what they do, conversations
//! that remember where each user is, and a dispatcher that ties both to the
//! updates a chat API delivers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────┐     ┌────────────┐     ┌──────────────────┐
//! │ UpdateSource │────▶│  queue  │────▶│ lane (key) │────▶│    Dispatcher    │──▶ Transport
//! │ UpdateSender │     │         │────▶│ lane (key) │────▶│ groups/handlers  │
//! └──────────────┘     └─────────┘     └────────────┘     │ conversations    │
//!                                                         │ callback registry│
//!                                                         └──────────────────┘
//! ```
//!
//! - **Core**: updates, identifiers, the zero-width token codec, the
//!   [`Transport`](core::Transport) trait
//! - **Framework**: actions, buttons, the callback registry, handlers,
//!   conversations and the dispatcher
//! - **Runtime**: configuration, logging and the worker loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatflow::prelude::*;
//!
//! let start = Action::builder("start").caption("Back").command("start").build();
//!
//! let runtime = FlowRuntime::builder()
//!     .transport(MyTransport::new())
//!     .source(MyLongPoll::new())
//!     .setup(move |dispatcher| {
//!         dispatcher.add_handler(0, ActionHandler::new(&start, |ctx: Arc<FlowContext>| async move {
//!             ctx.reply("Your to-do list", None).await?;
//!             Ok::<_, SendError>(Outcome::End)
//!         }));
//!     })
//!     .build()?;
//!
//! runtime.run().await?;
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: read `chatflow.toml`
//! - `yaml-config`: read `chatflow.yaml`
//! - `json-log`: JSON log lines

pub use chatflow_core as core;
pub use chatflow_framework as framework;
pub use chatflow_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use chatflow::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use chatflow_runtime::{
        ChatflowConfig, ConfigLoader, FlowRuntime, UpdateSender, UpdateSource,
    };

    // Framework - actions, handlers, conversations
    pub use chatflow_framework::prelude::*;
    pub use chatflow_framework::{
        CallbackQueryHandler, ChosenResultHandler, Handler, Outbox, ReplyButtonHandler,
    };

    // Logging macros
    pub use chatflow_runtime::tracing::{debug, error, info, trace, warn};
}
