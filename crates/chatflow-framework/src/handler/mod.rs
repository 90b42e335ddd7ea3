//! Handlers and the callback contract.
//!
//! Every handler implements [`Handler`]. The concrete kinds are:
//!
//! - **Commands** ([`CommandHandler`]) – `/name args...` messages
//! - **Messages** ([`MessageHandler`], [`RegexHandler`]) – free text, by
//!   [`Filter`](crate::filter::Filter) or regular expression
//! - **Buttons** ([`CallbackQueryHandler`], [`ReplyButtonHandler`],
//!   [`ChosenResultHandler`]) – presses of buttons issued for one action
//! - **Actions** ([`ActionHandler`]) – all of the above for one
//!   [`Action`](crate::action::Action), sharing one callback
//!
//! ```rust,ignore
//! let add = Action::builder("add").caption("Add ➕").command("add").build();
//!
//! dispatcher.add_handler(0, ActionHandler::new(&add, |ctx: Arc<FlowContext>| async move {
//!     ctx.reply("What should I add?", None).await?;
//!     Ok::<_, SendError>(Outcome::to("AWAITING_TEXT"))
//! }));
//! ```

pub mod action;
pub mod button;
pub mod command;
pub mod message;
pub mod traits;

pub use action::ActionHandler;
pub use button::{CallbackQueryHandler, ChosenResultHandler, ReplyButtonHandler};
pub use command::CommandHandler;
pub use message::{MessageHandler, RegexHandler};
pub use traits::{BoxedCallback, BoxedHandler, Callback, Handler, MatchEnv, MatchExtra, MatchResult};
