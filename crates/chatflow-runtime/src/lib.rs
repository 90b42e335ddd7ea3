//! Chatflow Runtime - the dispatch loop around a chatflow [`Dispatcher`].
//!
//! This crate provides:
//! - The update loop ([`FlowRuntime`]): a bounded inbound queue, keyed worker
//!   lanes, periodic conversation expiry and graceful shutdown
//! - Update intake: push with [`UpdateSender`] or pull with [`UpdateSource`]
//! - Layered configuration ([`config`]) and logging setup ([`logging`])
//!
//! ```rust,ignore
//! use chatflow_runtime::FlowRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = FlowRuntime::builder()
//!         .transport(MyTransport::new())
//!         .source(MyLongPoll::new())
//!         .setup(register_handlers)
//!         .build()?;
//!
//!     let stats = runtime.run().await?;
//!     println!("handled {} updates", stats.handled);
//!     Ok(())
//! }
//! ```
//!
//! [`Dispatcher`]: chatflow_framework::Dispatcher

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod source;

pub use config::{ChatflowConfig, ConfigError, ConfigLoader, ConfigResult, load_config};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingGuard, SpanEvents};
pub use runtime::{FlowRuntime, RuntimeBuilder, RuntimeStats, lane_for};
pub use source::{BoxedUpdateSource, UpdateSender, UpdateSource};

pub use tokio_util::sync::CancellationToken;

// Re-export tracing for use by bot crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Brings the runtime types plus the `tracing` macros into scope.
pub mod prelude {
    pub use super::{ChatflowConfig, FlowRuntime, UpdateSender, UpdateSource};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
