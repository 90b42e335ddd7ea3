//! Error types for the chatflow framework.

use chatflow_core::{ActionId, CallbackId, ChatId, SurfaceKind, TransportError};
use thiserror::Error;

/// Boxed error returned by user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised by the [`CallbackRegistry`](crate::registry::CallbackRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The id was never issued, has been evicted, or was single-use and
    /// already consumed.
    #[error("callback {0} not found")]
    NotFound(CallbackId),

    /// The message carrying this callback has not been sent yet.
    #[error("callback {0} is not bound to a chat yet")]
    UnboundCallback(CallbackId),

    /// The callback belongs to a different chat than the one asking for it.
    #[error("callback {id} does not belong to chat {requested}")]
    ChatMismatch {
        /// The callback that was looked up.
        id: CallbackId,
        /// The chat that tried to use it.
        requested: ChatId,
    },

    /// `bind_chat` was called on an entry that already has an owner.
    #[error("callback {id} is already bound to chat {chat}")]
    AlreadyBound {
        /// The callback that was bound twice.
        id: CallbackId,
        /// The chat it is bound to.
        chat: ChatId,
    },
}

// =============================================================================
// Action and Button Errors
// =============================================================================

/// Errors raised when a payload does not fit an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The payload is not an instance of the action's payload type.
    #[error("action '{action}' expects a payload of type {expected}, got {got}")]
    PayloadMismatch {
        /// The action the payload was meant for.
        action: ActionId,
        /// Declared payload type.
        expected: &'static str,
        /// Type of the supplied payload.
        got: &'static str,
    },
}

/// Errors raised while building or finalizing a [`Button`](crate::button::Button).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ButtonError {
    /// Neither the button nor its action provide a caption.
    #[error("neither the button nor action '{0}' has a caption")]
    MissingCaption(ActionId),

    /// The resolved caption is empty.
    #[error("caption for action '{0}' is empty")]
    EmptyCaption(ActionId),

    /// The resolved caption leaves no room for the callback token.
    #[error("caption for action '{action}' is {len} characters long, at most {max} are allowed")]
    CaptionTooLong {
        /// The action the button triggers.
        action: ActionId,
        /// Length of the caption in characters.
        len: usize,
        /// The ceiling.
        max: usize,
    },

    /// The payload does not match the action's payload type.
    #[error(transparent)]
    PayloadMismatch(#[from] ActionError),

    /// The action does not allow buttons on this surface.
    #[error("action '{action}' cannot be rendered on a {surface:?} keyboard")]
    SurfaceNotAllowed {
        /// The action the button triggers.
        action: ActionId,
        /// The rejected surface.
        surface: SurfaceKind,
    },

    /// Switch-inline buttons only exist on inline keyboards.
    #[error("switch-inline button for action '{0}' placed on a reply keyboard")]
    SwitchInlineOnReply(ActionId),

    /// `finalize` was called before the surface was known.
    #[error("button for action '{0}' was finalized before its surface was set")]
    IllegalState(ActionId),
}

// =============================================================================
// Send Errors
// =============================================================================

/// Errors raised while rendering and sending a message.
#[derive(Debug, Error)]
pub enum SendError {
    /// A button in the markup could not be finalized.
    #[error(transparent)]
    Button(#[from] ButtonError),

    /// The transport failed to deliver the message.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The update has no chat to reply to.
    #[error("update {0} has no chat to reply to")]
    NoChat(u64),
}

// =============================================================================
// Flow Errors
// =============================================================================

/// Errors raised while dispatching an update.
///
/// None of these are fatal: the dispatcher logs them, hands them to the
/// registered error handlers and carries on with the next update.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Resolving a callback payload failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A reroute carried a payload the target action does not accept.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// A user callback returned an error.
    #[error("handler '{handler}' failed: {source}")]
    Callback {
        /// Name of the failing handler.
        handler: String,
        /// The error the callback returned.
        #[source]
        source: BoxError,
    },

    /// A reroute targets an action no handler answers for.
    #[error("no handler is registered for action '{0}'")]
    UnknownAction(ActionId),

    /// Reroutes kept chaining past the configured limit.
    #[error("reroute chain exceeded {0} hops")]
    RerouteDepthExceeded(usize),

    /// A callback update arrived without a chat.
    #[error("update {0} carries a callback but no chat")]
    NoChat(u64),

    /// A handler was invoked with a match it did not produce.
    #[error("handler '{0}' was invoked with a foreign match")]
    InvalidMatch(String),
}

/// Result type for dispatch operations.
pub type FlowResult<T> = Result<T, FlowError>;
