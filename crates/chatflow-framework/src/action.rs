//! Actions and the payloads they carry.
//!
//! An [`Action`] names one unit of bot functionality: a caption for the
//! buttons that trigger it, the text commands that reach it, the type of
//! payload its buttons carry and the keyboard surfaces it may appear on.
//! Actions are built once during setup and shared as `Arc<Action>`.
//!
//! ```rust,ignore
//! let delete = Action::builder("delete")
//!     .caption_fn(|p| match p.and_then(|p| p.downcast_ref::<Item>()) {
//!         Some(item) => format!("🗑 {}", item.title),
//!         None => "🗑".to_string(),
//!     })
//!     .payload_type::<Item>()
//!     .build();
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use chatflow_core::{ActionId, SurfaceKind};

use crate::error::ActionError;
use crate::outcome::{Outcome, Reroute};

// =============================================================================
// Payload
// =============================================================================

/// An opaque value attached to a button and handed back to the handler when
/// the button is pressed.
///
/// Cloning is cheap; the value itself is shared.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wraps `value`.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns a reference to the value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if the value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn value_type_id(&self) -> TypeId {
        (*self.value).type_id()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload<{}>", self.type_name)
    }
}

/// The declared payload type of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    /// The payload type for `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Name of the type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if `payload` holds a value of this type.
    pub fn matches(&self, payload: &Payload) -> bool {
        payload.value_type_id() == self.id
    }
}

// =============================================================================
// Caption
// =============================================================================

/// A caption function. Receives the button's payload, if any.
pub type CaptionFn = Arc<dyn Fn(Option<&Payload>) -> String + Send + Sync>;

/// How an action labels its buttons.
#[derive(Clone)]
pub enum Caption {
    /// A fixed label.
    Static(Arc<str>),
    /// A label computed from the payload each time a button is rendered.
    Computed(CaptionFn),
}

impl Caption {
    /// Resolves the label for `payload`.
    pub fn resolve(&self, payload: Option<&Payload>) -> String {
        match self {
            Self::Static(text) => text.to_string(),
            Self::Computed(f) => f(payload),
        }
    }
}

impl fmt::Debug for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// A nameable, parametrized unit of bot functionality.
#[derive(Debug)]
pub struct Action {
    id: ActionId,
    caption: Option<Caption>,
    commands: Vec<String>,
    payload_type: Option<PayloadType>,
    buttons: bool,
    inline_buttons: bool,
}

impl Action {
    /// Starts building an action with the given id.
    pub fn builder(id: impl Into<ActionId>) -> ActionBuilder {
        ActionBuilder {
            action: Action {
                id: id.into(),
                caption: None,
                commands: Vec::new(),
                payload_type: None,
                buttons: true,
                inline_buttons: true,
            },
        }
    }

    /// The action id.
    pub fn id(&self) -> &ActionId {
        &self.id
    }

    /// The configured caption, if any.
    pub fn caption(&self) -> Option<&Caption> {
        self.caption.as_ref()
    }

    /// Text commands that trigger this action, lowercased and without `/`.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// The declared payload type, if any.
    pub fn payload_type(&self) -> Option<PayloadType> {
        self.payload_type
    }

    /// Whether reply-keyboard buttons may trigger this action.
    pub fn allows_reply_buttons(&self) -> bool {
        self.buttons
    }

    /// Whether inline-keyboard buttons may trigger this action.
    pub fn allows_inline_buttons(&self) -> bool {
        self.inline_buttons
    }

    /// Whether buttons for this action may be placed on `surface`.
    pub fn allows(&self, surface: SurfaceKind) -> bool {
        match surface {
            SurfaceKind::Reply => self.buttons,
            SurfaceKind::Inline => self.inline_buttons,
        }
    }

    /// Checks that `payload` is an instance of the declared payload type.
    ///
    /// Actions without a payload type accept anything.
    pub fn check_payload(&self, payload: &Payload) -> Result<(), ActionError> {
        match self.payload_type {
            Some(expected) if !expected.matches(payload) => Err(ActionError::PayloadMismatch {
                action: self.id.clone(),
                expected: expected.name(),
                got: payload.type_name(),
            }),
            _ => Ok(()),
        }
    }

    /// Resolves the caption for `payload`. Computed captions run every time.
    pub fn caption_for(&self, payload: Option<&Payload>) -> Option<String> {
        self.caption.as_ref().map(|caption| caption.resolve(payload))
    }

    /// Builds an [`Outcome::Reroute`] into this action's handler.
    pub fn reroute(self: &Arc<Self>, payload: Option<Payload>) -> Result<Outcome, ActionError> {
        if let Some(payload) = &payload {
            self.check_payload(payload)?;
        }
        Ok(Outcome::Reroute(Reroute {
            action: Arc::clone(self),
            payload,
        }))
    }
}

/// Builder for [`Action`].
#[derive(Debug)]
pub struct ActionBuilder {
    action: Action,
}

impl ActionBuilder {
    /// Sets a fixed caption.
    pub fn caption(mut self, caption: impl AsRef<str>) -> Self {
        self.action.caption = Some(Caption::Static(Arc::from(caption.as_ref())));
        self
    }

    /// Sets a caption computed from the payload at render time.
    pub fn caption_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Payload>) -> String + Send + Sync + 'static,
    {
        self.action.caption = Some(Caption::Computed(Arc::new(f)));
        self
    }

    /// Adds a text command alias, with or without the leading slash.
    pub fn command(mut self, command: impl AsRef<str>) -> Self {
        let command = command.as_ref().trim_start_matches('/').to_ascii_lowercase();
        if !command.is_empty() && !self.action.commands.contains(&command) {
            self.action.commands.push(command);
        }
        self
    }

    /// Adds several text command aliases.
    pub fn commands<I, S>(self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        commands.into_iter().fold(self, |b, c| b.command(c))
    }

    /// Declares the payload type buttons of this action must carry.
    pub fn payload_type<T: Any + Send + Sync>(mut self) -> Self {
        self.action.payload_type = Some(PayloadType::of::<T>());
        self
    }

    /// Allows or forbids reply-keyboard buttons. Allowed by default.
    pub fn buttons(mut self, allowed: bool) -> Self {
        self.action.buttons = allowed;
        self
    }

    /// Allows or forbids inline-keyboard buttons. Allowed by default.
    pub fn inline_buttons(mut self, allowed: bool) -> Self {
        self.action.inline_buttons = allowed;
        self
    }

    /// Finishes the action.
    pub fn build(self) -> Arc<Action> {
        Arc::new(self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Item {
        title: String,
    }

    #[test]
    fn test_builder_defaults_and_commands() {
        let action = Action::builder("add_init")
            .caption("Add ➕")
            .commands(["/Add", "todo", "add"])
            .build();

        assert_eq!(action.id().as_str(), "add_init");
        assert_eq!(action.commands(), ["add", "todo"]);
        assert!(action.allows(SurfaceKind::Reply));
        assert!(action.allows(SurfaceKind::Inline));
        assert_eq!(action.caption_for(None).as_deref(), Some("Add ➕"));
    }

    #[test]
    fn test_check_payload() {
        let action = Action::builder("delete").payload_type::<Item>().build();

        let good = Payload::new(Item {
            title: "milk".into(),
        });
        assert!(action.check_payload(&good).is_ok());

        let bad = Payload::new(42u32);
        assert_eq!(
            action.check_payload(&bad),
            Err(ActionError::PayloadMismatch {
                action: ActionId::from("delete"),
                expected: std::any::type_name::<Item>(),
                got: "u32",
            })
        );

        let untyped = Action::builder("any").build();
        assert!(untyped.check_payload(&bad).is_ok());
    }

    #[test]
    fn test_computed_caption_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let action = Action::builder("done")
            .caption_fn(move |payload| {
                counter.fetch_add(1, Ordering::SeqCst);
                payload
                    .and_then(|p| p.downcast_ref::<Item>())
                    .map(|item| format!("📋 {}", item.title))
                    .unwrap_or_default()
            })
            .build();

        let milk = Payload::new(Item {
            title: "milk".into(),
        });
        let eggs = Payload::new(Item {
            title: "eggs".into(),
        });
        assert_eq!(action.caption_for(Some(&milk)).as_deref(), Some("📋 milk"));
        assert_eq!(action.caption_for(Some(&eggs)).as_deref(), Some("📋 eggs"));
        assert_eq!(action.caption_for(None).as_deref(), Some(""));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_reroute_validates_payload() {
        let action = Action::builder("delete").payload_type::<Item>().build();

        assert!(action.reroute(Some(Payload::new("nope"))).is_err());
        assert!(matches!(action.reroute(None), Ok(Outcome::Reroute(_))));

        let outcome = action
            .reroute(Some(Payload::new(Item {
                title: "milk".into(),
            })))
            .unwrap();
        let Outcome::Reroute(reroute) = outcome else {
            panic!("expected a reroute");
        };
        assert_eq!(reroute.action().id().as_str(), "delete");
        assert!(reroute.payload().is_some_and(|p| p.is::<Item>()));
    }
}
