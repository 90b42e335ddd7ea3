//! What a handler asks the dispatcher to do next.
//!
//! Callbacks return anything implementing [`IntoOutcome`]; the dispatcher
//! turns it into an [`Outcome`] and feeds it to the owning conversation.

use std::fmt;
use std::sync::Arc;

use crate::action::{Action, Payload};
use crate::error::BoxError;

/// Name of a conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(Arc<str>);

impl StateId {
    /// Creates a state id.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the state name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StateId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to run another action's handler right away, without a round
/// trip through the transport.
///
/// Built through [`Action::reroute`], which validates the payload.
#[derive(Clone)]
pub struct Reroute {
    pub(crate) action: Arc<Action>,
    pub(crate) payload: Option<Payload>,
}

impl Reroute {
    /// The target action.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// The payload handed to the target handler.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}

impl fmt::Debug for Reroute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reroute")
            .field("action", self.action.id())
            .field("payload", &self.payload)
            .finish()
    }
}

/// The result of a handler invocation.
#[derive(Debug, Clone, Default)]
pub enum Outcome {
    /// Keep the current conversation state.
    #[default]
    Stay,
    /// Move the conversation to the given state.
    Transition(StateId),
    /// Finish the conversation. The next update starts from the entry points.
    End,
    /// Continue with another action's handler.
    Reroute(Reroute),
}

impl Outcome {
    /// Shorthand for [`Outcome::Transition`].
    pub fn to(state: impl Into<StateId>) -> Self {
        Self::Transition(state.into())
    }

    /// Short description used in log fields.
    pub fn describe(&self) -> String {
        match self {
            Self::Stay => "stay".to_string(),
            Self::Transition(state) => format!("transition({state})"),
            Self::End => "end".to_string(),
            Self::Reroute(reroute) => format!("reroute({})", reroute.action.id()),
        }
    }
}

/// Conversion from a callback's return value into an [`Outcome`].
///
/// `()` and `None` keep the current state; errors are reported through the
/// dispatcher's error handlers.
pub trait IntoOutcome {
    /// Performs the conversion.
    fn into_outcome(self) -> Result<Outcome, BoxError>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        Ok(Outcome::Stay)
    }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        Ok(self)
    }
}

impl IntoOutcome for StateId {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        Ok(Outcome::Transition(self))
    }
}

impl<T: IntoOutcome> IntoOutcome for Option<T> {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        match self {
            Some(value) => value.into_outcome(),
            None => Ok(Outcome::Stay),
        }
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        self.map_err(Into::into)?.into_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_into_outcome_conversions() {
        assert!(matches!(().into_outcome(), Ok(Outcome::Stay)));
        assert!(matches!(None::<Outcome>.into_outcome(), Ok(Outcome::Stay)));
        assert!(matches!(
            Some(Outcome::End).into_outcome(),
            Ok(Outcome::End)
        ));
        assert!(matches!(
            StateId::from("awaiting").into_outcome(),
            Ok(Outcome::Transition(s)) if s.as_str() == "awaiting"
        ));

        let ok: Result<Outcome, Boom> = Ok(Outcome::to("next"));
        assert!(matches!(ok.into_outcome(), Ok(Outcome::Transition(_))));

        let err: Result<(), Boom> = Err(Boom);
        let err = err.into_outcome().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_describe() {
        assert_eq!(Outcome::Stay.describe(), "stay");
        assert_eq!(Outcome::to("s1").describe(), "transition(s1)");
        assert_eq!(Outcome::End.describe(), "end");
    }
}
