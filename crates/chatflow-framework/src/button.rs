//! Pressable buttons bound to an action.
//!
//! A [`Button`] is created for one render and thrown away afterwards. Its
//! caption is resolved and validated at construction; the callback id is only
//! issued by [`Button::finalize`], once the keyboard surface is known.

use std::sync::Arc;

use chatflow_core::{CallbackId, RenderedButton, SurfaceKind, codec};
use tracing::debug;

use crate::action::{Action, Payload};
use crate::error::ButtonError;
use crate::registry::CallbackRegistry;

/// Longest caption a button may have, in characters.
pub const MAX_CAPTION_LEN: usize = 108;

/// Button text length past which the platform clips the tail.
///
/// A reply button's token frame leads its text, so clipping only ever costs
/// visible characters. A maximal caption behind the widest frame loses its
/// last two.
pub const PLATFORM_TEXT_LIMIT: usize = 128;

/// An inline button that opens an inline query instead of sending callback
/// data. The callback id rides along inside the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchInline {
    /// Let the user pick a chat, then prefill the query there.
    AnyChat(String),
    /// Prefill the query in the current chat.
    CurrentChat(String),
}

/// A button bound to an [`Action`] and an optional payload.
#[derive(Debug)]
pub struct Button {
    action: Arc<Action>,
    caption: String,
    payload: Option<Payload>,
    surface: Option<SurfaceKind>,
    switch_inline: Option<SwitchInline>,
    callback: Option<CallbackId>,
}

impl Button {
    /// A button without payload, labelled by the action's caption.
    pub fn new(action: &Arc<Action>) -> Result<Self, ButtonError> {
        Self::build(action, None, None)
    }

    /// A button carrying `payload`, labelled by the action's caption.
    pub fn with_payload(action: &Arc<Action>, payload: Payload) -> Result<Self, ButtonError> {
        Self::build(action, None, Some(payload))
    }

    /// A button with an explicit caption that overrides the action's.
    pub fn with_caption(
        action: &Arc<Action>,
        caption: impl Into<String>,
        payload: Option<Payload>,
    ) -> Result<Self, ButtonError> {
        Self::build(action, Some(caption.into()), payload)
    }

    fn build(
        action: &Arc<Action>,
        caption: Option<String>,
        payload: Option<Payload>,
    ) -> Result<Self, ButtonError> {
        if let Some(payload) = &payload {
            action.check_payload(payload)?;
        }

        let caption = caption
            .or_else(|| action.caption_for(payload.as_ref()))
            .ok_or_else(|| ButtonError::MissingCaption(action.id().clone()))?;

        if caption.is_empty() {
            return Err(ButtonError::EmptyCaption(action.id().clone()));
        }
        let len = caption.chars().count();
        if len > MAX_CAPTION_LEN {
            return Err(ButtonError::CaptionTooLong {
                action: action.id().clone(),
                len,
                max: MAX_CAPTION_LEN,
            });
        }

        Ok(Self {
            action: Arc::clone(action),
            caption,
            payload,
            surface: None,
            switch_inline: None,
            callback: None,
        })
    }

    /// Turns this into a switch-inline button. Only valid on inline keyboards.
    pub fn switch_inline(mut self, switch: SwitchInline) -> Result<Self, ButtonError> {
        if self.surface == Some(SurfaceKind::Reply) {
            return Err(ButtonError::SwitchInlineOnReply(self.action.id().clone()));
        }
        self.switch_inline = Some(switch);
        Ok(self)
    }

    /// Places the button on `surface`.
    pub fn on(mut self, surface: SurfaceKind) -> Result<Self, ButtonError> {
        self.set_surface(surface)?;
        Ok(self)
    }

    /// Places the button on `surface`, checking that the action allows it.
    pub fn set_surface(&mut self, surface: SurfaceKind) -> Result<(), ButtonError> {
        if !self.action.allows(surface) {
            return Err(ButtonError::SurfaceNotAllowed {
                action: self.action.id().clone(),
                surface,
            });
        }
        if surface == SurfaceKind::Reply && self.switch_inline.is_some() {
            return Err(ButtonError::SwitchInlineOnReply(self.action.id().clone()));
        }
        self.surface = Some(surface);
        Ok(())
    }

    /// The action this button triggers.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// The visible caption.
    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// The attached payload.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// The surface, once set.
    pub fn surface(&self) -> Option<SurfaceKind> {
        self.surface
    }

    /// The issued callback id, once finalized.
    pub fn callback(&self) -> Option<CallbackId> {
        self.callback
    }

    /// Issues the callback id and renders the button for its surface.
    ///
    /// Inline buttons carry a random id as callback data. Reply buttons and
    /// switch-inline buttons need the id in visible text and take a counter id
    /// instead. Finalizing twice renders the same id again.
    pub fn finalize(&mut self, registry: &CallbackRegistry) -> Result<RenderedButton, ButtonError> {
        let surface = self
            .surface
            .ok_or_else(|| ButtonError::IllegalState(self.action.id().clone()))?;

        let id = match self.callback {
            Some(id) => id,
            None => {
                let random_id = surface.is_inline() && self.switch_inline.is_none();
                let entry = registry.create(self.action.id(), self.payload.clone(), random_id);
                self.callback = Some(entry.id());
                entry.id()
            }
        };

        let mut rendered = RenderedButton::plain(self.caption.clone());
        match (surface, &self.switch_inline) {
            (SurfaceKind::Inline, None) => rendered.callback_data = Some(id.to_string()),
            (SurfaceKind::Inline, Some(SwitchInline::AnyChat(query))) => {
                rendered.switch_inline_query = Some(self.embed(query, id)?);
            }
            (SurfaceKind::Inline, Some(SwitchInline::CurrentChat(query))) => {
                rendered.switch_inline_query_current_chat = Some(self.embed(query, id)?);
            }
            (SurfaceKind::Reply, _) => {
                rendered.text = self.embed(&self.caption, id)?;
                let len = rendered.text.chars().count();
                if len > PLATFORM_TEXT_LIMIT {
                    debug!(action = %self.action.id(), len, "Reply button text will be clipped");
                }
            }
        }
        Ok(rendered)
    }

    fn embed(&self, text: &str, id: CallbackId) -> Result<String, ButtonError> {
        let n = id
            .as_counter()
            .ok_or_else(|| ButtonError::IllegalState(self.action.id().clone()))?;
        Ok(codec::embed(text, u64::from(n)))
    }
}
