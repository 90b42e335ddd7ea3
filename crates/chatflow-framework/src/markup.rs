//! Keyboards mixing action buttons and plain keys.

use chatflow_core::{CallbackId, Keyboard, RenderedButton, SurfaceKind};

use crate::button::Button;
use crate::error::ButtonError;
use crate::registry::CallbackRegistry;

/// One key of a [`Markup`].
#[derive(Debug)]
pub enum Key {
    /// A button bound to an action.
    Action(Button),
    /// A key without callback. On reply keyboards it just sends its text.
    Plain(String),
}

impl From<Button> for Key {
    fn from(button: Button) -> Self {
        Self::Action(button)
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

impl From<String> for Key {
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}

/// An unrendered keyboard.
///
/// The surface is chosen for the whole keyboard and stamped onto every button
/// during [`resolve`](Markup::resolve).
#[derive(Debug)]
pub struct Markup {
    surface: SurfaceKind,
    rows: Vec<Vec<Key>>,
}

impl Markup {
    /// An inline keyboard.
    pub fn inline(rows: Vec<Vec<Key>>) -> Self {
        Self {
            surface: SurfaceKind::Inline,
            rows,
        }
    }

    /// A reply keyboard.
    pub fn reply(rows: Vec<Vec<Key>>) -> Self {
        Self {
            surface: SurfaceKind::Reply,
            rows,
        }
    }

    /// An empty keyboard for `surface`.
    pub fn empty(surface: SurfaceKind) -> Self {
        Self {
            surface,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    pub fn row<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        self.rows.push(keys.into_iter().map(Into::into).collect());
        self
    }

    /// The target surface.
    pub fn surface(&self) -> SurfaceKind {
        self.surface
    }

    /// Finalizes every button against `registry`.
    ///
    /// Returns the rendered keyboard and the ids that were issued, which must
    /// be bound to the destination chat once the message is sent. If any
    /// button fails, the ids issued so far are dropped again.
    pub fn resolve(
        self,
        registry: &CallbackRegistry,
    ) -> Result<(Keyboard, Vec<CallbackId>), ButtonError> {
        let mut issued = Vec::new();
        let mut rows = Vec::with_capacity(self.rows.len());

        for row in self.rows {
            let mut rendered = Vec::with_capacity(row.len());
            for key in row {
                match Self::render_key(key, self.surface, registry, &mut issued) {
                    Ok(button) => rendered.push(button),
                    Err(e) => {
                        for id in issued {
                            registry.remove(id);
                        }
                        return Err(e);
                    }
                }
            }
            rows.push(rendered);
        }

        Ok((
            Keyboard {
                surface: self.surface,
                rows,
            },
            issued,
        ))
    }

    fn render_key(
        key: Key,
        surface: SurfaceKind,
        registry: &CallbackRegistry,
        issued: &mut Vec<CallbackId>,
    ) -> Result<RenderedButton, ButtonError> {
        match key {
            Key::Plain(text) => Ok(RenderedButton::plain(text)),
            Key::Action(mut button) => {
                button.set_surface(surface)?;
                let rendered = button.finalize(registry)?;
                issued.extend(button.callback());
                Ok(rendered)
            }
        }
    }
}
