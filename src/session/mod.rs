//! Browser-session abstraction
//!
//! The extraction core only talks to a page through [`Session`]. A session
//! owns one or more browsing contexts (tabs) and exactly one of them has
//! focus; element handles are only valid while their context is focused and
//! has not navigated away.
//!
//! [`HtmlSession`] is the in-process implementation: it fetches pages with
//! a [`PageSource`] and parses them with `scraper`.

mod html;
mod scope;
mod source;

use std::fmt;

pub use html::{ContextId, ElementHandle, HtmlSession};
pub use scope::ContextScope;
pub use source::{HttpSource, PageSource, StaticPages};

use crate::error::SessionError;
use crate::locator::Locator;

/// The surface a browser driver exposes to the extraction core
pub trait Session {
    /// Opaque reference to one element of the focused page
    type Element: Clone + fmt::Debug;
    /// Identifier of a browsing context (tab/window)
    type Context: Clone + PartialEq + fmt::Debug;

    /// Load `url` into the focused context, invalidating its element handles
    fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// All elements matching `locator` inside `scope` (the whole document
    /// when `None`), in document order. No match is an empty vec.
    fn locate_all(
        &self,
        scope: Option<&Self::Element>,
        locator: &Locator,
    ) -> Result<Vec<Self::Element>, SessionError>;

    /// First element matching `locator` inside `scope`
    fn locate_one(
        &self,
        scope: Option<&Self::Element>,
        locator: &Locator,
    ) -> Result<Option<Self::Element>, SessionError> {
        Ok(self.locate_all(scope, locator)?.into_iter().next())
    }

    /// Rendered text of the element, trimmed
    fn read_text(&self, element: &Self::Element) -> Result<String, SessionError>;

    /// Attribute value, `None` when absent
    fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    fn click(&mut self, element: &Self::Element) -> Result<(), SessionError>;

    /// Open `url` in a new context. Focus stays where it was.
    fn open_context(&mut self, url: &str) -> Result<Self::Context, SessionError>;

    /// Open the link `element` leads to in a new context, whatever its
    /// `target`. Focus stays where it was and the page keeps its handles.
    fn open_in_new_context(
        &mut self,
        element: &Self::Element,
    ) -> Result<Self::Context, SessionError>;

    /// Open contexts, oldest first
    fn list_contexts(&self) -> Vec<Self::Context>;

    /// Focused context, `None` after the focused context was closed
    fn current_context(&self) -> Option<Self::Context>;

    fn switch_to_context(&mut self, id: &Self::Context) -> Result<(), SessionError>;

    fn close_context(&mut self, id: &Self::Context) -> Result<(), SessionError>;
}
