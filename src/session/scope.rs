//! Scoped nested browsing context
//!
//! Opening a detail page in a new tab and coming back is the one place where
//! the focused context changes during a pass. [`ContextScope`] owns that
//! round trip: it focuses the nested context on entry and, on release or
//! drop, closes it and focuses the original context again.

use tracing::warn;

use super::Session;
use crate::error::SessionError;

pub struct ContextScope<'s, S: Session + ?Sized> {
    session: &'s mut S,
    origin: S::Context,
    nested: S::Context,
    released: bool,
}

impl<'s, S: Session + ?Sized> ContextScope<'s, S> {
    /// Open `url` in a new context and focus it
    pub fn open_url(session: &'s mut S, url: &str) -> Result<Self, SessionError> {
        let origin = session
            .current_context()
            .ok_or(SessionError::NoActiveContext)?;
        let nested = session.open_context(url)?;
        Self::enter(session, origin, nested)
    }

    /// Follow the link of `element` in a new context and focus it. The
    /// original page is left where it was even when the link has no target.
    pub fn open_link(session: &'s mut S, element: &S::Element) -> Result<Self, SessionError> {
        let origin = session
            .current_context()
            .ok_or(SessionError::NoActiveContext)?;
        let nested = session.open_in_new_context(element)?;
        Self::enter(session, origin, nested)
    }

    fn enter(session: &'s mut S, origin: S::Context, nested: S::Context) -> Result<Self, SessionError> {
        let scope = Self {
            session,
            origin,
            nested,
            released: false,
        };
        // on failure the drop below still closes the nested context
        scope.session.switch_to_context(&scope.nested)?;
        Ok(scope)
    }

    /// The session, focused on the nested context
    pub fn session(&mut self) -> &mut S {
        &mut *self.session
    }

    pub fn nested(&self) -> &S::Context {
        &self.nested
    }

    /// Close the nested context and focus the original one.
    /// An error here means the original page can no longer be used.
    pub fn release(mut self) -> Result<(), SessionError> {
        self.released = true;
        self.restore()
    }

    fn restore(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.session.close_context(&self.nested) {
            warn!(context = ?self.nested, error = %e, "nested context already gone");
        }
        self.session.switch_to_context(&self.origin)
    }
}

impl<S: Session + ?Sized> Drop for ContextScope<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.restore() {
                warn!(error = %e, "failed to restore the original browsing context");
            }
        }
    }
}
