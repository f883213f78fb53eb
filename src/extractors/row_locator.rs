//! Finding the candidate rows of a listing

use tracing::debug;

use crate::error::SessionError;
use crate::locator::Locator;
use crate::session::Session;

/// Locates repeated row elements inside a section of the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLocator {
    rows: Locator,
}

impl Default for RowLocator {
    fn default() -> Self {
        Self::new(Locator::tag("tr"))
    }
}

impl RowLocator {
    pub fn new(rows: Locator) -> Self {
        Self { rows }
    }

    /// Rows inside `section` (the whole page when `None`), in document order.
    /// Header and decoration rows are included; the extractor sorts them out.
    pub fn locate<S: Session + ?Sized>(
        &self,
        session: &S,
        section: Option<&S::Element>,
    ) -> Result<Vec<S::Element>, SessionError> {
        let rows = session.locate_all(section, &self.rows)?;
        debug!(locator = %self.rows, count = rows.len(), "rows located");
        Ok(rows)
    }
}
