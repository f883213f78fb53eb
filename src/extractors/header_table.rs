//! Tables that name their own columns
//!
//! For listings that are a plain `<table>` with a header row, the column
//! names come from the header cells and every later row maps cell by cell.

use crate::error::{ExtractionFailure, SessionError};
use crate::locator::Locator;
use crate::record::Record;
use crate::session::Session;

use super::Extraction;

/// Column names and where the header row sits among the located rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub position: usize,
    pub columns: Vec<String>,
}

/// Reads rows positionally under a header row
#[derive(Debug, Clone, Default)]
pub struct HeaderTable;

impl HeaderTable {
    pub fn new() -> Self {
        Self
    }

    /// The first row made only of `th` cells, or else the first row with any cells
    pub fn find_header<S: Session + ?Sized>(
        &self,
        session: &S,
        rows: &[S::Element],
    ) -> Result<Option<Header>, SessionError> {
        let mut fallback = None;
        for (position, row) in rows.iter().enumerate() {
            let cells = session.locate_all(Some(row), &Locator::Child)?;
            if cells.is_empty() {
                continue;
            }
            let headings = session.locate_all(Some(row), &Locator::tag("th"))?;
            if headings.len() == cells.len() {
                return Ok(Some(Header {
                    position,
                    columns: self.column_names(session, &cells)?,
                }));
            }
            if fallback.is_none() {
                fallback = Some((position, cells));
            }
        }

        match fallback {
            Some((position, cells)) => Ok(Some(Header {
                position,
                columns: self.column_names(session, &cells)?,
            })),
            None => Ok(None),
        }
    }

    /// Map the cells of `row` onto the header columns
    pub fn extract<S: Session + ?Sized>(
        &self,
        session: &S,
        row: &S::Element,
        header: &Header,
    ) -> Result<Extraction, SessionError> {
        let cells = session.locate_all(Some(row), &Locator::Child)?;
        if cells.len() != header.columns.len() {
            return Ok(Err(ExtractionFailure::CellCountMismatch {
                expected: header.columns.len(),
                found: cells.len(),
            }));
        }

        let mut record = Record::new();
        for (column, cell) in header.columns.iter().zip(&cells) {
            record.insert(column, session.read_text(cell)?);
        }
        Ok(Ok(record))
    }

    fn column_names<S: Session + ?Sized>(
        &self,
        session: &S,
        cells: &[S::Element],
    ) -> Result<Vec<String>, SessionError> {
        let mut names = Vec::with_capacity(cells.len());
        for cell in cells {
            let text = session.read_text(cell)?;
            names.push(text.split_whitespace().collect::<Vec<_>>().join(" "));
        }
        Ok(unique_columns(names))
    }
}

/// Blank headings become `column_N` (1-based); repeats get a `.N` suffix
fn unique_columns(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("column_{}", i + 1)
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{HtmlSession, StaticPages};

    fn session(html: &str) -> HtmlSession<StaticPages> {
        let mut s = HtmlSession::new(StaticPages::new());
        s.load_html("https://books.test/", html).unwrap();
        s
    }

    #[test]
    fn test_header_row_names_columns() {
        let s = session(
            r#"<table>
                <tr><td colspan="2">Catalogue</td></tr>
                <tr><th>Title</th><th>Author</th></tr>
                <tr><td>Dune</td><td>Herbert</td></tr>
                <tr><td>Emma</td></tr>
            </table>"#,
        );
        let rows = s.locate_all(None, &Locator::tag("tr")).unwrap();
        let reader = HeaderTable::new();

        let header = reader.find_header(&s, &rows).unwrap().unwrap();
        assert_eq!(header.position, 1);
        assert_eq!(header.columns, vec!["Title", "Author"]);

        let record = reader.extract(&s, &rows[2], &header).unwrap().unwrap();
        assert_eq!(record.get("Title"), Some("Dune"));
        assert_eq!(record.get("Author"), Some("Herbert"));

        assert_eq!(
            reader.extract(&s, &rows[3], &header).unwrap(),
            Err(ExtractionFailure::CellCountMismatch { expected: 2, found: 1 })
        );
    }

    #[test]
    fn test_first_row_is_header_without_th() {
        let s = session("<table><tr><td>a</td><td>b</td></tr><tr><td>1</td><td>2</td></tr></table>");
        let rows = s.locate_all(None, &Locator::tag("tr")).unwrap();
        let header = HeaderTable::new().find_header(&s, &rows).unwrap().unwrap();
        assert_eq!(header.position, 0);
        assert_eq!(header.columns, vec!["a", "b"]);
    }

    #[test]
    fn test_no_rows_no_header() {
        let s = session("<p>nothing</p>");
        assert_eq!(HeaderTable::new().find_header(&s, &[]).unwrap(), None);
    }

    #[test]
    fn test_unique_columns() {
        let names = vec!["Name", "", "Name", "Name"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            unique_columns(names),
            vec!["Name", "column_2", "Name.1", "Name.2"]
        );
    }
}
