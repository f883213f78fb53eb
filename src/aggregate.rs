//! Whole-listing aggregation
//!
//! [`TableAggregator`] drives one pass over a listing: locate the rows,
//! extract each one, enrich the records that qualify and collect the rest as
//! skip diagnostics. Every located row ends up either in the table or in the
//! diagnostics, never both.

use tracing::{debug, info, warn};

use crate::enrichment::{Enrichment, Outcome};
use crate::error::{ConfigError, ExtractionFailure, HarvestError, SessionError};
use crate::extractors::{Extraction, Header, HeaderTable, RecordExtractor, RowLocator, Schema};
use crate::record::{SkipDiagnostic, Table};
use crate::session::Session;

/// Result of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub table: Table,
    pub diagnostics: Vec<SkipDiagnostic>,
    /// Rows considered for extraction; a header row that names columns is not counted
    pub rows_located: usize,
    /// Records whose derived value came from a linked page
    pub enriched: usize,
    /// Records whose linked page was unusable
    pub enrichment_failures: usize,
}

enum Reader<'a> {
    Schema(RecordExtractor<'a>),
    Header(HeaderTable),
}

pub struct TableAggregator<'a> {
    rows: RowLocator,
    reader: Reader<'a>,
    enrichment: Option<&'a Enrichment>,
    limit: Option<usize>,
}

impl<'a> TableAggregator<'a> {
    /// Aggregator applying `schema` to every `tr`
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            rows: RowLocator::default(),
            reader: Reader::Schema(RecordExtractor::new(schema)),
            enrichment: None,
            limit: None,
        }
    }

    /// Aggregator reading cells under the table's own header row
    pub fn header_table() -> Self {
        Self {
            rows: RowLocator::default(),
            reader: Reader::Header(HeaderTable::new()),
            enrichment: None,
            limit: None,
        }
    }

    pub fn with_rows(mut self, rows: RowLocator) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_enrichment(mut self, enrichment: &'a Enrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    /// Stop after this many rows
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Run the pass over the rows inside `section` (the whole page when `None`).
    ///
    /// Session faults and an enrichment field that collides with a header
    /// column are errors; rows that do not fit are reported in
    /// [`Aggregation::diagnostics`].
    pub fn aggregate<S: Session + ?Sized>(
        &self,
        session: &mut S,
        section: Option<&S::Element>,
    ) -> Result<Aggregation, HarvestError> {
        let mut rows = self.rows.locate(&*session, section)?;

        let header = match &self.reader {
            Reader::Header(reader) => match reader.find_header(&*session, &rows)? {
                Some(header) => {
                    debug!(columns = ?header.columns, "header row found");
                    if let Some(enrichment) = self.enrichment {
                        let field = enrichment.field();
                        if header.columns.iter().any(|c| c == field) {
                            return Err(ConfigError::EnrichmentClash(field.to_string()).into());
                        }
                    }
                    rows.remove(header.position);
                    Some(header)
                }
                None => None,
            },
            Reader::Schema(_) => None,
        };
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        let mut result = Aggregation {
            rows_located: rows.len(),
            ..Aggregation::default()
        };

        for (index, row) in rows.iter().enumerate() {
            let extraction = self.read_row(&*session, row, index, header.as_ref())?;
            let mut record = match extraction {
                Ok(record) => record,
                Err(reason) => {
                    let raw_text = session.read_text(row).ok();
                    warn!(row = index, %reason, "row skipped");
                    result.diagnostics.push(SkipDiagnostic {
                        row: index,
                        raw_text,
                        reason,
                    });
                    continue;
                }
            };

            if let Some(enrichment) = self.enrichment {
                match enrichment.apply(session, row, &mut record)? {
                    Outcome::Derived(_) => result.enriched += 1,
                    Outcome::Defaulted => result.enrichment_failures += 1,
                    Outcome::NotApplicable => {}
                }
            }
            result.table.push(record);
        }

        if result.enrichment_failures > 0 {
            warn!(
                failures = result.enrichment_failures,
                "some linked pages could not be read"
            );
        }
        info!(
            rows = result.rows_located,
            records = result.table.len(),
            skipped = result.diagnostics.len(),
            enriched = result.enriched,
            "aggregation finished"
        );
        Ok(result)
    }

    fn read_row<S: Session + ?Sized>(
        &self,
        session: &S,
        row: &S::Element,
        index: usize,
        header: Option<&Header>,
    ) -> Result<Extraction, SessionError> {
        match (&self.reader, header) {
            (Reader::Schema(extractor), _) => extractor.extract(session, row),
            (Reader::Header(reader), Some(header)) if index_after(header, index) => {
                reader.extract(session, row, header)
            }
            (Reader::Header(_), Some(_)) => Ok(Err(ExtractionFailure::AboveHeader)),
            (Reader::Header(_), None) => Ok(Err(ExtractionFailure::CellCountMismatch {
                expected: 0,
                found: 0,
            })),
        }
    }
}

/// Whether the row at `index` (header already removed) came after the header
fn index_after(header: &Header, index: usize) -> bool {
    index >= header.position
}
