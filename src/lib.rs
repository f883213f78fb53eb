//! Row harvesting for listing pages
//!
//! Reads the repeated rows of a listing (a results table, a search page) into
//! a table of records:
//! - [`RowLocator`] finds candidate rows inside a section of the page
//! - [`RecordExtractor`] applies a field [`Schema`] to one row, all or nothing
//! - [`TableAggregator`] runs the pass, collects skip diagnostics and can
//!   enrich records from a linked page opened in a nested context
//! - [`output`] writes the table as CSV, TSV or JSON
//!
//! Pages are reached through the [`Session`] trait; [`HtmlSession`] is the
//! in-process implementation over fetched HTML.

pub mod aggregate;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod extractors;
pub mod harvest;
pub mod locator;
pub mod output;
pub mod record;
pub mod session;
pub mod text;
pub mod xpath;

pub use aggregate::{Aggregation, TableAggregator};
pub use config::{FetchConfig, Job, Mode};
pub use enrichment::{Enrichment, EnrichmentSpec};
pub use error::{ConfigError, EnrichmentError, ExtractionFailure, HarvestError, OutputError, SessionError};
pub use extractors::{FieldRule, HeaderTable, RecordExtractor, RowLocator, Schema};
pub use harvest::run_job;
pub use locator::Locator;
pub use output::{write_table, write_table_file, Format, OutputConfig};
pub use record::{Record, SkipDiagnostic, Table};
pub use session::{ContextScope, HtmlSession, HttpSource, PageSource, Session, StaticPages};
