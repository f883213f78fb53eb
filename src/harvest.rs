//! Running a job end to end against a session

use tracing::{info, info_span};

use crate::aggregate::{Aggregation, TableAggregator};
use crate::config::{Job, Mode};
use crate::error::HarvestError;
use crate::extractors::RowLocator;
use crate::session::Session;

/// Load the job's page into the focused context and aggregate its rows
pub fn run_job<S: Session + ?Sized>(
    session: &mut S,
    job: &Job,
    limit: Option<usize>,
) -> Result<Aggregation, HarvestError> {
    let span = info_span!("job", name = %job.label());
    let _guard = span.enter();

    let enrichment = job.enrichment()?;
    info!(url = %job.url, "loading listing");
    session.navigate(&job.url)?;

    let section = match &job.section {
        Some(locator) => Some(
            session
                .locate_one(None, locator)?
                .ok_or_else(|| HarvestError::SectionNotFound(locator.to_string()))?,
        ),
        None => None,
    };

    let mut aggregator = match job.mode {
        Mode::Schema => TableAggregator::new(&job.fields),
        Mode::HeaderTable => TableAggregator::header_table(),
    }
    .with_rows(RowLocator::new(job.rows.clone()));
    if let Some(enrichment) = &enrichment {
        aggregator = aggregator.with_enrichment(enrichment);
    }
    if let Some(limit) = limit {
        aggregator = aggregator.with_limit(limit);
    }

    aggregator.aggregate(session, section.as_ref())
}
