//! Job files
//!
//! A job is a JSON document describing one listing page: where it lives,
//! which rows to read, how to turn each row into a record and where the
//! table goes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::enrichment::{Enrichment, EnrichmentSpec};
use crate::error::ConfigError;
use crate::extractors::Schema;
use crate::locator::Locator;
use crate::output::OutputConfig;

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("rowharvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_rows() -> Locator {
    Locator::tag("tr")
}

/// HTTP settings for fetching pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// How rows become records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Apply the field schema to every row
    #[default]
    Schema,
    /// Name columns after the first header row and read cells positionally
    HeaderTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    /// Label used in logs; defaults to the job file stem
    #[serde(default)]
    pub name: Option<String>,
    /// Listing page to load
    pub url: String,
    /// Element that bounds the row search, such as the results table
    #[serde(default)]
    pub section: Option<Locator>,
    #[serde(default = "default_rows")]
    pub rows: Locator,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub fields: Schema,
    #[serde(default)]
    pub enrichment: Option<EnrichmentSpec>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Job {
    /// Read and validate a job file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut job: Job = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if job.name.is_none() {
            job.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        }
        job.validate()?;
        Ok(job)
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Check locators, the schema and the enrichment rule before any page is loaded
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |what: &str, locator: &Locator| {
            locator.validate().map_err(|reason| ConfigError::InvalidLocator {
                field: what.to_string(),
                reason,
            })
        };
        if let Some(section) = &self.section {
            check("section", section)?;
        }
        check("rows", &self.rows)?;

        if self.mode == Mode::Schema {
            self.fields.validate()?;
        }
        self.enrichment()?;
        Ok(())
    }

    /// The compiled enrichment rule, if the job has one
    pub fn enrichment(&self) -> Result<Option<Enrichment>, ConfigError> {
        self.enrichment
            .as_ref()
            .map(|spec| spec.compile(self.mode, &self.fields))
            .transpose()
    }
}
