//! Per-record enrichment through a linked page
//!
//! Some listings only carry a summary per row; the interesting number sits on
//! a detail page. An [`Enrichment`] opens that page in a nested context,
//! derives a count from it and stores the count on the record. Anything that
//! goes wrong on the detail page yields `"0"` and the record is kept.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Mode;
use crate::error::{ConfigError, EnrichmentError, SessionError};
use crate::extractors::{resolve_index, Schema};
use crate::locator::Locator;
use crate::record::Record;
use crate::session::{ContextScope, Session};

/// Where the detail page comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    /// URL held in a field of the record
    Field(String),
    /// Element in the row whose link is opened in a new context
    Click(ClickTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTarget {
    pub locator: Locator,
    #[serde(default)]
    pub index: isize,
}

/// Only enrich records whose `field` equals `equals`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub equals: String,
}

impl Predicate {
    pub fn holds(&self, record: &Record) -> bool {
        record.get(&self.field) == Some(self.equals.as_str())
    }
}

fn default_offset() -> usize {
    2
}

/// How the detail page becomes a number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSpec {
    /// Number of matching elements minus a fixed offset (header and footer rows)
    Elements {
        locator: Locator,
        #[serde(default = "default_offset")]
        offset: usize,
    },
    /// First capture group of `pattern` in the text of the matching elements
    Pattern { locator: Locator, pattern: String },
}

/// Enrichment rule as written in a job file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSpec {
    /// Name of the derived field
    pub field: String,
    pub link: LinkSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Predicate>,
    pub count: CountSpec,
    /// Leave the field out, rather than writing "0", when `when` does not hold
    #[serde(default)]
    pub omit_when_unmatched: bool,
}

impl EnrichmentSpec {
    /// Validate against the schema and compile the count rule.
    /// Header tables name their columns at run time, so field references
    /// are only checked in schema mode.
    pub fn compile(&self, mode: Mode, schema: &Schema) -> Result<Enrichment, ConfigError> {
        if self.field.trim().is_empty() {
            return Err(ConfigError::EmptyFieldName);
        }
        if mode == Mode::Schema {
            if schema.contains(&self.field) {
                return Err(ConfigError::EnrichmentClash(self.field.clone()));
            }
            if let LinkSource::Field(name) = &self.link {
                if !schema.contains(name) {
                    return Err(ConfigError::UnknownLinkField(name.clone()));
                }
            }
        }

        let invalid = |what: &str, reason: String| ConfigError::InvalidLocator {
            field: format!("{} ({what})", self.field),
            reason,
        };
        if let LinkSource::Click(target) = &self.link {
            target.locator.validate().map_err(|r| invalid("link", r))?;
        }

        let count = match &self.count {
            CountSpec::Elements { locator, offset } => {
                locator.validate().map_err(|r| invalid("count", r))?;
                Counter::Elements {
                    locator: locator.clone(),
                    offset: *offset,
                }
            }
            CountSpec::Pattern { locator, pattern } => {
                locator.validate().map_err(|r| invalid("count", r))?;
                let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                if regex.captures_len() < 2 {
                    return Err(ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: "needs a capture group for the number".to_string(),
                    });
                }
                Counter::Pattern {
                    locator: locator.clone(),
                    regex,
                }
            }
        };

        Ok(Enrichment {
            field: self.field.clone(),
            link: self.link.clone(),
            when: self.when.clone(),
            count,
            omit_when_unmatched: self.omit_when_unmatched,
        })
    }
}

#[derive(Debug, Clone)]
enum Counter {
    Elements { locator: Locator, offset: usize },
    Pattern { locator: Locator, regex: Regex },
}

impl Counter {
    /// Derive the count from the focused (detail) page
    fn count<S: Session + ?Sized>(&self, session: &S) -> Result<usize, EnrichmentError> {
        match self {
            Counter::Elements { locator, offset } => {
                let found = session.locate_all(None, locator)?.len();
                Ok(found.saturating_sub(*offset))
            }
            Counter::Pattern { locator, regex } => {
                for element in session.locate_all(None, locator)? {
                    let text = session.read_text(&element)?;
                    let number = regex
                        .captures(&text)
                        .and_then(|c| c.get(1))
                        .and_then(|m| m.as_str().replace(',', "").parse::<usize>().ok());
                    if let Some(n) = number {
                        return Ok(n);
                    }
                }
                Err(EnrichmentError::NoMatch)
            }
        }
    }
}

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The predicate did not hold; no page was opened
    NotApplicable,
    Derived(usize),
    /// The detail page was unusable; the value defaulted to zero
    Defaulted,
}

/// Compiled enrichment rule
#[derive(Debug, Clone)]
pub struct Enrichment {
    field: String,
    link: LinkSource,
    when: Option<Predicate>,
    count: Counter,
    omit_when_unmatched: bool,
}

impl Enrichment {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Add the derived field to `record`.
    ///
    /// `row` must belong to the focused context; it is still valid afterwards.
    /// Only a failure to get back to the listing page is returned as an error.
    pub fn apply<S: Session + ?Sized>(
        &self,
        session: &mut S,
        row: &S::Element,
        record: &mut Record,
    ) -> Result<Outcome, SessionError> {
        if let Some(when) = &self.when {
            if !when.holds(record) {
                if !self.omit_when_unmatched {
                    record.insert(&self.field, "0");
                }
                return Ok(Outcome::NotApplicable);
            }
        }

        let outcome = match self.derive(session, row, record)? {
            Ok(n) => {
                debug!(field = %self.field, value = n, "derived value");
                record.insert(&self.field, n.to_string());
                Outcome::Derived(n)
            }
            Err(e) => {
                warn!(field = %self.field, error = %e, "enrichment failed, using 0");
                record.insert(&self.field, "0");
                Outcome::Defaulted
            }
        };
        Ok(outcome)
    }

    fn derive<S: Session + ?Sized>(
        &self,
        session: &mut S,
        row: &S::Element,
        record: &Record,
    ) -> Result<Result<usize, EnrichmentError>, SessionError> {
        let opened = match &self.link {
            LinkSource::Field(name) => {
                let Some(url) = record.get(name).filter(|u| !u.trim().is_empty()) else {
                    return Ok(Err(EnrichmentError::MissingLink(name.clone())));
                };
                ContextScope::open_url(session, url)
            }
            LinkSource::Click(target) => {
                let candidates = session.locate_all(Some(row), &target.locator)?;
                let Some(pos) = resolve_index(target.index, candidates.len()) else {
                    return Ok(Err(EnrichmentError::MissingTarget {
                        index: target.index,
                        found: candidates.len(),
                    }));
                };
                ContextScope::open_link(session, &candidates[pos])
            }
        };

        let mut scope = match opened {
            Ok(scope) => scope,
            Err(e) => return Ok(Err(e.into())),
        };
        let counted = self.count.count(&*scope.session());
        scope.release()?;
        Ok(counted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::FieldRule;
    use crate::session::{HtmlSession, StaticPages};

    const LISTING: &str = r#"
    <table id="results">
      <tr><td>Cafe A</td><td>FAILED</td><td><a href="/inspection/1" target="_blank">view</a></td></tr>
      <tr><td>Cafe B</td><td>FAILED</td><td><a href="/inspection/404" target="_blank">view</a></td></tr>
    </table>
    "#;

    const DETAIL: &str = r#"
    <h2>Inspection 1 (3 violations)</h2>
    <table>
      <tr><th>#</th><th>Violation</th></tr>
      <tr><td>1</td><td>Floors</td></tr>
      <tr><td>2</td><td>Walls</td></tr>
      <tr><td>3</td><td>Lighting</td></tr>
      <tr><td colspan="2">End of report</td></tr>
    </table>
    "#;

    fn session() -> HtmlSession<StaticPages> {
        let pages = StaticPages::new()
            .with_page("https://city.test/results", LISTING)
            .with_page("https://city.test/inspection/1", DETAIL);
        let mut s = HtmlSession::new(pages);
        s.navigate("https://city.test/results").unwrap();
        s
    }

    fn schema() -> Schema {
        Schema::new(vec![
            FieldRule::new("Name", Locator::tag("td")),
            FieldRule::new("Status", Locator::tag("td")).at(1),
            FieldRule::new("href", Locator::tag("a")).attribute("href"),
        ])
    }

    fn spec(json: &str) -> EnrichmentSpec {
        serde_json::from_str(json).unwrap()
    }

    fn violations() -> Enrichment {
        spec(
            r#"{"field": "num_violations", "link": {"field": "href"},
                "when": {"field": "Status", "equals": "FAILED"},
                "count": {"elements": {"locator": {"by": "tag", "value": "tr"}, "offset": 2}}}"#,
        )
        .compile(Mode::Schema, &schema())
        .unwrap()
    }

    fn record(status: &str, href: &str) -> Record {
        Record::from_iter([("Name", "Cafe"), ("Status", status), ("href", href)])
    }

    fn first_row(s: &HtmlSession<StaticPages>) -> crate::session::ElementHandle {
        s.locate_all(None, &Locator::tag("tr")).unwrap()[0]
    }

    #[test]
    fn test_counts_rows_minus_offset() {
        let mut s = session();
        let origin = s.current_context();
        let row = first_row(&s);
        let mut rec = record("FAILED", "https://city.test/inspection/1");

        let outcome = violations().apply(&mut s, &row, &mut rec).unwrap();
        assert_eq!(outcome, Outcome::Derived(3));
        assert_eq!(rec.get("num_violations"), Some("3"));

        assert_eq!(s.current_context(), origin);
        assert_eq!(s.list_contexts().len(), 1);
        assert!(s.read_text(&row).unwrap().starts_with("Cafe A"));
    }

    #[test]
    fn test_unreachable_page_defaults_to_zero() {
        let mut s = session();
        let origin = s.current_context();
        let row = first_row(&s);
        let mut rec = record("FAILED", "https://city.test/inspection/404");

        let outcome = violations().apply(&mut s, &row, &mut rec).unwrap();
        assert_eq!(outcome, Outcome::Defaulted);
        assert_eq!(rec.get("num_violations"), Some("0"));
        assert_eq!(s.current_context(), origin);
        assert_eq!(s.list_contexts().len(), 1);
    }

    #[test]
    fn test_predicate_false_skips_navigation() {
        let mut s = session();
        let row = first_row(&s);
        // the link would fail if it were followed
        let mut rec = record("PASSED", "https://city.test/inspection/404");

        let outcome = violations().apply(&mut s, &row, &mut rec).unwrap();
        assert_eq!(outcome, Outcome::NotApplicable);
        assert_eq!(rec.get("num_violations"), Some("0"));

        let omitting = spec(
            r#"{"field": "n", "link": {"field": "href"}, "omit_when_unmatched": true,
                "when": {"field": "Status", "equals": "FAILED"},
                "count": {"elements": {"locator": {"by": "tag", "value": "tr"}}}}"#,
        )
        .compile(Mode::Schema, &schema())
        .unwrap();
        let mut rec = record("PASSED", "");
        omitting.apply(&mut s, &row, &mut rec).unwrap();
        assert_eq!(rec.get("n"), None);
    }

    #[test]
    fn test_missing_link_defaults_to_zero() {
        let mut s = session();
        let row = first_row(&s);
        let mut rec = record("FAILED", "");
        assert_eq!(
            violations().apply(&mut s, &row, &mut rec).unwrap(),
            Outcome::Defaulted
        );
        assert_eq!(rec.get("num_violations"), Some("0"));
    }

    #[test]
    fn test_click_link_and_pattern_count() {
        let mut s = session();
        let origin = s.current_context();
        let rows = s.locate_all(None, &Locator::tag("tr")).unwrap();
        let rule = spec(
            r#"{"field": "reported", "link": {"click": {"locator": {"by": "tag", "value": "a"}}},
                "count": {"pattern": {"locator": {"by": "tag", "value": "h2"},
                                      "pattern": "\\((\\d+) violations\\)"}}}"#,
        )
        .compile(Mode::Schema, &schema())
        .unwrap();

        let mut rec = record("FAILED", "");
        assert_eq!(rule.apply(&mut s, &rows[0], &mut rec).unwrap(), Outcome::Derived(3));
        assert_eq!(rec.get("reported"), Some("3"));

        // second row links to a page that does not exist
        let mut rec = record("FAILED", "");
        assert_eq!(rule.apply(&mut s, &rows[1], &mut rec).unwrap(), Outcome::Defaulted);

        assert_eq!(s.current_context(), origin);
        assert_eq!(s.list_contexts().len(), 1);
    }

    #[test]
    fn test_compile_checks() {
        let clash = spec(
            r#"{"field": "Status", "link": {"field": "href"},
                "count": {"elements": {"locator": {"by": "tag", "value": "tr"}}}}"#,
        );
        assert!(matches!(
            clash.compile(Mode::Schema, &schema()),
            Err(ConfigError::EnrichmentClash(_))
        ));

        let unknown = spec(
            r#"{"field": "n", "link": {"field": "url"},
                "count": {"elements": {"locator": {"by": "tag", "value": "tr"}}}}"#,
        );
        assert!(matches!(
            unknown.compile(Mode::Schema, &schema()),
            Err(ConfigError::UnknownLinkField(_))
        ));
        assert!(unknown.compile(Mode::HeaderTable, &Schema::default()).is_ok());

        let no_group = spec(
            r#"{"field": "n", "link": {"field": "href"},
                "count": {"pattern": {"locator": {"by": "tag", "value": "h2"}, "pattern": "\\d+"}}}"#,
        );
        assert!(matches!(
            no_group.compile(Mode::Schema, &schema()),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
