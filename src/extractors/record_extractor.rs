//! Schema-driven extraction of one row

use crate::error::{ExtractionFailure, SessionError};
use crate::record::Record;
use crate::session::Session;

use super::{resolve_index, FieldRule, Schema};

/// Outcome for a single row: a complete record or the reason it was skipped
pub type Extraction = Result<Record, ExtractionFailure>;

/// Applies a [`Schema`] to row elements
#[derive(Debug, Clone, Copy)]
pub struct RecordExtractor<'a> {
    schema: &'a Schema,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Build a record from `row`, all fields or nothing.
    ///
    /// The outer error is a session fault and ends the pass; the inner one
    /// only means this row does not fit the schema.
    pub fn extract<S: Session + ?Sized>(
        &self,
        session: &S,
        row: &S::Element,
    ) -> Result<Extraction, SessionError> {
        let mut record = Record::new();
        for rule in self.schema.fields() {
            match extract_field(session, row, rule)? {
                Ok(value) => record.insert(&rule.name, value),
                Err(failure) => return Ok(Err(failure)),
            }
        }
        Ok(Ok(record))
    }
}

/// Read one field of `row`
pub fn extract_field<S: Session + ?Sized>(
    session: &S,
    row: &S::Element,
    rule: &FieldRule,
) -> Result<Result<String, ExtractionFailure>, SessionError> {
    let matches = session.locate_all(Some(row), &rule.locator)?;
    let Some(pos) = resolve_index(rule.index, matches.len()) else {
        return Ok(Err(ExtractionFailure::MissingElement {
            field: rule.name.clone(),
            locator: rule.locator.to_string(),
            index: rule.index,
            found: matches.len(),
        }));
    };
    let element = &matches[pos];

    let value = match &rule.attribute {
        Some(attribute) => match session.read_attribute(element, attribute)? {
            Some(value) => value.trim().to_string(),
            None => {
                return Ok(Err(ExtractionFailure::MissingAttribute {
                    field: rule.name.clone(),
                    attribute: attribute.clone(),
                }))
            }
        },
        None => session.read_text(element)?,
    };

    if rule.reject_empty && value.is_empty() {
        return Ok(Err(ExtractionFailure::EmptyValue {
            field: rule.name.clone(),
        }));
    }
    Ok(Ok(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;
    use crate::session::{HtmlSession, StaticPages};

    const VIOLATIONS: &str = r#"
    <table>
      <tr><th>Name and Location</th><th>Order</th><th>Basis</th></tr>
      <tr>
        <td><span class="results_text">NGUYEN, THANH</span><br>City: FRISCO</td>
        <td>Order text</td>
        <td><a href="/orders/17.pdf">Basis</a></td>
      </tr>
      <tr><td>Lone cell</td></tr>
    </table>
    "#;

    fn session() -> HtmlSession<StaticPages> {
        let mut s = HtmlSession::new(StaticPages::new());
        s.load_html("https://tdlr.test/violations", VIOLATIONS).unwrap();
        s
    }

    fn rows(s: &HtmlSession<StaticPages>) -> Vec<crate::session::ElementHandle> {
        s.locate_all(None, &Locator::tag("tr")).unwrap()
    }

    #[test]
    fn test_extract_full_record() {
        let s = session();
        let schema = Schema::new(vec![
            FieldRule::new("name", Locator::class("results_text")),
            FieldRule::new("order", Locator::tag("td")).at(1),
            FieldRule::new("basis", Locator::tag("a")).attribute("href"),
        ]);

        let record = RecordExtractor::new(&schema)
            .extract(&s, &rows(&s)[1])
            .unwrap()
            .unwrap();
        assert_eq!(record.get("name"), Some("NGUYEN, THANH"));
        assert_eq!(record.get("order"), Some("Order text"));
        assert_eq!(record.get("basis"), Some("https://tdlr.test/orders/17.pdf"));
        assert_eq!(record.names().collect::<Vec<_>>(), vec!["name", "order", "basis"]);
    }

    #[test]
    fn test_negative_index_counts_from_end() {
        let s = session();
        let schema = Schema::new(vec![FieldRule::new("order", Locator::tag("td")).at(-2)]);

        let record = RecordExtractor::new(&schema)
            .extract(&s, &rows(&s)[1])
            .unwrap()
            .unwrap();
        assert_eq!(record.get("order"), Some("Order text"));
    }

    #[test]
    fn test_negative_index_resolves_per_row() {
        let mut s = HtmlSession::new(StaticPages::new());
        s.load_html(
            "https://tdlr.test/violations",
            r#"<table>
              <tr><td>
                <span class="results_text">A</span><span class="results_text">L1</span>
                <span class="results_text">C1</span><span class="results_text">X</span>
              </td></tr>
              <tr><td>
                <span class="results_text">D</span><span class="results_text">E</span>
                <span class="results_text">F</span><span class="results_text">L2</span>
                <span class="results_text">C2</span><span class="results_text">X</span>
              </td></tr>
            </table>"#,
        )
        .unwrap();
        let schema = Schema::new(vec![
            FieldRule::new("complaint_no", Locator::class("results_text")).at(-2),
            FieldRule::new("license_numbers", Locator::class("results_text")).at(-3),
        ]);
        let extractor = RecordExtractor::new(&schema);

        let values: Vec<_> = rows(&s)
            .iter()
            .map(|row| {
                let record = extractor.extract(&s, row).unwrap().unwrap();
                (
                    record.get("complaint_no").unwrap().to_string(),
                    record.get("license_numbers").unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            values,
            vec![
                ("C1".to_string(), "L1".to_string()),
                ("C2".to_string(), "L2".to_string()),
            ]
        );
    }

    #[test]
    fn test_header_row_is_a_shape_mismatch() {
        let s = session();
        let schema = Schema::new(vec![FieldRule::new("name", Locator::class("results_text"))]);

        let failure = RecordExtractor::new(&schema)
            .extract(&s, &rows(&s)[0])
            .unwrap()
            .unwrap_err();
        assert_eq!(
            failure,
            ExtractionFailure::MissingElement {
                field: "name".to_string(),
                locator: "class results_text".to_string(),
                index: 0,
                found: 0,
            }
        );
    }

    #[test]
    fn test_no_partial_records() {
        let s = session();
        let schema = Schema::new(vec![
            FieldRule::new("first", Locator::tag("td")),
            FieldRule::new("second", Locator::tag("td")).at(1),
        ]);
        let result = RecordExtractor::new(&schema).extract(&s, &rows(&s)[2]).unwrap();
        assert!(matches!(
            result,
            Err(ExtractionFailure::MissingElement { ref field, found: 1, .. }) if field == "second"
        ));
    }

    #[test]
    fn test_missing_attribute_and_empty_value() {
        let s = session();
        let row = rows(&s)[1];

        let rule = FieldRule::new("title", Locator::tag("a")).attribute("title");
        assert_eq!(
            extract_field(&s, &row, &rule).unwrap(),
            Err(ExtractionFailure::MissingAttribute {
                field: "title".to_string(),
                attribute: "title".to_string(),
            })
        );

        let mut s = session();
        s.load_html("https://tdlr.test/", "<table><tr><td> </td></tr></table>")
            .unwrap();
        let row = rows(&s)[0];
        let lenient = FieldRule::new("cell", Locator::tag("td"));
        assert_eq!(extract_field(&s, &row, &lenient).unwrap(), Ok(String::new()));
        assert!(matches!(
            extract_field(&s, &row, &lenient.clone().reject_empty()).unwrap(),
            Err(ExtractionFailure::EmptyValue { .. })
        ));
    }

    #[test]
    fn test_stale_row_is_fatal() {
        let mut s = session();
        let row = rows(&s)[1];
        s.load_html("https://tdlr.test/other", "<p>moved</p>").unwrap();

        let schema = Schema::new(vec![FieldRule::new("x", Locator::tag("td"))]);
        assert_eq!(
            RecordExtractor::new(&schema).extract(&s, &row),
            Err(SessionError::StaleElement)
        );
    }
}
