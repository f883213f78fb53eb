//! Element locators
//!
//! Mirrors the lookup strategies a browser driver offers (by tag, class, id,
//! attribute, CSS selector, XPath) plus positional child lookup. Locators are
//! plain data so they can live in job files.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How to find elements inside a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Elements with this tag name (`td`, `tr`, ...)
    Tag(String),
    /// Elements carrying this class (whitespace separates compound classes)
    Class(String),
    /// The element with this id
    Id(String),
    /// Elements carrying an attribute, optionally with an exact value
    Attribute(AttributeMatch),
    /// Any CSS selector
    Css(String),
    /// XPath expression (see [`crate::xpath`] for the supported subset)
    #[serde(rename = "xpath")]
    XPath(String),
    /// Direct element children, whatever their tag
    Child,
}

/// Attribute presence or equality test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMatch {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
}

impl Locator {
    pub fn tag(name: impl Into<String>) -> Self {
        Locator::Tag(name.into())
    }

    pub fn class(name: impl Into<String>) -> Self {
        Locator::Class(name.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn attribute(name: impl Into<String>, equals: Option<&str>) -> Self {
        Locator::Attribute(AttributeMatch {
            name: name.into(),
            equals: equals.map(String::from),
        })
    }

    /// CSS selector equivalent, for the locators that have one.
    /// `XPath` and `Child` are evaluated structurally and return `None`.
    pub fn to_css(&self) -> Option<String> {
        match self {
            Locator::Tag(tag) => Some(tag.trim().to_ascii_lowercase()),
            Locator::Class(class) => Some(
                class
                    .split_whitespace()
                    .map(|c| format!(".{}", css_ident(c)))
                    .collect(),
            ),
            Locator::Id(id) => Some(format!("#{}", css_ident(id.trim()))),
            Locator::Attribute(m) => Some(match &m.equals {
                Some(v) => format!("[{}=\"{}\"]", m.name, v.replace('"', "\\\"")),
                None => format!("[{}]", m.name),
            }),
            Locator::Css(selector) => Some(selector.clone()),
            Locator::XPath(_) | Locator::Child => None,
        }
    }

    /// Check that the locator can be compiled, without a page
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Locator::XPath(expr) => crate::xpath::XPath::parse(expr)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Locator::Child => Ok(()),
            Locator::Tag(s) | Locator::Class(s) | Locator::Id(s) if s.trim().is_empty() => {
                Err("empty value".to_string())
            }
            _ => {
                let css = self.to_css().unwrap_or_default();
                scraper::Selector::parse(&css)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Tag(v) => write!(f, "tag {v}"),
            Locator::Class(v) => write!(f, "class {v}"),
            Locator::Id(v) => write!(f, "id {v}"),
            Locator::Attribute(m) => match &m.equals {
                Some(v) => write!(f, "attribute {}={v}", m.name),
                None => write!(f, "attribute {}", m.name),
            },
            Locator::Css(v) => write!(f, "css {v}"),
            Locator::XPath(v) => write!(f, "xpath {v}"),
            Locator::Child => write!(f, "child elements"),
        }
    }
}

/// Escape characters that are not valid in a CSS identifier
fn css_ident(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        let plain = c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii();
        if !plain || (i == 0 && c.is_ascii_digit()) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_translation() {
        assert_eq!(Locator::tag("TD").to_css().unwrap(), "td");
        assert_eq!(Locator::class("results_text").to_css().unwrap(), ".results_text");
        assert_eq!(Locator::class("a b").to_css().unwrap(), ".a.b");
        assert_eq!(Locator::id("booklist").to_css().unwrap(), "#booklist");
        assert_eq!(
            Locator::attribute("href", None).to_css().unwrap(),
            "[href]"
        );
        assert!(Locator::xpath("//tr").to_css().is_none());
    }

    #[test]
    fn test_deserialize_job_syntax() {
        let loc: Locator = serde_json::from_str(r#"{"by": "class", "value": "title"}"#).unwrap();
        assert_eq!(loc, Locator::class("title"));

        let loc: Locator = serde_json::from_str(r#"{"by": "xpath", "value": "//td[1]"}"#).unwrap();
        assert_eq!(loc, Locator::xpath("//td[1]"));

        let loc: Locator =
            serde_json::from_str(r#"{"by": "attribute", "value": {"name": "href"}}"#).unwrap();
        assert_eq!(loc, Locator::attribute("href", None));

        let loc: Locator = serde_json::from_str(r#"{"by": "child"}"#).unwrap();
        assert_eq!(loc, Locator::Child);
    }

    #[test]
    fn test_validate() {
        assert!(Locator::css("td > a").validate().is_ok());
        assert!(Locator::css("td[").validate().is_err());
        assert!(Locator::tag("  ").validate().is_err());
        assert!(Locator::xpath("//tr[2]/td").validate().is_ok());
    }
}
