//! XPath subset evaluator over `scraper` documents
//!
//! Supported:
//! - absolute (`/html/body`) and relative (`td[1]/a`) paths, `//` shorthand
//! - axes: `child`, `descendant`, `descendant-or-self`, `parent`, `self`,
//!   `ancestor`, `following-sibling`, `preceding-sibling`, plus `.` and `..`
//! - node tests: tag names and `*`
//! - predicates: `[n]`, `[last()]`, `[@attr]`, `[@attr="v"]`,
//!   `[contains(@attr, "v")]`, `[text()="v"]`
//!
//! Like a browser, a path starting with `/` is evaluated from the document
//! even when a context element is given.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} in xpath {expr:?}")]
pub struct XPathError {
    expr: String,
    message: String,
}

/// A parsed XPath expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    SelfNode,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    /// `node()`: also matches the document node
    Node,
    /// `*`
    Element,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttr(String),
    AttrEquals(String, String),
    AttrContains(String, String),
    TextEquals(String),
}

/// `None` stands for the document node, which has no `ElementRef`
type Node<'a> = Option<ElementRef<'a>>;

impl XPath {
    pub fn parse(expr: &str) -> Result<Self, XPathError> {
        let fail = |message: &str| XPathError {
            expr: expr.to_string(),
            message: message.to_string(),
        };

        let src = expr.trim();
        if src.is_empty() {
            return Err(fail("empty expression"));
        }

        let segments = split_segments(src).ok_or_else(|| fail("unbalanced brackets or quotes"))?;
        let absolute = src.starts_with('/');
        let start = usize::from(absolute);

        let mut steps = Vec::new();
        for (i, segment) in segments.iter().enumerate().skip(start) {
            if segment.is_empty() {
                if i + 1 == segments.len() {
                    return Err(fail("trailing slash"));
                }
                steps.push(Step {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::Node,
                    predicates: vec![],
                });
                continue;
            }
            steps.push(parse_step(segment).map_err(|m| fail(&m))?);
        }

        if steps.is_empty() {
            return Err(fail("no steps"));
        }

        Ok(Self { absolute, steps })
    }

    /// Evaluate against `doc`, relative to `context` (the document when `None`).
    /// Results come back in document order without duplicates.
    pub fn select<'a>(&self, doc: &'a Html, context: Option<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
        let mut current: Vec<Node<'a>> = if self.absolute {
            vec![None]
        } else {
            vec![context]
        };

        for step in &self.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            let mut document_seen = false;

            for node in &current {
                let mut candidates: Vec<Node<'a>> = axis_nodes(doc, *node, step.axis)
                    .into_iter()
                    .filter(|n| step.test.matches(*n))
                    .collect();

                for predicate in &step.predicates {
                    candidates = predicate.apply(candidates);
                }

                for candidate in candidates {
                    match candidate {
                        None if !document_seen => {
                            document_seen = true;
                            next.push(None);
                        }
                        None => {}
                        Some(el) => {
                            if seen.insert(el.id()) {
                                next.push(Some(el));
                            }
                        }
                    }
                }
            }

            current = next;
        }

        let wanted: HashSet<_> = current.iter().flatten().map(|el| el.id()).collect();
        doc.root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| wanted.contains(&el.id()))
            .collect()
    }
}

/// Split on `/` outside of predicates and quotes
fn split_segments(src: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in src.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') => {
                depth = depth.checked_sub(1)?;
                current.push(c);
            }
            (None, '/') if depth == 0 => segments.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }

    if depth != 0 || quote.is_some() {
        return None;
    }
    segments.push(current);
    Some(segments)
}

fn parse_step(segment: &str) -> Result<Step, String> {
    let segment = segment.trim();
    match segment {
        "." => {
            return Ok(Step {
                axis: Axis::SelfNode,
                test: NodeTest::Node,
                predicates: vec![],
            })
        }
        ".." => {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: vec![],
            })
        }
        _ => {}
    }

    let head_end = segment.find('[').unwrap_or(segment.len());
    let (head, mut rest) = segment.split_at(head_end);

    let (axis, test) = match head.split_once("::") {
        Some((axis, test)) => (parse_axis(axis.trim())?, test.trim()),
        None => (Axis::Child, head.trim()),
    };

    let test = match test {
        "*" => NodeTest::Element,
        "node()" => NodeTest::Node,
        "" => return Err(format!("missing node test in step {segment:?}")),
        name if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') => {
            NodeTest::Name(name.to_ascii_lowercase())
        }
        other => return Err(format!("unsupported node test {other:?}")),
    };

    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let inner_end = closing_bracket(rest).ok_or("unclosed predicate")?;
        predicates.push(parse_predicate(rest[1..inner_end].trim())?);
        rest = rest[inner_end + 1..].trim_start();
        if !rest.is_empty() && !rest.starts_with('[') {
            return Err(format!("unexpected {rest:?} after predicate"));
        }
    }

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

fn parse_axis(name: &str) -> Result<Axis, String> {
    Ok(match name {
        "child" => Axis::Child,
        "descendant" => Axis::Descendant,
        "descendant-or-self" => Axis::DescendantOrSelf,
        "parent" => Axis::Parent,
        "self" => Axis::SelfNode,
        "ancestor" => Axis::Ancestor,
        "following-sibling" => Axis::FollowingSibling,
        "preceding-sibling" => Axis::PrecedingSibling,
        other => return Err(format!("unsupported axis {other:?}")),
    })
}

/// Index of the `]` matching the `[` at the start of `s`
fn closing_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_predicate(inner: &str) -> Result<Predicate, String> {
    if let Ok(n) = inner.parse::<usize>() {
        if n == 0 {
            return Err("positions start at 1".to_string());
        }
        return Ok(Predicate::Position(n));
    }
    if inner == "last()" {
        return Ok(Predicate::Last);
    }

    if let Some(args) = inner
        .strip_prefix("contains(")
        .and_then(|s| s.strip_suffix(')'))
    {
        let (attr, value) = args
            .split_once(',')
            .ok_or_else(|| format!("contains() needs two arguments: {inner:?}"))?;
        let attr = attr
            .trim()
            .strip_prefix('@')
            .ok_or_else(|| format!("contains() supports attributes only: {inner:?}"))?;
        return Ok(Predicate::AttrContains(attr.to_string(), unquote(value)?));
    }

    if let Some((lhs, rhs)) = inner.split_once('=') {
        let lhs = lhs.trim();
        let value = unquote(rhs)?;
        if lhs == "text()" || lhs == "normalize-space()" || lhs == "normalize-space(.)" {
            return Ok(Predicate::TextEquals(value));
        }
        if let Some(attr) = lhs.strip_prefix('@') {
            return Ok(Predicate::AttrEquals(attr.to_string(), value));
        }
        return Err(format!("unsupported comparison {inner:?}"));
    }

    if let Some(attr) = inner.strip_prefix('@') {
        return Ok(Predicate::HasAttr(attr.trim().to_string()));
    }

    Err(format!("unsupported predicate {inner:?}"))
}

fn unquote(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    let quoted = (raw.starts_with('"') && raw.ends_with('"'))
        || (raw.starts_with('\'') && raw.ends_with('\''));
    if raw.len() < 2 || !quoted {
        return Err(format!("expected a quoted string, got {raw:?}"));
    }
    Ok(raw[1..raw.len() - 1].to_string())
}

fn axis_nodes<'a>(doc: &'a Html, node: Node<'a>, axis: Axis) -> Vec<Node<'a>> {
    match (axis, node) {
        (Axis::SelfNode, n) => vec![n],
        (Axis::Child, None) => vec![Some(doc.root_element())],
        (Axis::Child, Some(el)) => el.children().filter_map(ElementRef::wrap).map(Some).collect(),
        (Axis::Descendant, None) => doc
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .map(Some)
            .collect(),
        (Axis::Descendant, Some(el)) => el
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .map(Some)
            .collect(),
        (Axis::DescendantOrSelf, n) => {
            let mut out = vec![n];
            out.extend(axis_nodes(doc, n, Axis::Descendant));
            out
        }
        (Axis::Parent, None) => vec![],
        (Axis::Parent, Some(el)) => match el.parent() {
            Some(parent) if parent.value().is_document() => vec![None],
            Some(parent) => ElementRef::wrap(parent).map(Some).into_iter().collect(),
            None => vec![],
        },
        (Axis::Ancestor, None) => vec![],
        (Axis::Ancestor, Some(el)) => el.ancestors().filter_map(ElementRef::wrap).map(Some).collect(),
        (Axis::FollowingSibling, None) | (Axis::PrecedingSibling, None) => vec![],
        (Axis::FollowingSibling, Some(el)) => el
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .map(Some)
            .collect(),
        (Axis::PrecedingSibling, Some(el)) => el
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .map(Some)
            .collect(),
    }
}

impl NodeTest {
    fn matches(&self, node: Node<'_>) -> bool {
        match (self, node) {
            (NodeTest::Node, _) => true,
            (_, None) => false,
            (NodeTest::Element, Some(_)) => true,
            (NodeTest::Name(name), Some(el)) => el.value().name().eq_ignore_ascii_case(name),
        }
    }
}

impl Predicate {
    fn apply<'a>(&self, nodes: Vec<Node<'a>>) -> Vec<Node<'a>> {
        match self {
            Predicate::Position(n) => nodes.into_iter().nth(n - 1).into_iter().collect(),
            Predicate::Last => nodes.into_iter().last().into_iter().collect(),
            _ => nodes
                .into_iter()
                .filter(|n| n.is_some_and(|el| self.test(el)))
                .collect(),
        }
    }

    fn test(&self, el: ElementRef<'_>) -> bool {
        let attr = |name: &str| el.value().attr(name);
        match self {
            Predicate::HasAttr(name) => attr(name).is_some(),
            Predicate::AttrEquals(name, value) => attr(name) == Some(value.as_str()),
            Predicate::AttrContains(name, value) => {
                attr(name).is_some_and(|v| v.contains(value.as_str()))
            }
            Predicate::TextEquals(value) => {
                crate::text::normalize_ws(&el.text().collect::<String>()) == *value
            }
            Predicate::Position(_) | Predicate::Last => true,
        }
    }
}
