//! In-process session backed by parsed HTML documents

use std::fmt;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::source::{HttpSource, PageSource};
use super::Session;
use crate::config::FetchConfig;
use crate::error::SessionError;
use crate::locator::Locator;
use crate::text::visible_text;
use crate::xpath::XPath;

/// Identifier of one tab of an [`HtmlSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

/// Element of a loaded page, addressed by its node in the parsed tree.
/// Becomes stale when its context navigates or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    context: ContextId,
    generation: u64,
    node: NodeId,
}

struct Page {
    url: Url,
    document: Html,
}

struct Context {
    id: ContextId,
    generation: u64,
    page: Option<Page>,
}

/// Browser-like session over static HTML.
///
/// Every context holds one parsed document. Clicking an anchor whose
/// `target` names another window loads the link into a new context without
/// moving focus, as a browser does; other anchors navigate in place.
pub struct HtmlSession<P = HttpSource> {
    source: P,
    contexts: Vec<Context>,
    current: Option<ContextId>,
    next_id: u32,
}

impl HtmlSession<HttpSource> {
    /// Session fetching pages over HTTP
    pub fn http(config: &FetchConfig) -> Self {
        Self::new(HttpSource::new(config))
    }
}

impl<P: PageSource> HtmlSession<P> {
    /// New session with one blank, focused context
    pub fn new(source: P) -> Self {
        let first = ContextId(0);
        Self {
            source,
            contexts: vec![Context {
                id: first,
                generation: 0,
                page: None,
            }],
            current: Some(first),
            next_id: 1,
        }
    }

    /// URL of the focused page
    pub fn current_url(&self) -> Option<&Url> {
        self.focused().ok()?.page.as_ref().map(|p| &p.url)
    }

    /// Replace the focused page with `html`, as if it had been loaded from `url`
    pub fn load_html(&mut self, url: &str, html: &str) -> Result<(), SessionError> {
        let url = self.resolve_url(url)?;
        let id = self.focused()?.id;
        let page = Page {
            url,
            document: Html::parse_document(html),
        };
        self.install(id, page)
    }

    fn context(&self, id: ContextId) -> Option<&Context> {
        self.contexts.iter().find(|c| c.id == id)
    }

    fn focused(&self) -> Result<&Context, SessionError> {
        let id = self.current.ok_or(SessionError::NoActiveContext)?;
        self.context(id).ok_or(SessionError::NoActiveContext)
    }

    fn resolve_url(&self, raw: &str) -> Result<Url, SessionError> {
        let raw = raw.trim();
        let parsed = match self.current_url() {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        };
        parsed.map_err(|e| SessionError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })
    }

    fn fetch_page(&self, url: Url) -> Result<Page, SessionError> {
        let body = self.source.fetch(&url)?;
        Ok(Page {
            document: Html::parse_document(&body),
            url,
        })
    }

    fn install(&mut self, id: ContextId, page: Page) -> Result<(), SessionError> {
        let ctx = self
            .contexts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SessionError::NoSuchContext(id.to_string()))?;
        debug!(context = %id, url = %page.url, "page loaded");
        ctx.generation += 1;
        ctx.page = Some(page);
        Ok(())
    }

    fn spawn(&mut self, page: Page) -> ContextId {
        let id = ContextId(self.next_id);
        self.next_id += 1;
        debug!(context = %id, url = %page.url, "context opened");
        self.contexts.push(Context {
            id,
            generation: 1,
            page: Some(page),
        });
        id
    }

    /// Resolve a handle against the focused context
    fn element(&self, handle: &ElementHandle) -> Result<(&Page, ElementRef<'_>), SessionError> {
        let ctx = self
            .context(handle.context)
            .ok_or(SessionError::StaleElement)?;
        if self.current != Some(handle.context) {
            return Err(SessionError::ContextMismatch);
        }
        if ctx.generation != handle.generation {
            return Err(SessionError::StaleElement);
        }
        let page = ctx.page.as_ref().ok_or(SessionError::StaleElement)?;
        let el = page
            .document
            .tree
            .get(handle.node)
            .and_then(ElementRef::wrap)
            .ok_or(SessionError::StaleElement)?;
        Ok((page, el))
    }
}

/// Absolute URL of a followed link
fn link_url(page: &Page, href: &str) -> Result<Url, SessionError> {
    if href.starts_with("javascript:") {
        return Err(SessionError::Unsupported("javascript links".to_string()));
    }
    page.url.join(href).map_err(|e| SessionError::InvalidUrl {
        url: href.to_string(),
        reason: e.to_string(),
    })
}

/// The link a click on `el` would follow: the element itself, a descendant
/// anchor (clicking a cell that holds a link) or an enclosing anchor.
fn link_target(el: ElementRef<'_>) -> Option<(String, Option<String>)> {
    let is_link = |e: &ElementRef<'_>| e.value().name() == "a" && e.value().attr("href").is_some();

    let anchor = if is_link(&el) {
        Some(el)
    } else {
        el.descendants()
            .filter_map(ElementRef::wrap)
            .find(|e| is_link(e))
            .or_else(|| el.ancestors().filter_map(ElementRef::wrap).find(|e| is_link(e)))
    }?;

    let href = anchor.value().attr("href")?.trim().to_string();
    let target = anchor.value().attr("target").map(String::from);
    Some((href, target))
}

fn opens_new_context(target: Option<&str>) -> bool {
    !matches!(
        target.map(str::trim),
        None | Some("") | Some("_self") | Some("_parent") | Some("_top")
    )
}

impl<P: PageSource> Session for HtmlSession<P> {
    type Element = ElementHandle;
    type Context = ContextId;

    fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let id = self.focused()?.id;
        let url = self.resolve_url(url)?;
        let page = self.fetch_page(url)?;
        self.install(id, page)
    }

    fn locate_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        let ctx = self.focused()?;
        let Some(page) = ctx.page.as_ref() else {
            return Ok(vec![]);
        };

        let base = match scope {
            Some(handle) => self.element(handle)?.1,
            None => page.document.root_element(),
        };
        // a document-wide search may return the root itself, a scoped one never does
        let include_base = scope.is_none();

        let nodes: Vec<NodeId> = match locator {
            Locator::XPath(expr) => {
                let xpath = XPath::parse(expr).map_err(|e| SessionError::InvalidSelector {
                    selector: expr.clone(),
                    reason: e.to_string(),
                })?;
                xpath
                    .select(&page.document, scope.map(|_| base))
                    .into_iter()
                    .map(|el| el.id())
                    .collect()
            }
            Locator::Child => base
                .children()
                .filter_map(ElementRef::wrap)
                .map(|el| el.id())
                .collect(),
            other => {
                let css = other.to_css().unwrap_or_default();
                let selector =
                    Selector::parse(&css).map_err(|e| SessionError::InvalidSelector {
                        selector: css.clone(),
                        reason: e.to_string(),
                    })?;
                base.descendants()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| (include_base || el.id() != base.id()) && selector.matches(el))
                    .map(|el| el.id())
                    .collect()
            }
        };

        Ok(nodes
            .into_iter()
            .map(|node| ElementHandle {
                context: ctx.id,
                generation: ctx.generation,
                node,
            })
            .collect())
    }

    fn read_text(&self, element: &ElementHandle) -> Result<String, SessionError> {
        let (_, el) = self.element(element)?;
        Ok(visible_text(el))
    }

    /// `href` and `src` come back resolved against the page URL, like the
    /// DOM properties a browser driver reports.
    fn read_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let (page, el) = self.element(element)?;
        let Some(raw) = el.value().attr(name) else {
            return Ok(None);
        };

        if matches!(name, "href" | "src") {
            if let Ok(resolved) = page.url.join(raw.trim()) {
                return Ok(Some(resolved.to_string()));
            }
        }
        Ok(Some(raw.to_string()))
    }

    fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        let (page, el) = self.element(element)?;

        let Some((href, target)) = link_target(el) else {
            let name = el.value().name();
            let kind = el.value().attr("type").unwrap_or_default();
            if name == "button" || (name == "input" && matches!(kind, "submit" | "image")) {
                return Err(SessionError::Unsupported("form submission".to_string()));
            }
            return Ok(());
        };

        let url = link_url(page, &href)?;
        let page = self.fetch_page(url)?;
        if opens_new_context(target.as_deref()) {
            self.spawn(page);
            Ok(())
        } else {
            self.install(element.context, page)
        }
    }

    fn open_in_new_context(&mut self, element: &ElementHandle) -> Result<ContextId, SessionError> {
        let (page, el) = self.element(element)?;
        let (href, _) = link_target(el).ok_or(SessionError::NoLink)?;
        let url = link_url(page, &href)?;
        let page = self.fetch_page(url)?;
        Ok(self.spawn(page))
    }

    fn open_context(&mut self, url: &str) -> Result<ContextId, SessionError> {
        let url = self.resolve_url(url)?;
        let page = self.fetch_page(url)?;
        Ok(self.spawn(page))
    }

    fn list_contexts(&self) -> Vec<ContextId> {
        self.contexts.iter().map(|c| c.id).collect()
    }

    fn current_context(&self) -> Option<ContextId> {
        self.current
    }

    fn switch_to_context(&mut self, id: &ContextId) -> Result<(), SessionError> {
        if self.context(*id).is_none() {
            return Err(SessionError::NoSuchContext(id.to_string()));
        }
        self.current = Some(*id);
        Ok(())
    }

    fn close_context(&mut self, id: &ContextId) -> Result<(), SessionError> {
        let before = self.contexts.len();
        self.contexts.retain(|c| c.id != *id);
        if self.contexts.len() == before {
            return Err(SessionError::NoSuchContext(id.to_string()));
        }
        if self.current == Some(*id) {
            self.current = None;
        }
        debug!(context = %id, "context closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticPages;

    const LIST: &str = r#"
    <html><body>
      <h1 class="title">Books</h1>
      <table id="booklist">
        <tr><th>Title</th><th>Detail</th></tr>
        <tr><td>Dune</td><td><a href="/detail/1" target="_blank">1</a></td></tr>
        <tr><td>Emma</td><td><a href="detail/2">2</a></td></tr>
      </table>
    </body></html>
    "#;

    fn session() -> HtmlSession<StaticPages> {
        let pages = StaticPages::new()
            .with_page("https://books.test/list", LIST)
            .with_page("https://books.test/detail/1", "<p>one</p>")
            .with_page("https://books.test/detail/2", "<p>two</p>");
        let mut session = HtmlSession::new(pages);
        session.navigate("https://books.test/list").unwrap();
        session
    }

    #[test]
    fn test_locate_in_document_and_scope() {
        let s = session();
        let table = s.locate_one(None, &Locator::id("booklist")).unwrap().unwrap();
        let rows = s.locate_all(Some(&table), &Locator::tag("tr")).unwrap();
        assert_eq!(rows.len(), 3);

        let cells = s.locate_all(Some(&rows[1]), &Locator::tag("td")).unwrap();
        assert_eq!(s.read_text(&cells[0]).unwrap(), "Dune");

        let children = s.locate_all(Some(&rows[2]), &Locator::Child).unwrap();
        assert_eq!(children.len(), 2);

        let title = s.locate_one(None, &Locator::class("title")).unwrap().unwrap();
        assert_eq!(s.read_text(&title).unwrap(), "Books");

        assert!(s.locate_all(Some(&table), &Locator::tag("ul")).unwrap().is_empty());
    }

    #[test]
    fn test_scoped_search_excludes_scope_itself() {
        let s = session();
        let row = s.locate_all(None, &Locator::tag("tr")).unwrap()[1];
        assert!(s.locate_all(Some(&row), &Locator::tag("tr")).unwrap().is_empty());
    }

    #[test]
    fn test_xpath_locator() {
        let s = session();
        let cells = s
            .locate_all(None, &Locator::xpath("//table[@id='booklist']//tr[3]/td[1]"))
            .unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(s.read_text(&cells[0]).unwrap(), "Emma");

        let row = s.locate_all(None, &Locator::tag("tr")).unwrap()[1];
        let link = s.locate_one(Some(&row), &Locator::xpath("td[2]/a")).unwrap().unwrap();
        assert_eq!(s.read_text(&link).unwrap(), "1");
    }

    #[test]
    fn test_href_is_resolved() {
        let s = session();
        let links = s.locate_all(None, &Locator::tag("a")).unwrap();
        assert_eq!(
            s.read_attribute(&links[1], "href").unwrap().as_deref(),
            Some("https://books.test/detail/2")
        );
        assert_eq!(
            s.read_attribute(&links[0], "target").unwrap().as_deref(),
            Some("_blank")
        );
        assert_eq!(s.read_attribute(&links[0], "title").unwrap(), None);
    }

    #[test]
    fn test_click_with_target_opens_context_without_focus() {
        let mut s = session();
        let origin = s.current_context().unwrap();
        let cell = s.locate_all(None, &Locator::tag("td")).unwrap()[1];

        s.click(&cell).unwrap();
        let contexts = s.list_contexts();
        assert_eq!(contexts.len(), 2);
        assert_eq!(s.current_context(), Some(origin));

        // the original page is untouched
        assert_eq!(s.read_text(&cell).unwrap(), "1");

        s.switch_to_context(&contexts[1]).unwrap();
        let p = s.locate_one(None, &Locator::tag("p")).unwrap().unwrap();
        assert_eq!(s.read_text(&p).unwrap(), "one");
        assert_eq!(s.read_text(&cell), Err(SessionError::ContextMismatch));
    }

    #[test]
    fn test_click_without_target_navigates_in_place() {
        let mut s = session();
        let link = s.locate_all(None, &Locator::tag("a")).unwrap()[1];
        s.click(&link).unwrap();

        assert_eq!(s.list_contexts().len(), 1);
        assert_eq!(s.current_url().unwrap().as_str(), "https://books.test/detail/2");
        assert_eq!(s.read_text(&link), Err(SessionError::StaleElement));
    }

    #[test]
    fn test_open_in_new_context_ignores_target() {
        let mut s = session();
        let origin = s.current_context().unwrap();
        let link = s.locate_all(None, &Locator::tag("a")).unwrap()[1];

        let opened = s.open_in_new_context(&link).unwrap();
        assert_ne!(opened, origin);
        assert_eq!(s.list_contexts().len(), 2);
        assert_eq!(s.current_context(), Some(origin));
        assert_eq!(s.current_url().unwrap().as_str(), "https://books.test/list");
        assert_eq!(s.read_text(&link).unwrap(), "2");

        s.switch_to_context(&opened).unwrap();
        assert_eq!(s.current_url().unwrap().as_str(), "https://books.test/detail/2");
    }

    #[test]
    fn test_open_in_new_context_needs_a_link() {
        let mut s = session();
        let title = s.locate_one(None, &Locator::class("title")).unwrap().unwrap();
        assert_eq!(s.open_in_new_context(&title), Err(SessionError::NoLink));
        assert_eq!(s.list_contexts().len(), 1);
    }

    #[test]
    fn test_handles_survive_other_contexts() {
        let mut s = session();
        let origin = s.current_context().unwrap();
        let cells = s.locate_all(None, &Locator::tag("td")).unwrap();
        let opened = s.open_context("/detail/2").unwrap();
        s.switch_to_context(&opened).unwrap();
        s.close_context(&opened).unwrap();
        s.switch_to_context(&origin).unwrap();

        assert_eq!(s.read_text(&cells[2]).unwrap(), "Emma");
        assert_eq!(s.read_text(&cells[3]).unwrap(), "2");
    }

    #[test]
    fn test_close_context_clears_focus() {
        let mut s = session();
        let opened = s.open_context("/detail/1").unwrap();
        s.switch_to_context(&opened).unwrap();
        s.close_context(&opened).unwrap();

        assert_eq!(s.current_context(), None);
        assert_eq!(
            s.locate_all(None, &Locator::tag("p")),
            Err(SessionError::NoActiveContext)
        );
        assert!(matches!(
            s.switch_to_context(&opened),
            Err(SessionError::NoSuchContext(_))
        ));
    }

    #[test]
    fn test_failed_open_leaves_no_context() {
        let mut s = session();
        assert!(s.open_context("/missing").is_err());
        assert_eq!(s.list_contexts().len(), 1);
    }

    #[test]
    fn test_invalid_selector_is_a_session_fault() {
        let s = session();
        assert!(matches!(
            s.locate_all(None, &Locator::css("td[")),
            Err(SessionError::InvalidSelector { .. })
        ));
    }
}
