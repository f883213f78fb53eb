//! Where page bodies come from

use std::collections::HashMap;

use tracing::debug;
use url::Url;

use crate::config::FetchConfig;
use crate::error::SessionError;

/// Fetches the HTML for a URL
pub trait PageSource {
    fn fetch(&self, url: &Url) -> Result<String, SessionError>;
}

/// Blocking HTTP fetcher; also serves `file://` URLs from disk
pub struct HttpSource {
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(config: &FetchConfig) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(std::time::Duration::from_secs(config.timeout_secs)))
                .user_agent(config.user_agent.as_str())
                .build(),
        );
        Self { agent }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl PageSource for HttpSource {
    fn fetch(&self, url: &Url) -> Result<String, SessionError> {
        let fail = |reason: String| SessionError::Navigation {
            url: url.to_string(),
            reason,
        };

        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| fail("not a local path".to_string()))?;
            return std::fs::read_to_string(&path).map_err(|e| fail(e.to_string()));
        }

        debug!(%url, "GET");
        let resp = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| fail(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(fail(format!("HTTP {}", resp.status())));
        }

        resp.into_body()
            .read_to_string()
            .map_err(|e| fail(e.to_string()))
    }
}

/// In-memory pages keyed by URL, for fixtures and saved snapshots
#[derive(Debug, Clone, Default)]
pub struct StaticPages {
    pages: HashMap<String, String>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.insert(url, html);
        self
    }

    pub fn insert(&mut self, url: &str, html: &str) {
        self.pages.insert(normalize_key(url), html.to_string());
    }
}

impl PageSource for StaticPages {
    fn fetch(&self, url: &Url) -> Result<String, SessionError> {
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| SessionError::Navigation {
                url: url.to_string(),
                reason: "page not available".to_string(),
            })
    }
}

fn normalize_key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}
