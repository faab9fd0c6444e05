//! Headless browser seam.
//!
//! The pipeline only needs a handful of operations: render the result items of
//! a search page, open a detail page in its own context, query elements, read
//! an attribute or inner markup, and release the page again. `chromium` holds
//! the production implementation.

mod chromium;

pub use chromium::ChromiumBrowser;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser context error: {0}")]
    Context(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("navigation to {url} timed out after {}s", .after.as_secs())]
    Timeout { url: String, after: Duration },
    #[error("query `{selector}` failed: {message}")]
    Query { selector: String, message: String },
}

/// How long `open_page` waits before handing the document back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Initial document parsed; subresources may still be loading.
    DomContentLoaded,
    /// `load` fired and no new resource requests started for a short window.
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub wait: WaitPolicy,
    pub timeout: Duration,
}

impl PageOptions {
    pub fn new(wait: WaitPolicy, timeout: Duration) -> Self {
        Self { wait, timeout }
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    /// Opens `url`, collects the inner markup of every element matching
    /// `selector`, and releases the page before returning.
    async fn render(
        &self,
        url: &str,
        selector: &str,
        options: PageOptions,
    ) -> Result<Vec<String>, BrowserError>;

    /// Opens `url` in a fresh isolated context. The caller owns the returned
    /// document and must `close` it.
    async fn open_page(
        &self,
        url: &str,
        options: PageOptions,
    ) -> Result<Box<dyn Document>, BrowserError>;
}

#[async_trait]
pub trait Document: Send + Sync {
    async fn content(&self) -> Result<String, BrowserError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError>;

    /// Closes the page and disposes the context it was opened in.
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError>;

    async fn inner_html(&self) -> Result<Option<String>, BrowserError>;
}
