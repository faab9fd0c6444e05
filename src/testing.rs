//! In-process stand-ins for the browser, the completion service, and the
//! artifact directory.

use crate::artifacts::ArtifactSink;
use crate::browser::{Browser, BrowserError, Document, ElementHandle, PageOptions};
use crate::llm::{Completion, LlmError};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

type Responder = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// Answers every prompt through a closure and records what it was asked.
pub struct FakeCompletion {
    respond: Box<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new(respond: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(LlmError::Http("HTTP 503 Service Unavailable".into())))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Completion for FakeCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.respond)(prompt)
    }
}

#[derive(Default)]
pub struct MemoryArtifactSink {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryArtifactSink {
    pub fn get(&self, name: &str) -> Option<String> {
        self.files.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn write(&self, name: &str, contents: &str) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(name.to_string(), contents.to_string());
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeElement {
    pub attributes: HashMap<String, String>,
    pub inner_html: Option<String>,
}

impl FakeElement {
    pub fn with_attr(name: &str, value: &str) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(name.to_string(), value.to_string());
        Self {
            attributes,
            inner_html: None,
        }
    }

    pub fn with_html(html: &str) -> Self {
        Self {
            attributes: HashMap::new(),
            inner_html: Some(html.to_string()),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakePage {
    pub content: String,
    pub elements: HashMap<String, Vec<FakeElement>>,
    pub failing_queries: bool,
}

impl FakePage {
    /// Navigates fine but every selector query errors, as when the target
    /// crashes after load.
    pub fn broken() -> Self {
        Self {
            failing_queries: true,
            ..Self::default()
        }
    }

    pub fn with(mut self, selector: &str, element: FakeElement) -> Self {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
        self
    }
}

/// Serves canned pages by URL. Unknown URLs fail navigation. Tracks how many
/// documents were opened and closed so tests can assert on cleanup.
#[derive(Default)]
pub struct FakeBrowser {
    pages: HashMap<String, FakePage>,
    timeouts: Vec<String>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    navigations: Mutex<Vec<(String, PageOptions)>>,
}

impl FakeBrowser {
    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn search_results(self, url: &str, selector: &str, fragments: &[&str]) -> Self {
        let page = fragments.iter().fold(FakePage::default(), |page, html| {
            page.with(selector, FakeElement::with_html(html))
        });
        self.page(url, page)
    }

    pub fn timing_out(mut self, url: &str) -> Self {
        self.timeouts.push(url.to_string());
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.navigations()
            .into_iter()
            .map(|(url, _)| url)
            .collect()
    }

    /// Every `open_page` call with the options it was given, in order.
    pub fn navigations(&self) -> Vec<(String, PageOptions)> {
        self.navigations.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn render(
        &self,
        url: &str,
        selector: &str,
        options: PageOptions,
    ) -> Result<Vec<String>, BrowserError> {
        let document = self.open_page(url, options).await?;
        let elements = document.query_all(selector).await;
        let mut fragments = Vec::new();
        if let Ok(elements) = &elements {
            for element in elements {
                fragments.push(element.inner_html().await.ok().flatten().unwrap_or_default());
            }
        }
        document.close().await;
        elements.map(|_| fragments)
    }

    async fn open_page(
        &self,
        url: &str,
        options: PageOptions,
    ) -> Result<Box<dyn Document>, BrowserError> {
        if let Ok(mut navigations) = self.navigations.lock() {
            navigations.push((url.to_string(), options));
        }
        if self.timeouts.iter().any(|u| u == url) {
            return Err(BrowserError::Timeout {
                url: url.to_string(),
                after: options.timeout,
            });
        }
        let Some(page) = self.pages.get(url).cloned() else {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDocument {
            page,
            closed: self.closed.clone(),
        }))
    }
}

struct FakeDocument {
    page: FakePage,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Document for FakeDocument {
    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.page.content.clone())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError> {
        if self.page.failing_queries {
            return Err(BrowserError::Query {
                selector: selector.to_string(),
                message: "Target closed".into(),
            });
        }
        Ok(self
            .page
            .elements
            .get(selector)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|element| Box::new(element) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.attributes.get(name).cloned())
    }

    async fn inner_html(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.inner_html.clone())
    }
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
