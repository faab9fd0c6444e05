use super::{Browser, BrowserError, Document, ElementHandle, PageOptions, WaitPolicy};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Resource count must stay unchanged this long before the network counts as idle.
const QUIET_WINDOW: Duration = Duration::from_millis(500);

const PAGE_STATE_SCRIPT: &str = r#"
    (function() {
        return {
            href: window.location.href,
            readyState: document.readyState,
            resources: performance.getEntriesByType('resource').length
        };
    })()
"#;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Firefox/115.0",
    "Mozilla/5.0 (Windows NT 10.0; rv:115.0) Gecko/20100101 Firefox/115.0",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// One headless Chromium process shared by every request. Each page gets its
/// own browser context, disposed when the page is closed.
pub struct ChromiumBrowser {
    inner: Arc<CdpBrowser>,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch(request_timeout: Duration) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(request_timeout)
            .window_size(1920, 1080)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");
        if let Some(path) = chromium_path_from_env() {
            info!(target: "scraper.browser", path = %path.display(), "using CHROMIUM_PATH");
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    error!(target: "scraper.browser", error = ?err, "browser_handler_error");
                }
            }
            info!(target: "scraper.browser", "browser event handler finished");
        });

        Ok(Self {
            inner: Arc::new(browser),
            handler,
        })
    }

    async fn open_isolated(&self) -> Result<ChromiumDocument, BrowserError> {
        let context_id = self
            .inner
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|err| BrowserError::Context(err.to_string()))?
            .result
            .browser_context_id;

        let page = match self.new_page_in(&context_id).await {
            Ok(page) => page,
            Err(err) => {
                dispose_context(&self.inner, context_id).await;
                return Err(err);
            }
        };

        Ok(ChromiumDocument {
            browser: self.inner.clone(),
            page,
            context_id,
        })
    }

    async fn new_page_in(&self, context_id: &BrowserContextId) -> Result<Page, BrowserError> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(BrowserError::Context)?;
        let page = self
            .inner
            .new_page(params)
            .await
            .map_err(|err| BrowserError::Context(err.to_string()))?;
        let user_agent = random_user_agent();
        if let Err(err) = page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
        {
            warn!(target: "scraper.browser", error = %err, "set_user_agent_failed");
        }
        Ok(page)
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn render(
        &self,
        url: &str,
        selector: &str,
        options: PageOptions,
    ) -> Result<Vec<String>, BrowserError> {
        let document = self.open_page(url, options).await?;
        let fragments = collect_inner_html(document.as_ref(), selector).await;
        document.close().await;
        fragments
    }

    async fn open_page(
        &self,
        url: &str,
        options: PageOptions,
    ) -> Result<Box<dyn Document>, BrowserError> {
        let document = self.open_isolated().await?;
        if let Err(err) = navigate(&document.page, url, options).await {
            Box::new(document).close().await;
            return Err(err);
        }
        debug!(target: "scraper.browser", url, "page_opened");
        Ok(Box::new(document))
    }
}

async fn collect_inner_html(
    document: &dyn Document,
    selector: &str,
) -> Result<Vec<String>, BrowserError> {
    let elements = document.query_all(selector).await?;
    let mut fragments = Vec::with_capacity(elements.len());
    for element in elements {
        fragments.push(element.inner_html().await?.unwrap_or_default());
    }
    Ok(fragments)
}

async fn navigate(page: &Page, url: &str, options: PageOptions) -> Result<(), BrowserError> {
    let navigation = async {
        match options.wait {
            WaitPolicy::DomContentLoaded => wait_until_parsed(page, url).await,
            WaitPolicy::NetworkIdle => {
                page.goto(url).await.map_err(|err| navigation_error(url, err))?;
                wait_until_quiet(page).await;
                Ok(())
            }
        }
    };
    match tokio::time::timeout(options.timeout, navigation).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout {
            url: url.to_string(),
            after: options.timeout,
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageState {
    href: String,
    ready_state: String,
    resources: u64,
}

async fn page_state(page: &Page) -> Option<PageState> {
    page.evaluate(PAGE_STATE_SCRIPT)
        .await
        .ok()?
        .into_value::<PageState>()
        .ok()
}

/// Starts the navigation from script so the call does not block on the
/// `load` event, then returns once the new document leaves `loading`.
async fn wait_until_parsed(page: &Page, url: &str) -> Result<(), BrowserError> {
    let destination = serde_json::to_string(url).map_err(|err| navigation_error(url, err))?;
    page.evaluate(format!("window.location.assign({destination})"))
        .await
        .map_err(|err| navigation_error(url, err))?;

    loop {
        // Evaluation fails while the new document commits; keep polling.
        match page_state(page).await.as_ref().map(readiness) {
            Some(Readiness::Parsed) => {
                debug!(target: "scraper.browser", url, "document_parsed");
                return Ok(());
            }
            Some(Readiness::ErrorPage) => {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    message: "browser error page".into(),
                });
            }
            Some(Readiness::Pending) | None => {}
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Readiness {
    Pending,
    Parsed,
    ErrorPage,
}

/// The blank start page never counts; the new document counts once it has
/// left `loading`.
fn readiness(state: &PageState) -> Readiness {
    if state.href == "about:blank" {
        Readiness::Pending
    } else if state.href.starts_with("chrome-error:") {
        Readiness::ErrorPage
    } else if state.ready_state == "loading" {
        Readiness::Pending
    } else {
        Readiness::Parsed
    }
}

/// After `load`, waits until no new resource entries appear for `QUIET_WINDOW`.
async fn wait_until_quiet(page: &Page) {
    let mut last_count = None;
    let mut quiet_since = tokio::time::Instant::now();
    loop {
        let count = page_state(page).await.map(|state| state.resources);
        if count.is_some() && count == last_count {
            if quiet_since.elapsed() >= QUIET_WINDOW {
                debug!(target: "scraper.browser", resources = ?count, "network_idle");
                return;
            }
        } else {
            last_count = count;
            quiet_since = tokio::time::Instant::now();
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn navigation_error(url: &str, err: impl std::fmt::Display) -> BrowserError {
    BrowserError::Navigation {
        url: url.to_string(),
        message: err.to_string(),
    }
}

async fn dispose_context(browser: &CdpBrowser, context_id: BrowserContextId) {
    if let Err(err) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        warn!(target: "scraper.browser", error = %err, "dispose_context_failed");
    }
}

fn chromium_path_from_env() -> Option<PathBuf> {
    std::env::var("CHROMIUM_PATH")
        .ok()
        .map(PathBuf::from)
        .filter(|path| path.exists())
}

struct ChromiumDocument {
    browser: Arc<CdpBrowser>,
    page: Page,
    context_id: BrowserContextId,
}

#[async_trait]
impl Document for ChromiumDocument {
    async fn content(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|err| BrowserError::Query {
                selector: "html".into(),
                message: err.to_string(),
            })
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|err| BrowserError::Query {
                selector: selector.to_string(),
                message: err.to_string(),
            })?;
        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromiumElement { element }) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn close(self: Box<Self>) {
        let ChromiumDocument {
            browser,
            page,
            context_id,
        } = *self;
        if let Err(err) = page.close().await {
            warn!(target: "scraper.browser", error = %err, "page_close_failed");
        }
        dispose_context(&browser, context_id).await;
    }
}

struct ChromiumElement {
    element: Element,
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        self.element
            .attribute(name)
            .await
            .map_err(|err| BrowserError::Query {
                selector: format!("[{name}]"),
                message: err.to_string(),
            })
    }

    async fn inner_html(&self) -> Result<Option<String>, BrowserError> {
        self.element
            .inner_html()
            .await
            .map_err(|err| BrowserError::Query {
                selector: "innerHTML".into(),
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(href: &str, ready_state: &str) -> PageState {
        serde_json::from_value(serde_json::json!({
            "href": href,
            "readyState": ready_state,
            "resources": 12
        }))
        .expect("page state")
    }

    #[test]
    fn document_counts_as_parsed_once_interactive() {
        let item = "https://www.ebay.com/itm/111";
        assert_eq!(readiness(&state(item, "loading")), Readiness::Pending);
        assert_eq!(readiness(&state(item, "interactive")), Readiness::Parsed);
        assert_eq!(readiness(&state(item, "complete")), Readiness::Parsed);
    }

    #[test]
    fn start_page_is_never_parsed() {
        assert_eq!(readiness(&state("about:blank", "complete")), Readiness::Pending);
    }

    #[test]
    fn error_page_is_a_navigation_failure() {
        assert_eq!(
            readiness(&state("chrome-error://chromewebdata/", "complete")),
            Readiness::ErrorPage
        );
    }
}
