use crate::artifacts::{self, ArtifactSink};
use crate::browser::{Browser, BrowserError, Document, PageOptions, WaitPolicy};
use crate::config::ScraperConfig;
use crate::llm::{Completion, LlmError};
use tracing::{debug, info, warn};

/// Terminal states of the detail-page traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionOutcome {
    /// Inner markup of the seller description element.
    Extracted(String),
    /// No description frame or element on the page; not an error.
    NoFrame,
    /// Navigation failed or timed out.
    Failed(String),
}

/// Intermediate result of inspecting the detail page.
enum FrameLookup {
    Resolved(String),
    Missing,
}

pub struct DescriptionRetriever<'a> {
    browser: &'a dyn Browser,
    sink: &'a dyn ArtifactSink,
    config: &'a ScraperConfig,
}

impl<'a> DescriptionRetriever<'a> {
    pub fn new(browser: &'a dyn Browser, sink: &'a dyn ArtifactSink, config: &'a ScraperConfig) -> Self {
        Self {
            browser,
            sink,
            config,
        }
    }

    /// Walks detail page → description frame → description element. Every
    /// document opened here is closed before returning.
    pub async fn fetch_description(&self, url: &str) -> DescriptionOutcome {
        let main_options = PageOptions::new(WaitPolicy::DomContentLoaded, self.config.page_timeout);
        let main = match self.browser.open_page(url, main_options).await {
            Ok(document) => document,
            Err(err) => {
                warn!(target: "scraper.description", url, error = %err, "detail_page_open_failed");
                return DescriptionOutcome::Failed(err.to_string());
            }
        };

        let lookup = self.resolve_frame(main.as_ref()).await;
        main.close().await;

        let frame_src = match lookup {
            Ok(FrameLookup::Resolved(src)) => src,
            Ok(FrameLookup::Missing) => return DescriptionOutcome::NoFrame,
            Err(err) => {
                warn!(target: "scraper.description", url, error = %err, "detail_page_query_failed");
                return DescriptionOutcome::Failed(err.to_string());
            }
        };

        self.read_frame(&frame_src).await
    }

    async fn resolve_frame(&self, main: &dyn Document) -> Result<FrameLookup, BrowserError> {
        if let Ok(html) = main.content().await {
            self.sink.write(artifacts::DETAIL_PAGE, &html).await;
        }

        let frames = main.query_all(&self.config.frame_selector).await?;
        let Some(frame) = frames.first() else {
            info!(target: "scraper.description", selector = %self.config.frame_selector, "description_frame_missing");
            return Ok(FrameLookup::Missing);
        };

        match frame.attribute("src").await? {
            Some(src) if !src.trim().is_empty() => Ok(FrameLookup::Resolved(src.trim().to_string())),
            _ => {
                info!(target: "scraper.description", "description_frame_without_src");
                Ok(FrameLookup::Missing)
            }
        }
    }

    async fn read_frame(&self, frame_src: &str) -> DescriptionOutcome {
        let frame_options = PageOptions::new(WaitPolicy::DomContentLoaded, self.config.frame_timeout);
        let nested = match self.browser.open_page(frame_src, frame_options).await {
            Ok(document) => document,
            Err(err) => {
                warn!(target: "scraper.description", frame = frame_src, error = %err, "description_frame_open_failed");
                return DescriptionOutcome::Failed(err.to_string());
            }
        };

        let body = self.description_markup(nested.as_ref()).await;
        nested.close().await;

        match body {
            Ok(Some(markup)) => {
                self.sink.write(artifacts::DESCRIPTION_PAGE, &markup).await;
                DescriptionOutcome::Extracted(markup)
            }
            Ok(None) => {
                warn!(
                    target: "scraper.description",
                    selector = %self.config.description_selector,
                    frame = frame_src,
                    "description_element_missing"
                );
                DescriptionOutcome::NoFrame
            }
            Err(err) => {
                warn!(target: "scraper.description", frame = frame_src, error = %err, "description_frame_query_failed");
                DescriptionOutcome::Failed(err.to_string())
            }
        }
    }

    async fn description_markup(&self, nested: &dyn Document) -> Result<Option<String>, BrowserError> {
        let elements = nested.query_all(&self.config.description_selector).await?;
        let Some(element) = elements.first() else {
            return Ok(None);
        };
        Ok(element
            .inner_html()
            .await?
            .filter(|markup| !markup.trim().is_empty()))
    }
}

fn summary_prompt(markup: &str) -> String {
    format!(
        r#"
From the following HTML, take and return only the seller's product description.
Return only the description as **plain text in paragraph form**: no extra formatting, no bullet list, no restating, and no opening or closing remarks.

Do not use lists, markdown, or additional explanation. Output a single clean description paragraph only.

HTML:
{markup}
"#
    )
}

/// Condenses raw description markup into one plain paragraph.
pub async fn summarize(llm: &dyn Completion, markup: &str) -> Result<String, LlmError> {
    let text = llm.complete(&summary_prompt(markup)).await?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(LlmError::InvalidResponse("empty description".into()));
    }
    debug!(target: "scraper.description", chars = text.len(), "description_summarized");
    Ok(text)
}
