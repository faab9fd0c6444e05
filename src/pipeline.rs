use crate::artifacts::{self, ArtifactSink};
use crate::browser::{Browser, PageOptions, WaitPolicy};
use crate::config::ScraperConfig;
use crate::description::{self, DescriptionOutcome, DescriptionRetriever};
use crate::extract;
use crate::llm::Completion;
use crate::models::{PLACEHOLDER_DESCRIPTION, ProductRecord, RawFragment};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Search page → extracted products → described products. Collaborators are
/// injected so one instance can be shared across requests.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<ScraperConfig>,
    llm: Arc<dyn Completion>,
    browser: Arc<dyn Browser>,
    sink: Arc<dyn ArtifactSink>,
}

impl Pipeline {
    pub fn new(
        config: ScraperConfig,
        llm: Arc<dyn Completion>,
        browser: Arc<dyn Browser>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            llm,
            browser,
            sink,
        }
    }

    pub async fn run(&self, keyword: &str, page: u32) -> Result<Vec<ProductRecord>, PipelineError> {
        let url = self.config.search_url(keyword, page);
        info!(target: "scraper.pipeline", keyword, page, url = %url, "scrape_started");

        let fragments = self
            .timed("render", async {
                let options = PageOptions::new(WaitPolicy::NetworkIdle, self.config.page_timeout);
                self.browser
                    .render(&url, &self.config.result_selector, options)
                    .await
                    .map_err(|err| PipelineError::internal("render", err.to_string()))
            })
            .await?;
        info!(target: "scraper.pipeline", fragments = fragments.len(), "fragments_rendered");
        artifacts::write_json(self.sink.as_ref(), artifacts::FRAGMENTS, &fragments).await;

        let mut products = self
            .timed("extract", async { Ok(self.extract_all(fragments).await) })
            .await?;

        if let Some(cap) = self.config.max_products
            && products.len() > cap
        {
            info!(target: "scraper.pipeline", extracted = products.len(), cap, "product_cap_applied");
            products.truncate(cap);
        }

        info!(target: "scraper.pipeline", products = products.len(), "fetching_descriptions");
        let products = self
            .timed("describe", async { Ok(self.describe_all(products).await) })
            .await?;

        artifacts::write_json(self.sink.as_ref(), artifacts::FINAL_PRODUCTS, &products).await;
        info!(target: "scraper.pipeline", products = products.len(), "scrape_finished");
        Ok(products)
    }

    /// Batches run one after another; a batch that yields nothing leaves its
    /// siblings untouched.
    async fn extract_all(&self, fragments: Vec<RawFragment>) -> Vec<ProductRecord> {
        let mut products = Vec::new();
        for (index, batch) in fragments.chunks(self.config.batch_size).enumerate() {
            let records = extract::extract(self.llm.as_ref(), self.sink.as_ref(), batch).await;
            crate::metrics::batch_outcome(index + 1, records.len());
            info!(
                target: "scraper.pipeline",
                batch = index + 1,
                fragments = batch.len(),
                records = records.len(),
                "batch_processed"
            );
            for (offset, record) in records.iter().enumerate() {
                debug!(
                    target: "scraper.pipeline",
                    position = products.len() + offset + 1,
                    name = %record.name,
                    price = %record.price,
                    link = %record.link,
                    "product_extracted"
                );
            }
            products.extend(records);
        }
        products
    }

    async fn describe_all(&self, products: Vec<ProductRecord>) -> Vec<ProductRecord> {
        let retriever = DescriptionRetriever::new(self.browser.as_ref(), self.sink.as_ref(), &self.config);
        let mut described = Vec::with_capacity(products.len());
        for record in products {
            let description = self.describe(&retriever, &record.link).await;
            described.push(record.with_description(description));
        }
        described
    }

    async fn describe(&self, retriever: &DescriptionRetriever<'_>, link: &str) -> String {
        debug!(target: "scraper.pipeline", link, "fetching_detail_page");
        let markup = match retriever.fetch_description(link).await {
            DescriptionOutcome::Extracted(markup) => markup,
            DescriptionOutcome::NoFrame => {
                info!(target: "scraper.pipeline", link, "description_unavailable");
                return PLACEHOLDER_DESCRIPTION.to_string();
            }
            DescriptionOutcome::Failed(reason) => {
                warn!(target: "scraper.pipeline", link, reason = %reason, "detail_page_failed");
                return PLACEHOLDER_DESCRIPTION.to_string();
            }
        };
        match description::summarize(self.llm.as_ref(), &markup).await {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "scraper.pipeline", link, error = %err, "description_summary_failed");
                PLACEHOLDER_DESCRIPTION.to_string()
            }
        }
    }

    async fn timed<T, Fut>(&self, stage: &'static str, fut: Fut) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let started = Instant::now();
        let value = fut.await?;
        crate::metrics::stage_elapsed(stage, started.elapsed());
        Ok(value)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
}

impl PipelineError {
    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}
