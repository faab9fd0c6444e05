use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const FRAGMENTS: &str = "productHtml.json";
pub const RAW_RESPONSE: &str = "raw_response.txt";
pub const CLEANED_RESPONSE: &str = "cleaned_response.txt";
pub const BATCH_INPUT: &str = "htmlContent.txt";
pub const DETAIL_PAGE: &str = "detail-page.txt";
pub const DESCRIPTION_PAGE: &str = "description-page.txt";
pub const FINAL_PRODUCTS: &str = "final_products.json";

/// Best-effort diagnostic output. Writes never fail the caller; each artifact
/// name is overwritten on every run.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn write(&self, name: &str, contents: &str);
}

pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn write(&self, name: &str, contents: &str) {
        if let Err(err) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(target: "scraper.artifacts", dir = %self.dir.display(), error = %err, "artifact_dir_unavailable");
            return;
        }
        let path = self.dir.join(name);
        match tokio::fs::write(&path, contents).await {
            Ok(()) => debug!(target: "scraper.artifacts", path = %path.display(), bytes = contents.len(), "artifact_written"),
            Err(err) => warn!(target: "scraper.artifacts", path = %path.display(), error = %err, "artifact_write_failed"),
        }
    }
}

pub struct NoopArtifactSink;

#[async_trait]
impl ArtifactSink for NoopArtifactSink {
    async fn write(&self, _name: &str, _contents: &str) {}
}

/// Serializes `value` as pretty JSON and hands it to the sink.
pub async fn write_json<T: serde::Serialize + ?Sized>(
    sink: &dyn ArtifactSink,
    name: &str,
    value: &T,
) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => sink.write(name, &json).await,
        Err(err) => warn!(target: "scraper.artifacts", artifact = name, error = %err, "artifact_serialize_failed"),
    }
}
