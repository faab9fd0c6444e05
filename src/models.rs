use serde::{Deserialize, Serialize};

/// Substituted whenever a seller description cannot be retrieved.
pub const PLACEHOLDER_DESCRIPTION: &str = "-";

/// Raw markup of one rendered search-result item.
pub type RawFragment = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub price: String,
    pub link: String,
    pub description: String,
}

impl ProductRecord {
    pub fn new(name: impl Into<String>, price: impl Into<String>, link: &str) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            link: normalize_link(link),
            description: PLACEHOLDER_DESCRIPTION.to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Drops the query string (and any fragment that follows it) from a product link.
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    let base = match trimmed.find(['?', '#']) {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    base.to_string()
}

/// Query parameters accepted by `GET /scrape`. Both are kept as raw strings so
/// malformed values fall back to defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ScrapeQuery {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

impl ScrapeQuery {
    pub fn keyword_or(&self, default: &str) -> String {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    pub fn page_number(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1)
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}
