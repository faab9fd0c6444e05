use std::{path::PathBuf, time::Duration};

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://www.ebay.com/sch/i.html";
pub const RESULT_ITEM_SELECTOR: &str = ".s-item";
pub const DESCRIPTION_FRAME_SELECTOR: &str = "#desc_ifr";
pub const DESCRIPTION_BODY_SELECTOR: &str = ".x-item-description-child";

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub search_base_url: String,
    pub default_keyword: String,
    pub result_selector: String,
    pub frame_selector: String,
    pub description_selector: String,
    pub batch_size: usize,
    pub page_timeout: Duration,
    pub frame_timeout: Duration,
    /// `None` leaves the product count bounded only by the page size.
    pub max_products: Option<usize>,
    pub artifact_dir: PathBuf,
    pub artifacts_enabled: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            search_base_url: DEFAULT_SEARCH_BASE_URL.into(),
            default_keyword: "nike".into(),
            result_selector: RESULT_ITEM_SELECTOR.into(),
            frame_selector: DESCRIPTION_FRAME_SELECTOR.into(),
            description_selector: DESCRIPTION_BODY_SELECTOR.into(),
            batch_size: 5,
            page_timeout: Duration::from_secs(60),
            frame_timeout: Duration::from_secs(30),
            max_products: None,
            artifact_dir: PathBuf::from("."),
            artifacts_enabled: true,
        }
    }
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            search_base_url: std::env::var("SEARCH_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.search_base_url),
            default_keyword: std::env::var("DEFAULT_KEYWORD")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_keyword),
            batch_size: env_parse::<usize>("BATCH_SIZE")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.batch_size),
            page_timeout: env_parse::<u64>("PAGE_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.page_timeout),
            frame_timeout: env_parse::<u64>("FRAME_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.frame_timeout),
            max_products: env_parse::<usize>("MAX_PRODUCTS_PER_PAGE").filter(|v| *v > 0),
            artifact_dir: std::env::var("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            artifacts_enabled: std::env::var("ARTIFACTS_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.artifacts_enabled),
            ..defaults
        }
    }

    pub fn search_url(&self, keyword: &str, page: u32) -> String {
        format!(
            "{base}?_from=R40&_nkw={keyword}&_sacat=0&rt=nc&_pgn={page}",
            base = self.search_base_url,
            keyword = urlencoding::encode(keyword),
        )
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_keyword() {
        let config = ScraperConfig::default();
        assert_eq!(
            config.search_url("running shoes", 2),
            "https://www.ebay.com/sch/i.html?_from=R40&_nkw=running%20shoes&_sacat=0&rt=nc&_pgn=2"
        );
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("nope"));
    }
}
