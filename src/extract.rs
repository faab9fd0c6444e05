use crate::artifacts::{self, ArtifactSink};
use crate::llm::Completion;
use crate::models::{ProductRecord, RawFragment};
use serde_json::Value;
use tracing::{debug, warn};

/// Listing names the site uses for ad slots and shop promos.
const PROMOTIONAL_NAMES: &[&str] = &["shop on ebay", "sponsored"];

fn extraction_prompt(batch: &[RawFragment]) -> String {
    let html = serde_json::to_string(batch).unwrap_or_else(|_| batch.join("\n"));
    format!(
        r#"
You are given HTML fragments from an eBay search results page.
Extract every product shown in them, **only real products (no ads, banners, or promotions)**.
For each product return:

- name: the product name
- price: the product price exactly as displayed
- link: the URL of the product detail page

**Important**:
- Skip entries without a clear product name, or whose name is only "Shop on eBay", "Sponsored", or any other promotional placeholder.
- For "link", keep only the base URL before the "?" (remove the whole query string).

Respond with a single valid JSON array only: no explanation, no narration, no code fences.
Each element must be an object with exactly the keys "name", "price", and "link".

Expected output:
[
  {{
    "name": "...",
    "price": "...",
    "link": "..."
  }}
]

HTML fragments:
{html}
"#
    )
}

/// Result of interpreting one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Vec<ProductRecord>),
    Malformed { raw: String, cleaned: String },
}

/// Removes ```` ```json ```` / ```` ``` ```` markers wherever they appear.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Slice from the first `[` to the last `]`, if they appear in that order.
fn bracketed(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_array(text: &str) -> Option<Vec<Value>> {
    serde_json::from_str::<Vec<Value>>(text).ok()
}

/// Two strategies, tried in order: the fence-stripped response as a whole, then
/// the bracketed slice of the untouched response.
pub fn parse_response(raw: &str) -> ParseOutcome {
    let cleaned = strip_code_fences(raw);
    let entries = parse_array(&cleaned).or_else(|| bracketed(raw).and_then(parse_array));
    match entries {
        Some(entries) => ParseOutcome::Parsed(entries.iter().filter_map(product_from_value).collect()),
        None => ParseOutcome::Malformed {
            raw: raw.to_string(),
            cleaned,
        },
    }
}

fn product_from_value(value: &Value) -> Option<ProductRecord> {
    let obj = value.as_object()?;
    let name = text_field(obj.get("name"))?;
    if is_promotional(&name) {
        return None;
    }
    let link = text_field(obj.get("link"))?;
    let price = text_field(obj.get("price")).unwrap_or_default();
    let record = ProductRecord::new(name, price, &link);
    (!record.link.is_empty()).then_some(record)
}

fn text_field(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn is_promotional(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    PROMOTIONAL_NAMES.iter().any(|marker| lowered == *marker)
}

/// Turns one batch of fragments into product records. Never fails: transport
/// errors and unparseable answers both come back as an empty list.
pub async fn extract(
    llm: &dyn Completion,
    sink: &dyn ArtifactSink,
    batch: &[RawFragment],
) -> Vec<ProductRecord> {
    if batch.is_empty() {
        return Vec::new();
    }

    let raw = match llm.complete(&extraction_prompt(batch)).await {
        Ok(text) => text,
        Err(err) => {
            warn!(target: "scraper.extract", fragments = batch.len(), error = %err, "extraction_call_failed");
            return Vec::new();
        }
    };
    debug!(target: "scraper.extract", response = %raw, "extraction_raw_response");

    match parse_response(&raw) {
        ParseOutcome::Parsed(records) => records,
        ParseOutcome::Malformed { raw, cleaned } => {
            warn!(
                target: "scraper.extract",
                fragments = batch.len(),
                response_len = raw.len(),
                "extraction_response_unparseable"
            );
            sink.write(artifacts::RAW_RESPONSE, &raw).await;
            sink.write(artifacts::CLEANED_RESPONSE, &cleaned).await;
            artifacts::write_json(sink, artifacts::BATCH_INPUT, batch).await;
            Vec::new()
        }
    }
}
