//! Counters and histograms exposed on `/metrics`. Each call also emits a
//! trace event under `scraper.metrics`.

use metrics::{counter, histogram};
use tracing::trace;

pub const REQUESTS_TOTAL: &str = "scraper_requests_total";
pub const STAGE_SECONDS: &str = "scraper_stage_duration_seconds";
pub const BATCH_RECORDS_TOTAL: &str = "scraper_batch_records_total";

pub fn inc_requests(route: &'static str) {
    counter!(REQUESTS_TOTAL, "route" => route).increment(1);
    trace!(target: "scraper.metrics", route, "requests_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed: std::time::Duration) {
    histogram!(STAGE_SECONDS, "stage" => stage).record(elapsed.as_secs_f64());
    trace!(
        target: "scraper.metrics",
        stage,
        elapsed_ms = elapsed.as_millis() as u64,
        "stage_elapsed"
    );
}

pub fn batch_outcome(batch: usize, records: usize) {
    counter!(BATCH_RECORDS_TOTAL).increment(records as u64);
    trace!(
        target: "scraper.metrics",
        batch = batch as u64,
        records = records as u64,
        "batch_records"
    );
}
