use reqwest::Client;
use std::time::Duration;

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// Client for the completion service.
pub fn build_client() -> Client {
    Client::builder()
        .timeout(secs_from_env("HTTP_TIMEOUT_SECS", 120))
        .connect_timeout(secs_from_env("HTTP_CONNECT_TIMEOUT_SECS", 5))
        .build()
        .unwrap_or_else(|_| Client::new())
}
