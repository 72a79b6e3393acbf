//! Shared `reqwest` clients keyed by base URL.
//!
//! The hosted agent client, the embedding client, the search proxy and every MCP plugin talk to
//! a handful of fixed hosts for the whole life of the process. Each host gets one pooled
//! client so DNS and TLS setup are paid once.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Request timeout applied when the caller does not pick one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static CLIENT_POOL: Lazy<DashMap<String, reqwest::Client>> = Lazy::new(DashMap::new);

/// Creates or retrieves the shared HTTP client for `base_url`.
pub fn get_or_create_client(base_url: &str) -> reqwest::Client {
    get_or_create_client_with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
}

/// Like [`get_or_create_client`] but keyed on the timeout too, so MCP plugins with a short
/// timeout don't share a client with the long-running agent calls.
pub fn get_or_create_client_with_timeout(base_url: &str, timeout: Duration) -> reqwest::Client {
    let key = format!("{}#{}", origin_of(base_url), timeout.as_millis());
    CLIENT_POOL
        .entry(key)
        .or_insert_with(|| create_pooled_client(timeout))
        .clone()
}

/// `scheme://host[:port]` of a URL; the pool is per host, not per path.
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(slash) => &url[..after_scheme + slash],
        None => url,
    }
}

fn create_pooled_client(timeout: Duration) -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}
