// ── Fetcher (C6) ──────────────────────────────────────────────────────────
//
// Fetches a set of candidate URLs in parallel, bounded by a semaphore so one
// lookup can't monopolize the shared `reqwest::Client`. A single on-demand
// fetch (`reqwest::Client::builder().timeout(...)`) generalized to a
// bounded-fan-out batch, grounded on `services/http_service.py`'s
// `fetch_html` — per-URL failures are caught and recorded against that
// source rather than failing the whole lookup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::atoms::types::RetrievedSource;
use crate::engine::retrieval::extractors;

/// Fetches and extracts every URL in `urls`, in parallel, bounded by
/// `semaphore`. A URL that fails to fetch still appears in the result with
/// `extraction: None` so the caller (the Section Selector) can skip it
/// without losing track of how many sources were attempted.
pub async fn fetch_sources(
    client: &reqwest::Client,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    urls: &[(String, u8)],
) -> Vec<RetrievedSource> {
    let fetches = urls.iter().map(|(url, weight)| {
        let client = client.clone();
        let semaphore = semaphore.clone();
        let url = url.clone();
        let weight = *weight;
        async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let extraction = fetch_one(&client, &url, timeout).await;
            RetrievedSource { url, weight, extraction }
        }
    });

    futures::future::join_all(fetches).await
}

async fn fetch_one(client: &reqwest::Client, url: &str, timeout: Duration) -> Option<crate::atoms::types::Extraction> {
    let response = match tokio::time::timeout(timeout, client.get(url).send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            tracing::warn!(url, error = %e, "fetch failed");
            return None;
        }
        Err(_) => {
            tracing::warn!(url, "fetch timed out");
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::warn!(url, status = %response.status(), "fetch returned non-success status");
        return None;
    }

    match response.text().await {
        Ok(html) => Some(extractors::extract(url, &html)),
        Err(e) => {
            tracing::warn!(url, error = %e, "failed reading response body");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_urls_resolve_to_none_without_failing_the_batch() {
        let client = reqwest::Client::new();
        let semaphore = Arc::new(Semaphore::new(2));
        let urls = vec![("http://127.0.0.1:1/unreachable".to_string(), 5u8)];
        let results = fetch_sources(&client, semaphore, Duration::from_millis(200), &urls).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].extraction.is_none());
    }
}
