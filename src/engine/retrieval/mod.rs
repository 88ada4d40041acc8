// ── Retrieval (C6 Fetcher + C7 Section Selector) ─────────────────────────
//
// Public entry point for the lookup flow: given a query and a list of
// candidate URLs (the caller owns search — an external search provider is
// outside this crate's scope), fetch and extract every candidate, then
// build one excerpt per source ready to hand to the Lookup Assembler
// (`engine::context_builder::assemble_lookup_prompt`).

pub mod extractors;
pub mod fetcher;
pub mod selector;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::atoms::types::RetrievedSource;

pub use selector::extract_query_terms;

/// One retrieved source with the excerpt already built for its weight, in
/// the original candidate order. Callers sort by weight before handing the
/// result to the Lookup Assembler.
pub struct RetrievedExcerpt {
    pub source: RetrievedSource,
    pub excerpt: String,
}

/// Fetches every candidate URL, extracts structured content, and builds a
/// per-source excerpt sized to that source's priority weight. Sources that
/// failed to fetch or yielded no text are dropped — the Lookup Assembler
/// falls back to `NO_SOURCES_FALLBACK` if everything drops.
pub async fn gather_excerpts(
    client: &reqwest::Client,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    query: &str,
    candidate_urls: &[String],
) -> Vec<RetrievedExcerpt> {
    let query_terms = selector::extract_query_terms(query);

    let weighted: Vec<(String, u8)> = candidate_urls
        .iter()
        .map(|url| {
            let host = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();
            (url.clone(), selector::priority_weight(&host))
        })
        .collect();

    let fetched = fetcher::fetch_sources(client, semaphore, timeout, &weighted).await;

    let mut excerpts: Vec<RetrievedExcerpt> = fetched
        .into_iter()
        .filter_map(|source| {
            let extraction = source.extraction.as_ref()?;
            let excerpt = selector::build_excerpt(extraction, &query_terms, source.weight);
            if excerpt.trim().is_empty() {
                return None;
            }
            Some(RetrievedExcerpt { source, excerpt })
        })
        .collect();

    excerpts.sort_by(|a, b| b.source.weight.cmp(&a.source.weight));
    excerpts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sources_with_no_extractable_text_are_dropped() {
        let client = reqwest::Client::new();
        let semaphore = Arc::new(Semaphore::new(2));
        let urls = vec!["http://127.0.0.1:1/unreachable".to_string()];
        let excerpts = gather_excerpts(&client, semaphore, Duration::from_millis(200), "dragon", &urls).await;
        assert!(excerpts.is_empty());
    }
}
