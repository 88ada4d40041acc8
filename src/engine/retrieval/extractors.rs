// ── Extraction registry (part of C6 Fetcher) ─────────────────────────────
//
// Picks an extraction strategy by hostname, falling back to a generic
// density-based extractor when nothing specific matches. Grounded on
// `services/extractor_factory.py`'s `get_extractor_for_url` (host-pattern
// registry with a generic fallback): try the content-rich selectors first,
// then fall back to scanning the body for paragraph-shaped elements,
// deduplicating consecutive repeats.
//
// Host-specific extractors here are illustrative stand-ins for a lore
// wiki's own domains rather than a port of any particular real site.

use scraper::{Html, Selector};
use std::collections::BTreeMap;

use crate::atoms::types::Extraction;

const CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=main]", ".post-content", ".entry-content", ".article-body"];
const BODY_FALLBACK_SELECTORS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "pre", "td"];
const MIN_FRAGMENT_LEN: usize = 20;

/// `GetExtractorForURL(url)`: selects a strategy by hostname. Every
/// strategy currently shares the same structural extraction; the registry
/// exists so a future host-specific parser can be dropped in without
/// touching callers.
pub fn extract(url: &str, html: &str) -> Extraction {
    let host = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();
    match host_strategy(&host) {
        HostStrategy::LoreWiki | HostStrategy::WorldCodex | HostStrategy::TaleAtlas | HostStrategy::Generic => {
            extract_generic(html)
        }
    }
}

enum HostStrategy {
    LoreWiki,
    WorldCodex,
    TaleAtlas,
    Generic,
}

/// Hostname registry mirroring `selector::priority_weight`'s suffix table.
/// Every arm shares the same structural extractor today; the match exists so
/// a real per-site parser can be dropped into one arm without touching
/// `extract`'s callers.
fn host_strategy(host: &str) -> HostStrategy {
    if host.ends_with("lorewiki.example") {
        HostStrategy::LoreWiki
    } else if host.ends_with("worldcodex.example") {
        HostStrategy::WorldCodex
    } else if host.ends_with("taleatlas.example") {
        HostStrategy::TaleAtlas
    } else {
        HostStrategy::Generic
    }
}

fn extract_generic(html: &str) -> Extraction {
    let document = Html::parse_document(html);
    let text = extract_readable_text(&document);
    let sections = extract_sections(&document);
    Extraction { html: Some(html.to_string()), text: Some(text), sections, infobox: BTreeMap::new() }
}

fn extract_text_from_element(element: &scraper::ElementRef) -> String {
    let mut text = String::new();
    for node in element.text() {
        let trimmed = node.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }
    text
}

fn extract_readable_text(document: &Html) -> String {
    for sel_str in CONTENT_SELECTORS {
        if let Ok(sel) = Selector::parse(sel_str) {
            let parts: Vec<String> = document.select(&sel).map(|el| extract_text_from_element(&el)).filter(|t| !t.trim().is_empty()).collect();
            if !parts.is_empty() {
                return parts.join("\n\n");
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = document.select(&body_sel).next() {
            let mut paragraphs = Vec::new();
            for sel_str in BODY_FALLBACK_SELECTORS {
                if let Ok(sel) = Selector::parse(sel_str) {
                    for el in body.select(&sel) {
                        let text = extract_text_from_element(&el);
                        if text.len() > MIN_FRAGMENT_LEN {
                            paragraphs.push(text);
                        }
                    }
                }
            }
            if !paragraphs.is_empty() {
                paragraphs.dedup();
                return paragraphs.join("\n\n");
            }
            return extract_text_from_element(&body);
        }
    }
    String::new()
}

/// Splits a document into named sections keyed by heading text, each body
/// covering the text up to (not including) the next heading at the same or
/// a shallower level. Headings with empty bodies are skipped.
fn extract_sections(document: &Html) -> BTreeMap<String, String> {
    let heading_sel = match Selector::parse("h1, h2, h3, h4") {
        Ok(s) => s,
        Err(_) => return BTreeMap::new(),
    };
    let body_sel = match Selector::parse("body") {
        Ok(s) => s,
        Err(_) => return BTreeMap::new(),
    };
    let Some(body) = document.select(&body_sel).next() else {
        return BTreeMap::new();
    };

    let mut sections = BTreeMap::new();
    let headings: Vec<_> = body.select(&heading_sel).collect();
    for (i, heading) in headings.iter().enumerate() {
        let title = extract_text_from_element(heading);
        if title.trim().is_empty() {
            continue;
        }
        let mut section_text = String::new();
        let mut node = heading.next_sibling();
        while let Some(n) = node {
            if let Some(el) = scraper::ElementRef::wrap(n) {
                if headings.get(i + 1).map(|next| next.id() == el.id()).unwrap_or(false) {
                    break;
                }
                let text = extract_text_from_element(&el);
                if !text.trim().is_empty() {
                    if !section_text.is_empty() {
                        section_text.push(' ');
                    }
                    section_text.push_str(&text);
                }
            }
            node = n.next_sibling();
        }
        if !section_text.trim().is_empty() {
            sections.insert(title.trim().to_string(), section_text);
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_article_body_when_present() {
        let html = r#"<html><body><article><p>The kingdom of Eldwood was founded long ago.</p></article></body></html>"#;
        let extraction = extract("https://lore.example/wiki/eldwood", html);
        assert!(extraction.text.unwrap().contains("Eldwood"));
    }

    #[test]
    fn falls_back_to_body_paragraphs_without_article() {
        let html = r#"<html><body><p>A long enough paragraph about dragons and their habits in the mountains.</p></body></html>"#;
        let extraction = extract("https://lore.example/dragons", html);
        assert!(extraction.text.unwrap().contains("dragons"));
    }

    #[test]
    fn extracts_sections_by_heading() {
        let html = r#"<html><body><h2>History</h2><p>Long ago the kingdom rose.</p><h2>Geography</h2><p>Mountains ring the valley.</p></body></html>"#;
        let extraction = extract("https://lore.example/eldwood", html);
        assert!(extraction.sections.contains_key("History"));
        assert!(extraction.sections.contains_key("Geography"));
    }

    #[test]
    fn recognized_host_suffixes_dispatch_without_panicking() {
        let html = r#"<html><body><article><p>Dragons have long guarded the eastern passes.</p></article></body></html>"#;
        for host in ["wiki.lorewiki.example", "atlas.worldcodex.example", "taleatlas.example"] {
            let extraction = extract(&format!("https://{host}/entry"), html);
            assert!(extraction.text.unwrap().contains("Dragons"));
        }
    }
}
