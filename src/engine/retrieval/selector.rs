// ── Section Selector (C7) ────────────────────────────────────────────────
//
// Turns a free-text lookup query into normalized match terms, then picks
// which sections of an Extraction to keep. Grounded directly on
// `ai/lookup_ai/query_terms.py` (`extract_query_terms`) and
// `ai/lookup_ai/section_selector.py` (`select_sections`): quoted phrases
// become no-space lowercase tokens, unquoted words become lowercase
// alphanumeric tokens, both deduplicated in first-seen order; a section
// matches if any term appears in its title (plain or no-space form).
//
// `priority_weight` / `allowed_chars_for_weight` / `build_excerpt` are
// grounded on `retrieval/describer.py`'s per-source excerpt assembly: a
// source's hostname decides both how much text it's allowed to contribute
// and whether sections or plain text are preferred.

use std::collections::BTreeMap;

use crate::atoms::types::Extraction;

const MAX_EXCERPT_CHARS: usize = 1000;

/// `_get_priority_weight`: unrecognized hosts default to the lowest weight.
pub fn priority_weight(host: &str) -> u8 {
    const PRIORITY_HOSTS: &[(&str, u8)] = &[("lorewiki.example", 4), ("worldcodex.example", 5), ("taleatlas.example", 4)];
    for (suffix, weight) in PRIORITY_HOSTS {
        if host.ends_with(suffix) {
            return *weight;
        }
    }
    1
}

/// `_allowed_chars_for_weight`.
pub fn allowed_chars_for_weight(weight: u8) -> usize {
    if weight >= 4 {
        MAX_EXCERPT_CHARS + 200
    } else if weight == 3 {
        MAX_EXCERPT_CHARS
    } else if weight == 2 {
        700
    } else {
        300
    }
}

/// Builds the excerpt handed to the Lookup Assembler for one source:
/// high-weight sources prefer selected sections (and infobox facts), lower
/// weights fall back to plain extracted text, all truncated to the
/// weight's character budget.
pub fn build_excerpt(extraction: &Extraction, query_terms: &[String], weight: u8) -> String {
    let allowed = allowed_chars_for_weight(weight);

    if weight >= 3 {
        let mut parts = Vec::new();
        if !extraction.infobox.is_empty() {
            let items: Vec<String> = extraction.infobox.iter().take(8).map(|(k, v)| format!("{k}: {v}")).collect();
            parts.push(format!("INFOBOX:\n{}", items.join("; ")));
        }
        let sections = select_sections(&extraction.sections, query_terms, 3);
        if !sections.is_empty() {
            let rendered: Vec<String> = sections.iter().map(|(title, body)| format!("{title}:\n{body}")).collect();
            parts.push(format!("SECTIONS:\n{}", rendered.join("\n\n")));
        }
        if parts.is_empty() {
            if let Some(ref text) = extraction.text {
                parts.push(text.clone());
            }
        }
        return truncate_chars(&parts.join("\n\n---\n\n"), allowed);
    }

    if weight == 2 {
        let mut parts = Vec::new();
        if let Some(ref text) = extraction.text {
            parts.push(truncate_chars(text, allowed));
        }
        if let Some((title, body)) = select_sections(&extraction.sections, query_terms, 1).into_iter().next() {
            parts.push(format!("{title}:\n{}", truncate_chars(body, 400)));
        }
        return truncate_chars(&parts.join("\n\n---\n\n"), allowed);
    }

    extraction.text.as_deref().map(|t| truncate_chars(t, allowed)).unwrap_or_default()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// `ExtractQueryTerms(query) -> []string`.
pub fn extract_query_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut push_term = |raw: String, terms: &mut Vec<String>, seen: &mut std::collections::HashSet<String>| {
        if !raw.is_empty() && seen.insert(raw.clone()) {
            terms.push(raw);
        }
    };

    let mut remainder = String::new();
    let mut chars = query.chars().peekable();
    let mut in_quote: Option<char> = None;
    let mut quoted = String::new();

    while let Some(c) = chars.next() {
        match in_quote {
            Some(q) if c == q => {
                let normalized: String = quoted.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_lowercase()).collect();
                push_term(normalized, &mut terms, &mut seen);
                quoted.clear();
                in_quote = None;
            }
            Some(_) => quoted.push(c),
            None if c == '"' || c == '\'' => in_quote = Some(c),
            None => remainder.push(c),
        }
    }

    for word in remainder.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        push_term(word.to_ascii_lowercase(), &mut terms, &mut seen);
    }

    terms
}

/// `SelectSections(sections, queryTerms, maxSections) -> [(title, body)]`.
/// Falls back to the first `max_sections` entries (in map iteration order)
/// when no term matches, or when no terms were given at all.
pub fn select_sections<'a>(sections: &'a BTreeMap<String, String>, query_terms: &[String], max_sections: usize) -> Vec<(&'a str, &'a str)> {
    if sections.is_empty() {
        return Vec::new();
    }
    let items: Vec<(&str, &str)> = sections.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    if query_terms.is_empty() {
        return items.into_iter().take(max_sections).collect();
    }

    let mut filtered = Vec::new();
    for (title, body) in &items {
        let lower = title.to_ascii_lowercase();
        let no_space: String = lower.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if query_terms.iter().any(|term| lower.contains(term.as_str()) || no_space.contains(term.as_str())) {
            filtered.push((*title, *body));
        }
    }

    if !filtered.is_empty() {
        filtered.truncate(max_sections);
        return filtered;
    }
    items.into_iter().take(max_sections).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_phrase_becomes_no_space_lowercase_token() {
        let terms = extract_query_terms(r#"tell me about "Eldwood Kingdom" history"#);
        assert!(terms.contains(&"eldwoodkingdom".to_string()));
        assert!(terms.contains(&"tell".to_string()));
    }

    #[test]
    fn duplicate_terms_are_collapsed_preserving_first_seen_order() {
        let terms = extract_query_terms("dragon dragon fire");
        assert_eq!(terms, vec!["dragon".to_string(), "fire".to_string()]);
    }

    #[test]
    fn select_sections_falls_back_to_first_n_when_nothing_matches() {
        let mut sections = BTreeMap::new();
        sections.insert("History".to_string(), "Long ago...".to_string());
        sections.insert("Geography".to_string(), "Mountains to the north.".to_string());
        let picked = select_sections(&sections, &["dragon".to_string()], 1);
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn select_sections_prefers_title_matches() {
        let mut sections = BTreeMap::new();
        sections.insert("Dragons".to_string(), "Ancient beasts.".to_string());
        sections.insert("Geography".to_string(), "Mountains to the north.".to_string());
        let picked = select_sections(&sections, &["dragon".to_string()], 3);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].0, "Dragons");
    }

    #[test]
    fn unrecognized_hosts_get_lowest_priority_weight() {
        assert_eq!(priority_weight("unknown.example"), 1);
        assert_eq!(priority_weight("sub.worldcodex.example"), 5);
    }

    #[test]
    fn high_weight_excerpt_prefers_sections_over_plain_text() {
        let mut extraction = Extraction::default();
        extraction.text = Some("fallback plain text".into());
        extraction.sections.insert("History".to_string(), "The kingdom rose and fell.".to_string());
        let excerpt = build_excerpt(&extraction, &[], 4);
        assert!(excerpt.contains("SECTIONS"));
        assert!(excerpt.contains("kingdom rose"));
    }

    #[test]
    fn low_weight_excerpt_is_truncated_to_budget() {
        let mut extraction = Extraction::default();
        extraction.text = Some("x".repeat(5000));
        let excerpt = build_excerpt(&extraction, &[], 1);
        assert_eq!(excerpt.chars().count(), allowed_chars_for_weight(1));
    }
}
