// ── Prompt Assembler (C4) + Lookup Assembler (C8) ────────────────────────
//
// Two related packing problems, one shared discipline: never split a
// segment to make it fit. A segment (a RawTurn, a SummaryChunk, a lookup
// excerpt) is included whole or not at all.
//
// The story prompt has a fixed (never-dropped) head — directives, universe,
// player, rating — and a fixed (never-dropped) tail — the current-turn
// action block plus its terminator. Between them sits a sequential,
// priority-ordered history region, grounded directly on `flatten_json_prompt`
// in `ai/services/ai_api_service.py`: the remaining budget is offered to
// DeepMemory first (whole or omitted entirely), then whatever's left drains
// into Active SummaryChunks newest-first, then whatever's left after that
// drains into Active RawTurns newest-first. Each region stops at the first
// segment that doesn't fit rather than searching for a better-fitting one
// further back.
//
// The lookup prompt follows the same whole-or-nothing discipline again,
// ordered by source weight per `describer.py`'s packing loop
// (`available_tokens`, `removed_sources`).

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{ActionMode, DirectiveSettings, GameRating, HistoryView, Player, RetrievedSource, World};
use crate::engine::token_counter::TokenCounter;

const SECTION_SEPARATOR: &str = "\n\n";

/// Renders the player's current input for the action-mode line at the tail
/// of the prompt. Each mode renders distinctly so the model can tell
/// in-character speech from narrated description from a bare continuation.
pub fn render_current_action(mode: ActionMode, input: &str) -> String {
    match mode {
        ActionMode::Action => format!("# Player Action: {input}"),
        ActionMode::Speech => format!("# Player Says: \"{input}\""),
        ActionMode::Narrate => format!("# Player Narrative: {input}"),
        ActionMode::None => "# No Player Action. Continue the story naturally.".to_string(),
    }
}

pub struct AssembledPrompt {
    pub text: String,
    pub total_tokens: i64,
    /// Number of history entries (DeepMemory, chunks, raw turns) left out of
    /// the assembled prompt, whether windowed out or budget-dropped.
    pub segments_dropped: usize,
}

/// Assembles the full story-turn prompt: a fixed head (directives, universe,
/// player, rating), a sequential history region (DeepMemory, then
/// SummaryChunks, then RawTurns, each newest-first), and a fixed tail (the
/// current-turn action block plus the story splitter terminator).
///
/// Returns `PromptTooLarge` if the fixed head and tail alone, before any
/// history is added, don't fit the safe prompt limit — there is nothing left
/// to evict at that point.
pub fn assemble_story_prompt(
    settings: &DirectiveSettings,
    world: &World,
    rating: &GameRating,
    history: &HistoryView,
    mode: ActionMode,
    player: &Player,
    player_input: &str,
    counter: &TokenCounter,
) -> EngineResult<AssembledPrompt> {
    let preamble_parts = vec![
        format!("# Narrator Directives:\n{}\n{}", settings.storyteller_prompt, settings.game_directive),
        format!("# Universe: {}\n{}", world.name, world.lore_tokens),
        format!("# Player: {} ({})", player.name, player.gender_label()),
        rating.ai_prompt.clone(),
    ];
    let preamble = preamble_parts.join(SECTION_SEPARATOR);
    let preamble_tokens = counter.count(&preamble).count;

    let action_line = render_current_action(mode, player_input);
    let action_block = format!("{action_line}{SECTION_SEPARATOR}{}", settings.story_splitter);
    let action_tokens = counter.count(&action_block).count;

    let safe_limit = settings.safe_prompt_limit();
    let fixed_cost = preamble_tokens + action_tokens;
    if fixed_cost > safe_limit {
        return Err(EngineError::prompt_too_large(fixed_cost, safe_limit));
    }

    let separator_tokens = counter.count(SECTION_SEPARATOR).count;
    let mut available = safe_limit - fixed_cost;
    let mut segments_dropped = 0usize;
    let mut history_blocks: Vec<String> = Vec::new();

    // DeepMemory: whole or omitted, offered the full remaining budget first.
    if let Some(ref deep) = history.deep_memory {
        let block = format!("# Ancient History:\n{}", deep.summary_text);
        let cost = counter.count(&block).count + separator_tokens;
        if cost <= available {
            available -= cost;
            history_blocks.push(block);
        } else {
            segments_dropped += 1;
        }
    }

    // Active SummaryChunks: capped to the newest `max_active_chunks`, then
    // drained newest-first from whatever DeepMemory left behind.
    let max_chunks = settings.max_active_chunks.max(0) as usize;
    let chunk_window_start = history.chunks.len().saturating_sub(max_chunks);
    segments_dropped += chunk_window_start;
    let chunk_items: Vec<(String, i64)> =
        history.chunks[chunk_window_start..].iter().map(|c| (c.summary_text.clone(), c.token_count)).collect();
    let past_events_header = "# Past Events:\n";
    let header_tokens = counter.count(past_events_header).count;
    let chunk_budget = (available - separator_tokens - header_tokens).max(0);
    let (kept_chunks, used_chunks, dropped_chunks) = pack_newest_first(&chunk_items, chunk_budget, counter);
    segments_dropped += dropped_chunks;
    if !kept_chunks.is_empty() {
        available -= header_tokens + used_chunks + separator_tokens;
        history_blocks.push(format!("{past_events_header}{}", kept_chunks.join(SECTION_SEPARATOR)));
    }

    // Active RawTurns: capped to the newest `recent_memory_limit`, then
    // drained newest-first from whatever chunks left behind.
    let turn_window_start = history.raw_turns.len().saturating_sub(settings.recent_memory_limit.max(0) as usize);
    segments_dropped += turn_window_start;
    let turn_items: Vec<(String, i64)> = history.raw_turns[turn_window_start..]
        .iter()
        .map(|t| (t.text.clone(), t.token_count.unwrap_or_else(|| counter.count(&t.text).count)))
        .collect();
    let recent_story_header = "# Recent Story:\n";
    let header_tokens = counter.count(recent_story_header).count;
    let turn_budget = (available - separator_tokens - header_tokens).max(0);
    let (kept_turns, _used_turns, dropped_turns) = pack_newest_first(&turn_items, turn_budget, counter);
    segments_dropped += dropped_turns;
    if !kept_turns.is_empty() {
        history_blocks.push(format!("{recent_story_header}{}", kept_turns.join(SECTION_SEPARATOR)));
    }

    let mut parts = vec![preamble];
    parts.extend(history_blocks);
    parts.push(action_block);
    let text = parts.join(SECTION_SEPARATOR);
    let total_tokens = counter.count(&text).count;

    Ok(AssembledPrompt { text, total_tokens, segments_dropped })
}

/// Selects the newest-fitting prefix (in original order) of `items` that
/// fits `available`, stopping at the first (oldest remaining) item that
/// doesn't fit rather than skipping past it. Items are never partially
/// included. Returns the kept texts in chronological order, the tokens they
/// consumed (content plus internal separators), and how many were dropped.
fn pack_newest_first(items: &[(String, i64)], available: i64, counter: &TokenCounter) -> (Vec<String>, i64, usize) {
    if items.is_empty() || available <= 0 {
        return (Vec::new(), 0, items.len());
    }
    let separator_tokens = counter.count(SECTION_SEPARATOR).count;
    let mut kept_rev: Vec<&(String, i64)> = Vec::new();
    let mut used = 0i64;
    for item in items.iter().rev() {
        let additional = item.1 + if kept_rev.is_empty() { 0 } else { separator_tokens };
        if used + additional <= available {
            used += additional;
            kept_rev.push(item);
        } else {
            break;
        }
    }
    let dropped = items.len() - kept_rev.len();
    kept_rev.reverse();
    (kept_rev.into_iter().map(|(text, _)| text.clone()).collect(), used, dropped)
}

// ── Lookup Assembler (C8) ────────────────────────────────────────────────

pub struct AssembledLookupPrompt {
    pub text: String,
    pub sources_included: usize,
    pub sources_removed: usize,
}

const NO_SOURCES_FALLBACK: &str =
    "Sources: none found for this query. Respond with: \"No factual information available for this query.\"";
const SOURCES_PREFIX: &str = "\n\nSOURCES:\n";
const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

/// Assembles the second (describer) prompt: a fixed header, a `SOURCES:`
/// block, and as many weight-ordered excerpts as fit in `safe_limit -
/// reserved_for_lookup - margin - header_tokens`, each labeled with its
/// source URL. `sources` must already be sorted by descending weight (the
/// Section Selector's job); this function only packs.
pub fn assemble_lookup_prompt(
    header: &str,
    sources: &[(RetrievedSource, String)],
    safe_limit: i64,
    reserved_for_lookup: i64,
    margin: i64,
    counter: &TokenCounter,
) -> AssembledLookupPrompt {
    let header_tokens = counter.count(header).count;
    let prefix_tokens = counter.count(SOURCES_PREFIX).count;
    let available = safe_limit - reserved_for_lookup - margin - header_tokens - prefix_tokens;

    if available <= 0 || sources.is_empty() {
        let text = format!("{header}{SECTION_SEPARATOR}{NO_SOURCES_FALLBACK}");
        return AssembledLookupPrompt { text, sources_included: 0, sources_removed: sources.len() };
    }

    let separator_tokens = counter.count(SOURCE_SEPARATOR).count;
    let mut used = 0i64;
    let mut included_texts: Vec<String> = Vec::new();
    let mut included = 0usize;
    let mut removed = 0usize;

    for (source, excerpt) in sources {
        let labeled = format!("{excerpt}\n\n(Source: {})", source.url);
        let cost = counter.count(&labeled).count + if included_texts.is_empty() { 0 } else { separator_tokens };
        if used + cost <= available {
            included_texts.push(labeled);
            used += cost;
            included += 1;
        } else {
            removed += 1;
        }
    }

    let text = if included_texts.is_empty() {
        format!("{header}{SECTION_SEPARATOR}{NO_SOURCES_FALLBACK}")
    } else {
        format!("{header}{SOURCES_PREFIX}{}", included_texts.join(SOURCE_SEPARATOR))
    };

    AssembledLookupPrompt { text, sources_included: included, sources_removed: removed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{DeepMemory, RawTurn, RawTurnState, SummaryChunk, SummaryChunkState};
    use std::collections::HashSet;

    fn settings() -> DirectiveSettings {
        DirectiveSettings {
            tier_id: 1,
            storyteller_prompt: "Tell a vivid story.".into(),
            game_directive: "Stay in character.".into(),
            summary_split_marker: "###".into(),
            story_splitter: "~~~STORY-SPLIT~~~".into(),
            stop_tokens: vec![],
            recent_memory_limit: 40,
            tokenize_threshold: 800,
            chunk_max_tokens: 200,
            max_active_chunks: 6,
            deep_memory_max_tokens: 300,
            model_max_tokens: 400,
            reserved_for_generation: 100,
            max_world_tokens: 1000,
        }
    }

    fn world() -> World {
        World { id: 1, name: "Eldwood".into(), preface: "A misty forest kingdom.".into(), lore_tokens: "A misty forest kingdom.".into(), token_count: 10 }
    }

    fn rating() -> GameRating {
        GameRating { id: 1, name: "Teen".into(), ai_prompt: "Keep content suitable for teens.".into() }
    }

    fn player() -> Player {
        Player { name: "Ada".into(), gender: "f".into() }
    }

    #[test]
    fn drops_oldest_segments_first_when_over_budget() {
        let counter = TokenCounter::heuristic();
        let mut history = HistoryView::default();
        for i in 1..=20 {
            history.raw_turns.push(RawTurn {
                id: i,
                saved_game_id: 1,
                entry_index: i,
                text: format!("Turn {i}: a long sentence about the adventure continuing onward."),
                token_count: None,
                state: RawTurnState::Active,
            });
        }
        let result = assemble_story_prompt(&settings(), &world(), &rating(), &history, ActionMode::None, &player(), "look around", &counter).unwrap();
        assert!(result.segments_dropped > 0);
        assert!(!result.text.contains("Turn 1:"));
        assert!(result.text.contains("Turn 20:"));
    }

    #[test]
    fn fixed_preamble_never_dropped_errors_when_too_large() {
        let mut s = settings();
        s.model_max_tokens = 5;
        s.reserved_for_generation = 0;
        let history = HistoryView::default();
        let err = assemble_story_prompt(&s, &world(), &rating(), &history, ActionMode::None, &player(), "x", &TokenCounter::heuristic()).unwrap_err();
        assert!(matches!(err, EngineError::PromptTooLarge { .. }));
    }

    #[test]
    fn deep_memory_always_included_when_present() {
        let counter = TokenCounter::heuristic();
        let mut history = HistoryView::default();
        history.deep_memory = Some(DeepMemory {
            saved_game_id: 1,
            summary_text: "Long ago, the kingdom fell.".into(),
            token_count: 20,
            chunks_merged_count: 3,
            last_merged_end_index: 10,
        });
        let result = assemble_story_prompt(&settings(), &world(), &rating(), &history, ActionMode::None, &player(), "look", &counter).unwrap();
        assert!(result.text.contains("the kingdom fell"));
        assert!(result.text.contains("# Ancient History:"));
    }

    #[test]
    fn chunk_refs_do_not_affect_packing_order() {
        let counter = TokenCounter::heuristic();
        let mut history = HistoryView::default();
        let mut refs = HashSet::new();
        refs.insert(1);
        history.chunks.push(SummaryChunk {
            id: 1,
            saved_game_id: 1,
            start_index: 1,
            end_index: 5,
            summary_text: "The party entered the tavern.".into(),
            token_count: 10,
            refs,
            state: SummaryChunkState::Active,
        });
        let result = assemble_story_prompt(&settings(), &world(), &rating(), &history, ActionMode::Action, &player(), "order a drink", &counter).unwrap();
        assert!(result.text.contains("entered the tavern"));
        assert!(result.text.contains("# Past Events:"));
    }

    #[test]
    fn player_line_and_universe_block_use_spec_headers() {
        let counter = TokenCounter::heuristic();
        let history = HistoryView::default();
        let result = assemble_story_prompt(&settings(), &world(), &rating(), &history, ActionMode::None, &player(), "look", &counter).unwrap();
        assert!(result.text.contains("# Player: Ada (Female)"));
        assert!(result.text.contains("# Universe: Eldwood"));
        assert!(result.text.contains("misty forest kingdom"));
    }

    #[test]
    fn action_modes_render_literal_headers() {
        assert_eq!(render_current_action(ActionMode::Action, "open the gate"), "# Player Action: open the gate");
        assert_eq!(render_current_action(ActionMode::Speech, "hello"), "# Player Says: \"hello\"");
        assert_eq!(render_current_action(ActionMode::Narrate, "the rain falls"), "# Player Narrative: the rain falls");
        assert_eq!(render_current_action(ActionMode::None, ""), "# No Player Action. Continue the story naturally.");
    }

    #[test]
    fn story_splitter_terminates_the_prompt() {
        let counter = TokenCounter::heuristic();
        let history = HistoryView::default();
        let result = assemble_story_prompt(&settings(), &world(), &rating(), &history, ActionMode::None, &player(), "look", &counter).unwrap();
        assert!(result.text.trim_end().ends_with(&settings().story_splitter));
    }

    #[test]
    fn lookup_prompt_falls_back_when_no_sources_fit() {
        let counter = TokenCounter::heuristic();
        let result = assemble_lookup_prompt("Describe: a dragon", &[], 100, 50, 10, &counter);
        assert_eq!(result.sources_included, 0);
        assert!(result.text.contains("No factual information"));
    }

    #[test]
    fn lookup_prompt_includes_sources_ordered_by_caller() {
        let counter = TokenCounter::heuristic();
        let sources = vec![
            (RetrievedSource { url: "a.example".into(), weight: 5, extraction: None }, "Dragons are ancient reptilian beings.".to_string()),
            (RetrievedSource { url: "b.example".into(), weight: 1, extraction: None }, "Some say dragons hoard gold.".to_string()),
        ];
        let result = assemble_lookup_prompt("Describe: a dragon", &sources, 400, 50, 10, &counter);
        assert_eq!(result.sources_included, 2);
        assert!(result.text.contains("ancient reptilian"));
    }

    #[test]
    fn lookup_prompt_labels_each_source_with_its_url() {
        let counter = TokenCounter::heuristic();
        let sources = vec![(RetrievedSource { url: "lore.example/dragons".into(), weight: 5, extraction: None }, "Dragons are ancient.".to_string())];
        let result = assemble_lookup_prompt("Describe: a dragon", &sources, 400, 50, 10, &counter);
        assert!(result.text.contains("SOURCES:"));
        assert!(result.text.contains("(Source: lore.example/dragons)"));
    }
}
