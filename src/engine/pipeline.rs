// ── Story Pipeline (C9) ──────────────────────────────────────────────────
//
// Orchestrates one turn end to end:
//
//   Idle → Assembling → Generating → Sanitizing → Compacting → Idle
//
// Assembling builds the prompt (C4); Generating calls the Model Adapter
// (C3) with a retry budget for blank output only; Sanitizing strips
// story-splitter/stop-token leakage (grounded on `ai/routers/root_router.py`'s
// post-generation cleanup: `text.split(StorySplitter)[-1]` then a
// stop-token-prefix strip — distinct from `SUMMARY_SPLIT_MARKER`, which only
// ever appears in the compaction flow); Compacting appends the RawTurn and
// hands off to the History Compactor (C5).
//
// The per-SavedGame lock (`GameLocks`) is acquired for the whole turn so
// mutations to one game are never interleaved with another turn on the
// same game; unrelated games proceed in parallel.

use crate::atoms::constants::MAX_BLANK_OUTPUT_RETRIES;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{ActionMode, DirectiveSettings, SavedGameId};
use crate::engine::compaction;
use crate::engine::context_builder;
use crate::engine::model_adapter::{GenerationRequest, ModelAdapter};
use crate::engine::state::EngineState;

pub struct TurnRequest {
    pub saved_game_id: SavedGameId,
    pub mode: ActionMode,
    pub player_input: String,
}

pub struct TurnResult {
    pub text: String,
    pub prompt_tokens: i64,
    pub output_tokens: i64,
}

/// Runs one full turn against `state`. Acquires the per-game lock for the
/// duration, so a second concurrent request against the same SavedGame
/// queues behind this one while requests against other games proceed
/// unblocked.
pub async fn run_story_turn(state: &EngineState, request: TurnRequest) -> EngineResult<TurnResult> {
    let lock = state.game_locks.get(request.saved_game_id);
    let _guard = lock.lock().await;

    let saved_game = state.db.load_saved_game(request.saved_game_id)?;
    let settings = state.settings.get(saved_game.user_id)?;
    let world = state.db.load_world(saved_game.world_id)?;
    let rating = state.db.load_rating(saved_game.rating_id)?;
    let history = state.db.load_history_view(saved_game.id, settings.recent_memory_limit)?;

    // Assembling
    let assembled = context_builder::assemble_story_prompt(
        &settings,
        &world,
        &rating,
        &history,
        request.mode,
        &saved_game.player,
        &request.player_input,
        &state.model.counter,
    )?;

    // Generating + Sanitizing, retried together on blank output.
    let sanitized = generate_and_sanitize(&state.model, &settings, &assembled.text).await?;
    let output_tokens = state.model.count_tokens(&sanitized).count;

    // Compacting
    state.db.append_raw_turn(saved_game.id, &sanitized, Some(output_tokens))?;
    compaction::run_compaction_cycle(&state.db, &state.model, &settings, saved_game.id).await;

    Ok(TurnResult { text: sanitized, prompt_tokens: assembled.total_tokens, output_tokens })
}

async fn generate_and_sanitize(model: &ModelAdapter, settings: &DirectiveSettings, prompt: &str) -> EngineResult<String> {
    for attempt in 0..MAX_BLANK_OUTPUT_RETRIES {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            stop_tokens: settings.stop_tokens.clone(),
            max_output_tokens: settings.reserved_for_generation,
        };
        let result = model.generate(request).await?;
        let sanitized = sanitize_output(&result.text, settings);
        if !sanitized.trim().is_empty() {
            return Ok(sanitized);
        }
        tracing::warn!(attempt, "blank output after sanitizing, retrying generation");
    }
    Err(EngineError::ModelUnavailable(format!("no non-blank output after {MAX_BLANK_OUTPUT_RETRIES} attempts")))
}

/// Keeps only the text after the last story-splitter occurrence (the model
/// sometimes echoes the prompt's own terminator before its continuation),
/// then strips a leading stop-token prefix if one survived generation.
fn sanitize_output(text: &str, settings: &DirectiveSettings) -> String {
    let after_marker = match text.rfind(settings.story_splitter.as_str()) {
        Some(pos) => &text[pos + settings.story_splitter.len()..],
        None => text,
    };
    let trimmed = after_marker.trim();

    for stop in &settings.stop_tokens {
        if let Some(rest) = trimmed.strip_prefix(stop.as_str()) {
            return rest.trim_start().to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DirectiveSettings {
        DirectiveSettings {
            tier_id: 1,
            storyteller_prompt: "Tell a story.".into(),
            game_directive: "Continue.".into(),
            summary_split_marker: "###SUMMARY-SPLIT###".into(),
            story_splitter: "<<<SPLIT>>>".into(),
            stop_tokens: vec!["NARRATOR:".into()],
            recent_memory_limit: 10,
            tokenize_threshold: 500,
            chunk_max_tokens: 200,
            max_active_chunks: 6,
            deep_memory_max_tokens: 300,
            model_max_tokens: 4096,
            reserved_for_generation: 200,
            max_world_tokens: 1000,
        }
    }

    #[test]
    fn sanitize_keeps_text_after_last_split_marker() {
        let raw = "preamble echo <<<SPLIT>>> The hero presses onward.";
        assert_eq!(sanitize_output(raw, &settings()), "The hero presses onward.");
    }

    #[test]
    fn sanitize_strips_leading_stop_token() {
        let raw = "NARRATOR: the room falls silent.";
        assert_eq!(sanitize_output(raw, &settings()), "the room falls silent.");
    }

    #[test]
    fn sanitize_is_noop_when_nothing_to_strip() {
        let raw = "The hero presses onward.";
        assert_eq!(sanitize_output(raw, &settings()), raw);
    }
}
