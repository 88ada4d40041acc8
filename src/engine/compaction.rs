// ── History Compactor (C5) ───────────────────────────────────────────────
//
// Runs the two compaction triggers after a turn is appended:
//
//   Trigger A — once the RawTurns that have fallen outside the recent
//   window accumulate past `tokenize_threshold` tokens, summarize them.
//   If the newest Active SummaryChunk isn't yet near `chunk_max_tokens`
//   (utilization below `MERGE_UTILIZATION_THRESHOLD`), the new summary is
//   merged into it; otherwise a fresh chunk is started.
//
//   Trigger B — once the Active SummaryChunk count exceeds
//   `max_active_chunks`, the oldest chunks are folded into DeepMemory.
//   `DEEP_COMPACTION_OVERSHOOT` chunks are pulled in beyond the strict
//   minimum so the trigger doesn't fire again on the very next turn.
//
// Each trigger follows the same shape: build a summary prompt, call the
// model, commit the result, retrying summarization once before the trigger
// is abandoned for the turn (`MAX_SUMMARY_RETRIES`). Every multi-row change
// goes through `Db`'s transactional commit methods so a failed step can
// never leave archived turns without a chunk to show for them.

use std::collections::HashSet;

use crate::atoms::constants::{DEEP_COMPACTION_OVERSHOOT, MAX_SUMMARY_RETRIES, MERGE_UTILIZATION_THRESHOLD};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{DirectiveSettings, RawTurn, RawTurnId, SavedGameId, SummaryChunkId};
use crate::engine::model_adapter::{GenerationRequest, ModelAdapter};
use crate::engine::sessions::Db;

#[derive(Debug, Clone)]
pub struct TriggerAOutcome {
    pub chunk_id: SummaryChunkId,
    pub merged_into_existing: bool,
    pub raw_turns_archived: usize,
}

#[derive(Debug, Clone)]
pub struct TriggerBOutcome {
    pub chunks_compacted: usize,
    pub deep_memory_tokens: i64,
}

/// Runs Trigger A, then Trigger B, against the state as it stands after a
/// turn was appended. Either stage may be a no-op; failures in either are
/// logged and swallowed — compaction is best-effort and must never fail
/// the turn that triggered it.
pub async fn run_compaction_cycle(db: &Db, model: &ModelAdapter, settings: &DirectiveSettings, saved_game_id: SavedGameId) {
    match maybe_run_trigger_a(db, model, settings, saved_game_id).await {
        Ok(Some(outcome)) => tracing::info!(saved_game_id, chunk_id = outcome.chunk_id, merged = outcome.merged_into_existing, "trigger A compacted raw turns"),
        Ok(None) => {}
        Err(e) => tracing::warn!(saved_game_id, error = %e, "trigger A abandoned"),
    }

    match maybe_run_trigger_b(db, model, settings, saved_game_id).await {
        Ok(Some(outcome)) => tracing::info!(saved_game_id, chunks = outcome.chunks_compacted, "trigger B folded chunks into deep memory"),
        Ok(None) => {}
        Err(e) => tracing::warn!(saved_game_id, error = %e, "trigger B abandoned"),
    }
}

pub async fn maybe_run_trigger_a(
    db: &Db,
    model: &ModelAdapter,
    settings: &DirectiveSettings,
    saved_game_id: SavedGameId,
) -> EngineResult<Option<TriggerAOutcome>> {
    let newest_chunk = db.newest_active_chunk(saved_game_id)?;
    let after_index = newest_chunk.as_ref().map(|c| c.end_index).unwrap_or(0);
    let candidates = db.active_raw_turns_after(saved_game_id, after_index)?;

    let recent_window = settings.recent_memory_limit.max(0) as usize;
    if candidates.len() <= recent_window {
        return Ok(None);
    }
    let to_summarize = &candidates[..candidates.len() - recent_window];

    let pending_tokens: i64 = to_summarize.iter().map(|t| t.token_count.unwrap_or(0)).sum();
    if pending_tokens < settings.tokenize_threshold {
        return Ok(None);
    }

    let summary_text = summarize_with_retry(model, settings, to_summarize, settings.chunk_max_tokens).await?;
    let summary_tokens = model.count_tokens(&summary_text).count;

    let refs: HashSet<RawTurnId> = to_summarize.iter().map(|t| t.id).collect();
    let archived_ids: Vec<RawTurnId> = to_summarize.iter().map(|t| t.id).collect();
    let start_index = to_summarize.first().expect("non-empty, checked above").entry_index;
    let end_index = to_summarize.last().expect("non-empty, checked above").entry_index;

    if let Some(chunk) = &newest_chunk {
        let utilization = chunk.token_count as f64 / settings.chunk_max_tokens as f64;
        let merged_tokens = chunk.token_count + summary_tokens;
        if utilization < MERGE_UTILIZATION_THRESHOLD && merged_tokens <= settings.chunk_max_tokens {
            let merged_summary = format!("{}\n{}", chunk.summary_text, summary_text);
            let mut merged_refs = chunk.refs.clone();
            merged_refs.extend(refs);
            db.commit_chunk_merge(chunk.id, end_index, &merged_summary, merged_tokens, &merged_refs, &archived_ids)?;
            return Ok(Some(TriggerAOutcome { chunk_id: chunk.id, merged_into_existing: true, raw_turns_archived: archived_ids.len() }));
        }
    }

    let chunk_id = db.commit_new_chunk(saved_game_id, start_index, end_index, &summary_text, summary_tokens, &refs, &archived_ids)?;
    Ok(Some(TriggerAOutcome { chunk_id, merged_into_existing: false, raw_turns_archived: archived_ids.len() }))
}

pub async fn maybe_run_trigger_b(
    db: &Db,
    model: &ModelAdapter,
    settings: &DirectiveSettings,
    saved_game_id: SavedGameId,
) -> EngineResult<Option<TriggerBOutcome>> {
    let active_count = db.count_active_chunks(saved_game_id)?;
    if active_count <= settings.max_active_chunks {
        return Ok(None);
    }

    let target = (settings.max_active_chunks - DEEP_COMPACTION_OVERSHOOT).max(0);
    let excess = active_count - target;
    let candidates = db.active_chunks_oldest_first(saved_game_id, excess)?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let existing_deep = db.load_deep_memory(saved_game_id)?;
    let mut transcript = String::new();
    if let Some(ref deep) = existing_deep {
        transcript.push_str(&deep.summary_text);
        transcript.push('\n');
    }
    for chunk in &candidates {
        transcript.push_str(&chunk.summary_text);
        transcript.push('\n');
    }

    let prompt = format!(
        "Compact the following narrative summary into a single, denser summary that preserves only lasting facts:\n{transcript}"
    );
    let summary_text = generate_summary_with_retry(model, settings, &prompt, settings.deep_memory_max_tokens).await?;
    let summary_tokens = model.count_tokens(&summary_text).count;

    let last_merged_end_index = candidates.last().expect("non-empty, checked above").end_index;
    let chunk_ids: Vec<SummaryChunkId> = candidates.iter().map(|c| c.id).collect();

    db.commit_deep_compaction(saved_game_id, &summary_text, summary_tokens, candidates.len() as i64, last_merged_end_index, &chunk_ids)?;
    Ok(Some(TriggerBOutcome { chunks_compacted: candidates.len(), deep_memory_tokens: summary_tokens }))
}

async fn summarize_with_retry(model: &ModelAdapter, settings: &DirectiveSettings, turns: &[RawTurn], max_output_tokens: i64) -> EngineResult<String> {
    let transcript = turns.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join("\n");
    let prompt = format!(
        "Summarize the following story turns into a concise paragraph, preserving facts a storyteller would need to continue:\n{}\n{}\n{}",
        settings.summary_split_marker, transcript, settings.summary_split_marker
    );
    generate_summary_with_retry(model, settings, &prompt, max_output_tokens).await
}

async fn generate_summary_with_retry(model: &ModelAdapter, settings: &DirectiveSettings, prompt: &str, max_output_tokens: i64) -> EngineResult<String> {
    let mut last_err = None;
    for attempt in 0..=MAX_SUMMARY_RETRIES {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            stop_tokens: settings.stop_tokens.clone(),
            max_output_tokens,
        };
        match model.generate(request).await {
            Ok(result) if !result.text.trim().is_empty() => return Ok(result.text),
            Ok(_) => last_err = Some(EngineError::SummaryFailed("model returned empty output".into())),
            Err(e) => last_err = Some(EngineError::SummaryFailed(e.to_string())),
        }
        if attempt < MAX_SUMMARY_RETRIES {
            tracing::warn!(attempt, "summarization attempt failed, retrying once");
        }
    }
    Err(last_err.unwrap_or_else(|| EngineError::SummaryFailed("unknown failure".into())))
}
