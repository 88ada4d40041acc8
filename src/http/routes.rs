// ── HTTP Handlers ─────────────────────────────────────────────────────────
//
// Thin adapters over the programmatic surface (§6): each handler decodes a
// DTO, calls into engine/, and encodes the result. No business logic lives
// here.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::atoms::error::EngineError;
use crate::engine::model_adapter::GenerationRequest;
use crate::engine::pipeline::{self, TurnRequest};
use crate::engine::retrieval;
use crate::engine::state::EngineState;
use crate::http::dto::*;

pub type SharedState = Arc<EngineState>;

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::PromptTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EngineError::ModelUnavailable(_) | EngineError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::ModelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::BadRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::Database(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self, "request failed");
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

pub async fn generate_turn(
    State(state): State<SharedState>,
    Json(request): Json<GenerateTurnRequest>,
) -> Result<Json<GenerateTurnResponse>, EngineError> {
    let result = pipeline::run_story_turn(
        &state,
        TurnRequest { saved_game_id: request.saved_game_id, mode: request.mode, player_input: request.player_input },
    )
    .await?;
    Ok(Json(GenerateTurnResponse { story: result.text }))
}

pub async fn summarize(State(state): State<SharedState>, Json(request): Json<SummarizeRequest>) -> Result<Json<SummaryResponse>, EngineError> {
    let transcript = request.entries.join("\n");
    let result = state
        .model
        .generate(GenerationRequest { prompt: transcript, stop_tokens: vec![], max_output_tokens: request.max_tokens })
        .await?;
    Ok(Json(SummaryResponse { summary: result.text }))
}

pub async fn deep_summarize(State(state): State<SharedState>, Json(request): Json<DeepSummarizeRequest>) -> Result<Json<SummaryResponse>, EngineError> {
    let result = state
        .model
        .generate(GenerationRequest { prompt: request.chunk, stop_tokens: vec![], max_output_tokens: request.max_tokens })
        .await?;
    Ok(Json(SummaryResponse { summary: result.text }))
}

const LORE_PROMPT_INSTRUCTION: &str = "You are a concise describer.\nUse the sourced information to answer the query.\nParaphrase sources instead of quoting them.";

pub async fn retrieve_lore(State(state): State<SharedState>, Json(request): Json<LoreRetrieveRequest>) -> Result<Json<LoreRetrieveResponse>, EngineError> {
    let settings = state.settings.get_for_tier(crate::atoms::constants::DEFAULT_TIER_ID)?;

    let excerpts = retrieval::gather_excerpts(
        &state.http_client,
        state.retrieval_semaphore.clone(),
        Duration::from_secs(state.config.fetch_timeout_secs),
        &request.query,
        &request.candidate_urls,
    )
    .await;

    let query_line = request.command_prompt.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or(&request.query);
    let header = format!(
        "# Describer Prompt:\n{LORE_PROMPT_INSTRUCTION}\n\n# Metadata:\n{}\n\nUser Query: {query_line}",
        request.metadata.as_deref().unwrap_or("")
    );

    let sources: Vec<_> = excerpts.into_iter().map(|e| (e.source, e.excerpt)).collect();
    let assembled = crate::engine::context_builder::assemble_lookup_prompt(
        &header,
        &sources,
        settings.safe_prompt_limit(),
        crate::atoms::constants::RESERVED_FOR_LOOKUP,
        crate::atoms::constants::PACKING_MARGIN,
        &state.model.counter,
    );

    let result = state
        .model
        .generate(GenerationRequest { prompt: assembled.text, stop_tokens: settings.stop_tokens, max_output_tokens: crate::atoms::constants::RESERVED_FOR_LOOKUP })
        .await?;

    Ok(Json(LoreRetrieveResponse { text: result.text }))
}

pub async fn count_tokens(State(state): State<SharedState>, Json(request): Json<CountTokensRequest>) -> Json<CountTokensResponse> {
    Json(CountTokensResponse { token_count: state.model.count_tokens(&request.text).count })
}

pub async fn count_tokens_batch(State(state): State<SharedState>, Json(request): Json<CountTokensBatchRequest>) -> Json<CountTokensBatchResponse> {
    let token_counts = request.texts.iter().map(|t| state.model.count_tokens(t).count).collect();
    Json(CountTokensBatchResponse { token_counts })
}
