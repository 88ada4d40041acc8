// ── HTTP wire shapes ──────────────────────────────────────────────────────
//
// Plain serde DTOs for the external-collaborator binding (§6). Kept
// separate from `atoms::types` so the persisted/domain shapes can evolve
// without breaking the wire contract — a dedicated request/response struct
// per endpoint rather than serializing domain types directly.

use serde::{Deserialize, Serialize};

use crate::atoms::types::ActionMode;

#[derive(Debug, Deserialize)]
pub struct GenerateTurnRequest {
    pub saved_game_id: i64,
    pub mode: ActionMode,
    pub player_input: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateTurnResponse {
    pub story: String,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub entries: Vec<String>,
    pub max_tokens: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeepSummarizeRequest {
    pub chunk: String,
    pub max_tokens: i64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct LoreRetrieveRequest {
    pub query: String,
    pub command_prompt: Option<String>,
    pub metadata: Option<String>,
    pub candidate_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LoreRetrieveResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CountTokensRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CountTokensResponse {
    pub token_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CountTokensBatchRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CountTokensBatchResponse {
    pub token_counts: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

