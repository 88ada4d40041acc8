// ── External-collaborator binding (§6) ───────────────────────────────────
//
// A thin `axum` adapter over the programmatic surface — the engine never
// depends on this module, only the reverse. `axum::Router` wired with a
// shared `State` extractor, one route per operation.

pub mod dto;
pub mod routes;

use axum::routing::post;
use axum::Router;

use crate::http::routes::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/turn/generate", post(routes::generate_turn))
        .route("/turn/summarize", post(routes::summarize))
        .route("/turn/deep_summarize", post(routes::deep_summarize))
        .route("/lore/retrieve", post(routes::retrieve_lore))
        .route("/tokens/count", post(routes::count_tokens))
        .route("/tokens/count_batch", post(routes::count_tokens_batch))
        .with_state(state)
}
