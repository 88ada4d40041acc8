// ── Atoms: Constants ───────────────────────────────────────────────────────
// All named constants for the crate live here.

/// Small constant margin (in tokens) reserved to absorb tokenizer edge cases
/// when packing a prompt against `SafePromptLimit`.
pub const PACKING_MARGIN: i64 = 50;

/// Hard cap on generation retries for empty/blank model output within one
/// turn. Never applies to `ModelUnavailable`.
pub const MAX_BLANK_OUTPUT_RETRIES: u32 = 15;

/// Summarization is retried exactly once per trigger before the trigger is
/// abandoned for the current turn.
pub const MAX_SUMMARY_RETRIES: u32 = 1;

/// Chunk-merge vs new-chunk decision boundary (Trigger A).
pub const MERGE_UTILIZATION_THRESHOLD: f64 = 0.9;

/// Deep-compaction overshoot, to amortize the cost of the compaction call
/// across more than one excess chunk.
pub const DEEP_COMPACTION_OVERSHOOT: i64 = 2;

/// Tier id resolved when a user's account level points at a settings row
/// that does not exist.
pub const DEFAULT_TIER_ID: i64 = 1;
pub const DEFAULT_TIER_NAME: &str = "Basic";

/// Default top-K URLs requested from the search backend for a lookup.
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 10;

/// Default bounded concurrency for retrieval fetches.
pub const DEFAULT_RETRIEVAL_CONCURRENCY: usize = 6;

/// Default per-URL fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Reserved tokens for the lookup/describer generation call (distinct from
/// `ReservedForGeneration`, which governs the story-turn call).
pub const RESERVED_FOR_LOOKUP: i64 = 800;

/// Max sections returned by the Section Selector for one source.
pub const MAX_SECTIONS_PER_SOURCE: usize = 3;
