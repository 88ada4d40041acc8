// ── Atoms: Pure Data Types ─────────────────────────────────────────────────
// Plain struct/enum definitions with no logic — the narrative engine's data
// model (SavedGame / RawTurn / SummaryChunk / DeepMemory / DirectiveSettings
// / World) plus the wire shapes used at the HTTP boundary.
//
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifiers ────────────────────────────────────────────────────────────

pub type UserId = i64;
pub type SavedGameId = i64;
pub type RawTurnId = i64;
pub type SummaryChunkId = i64;
pub type WorldId = i64;
pub type TierId = i64;

// ── RawTurn ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RawTurnState {
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTurn {
    pub id: RawTurnId,
    pub saved_game_id: SavedGameId,
    /// Strictly monotonically increasing per SavedGame.
    pub entry_index: i64,
    pub text: String,
    /// Lazily populated; never recomputed unless `text` is edited.
    pub token_count: Option<i64>,
    pub state: RawTurnState,
}

// ── SummaryChunk ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryChunkState {
    Active,
    Compacted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryChunk {
    pub id: SummaryChunkId,
    pub saved_game_id: SavedGameId,
    pub start_index: i64,
    pub end_index: i64,
    pub summary_text: String,
    pub token_count: i64,
    pub refs: HashSet<RawTurnId>,
    pub state: SummaryChunkState,
}

// ── DeepMemory ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepMemory {
    pub saved_game_id: SavedGameId,
    pub summary_text: String,
    pub token_count: i64,
    pub chunks_merged_count: i64,
    /// Monotonically non-decreasing.
    pub last_merged_end_index: i64,
}

// ── DirectiveSettings ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveSettings {
    pub tier_id: TierId,
    pub storyteller_prompt: String,
    pub game_directive: String,
    pub summary_split_marker: String,
    /// Terminator appended after the current-action block (segment 9) and
    /// stripped from the tail of the model's raw story output during
    /// sanitizing.
    pub story_splitter: String,
    pub stop_tokens: Vec<String>,
    pub recent_memory_limit: i64,
    pub tokenize_threshold: i64,
    pub chunk_max_tokens: i64,
    pub max_active_chunks: i64,
    pub deep_memory_max_tokens: i64,
    pub model_max_tokens: i64,
    pub reserved_for_generation: i64,
    pub max_world_tokens: i64,
}

impl DirectiveSettings {
    /// `SafePromptLimit` is always computed, never stored.
    pub fn safe_prompt_limit(&self) -> i64 {
        self.model_max_tokens - self.reserved_for_generation
    }
}

// ── World ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub preface: String,
    pub lore_tokens: String,
    pub token_count: i64,
}

// ── Player / Rating / ActionMode ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub gender: String,
}

impl Player {
    /// `"m"` maps to `"Male"`; anything else maps to `"Female"`, matching the
    /// account-tier gender resolution the settings row already encodes.
    pub fn gender_label(&self) -> &'static str {
        if self.gender.eq_ignore_ascii_case("m") {
            "Male"
        } else {
            "Female"
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRating {
    pub id: i64,
    pub name: String,
    pub ai_prompt: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionMode {
    Action,
    Speech,
    Narrate,
    None,
}

// ── SavedGame ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGame {
    pub id: SavedGameId,
    pub user_id: UserId,
    pub world_id: WorldId,
    pub rating_id: i64,
    pub player: Player,
}

/// The compacted view of a SavedGame's history handed to the Assembler: all
/// Active RawTurns and Active SummaryChunks, plus DeepMemory if present.
#[derive(Debug, Clone, Default)]
pub struct HistoryView {
    pub raw_turns: Vec<RawTurn>,
    pub chunks: Vec<SummaryChunk>,
    pub deep_memory: Option<DeepMemory>,
}

// ── Token counting ──────────────────────────────────────────────────────────

/// Whether a token count came from the real tokenizer or a fallback
/// character-ratio estimate. Callers that need exact accounting (e.g. the
/// persistence layer's cached `token_count` column) must check this.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenCountSource {
    Exact,
    Estimated,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenCount {
    pub count: i64,
    pub source: TokenCountSource,
}

// ── Retrieval ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub html: Option<String>,
    pub text: Option<String>,
    pub sections: std::collections::BTreeMap<String, String>,
    pub infobox: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RetrievedSource {
    pub url: String,
    pub weight: u8,
    pub extraction: Option<Extraction>,
}
