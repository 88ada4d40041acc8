// ── Persistence Layer (C10) ─────────────────────────────────────────────────
//
// Owns the on-disk SQLite store for SavedGame/RawTurn/SummaryChunk/
// DeepMemory/DirectiveSettings/World: a single `rusqlite::Connection` guarded
// by a `parking_lot::Mutex`, WAL journal mode, `CREATE TABLE IF NOT EXISTS`
// schema. The relational shape (table names, columns) mirrors the upstream
// SQLAlchemy models directly: `story_history` is RawTurn, `tokenized_history`
// is SummaryChunk.
//
// No component outside C2/C5/C9 touches the connection directly; everything
// goes through the narrow CRUD surface below.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{
    DeepMemory, DirectiveSettings, GameRating, HistoryView, Player, RawTurn, RawTurnId,
    RawTurnState, SavedGame, SavedGameId, SummaryChunk, SummaryChunkId, SummaryChunkState,
    TierId, UserId, World, WorldId,
};

/// Cloneable handle to the shared connection. Cheap to clone (just bumps the
/// `Arc` refcount); every clone serializes through the same mutex.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> EngineResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS game_ratings (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                ai_prompt   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS worlds (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                preface     TEXT NOT NULL,
                lore_tokens TEXT NOT NULL,
                token_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS account_levels (
                id                INTEGER PRIMARY KEY,
                name              TEXT NOT NULL UNIQUE,
                game_settings_id  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id                 INTEGER PRIMARY KEY,
                username           TEXT NOT NULL UNIQUE,
                account_level_id   INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS ai_directive_settings (
                id                      INTEGER PRIMARY KEY,
                storyteller_prompt      TEXT NOT NULL,
                game_directive          TEXT NOT NULL,
                summary_split_marker    TEXT NOT NULL,
                story_splitter          TEXT NOT NULL,
                stop_tokens             TEXT NOT NULL,
                recent_memory_limit     INTEGER NOT NULL,
                tokenize_threshold      INTEGER NOT NULL,
                chunk_max_tokens        INTEGER NOT NULL,
                max_active_chunks       INTEGER NOT NULL,
                deep_memory_max_tokens  INTEGER NOT NULL,
                model_max_tokens        INTEGER NOT NULL,
                reserved_for_generation INTEGER NOT NULL,
                max_world_tokens        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS saved_games (
                id              INTEGER PRIMARY KEY,
                user_id         INTEGER NOT NULL,
                world_id        INTEGER NOT NULL,
                rating_id       INTEGER NOT NULL,
                player_name     TEXT NOT NULL,
                player_gender   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS story_history (
                id             INTEGER PRIMARY KEY,
                saved_game_id  INTEGER NOT NULL REFERENCES saved_games(id) ON DELETE CASCADE,
                entry_index    INTEGER NOT NULL,
                text           TEXT NOT NULL,
                token_count    INTEGER,
                state          TEXT NOT NULL DEFAULT 'active'
            );

            CREATE TABLE IF NOT EXISTS tokenized_history (
                id                  INTEGER PRIMARY KEY,
                saved_game_id       INTEGER NOT NULL REFERENCES saved_games(id) ON DELETE CASCADE,
                start_index         INTEGER NOT NULL,
                end_index           INTEGER NOT NULL,
                summary             TEXT NOT NULL,
                token_count         INTEGER NOT NULL,
                state               TEXT NOT NULL DEFAULT 'active',
                history_references  TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS deep_memory (
                saved_game_id          INTEGER PRIMARY KEY REFERENCES saved_games(id) ON DELETE CASCADE,
                summary                TEXT NOT NULL,
                token_count            INTEGER NOT NULL,
                chunks_merged          INTEGER NOT NULL DEFAULT 0,
                last_merged_end_index  INTEGER
            );
            "#,
        )?;
        Ok(())
    }

    // ── DirectiveSettings ────────────────────────────────────────────────

    pub fn resolve_user_tier(&self, user_id: UserId) -> EngineResult<Option<TierId>> {
        let conn = self.conn.lock();
        let tier: Option<TierId> = conn
            .query_row(
                "SELECT al.game_settings_id FROM users u \
                 JOIN account_levels al ON al.id = u.account_level_id \
                 WHERE u.id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tier)
    }

    pub fn load_directive_settings(&self, tier_id: TierId) -> EngineResult<Option<DirectiveSettings>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, storyteller_prompt, game_directive, summary_split_marker, story_splitter, stop_tokens, \
                        recent_memory_limit, tokenize_threshold, chunk_max_tokens, max_active_chunks, \
                        deep_memory_max_tokens, model_max_tokens, reserved_for_generation, max_world_tokens \
                 FROM ai_directive_settings WHERE id = ?1",
                params![tier_id],
                |row| {
                    let stop_tokens_raw: String = row.get(5)?;
                    Ok(DirectiveSettings {
                        tier_id: row.get(0)?,
                        storyteller_prompt: row.get(1)?,
                        game_directive: row.get(2)?,
                        summary_split_marker: row.get(3)?,
                        story_splitter: row.get(4)?,
                        stop_tokens: stop_tokens_raw
                            .split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                        recent_memory_limit: row.get(6)?,
                        tokenize_threshold: row.get(7)?,
                        chunk_max_tokens: row.get(8)?,
                        max_active_chunks: row.get(9)?,
                        deep_memory_max_tokens: row.get(10)?,
                        model_max_tokens: row.get(11)?,
                        reserved_for_generation: row.get(12)?,
                        max_world_tokens: row.get(13)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert_directive_settings(&self, s: &DirectiveSettings) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ai_directive_settings \
                (id, storyteller_prompt, game_directive, summary_split_marker, story_splitter, stop_tokens, \
                 recent_memory_limit, tokenize_threshold, chunk_max_tokens, max_active_chunks, \
                 deep_memory_max_tokens, model_max_tokens, reserved_for_generation, max_world_tokens) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
             ON CONFLICT(id) DO UPDATE SET \
                storyteller_prompt = excluded.storyteller_prompt, \
                game_directive = excluded.game_directive, \
                summary_split_marker = excluded.summary_split_marker, \
                story_splitter = excluded.story_splitter, \
                stop_tokens = excluded.stop_tokens, \
                recent_memory_limit = excluded.recent_memory_limit, \
                tokenize_threshold = excluded.tokenize_threshold, \
                chunk_max_tokens = excluded.chunk_max_tokens, \
                max_active_chunks = excluded.max_active_chunks, \
                deep_memory_max_tokens = excluded.deep_memory_max_tokens, \
                model_max_tokens = excluded.model_max_tokens, \
                reserved_for_generation = excluded.reserved_for_generation, \
                max_world_tokens = excluded.max_world_tokens",
            params![
                s.tier_id,
                s.storyteller_prompt,
                s.game_directive,
                s.summary_split_marker,
                s.story_splitter,
                s.stop_tokens.join(","),
                s.recent_memory_limit,
                s.tokenize_threshold,
                s.chunk_max_tokens,
                s.max_active_chunks,
                s.deep_memory_max_tokens,
                s.model_max_tokens,
                s.reserved_for_generation,
                s.max_world_tokens,
            ],
        )?;
        Ok(())
    }

    // ── World ────────────────────────────────────────────────────────────

    pub fn load_world(&self, world_id: WorldId) -> EngineResult<World> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, preface, lore_tokens, token_count FROM worlds WHERE id = ?1",
            params![world_id],
            |row| {
                Ok(World {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    preface: row.get(2)?,
                    lore_tokens: row.get(3)?,
                    token_count: row.get(4)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("world {world_id}")))
    }

    /// Enforces `token_count <= MaxWorldTokens` at write time.
    pub fn upsert_world(&self, world: &World, max_world_tokens: i64) -> EngineResult<()> {
        if world.token_count > max_world_tokens {
            return Err(EngineError::BadRequest(format!(
                "world token_count {} exceeds max_world_tokens {}",
                world.token_count, max_world_tokens
            )));
        }
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO worlds (id, name, preface, lore_tokens, token_count) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, preface = excluded.preface, \
                lore_tokens = excluded.lore_tokens, token_count = excluded.token_count",
            params![world.id, world.name, world.preface, world.lore_tokens, world.token_count],
        )?;
        Ok(())
    }

    // ── SavedGame ────────────────────────────────────────────────────────

    pub fn load_saved_game(&self, saved_game_id: SavedGameId) -> EngineResult<SavedGame> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, world_id, rating_id, player_name, player_gender \
             FROM saved_games WHERE id = ?1",
            params![saved_game_id],
            |row| {
                Ok(SavedGame {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    world_id: row.get(2)?,
                    rating_id: row.get(3)?,
                    player: Player { name: row.get(4)?, gender: row.get(5)? },
                })
            },
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("saved_game {saved_game_id}")))
    }

    pub fn load_rating(&self, rating_id: i64) -> EngineResult<GameRating> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, ai_prompt FROM game_ratings WHERE id = ?1",
            params![rating_id],
            |row| Ok(GameRating { id: row.get(0)?, name: row.get(1)?, ai_prompt: row.get(2)? }),
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("game_rating {rating_id}")))
    }

    // ── History view ─────────────────────────────────────────────────────

    /// Loads Active RawTurns (capped at `recent_memory_limit`, newest-first
    /// in the query then reversed to ascending order), Active SummaryChunks
    /// ordered by `end_index`, and DeepMemory if present.
    pub fn load_history_view(&self, saved_game_id: SavedGameId, recent_memory_limit: i64) -> EngineResult<HistoryView> {
        let conn = self.conn.lock();

        let mut raw_turns: Vec<RawTurn> = {
            let mut stmt = conn.prepare(
                "SELECT id, saved_game_id, entry_index, text, token_count, state \
                 FROM story_history WHERE saved_game_id = ?1 AND state = 'active' \
                 ORDER BY entry_index DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![saved_game_id, recent_memory_limit], Self::map_raw_turn)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        raw_turns.reverse();

        let chunks: Vec<SummaryChunk> = {
            let mut stmt = conn.prepare(
                "SELECT id, saved_game_id, start_index, end_index, summary, token_count, state, history_references \
                 FROM tokenized_history WHERE saved_game_id = ?1 AND state = 'active' ORDER BY end_index ASC",
            )?;
            let rows = stmt.query_map(params![saved_game_id], Self::map_summary_chunk)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let deep_memory = conn
            .query_row(
                "SELECT saved_game_id, summary, token_count, chunks_merged, last_merged_end_index \
                 FROM deep_memory WHERE saved_game_id = ?1",
                params![saved_game_id],
                Self::map_deep_memory,
            )
            .optional()?;

        Ok(HistoryView { raw_turns, chunks, deep_memory })
    }

    fn map_raw_turn(row: &rusqlite::Row) -> rusqlite::Result<RawTurn> {
        let state: String = row.get(5)?;
        Ok(RawTurn {
            id: row.get(0)?,
            saved_game_id: row.get(1)?,
            entry_index: row.get(2)?,
            text: row.get(3)?,
            token_count: row.get(4)?,
            state: if state == "active" { RawTurnState::Active } else { RawTurnState::Archived },
        })
    }

    fn map_summary_chunk(row: &rusqlite::Row) -> rusqlite::Result<SummaryChunk> {
        let state: String = row.get(6)?;
        let refs_raw: String = row.get(7)?;
        Ok(SummaryChunk {
            id: row.get(0)?,
            saved_game_id: row.get(1)?,
            start_index: row.get(2)?,
            end_index: row.get(3)?,
            summary_text: row.get(4)?,
            token_count: row.get(5)?,
            state: if state == "active" { SummaryChunkState::Active } else { SummaryChunkState::Compacted },
            refs: refs_raw.split(',').filter_map(|s| s.parse().ok()).collect(),
        })
    }

    fn map_deep_memory(row: &rusqlite::Row) -> rusqlite::Result<DeepMemory> {
        Ok(DeepMemory {
            saved_game_id: row.get(0)?,
            summary_text: row.get(1)?,
            token_count: row.get(2)?,
            chunks_merged_count: row.get(3)?,
            last_merged_end_index: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        })
    }

    // ── RawTurn mutation ─────────────────────────────────────────────────

    /// Appends a new RawTurn with the next `entry_index` for this game.
    pub fn append_raw_turn(&self, saved_game_id: SavedGameId, text: &str, token_count: Option<i64>) -> EngineResult<RawTurn> {
        let conn = self.conn.lock();
        let next_index: i64 = conn.query_row(
            "SELECT COALESCE(MAX(entry_index), 0) + 1 FROM story_history WHERE saved_game_id = ?1",
            params![saved_game_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO story_history (saved_game_id, entry_index, text, token_count, state) \
             VALUES (?1, ?2, ?3, ?4, 'active')",
            params![saved_game_id, next_index, text, token_count],
        )?;
        let id = conn.last_insert_rowid();
        Ok(RawTurn { id, saved_game_id, entry_index: next_index, text: text.to_string(), token_count, state: RawTurnState::Active })
    }

    /// Active RawTurns newer than `after_end_index`, oldest-first — the
    /// Trigger A candidate window.
    pub fn active_raw_turns_after(&self, saved_game_id: SavedGameId, after_end_index: i64) -> EngineResult<Vec<RawTurn>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, saved_game_id, entry_index, text, token_count, state \
             FROM story_history WHERE saved_game_id = ?1 AND state = 'active' AND entry_index > ?2 \
             ORDER BY entry_index ASC",
        )?;
        let rows = stmt.query_map(params![saved_game_id, after_end_index], Self::map_raw_turn)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Edit a RawTurn's text; its cached `token_count` is invalidated (set
    /// to NULL) until the caller recomputes and stores a fresh value.
    pub fn edit_raw_turn_text(&self, raw_turn_id: RawTurnId, text: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE story_history SET text = ?1, token_count = NULL WHERE id = ?2",
            params![text, raw_turn_id],
        )?;
        if changed == 0 {
            return Err(EngineError::NotFound(format!("raw_turn {raw_turn_id}")));
        }
        Ok(())
    }

    pub fn set_raw_turn_token_count(&self, raw_turn_id: RawTurnId, token_count: i64) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE story_history SET token_count = ?1 WHERE id = ?2", params![token_count, raw_turn_id])?;
        Ok(())
    }

    /// Deletes a RawTurn, then scans Active SummaryChunks: removes the id
    /// from any chunk's `refs`; deletes any chunk whose `refs` becomes
    /// empty. DeepMemory is never revised. Runs inside one transaction so
    /// the deletion and the ref cleanup commit together.
    pub fn delete_raw_turn(&self, raw_turn_id: RawTurnId) -> EngineResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let saved_game_id: Option<SavedGameId> = tx
            .query_row("SELECT saved_game_id FROM story_history WHERE id = ?1", params![raw_turn_id], |r| r.get(0))
            .optional()?;
        let Some(saved_game_id) = saved_game_id else {
            return Err(EngineError::NotFound(format!("raw_turn {raw_turn_id}")));
        };

        tx.execute("DELETE FROM story_history WHERE id = ?1", params![raw_turn_id])?;

        let affected: Vec<(SummaryChunkId, String)> = {
            let mut stmt = tx.prepare(
                "SELECT id, history_references FROM tokenized_history \
                 WHERE saved_game_id = ?1 AND state = 'active'",
            )?;
            stmt.query_map(params![saved_game_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?
        };

        for (chunk_id, refs_raw) in affected {
            let mut refs: HashSet<RawTurnId> = refs_raw.split(',').filter_map(|s| s.parse().ok()).collect();
            if !refs.remove(&raw_turn_id) {
                continue;
            }
            if refs.is_empty() {
                tx.execute("DELETE FROM tokenized_history WHERE id = ?1", params![chunk_id])?;
            } else {
                let joined = refs.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
                tx.execute("UPDATE tokenized_history SET history_references = ?1 WHERE id = ?2", params![joined, chunk_id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    // ── SummaryChunk mutation (Trigger A) ────────────────────────────────

    pub fn newest_active_chunk(&self, saved_game_id: SavedGameId) -> EngineResult<Option<SummaryChunk>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, saved_game_id, start_index, end_index, summary, token_count, state, history_references \
                 FROM tokenized_history WHERE saved_game_id = ?1 AND state = 'active' \
                 ORDER BY end_index DESC LIMIT 1",
                params![saved_game_id],
                Self::map_summary_chunk,
            )
            .optional()?;
        Ok(row)
    }

    pub fn count_active_chunks(&self, saved_game_id: SavedGameId) -> EngineResult<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM tokenized_history WHERE saved_game_id = ?1 AND state = 'active'",
            params![saved_game_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn active_chunks_oldest_first(&self, saved_game_id: SavedGameId, limit: i64) -> EngineResult<Vec<SummaryChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, saved_game_id, start_index, end_index, summary, token_count, state, history_references \
             FROM tokenized_history WHERE saved_game_id = ?1 AND state = 'active' \
             ORDER BY end_index ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![saved_game_id, limit], Self::map_summary_chunk)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Commits the merge path atomically: extend the existing chunk's
    /// summary/end_index/refs/token_count, and archive every raw turn in
    /// `archived_ids`. Either both happen or neither does.
    pub fn commit_chunk_merge(
        &self,
        chunk_id: SummaryChunkId,
        new_end_index: i64,
        new_summary_text: &str,
        new_token_count: i64,
        new_refs: &HashSet<RawTurnId>,
        archived_ids: &[RawTurnId],
    ) -> EngineResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let joined_refs = new_refs.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        tx.execute(
            "UPDATE tokenized_history SET end_index = ?1, summary = ?2, token_count = ?3, history_references = ?4 WHERE id = ?5",
            params![new_end_index, new_summary_text, new_token_count, joined_refs, chunk_id],
        )?;
        for id in archived_ids {
            tx.execute("UPDATE story_history SET state = 'archived' WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Commits the new-chunk path atomically: insert a fresh Active chunk,
    /// and archive every raw turn in `archived_ids`.
    pub fn commit_new_chunk(
        &self,
        saved_game_id: SavedGameId,
        start_index: i64,
        end_index: i64,
        summary_text: &str,
        token_count: i64,
        refs: &HashSet<RawTurnId>,
        archived_ids: &[RawTurnId],
    ) -> EngineResult<SummaryChunkId> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let joined_refs = refs.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        tx.execute(
            "INSERT INTO tokenized_history (saved_game_id, start_index, end_index, summary, token_count, state, history_references) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6)",
            params![saved_game_id, start_index, end_index, summary_text, token_count, joined_refs],
        )?;
        let chunk_id = tx.last_insert_rowid();
        for id in archived_ids {
            tx.execute("UPDATE story_history SET state = 'archived' WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(chunk_id)
    }

    // ── DeepMemory mutation (Trigger B) ──────────────────────────────────

    pub fn load_deep_memory(&self, saved_game_id: SavedGameId) -> EngineResult<Option<DeepMemory>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT saved_game_id, summary, token_count, chunks_merged, last_merged_end_index \
                 FROM deep_memory WHERE saved_game_id = ?1",
                params![saved_game_id],
                Self::map_deep_memory,
            )
            .optional()?;
        Ok(row)
    }

    /// Seeds one minimal SavedGame (and its FK-required parents) for use by
    /// unit and integration tests. Not behind `#[cfg(test)]` since the
    /// `tests/integration.rs` binary links this crate as an ordinary
    /// dependency and would not see a `cfg(test)`-gated item.
    pub fn test_seed_saved_game(&self, saved_game_id: SavedGameId) {
        let conn = self.conn.lock();
        conn.execute("INSERT OR IGNORE INTO account_levels (id, name, game_settings_id) VALUES (1, 'Basic', 1)", []).unwrap();
        conn.execute("INSERT OR IGNORE INTO users (id, username, account_level_id) VALUES (?1, 'player', 1)", params![saved_game_id]).unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO worlds (id, name, preface, lore_tokens, token_count) VALUES (?1, 'Eldwood', 'pref', 'lore', 10)",
            params![saved_game_id],
        )
        .unwrap();
        conn.execute("INSERT OR IGNORE INTO game_ratings (id, name, ai_prompt) VALUES (1, 'Teen', 'Keep it PG-13.')", []).unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO saved_games (id, user_id, world_id, rating_id, player_name, player_gender) VALUES (?1, ?1, ?1, 1, 'Ada', 'f')",
            params![saved_game_id],
        )
        .unwrap();
    }

    /// Commits Trigger B atomically: upsert DeepMemory and mark the
    /// selected chunks Compacted.
    pub fn commit_deep_compaction(
        &self,
        saved_game_id: SavedGameId,
        new_summary_text: &str,
        new_token_count: i64,
        merged_delta: i64,
        last_merged_end_index: i64,
        compacted_chunk_ids: &[SummaryChunkId],
    ) -> EngineResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO deep_memory (saved_game_id, summary, token_count, chunks_merged, last_merged_end_index) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(saved_game_id) DO UPDATE SET \
                summary = excluded.summary, token_count = excluded.token_count, \
                chunks_merged = chunks_merged + ?4, \
                last_merged_end_index = excluded.last_merged_end_index",
            params![saved_game_id, new_summary_text, new_token_count, merged_delta, last_merged_end_index],
        )?;
        for id in compacted_chunk_ids {
            tx.execute("UPDATE tokenized_history SET state = 'compacted' WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_cleanly_and_roundtrips_a_raw_turn() {
        let db = Db::open_in_memory().unwrap();
        seed_saved_game(&db);
        let turn = db.append_raw_turn(1, "You step into the tavern.", Some(8)).unwrap();
        assert_eq!(turn.entry_index, 1);
        let view = db.load_history_view(1, 40).unwrap();
        assert_eq!(view.raw_turns.len(), 1);
    }

    #[test]
    fn delete_raw_turn_empties_refs_and_drops_chunk() {
        let db = Db::open_in_memory().unwrap();
        seed_saved_game(&db);
        let t1 = db.append_raw_turn(1, "a", Some(1)).unwrap();
        let mut refs = HashSet::new();
        refs.insert(t1.id);
        db.commit_new_chunk(1, 1, 1, "summary", 10, &refs, &[t1.id]).unwrap();
        assert_eq!(db.count_active_chunks(1).unwrap(), 1);

        db.delete_raw_turn(t1.id).unwrap();
        assert_eq!(db.count_active_chunks(1).unwrap(), 0);
    }

    #[test]
    fn resolve_user_tier_follows_account_level() {
        let db = Db::open_in_memory().unwrap();
        seed_saved_game(&db);
        assert_eq!(db.resolve_user_tier(1).unwrap(), Some(1));
        assert_eq!(db.resolve_user_tier(999).unwrap(), None);
    }

    fn seed_saved_game(db: &Db) {
        let conn = db.conn.lock();
        conn.execute("INSERT INTO account_levels (id, name, game_settings_id) VALUES (1, 'Basic', 1)", []).unwrap();
        conn.execute("INSERT INTO users (id, username, account_level_id) VALUES (1, 'player', 1)", []).unwrap();
        conn.execute(
            "INSERT INTO worlds (id, name, preface, lore_tokens, token_count) VALUES (1, 'Eldwood', 'pref', 'lore', 10)",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO game_ratings (id, name, ai_prompt) VALUES (1, 'Teen', 'Keep it PG-13.')", []).unwrap();
        conn.execute(
            "INSERT INTO saved_games (id, user_id, world_id, rating_id, player_name, player_gender) VALUES (1, 1, 1, 1, 'Ada', 'f')",
            [],
        )
        .unwrap();
    }
}
