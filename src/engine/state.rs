// ── Engine State ─────────────────────────────────────────────────────────
//
// Shared state handed to every HTTP handler: the persistence layer, the
// settings cache, the model adapter, and the concurrency primitives from
// §5 (Concurrency & Resource Model).
//
// A top-level struct bundling the store, a semaphore limiting concurrent
// heavy work, and per-key registries guarded by `parking_lot::Mutex`. The
// per-SavedGame lock registry below is the familiar "one map of
// Arc<Mutex<..>> keyed by id, created lazily" shape, here serializing whole
// turns instead of queuing individual messages.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::atoms::types::SavedGameId;
use crate::config::EngineConfig;
use crate::engine::model_adapter::ModelAdapter;
use crate::engine::sessions::Db;
use crate::engine::settings::SettingsProvider;

/// Per-SavedGame lock registry. Every operation that reads-then-writes a
/// game's history (turn generation, summarization, deep compaction) holds
/// this lock for the duration, so concurrent requests against the same
/// SavedGame serialize while requests against different SavedGames proceed
/// in parallel.
#[derive(Clone, Default)]
pub struct GameLocks {
    locks: Arc<Mutex<HashMap<SavedGameId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl GameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `saved_game_id`, creating it on first use.
    pub fn get(&self, saved_game_id: SavedGameId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(saved_game_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

pub struct EngineState {
    pub db: Db,
    pub settings: SettingsProvider,
    pub model: Arc<ModelAdapter>,
    pub config: EngineConfig,
    pub game_locks: GameLocks,
    /// Bounds the number of concurrent generation calls offloaded to the
    /// model adapter, independent of the number of in-flight HTTP requests.
    pub generation_semaphore: Arc<Semaphore>,
    /// Bounds the number of concurrent outbound lookup fetches (C6).
    pub retrieval_semaphore: Arc<Semaphore>,
    pub http_client: reqwest::Client,
}

impl EngineState {
    pub fn new(config: EngineConfig, db: Db, model: ModelAdapter) -> Self {
        let generation_concurrency = config.generation_concurrency;
        let retrieval_concurrency = config.retrieval_concurrency;
        Self {
            settings: SettingsProvider::new(db.clone()),
            db,
            model: Arc::new(model),
            game_locks: GameLocks::new(),
            generation_semaphore: Arc::new(Semaphore::new(generation_concurrency)),
            retrieval_semaphore: Arc::new(Semaphore::new(retrieval_concurrency)),
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
                .build()
                .expect("static reqwest client config is always valid"),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_locks_returns_same_lock_for_same_id() {
        let locks = GameLocks::new();
        let a = locks.get(1);
        let b = locks.get(1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn game_locks_returns_distinct_locks_for_distinct_ids() {
        let locks = GameLocks::new();
        let a = locks.get(1);
        let b = locks.get(2);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
