// End-to-end exercise of the Story Pipeline (C9) against a temp-file
// SQLite database: seed a SavedGame, run two turns, and confirm the
// persisted history reflects both. Grounded on the teacher's single
// integration-test-binary convention (`autotests = false` + one
// `tests/integration.rs`, avoiding per-file OOM on constrained CI runners).

use narrative_engine_lib::atoms::types::{ActionMode, DirectiveSettings};
use narrative_engine_lib::engine::model_adapter::ModelAdapter;
use narrative_engine_lib::engine::pipeline::{run_story_turn, TurnRequest};
use narrative_engine_lib::engine::sessions::Db;
use narrative_engine_lib::engine::state::EngineState;
use narrative_engine_lib::engine::token_counter::TokenCounter;
use narrative_engine_lib::config::EngineConfig;

fn settings_fixture(tier_id: i64) -> DirectiveSettings {
    DirectiveSettings {
        tier_id,
        storyteller_prompt: "Tell a vivid story.".into(),
        game_directive: "Stay in character.".into(),
        summary_split_marker: "<<<SUMMARY-SPLIT>>>".into(),
        story_splitter: "<<<SPLIT>>>".into(),
        stop_tokens: vec![],
        recent_memory_limit: 20,
        tokenize_threshold: 400,
        chunk_max_tokens: 200,
        max_active_chunks: 4,
        deep_memory_max_tokens: 200,
        model_max_tokens: 2048,
        reserved_for_generation: 150,
        max_world_tokens: 500,
    }
}

fn seed(db: &Db) {
    db.upsert_directive_settings(&settings_fixture(1)).unwrap();
    db.test_seed_saved_game(1);
}

#[tokio::test]
async fn two_turns_persist_and_extend_history() {
    let db = Db::open_in_memory().unwrap();
    seed(&db);

    let model = ModelAdapter::placeholder(TokenCounter::heuristic(), std::time::Duration::from_secs(5));
    let config = EngineConfig::default();
    let state = EngineState::new(config, db.clone(), model);

    let first = run_story_turn(&state, TurnRequest { saved_game_id: 1, mode: ActionMode::Action, player_input: "search the room".into() })
        .await
        .unwrap();
    assert!(!first.text.trim().is_empty());

    let second = run_story_turn(&state, TurnRequest { saved_game_id: 1, mode: ActionMode::Speech, player_input: "hello?".into() })
        .await
        .unwrap();
    assert!(!second.text.trim().is_empty());

    let history = db.load_history_view(1, 20).unwrap();
    assert_eq!(history.raw_turns.len(), 2);
}
