// Narrative Engine — bounded-context memory management for an LLM-driven
// text adventure. Each module below corresponds to one component of the
// Memory & Prompt Pipeline; see SPEC_FULL.md for the component table.

pub mod token_counter;
pub mod settings;
pub mod model_adapter;
pub mod context_builder;
pub mod compaction;
pub mod retrieval;
pub mod pipeline;
pub mod state;
pub mod sessions;
