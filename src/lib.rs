// Narrative Engine — bounded-context memory management for an LLM-driven
// text adventure. See SPEC_FULL.md for the component table; `atoms`
// carries the pure data model and error types, `engine` the component
// implementations, `config` process-level configuration, `http` the
// external-collaborator binding.

pub mod atoms;
pub mod config;
pub mod engine;
pub mod http;
