// ── Atoms Layer ──────────────────────────────────────────────────────────
// Pure constants, error types, and data model — zero side effects, no I/O.
// Dependency rule: atoms may only depend on std and external pure crates.
// Nothing here may import from engine/ or lib.rs.

pub mod constants;
pub mod error;
pub mod types;
