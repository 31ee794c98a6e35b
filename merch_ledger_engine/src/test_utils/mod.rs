//! Helpers for tests: throw-away SQLite databases and in-memory collaborators.
pub mod mocks;
pub mod prepare_env;
