//! Shared helpers for database-backed tests.

pub mod postgres;
pub mod runtime;
