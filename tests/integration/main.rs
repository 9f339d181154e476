//! Integration tests
//!
//! Router tests need no database. Inventory tests run against the
//! PostgreSQL instance at `DATABASE_URL` and are ignored by default.
//! Run with: cargo test -- --ignored

mod api_tests;
mod common;
mod inventory_tests;
