//! testboard: project and test-case tracking backend
//!
//! REST API (Axum) over SQLite (sqlx) with bearer-token sessions (JWT), plus
//! the report queries behind the dashboard and a typed client for the API.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
// Aggregates over the tests table: stats, monthly buckets, per-project rates
pub mod report;
// REST API module: router, auth guard and handlers
pub mod rest;
pub mod storage;
// Client data layer shared by the CLI
pub mod client;
