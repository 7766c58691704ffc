//! Study Guide API Library Crate
//!
//! This library contains all the logic for the study-guide practice service,
//! including the application state, database access, rate limiting, API
//! handlers, and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod router;
pub mod state;
pub mod storage;
