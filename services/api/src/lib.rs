//! Interview API Library Crate
//!
//! Application state, Postgres persistence, REST handlers and routing for the
//! interview service. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
