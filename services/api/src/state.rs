//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources every
//! handler needs. Configuration is consumed at startup while wiring the
//! orchestrator and is not carried here.

use interview_core::Orchestrator;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}
