//! Interview Core
//!
//! Domain logic for structured mock interviews: the fixed topic catalog, the
//! transcript handed to the interviewer model, the transition rules, and the
//! orchestrator that ties them to persistence.

pub mod catalog;
pub mod error;
pub mod evaluator;
pub mod interview;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod transcript;
pub mod turn_generator;

pub use error::{InterviewError, RepositoryError, TurnGeneratorError};
pub use orchestrator::{Orchestrator, OrchestratorDeps};
