//! Registrar - rule-driven registration access control
//!
//! Decides who may register for capacity-bounded events, which operations an
//! account may perform on existing registrations, which identities may be
//! offered as proxy registrants, and runs rule actions on triggers and
//! schedules.
//!
//! # Architecture
//!
//! - **Rules** (`registrar-rules`): conditions, actions, plugin registry and
//!   the rule evaluator
//! - **Services**: event meta, creation-access chain, candidate query
//!   builder, scheduled trigger processor and the access facade
//! - **Storage**: seams in [`db`] with Postgres and in-memory adapters

pub mod config;
pub mod constants;
pub mod db;
pub mod services;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use registrar_common::{AppError, AppResult};
pub use state::AppState;
