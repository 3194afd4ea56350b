//! Business logic services

pub mod access;
pub mod access_chain;
pub mod candidate_query;
pub mod event_meta;
pub mod trigger_processor;

pub use access::{CreateAccessRequest, RegistrationAccess};
pub use access_chain::{AccessDecision, CreateAccessCheck, CreationAccessChain};
pub use candidate_query::CandidateQueryBuilder;
pub use event_meta::EventMeta;
pub use trigger_processor::{BatchSummary, ProcessOutcome, ScheduledTriggerProcessor};
