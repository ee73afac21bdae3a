//! Interest cohort assignment

pub mod engine;
pub mod scoring;

pub use engine::{CohortEngine, MaintenanceOutcome, UserCohortState};
