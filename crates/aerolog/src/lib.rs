//! Scan ingestion and maintenance-limit reference status for aircraft records.
//!
//! Status values produced here are advisory signals for human review and never a
//! legal airworthiness determination.

pub mod clock;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
