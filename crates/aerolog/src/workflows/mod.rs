pub mod compliance;
pub mod ingestion;
pub mod maintenance;
