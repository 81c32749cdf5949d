pub mod core;
pub mod ingest;
pub mod records;
pub mod statistics;
