pub mod canonical;
pub mod ingest;
pub mod timestamp;
