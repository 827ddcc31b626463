//! valved library - exposes modules for testing.

pub mod config;
pub mod ingest;
pub mod report;
pub mod transport;
