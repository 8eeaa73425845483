// src/acquisition/mod.rs
//! Sample acquisition and buffering

pub mod ingest_buffer;

pub use ingest_buffer::IngestBuffer;
