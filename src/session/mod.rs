// src/session/mod.rs
//! Session assembly and browsing

pub mod assembler;
pub mod library;
pub mod record;

pub use assembler::{IdMinter, SessionAssembler, SessionDraft};
pub use library::{ComparisonRow, ImportReport, SessionFilter, SessionLibrary};
pub use record::{IdConflict, Session, SessionMetadata};
