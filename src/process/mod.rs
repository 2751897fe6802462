//! Process-related modules for enumeration and candidate selection.
//!
//! This module provides:
//! - `lister`: Process enumeration via `ps` and output parsing
//! - `catalog`: Safety filter chain producing the killable candidate set

pub mod catalog;
pub mod lister;

// Re-export commonly used types
pub use catalog::{
    resolve_uid, CatalogSettings, FilterReason, ProcessCatalog, Rejection, SelfIdentity,
    SHELL_NAMES,
};
pub use lister::{parse_ps_output, CatalogError, ProcessCandidate, ProcessLister, PsLister};
