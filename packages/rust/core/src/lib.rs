//! Core export orchestration for modexport.
//!
//! This crate ties together traversal, document assembly, serialization and
//! validation into the end-to-end `export_module` workflow.

pub mod assembler;
pub mod pipeline;
