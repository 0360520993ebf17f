//! Per-container item extraction.
//!
//! This crate provides the pure, read-only transforms applied to one
//! container's flat records:
//! - [`AttributeExtractor`]: non-empty scalar attributes of an item
//! - [`extract_links`]: outgoing then incoming links of an item
//! - [`HierarchyWalker`]: nested item tree from level annotations

pub mod attributes;
pub mod hierarchy;
pub mod links;

pub use attributes::AttributeExtractor;
pub use hierarchy::{HierarchyWalker, WalkResult, flatten};
pub use links::{LinkExtraction, extract_links};
