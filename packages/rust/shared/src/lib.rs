//! Shared types, error model, and configuration for the module exporter.
//!
//! This crate is the foundation depended on by all other modexport crates.
//! It provides:
//! - [`ModExportError`]: the unified error type
//! - The export document model ([`ExportDocument`], [`Container`], [`Item`], [`Link`])
//! - The [`ContainerAccessor`] capability and the flat records it yields
//! - Configuration ([`AppConfig`], [`TraversalConfig`], config loading)

pub mod accessor;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use accessor::{
    AttributeKind, ContainerAccessor, FlatRecord, RawAttribute, RawEndpoint, RawRelationship,
    RawValue, default_container_name,
};
pub use config::{
    AppConfig, DefaultsConfig, StoreConfig, TraversalConfig, TraversalPoliciesConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ModExportError, OpenFailure, Result};
pub use types::{
    AttrValue, Attributes, Container, ExportDocument, Item, Link, LinkDirection,
    RESERVED_ITEM_KEYS,
};
