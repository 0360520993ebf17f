//! Read-only container access capability.
//!
//! The exporter never talks to a host application directly. It consumes a
//! [`ContainerAccessor`], which opens one container at a time and yields its
//! items as flat records in native traversal order. Hierarchy is implied by
//! each record's `level`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::LinkDirection;

/// Declared type of a host attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    Text,
    String,
    Integer,
    Real,
    Date,
    Boolean,
    /// Binary/embedded payloads and any kind the exporter does not know.
    Opaque(String),
}

impl AttributeKind {
    /// Parse a host kind name. Unknown names map to [`AttributeKind::Opaque`].
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "string" => Self::String,
            "integer" | "int" => Self::Integer,
            "real" | "float" => Self::Real,
            "date" => Self::Date,
            "boolean" | "bool" => Self::Boolean,
            _ => Self::Opaque(name.to_string()),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Opaque(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Opaque(name) => name,
        }
    }
}

/// Raw attribute value as the host reports it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    /// The host's explicit "no value" sentinel.
    NoValue,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
}

/// One `{name, kind, rawValue}` triple from a host item.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribute {
    pub name: String,
    pub kind: AttributeKind,
    pub value: RawValue,
}

/// The far end of a relationship. Either part may be unresolvable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEndpoint {
    #[serde(default, rename = "module")]
    pub container: Option<String>,
    #[serde(default, rename = "object")]
    pub item_id: Option<String>,
}

/// One relationship as the host enumerates it. A relationship may point at
/// several endpoints at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRelationship {
    pub link_type: String,
    pub direction: LinkDirection,
    pub endpoints: Vec<RawEndpoint>,
}

/// One item as yielded by [`ContainerAccessor::items`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    pub identifier: String,
    pub level: u32,
    pub attributes: Vec<RawAttribute>,
    pub relationships: Vec<RawRelationship>,
}

/// A read-only session over a set of containers.
///
/// Only one container is held open at a time. Callers must pair every
/// successful [`open`](Self::open) with a [`close`](Self::close).
pub trait ContainerAccessor {
    /// Host resource for one open container.
    type Handle;

    /// Open the container at `path` read-only.
    ///
    /// Fails with [`ModExportError::ContainerOpen`](crate::ModExportError::ContainerOpen)
    /// when the path cannot be resolved or is locked.
    fn open(&mut self, path: &str) -> Result<Self::Handle>;

    /// Display name of an open container.
    fn name(&self, handle: &Self::Handle) -> String;

    /// All items of an open container in native order.
    fn items(&self, handle: &Self::Handle) -> Result<Vec<FlatRecord>>;

    /// Release an open container.
    fn close(&mut self, handle: Self::Handle);
}

/// Last `/`-separated segment of a container path.
pub fn default_container_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}
