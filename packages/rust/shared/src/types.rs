//! Export document model.
//!
//! These types are built once during a traversal and never mutated after
//! being appended to their parent. Serialization is hand-written for
//! [`Item`] and [`Link`] because their JSON key sets depend on the data
//! (attribute names, link direction) and their key order is part of the
//! output contract.

use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Item keys owned by the exporter. Host attributes with these names are
/// dropped so an item object never carries duplicate keys.
pub const RESERVED_ITEM_KEYS: [&str; 4] = ["id", "level", "links", "children"];

// ---------------------------------------------------------------------------
// AttrValue / Attributes
// ---------------------------------------------------------------------------

/// A non-empty scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Real(x) => serializer.serialize_f64(*x),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
        }
    }
}

/// Attribute name/value pairs in host enumeration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute. Later duplicates of a name are ignored.
    pub fn push(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        if self.get(&name).is_none() {
            self.0.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// Direction of a relationship as seen from the item that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outgoing,
    Incoming,
}

impl LinkDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
        }
    }
}

/// One relationship instance, recorded by reference to its peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub link_type: String,
    pub direction: LinkDirection,
    /// Path of the container owning the other endpoint.
    pub peer_container: String,
    /// Identifier of the other endpoint within `peer_container`.
    pub peer_item_id: String,
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (module_key, object_key) = match self.direction {
            LinkDirection::Outgoing => ("targetModule", "targetObjectId"),
            LinkDirection::Incoming => ("sourceModule", "sourceObjectId"),
        };
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("type", &self.link_type)?;
        map.serialize_entry("direction", self.direction.as_str())?;
        map.serialize_entry(module_key, &self.peer_container)?;
        map.serialize_entry(object_key, &self.peer_item_id)?;
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One node of a container's hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub level: u32,
    pub attributes: Attributes,
    pub links: Vec<Link>,
    pub children: Vec<Item>,
}

impl Item {
    /// Visit this item and all descendants in depth-first pre-order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Item)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4 + self.attributes.len()))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("level", &self.level)?;
        for (name, value) in self.attributes.iter() {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("links", &self.links)?;
        map.serialize_entry("children", &self.children)?;
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Container / ExportDocument
// ---------------------------------------------------------------------------

/// One exported container (module).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    #[serde(rename = "modulePath")]
    pub path: String,
    #[serde(rename = "moduleName")]
    pub name: String,
    pub depth: u32,
    #[serde(rename = "objects")]
    pub items: Vec<Item>,
}

impl Container {
    /// Total number of items at every level.
    pub fn item_count(&self) -> usize {
        let mut count = 0;
        for item in &self.items {
            item.visit(&mut |_| count += 1);
        }
        count
    }

    /// Total number of links carried by all items.
    pub fn link_count(&self) -> usize {
        let mut count = 0;
        for item in &self.items {
            item.visit(&mut |i| count += i.links.len());
        }
        count
    }
}

/// Root of the serialized export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportDocument {
    #[serde(rename = "exportDate")]
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "rootModule")]
    pub root_container: String,
    #[serde(rename = "maxDepth")]
    pub max_depth: u32,
    /// Root first, then discovered containers in discovery order.
    #[serde(rename = "modules")]
    pub containers: Vec<Container>,
}
