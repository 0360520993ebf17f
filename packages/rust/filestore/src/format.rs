//! On-disk module file schema.

use serde::Deserialize;
use serde_json::Value;

use modexport_shared::{
    AttributeKind, FlatRecord, LinkDirection, RawAttribute, RawEndpoint, RawRelationship, RawValue,
};

/// Root of a `*.module.json` file.
#[derive(Debug, Deserialize)]
pub(crate) struct ModuleFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectEntry {
    pub id: String,
    pub level: u32,
    #[serde(default)]
    pub attributes: Vec<AttributeEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttributeEntry {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkEntry {
    #[serde(rename = "type")]
    pub link_type: String,
    pub direction: LinkDirection,
    #[serde(default)]
    pub targets: Vec<RawEndpoint>,
}

impl ModuleFile {
    /// Objects as flat records, in file order.
    pub(crate) fn into_records(self) -> Vec<FlatRecord> {
        self.objects.into_iter().map(ObjectEntry::into_record).collect()
    }
}

impl ObjectEntry {
    fn into_record(self) -> FlatRecord {
        FlatRecord {
            identifier: self.id,
            level: self.level,
            attributes: self
                .attributes
                .into_iter()
                .map(AttributeEntry::into_raw)
                .collect(),
            relationships: self
                .links
                .into_iter()
                .map(|l| RawRelationship {
                    link_type: l.link_type,
                    direction: l.direction,
                    endpoints: l.targets,
                })
                .collect(),
        }
    }
}

impl AttributeEntry {
    fn into_raw(self) -> RawAttribute {
        let kind = AttributeKind::from_name(&self.kind);
        let value = if kind.is_scalar() {
            raw_value(self.value)
        } else {
            opaque_value(self.value)
        };
        RawAttribute {
            name: self.name,
            kind,
            value,
        }
    }
}

fn raw_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Boolean(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => RawValue::Integer(i),
            None => RawValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => RawValue::Text(s),
        Value::Object(ref map) if is_no_value(map) => RawValue::NoValue,
        other => RawValue::Bytes(other.to_string().into_bytes()),
    }
}

fn opaque_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::String(s) => RawValue::Bytes(s.into_bytes()),
        other => RawValue::Bytes(other.to_string().into_bytes()),
    }
}

fn is_no_value(map: &serde_json::Map<String, Value>) -> bool {
    map.get("noValue").and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_values_map_by_json_type() {
        assert_eq!(raw_value(json!(null)), RawValue::Null);
        assert_eq!(raw_value(json!(0)), RawValue::Integer(0));
        assert_eq!(raw_value(json!(1.5)), RawValue::Real(1.5));
        assert_eq!(raw_value(json!(false)), RawValue::Boolean(false));
        assert_eq!(raw_value(json!("")), RawValue::Text(String::new()));
        assert_eq!(raw_value(json!({ "noValue": true })), RawValue::NoValue);
        assert!(matches!(raw_value(json!([1, 2])), RawValue::Bytes(_)));
    }

    #[test]
    fn opaque_values_become_bytes() {
        let entry = AttributeEntry {
            name: "Diagram".into(),
            kind: "OLE".into(),
            value: json!("AAEC"),
        };
        let raw = entry.into_raw();
        assert_eq!(raw.value, RawValue::Bytes(b"AAEC".to_vec()));
        assert!(!raw.kind.is_scalar());
    }

    #[test]
    fn incoming_links_deserialize() {
        let entry: LinkEntry = serde_json::from_value(json!({
            "type": "verifies",
            "direction": "incoming",
            "targets": [ { "module": "/P/Tests" } ]
        }))
        .unwrap();
        assert_eq!(entry.direction, LinkDirection::Incoming);
        assert_eq!(entry.targets[0].item_id, None);
    }
}
