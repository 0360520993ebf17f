//! Export document assembler.
//!
//! Collects finished containers in completion order, wraps them into the
//! [`ExportDocument`] shape and serializes it. Serialization is
//! deterministic: identical input yields identical bytes, which keeps
//! golden-file comparisons stable.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, instrument};

use modexport_shared::{Container, ExportDocument, ModExportError, Result};
use modexport_traverser::ContainerSink;

/// Incremental builder of one export document.
#[derive(Debug)]
pub struct DocumentAssembler {
    root: String,
    max_depth: u32,
    generated_at: DateTime<Utc>,
    containers: Vec<Container>,
    seen: HashSet<String>,
    duplicates: Vec<String>,
}

impl DocumentAssembler {
    pub fn new(root: impl Into<String>, max_depth: u32, generated_at: DateTime<Utc>) -> Self {
        Self {
            root: root.into(),
            max_depth,
            generated_at,
            containers: Vec::new(),
            seen: HashSet::new(),
            duplicates: Vec::new(),
        }
    }

    /// Containers collected so far.
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    /// Close the document.
    ///
    /// Fails with [`ModExportError::Serialization`] if a container path was
    /// appended twice, since the model can no longer be trusted.
    pub fn finish(self) -> Result<ExportDocument> {
        if !self.duplicates.is_empty() {
            return Err(ModExportError::Serialization(format!(
                "container appended more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(ExportDocument {
            generated_at: self.generated_at,
            root_container: self.root,
            max_depth: self.max_depth,
            containers: self.containers,
        })
    }
}

impl ContainerSink for DocumentAssembler {
    fn accept(&mut self, container: Container) {
        if !self.seen.insert(container.path.clone()) {
            error!(path = %container.path, "duplicate container dropped");
            self.duplicates.push(container.path);
            return;
        }
        debug!(path = %container.path, depth = container.depth, "container appended");
        self.containers.push(container);
    }
}

/// Wrap `containers` into an export document and serialize it.
pub fn finalize(
    containers: Vec<Container>,
    root: &str,
    max_depth: u32,
    generated_at: DateTime<Utc>,
    pretty: bool,
) -> Result<Vec<u8>> {
    let mut assembler = DocumentAssembler::new(root, max_depth, generated_at);
    for container in containers {
        assembler.accept(container);
    }
    serialize_document(&assembler.finish()?, pretty)
}

/// Serialize a document to JSON bytes. Pretty output ends with a newline.
#[instrument(skip_all, fields(modules = document.containers.len(), pretty = pretty))]
pub fn serialize_document(document: &ExportDocument, pretty: bool) -> Result<Vec<u8>> {
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(document)
    } else {
        serde_json::to_vec(document)
    }
    .map_err(|e| ModExportError::Serialization(e.to_string()))?;

    if pretty {
        bytes.push(b'\n');
    }
    debug!(bytes = bytes.len(), "document serialized");
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Counts gathered while validating an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub modules: usize,
    pub objects: usize,
    pub links: usize,
}

/// Verify that serialized bytes form a well-formed export.
pub fn validate_export(bytes: &[u8]) -> Result<ExportStats> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| ModExportError::validation(format!("not valid JSON: {e}")))?;

    if doc.get("exportDate").and_then(Value::as_str).is_none() {
        return Err(ModExportError::validation("missing exportDate"));
    }
    let root = doc
        .get("rootModule")
        .and_then(Value::as_str)
        .ok_or_else(|| ModExportError::validation("missing rootModule"))?;
    let max_depth = doc
        .get("maxDepth")
        .and_then(Value::as_u64)
        .ok_or_else(|| ModExportError::validation("missing maxDepth"))?;
    let modules = doc
        .get("modules")
        .and_then(Value::as_array)
        .ok_or_else(|| ModExportError::validation("missing modules array"))?;

    let first = modules
        .first()
        .ok_or_else(|| ModExportError::validation("no modules exported"))?;
    if first.get("modulePath").and_then(Value::as_str) != Some(root)
        || first.get("depth").and_then(Value::as_u64) != Some(0)
    {
        return Err(ModExportError::validation(
            "first module must be the root module at depth 0",
        ));
    }

    let mut stats = ExportStats::default();
    let mut paths = HashSet::new();

    for module in modules {
        let path = module
            .get("modulePath")
            .and_then(Value::as_str)
            .ok_or_else(|| ModExportError::validation("module without modulePath"))?;
        if !paths.insert(path) {
            return Err(ModExportError::validation(format!("duplicate module {path}")));
        }
        let depth = module
            .get("depth")
            .and_then(Value::as_u64)
            .ok_or_else(|| ModExportError::validation(format!("{path}: missing depth")))?;
        if depth > max_depth {
            return Err(ModExportError::validation(format!(
                "{path}: depth {depth} exceeds maxDepth {max_depth}"
            )));
        }
        let objects = module
            .get("objects")
            .and_then(Value::as_array)
            .ok_or_else(|| ModExportError::validation(format!("{path}: missing objects")))?;
        for object in objects {
            validate_object(path, object, None, &mut stats)?;
        }
        stats.modules += 1;
    }

    Ok(stats)
}

fn validate_object(
    module: &str,
    object: &Value,
    parent_level: Option<u64>,
    stats: &mut ExportStats,
) -> Result<()> {
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ModExportError::validation(format!("{module}: object without id")))?;
    let level = object
        .get("level")
        .and_then(Value::as_u64)
        .ok_or_else(|| ModExportError::validation(format!("{module}#{id}: missing level")))?;
    if parent_level.is_some_and(|p| level <= p) {
        return Err(ModExportError::validation(format!(
            "{module}#{id}: level {level} not below its parent"
        )));
    }

    let links = object
        .get("links")
        .and_then(Value::as_array)
        .ok_or_else(|| ModExportError::validation(format!("{module}#{id}: missing links")))?;
    for link in links {
        let peer_key = match link.get("direction").and_then(Value::as_str) {
            Some("outgoing") => "targetModule",
            Some("incoming") => "sourceModule",
            _ => {
                return Err(ModExportError::validation(format!(
                    "{module}#{id}: link without direction"
                )));
            }
        };
        if link.get(peer_key).and_then(Value::as_str).is_none() {
            return Err(ModExportError::validation(format!(
                "{module}#{id}: link without {peer_key}"
            )));
        }
    }
    stats.links += links.len();
    stats.objects += 1;

    let children = object
        .get("children")
        .and_then(Value::as_array)
        .ok_or_else(|| ModExportError::validation(format!("{module}#{id}: missing children")))?;
    for child in children {
        validate_object(module, child, Some(level), stats)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use modexport_shared::{AttrValue, Attributes, Item, Link, LinkDirection};

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn container(path: &str, depth: u32, items: Vec<Item>) -> Container {
        Container {
            path: path.into(),
            name: modexport_shared::default_container_name(path),
            depth,
            items,
        }
    }

    fn item(id: &str, level: u32, text: &str, children: Vec<Item>) -> Item {
        let mut attributes = Attributes::new();
        attributes.push("Object Text", AttrValue::Text(text.into()));
        Item {
            id: id.into(),
            level,
            attributes,
            links: vec![],
            children,
        }
    }

    #[test]
    fn finalize_is_deterministic() {
        let build = || {
            vec![
                container("/A", 0, vec![item("1", 1, "x", vec![item("2", 2, "y", vec![])])]),
                container("/B", 1, vec![]),
            ]
        };
        let first = finalize(build(), "/A", 2, timestamp(), true).unwrap();
        let second = finalize(build(), "/A", 2, timestamp(), true).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(b"\n"));

        let stats = validate_export(&first).unwrap();
        assert_eq!(
            stats,
            ExportStats {
                modules: 2,
                objects: 2,
                links: 0
            }
        );
    }

    #[test]
    fn duplicate_container_is_a_fatal_invariant_breach() {
        let mut assembler = DocumentAssembler::new("/A", 3, timestamp());
        assembler.accept(container("/A", 0, vec![]));
        assembler.accept(container("/A", 1, vec![]));
        assert_eq!(assembler.containers().len(), 1);
        assert!(matches!(
            assembler.finish(),
            Err(ModExportError::Serialization(_))
        ));
    }

    #[test]
    fn escaped_strings_parse_back_unchanged() {
        let tricky = [
            "quote \" inside",
            "back\\slash",
            "new\nline",
            "tab\there",
            "mixed \"\\\n\t\r\u{1} end",
        ];
        for text in tricky {
            let bytes = finalize(
                vec![container("/A", 0, vec![item("1", 1, text, vec![])])],
                "/A",
                1,
                timestamp(),
                false,
            )
            .unwrap();
            let parsed: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(parsed["modules"][0]["objects"][0]["Object Text"], text);
        }
    }

    #[test]
    fn compact_output_has_no_newlines() {
        let bytes = finalize(vec![container("/A", 0, vec![])], "/A", 1, timestamp(), false).unwrap();
        assert!(!bytes.contains(&b'\n'));
    }

    #[test]
    fn validation_rejects_broken_documents() {
        let ok_doc = |modules: Value| {
            serde_json::to_vec(&serde_json::json!({
                "exportDate": "2025-06-01T12:00:00Z",
                "rootModule": "/A",
                "maxDepth": 1,
                "modules": modules,
            }))
            .unwrap()
        };

        let empty = ok_doc(serde_json::json!([]));
        assert!(validate_export(&empty).is_err());

        let dup = ok_doc(serde_json::json!([
            { "modulePath": "/A", "moduleName": "A", "depth": 0, "objects": [] },
            { "modulePath": "/A", "moduleName": "A", "depth": 1, "objects": [] }
        ]));
        assert!(validate_export(&dup).unwrap_err().to_string().contains("duplicate"));

        let too_deep = ok_doc(serde_json::json!([
            { "modulePath": "/A", "moduleName": "A", "depth": 0, "objects": [] },
            { "modulePath": "/B", "moduleName": "B", "depth": 2, "objects": [] }
        ]));
        assert!(validate_export(&too_deep).unwrap_err().to_string().contains("exceeds"));

        let bad_child = ok_doc(serde_json::json!([
            { "modulePath": "/A", "moduleName": "A", "depth": 0, "objects": [
                { "id": "1", "level": 2, "links": [], "children": [
                    { "id": "2", "level": 2, "links": [], "children": [] }
                ] }
            ] }
        ]));
        assert!(validate_export(&bad_child).is_err());

        assert!(validate_export(b"{ nope").is_err());
    }

    #[test]
    fn validation_counts_links() {
        let mut linked = item("1", 1, "x", vec![]);
        linked.links.push(Link {
            link_type: "satisfies".into(),
            direction: LinkDirection::Outgoing,
            peer_container: "/Z".into(),
            peer_item_id: "z".into(),
        });
        let bytes = finalize(vec![container("/A", 0, vec![linked])], "/A", 1, timestamp(), true)
            .unwrap();
        assert_eq!(validate_export(&bytes).unwrap().links, 1);
    }
}
