//! Rebuild a container's item tree from its flat, level-annotated records.
//!
//! Items arrive in native document order. An explicit stack holds the chain
//! of still-open ancestors; an item is attached to its parent once a later
//! record (or the end of input) closes it, so sibling order is preserved and
//! no recursion over host pointers is needed.

use tracing::{debug, instrument};

use modexport_shared::{FlatRecord, Item, ModExportError};

use crate::attributes::AttributeExtractor;
use crate::links::extract_links;

/// Output of one [`HierarchyWalker::build`] call.
#[derive(Debug, Default)]
pub struct WalkResult {
    /// Top-level items in document order.
    pub items: Vec<Item>,
    /// Dangling links encountered while extracting.
    pub warnings: Vec<ModExportError>,
}

/// Builds nested [`Item`] trees, running attribute and link extraction on
/// every record.
#[derive(Debug, Clone, Default)]
pub struct HierarchyWalker {
    attributes: AttributeExtractor,
}

impl HierarchyWalker {
    pub fn new(attributes: AttributeExtractor) -> Self {
        Self { attributes }
    }

    /// Build the item tree of `container` from its flat records.
    ///
    /// A level jump of more than one (1 followed by 3) makes the item a child
    /// of the nearest open ancestor; no intermediate node is invented.
    #[instrument(skip_all, fields(container = %container, records = records.len()))]
    pub fn build(&self, container: &str, records: &[FlatRecord]) -> WalkResult {
        let mut result = WalkResult::default();
        let mut open: Vec<Item> = Vec::new();

        for record in records {
            let links = extract_links(container, record);
            result.warnings.extend(links.warnings);

            let item = Item {
                id: record.identifier.clone(),
                level: record.level,
                attributes: self.attributes.extract(record),
                links: links.links,
                children: Vec::new(),
            };

            while open.last().is_some_and(|top| top.level >= item.level) {
                close_top(&mut open, &mut result.items);
            }
            open.push(item);
        }

        while !open.is_empty() {
            close_top(&mut open, &mut result.items);
        }

        debug!(
            top_level = result.items.len(),
            warnings = result.warnings.len(),
            "hierarchy rebuilt"
        );
        result
    }
}

/// Pop the innermost open item and attach it to its parent (or the roots).
fn close_top(open: &mut Vec<Item>, roots: &mut Vec<Item>) {
    if let Some(done) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

/// Flatten a tree back to `(id, level)` pairs in depth-first pre-order.
pub fn flatten(items: &[Item]) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    for item in items {
        item.visit(&mut |i| out.push((i.id.clone(), i.level)));
    }
    out
}
