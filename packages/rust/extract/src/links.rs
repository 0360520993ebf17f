//! Relationship extraction.
//!
//! Outgoing relationships come first, then incoming ones, each group in host
//! order. A relationship with several endpoints yields one [`Link`] per
//! endpoint. Endpoints that cannot be resolved are reported, not emitted.

use tracing::warn;

use modexport_shared::{
    FlatRecord, Link, LinkDirection, ModExportError, RawEndpoint, RawRelationship,
};

/// Links of one item plus the dangling endpoints found along the way.
#[derive(Debug, Default)]
pub struct LinkExtraction {
    pub links: Vec<Link>,
    /// One [`ModExportError::LinkResolution`] per skipped endpoint.
    pub warnings: Vec<ModExportError>,
}

/// Extract all links of `record`, which lives in `container`.
pub fn extract_links(container: &str, record: &FlatRecord) -> LinkExtraction {
    let mut out = LinkExtraction::default();

    for direction in [LinkDirection::Outgoing, LinkDirection::Incoming] {
        for rel in record.relationships.iter().filter(|r| r.direction == direction) {
            for endpoint in &rel.endpoints {
                match resolve(endpoint) {
                    Some((peer_container, peer_item_id)) => out.links.push(Link {
                        link_type: rel.link_type.clone(),
                        direction,
                        peer_container,
                        peer_item_id,
                    }),
                    None => {
                        let err = dangling(container, record, rel, endpoint);
                        warn!(error = %err, "skipping unresolved link");
                        out.warnings.push(err);
                    }
                }
            }
        }
    }

    out
}

fn resolve(endpoint: &RawEndpoint) -> Option<(String, String)> {
    let container = endpoint.container.as_deref().filter(|s| !s.is_empty())?;
    let item = endpoint.item_id.as_deref().filter(|s| !s.is_empty())?;
    Some((container.to_string(), item.to_string()))
}

fn dangling(
    container: &str,
    record: &FlatRecord,
    rel: &RawRelationship,
    endpoint: &RawEndpoint,
) -> ModExportError {
    let reason = match (&endpoint.container, &endpoint.item_id) {
        (None, _) => "peer container unknown".to_string(),
        (Some(c), _) if c.is_empty() => "peer container unknown".to_string(),
        (Some(c), _) => format!("peer item in {c} unknown"),
    };
    ModExportError::link_resolution(
        container,
        record.identifier.clone(),
        rel.link_type.clone(),
        format!("{} endpoint: {reason}", rel.direction.as_str()),
    )
}
