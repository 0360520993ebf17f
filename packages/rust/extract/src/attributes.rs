//! Scalar attribute extraction.
//!
//! Keeps every attribute whose kind is a supported scalar and whose value is
//! non-empty, in host enumeration order. Opaque payloads are dropped without
//! a placeholder.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, trace};

use modexport_shared::{
    AttrValue, AttributeKind, Attributes, FlatRecord, ModExportError, RESERVED_ITEM_KEYS,
    RawAttribute, RawValue, Result,
};

/// Date forms accepted for `date` attributes, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// Filters and converts host attributes of one item.
#[derive(Debug, Clone, Default)]
pub struct AttributeExtractor {
    skipped: HashSet<String>,
}

impl AttributeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never export attributes with these names.
    pub fn with_skipped<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skipped: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Non-empty scalar attributes of `record`, in enumeration order.
    pub fn extract(&self, record: &FlatRecord) -> Attributes {
        let mut attributes = Attributes::new();

        for attr in &record.attributes {
            if self.skipped.contains(&attr.name) {
                continue;
            }
            if RESERVED_ITEM_KEYS.contains(&attr.name.as_str()) {
                debug!(
                    item = %record.identifier,
                    name = %attr.name,
                    "attribute name collides with a structural key, dropped"
                );
                continue;
            }

            match convert(attr) {
                Ok(Some(value)) => attributes.push(attr.name.clone(), value),
                Ok(None) => {}
                Err(e) => trace!(item = %record.identifier, error = %e, "attribute omitted"),
            }
        }

        attributes
    }
}

/// Convert one raw attribute.
///
/// `Ok(None)` means the value is empty (or of a shape the kind cannot carry).
/// Opaque kinds yield [`ModExportError::UnsupportedAttributeType`].
pub(crate) fn convert(attr: &RawAttribute) -> Result<Option<AttrValue>> {
    if !attr.kind.is_scalar() {
        return Err(ModExportError::UnsupportedAttributeType {
            name: attr.name.clone(),
            kind: attr.kind.name().to_string(),
        });
    }

    let value = match &attr.value {
        RawValue::Null | RawValue::NoValue | RawValue::Bytes(_) => return Ok(None),
        RawValue::Text(s) if s.is_empty() => return Ok(None),
        other => other,
    };

    let converted = match (&attr.kind, value) {
        (AttributeKind::Text | AttributeKind::String, RawValue::Text(s)) => {
            Some(AttrValue::Text(s.clone()))
        }
        (AttributeKind::Text | AttributeKind::String, RawValue::Integer(n)) => {
            Some(AttrValue::Text(n.to_string()))
        }
        (AttributeKind::Text | AttributeKind::String, RawValue::Real(x)) => {
            finite(*x).map(|x| AttrValue::Text(x.to_string()))
        }
        (AttributeKind::Text | AttributeKind::String, RawValue::Boolean(b)) => {
            Some(AttrValue::Text(b.to_string()))
        }

        (AttributeKind::Integer, RawValue::Integer(n)) => Some(AttrValue::Integer(*n)),
        (AttributeKind::Integer, RawValue::Text(s)) => {
            s.trim().parse().ok().map(AttrValue::Integer)
        }
        (AttributeKind::Integer, RawValue::Real(x)) => finite(*x)
            .filter(|x| x.fract() == 0.0 && fits_i64(*x))
            .map(|x| AttrValue::Integer(x as i64)),

        (AttributeKind::Real, RawValue::Real(x)) => finite(*x).map(AttrValue::Real),
        (AttributeKind::Real, RawValue::Integer(n)) => Some(AttrValue::Real(*n as f64)),
        (AttributeKind::Real, RawValue::Text(s)) => s
            .trim()
            .parse()
            .ok()
            .and_then(finite)
            .map(AttrValue::Real),

        (AttributeKind::Boolean, RawValue::Boolean(b)) => Some(AttrValue::Boolean(*b)),
        (AttributeKind::Boolean, RawValue::Integer(n)) => Some(AttrValue::Boolean(*n != 0)),
        (AttributeKind::Boolean, RawValue::Text(s)) => parse_bool(s).map(AttrValue::Boolean),

        (AttributeKind::Date, RawValue::Text(s)) => Some(
            parse_date(s)
                .map(AttrValue::Date)
                .unwrap_or_else(|| AttrValue::Text(s.clone())),
        ),

        _ => None,
    };

    if converted.is_none() {
        trace!(name = %attr.name, kind = attr.kind.name(), "value does not fit declared kind");
    }
    Ok(converted)
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn fits_i64(x: f64) -> bool {
    x >= i64::MIN as f64 && x < i64::MAX as f64
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Normalise a host date string to a calendar date.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}
