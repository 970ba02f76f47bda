//! Property table JSON loader
//!
//! Reads the JSON export of the header parser and converts it into
//! `PropertyRecord`s. All fields in the export are strings; an empty string or
//! `-1` means "not declared".

use crate::properties::table::{Access, PropertyRecord};
use crate::types::{EngineError, Result};
use serde::Deserialize;
use std::path::Path;

/// Record layout as written by the exporter
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    property_name: String,
    #[serde(default, rename = "propertyID")]
    property_id: String,
    #[serde(default)]
    field: String,
    signal: String,
    #[serde(default)]
    access: String,
    #[serde(default)]
    scale: String,
    #[serde(default)]
    offset: String,
    #[serde(default)]
    max_value: String,
    #[serde(default)]
    min_value: String,
    #[serde(default)]
    valid_pos: String,
    #[serde(default)]
    dud_pos: String,
}

/// Parse a property table file and return its records
pub fn parse_property_file(path: &Path) -> Result<Vec<PropertyRecord>> {
    log::info!("Parsing property table: {:?}", path);

    let bytes = std::fs::read(path).map_err(|e| {
        EngineError::PropertyTableError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    // Exports from Windows shares are not always UTF-8
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("Property table is not UTF-8, trying Latin-1 encoding");
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    let records = parse_property_json(&content).map_err(|e| {
        EngineError::PropertyTableError(format!("Failed to parse {:?}: {}", path, e))
    })?;

    log::info!("Parsed {} property records from {:?}", records.len(), path);
    Ok(records)
}

/// Parse property records from JSON text
pub fn parse_property_json(content: &str) -> Result<Vec<PropertyRecord>> {
    let raw: Vec<RawRecord> = serde_json::from_str(content)?;
    raw.into_iter().map(convert_record).collect()
}

/// Convert an exporter record to our PropertyRecord
fn convert_record(raw: RawRecord) -> Result<PropertyRecord> {
    let name = raw.property_name.trim().to_string();
    if name.is_empty() || raw.signal.trim().is_empty() {
        return Err(EngineError::PropertyTableError(format!(
            "record '{}' has no property name or signal",
            name
        )));
    }

    let access = match raw.access.trim() {
        "" => Access::ReadWrite,
        text => Access::parse(text).ok_or_else(|| {
            EngineError::PropertyTableError(format!(
                "property '{}' has unknown access '{}'",
                name, text
            ))
        })?,
    };

    Ok(PropertyRecord {
        property_id: raw.property_id.trim().parse().ok(),
        field: non_empty(&raw.field),
        signal: raw.signal.trim().to_string(),
        access,
        scale: parse_number(&raw.scale, &name, "scale")?.unwrap_or(1.0),
        offset: parse_number(&raw.offset, &name, "offset")?.unwrap_or(0.0),
        min: parse_number(&raw.min_value, &name, "minValue")?,
        max: parse_number(&raw.max_value, &name, "maxValue")?,
        valid_bit: parse_bit(&raw.valid_pos),
        dud_bit: parse_bit(&raw.dud_pos),
        property_name: name,
    })
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn parse_number(text: &str, property: &str, key: &str) -> Result<Option<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>().map(Some).map_err(|_| {
        EngineError::PropertyTableError(format!(
            "property '{}' has non-numeric {} '{}'",
            property, key, text
        ))
    })
}

/// Bit positions: empty, negative or unreadable all mean "absent"
fn parse_bit(text: &str) -> Option<i32> {
    text.trim().parse::<i32>().ok().filter(|&bit| bit >= 0)
}
