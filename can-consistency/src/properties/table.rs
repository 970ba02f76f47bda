//! Unified property table
//!
//! Combines property records from one or more JSON exports into a single
//! queryable table with name, signal and id lookups.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Access direction declared for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    /// Property is only reported (uplink)
    #[serde(rename = "READ")]
    Read,
    /// Property is only written (downlink)
    #[serde(rename = "WRITE")]
    Write,
    /// Property may be reported and written
    #[serde(rename = "READ_WRITE")]
    ReadWrite,
}

impl Access {
    /// Parse the table's access string
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "READ" => Some(Access::Read),
            "WRITE" => Some(Access::Write),
            "READ_WRITE" | "READWRITE" => Some(Access::ReadWrite),
            _ => None,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => write!(f, "READ"),
            Access::Write => write!(f, "WRITE"),
            Access::ReadWrite => write!(f, "READ_WRITE"),
        }
    }
}

/// One property → signal mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Property name as it appears in VHAL logs
    pub property_name: String,
    /// Numeric property id (if declared)
    pub property_id: Option<u32>,
    /// Property namespace (e.g. "PatacProperty")
    pub field: Option<String>,
    /// CAN signal name
    pub signal: String,
    pub access: Access,
    /// property = signal * scale + offset
    pub scale: f64,
    pub offset: f64,
    /// Minimum signal value
    pub min: Option<f64>,
    /// Maximum signal value
    pub max: Option<f64>,
    /// Bit position of the validity flag (None if not declared)
    pub valid_bit: Option<i32>,
    /// Bit position of the "data unavailable" flag (None if not declared)
    pub dud_bit: Option<i32>,
}

impl PropertyRecord {
    /// Minimal record with 1:1 scaling and no limits
    pub fn new(property_name: impl Into<String>, signal: impl Into<String>, access: Access) -> Self {
        Self {
            property_name: property_name.into(),
            property_id: None,
            field: None,
            signal: signal.into(),
            access,
            scale: 1.0,
            offset: 0.0,
            min: None,
            max: None,
            valid_bit: None,
            dud_bit: None,
        }
    }

    /// Convert a property value into the signal domain: `(x - offset) / scale`
    pub fn to_signal_value(&self, property_value: f64) -> f64 {
        let scale = if self.scale == 0.0 { 1.0 } else { self.scale };
        (property_value - self.offset) / scale
    }

    /// True if a signal value respects the declared limits
    pub fn in_range(&self, signal_value: f64) -> bool {
        self.min.map_or(true, |min| signal_value >= min)
            && self.max.map_or(true, |max| signal_value <= max)
    }

    /// True if the record declares any limit
    pub fn has_range(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    /// Name of the flag signal raised on an invalid report (`<signal>_Inv` or `<signal>_DuD`)
    pub fn status_flag_signal(&self) -> Option<String> {
        if self.valid_bit.is_some() {
            Some(format!("{}_Inv", self.signal))
        } else if self.dud_bit.is_some() {
            Some(format!("{}_DuD", self.signal))
        } else {
            None
        }
    }
}

/// The unified property table
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    /// All records in load order
    records: Vec<PropertyRecord>,

    /// Property name lookup
    /// Key: property name, Value: index in `records`
    by_property: HashMap<String, usize>,

    /// Signal name lookup
    /// Key: signal name, Value: indices of records mapping to it
    by_signal: HashMap<String, Vec<usize>>,

    /// Property id lookup
    by_id: HashMap<u32, usize>,
}

impl PropertyTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from records
    pub fn from_records(records: Vec<PropertyRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.add_record(record);
        }
        table
    }

    /// Add a record; a later record with the same property name replaces the earlier one
    pub fn add_record(&mut self, record: PropertyRecord) {
        if let Some(&existing) = self.by_property.get(&record.property_name) {
            log::warn!(
                "Duplicate property '{}' in table, keeping the later definition",
                record.property_name
            );
            let old_signal = self.records[existing].signal.clone();
            if let Some(indices) = self.by_signal.get_mut(&old_signal) {
                indices.retain(|&i| i != existing);
            }
            if let Some(old_id) = self.records[existing].property_id {
                self.by_id.remove(&old_id);
            }
            self.index_record(existing, &record);
            self.records[existing] = record;
            return;
        }

        let idx = self.records.len();
        self.index_record(idx, &record);
        self.by_property.insert(record.property_name.clone(), idx);
        self.records.push(record);
    }

    fn index_record(&mut self, idx: usize, record: &PropertyRecord) {
        self.by_signal
            .entry(record.signal.clone())
            .or_insert_with(Vec::new)
            .push(idx);
        if let Some(id) = record.property_id {
            self.by_id.insert(id, idx);
        }
    }

    /// Get a record by property name
    pub fn get_property(&self, property_name: &str) -> Option<&PropertyRecord> {
        self.by_property
            .get(property_name)
            .and_then(|&idx| self.records.get(idx))
    }

    /// Get a record by numeric property id
    pub fn get_by_id(&self, property_id: u32) -> Option<&PropertyRecord> {
        self.by_id.get(&property_id).and_then(|&idx| self.records.get(idx))
    }

    /// All records mapping to a signal
    pub fn records_for_signal(&self, signal: &str) -> Vec<&PropertyRecord> {
        self.by_signal
            .get(signal)
            .map(|indices| indices.iter().filter_map(|&i| self.records.get(i)).collect())
            .unwrap_or_default()
    }

    /// Record for a name that may be either a property or a signal
    pub fn lookup(&self, name: &str) -> Option<&PropertyRecord> {
        self.get_property(name)
            .or_else(|| self.records_for_signal(name).into_iter().next())
    }

    /// Resolve a property name to its signal; other names are returned unchanged
    pub fn resolve_signal_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.get_property(name)
            .map(|r| r.signal.as_str())
            .unwrap_or(name)
    }

    /// Combined access declared for a signal across all its properties
    pub fn declared_access(&self, signal: &str) -> Option<Access> {
        let mut access: Option<Access> = None;
        for record in self.records_for_signal(signal) {
            access = match (access, record.access) {
                (None, a) => Some(a),
                (Some(a), b) if a == b => Some(a),
                _ => Some(Access::ReadWrite),
            };
        }
        access
    }

    /// All records in load order
    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    /// Get table statistics
    pub fn stats(&self) -> TableStats {
        TableStats {
            num_properties: self.records.len(),
            num_signals: self.by_signal.values().filter(|v| !v.is_empty()).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Table statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    /// Number of property records
    pub num_properties: usize,
    /// Number of distinct signals
    pub num_signals: usize,
}
