//! Row decoding for snapshot tables
//!
//! Maps requested columns onto [`Record`] fields by name. Columns with no
//! mapping are read and dropped.

use crate::reader::{ReaderError, ReaderResult, Record};
use rusqlite::types::Value;

/// Identifier columns across Kismet log tables, in order of preference
const IDENTIFIER_COLUMNS: [&str; 5] = ["devmac", "devkey", "sourcemac", "macaddr", "uuid"];
const LATITUDE_COLUMNS: [&str; 2] = ["avg_lat", "lat"];
const LONGITUDE_COLUMNS: [&str; 2] = ["avg_lon", "lon"];

/// Positions of the mapped columns within a requested column list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct ColumnMapping {
    identifier: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
}

impl ColumnMapping {
    pub(super) fn new(columns: &[String]) -> Self {
        Self {
            identifier: position_of(columns, &IDENTIFIER_COLUMNS),
            latitude: position_of(columns, &LATITUDE_COLUMNS),
            longitude: position_of(columns, &LONGITUDE_COLUMNS),
        }
    }

    /// True when no requested column maps onto a record field
    pub(super) fn is_empty(&self) -> bool {
        self.identifier.is_none() && self.latitude.is_none() && self.longitude.is_none()
    }

    /// Decode one row's values, in requested column order
    pub(super) fn decode(&self, rowid: i64, values: &[Value]) -> ReaderResult<Record> {
        let identifier = match self.identifier {
            Some(i) => Some(identifier(rowid, &values[i])?),
            None => None,
        };

        let latitude = match self.latitude {
            Some(i) => coordinate(rowid, "latitude", &values[i])?,
            None => None,
        };

        let longitude = match self.longitude {
            Some(i) => coordinate(rowid, "longitude", &values[i])?,
            None => None,
        };

        Ok(Record {
            identifier,
            latitude,
            longitude,
        })
    }
}

fn position_of(columns: &[String], candidates: &[&str]) -> Option<usize> {
    candidates.iter().find_map(|candidate| {
        columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(candidate))
    })
}

fn identifier(rowid: i64, value: &Value) -> ReaderResult<String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Null => Err(ReaderError::Parse(format!(
            "row {}: identifier is NULL",
            rowid
        ))),
        other => Err(ReaderError::Parse(format!(
            "row {}: identifier has unsupported type {}",
            rowid,
            other.data_type()
        ))),
    }
}

fn coordinate(rowid: i64, what: &str, value: &Value) -> ReaderResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Real(f) => Ok(Some(*f)),
        // Older Kismet logs store coordinates as integers
        Value::Integer(i) => Ok(Some(*i as f64)),
        Value::Text(s) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            ReaderError::Parse(format!("row {}: {} '{}' is not a number", rowid, what, s))
        }),
        Value::Blob(_) => Err(ReaderError::Parse(format!(
            "row {}: {} is a blob",
            rowid, what
        ))),
    }
}
