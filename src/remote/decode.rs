//! Kismet device entry decoding
//!
//! Kismet keys every field by its tracked-field name. When a request asks
//! for a nested path (`kismet.device.base.location/kismet.common.location.avg_loc`)
//! the response is keyed by the full path or by its last component depending
//! on the server version, so lookups match on the final path component and
//! search nested objects.

use crate::reader::{ReaderError, ReaderResult, Record};
use serde_json::Value;

/// Fields that identify a device, in order of preference
const IDENTIFIER_FIELDS: [&str; 4] = [
    "kismet.device.base.macaddr",
    "kismet.device.base.key",
    "kismet.device.base.name",
    "kismet.device.base.commonname",
];

/// Location containers searched for a geopoint, in order of preference
const LOCATION_FIELDS: [&str; 2] = [
    "kismet.common.location.avg_loc",
    "kismet.common.location.last",
];

const GEOPOINT_FIELD: &str = "kismet.common.location.geopoint";
const LAT_FIELD: &str = "kismet.common.location.lat";
const LON_FIELD: &str = "kismet.common.location.lon";

/// Decode one entry of a device listing into a [`Record`]
pub(crate) fn decode_device(entry: &Value) -> ReaderResult<Record> {
    if !entry.is_object() {
        return Err(ReaderError::Parse(format!(
            "expected a device object, got {}",
            type_name(entry)
        )));
    }

    let identifier = decode_identifier(entry)?;
    let (latitude, longitude) = decode_position(entry)?;

    Ok(Record {
        identifier,
        latitude,
        longitude,
    })
}

fn decode_identifier(entry: &Value) -> ReaderResult<Option<String>> {
    for name in IDENTIFIER_FIELDS {
        match find_field(entry, name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => return Ok(Some(s.clone())),
            Some(Value::Number(n)) => return Ok(Some(n.to_string())),
            Some(other) => {
                return Err(ReaderError::Parse(format!(
                    "field {} should be a string, got {}",
                    name,
                    type_name(other)
                )))
            }
        }
    }

    Ok(None)
}

fn decode_position(entry: &Value) -> ReaderResult<(Option<f64>, Option<f64>)> {
    for container in LOCATION_FIELDS {
        if let Some(point) =
            find_field(entry, container).and_then(|loc| find_field(loc, GEOPOINT_FIELD))
        {
            return decode_geopoint(point);
        }
    }

    if let Some(point) = find_field(entry, GEOPOINT_FIELD) {
        return decode_geopoint(point);
    }

    let latitude = find_field(entry, LAT_FIELD)
        .map(|v| number(v, LAT_FIELD))
        .transpose()?
        .flatten();
    let longitude = find_field(entry, LON_FIELD)
        .map(|v| number(v, LON_FIELD))
        .transpose()?
        .flatten();

    Ok((latitude, longitude))
}

/// Kismet geopoints are `[lon, lat]` (optionally followed by altitude)
fn decode_geopoint(point: &Value) -> ReaderResult<(Option<f64>, Option<f64>)> {
    match point {
        Value::Null => Ok((None, None)),
        Value::Array(items) if items.len() >= 2 => {
            let longitude = number(&items[0], GEOPOINT_FIELD)?;
            let latitude = number(&items[1], GEOPOINT_FIELD)?;
            Ok((latitude, longitude))
        }
        other => Err(ReaderError::Parse(format!(
            "field {} should be a [lon, lat] pair, got {}",
            GEOPOINT_FIELD, other
        ))),
    }
}

fn number(value: &Value, field: &str) -> ReaderResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| {
            ReaderError::Parse(format!("field {} holds an unrepresentable number", field))
        }),
        other => Err(ReaderError::Parse(format!(
            "field {} should be a number, got {}",
            field,
            type_name(other)
        ))),
    }
}

/// Depth-first search for `name` through nested objects
fn find_field<'v>(value: &'v Value, name: &str) -> Option<&'v Value> {
    let object = value.as_object()?;

    if let Some(found) = object
        .iter()
        .find(|(key, _)| last_component(key) == name)
        .map(|(_, v)| v)
    {
        return Some(found);
    }

    object.values().find_map(|child| find_field(child, name))
}

fn last_component(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
