//! Typed field accessors over a parsed JSON tree.
//!
//! Every accessor takes the record name for error reporting, so a missing or
//! mistyped field is surfaced as a schema error naming both.

use serde_json::{Map, Value};

use crate::error::{CocoError, Result};

pub(crate) type Object = Map<String, Value>;

pub(crate) fn as_object<'a>(value: &'a Value, record: &'static str) -> Result<&'a Object> {
    value.as_object().ok_or(CocoError::WrongType {
        record,
        field: "<record>",
        expected: "object",
    })
}

pub(crate) fn field<'a>(
    obj: &'a Object,
    record: &'static str,
    field: &'static str,
) -> Result<&'a Value> {
    obj.get(field)
        .ok_or(CocoError::MissingField { record, field })
}

fn wrong(record: &'static str, field: &'static str, expected: &'static str) -> CocoError {
    CocoError::WrongType {
        record,
        field,
        expected,
    }
}

pub(crate) fn get_f64(obj: &Object, record: &'static str, name: &'static str) -> Result<f64> {
    field(obj, record, name)?
        .as_f64()
        .ok_or_else(|| wrong(record, name, "number"))
}

pub(crate) fn opt_f64(obj: &Object, record: &'static str, name: &'static str) -> Result<Option<f64>> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| wrong(record, name, "number")),
    }
}

pub(crate) fn get_u64(obj: &Object, record: &'static str, name: &'static str) -> Result<u64> {
    field(obj, record, name)?
        .as_u64()
        .ok_or_else(|| wrong(record, name, "non-negative integer"))
}

/// Annotation ids may be stored as doubles; they are truncated toward zero.
pub(crate) fn get_id(obj: &Object, record: &'static str, name: &'static str) -> Result<u64> {
    let v = field(obj, record, name)?;
    if let Some(id) = v.as_u64() {
        return Ok(id);
    }
    match v.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f < u64::MAX as f64 => Ok(f.trunc() as u64),
        _ => Err(wrong(record, name, "non-negative number")),
    }
}

pub(crate) fn get_u32(obj: &Object, record: &'static str, name: &'static str) -> Result<u32> {
    let v = get_u64(obj, record, name)?;
    u32::try_from(v).map_err(|_| wrong(record, name, "32-bit unsigned integer"))
}

pub(crate) fn get_str<'a>(
    obj: &'a Object,
    record: &'static str,
    name: &'static str,
) -> Result<&'a str> {
    field(obj, record, name)?
        .as_str()
        .ok_or_else(|| wrong(record, name, "string"))
}

/// Crowd flags are `0`/`1` in COCO files but booleans show up in the wild.
pub(crate) fn get_flag(obj: &Object, record: &'static str, name: &'static str) -> Result<bool> {
    match field(obj, record, name)? {
        Value::Bool(b) => Ok(*b),
        v => v
            .as_u64()
            .map(|i| i != 0)
            .ok_or_else(|| wrong(record, name, "0/1 or boolean")),
    }
}

pub(crate) fn get_array<'a>(
    obj: &'a Object,
    record: &'static str,
    name: &'static str,
) -> Result<&'a Vec<Value>> {
    field(obj, record, name)?
        .as_array()
        .ok_or_else(|| wrong(record, name, "array"))
}

pub(crate) fn f64_array(values: &[Value], record: &'static str, name: &'static str) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| wrong(record, name, "array of numbers")))
        .collect()
}

pub(crate) fn bbox(obj: &Object, record: &'static str) -> Result<[f64; 4]> {
    let values = f64_array(get_array(obj, record, "bbox")?, record, "bbox")?;
    <[f64; 4]>::try_from(values).map_err(|_| wrong(record, "bbox", "array of 4 numbers"))
}

/// A RLE `size` field: `[height, width]`.
pub(crate) fn size(obj: &Object, record: &'static str) -> Result<[u32; 2]> {
    let values = get_array(obj, record, "size")?;
    let dims: Vec<u32> = values
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|d| u32::try_from(d).ok())
                .ok_or_else(|| wrong(record, "size", "[height, width]"))
        })
        .collect::<Result<_>>()?;
    <[u32; 2]>::try_from(dims).map_err(|_| wrong(record, "size", "[height, width]"))
}

/// A section of the top-level document; absent is `None`, present-but-not-array is an error.
pub(crate) fn section<'a>(obj: &'a Object, name: &'static str) -> Result<Option<&'a Vec<Value>>> {
    match obj.get(name) {
        None => Ok(None),
        Some(v) => v
            .as_array()
            .map(Some)
            .ok_or_else(|| wrong("dataset", name, "array")),
    }
}
