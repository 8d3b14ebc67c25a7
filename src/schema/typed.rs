//! Bridge between serde types and [`Record`]s
//!
//! Typed structs pass through `serde_json::Value`: each schema field picks the
//! JSON attribute of the same name and converts it to the [`Value`] variant its
//! kind expects. JSON nulls are treated as absent attributes.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value as Json};

use crate::error::Error;
use crate::schema::{Field, FieldKind, Number, Record, Schema, Value};

fn unexpected(field: &Field, json: &Json) -> Error {
    Error::FieldExport {
        field: field.name().to_string(),
        kind: field.kind(),
        reason: format!("unexpected JSON value `{json}`"),
    }
}

fn json_number(field: &Field, json: &Json) -> Result<Number, Error> {
    match json {
        Json::Number(n) => Number::parse(&n.to_string()).ok_or_else(|| unexpected(field, json)),
        _ => Err(unexpected(field, json)),
    }
}

fn json_bytes(field: &Field, json: &Json) -> Result<Vec<u8>, Error> {
    let items = json.as_array().ok_or_else(|| unexpected(field, json))?;
    items
        .iter()
        .map(|byte| {
            byte.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| unexpected(field, json))
        })
        .collect()
}

fn from_json(field: &Field, json: &Json) -> Result<Value, Error> {
    let value = match field.kind() {
        FieldKind::String => Value::String(
            json.as_str()
                .ok_or_else(|| unexpected(field, json))?
                .to_string(),
        ),
        FieldKind::Number => Value::Number(json_number(field, json)?),
        FieldKind::Boolean => Value::Bool(json.as_bool().ok_or_else(|| unexpected(field, json))?),
        FieldKind::Binary => Value::Binary(json_bytes(field, json)?),
        FieldKind::StringSet => {
            let items = json.as_array().ok_or_else(|| unexpected(field, json))?;
            Value::StringSet(
                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| unexpected(field, json))
                    })
                    .collect::<Result<_, _>>()?,
            )
        }
        FieldKind::NumberSet => {
            let items = json.as_array().ok_or_else(|| unexpected(field, json))?;
            Value::NumberSet(
                items
                    .iter()
                    .map(|item| json_number(field, item))
                    .collect::<Result<_, _>>()?,
            )
        }
        FieldKind::BinarySet => {
            let items = json.as_array().ok_or_else(|| unexpected(field, json))?;
            Value::BinarySet(
                items
                    .iter()
                    .map(|item| json_bytes(field, item))
                    .collect::<Result<_, _>>()?,
            )
        }
        FieldKind::Json | FieldKind::Document => Value::Json(json.clone()),
        FieldKind::Date => match json {
            Json::Number(_) => json
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(Value::Date)
                .ok_or_else(|| unexpected(field, json))?,
            _ => Value::Date(
                serde_json::from_value(json.clone()).map_err(|_| unexpected(field, json))?,
            ),
        },
    };
    Ok(value)
}

fn to_json(value: &Value) -> Result<Json, Error> {
    let json = match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Number(n) => number_json(n),
        Value::Bool(b) => Json::Bool(*b),
        Value::Binary(bytes) => serde_json::to_value(bytes)?,
        Value::StringSet(members) => serde_json::to_value(members)?,
        Value::NumberSet(members) => Json::Array(members.iter().map(number_json).collect()),
        Value::BinarySet(members) => serde_json::to_value(members)?,
        Value::Json(json) => json.clone(),
        Value::Date(date) => serde_json::to_value(date)?,
    };
    Ok(json)
}

fn number_json(number: &Number) -> Json {
    match number {
        Number::Int(i) => Json::from(*i),
        Number::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Number::Decimal(s) => s
            .parse::<serde_json::Number>()
            .map(Json::Number)
            .unwrap_or(Json::Null),
    }
}

impl Schema {
    /// Convert a serializable struct into a record
    ///
    /// Struct fields the schema does not declare are ignored, as are fields that
    /// serialize to `null`.
    pub fn record_from<T: Serialize>(&self, value: &T) -> Result<Record, Error> {
        let json = serde_json::to_value(value)?;
        let object = match json {
            Json::Object(object) => object,
            other => {
                return Err(Error::InvalidSchema {
                    alias: self.alias().to_string(),
                    reason: format!("records must serialize to JSON objects, got `{other}`"),
                });
            }
        };

        let mut record = Record::new();
        for field in self.fields() {
            match object.get(field.name()) {
                None | Some(Json::Null) => {}
                Some(json) => {
                    let _ = record.insert(field.name().to_string(), from_json(field, json)?);
                }
            }
        }
        Ok(record)
    }

    /// Convert a record into a deserializable struct
    pub fn record_into<T: DeserializeOwned>(&self, record: &Record) -> Result<T, Error> {
        let mut object = Map::with_capacity(record.len());
        for (name, value) in record {
            let _ = object.insert(name.clone(), to_json(value)?);
        }
        Ok(serde_json::from_value(Json::Object(object))?)
    }
}
