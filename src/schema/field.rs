use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, ScalarAttributeType};
use chrono::{DateTime, Utc};
use serde_dynamo::{from_attribute_value, to_attribute_value};
use std::fmt;

use crate::error::Error;
use crate::schema::value::{Number, Value};

/// Semantic type of a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// UTF-8 string, stored as `S`
    String,
    /// Number, stored as `N` in decimal string form
    Number,
    /// Flag, stored as `N` `"1"` / `"0"`
    Boolean,
    /// Bytes, stored as `B`
    Binary,
    /// Set of strings, stored as `SS`
    StringSet,
    /// Set of numbers, stored as `NS`
    NumberSet,
    /// Set of byte strings, stored as `BS`
    BinarySet,
    /// Any JSON value, stored as its serialized text in `S`
    Json,
    /// JSON object, stored as a native `M` document
    Document,
    /// Timestamp, stored as `N` epoch milliseconds
    Date,
}

impl FieldKind {
    /// Wire tag every exported value of this kind carries
    pub fn wire_tag(&self) -> WireTag {
        match self {
            FieldKind::String | FieldKind::Json => WireTag::S,
            FieldKind::Number | FieldKind::Boolean | FieldKind::Date => WireTag::N,
            FieldKind::Binary => WireTag::B,
            FieldKind::StringSet => WireTag::Ss,
            FieldKind::NumberSet => WireTag::Ns,
            FieldKind::BinarySet => WireTag::Bs,
            FieldKind::Document => WireTag::M,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Binary => "binary",
            FieldKind::StringSet => "string set",
            FieldKind::NumberSet => "number set",
            FieldKind::BinarySet => "binary set",
            FieldKind::Json => "json",
            FieldKind::Document => "document",
            FieldKind::Date => "date",
        };
        f.write_str(name)
    }
}

/// The store's type marker attached to every attribute value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WireTag {
    /// String
    S,
    /// Number
    N,
    /// Binary
    B,
    /// String set
    Ss,
    /// Number set
    Ns,
    /// Binary set
    Bs,
    /// Map
    M,
}

impl WireTag {
    /// Tag as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            WireTag::S => "S",
            WireTag::N => "N",
            WireTag::B => "B",
            WireTag::Ss => "SS",
            WireTag::Ns => "NS",
            WireTag::Bs => "BS",
            WireTag::M => "M",
        }
    }

    /// Attribute type for key schemas; only scalar tags can be keys
    pub fn scalar_type(&self) -> Option<ScalarAttributeType> {
        match self {
            WireTag::S => Some(ScalarAttributeType::S),
            WireTag::N => Some(ScalarAttributeType::N),
            WireTag::B => Some(ScalarAttributeType::B),
            _ => None,
        }
    }
}

impl fmt::Display for WireTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn tag_name(value: &AttributeValue) -> &'static str {
    match value {
        AttributeValue::S(_) => "S",
        AttributeValue::N(_) => "N",
        AttributeValue::B(_) => "B",
        AttributeValue::Ss(_) => "SS",
        AttributeValue::Ns(_) => "NS",
        AttributeValue::Bs(_) => "BS",
        AttributeValue::M(_) => "M",
        AttributeValue::L(_) => "L",
        AttributeValue::Bool(_) => "BOOL",
        AttributeValue::Null(_) => "NULL",
        _ => "unknown",
    }
}

/// Typed attribute descriptor
///
/// A field converts values of its [`FieldKind`] to the store's wire form
/// ([`Field::export`]) and back ([`Field::import`]). For every value the kind
/// accepts, `import(export(v)) == v`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    name: String,
    kind: FieldKind,
}

impl Field {
    /// Create a field descriptor
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic type
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Wire tag of exported values
    pub fn wire_tag(&self) -> WireTag {
        self.kind.wire_tag()
    }

    fn export_error(&self, reason: impl Into<String>) -> Error {
        Error::FieldExport {
            field: self.name.clone(),
            kind: self.kind,
            reason: reason.into(),
        }
    }

    fn import_error(&self, reason: impl Into<String>) -> Error {
        Error::FieldImport {
            field: self.name.clone(),
            kind: self.kind,
            reason: reason.into(),
        }
    }

    fn mismatch(&self, value: &Value) -> Error {
        self.export_error(format!("incompatible {} value", value.type_name()))
    }

    fn export_number(&self, number: &Number) -> Result<String, Error> {
        number
            .to_wire()
            .ok_or_else(|| self.export_error(format!("`{number}` cannot be stored as a number")))
    }

    fn import_number(&self, s: &str) -> Result<Number, Error> {
        Number::parse(s).ok_or_else(|| self.import_error(format!("`{s}` is not numeric")))
    }

    /// Convert a typed value into its wire representation
    pub fn export(&self, value: &Value) -> Result<AttributeValue, Error> {
        let exported = match (self.kind, value) {
            (FieldKind::String, Value::String(s)) => AttributeValue::S(s.clone()),
            (FieldKind::Number, Value::Number(n)) => AttributeValue::N(self.export_number(n)?),
            (FieldKind::Number, Value::String(s)) => {
                let n = Number::parse(s)
                    .ok_or_else(|| self.export_error(format!("`{s}` is not numeric")))?;
                AttributeValue::N(self.export_number(&n)?)
            }
            (FieldKind::Boolean, Value::Bool(b)) => {
                AttributeValue::N(if *b { "1" } else { "0" }.to_string())
            }
            (FieldKind::Binary, Value::Binary(bytes)) => {
                AttributeValue::B(Blob::new(bytes.clone()))
            }
            (FieldKind::StringSet, Value::StringSet(members)) => {
                if members.is_empty() {
                    return Err(self.export_error("sets cannot be empty"));
                }
                AttributeValue::Ss(members.clone())
            }
            (FieldKind::NumberSet, Value::NumberSet(members)) => {
                if members.is_empty() {
                    return Err(self.export_error("sets cannot be empty"));
                }
                let members = members
                    .iter()
                    .map(|n| self.export_number(n))
                    .collect::<Result<Vec<_>, _>>()?;
                AttributeValue::Ns(members)
            }
            (FieldKind::BinarySet, Value::BinarySet(members)) => {
                if members.is_empty() {
                    return Err(self.export_error("sets cannot be empty"));
                }
                AttributeValue::Bs(members.iter().cloned().map(Blob::new).collect())
            }
            (FieldKind::Json, Value::Json(json)) => AttributeValue::S(json.to_string()),
            (FieldKind::Document, Value::Json(json)) => {
                if !json.is_object() {
                    return Err(self.export_error("documents must be JSON objects"));
                }
                to_attribute_value::<_, AttributeValue>(json)
                    .map_err(|e| self.export_error(e.to_string()))?
            }
            (FieldKind::Date, Value::Date(date)) => {
                AttributeValue::N(date.timestamp_millis().to_string())
            }
            (_, value) => return Err(self.mismatch(value)),
        };

        Ok(exported)
    }

    /// Convert a wire value back into a typed value
    pub fn import(&self, value: &AttributeValue) -> Result<Value, Error> {
        let imported = match (self.kind, value) {
            (FieldKind::String, AttributeValue::S(s)) => Value::String(s.clone()),
            (FieldKind::Number, AttributeValue::N(s)) => Value::Number(self.import_number(s)?),
            (FieldKind::Boolean, AttributeValue::N(s)) => match s.as_str() {
                "1" => Value::Bool(true),
                "0" => Value::Bool(false),
                other => return Err(self.import_error(format!("`{other}` is not a flag"))),
            },
            (FieldKind::Binary, AttributeValue::B(blob)) => Value::Binary(blob.as_ref().to_vec()),
            (FieldKind::StringSet, AttributeValue::Ss(members)) => {
                Value::StringSet(members.clone())
            }
            (FieldKind::NumberSet, AttributeValue::Ns(members)) => {
                let members = members
                    .iter()
                    .map(|s| self.import_number(s))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::NumberSet(members)
            }
            (FieldKind::BinarySet, AttributeValue::Bs(members)) => {
                Value::BinarySet(members.iter().map(|b| b.as_ref().to_vec()).collect())
            }
            (FieldKind::Json, AttributeValue::S(s)) => Value::Json(
                serde_json::from_str(s).map_err(|e| self.import_error(e.to_string()))?,
            ),
            (FieldKind::Document, AttributeValue::M(_)) => Value::Json(
                from_attribute_value(value.clone()).map_err(|e| self.import_error(e.to_string()))?,
            ),
            (FieldKind::Date, AttributeValue::N(s)) => {
                let date = s
                    .parse::<i64>()
                    .ok()
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
                    .ok_or_else(|| self.import_error(format!("`{s}` is not a timestamp")))?;
                Value::Date(date)
            }
            (_, value) => {
                return Err(self.import_error(format!(
                    "expected {} attribute, got {}",
                    self.wire_tag(),
                    tag_name(value)
                )));
            }
        };

        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn round_trip(kind: FieldKind, value: Value) {
        let field = Field::new("f", kind);
        let exported = field.export(&value).unwrap();
        let imported = field.import(&exported).unwrap();
        assert_eq!(imported, value, "round trip for {kind}");
        assert_eq!(field.export(&imported).unwrap(), exported);
    }

    #[test]
    fn test_round_trip_every_kind() {
        round_trip(FieldKind::String, Value::from("Silence in a Sweater"));
        round_trip(FieldKind::Number, Value::from(30326673248i64));
        round_trip(FieldKind::Number, Value::from(-1.25));
        round_trip(FieldKind::Number, Value::from(2.0));
        round_trip(FieldKind::Boolean, Value::from(true));
        round_trip(FieldKind::Boolean, Value::from(false));
        round_trip(FieldKind::Binary, Value::from(vec![0u8, 1, 255]));
        round_trip(
            FieldKind::StringSet,
            Value::StringSet(vec!["rock".to_string(), "pop".to_string()]),
        );
        round_trip(
            FieldKind::NumberSet,
            Value::NumberSet(vec![Number::Int(1), Number::Float(2.5)]),
        );
        round_trip(
            FieldKind::BinarySet,
            Value::BinarySet(vec![vec![1, 2], vec![3]]),
        );
        round_trip(FieldKind::Json, Value::from(json!({"tags": ["a", "b"], "n": 1})));
        round_trip(
            FieldKind::Document,
            Value::from(json!({"artist": "Anamanaguchi", "plays": 12})),
        );
        round_trip(
            FieldKind::Date,
            Value::from(Utc.timestamp_millis_opt(1350490700640).unwrap()),
        );
    }

    #[test]
    fn test_wire_forms() {
        let flag = Field::new("loved", FieldKind::Boolean);
        assert_eq!(flag.export(&Value::from(true)).unwrap(), AttributeValue::N("1".into()));
        assert_eq!(flag.export(&Value::from(false)).unwrap(), AttributeValue::N("0".into()));

        let number = Field::new("id", FieldKind::Number);
        assert_eq!(number.export(&Value::from(42i64)).unwrap(), AttributeValue::N("42".into()));
        assert_eq!(number.export(&Value::from("0042")).unwrap(), AttributeValue::N("42".into()));

        let json = Field::new("meta", FieldKind::Json);
        assert_eq!(
            json.export(&Value::from(json!({"a": 1}))).unwrap(),
            AttributeValue::S(r#"{"a":1}"#.into())
        );
    }

    #[test]
    fn test_number_import_restores_numeric_type() {
        let field = Field::new("id", FieldKind::Number);
        let value = field.import(&AttributeValue::N("17".into())).unwrap();
        assert_eq!(value, Value::Number(Number::Int(17)));
        assert_eq!(value.as_i64(), Some(17));
    }

    #[test]
    fn test_export_rejects_incompatible_values() {
        let number = Field::new("id", FieldKind::Number);
        assert!(matches!(
            number.export(&Value::from("abc")),
            Err(Error::FieldExport { .. })
        ));
        assert!(matches!(
            number.export(&Value::from(true)),
            Err(Error::FieldExport { .. })
        ));
        assert!(matches!(
            number.export(&Value::from(f64::NAN)),
            Err(Error::FieldExport { .. })
        ));

        let set = Field::new("tags", FieldKind::StringSet);
        assert!(matches!(
            set.export(&Value::StringSet(vec![])),
            Err(Error::FieldExport { .. })
        ));

        let document = Field::new("doc", FieldKind::Document);
        assert!(matches!(
            document.export(&Value::from(json!([1, 2]))),
            Err(Error::FieldExport { .. })
        ));
    }

    #[test]
    fn test_large_numbers_round_trip_exactly() {
        let field = Field::new("id", FieldKind::Number);
        for wire in ["12345678901234567890123", "-98765432109876543210.0123456789", "0.000001"] {
            let imported = field.import(&AttributeValue::N(wire.into())).unwrap();
            assert_eq!(field.export(&imported).unwrap(), AttributeValue::N(wire.into()));
        }

        assert_eq!(
            field.export(&Value::from("10000000000000000001")).unwrap(),
            AttributeValue::N("10000000000000000001".into())
        );
        assert!(matches!(
            field.export(&Value::from("1e200")),
            Err(Error::FieldExport { .. })
        ));

        let set = Field::new("ids", FieldKind::NumberSet);
        let members = AttributeValue::Ns(vec!["18446744073709551616".into(), "3".into()]);
        let imported = set.import(&members).unwrap();
        assert_eq!(set.export(&imported).unwrap(), members);
    }

    #[test]
    fn test_unparsable_content_is_an_import_error() {
        let json = Field::new("meta", FieldKind::Json);
        let err = json.import(&AttributeValue::S("{not json".into())).unwrap_err();
        assert!(matches!(err, Error::FieldImport { ref field, .. } if field == "meta"));

        let number = Field::new("plays", FieldKind::Number);
        assert!(matches!(
            number.import(&AttributeValue::N("many".into())),
            Err(Error::FieldImport { .. })
        ));

        let date = Field::new("at", FieldKind::Date);
        assert!(matches!(
            date.import(&AttributeValue::N("soon".into())),
            Err(Error::FieldImport { .. })
        ));
    }

    #[test]
    fn test_import_rejects_wrong_wire_tag() {
        let number = Field::new("id", FieldKind::Number);
        let err = number.import(&AttributeValue::S("1".into())).unwrap_err();
        assert!(matches!(err, Error::FieldImport { .. }));
        assert!(err.to_string().contains("expected N attribute, got S"));

        let flag = Field::new("loved", FieldKind::Boolean);
        assert!(matches!(
            flag.import(&AttributeValue::N("2".into())),
            Err(Error::FieldImport { .. })
        ));
    }

    #[test]
    fn test_wire_tags() {
        assert_eq!(FieldKind::Boolean.wire_tag(), WireTag::N);
        assert_eq!(FieldKind::Json.wire_tag(), WireTag::S);
        assert_eq!(FieldKind::StringSet.wire_tag().as_str(), "SS");
        assert_eq!(WireTag::Ss.scalar_type(), None);
        assert_eq!(WireTag::N.scalar_type(), Some(ScalarAttributeType::N));
    }
}
