//! Declarative record schemas and field marshaling
//!
//! A [`Schema`] names a table alias, its physical table name, the hash key field,
//! the optional range key field and every other field the record carries. All
//! conversion between [`Record`]s and the store's `AttributeValue` items goes
//! through the schema's [`Field`]s.

mod field;
mod typed;
mod value;

pub use field::{Field, FieldKind, WireTag};
pub use value::{Number, Record, Value};
pub(crate) use value::{Decimal, compare_numbers};

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

use crate::error::Error;

/// Wire item: attribute name to wire value
pub type Item = HashMap<String, AttributeValue>;

/// Provisioned throughput used when the table is created from the schema
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Throughput {
    /// Read capacity units
    pub read: i64,
    /// Write capacity units
    pub write: i64,
}

impl Default for Throughput {
    fn default() -> Self {
        Self {
            read: 10,
            write: 10,
        }
    }
}

/// Field set of one logical record type
#[derive(Clone, Debug)]
pub struct Schema {
    alias: String,
    table_name: String,
    hash: usize,
    range: Option<usize>,
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    throughput: Throughput,
}

impl Schema {
    /// Start defining a schema for `alias`, stored in `table_name`
    ///
    /// # Example
    ///
    /// ```
    /// use dynamo_model::schema::{FieldKind, Schema};
    ///
    /// let schema = Schema::builder("song", "songs")
    ///     .hash("id", FieldKind::Number)
    ///     .field("title", FieldKind::String)
    ///     .field("loved", FieldKind::Boolean)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(schema.hash().name(), "id");
    /// assert!(schema.range().is_none());
    /// ```
    pub fn builder(alias: impl Into<String>, table_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            alias: alias.into(),
            table_name: table_name.into(),
            hash: None,
            range: None,
            fields: Vec::new(),
            throughput: Throughput::default(),
        }
    }

    /// Logical table name
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Table name before the connection prefix is applied
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Hash key field
    pub fn hash(&self) -> &Field {
        &self.fields[self.hash]
    }

    /// Range key field, if the table has one
    pub fn range(&self) -> Option<&Field> {
        self.range.map(|index| &self.fields[index])
    }

    /// All fields in definition order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Provisioned throughput for table creation
    pub fn throughput(&self) -> Throughput {
        self.throughput
    }

    /// Whether the schema declares `name`
    pub fn has_field(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Result<&Field, Error> {
        self.by_name
            .get(name)
            .map(|index| &self.fields[*index])
            .ok_or_else(|| Error::UnknownField {
                alias: self.alias.clone(),
                field: name.to_string(),
            })
    }

    fn missing(&self, field: &Field) -> Error {
        Error::MissingKey {
            alias: self.alias.clone(),
            field: field.name().to_string(),
        }
    }

    /// Export every attribute of `record` the schema knows
    ///
    /// Attributes the schema does not declare are skipped, so partial records
    /// (e.g. the attributes of an update) export without error.
    pub fn export(&self, record: &Record) -> Result<Item, Error> {
        let mut item = Item::with_capacity(record.len());
        for (name, value) in record {
            if let Some(index) = self.by_name.get(name) {
                let _ = item.insert(name.clone(), self.fields[*index].export(value)?);
            }
        }
        Ok(item)
    }

    /// Export a full item, which must carry the hash key and, if defined, the range key
    pub fn export_item(&self, record: &Record) -> Result<Item, Error> {
        let item = self.export(record)?;
        for key in std::iter::once(self.hash()).chain(self.range()) {
            if !item.contains_key(key.name()) {
                return Err(self.missing(key));
            }
        }
        Ok(item)
    }

    /// Export only the key attributes of `record`
    pub fn export_key(&self, record: &Record) -> Result<Item, Error> {
        let hash = record
            .get(self.hash().name())
            .ok_or_else(|| self.missing(self.hash()))?;
        let range = match self.range() {
            Some(range) => Some(record.get(range.name()).ok_or_else(|| self.missing(range))?),
            None => None,
        };
        self.key(hash, range)
    }

    /// Build a key from a hash value and, for range-keyed schemas, a range value
    ///
    /// A range value passed to a schema without range key is ignored.
    pub fn key(&self, hash: &Value, range: Option<&Value>) -> Result<Item, Error> {
        let mut key = Item::with_capacity(2);
        let _ = key.insert(self.hash().name().to_string(), self.hash().export(hash)?);
        if let Some(field) = self.range() {
            let range = range.ok_or_else(|| self.missing(field))?;
            let _ = key.insert(field.name().to_string(), field.export(range)?);
        }
        Ok(key)
    }

    /// Import a wire item; attributes without a matching field are dropped
    pub fn import(&self, item: &Item) -> Result<Record, Error> {
        let mut record = Record::new();
        for (name, value) in item {
            if let Some(index) = self.by_name.get(name) {
                let _ = record.insert(name.clone(), self.fields[*index].import(value)?);
            }
        }
        Ok(record)
    }
}

/// Builder for [`Schema`]
#[derive(Debug)]
pub struct SchemaBuilder {
    alias: String,
    table_name: String,
    hash: Option<Field>,
    range: Option<Field>,
    fields: Vec<Field>,
    throughput: Throughput,
}

impl SchemaBuilder {
    /// Hash key field
    pub fn hash(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.hash = Some(Field::new(name, kind));
        self
    }

    /// Range key field
    pub fn range(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.range = Some(Field::new(name, kind));
        self
    }

    /// Non-key field
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field::new(name, kind));
        self
    }

    /// Provisioned throughput used by table setup
    pub fn throughput(mut self, read: i64, write: i64) -> Self {
        self.throughput = Throughput { read, write };
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidSchema {
            alias: self.alias.clone(),
            reason: reason.into(),
        }
    }

    /// Validate and build the schema
    pub fn build(self) -> Result<Schema, Error> {
        let hash = self
            .hash
            .clone()
            .ok_or_else(|| self.invalid("no hash key field"))?;

        for key in std::iter::once(&hash).chain(self.range.as_ref()) {
            if key.wire_tag().scalar_type().is_none() {
                return Err(self.invalid(format!(
                    "key field `{}` must be a string, number or binary kind, not {}",
                    key.name(),
                    key.kind()
                )));
            }
        }

        let mut fields = Vec::with_capacity(self.fields.len() + 2);
        fields.push(hash);
        fields.extend(self.range.clone());
        fields.extend(self.fields.iter().cloned());

        let mut by_name = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if by_name.insert(field.name().to_string(), index).is_some() {
                return Err(self.invalid(format!("field `{}` is defined twice", field.name())));
            }
        }

        Ok(Schema {
            alias: self.alias,
            table_name: self.table_name,
            hash: 0,
            range: self.range.map(|_| 1),
            fields,
            by_name,
            throughput: self.throughput,
        })
    }
}
