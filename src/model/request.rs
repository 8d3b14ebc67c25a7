//! Pure request builders
//!
//! Each function turns a table binding, its schema and the call arguments into
//! the SDK input for one store operation. Every value goes through the schema's
//! fields; optional clauses only appear when the options ask for them.

use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemInput;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemInput;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemInput;
use aws_sdk_dynamodb::operation::get_item::GetItemInput;
use aws_sdk_dynamodb::operation::put_item::PutItemInput;
use aws_sdk_dynamodb::operation::query::QueryInput;
use aws_sdk_dynamodb::operation::update_item::UpdateItemInput;
use aws_sdk_dynamodb::types::{
    AttributeAction, AttributeValueUpdate, ComparisonOperator, Condition, DeleteRequest,
    ExpectedAttributeValue, KeysAndAttributes, PutRequest, ReturnValue, WriteRequest,
};
use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::model::Table;
use crate::model::types::{
    AttributeUpdate, BatchGetRequest, DeleteOptions, Expectation, Expectations, GetOptions,
    PutOptions, QueryOptions, UpdateOptions,
};
use crate::schema::{Item, Record, Schema, Value};

fn attribute_names(
    schema: &Schema,
    names: Option<&Vec<String>>,
) -> Result<Option<Vec<String>>, Error> {
    names
        .map(|names| {
            names
                .iter()
                .map(|name| schema.field(name).map(|field| field.name().to_string()))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()
}

/// `Expected` clause for a conditional write; `None` when there are no expectations
pub fn expected(
    schema: &Schema,
    expectations: &Expectations,
) -> Result<Option<HashMap<String, ExpectedAttributeValue>>, Error> {
    if expectations.is_empty() {
        return Ok(None);
    }

    let mut expected = HashMap::with_capacity(expectations.len());
    for (name, expectation) in expectations {
        let field = schema.field(name)?;
        let clause = match expectation {
            // Exists=true needs a value, so presence alone is a NOT_NULL check
            Expectation::Exists => ExpectedAttributeValue::builder()
                .comparison_operator(ComparisonOperator::NotNull)
                .build(),
            Expectation::NotExists => ExpectedAttributeValue::builder().exists(false).build(),
            Expectation::Equals(value) => ExpectedAttributeValue::builder()
                .exists(true)
                .value(field.export(value)?)
                .build(),
        };
        let _ = expected.insert(name.clone(), clause);
    }
    Ok(Some(expected))
}

/// `AttributeUpdates` clause of an update
pub fn attribute_updates(
    schema: &Schema,
    updates: &BTreeMap<String, AttributeUpdate>,
) -> Result<HashMap<String, AttributeValueUpdate>, Error> {
    let mut clauses = HashMap::with_capacity(updates.len());
    for (name, update) in updates {
        let field = schema.field(name)?;
        let clause = match update {
            AttributeUpdate::Put(value) => AttributeValueUpdate::builder()
                .action(AttributeAction::Put)
                .value(field.export(value)?),
            AttributeUpdate::Add(value) => AttributeValueUpdate::builder()
                .action(AttributeAction::Add)
                .value(field.export(value)?),
            AttributeUpdate::Delete(value) => AttributeValueUpdate::builder()
                .action(AttributeAction::Delete)
                .set_value(value.as_ref().map(|v| field.export(v)).transpose()?),
        };
        let _ = clauses.insert(name.clone(), clause.build());
    }
    Ok(clauses)
}

/// `GetItem` for the item with `hash` (and `options.range`)
pub fn get_item(
    table: &Table,
    schema: &Schema,
    hash: &Value,
    options: &GetOptions,
) -> Result<GetItemInput, Error> {
    Ok(GetItemInput::builder()
        .table_name(table.name())
        .set_key(Some(schema.key(hash, options.range.as_ref())?))
        .set_consistent_read(options.consistent_read.then_some(true))
        .set_attributes_to_get(attribute_names(schema, options.attributes_to_get.as_ref())?)
        .build()?)
}

/// `PutItem` storing `record`, which must carry its key attributes
pub fn put_item(
    table: &Table,
    schema: &Schema,
    record: &Record,
    options: &PutOptions,
) -> Result<PutItemInput, Error> {
    Ok(PutItemInput::builder()
        .table_name(table.name())
        .set_item(Some(schema.export_item(record)?))
        .set_expected(expected(schema, &options.expected)?)
        .set_return_values(options.return_old.then_some(ReturnValue::AllOld))
        .build()?)
}

/// `DeleteItem` for the item with `hash` (and `options.range`)
pub fn delete_item(
    table: &Table,
    schema: &Schema,
    hash: &Value,
    options: &DeleteOptions,
) -> Result<DeleteItemInput, Error> {
    Ok(DeleteItemInput::builder()
        .table_name(table.name())
        .set_key(Some(schema.key(hash, options.range.as_ref())?))
        .set_expected(expected(schema, &options.expected)?)
        .set_return_values(options.return_old.then_some(ReturnValue::AllOld))
        .build()?)
}

/// `UpdateItem` applying `options.updates` to the item with `hash`
pub fn update_item(
    table: &Table,
    schema: &Schema,
    hash: &Value,
    options: &UpdateOptions,
) -> Result<UpdateItemInput, Error> {
    Ok(UpdateItemInput::builder()
        .table_name(table.name())
        .set_key(Some(schema.key(hash, options.range.as_ref())?))
        .set_attribute_updates(Some(attribute_updates(schema, &options.updates)?))
        .set_expected(expected(schema, &options.expected)?)
        .set_return_values(options.return_values.clone())
        .build()?)
}

/// `Query` for the items sharing `hash`
pub fn query(
    table: &Table,
    schema: &Schema,
    hash: &Value,
    options: &QueryOptions,
) -> Result<QueryInput, Error> {
    let mut conditions = HashMap::with_capacity(2);
    let hash_field = schema.hash();
    let _ = conditions.insert(
        hash_field.name().to_string(),
        Condition::builder()
            .comparison_operator(ComparisonOperator::Eq)
            .attribute_value_list(hash_field.export(hash)?)
            .build()?,
    );

    if let Some(condition) = &options.range_condition {
        let range = schema.range().ok_or_else(|| Error::InvalidSchema {
            alias: schema.alias().to_string(),
            reason: "range conditions need a range key".to_string(),
        })?;
        let values = condition
            .values
            .iter()
            .map(|value| range.export(value))
            .collect::<Result<Vec<_>, _>>()?;
        let _ = conditions.insert(
            range.name().to_string(),
            Condition::builder()
                .comparison_operator(condition.operator.clone())
                .set_attribute_value_list(Some(values))
                .build()?,
        );
    }

    Ok(QueryInput::builder()
        .table_name(table.name())
        .set_key_conditions(Some(conditions))
        .set_limit(
            options
                .limit
                .map(|limit| i32::try_from(limit).unwrap_or(i32::MAX)),
        )
        .set_consistent_read(options.consistent_read.then_some(true))
        .set_scan_index_forward(options.scan_index_forward)
        .set_exclusive_start_key(options.exclusive_start_key.clone())
        .set_attributes_to_get(attribute_names(schema, options.attributes_to_get.as_ref())?)
        .build()?)
}

/// Key list for one table of a `BatchGetItem`, along with the exported keys in request order
pub fn keys_and_attributes(
    schema: &Schema,
    request: &BatchGetRequest,
) -> Result<(KeysAndAttributes, Vec<Item>), Error> {
    let keys = request
        .keys
        .iter()
        .map(|(hash, range)| schema.key(hash, range.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    // Results are matched back to their keys, so a projection always keeps the key attributes
    let attributes = attribute_names(schema, request.attributes_to_get.as_ref())?.map(|mut names| {
        for key in std::iter::once(schema.hash()).chain(schema.range()) {
            if !names.iter().any(|name| name == key.name()) {
                names.push(key.name().to_string());
            }
        }
        names
    });

    let entry = KeysAndAttributes::builder()
        .set_keys(Some(keys.clone()))
        .set_consistent_read(request.consistent_read.then_some(true))
        .set_attributes_to_get(attributes)
        .build()?;
    Ok((entry, keys))
}

/// `BatchGetItem` reading every key list, each under its table name
pub fn batch_get_item(
    tables: impl IntoIterator<Item = (String, KeysAndAttributes)>,
) -> Result<BatchGetItemInput, Error> {
    Ok(BatchGetItemInput::builder()
        .set_request_items(Some(tables.into_iter().collect()))
        .build()?)
}

/// Put request for one record
pub fn put_request(schema: &Schema, record: &Record) -> Result<WriteRequest, Error> {
    Ok(WriteRequest::builder()
        .put_request(
            PutRequest::builder()
                .set_item(Some(schema.export_item(record)?))
                .build()?,
        )
        .build())
}

/// Delete request for the item identified by the key attributes of `key`
pub fn delete_request(schema: &Schema, key: &Record) -> Result<WriteRequest, Error> {
    Ok(WriteRequest::builder()
        .delete_request(
            DeleteRequest::builder()
                .set_key(Some(schema.export_key(key)?))
                .build()?,
        )
        .build())
}

/// `BatchWriteItem` sending each group of requests to its table
///
/// Groups for the same table are concatenated in order.
pub fn batch_write_item(
    groups: impl IntoIterator<Item = (String, Vec<WriteRequest>)>,
) -> Result<BatchWriteItemInput, Error> {
    let mut request_items: HashMap<String, Vec<WriteRequest>> = HashMap::new();
    for (table, requests) in groups {
        request_items.entry(table).or_default().extend(requests);
    }
    Ok(BatchWriteItemInput::builder()
        .set_request_items(Some(request_items))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::RangeCondition;
    use crate::schema::FieldKind;
    use aws_sdk_dynamodb::types::AttributeValue;

    fn song() -> (Table, Schema) {
        let schema = Schema::builder("song", "songs")
            .hash("id", FieldKind::Number)
            .field("title", FieldKind::String)
            .field("loved", FieldKind::Boolean)
            .field("tags", FieldKind::StringSet)
            .build()
            .unwrap();
        (Table::bind(&schema, "test_"), schema)
    }

    fn edit() -> (Table, Schema) {
        let schema = Schema::builder("edit", "song_edits")
            .hash("song_id", FieldKind::Number)
            .range("created", FieldKind::Number)
            .build()
            .unwrap();
        (Table::bind(&schema, ""), schema)
    }

    #[test]
    fn test_get_omits_absent_options() {
        let (table, schema) = song();
        let input = get_item(&table, &schema, &Value::from(1i64), &GetOptions::default()).unwrap();

        assert_eq!(input.table_name.as_deref(), Some("test_songs"));
        assert_eq!(
            input.key.unwrap()["id"],
            AttributeValue::N("1".to_string())
        );
        assert_eq!(input.consistent_read, None);
        assert_eq!(input.attributes_to_get, None);
    }

    #[test]
    fn test_get_with_options() {
        let (table, schema) = song();
        let options = GetOptions {
            consistent_read: true,
            attributes_to_get: Some(vec!["title".to_string()]),
            ..GetOptions::default()
        };
        let input = get_item(&table, &schema, &Value::from(1i64), &options).unwrap();
        assert_eq!(input.consistent_read, Some(true));
        assert_eq!(input.attributes_to_get, Some(vec!["title".to_string()]));

        let options = GetOptions {
            attributes_to_get: Some(vec!["artist".to_string()]),
            ..GetOptions::default()
        };
        let err = get_item(&table, &schema, &Value::from(1i64), &options).unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }

    #[test]
    fn test_range_key_required() {
        let (table, schema) = edit();
        let err = get_item(&table, &schema, &Value::from(1i64), &GetOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref field, .. } if field == "created"));
    }

    #[test]
    fn test_expectations() {
        let (_, schema) = song();
        let expectations = Expectations::from([
            ("id".to_string(), Expectation::NotExists),
            ("title".to_string(), Expectation::Equals(Value::from("A"))),
            ("loved".to_string(), Expectation::Exists),
        ]);
        let clauses = expected(&schema, &expectations).unwrap().unwrap();

        assert_eq!(clauses["id"].exists, Some(false));
        assert_eq!(clauses["id"].value, None);
        assert_eq!(clauses["title"].exists, Some(true));
        assert_eq!(clauses["title"].value, Some(AttributeValue::S("A".to_string())));
        assert_eq!(
            clauses["loved"].comparison_operator,
            Some(ComparisonOperator::NotNull)
        );

        assert_eq!(expected(&schema, &Expectations::new()).unwrap(), None);

        let unknown = Expectations::from([("artist".to_string(), Expectation::Exists)]);
        assert!(matches!(
            expected(&schema, &unknown),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn test_put_requires_hash() {
        let (table, schema) = song();
        let record = Record::from([("title".to_string(), Value::from("A"))]);
        let err = put_item(&table, &schema, &record, &PutOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingKey { .. }));
    }

    #[test]
    fn test_put_return_old() {
        let (table, schema) = song();
        let record = Record::from([("id".to_string(), Value::from(1i64))]);
        let options = PutOptions {
            return_old: true,
            ..PutOptions::default()
        };
        let input = put_item(&table, &schema, &record, &options).unwrap();
        assert_eq!(input.return_values, Some(ReturnValue::AllOld));
        assert_eq!(input.expected, None);
    }

    #[test]
    fn test_update_actions() {
        let (table, schema) = song();
        let options = UpdateOptions {
            updates: BTreeMap::from([
                ("title".to_string(), AttributeUpdate::Put(Value::from("B"))),
                ("loved".to_string(), AttributeUpdate::Delete(None)),
                (
                    "tags".to_string(),
                    AttributeUpdate::Add(Value::StringSet(vec!["live".to_string()])),
                ),
            ]),
            ..UpdateOptions::default()
        };
        let input = update_item(&table, &schema, &Value::from(1i64), &options).unwrap();
        let updates = input.attribute_updates.unwrap();

        assert_eq!(updates["title"].action, Some(AttributeAction::Put));
        assert_eq!(updates["loved"].action, Some(AttributeAction::Delete));
        assert_eq!(updates["loved"].value, None);
        assert_eq!(
            updates["tags"].value,
            Some(AttributeValue::Ss(vec!["live".to_string()]))
        );
    }

    #[test]
    fn test_query_conditions() {
        let (table, schema) = edit();
        let options = QueryOptions {
            range_condition: Some(RangeCondition::between(10i64, 20i64)),
            limit: Some(5),
            scan_index_forward: Some(false),
            ..QueryOptions::default()
        };
        let input = query(&table, &schema, &Value::from(1i64), &options).unwrap();
        let conditions = input.key_conditions.unwrap();

        assert_eq!(conditions["song_id"].comparison_operator, ComparisonOperator::Eq);
        assert_eq!(
            conditions["created"].attribute_value_list,
            Some(vec![
                AttributeValue::N("10".to_string()),
                AttributeValue::N("20".to_string())
            ])
        );
        assert_eq!(input.limit, Some(5));
        assert_eq!(input.scan_index_forward, Some(false));
        assert_eq!(input.consistent_read, None);
        assert_eq!(input.exclusive_start_key, None);
    }

    #[test]
    fn test_query_range_condition_on_hash_only_alias() {
        let (table, schema) = song();
        let options = QueryOptions {
            range_condition: Some(RangeCondition::gt(1i64)),
            ..QueryOptions::default()
        };
        let err = query(&table, &schema, &Value::from(1i64), &options).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
    }

    #[test]
    fn test_batch_get_projection_keeps_keys() {
        let (_, schema) = edit();
        let request = BatchGetRequest::new("edit")
            .key_with_range(1i64, 10i64)
            .key_with_range(1i64, 20i64)
            .fields(["song_id"]);
        let (entry, keys) = keys_and_attributes(&schema, &request).unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(entry.keys, keys);
        assert_eq!(
            entry.attributes_to_get,
            Some(vec!["song_id".to_string(), "created".to_string()])
        );
        assert_eq!(entry.consistent_read, None);
    }

    #[test]
    fn test_batch_write_groups_by_table() {
        let (_, schema) = song();
        let put = put_request(
            &schema,
            &Record::from([("id".to_string(), Value::from(1i64))]),
        )
        .unwrap();
        let delete = delete_request(
            &schema,
            &Record::from([("id".to_string(), Value::from(2i64))]),
        )
        .unwrap();

        let input = batch_write_item([
            ("songs".to_string(), vec![put.clone()]),
            ("songs".to_string(), vec![delete.clone()]),
        ])
        .unwrap();
        assert_eq!(input.request_items.unwrap()["songs"], vec![put, delete]);
    }
}
