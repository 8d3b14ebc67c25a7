use aws_sdk_dynamodb::types::WriteRequest;
use std::collections::BTreeMap;
use tracing::{debug, error, trace, warn};

use crate::error::Error;
use crate::model::helpers::{BATCH_READ_SIZE, BATCH_WRITE_SIZE, sort_by_request_order};
use crate::model::request;
use crate::model::types::{
    BatchGetRequest, BatchGetResult, CommitResult, DeleteOptions, GetOptions, PutOptions,
    QueryOptions, QueryPage, UpdateOptions, WriteOperation,
};
use crate::model::Model;
use crate::schema::{Item, Record, Schema, Value};
use crate::store::{Operation, Store, StoreError};

pub(crate) fn store_failure<I, A>(operation: Operation, aliases: I, source: StoreError) -> Error
where
    I: IntoIterator<Item = A>,
    A: Into<String>,
{
    let error = Error::store(operation, aliases, source);
    error!(error = %error, "store request failed");
    error
}

fn import_all(schema: &Schema, items: Vec<Item>) -> Result<Vec<Record>, Error> {
    items.iter().map(|item| schema.import(item)).collect()
}

impl<S: Store> Model<S> {
    /// Read one item
    ///
    /// Returns `None` when no item has the key.
    pub async fn get(
        &self,
        alias: &str,
        hash: impl Into<Value>,
        options: GetOptions,
    ) -> Result<Option<Record>, Error> {
        let (table, schema) = self.binding(alias)?;
        let hash = hash.into();
        let input = request::get_item(table, schema, &hash, &options)?;

        debug!(alias, hash = ?hash, "get item");
        trace!(request = ?input, "GetItem");
        let output = self
            .store()
            .get_item(input)
            .await
            .map_err(|e| store_failure(Operation::GetItem, [alias], e))?;

        output.item.map(|item| schema.import(&item)).transpose()
    }

    /// Store `record`, replacing any item with the same key
    ///
    /// Returns the replaced item when `options.return_old` is set.
    pub async fn put(
        &self,
        alias: &str,
        record: &Record,
        options: PutOptions,
    ) -> Result<Option<Record>, Error> {
        let (table, schema) = self.binding(alias)?;
        let input = request::put_item(table, schema, record, &options)?;

        debug!(alias, expectations = options.expected.len(), "put item");
        trace!(request = ?input, "PutItem");
        let output = self
            .store()
            .put_item(input)
            .await
            .map_err(|e| store_failure(Operation::PutItem, [alias], e))?;

        output.attributes.map(|item| schema.import(&item)).transpose()
    }

    /// Delete one item
    ///
    /// Returns the deleted item when `options.return_old` is set.
    pub async fn delete(
        &self,
        alias: &str,
        hash: impl Into<Value>,
        options: DeleteOptions,
    ) -> Result<Option<Record>, Error> {
        let (table, schema) = self.binding(alias)?;
        let hash = hash.into();
        let input = request::delete_item(table, schema, &hash, &options)?;

        debug!(alias, hash = ?hash, "delete item");
        trace!(request = ?input, "DeleteItem");
        let output = self
            .store()
            .delete_item(input)
            .await
            .map_err(|e| store_failure(Operation::DeleteItem, [alias], e))?;

        output.attributes.map(|item| schema.import(&item)).transpose()
    }

    /// Apply attribute updates to one item, creating it if absent
    ///
    /// Returns the attributes selected by `options.return_values`.
    pub async fn update_item(
        &self,
        alias: &str,
        hash: impl Into<Value>,
        options: UpdateOptions,
    ) -> Result<Option<Record>, Error> {
        let (table, schema) = self.binding(alias)?;
        let hash = hash.into();
        let input = request::update_item(table, schema, &hash, &options)?;

        debug!(alias, hash = ?hash, updates = options.updates.len(), "update item");
        trace!(request = ?input, "UpdateItem");
        let output = self
            .store()
            .update_item(input)
            .await
            .map_err(|e| store_failure(Operation::UpdateItem, [alias], e))?;

        output.attributes.map(|item| schema.import(&item)).transpose()
    }

    /// Read one page of the items sharing `hash`
    pub async fn query(
        &self,
        alias: &str,
        hash: impl Into<Value>,
        options: QueryOptions,
    ) -> Result<QueryPage, Error> {
        let (table, schema) = self.binding(alias)?;
        let hash = hash.into();
        let input = request::query(table, schema, &hash, &options)?;

        debug!(alias, hash = ?hash, limit = ?options.limit, "query");
        trace!(request = ?input, "Query");
        let output = self
            .store()
            .query(input)
            .await
            .map_err(|e| store_failure(Operation::Query, [alias], e))?;

        Ok(QueryPage {
            items: import_all(schema, output.items.unwrap_or_default())?,
            last_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }

    /// Range values of every item sharing `hash`, following pagination
    pub(crate) async fn range_values(
        &self,
        alias: &str,
        hash: &Value,
    ) -> Result<Vec<Value>, Error> {
        let schema = self.schema(alias)?;
        let range = schema.range().ok_or_else(|| Error::InvalidSchema {
            alias: alias.to_string(),
            reason: "only range-keyed aliases can be scanned for range values".to_string(),
        })?;

        let mut values = Vec::new();
        let mut start = None;
        loop {
            let options = QueryOptions {
                attributes_to_get: Some(vec![range.name().to_string()]),
                exclusive_start_key: start,
                ..QueryOptions::default()
            };
            let page = self.query(alias, hash.clone(), options).await?;
            values.extend(
                page.items
                    .into_iter()
                    .filter_map(|mut record| record.remove(range.name())),
            );
            match page.last_key {
                Some(key) => start = Some(key),
                None => break,
            }
        }

        debug!(alias, hash = ?hash, found = values.len(), "resolved range values");
        Ok(values)
    }

    /// Send one `BatchWriteItem` with the requests grouped by alias
    ///
    /// Success per alias counts the requests sent minus those the store
    /// returned as unprocessed.
    pub(crate) async fn write_groups(
        &self,
        groups: Vec<(String, Vec<WriteRequest>)>,
    ) -> Result<CommitResult, Error> {
        let mut sent: BTreeMap<String, usize> = BTreeMap::new();
        let mut tables = Vec::with_capacity(groups.len());
        for (alias, requests) in groups {
            *sent.entry(alias.clone()).or_default() += requests.len();
            tables.push((self.table_name(&alias)?.to_string(), requests));
        }
        let input = request::batch_write_item(tables)?;

        debug!(aliases = ?sent, "batch write");
        trace!(request = ?input, "BatchWriteItem");
        let output = self
            .store()
            .batch_write_item(input)
            .await
            .map_err(|e| store_failure(Operation::BatchWriteItem, sent.keys().cloned(), e))?;

        let mut result = CommitResult {
            success: sent,
            unprocessed: BTreeMap::new(),
        };
        for (table, writes) in output.unprocessed_items.unwrap_or_default() {
            if writes.is_empty() {
                continue;
            }
            warn!(table = %table, unprocessed = writes.len(), "store left writes unprocessed");
            if let Some(count) = self
                .alias_for_table(&table)
                .and_then(|alias| result.success.get_mut(alias))
            {
                *count = count.saturating_sub(writes.len());
            }
            let _ = result.unprocessed.insert(table, writes);
        }
        Ok(result)
    }

    /// Send up to 25 puts and deletes as a single `BatchWriteItem`
    ///
    /// Fails with [`Error::BatchTooLarge`] instead of chunking; use
    /// [`Batch`](crate::Batch) for larger sets. Puts are sent before deletes.
    pub async fn batch_write(
        &self,
        operations: Vec<WriteOperation>,
    ) -> Result<CommitResult, Error> {
        if operations.len() > BATCH_WRITE_SIZE {
            return Err(Error::BatchTooLarge {
                operations: operations.len(),
                limit: BATCH_WRITE_SIZE,
            });
        }
        if operations.is_empty() {
            return Ok(CommitResult::default());
        }

        let mut puts: Vec<(String, Vec<WriteRequest>)> = Vec::new();
        let mut deletes: Vec<(String, Vec<WriteRequest>)> = Vec::new();
        for operation in &operations {
            let (groups, request) = match operation {
                WriteOperation::Put { alias, record } => {
                    (&mut puts, request::put_request(self.schema(alias)?, record)?)
                }
                WriteOperation::Delete { alias, key } => {
                    (&mut deletes, request::delete_request(self.schema(alias)?, key)?)
                }
            };
            let alias = operation.alias();
            match groups.iter_mut().find(|(a, _)| a == alias) {
                Some((_, requests)) => requests.push(request),
                None => groups.push((alias.to_string(), vec![request])),
            }
        }
        puts.extend(deletes);

        self.write_groups(puts).await
    }

    /// Read items from several aliases with one `BatchGetItem`
    ///
    /// Items come back per alias in the order their keys were requested; keys
    /// with no item are skipped. Requests for the same alias are combined.
    /// Fails with [`Error::BatchTooLarge`] above 100 keys.
    pub async fn batch_get(&self, requests: Vec<BatchGetRequest>) -> Result<BatchGetResult, Error> {
        let keys: usize = requests.iter().map(|r| r.keys.len()).sum();
        if keys > BATCH_READ_SIZE {
            return Err(Error::BatchTooLarge {
                operations: keys,
                limit: BATCH_READ_SIZE,
            });
        }

        let mut combined: Vec<BatchGetRequest> = Vec::new();
        for request in requests.into_iter().filter(|r| !r.keys.is_empty()) {
            match combined.iter_mut().find(|c| c.alias == request.alias) {
                Some(existing) => {
                    existing.keys.extend(request.keys);
                    existing.consistent_read |= request.consistent_read;
                }
                None => combined.push(request),
            }
        }
        if combined.is_empty() {
            return Ok(BatchGetResult::default());
        }

        let mut entries = Vec::with_capacity(combined.len());
        let mut expected = Vec::with_capacity(combined.len());
        for request in &combined {
            let (table, schema) = self.binding(&request.alias)?;
            let (entry, keys) = request::keys_and_attributes(schema, request)?;
            entries.push((table.name().to_string(), entry));
            expected.push((request.alias.as_str(), table.name(), schema, keys));
        }
        let input = request::batch_get_item(entries)?;

        let aliases: Vec<&str> = combined.iter().map(|r| r.alias.as_str()).collect();
        debug!(aliases = ?aliases, keys, "batch get");
        trace!(request = ?input, "BatchGetItem");
        let output = self
            .store()
            .batch_get_item(input)
            .await
            .map_err(|e| store_failure(Operation::BatchGetItem, aliases.iter().copied(), e))?;

        let mut responses = output.responses.unwrap_or_default();
        let mut result = BatchGetResult::default();
        for (alias, table, schema, keys) in expected {
            let mut key_names = vec![schema.hash().name()];
            key_names.extend(schema.range().map(|f| f.name()));
            let items = responses.remove(table).unwrap_or_default();
            let sorted = sort_by_request_order(items, &keys, &key_names);
            let _ = result
                .items
                .insert(alias.to_string(), import_all(schema, sorted)?);
        }
        for (table, entry) in output.unprocessed_keys.unwrap_or_default() {
            if entry.keys.is_empty() {
                continue;
            }
            warn!(table = %table, unprocessed = entry.keys.len(), "store left keys unprocessed");
            let _ = result.unprocessed.insert(table, entry);
        }
        Ok(result)
    }
}
