//! Conditional single-record insert, upgradeable to a bulk insert
//!
//! An [`Inserter`] builds one record and writes it with `PutItem`, optionally
//! guarded by expectations on the stored item. Calling
//! [`insert`](Inserter::insert) with another alias turns it into a
//! [`BulkInserter`] that sends every record through the batch engine.

use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::model::{Batch, CommitResult, Expectation, Expectations, Model, PutOptions};
use crate::schema::{Record, Value};
use crate::store::Store;

/// Builder for one conditional put
///
/// # Example
///
/// ```no_run
/// # async fn example(model: &dynamo_model::Model) -> Result<(), dynamo_model::Error> {
/// let stored = model
///     .inserter("song")
///     .set("id", 1)
///     .set("title", "Silent Running")
///     .should_not_exist("id")
///     .commit()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Inserter<'a, S> {
    model: &'a Model<S>,
    alias: String,
    record: Record,
    expected: Expectations,
    error: Option<Error>,
}

impl<S: Store> Model<S> {
    /// Start a conditional insert into `alias`
    pub fn inserter(&self, alias: &str) -> Inserter<'_, S> {
        Inserter {
            model: self,
            alias: alias.to_string(),
            record: Record::new(),
            expected: Expectations::new(),
            error: self.schema(alias).err(),
        }
    }
}

impl<'a, S: Store> Inserter<'a, S> {
    fn expect(mut self, field: &str, expectation: Expectation) -> Self {
        let _ = self.expected.insert(field.to_string(), expectation);
        self
    }

    /// Only write if the stored item has `field`
    pub fn should_exist(self, field: &str) -> Self {
        self.expect(field, Expectation::Exists)
    }

    /// Only write if the stored item lacks `field`
    ///
    /// Expecting the hash key to be absent makes the insert fail when the item
    /// already exists.
    pub fn should_not_exist(self, field: &str) -> Self {
        self.expect(field, Expectation::NotExists)
    }

    /// Only write if the stored item's `field` equals `value`
    pub fn should_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.expect(field, Expectation::Equals(value.into()))
    }

    /// Copy the attributes of `record` that the schema declares
    pub fn from(mut self, record: &Record) -> Self {
        if let Ok(schema) = self.model.schema(&self.alias) {
            self.record.extend(
                record
                    .iter()
                    .filter(|(name, _)| schema.has_field(name))
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }
        self
    }

    /// Copy the schema's attributes out of a serializable value
    pub fn from_value<T: Serialize>(mut self, value: &T) -> Self {
        let record = match self.model.schema(&self.alias) {
            Ok(schema) => schema.record_from(value),
            Err(_) => return self,
        };
        match record {
            Ok(record) => self.from(&record),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
                self
            }
        }
    }

    /// Set one attribute
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        let _ = self.record.insert(field.to_string(), value.into());
        self
    }

    /// Set every attribute of `record`
    pub fn set_all(mut self, record: Record) -> Self {
        self.record.extend(record);
        self
    }

    /// Write the record, returning it as stored
    pub async fn commit(self) -> Result<Record, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let options = PutOptions {
            expected: self.expected,
            return_old: false,
        };
        let _ = self.model.put(&self.alias, &self.record, options).await?;
        Ok(self.record)
    }

    /// Switch to a bulk insert, continuing with records for `alias`
    ///
    /// The record built so far is queued first. Fails with
    /// [`Error::UnsupportedUpgrade`] when expectations were set, since batch
    /// writes cannot be conditional.
    pub fn insert(self, alias: &str) -> Result<BulkInserter<'a, S>, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if !self.expected.is_empty() {
            return Err(Error::UnsupportedUpgrade { alias: self.alias });
        }

        debug!(from = %self.alias, to = alias, "upgrading to bulk insert");
        Ok(BulkInserter {
            batch: self.model.batch().insert(&self.alias, self.record),
            alias: alias.to_string(),
        })
    }
}

/// Unconditional puts across aliases, sent through a [`Batch`]
#[derive(Debug)]
pub struct BulkInserter<'a, S> {
    batch: Batch<'a, S>,
    alias: String,
}

impl<'a, S: Store> BulkInserter<'a, S> {
    /// Queue the following records for `alias`
    pub fn insert(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    /// Queue `record` for the current alias
    pub fn set(mut self, record: Record) -> Self {
        self.batch = self.batch.insert(&self.alias, record);
        self
    }

    /// Cap each `BatchWriteItem` at `size` puts
    pub fn chunk(mut self, size: usize) -> Self {
        self.batch = self.batch.chunk(size);
        self
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether no record is queued
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Send every queued record
    pub async fn commit(self) -> Result<CommitResult, Error> {
        self.batch.commit().await
    }
}
