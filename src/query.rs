//! Chained query and update builders
//!
//! [`Query`] and [`UpdateQuery`] collect options step by step and hand them to
//! [`Model::query`] and [`Model::update_item`]. Errors found while chaining are
//! returned by the terminal call.

use aws_sdk_dynamodb::types::{ComparisonOperator, ReturnValue};
use tracing::debug;

use crate::error::Error;
use crate::model::{
    AttributeUpdate, Expectation, Model, QueryOptions, QueryPage, RangeCondition, UpdateOptions,
};
use crate::schema::{Item, Record, Value};
use crate::store::Store;

/// Key-condition query over the items sharing one hash
///
/// # Example
///
/// ```no_run
/// # async fn example(model: &dynamo_model::Model) -> Result<(), dynamo_model::Error> {
/// let page = model
///     .objects("edit", 1)
///     .range_gt(100)
///     .reverse()
///     .limit(10)
///     .fetch()
///     .await?;
///
/// for edit in &page.items {
///     println!("{edit:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Query<'a, S> {
    model: &'a Model<S>,
    alias: String,
    hash: Value,
    options: QueryOptions,
}

/// Attribute-level update of one item
#[derive(Debug)]
pub struct UpdateQuery<'a, S> {
    model: &'a Model<S>,
    alias: String,
    hash: Value,
    options: UpdateOptions,
}

impl<S: Store> Model<S> {
    /// Start a query on the items of `alias` under `hash`
    pub fn objects(&self, alias: &str, hash: impl Into<Value>) -> Query<'_, S> {
        Query {
            model: self,
            alias: alias.to_string(),
            hash: hash.into(),
            options: QueryOptions::default(),
        }
    }

    /// Start an update of the item of `alias` under `hash`
    pub fn update(&self, alias: &str, hash: impl Into<Value>) -> UpdateQuery<'_, S> {
        UpdateQuery {
            model: self,
            alias: alias.to_string(),
            hash: hash.into(),
            options: UpdateOptions::default(),
        }
    }
}

impl<S: Store> Query<'_, S> {
    /// Restrict the range key with `operator`
    pub fn range(
        mut self,
        operator: ComparisonOperator,
        values: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.options.range_condition = Some(RangeCondition::new(operator, values));
        self
    }

    /// Range equals `value`
    pub fn range_eq(mut self, value: impl Into<Value>) -> Self {
        self.options.range_condition = Some(RangeCondition::eq(value));
        self
    }

    /// Range lower than `value`
    pub fn range_lt(mut self, value: impl Into<Value>) -> Self {
        self.options.range_condition = Some(RangeCondition::lt(value));
        self
    }

    /// Range lower than or equal to `value`
    pub fn range_le(mut self, value: impl Into<Value>) -> Self {
        self.options.range_condition = Some(RangeCondition::le(value));
        self
    }

    /// Range greater than `value`
    pub fn range_gt(mut self, value: impl Into<Value>) -> Self {
        self.options.range_condition = Some(RangeCondition::gt(value));
        self
    }

    /// Range greater than or equal to `value`
    pub fn range_ge(mut self, value: impl Into<Value>) -> Self {
        self.options.range_condition = Some(RangeCondition::ge(value));
        self
    }

    /// Range within `low..=high`
    pub fn range_between(mut self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.options.range_condition = Some(RangeCondition::between(low, high));
        self
    }

    /// Range starts with `prefix`
    pub fn range_begins_with(mut self, prefix: impl Into<Value>) -> Self {
        self.options.range_condition = Some(RangeCondition::begins_with(prefix));
        self
    }

    /// Return at most `limit` items per page
    pub fn limit(mut self, limit: u32) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Read with strong consistency
    pub fn consistent(mut self) -> Self {
        self.options.consistent_read = true;
        self
    }

    /// Return items in descending range order
    pub fn reverse(mut self) -> Self {
        self.options.scan_index_forward = Some(false);
        self
    }

    /// Only return these attributes
    pub fn fields<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.options.attributes_to_get = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Resume after `key`, as returned in [`QueryPage::last_key`]
    pub fn start_after(mut self, key: Item) -> Self {
        self.options.exclusive_start_key = Some(key);
        self
    }

    /// Read one page
    pub async fn fetch(self) -> Result<QueryPage, Error> {
        self.model.query(&self.alias, self.hash, self.options).await
    }

    /// Read every page, following the last evaluated key
    ///
    /// With a limit set, each request reads at most `limit` items.
    pub async fn fetch_all(self) -> Result<Vec<Record>, Error> {
        let mut items = Vec::new();
        let mut options = self.options;
        let mut pages = 0usize;
        loop {
            let page = self
                .model
                .query(&self.alias, self.hash.clone(), options.clone())
                .await?;
            pages += 1;
            items.extend(page.items);
            match page.last_key {
                Some(key) => options.exclusive_start_key = Some(key),
                None => break,
            }
        }
        debug!(alias = %self.alias, pages, items = items.len(), "query exhausted");
        Ok(items)
    }
}

impl<S: Store> UpdateQuery<'_, S> {
    fn change(mut self, field: &str, update: AttributeUpdate) -> Self {
        let _ = self.options.updates.insert(field.to_string(), update);
        self
    }

    fn expect(mut self, field: &str, expectation: Expectation) -> Self {
        let _ = self.options.expected.insert(field.to_string(), expectation);
        self
    }

    /// Range key of the item, required for range-keyed aliases
    pub fn range(mut self, value: impl Into<Value>) -> Self {
        self.options.range = Some(value.into());
        self
    }

    /// Replace `field` with `value`
    pub fn set(self, field: &str, value: impl Into<Value>) -> Self {
        self.change(field, AttributeUpdate::Put(value.into()))
    }

    /// Add `value` to a number, or union it into a set
    pub fn add(self, field: &str, value: impl Into<Value>) -> Self {
        self.change(field, AttributeUpdate::Add(value.into()))
    }

    /// Remove the members of `value` from a set
    pub fn delete_from(self, field: &str, value: impl Into<Value>) -> Self {
        self.change(field, AttributeUpdate::Delete(Some(value.into())))
    }

    /// Remove `field` from the item
    pub fn remove(self, field: &str) -> Self {
        self.change(field, AttributeUpdate::Delete(None))
    }

    /// Only update if the stored item has `field`
    pub fn should_exist(self, field: &str) -> Self {
        self.expect(field, Expectation::Exists)
    }

    /// Only update if the stored item lacks `field`
    pub fn should_not_exist(self, field: &str) -> Self {
        self.expect(field, Expectation::NotExists)
    }

    /// Only update if the stored item's `field` equals `value`
    pub fn should_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.expect(field, Expectation::Equals(value.into()))
    }

    /// Which attributes the commit returns
    pub fn returning(mut self, values: ReturnValue) -> Self {
        self.options.return_values = Some(values);
        self
    }

    /// Send the update
    ///
    /// Returns the attributes selected by [`returning`](UpdateQuery::returning),
    /// or `None` when nothing was asked for.
    pub async fn commit(self) -> Result<Option<Record>, Error> {
        self.model
            .update_item(&self.alias, self.hash, self.options)
            .await
    }
}
