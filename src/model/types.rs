use aws_sdk_dynamodb::types::{ComparisonOperator, KeysAndAttributes, ReturnValue, WriteRequest};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::schema::{Item, Record, Value};

/// Condition an attribute must meet for a conditional write to apply
#[derive(Clone, Debug, PartialEq)]
pub enum Expectation {
    /// The attribute must be present
    Exists,
    /// The attribute must be absent
    NotExists,
    /// The attribute must hold this value
    Equals(Value),
}

/// Expectations keyed by attribute name
pub type Expectations = BTreeMap<String, Expectation>;

/// Attribute-level change applied by an update
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeUpdate {
    /// Replace the attribute's value
    Put(Value),
    /// Add to a number, or union into a set
    Add(Value),
    /// Remove members from a set, or the whole attribute when `None`
    Delete(Option<Value>),
}

/// Options for a single-item read
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetOptions {
    /// Range key value, required for range-keyed aliases
    pub range: Option<Value>,
    /// Strongly consistent read
    pub consistent_read: bool,
    /// Attributes to return; all when `None`
    pub attributes_to_get: Option<Vec<String>>,
}

/// Options for a single-item write
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutOptions {
    /// Conditions the stored item must meet
    pub expected: Expectations,
    /// Return the item this write replaced
    pub return_old: bool,
}

/// Options for a single-item delete
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteOptions {
    /// Range key value, required for range-keyed aliases
    pub range: Option<Value>,
    /// Conditions the stored item must meet
    pub expected: Expectations,
    /// Return the deleted item
    pub return_old: bool,
}

/// Options for an attribute-level update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOptions {
    /// Range key value, required for range-keyed aliases
    pub range: Option<Value>,
    /// Changes keyed by attribute name
    pub updates: BTreeMap<String, AttributeUpdate>,
    /// Conditions the stored item must meet
    pub expected: Expectations,
    /// Which attributes the store returns
    pub return_values: Option<ReturnValue>,
}

/// Condition on the range key of a query
#[derive(Clone, Debug, PartialEq)]
pub struct RangeCondition {
    /// Comparison applied to the range attribute
    pub operator: ComparisonOperator,
    /// Operands; two for `BETWEEN`, one otherwise
    pub values: Vec<Value>,
}

impl RangeCondition {
    /// Condition with an arbitrary operator
    pub fn new(operator: ComparisonOperator, values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            operator,
            values: values.into_iter().collect(),
        }
    }

    /// Range equals `value`
    pub fn eq(value: impl Into<Value>) -> Self {
        Self::new(ComparisonOperator::Eq, [value.into()])
    }

    /// Range lower than `value`
    pub fn lt(value: impl Into<Value>) -> Self {
        Self::new(ComparisonOperator::Lt, [value.into()])
    }

    /// Range lower than or equal to `value`
    pub fn le(value: impl Into<Value>) -> Self {
        Self::new(ComparisonOperator::Le, [value.into()])
    }

    /// Range greater than `value`
    pub fn gt(value: impl Into<Value>) -> Self {
        Self::new(ComparisonOperator::Gt, [value.into()])
    }

    /// Range greater than or equal to `value`
    pub fn ge(value: impl Into<Value>) -> Self {
        Self::new(ComparisonOperator::Ge, [value.into()])
    }

    /// Range within `low..=high`
    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(ComparisonOperator::Between, [low.into(), high.into()])
    }

    /// Range starts with `prefix`
    pub fn begins_with(prefix: impl Into<Value>) -> Self {
        Self::new(ComparisonOperator::BeginsWith, [prefix.into()])
    }
}

/// Options for a key-condition query
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    /// Condition on the range key
    pub range_condition: Option<RangeCondition>,
    /// Maximum number of items in one page
    pub limit: Option<u32>,
    /// Strongly consistent read
    pub consistent_read: bool,
    /// `Some(false)` returns items in descending range order
    pub scan_index_forward: Option<bool>,
    /// Resume after this key, as returned in [`QueryPage::last_key`]
    pub exclusive_start_key: Option<Item>,
    /// Attributes to return; all when `None`
    pub attributes_to_get: Option<Vec<String>>,
}

/// One page of query results
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage {
    /// Imported items in range order
    pub items: Vec<Record>,
    /// Key to resume from, if the store stopped early
    pub last_key: Option<Item>,
}

/// Write accepted by [`Model::batch_write`](crate::Model::batch_write)
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    /// Put a full record
    Put {
        /// Target alias
        alias: String,
        /// Record to store
        record: Record,
    },
    /// Delete by full key
    Delete {
        /// Target alias
        alias: String,
        /// Hash and, for range-keyed aliases, range values
        key: Record,
    },
}

impl WriteOperation {
    /// Put `record` into `alias`
    pub fn put(alias: impl Into<String>, record: Record) -> Self {
        WriteOperation::Put {
            alias: alias.into(),
            record,
        }
    }

    /// Delete the item of `alias` identified by `key`
    pub fn delete(alias: impl Into<String>, key: Record) -> Self {
        WriteOperation::Delete {
            alias: alias.into(),
            key,
        }
    }

    /// Target alias
    pub fn alias(&self) -> &str {
        match self {
            WriteOperation::Put { alias, .. } | WriteOperation::Delete { alias, .. } => alias,
        }
    }
}

/// Keys to read from one alias in a batch get
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetRequest {
    /// Source alias
    pub alias: String,
    /// Hash values, paired with range values for range-keyed aliases
    pub keys: Vec<(Value, Option<Value>)>,
    /// Strongly consistent read
    pub consistent_read: bool,
    /// Attributes to return; all when `None`
    pub attributes_to_get: Option<Vec<String>>,
}

impl BatchGetRequest {
    /// Empty request for `alias`
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Self::default()
        }
    }

    /// Request the item with this hash
    pub fn key(mut self, hash: impl Into<Value>) -> Self {
        self.keys.push((hash.into(), None));
        self
    }

    /// Request the item with this hash and range
    pub fn key_with_range(mut self, hash: impl Into<Value>, range: impl Into<Value>) -> Self {
        self.keys.push((hash.into(), Some(range.into())));
        self
    }

    /// Read with strong consistency
    pub fn consistent(mut self) -> Self {
        self.consistent_read = true;
        self
    }

    /// Only return these attributes
    pub fn fields<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.attributes_to_get = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Items returned by a batch get
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetResult {
    /// Items per alias, in requested key order; keys not found are omitted
    pub items: BTreeMap<String, Vec<Record>>,
    /// Keys the store did not read, per physical table
    pub unprocessed: BTreeMap<String, KeysAndAttributes>,
}

impl BatchGetResult {
    /// Items read for `alias`
    pub fn items(&self, alias: &str) -> &[Record] {
        self.items.get(alias).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether every requested key was read
    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

/// Outcome of a batch write commit
#[must_use = "commit results carry unprocessed writes that should be checked"]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitResult {
    /// Applied operations per alias
    pub success: BTreeMap<String, usize>,
    /// Writes the store accepted but did not apply, per physical table
    pub unprocessed: BTreeMap<String, Vec<WriteRequest>>,
}

impl CommitResult {
    /// Fold `other` into this result
    ///
    /// Success counts are summed per alias; unprocessed writes are appended per
    /// table, keeping each side's order.
    pub fn merge(&mut self, other: CommitResult) {
        for (alias, count) in other.success {
            *self.success.entry(alias).or_default() += count;
        }
        for (table, writes) in other.unprocessed {
            self.unprocessed.entry(table).or_default().extend(writes);
        }
    }

    /// Applied operations for `alias`
    pub fn success(&self, alias: &str) -> usize {
        self.success.get(alias).copied().unwrap_or_default()
    }

    /// Applied operations over all aliases
    pub fn total_success(&self) -> usize {
        self.success.values().sum()
    }

    /// Unprocessed writes over all tables
    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed.values().map(Vec::len).sum()
    }

    /// Whether every write was applied
    pub fn is_complete(&self) -> bool {
        self.unprocessed.values().all(Vec::is_empty)
    }
}

/// Detail of a multi-chunk commit that failed after issuing some chunks
///
/// Chunks are not rolled back; the writes of `applied_chunks` are durable.
#[derive(Debug)]
pub struct PartialCommit {
    /// Index of the chunk whose request failed
    pub failed_chunk: usize,
    /// Indices of chunks that completed, in completion order
    pub applied_chunks: Vec<usize>,
    /// Indices of chunks that were never sent
    pub unsent_chunks: Vec<usize>,
    /// Merged result of the applied chunks
    pub applied: CommitResult,
    /// Error of the failed chunk
    pub source: Error,
}
