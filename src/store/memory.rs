//! In-process [`Store`] for tests and local development
//!
//! Tables live in memory and requests are answered with the same shapes and
//! error codes DynamoDB uses for the legacy parameter set (`Expected`,
//! `KeyConditions`, `AttributeUpdates`, `AttributesToGet`). A few hooks let
//! tests throttle tables, fail individual batch writes and observe how many
//! requests were issued.

use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use aws_sdk_dynamodb::operation::create_table::{CreateTableInput, CreateTableOutput};
use aws_sdk_dynamodb::operation::delete_item::{DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::operation::delete_table::{DeleteTableInput, DeleteTableOutput};
use aws_sdk_dynamodb::operation::describe_table::{DescribeTableInput, DescribeTableOutput};
use aws_sdk_dynamodb::operation::get_item::{GetItemInput, GetItemOutput};
use aws_sdk_dynamodb::operation::put_item::{PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::operation::query::{QueryInput, QueryOutput};
use aws_sdk_dynamodb::operation::update_item::{UpdateItemInput, UpdateItemOutput};
use aws_sdk_dynamodb::types::{
    AttributeAction, AttributeDefinition, AttributeValue, AttributeValueUpdate,
    ComparisonOperator, ExpectedAttributeValue, KeySchemaElement, KeyType, KeysAndAttributes,
    ReturnValue, TableDescription, TableStatus, WriteRequest,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

use crate::schema::{Decimal, compare_numbers};
use crate::store::{Operation, Store, StoreError};

type Item = HashMap<String, AttributeValue>;

const MAX_BATCH_WRITE: usize = 25;
const MAX_BATCH_GET: usize = 100;

fn not_found(table: &str) -> StoreError {
    StoreError::service(
        "ResourceNotFoundException",
        format!("Requested resource not found: Table: {table} not found"),
    )
}

fn validation(message: impl Into<String>) -> StoreError {
    StoreError::service("ValidationException", message)
}

fn conditional_check_failed() -> StoreError {
    StoreError::service(
        "ConditionalCheckFailedException",
        "The conditional request failed",
    )
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, StoreError> {
    value.ok_or_else(|| validation(format!("{name} is required")))
}

/// Order two scalar attribute values the way DynamoDB sorts range keys
fn compare(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    match (a, b) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::N(a), AttributeValue::N(b)) => compare_numbers(a, b),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => None,
    }
}

fn same(a: &AttributeValue, b: &AttributeValue) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn condition_holds(
    operator: &ComparisonOperator,
    current: Option<&AttributeValue>,
    args: &[AttributeValue],
) -> Result<bool, StoreError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(validation(format!(
                "{} requires {n} value(s), got {}",
                operator.as_str(),
                args.len()
            )))
        }
    };

    let holds = match operator {
        ComparisonOperator::NotNull => current.is_some(),
        ComparisonOperator::Null => current.is_none(),
        ComparisonOperator::Eq => {
            arity(1)?;
            current.is_some_and(|c| same(c, &args[0]))
        }
        ComparisonOperator::Ne => {
            arity(1)?;
            !current.is_some_and(|c| same(c, &args[0]))
        }
        ComparisonOperator::Lt
        | ComparisonOperator::Le
        | ComparisonOperator::Gt
        | ComparisonOperator::Ge => {
            arity(1)?;
            match current.and_then(|c| compare(c, &args[0])) {
                Some(ordering) => match operator {
                    ComparisonOperator::Lt => ordering.is_lt(),
                    ComparisonOperator::Le => ordering.is_le(),
                    ComparisonOperator::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
                None => false,
            }
        }
        ComparisonOperator::Between => {
            arity(2)?;
            current.is_some_and(|c| {
                compare(c, &args[0]).is_some_and(Ordering::is_ge)
                    && compare(c, &args[1]).is_some_and(Ordering::is_le)
            })
        }
        ComparisonOperator::BeginsWith => {
            arity(1)?;
            match (current, &args[0]) {
                (Some(AttributeValue::S(c)), AttributeValue::S(prefix)) => {
                    c.starts_with(prefix.as_str())
                }
                (Some(AttributeValue::B(c)), AttributeValue::B(prefix)) => {
                    c.as_ref().starts_with(prefix.as_ref())
                }
                _ => false,
            }
        }
        other => {
            return Err(validation(format!(
                "comparison operator {} is not supported",
                other.as_str()
            )));
        }
    };
    Ok(holds)
}

fn check_expected(
    current: Option<&Item>,
    expected: Option<&HashMap<String, ExpectedAttributeValue>>,
) -> Result<(), StoreError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    for (name, expectation) in expected {
        let attribute = current.and_then(|item| item.get(name));
        let holds = match &expectation.comparison_operator {
            Some(operator) => {
                let args = match (&expectation.attribute_value_list, &expectation.value) {
                    (Some(list), _) => list.clone(),
                    (None, Some(value)) => vec![value.clone()],
                    (None, None) => Vec::new(),
                };
                condition_holds(operator, attribute, &args)?
            }
            None => match (expectation.exists, &expectation.value) {
                (Some(false), Some(_)) => {
                    return Err(validation(
                        "Cannot expect an attribute to have a specified value while expecting it to not exist",
                    ));
                }
                (Some(false), None) => attribute.is_none(),
                (_, Some(value)) => attribute.is_some_and(|a| same(a, value)),
                (_, None) => {
                    return Err(validation(format!(
                        "Exists is true for `{name}` but no Value was provided"
                    )));
                }
            },
        };
        if !holds {
            return Err(conditional_check_failed());
        }
    }
    Ok(())
}

fn project(item: &Item, attributes: Option<&Vec<String>>) -> Item {
    match attributes {
        Some(names) => item
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        None => item.clone(),
    }
}

fn add_numbers(a: &str, b: &str) -> Result<String, StoreError> {
    let (Some(a), Some(b)) = (Decimal::parse(a), Decimal::parse(b)) else {
        return Err(validation("ADD requires numeric operands"));
    };
    a.checked_add(&b).map(|sum| sum.to_string()).ok_or_else(|| {
        validation(
            "Number overflow. Attempting to store a number with magnitude larger than supported range",
        )
    })
}

fn union<T: Clone>(current: &[T], added: &[T], eq: impl Fn(&T, &T) -> bool) -> Vec<T> {
    let mut merged = current.to_vec();
    for member in added {
        if !merged.iter().any(|m| eq(m, member)) {
            merged.push(member.clone());
        }
    }
    merged
}

fn difference<T: Clone>(current: &[T], removed: &[T], eq: impl Fn(&T, &T) -> bool) -> Vec<T> {
    current
        .iter()
        .filter(|m| !removed.iter().any(|r| eq(m, r)))
        .cloned()
        .collect()
}

fn numbers_equal(a: &String, b: &String) -> bool {
    compare_numbers(a, b) == Some(Ordering::Equal) || a == b
}

fn apply_update(
    item: &mut Item,
    name: &str,
    update: &AttributeValueUpdate,
) -> Result<(), StoreError> {
    let action = update.action.clone().unwrap_or(AttributeAction::Put);
    match action {
        AttributeAction::Put => {
            let value = required(update.value.clone(), "Value for PUT")?;
            let _ = item.insert(name.to_string(), value);
        }
        AttributeAction::Delete => match (&update.value, item.get(name)) {
            (None, _) => {
                let _ = item.remove(name);
            }
            (Some(_), None) => {}
            (Some(removed), Some(current)) => {
                let remaining = match (current, removed) {
                    (AttributeValue::Ss(c), AttributeValue::Ss(r)) => {
                        AttributeValue::Ss(difference(c, r, |a, b| a == b))
                    }
                    (AttributeValue::Ns(c), AttributeValue::Ns(r)) => {
                        AttributeValue::Ns(difference(c, r, numbers_equal))
                    }
                    (AttributeValue::Bs(c), AttributeValue::Bs(r)) => {
                        AttributeValue::Bs(difference(c, r, |a, b| a == b))
                    }
                    _ => {
                        return Err(validation(format!(
                            "DELETE with a value requires a set attribute for `{name}`"
                        )));
                    }
                };
                let empty = match &remaining {
                    AttributeValue::Ss(s) | AttributeValue::Ns(s) => s.is_empty(),
                    AttributeValue::Bs(s) => s.is_empty(),
                    _ => false,
                };
                if empty {
                    let _ = item.remove(name);
                } else {
                    let _ = item.insert(name.to_string(), remaining);
                }
            }
        },
        AttributeAction::Add => {
            let added = required(update.value.clone(), "Value for ADD")?;
            let merged = match (item.get(name), &added) {
                (
                    None,
                    AttributeValue::N(_)
                    | AttributeValue::Ss(_)
                    | AttributeValue::Ns(_)
                    | AttributeValue::Bs(_),
                ) => added.clone(),
                (Some(AttributeValue::N(c)), AttributeValue::N(a)) => {
                    AttributeValue::N(add_numbers(c, a)?)
                }
                (Some(AttributeValue::Ss(c)), AttributeValue::Ss(a)) => {
                    AttributeValue::Ss(union(c, a, |x, y| x == y))
                }
                (Some(AttributeValue::Ns(c)), AttributeValue::Ns(a)) => {
                    AttributeValue::Ns(union(c, a, numbers_equal))
                }
                (Some(AttributeValue::Bs(c)), AttributeValue::Bs(a)) => {
                    AttributeValue::Bs(union(c, a, |x, y| x == y))
                }
                _ => {
                    return Err(validation(format!(
                        "ADD requires a number or set operand matching `{name}`"
                    )));
                }
            };
            let _ = item.insert(name.to_string(), merged);
        }
        other => {
            return Err(validation(format!(
                "attribute action {} is not supported",
                other.as_str()
            )));
        }
    }
    Ok(())
}

#[derive(Debug)]
struct MemoryTable {
    name: String,
    hash: String,
    range: Option<String>,
    key_schema: Vec<KeySchemaElement>,
    attribute_definitions: Vec<AttributeDefinition>,
    items: Vec<Item>,
    pending_describes: usize,
}

impl MemoryTable {
    fn key_names(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.hash).chain(self.range.as_ref())
    }

    fn key_of(&self, item: &Item) -> Result<Item, StoreError> {
        self.key_names()
            .map(|name| {
                item.get(name)
                    .map(|value| (name.clone(), value.clone()))
                    .ok_or_else(|| {
                        validation(format!(
                            "One of the required keys was not given a value: {name}"
                        ))
                    })
            })
            .collect()
    }

    fn matches(&self, item: &Item, key: &Item) -> bool {
        self.key_names()
            .all(|name| match (item.get(name), key.get(name)) {
                (Some(a), Some(b)) => same(a, b),
                _ => false,
            })
    }

    fn position(&self, key: &Item) -> Result<Option<usize>, StoreError> {
        let key = self.key_of(key)?;
        Ok(self.items.iter().position(|item| self.matches(item, &key)))
    }

    fn get(&self, key: &Item) -> Result<Option<&Item>, StoreError> {
        Ok(self.position(key)?.map(|index| &self.items[index]))
    }

    fn put(&mut self, item: Item) -> Result<Option<Item>, StoreError> {
        match self.position(&item)? {
            Some(index) => Ok(Some(std::mem::replace(&mut self.items[index], item))),
            None => {
                self.items.push(item);
                Ok(None)
            }
        }
    }

    fn remove(&mut self, key: &Item) -> Result<Option<Item>, StoreError> {
        Ok(self.position(key)?.map(|index| self.items.remove(index)))
    }

    fn description(&self, status: TableStatus) -> TableDescription {
        TableDescription::builder()
            .table_name(self.name.clone())
            .table_status(status)
            .set_key_schema(Some(self.key_schema.clone()))
            .set_attribute_definitions(Some(self.attribute_definitions.clone()))
            .item_count(self.items.len() as i64)
            .build()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    throttled: HashSet<String>,
    failing_batch_writes: HashSet<usize>,
    calls: HashMap<Operation, usize>,
}

impl State {
    fn count(&mut self, operation: Operation) -> usize {
        let calls = self.calls.entry(operation).or_default();
        *calls += 1;
        *calls
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, StoreError> {
        self.tables.get(name).ok_or_else(|| not_found(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, StoreError> {
        self.tables.get_mut(name).ok_or_else(|| not_found(name))
    }
}

/// DynamoDB look-alike that keeps every table in memory
///
/// # Example
///
/// ```
/// use dynamo_model::store::MemoryStore;
/// use std::time::Duration;
///
/// let store = MemoryStore::new().with_latency(Duration::from_millis(5));
/// store.throttle("songs");
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Option<Duration>,
    activation_delay: usize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    /// Empty store without tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every batch write by `latency`, so concurrent requests overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Report new tables as `CREATING` for the first `describes` status lookups
    pub fn with_activation_delay(mut self, describes: usize) -> Self {
        self.activation_delay = describes;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leave every batch request for `table` unprocessed
    pub fn throttle(&self, table: impl Into<String>) {
        let _ = self.state().throttled.insert(table.into());
    }

    /// Stop throttling `table`
    pub fn unthrottle(&self, table: &str) {
        let _ = self.state().throttled.remove(table);
    }

    /// Fail the `call`-th batch write (1-based) with an internal server error
    pub fn fail_batch_write(&self, call: usize) {
        let _ = self.state().failing_batch_writes.insert(call);
    }

    /// Requests of `operation` received so far, including failed ones
    pub fn calls(&self, operation: Operation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or_default()
    }

    /// Highest number of batch writes that were in progress at the same time
    pub fn max_concurrent_batch_writes(&self) -> usize {
        self.max_in_flight.load(AtomicOrdering::SeqCst)
    }

    /// Snapshot of a table's items in insertion order
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.items.clone())
            .unwrap_or_default()
    }

    /// Whether a table with this name exists
    pub fn has_table(&self, table: &str) -> bool {
        self.state().tables.contains_key(table)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn write_batch(
        &self,
        call: usize,
        request_items: HashMap<String, Vec<WriteRequest>>,
    ) -> Result<BatchWriteItemOutput, StoreError> {
        let mut state = self.state();

        if state.failing_batch_writes.contains(&call) {
            return Err(StoreError::service(
                "InternalServerError",
                format!("batch write {call} failed"),
            ));
        }

        let requests: usize = request_items.values().map(Vec::len).sum();
        if requests == 0 || requests > MAX_BATCH_WRITE {
            return Err(validation(format!(
                "BatchWriteItem requires between 1 and {MAX_BATCH_WRITE} requests, got {requests}"
            )));
        }
        for table in request_items.keys() {
            let _ = state.table(table)?;
        }

        let mut unprocessed = HashMap::new();
        for (table, writes) in request_items {
            if state.throttled.contains(&table) {
                trace!(table = %table, requests = writes.len(), "throttled batch write");
                let _ = unprocessed.insert(table, writes);
                continue;
            }
            let target = state.table_mut(&table)?;
            for write in writes {
                if let Some(put) = write.put_request {
                    let _ = target.put(put.item)?;
                } else if let Some(delete) = write.delete_request {
                    let _ = target.remove(&delete.key)?;
                } else {
                    return Err(validation("WriteRequest needs a PutRequest or DeleteRequest"));
                }
            }
        }

        Ok(BatchWriteItemOutput::builder()
            .set_unprocessed_items(Some(unprocessed))
            .build())
    }

    fn get_batch(
        &self,
        request_items: HashMap<String, KeysAndAttributes>,
    ) -> Result<BatchGetItemOutput, StoreError> {
        let state = self.state();

        let keys: usize = request_items.values().map(|k| k.keys.len()).sum();
        if keys > MAX_BATCH_GET {
            return Err(validation(
                "Too many items requested for the BatchGetItem call",
            ));
        }

        let mut responses = HashMap::new();
        let mut unprocessed = HashMap::new();
        for (table, request) in request_items {
            let source = state.table(&table)?;
            if state.throttled.contains(&table) {
                let _ = unprocessed.insert(table, request);
                continue;
            }
            let mut found = Vec::with_capacity(request.keys.len());
            for key in &request.keys {
                if let Some(item) = source.get(key)? {
                    found.push(project(item, request.attributes_to_get.as_ref()));
                }
            }
            let _ = responses.insert(table, found);
        }

        Ok(BatchGetItemOutput::builder()
            .set_responses(Some(responses))
            .set_unprocessed_keys(Some(unprocessed))
            .build())
    }

    fn run_query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        let state = self.state();
        let table = state.table(&required(input.table_name, "TableName")?)?;
        let conditions = required(input.key_conditions, "KeyConditions")?;

        let hash_condition = conditions
            .get(&table.hash)
            .ok_or_else(|| validation("Query condition missed key schema element"))?;
        if hash_condition.comparison_operator != ComparisonOperator::Eq {
            return Err(validation("Query key condition not supported"));
        }
        if let Some(name) = conditions
            .keys()
            .find(|name| **name != table.hash && Some(*name) != table.range.as_ref())
        {
            return Err(validation(format!(
                "Query condition on non-key attribute `{name}`"
            )));
        }

        let mut matched = Vec::new();
        for item in &table.items {
            let mut holds = true;
            for (name, condition) in &conditions {
                let args = condition.attribute_value_list.as_deref().unwrap_or_default();
                if !condition_holds(&condition.comparison_operator, item.get(name), args)? {
                    holds = false;
                    break;
                }
            }
            if holds {
                matched.push(item.clone());
            }
        }

        if let Some(range) = &table.range {
            matched.sort_by(|a, b| match (a.get(range), b.get(range)) {
                (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            });
        }
        let forward = input.scan_index_forward.unwrap_or(true);
        if !forward {
            matched.reverse();
        }

        if let Some(start) = &input.exclusive_start_key {
            match matched.iter().position(|item| table.matches(item, start)) {
                Some(index) => {
                    let _ = matched.drain(..=index);
                }
                None => match (&table.range, table.range.as_ref().and_then(|r| start.get(r))) {
                    (Some(range), Some(after)) => matched.retain(|item| {
                        item.get(range)
                            .and_then(|value| compare(value, after))
                            .is_some_and(|o| if forward { o.is_gt() } else { o.is_lt() })
                    }),
                    _ => matched.clear(),
                },
            }
        }

        let mut last_evaluated_key = None;
        if let Some(limit) = input.limit.and_then(|l| usize::try_from(l).ok())
            && limit > 0
            && matched.len() > limit
        {
            matched.truncate(limit);
            if let Some(last) = matched.last() {
                last_evaluated_key = Some(table.key_of(last)?);
            }
        }

        let items: Vec<Item> = matched
            .iter()
            .map(|item| project(item, input.attributes_to_get.as_ref()))
            .collect();

        Ok(QueryOutput::builder()
            .count(items.len() as i32)
            .scanned_count(items.len() as i32)
            .set_items(Some(items))
            .set_last_evaluated_key(last_evaluated_key)
            .build())
    }
}

fn updated_only(item: &Item, names: &HashSet<&String>) -> Item {
    item.iter()
        .filter(|(name, _)| names.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

impl Store for MemoryStore {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
        let mut state = self.state();
        let _ = state.count(Operation::GetItem);
        let table = state.table(&required(input.table_name, "TableName")?)?;
        let key = required(input.key, "Key")?;
        let item = table
            .get(&key)?
            .map(|item| project(item, input.attributes_to_get.as_ref()));
        Ok(GetItemOutput::builder().set_item(item).build())
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        let mut state = self.state();
        let _ = state.count(Operation::PutItem);
        let table = state.table_mut(&required(input.table_name, "TableName")?)?;
        let item = required(input.item, "Item")?;

        let current = table.get(&item)?;
        check_expected(current, input.expected.as_ref())?;

        let old = table.put(item)?;
        let attributes = match input.return_values {
            Some(ReturnValue::AllOld) => old,
            _ => None,
        };
        Ok(PutItemOutput::builder().set_attributes(attributes).build())
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        let mut state = self.state();
        let _ = state.count(Operation::DeleteItem);
        let table = state.table_mut(&required(input.table_name, "TableName")?)?;
        let key = required(input.key, "Key")?;

        check_expected(table.get(&key)?, input.expected.as_ref())?;

        let old = table.remove(&key)?;
        let attributes = match input.return_values {
            Some(ReturnValue::AllOld) => old,
            _ => None,
        };
        Ok(DeleteItemOutput::builder().set_attributes(attributes).build())
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError> {
        let mut state = self.state();
        let _ = state.count(Operation::UpdateItem);
        let table = state.table_mut(&required(input.table_name, "TableName")?)?;
        let key = table.key_of(&required(input.key, "Key")?)?;
        let updates = input.attribute_updates.unwrap_or_default();

        if let Some(name) = updates.keys().find(|name| key.contains_key(*name)) {
            return Err(validation(format!(
                "Cannot update attribute {name}. This attribute is part of the key"
            )));
        }

        let old = table.get(&key)?.cloned();
        check_expected(old.as_ref(), input.expected.as_ref())?;

        let mut new = old.clone().unwrap_or_else(|| key.clone());
        for (name, update) in &updates {
            apply_update(&mut new, name, update)?;
        }
        let _ = table.put(new.clone())?;

        let names: HashSet<&String> = updates.keys().collect();
        let attributes = match input.return_values {
            Some(ReturnValue::AllOld) => old,
            Some(ReturnValue::UpdatedOld) => old.map(|item| updated_only(&item, &names)),
            Some(ReturnValue::AllNew) => Some(new),
            Some(ReturnValue::UpdatedNew) => Some(updated_only(&new, &names)),
            _ => None,
        };
        Ok(UpdateItemOutput::builder().set_attributes(attributes).build())
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        let _ = self.state().count(Operation::Query);
        self.run_query(input)
    }

    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, StoreError> {
        let _ = self.state().count(Operation::BatchGetItem);
        self.get_batch(input.request_items.unwrap_or_default())
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, StoreError> {
        let call = self.state().count(Operation::BatchWriteItem);

        let running = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let _ = self.max_in_flight.fetch_max(running, AtomicOrdering::SeqCst);
        self.delay().await;
        let _ = self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);

        self.write_batch(call, input.request_items.unwrap_or_default())
    }

    async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> Result<DescribeTableOutput, StoreError> {
        let mut state = self.state();
        let _ = state.count(Operation::DescribeTable);
        let table = state.table_mut(&required(input.table_name, "TableName")?)?;
        let status = if table.pending_describes > 0 {
            table.pending_describes -= 1;
            TableStatus::Creating
        } else {
            TableStatus::Active
        };
        Ok(DescribeTableOutput::builder()
            .table(table.description(status))
            .build())
    }

    async fn create_table(&self, input: CreateTableInput) -> Result<CreateTableOutput, StoreError> {
        let mut state = self.state();
        let _ = state.count(Operation::CreateTable);
        let name = required(input.table_name, "TableName")?;
        if state.tables.contains_key(&name) {
            return Err(StoreError::service(
                "ResourceInUseException",
                format!("Table already exists: {name}"),
            ));
        }

        let key_schema = required(input.key_schema, "KeySchema")?;
        let key_name = |kind: KeyType| {
            key_schema
                .iter()
                .find(|element| element.key_type == kind)
                .map(|element| element.attribute_name.clone())
        };
        let hash = key_name(KeyType::Hash)
            .ok_or_else(|| validation("KeySchema must contain a HASH key"))?;
        let range = key_name(KeyType::Range);

        let table = MemoryTable {
            name: name.clone(),
            hash,
            range,
            key_schema: key_schema.clone(),
            attribute_definitions: input.attribute_definitions.unwrap_or_default(),
            items: Vec::new(),
            pending_describes: self.activation_delay,
        };
        let description = table.description(if self.activation_delay > 0 {
            TableStatus::Creating
        } else {
            TableStatus::Active
        });
        let _ = state.tables.insert(name, table);

        Ok(CreateTableOutput::builder()
            .table_description(description)
            .build())
    }

    async fn delete_table(&self, input: DeleteTableInput) -> Result<DeleteTableOutput, StoreError> {
        let mut state = self.state();
        let _ = state.count(Operation::DeleteTable);
        let name = required(input.table_name, "TableName")?;
        let table = state.tables.remove(&name).ok_or_else(|| not_found(&name))?;
        Ok(DeleteTableOutput::builder()
            .table_description(table.description(TableStatus::Deleting))
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::{Condition, PutRequest, ScalarAttributeType};

    fn n(value: &str) -> AttributeValue {
        AttributeValue::N(value.to_string())
    }

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    fn item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn store_with_edits() -> MemoryStore {
        let store = MemoryStore::new();
        let input = CreateTableInput::builder()
            .table_name("edits")
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("song_id")
                    .key_type(KeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("created")
                    .key_type(KeyType::Range)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("song_id")
                    .attribute_type(ScalarAttributeType::N)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let _ = store.create_table(input).await.unwrap();

        for created in ["10", "2", "30"] {
            let put = PutItemInput::builder()
                .table_name("edits")
                .set_item(Some(item(&[("song_id", n("1")), ("created", n(created))])))
                .build()
                .unwrap();
            let _ = store.put_item(put).await.unwrap();
        }
        store
    }

    #[test]
    fn test_compare_numbers_numerically() {
        assert_eq!(compare(&n("2"), &n("10")), Some(Ordering::Less));
        assert_eq!(compare(&n("2.5"), &n("2")), Some(Ordering::Greater));
        assert_eq!(compare(&n("2.0"), &n("2")), Some(Ordering::Equal));
        assert_eq!(
            compare(&n("98765432109876543211"), &n("98765432109876543210")),
            Some(Ordering::Greater)
        );
        assert_eq!(compare(&s("2"), &s("10")), Some(Ordering::Greater));
        assert_eq!(compare(&s("a"), &n("1")), None);
    }

    #[test]
    fn test_expected_semantics() {
        let current = item(&[("id", n("1")), ("title", s("A"))]);

        let exists = HashMap::from([(
            "id".to_string(),
            ExpectedAttributeValue::builder()
                .comparison_operator(ComparisonOperator::NotNull)
                .build(),
        )]);
        assert!(check_expected(Some(&current), Some(&exists)).is_ok());
        assert!(check_expected(None, Some(&exists)).is_err());

        let absent = HashMap::from([(
            "id".to_string(),
            ExpectedAttributeValue::builder().exists(false).build(),
        )]);
        let err = check_expected(Some(&current), Some(&absent)).unwrap_err();
        assert!(err.is_conditional_check_failed());

        let equals = HashMap::from([(
            "title".to_string(),
            ExpectedAttributeValue::builder().value(s("B")).build(),
        )]);
        assert!(check_expected(Some(&current), Some(&equals)).is_err());
    }

    #[test]
    fn test_add_and_delete_updates() {
        let mut current = item(&[
            ("plays", n("2")),
            ("tags", AttributeValue::Ss(vec!["a".into()])),
        ]);

        let add = |value| {
            AttributeValueUpdate::builder()
                .action(AttributeAction::Add)
                .value(value)
                .build()
        };
        apply_update(&mut current, "plays", &add(n("3"))).unwrap();
        let tags = AttributeValue::Ss(vec!["b".into(), "a".into()]);
        apply_update(&mut current, "tags", &add(tags)).unwrap();
        assert_eq!(current["plays"], n("5"));

        let mut counter = item(&[("views", n("18446744073709551615"))]);
        apply_update(&mut counter, "views", &add(n("1"))).unwrap();
        assert_eq!(counter["views"], n("18446744073709551616"));
        apply_update(&mut counter, "views", &add(n("-0.5"))).unwrap();
        assert_eq!(counter["views"], n("18446744073709551615.5"));
        assert_eq!(current["tags"], AttributeValue::Ss(vec!["a".into(), "b".into()]));

        let delete = AttributeValueUpdate::builder()
            .action(AttributeAction::Delete)
            .value(AttributeValue::Ss(vec!["a".into(), "b".into()]))
            .build();
        apply_update(&mut current, "tags", &delete).unwrap();
        assert!(!current.contains_key("tags"));
    }

    #[tokio::test]
    async fn test_query_orders_by_range_and_pages() {
        let store = store_with_edits().await;

        let query = |start: Option<Item>| {
            QueryInput::builder()
                .table_name("edits")
                .key_conditions(
                    "song_id",
                    Condition::builder()
                        .comparison_operator(ComparisonOperator::Eq)
                        .attribute_value_list(n("1"))
                        .build()
                        .unwrap(),
                )
                .limit(2)
                .set_exclusive_start_key(start)
                .build()
                .unwrap()
        };

        let first = store.query(query(None)).await.unwrap();
        let created: Vec<_> = first.items().iter().map(|i| i["created"].clone()).collect();
        assert_eq!(created, vec![n("2"), n("10")]);
        let last = first.last_evaluated_key.clone();
        assert!(last.is_some());

        let second = store.query(query(last)).await.unwrap();
        assert_eq!(second.items().len(), 1);
        assert_eq!(second.items()[0]["created"], n("30"));
        assert!(second.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_throttled_batch_write_is_unprocessed() {
        let store = store_with_edits().await;
        store.throttle("edits");

        let write = WriteRequest::builder()
            .put_request(
                PutRequest::builder()
                    .set_item(Some(item(&[("song_id", n("2")), ("created", n("1"))])))
                    .build()
                    .unwrap(),
            )
            .build();
        let input = BatchWriteItemInput::builder()
            .request_items("edits", vec![write])
            .build()
            .unwrap();

        let output = store.batch_write_item(input).await.unwrap();
        assert_eq!(output.unprocessed_items.unwrap()["edits"].len(), 1);
        assert_eq!(store.items("edits").len(), 3);
        assert_eq!(store.calls(Operation::BatchWriteItem), 1);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = MemoryStore::new();
        let input = GetItemInput::builder()
            .table_name("nope")
            .key("id", n("1"))
            .build()
            .unwrap();
        let err = store.get_item(input).await.unwrap_err();
        assert!(err.is_resource_not_found());
    }
}
