//! Multi-alias batch writes and reads
//!
//! A [`Batch`] queues puts, deletes and gets for any number of aliases.
//! Committing goes through two explicit phases:
//!
//! 1. [`Batch::resolve`] marshals every queued record, then runs the range
//!    scans needed to delete all items under a hash on range-keyed aliases.
//! 2. [`ResolvedBatch::commit`] splits the writes into chunks of at most 25
//!    requests and sends them concurrently, merging the results.
//!
//! Chunks are not transactional. When a chunk fails after others were issued,
//! the commit fails with [`Error::PartialCommit`] describing what was applied.

use aws_sdk_dynamodb::types::{DeleteRequest, WriteRequest};
use futures_util::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::error::Error;
use crate::model::helpers::{self, dispatch, split_into_chunks};
use crate::model::request;
use crate::model::types::{BatchGetRequest, BatchGetResult, CommitResult, PartialCommit};
use crate::model::Model;
use crate::schema::{Item, Record, Value};
use crate::store::Store;

type Groups = Vec<(String, Vec<WriteRequest>)>;

fn push_grouped<T>(groups: &mut Vec<(String, Vec<T>)>, alias: &str, entry: T) {
    match groups.iter_mut().find(|(a, _)| a == alias) {
        Some((_, entries)) => entries.push(entry),
        None => groups.push((alias.to_string(), vec![entry])),
    }
}

fn same_key(a: &Item, b: &Item) -> bool {
    a.len() == b.len()
        && a.iter().all(|(name, value)| {
            b.get(name)
                .is_some_and(|other| helpers::same_key_value(value, other))
        })
}

/// Keep the first delete of every key within an alias; the store rejects a
/// `BatchWriteItem` naming one key twice
fn dedup_deletes(deletes: &mut Groups) {
    for (alias, requests) in deletes.iter_mut() {
        let queued = requests.len();
        let mut seen: Vec<Item> = Vec::with_capacity(queued);
        requests.retain(|request| {
            let Some(key) = request.delete_request().map(DeleteRequest::key) else {
                return true;
            };
            if seen.iter().any(|other| same_key(other, key)) {
                return false;
            }
            seen.push(key.clone());
            true
        });
        if requests.len() < queued {
            debug!(alias = %alias, dropped = queued - requests.len(), "repeated delete keys");
        }
    }
}

/// Queue of writes and reads across aliases
///
/// Errors from queueing (unknown alias, missing range) are kept and returned
/// by [`resolve`](Batch::resolve), [`commit`](Batch::commit) or
/// [`fetch`](Batch::fetch), so calls can be chained.
///
/// # Example
///
/// ```no_run
/// # use dynamo_model::{Model, Value};
/// # use dynamo_model::schema::Record;
/// # async fn example(model: &Model, song: Record) -> Result<(), dynamo_model::Error> {
/// let result = model
///     .batch()
///     .insert("song", song)
///     .remove("edit", 1, None)
///     .commit()
///     .await?;
///
/// println!("{} writes applied", result.total_success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Batch<'a, S> {
    model: &'a Model<S>,
    puts: Vec<(String, Vec<Record>)>,
    deletes: Vec<(String, Vec<Record>)>,
    scans: Vec<(String, Value)>,
    gets: Vec<BatchGetRequest>,
    chunk_size: usize,
    error: Option<Error>,
}

impl<S: Store> Model<S> {
    /// Start an empty batch
    pub fn batch(&self) -> Batch<'_, S> {
        Batch {
            model: self,
            puts: Vec::new(),
            deletes: Vec::new(),
            scans: Vec::new(),
            gets: Vec::new(),
            chunk_size: self.config().chunk_size(),
            error: None,
        }
    }
}

impl<'a, S: Store> Batch<'a, S> {
    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn check_alias(&mut self, alias: &str) -> bool {
        match self.model.schema(alias) {
            Ok(_) => true,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    /// Queue a put of `record` into `alias`
    pub fn insert(mut self, alias: &str, record: Record) -> Self {
        if self.check_alias(alias) {
            push_grouped(&mut self.puts, alias, record);
        }
        self
    }

    /// Queue a delete
    ///
    /// On a range-keyed alias, leaving `range` out deletes every item under
    /// `hash`; the range values are looked up when the batch is resolved.
    pub fn remove(mut self, alias: &str, hash: impl Into<Value>, range: Option<Value>) -> Self {
        let model = self.model;
        let schema = match model.schema(alias) {
            Ok(schema) => schema,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        let hash = hash.into();
        match (schema.range(), range) {
            (Some(_), None) => self.scans.push((alias.to_string(), hash)),
            (range_field, range) => {
                let mut key = Record::from([(schema.hash().name().to_string(), hash)]);
                if let (Some(field), Some(range)) = (range_field, range) {
                    let _ = key.insert(field.name().to_string(), range);
                }
                push_grouped(&mut self.deletes, alias, key);
            }
        }
        self
    }

    /// Queue a read of one item
    pub fn get(mut self, alias: &str, hash: impl Into<Value>, range: Option<Value>) -> Self {
        if self.check_alias(alias) {
            self.get_request(alias).keys.push((hash.into(), range));
        }
        self
    }

    /// Queue reads of several items of one alias
    ///
    /// `ranges`, when given, pairs with `hashes` by position.
    pub fn get_list<I, V>(mut self, alias: &str, hashes: I, ranges: Option<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.check_alias(alias) {
            return self;
        }
        let hashes: Vec<Value> = hashes.into_iter().map(Into::into).collect();
        let keys: Vec<(Value, Option<Value>)> = match ranges {
            None => hashes.into_iter().map(|hash| (hash, None)).collect(),
            Some(ranges) if ranges.len() == hashes.len() => hashes
                .into_iter()
                .zip(ranges)
                .map(|(hash, range)| (hash, Some(range)))
                .collect(),
            Some(ranges) => {
                self.fail(Error::InvalidSchema {
                    alias: alias.to_string(),
                    reason: format!(
                        "{} hash values but {} range values",
                        hashes.len(),
                        ranges.len()
                    ),
                });
                return self;
            }
        };
        self.get_request(alias).keys.extend(keys);
        self
    }

    fn get_request(&mut self, alias: &str) -> &mut BatchGetRequest {
        let index = match self.gets.iter().position(|r| r.alias == alias) {
            Some(index) => index,
            None => {
                self.gets.push(BatchGetRequest::new(alias));
                self.gets.len() - 1
            }
        };
        &mut self.gets[index]
    }

    /// Cap each `BatchWriteItem` at `size` requests, clamped to `1..=25`
    pub fn chunk(mut self, size: usize) -> Self {
        self.chunk_size = helpers::clamp_chunk_size(size);
        self
    }

    /// Number of queued puts and explicit deletes, excluding pending scans
    pub fn len(&self) -> usize {
        self.puts
            .iter()
            .chain(&self.deletes)
            .map(|(_, records)| records.len())
            .sum()
    }

    /// Whether nothing was queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.scans.is_empty() && self.gets.is_empty()
    }

    /// Read every queued get with one `BatchGetItem`
    ///
    /// Queued writes are ignored.
    pub async fn fetch(self) -> Result<BatchGetResult, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.model.batch_get(self.gets).await
    }

    /// Marshal the queued writes and resolve hash-only deletes
    ///
    /// No request is sent when a record fails to marshal. Scans run
    /// concurrently, capped by the model's `max_concurrency`; a failed scan
    /// fails the resolution before any write is issued.
    pub async fn resolve(self) -> Result<ResolvedBatch<'a, S>, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let model = self.model;

        let mut puts: Groups = Vec::with_capacity(self.puts.len());
        for (alias, records) in &self.puts {
            let schema = model.schema(alias)?;
            let requests = records
                .iter()
                .map(|record| request::put_request(schema, record))
                .collect::<Result<Vec<_>, _>>()?;
            puts.push((alias.clone(), requests));
        }
        let mut deletes: Groups = Vec::with_capacity(self.deletes.len());
        for (alias, keys) in &self.deletes {
            let schema = model.schema(alias)?;
            let requests = keys
                .iter()
                .map(|key| request::delete_request(schema, key))
                .collect::<Result<Vec<_>, _>>()?;
            deletes.push((alias.clone(), requests));
        }

        let mut scans: Vec<(String, Value)> = Vec::with_capacity(self.scans.len());
        for scan in self.scans {
            if !scans.contains(&scan) {
                scans.push(scan);
            }
        }

        if !scans.is_empty() {
            let limit = model.config().max_concurrency().unwrap_or(scans.len());
            debug!(scans = scans.len(), "resolving range keys");

            let scanned: Vec<(String, Value, Vec<Value>)> = stream::iter(scans)
                .map(|(alias, hash)| async move {
                    let ranges = model.range_values(&alias, &hash).await?;
                    Ok::<_, Error>((alias, hash, ranges))
                })
                .buffered(limit)
                .try_collect()
                .await?;

            for (alias, hash, ranges) in scanned {
                let schema = model.schema(&alias)?;
                for range in ranges {
                    let key = schema.key(&hash, Some(&range))?;
                    let delete = WriteRequest::builder()
                        .delete_request(DeleteRequest::builder().set_key(Some(key)).build()?)
                        .build();
                    push_grouped(&mut deletes, &alias, delete);
                }
            }
        }
        dedup_deletes(&mut deletes);

        Ok(ResolvedBatch {
            model,
            puts,
            deletes,
            chunk_size: self.chunk_size,
        })
    }

    /// Resolve and commit the queued writes
    pub async fn commit(self) -> Result<CommitResult, Error> {
        self.resolve().await?.commit().await
    }
}

/// Marshaled writes ready to be chunked and sent
#[derive(Debug)]
pub struct ResolvedBatch<'a, S> {
    model: &'a Model<S>,
    puts: Groups,
    deletes: Groups,
    chunk_size: usize,
}

/// Requests sent together in one `BatchWriteItem`
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    groups: Groups,
}

impl Chunk {
    /// Requests grouped by alias, puts before deletes
    pub fn groups(&self) -> &[(String, Vec<WriteRequest>)] {
        &self.groups
    }

    /// Number of put requests for `alias`
    pub fn puts(&self, alias: &str) -> usize {
        self.count(alias, |request| request.put_request.is_some())
    }

    /// Number of delete requests for `alias`
    pub fn deletes(&self, alias: &str) -> usize {
        self.count(alias, |request| request.delete_request.is_some())
    }

    fn count(&self, alias: &str, kind: impl Fn(&WriteRequest) -> bool) -> usize {
        self.groups
            .iter()
            .filter(|(a, _)| a == alias)
            .flat_map(|(_, requests)| requests)
            .filter(|request| kind(request))
            .count()
    }

    /// Total requests
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, requests)| requests.len()).sum()
    }

    /// Whether the chunk carries no request
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Store> ResolvedBatch<'_, S> {
    /// Total write requests
    pub fn len(&self) -> usize {
        self.puts
            .iter()
            .chain(&self.deletes)
            .map(|(_, requests)| requests.len())
            .sum()
    }

    /// Whether there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chunks in send order
    ///
    /// Puts come first alias by alias, then deletes alias by alias, each alias
    /// in queueing order. Every chunk but the last holds exactly `chunk_size`
    /// requests.
    pub fn chunks(&self) -> Vec<Chunk> {
        let groups: Groups = self
            .puts
            .iter()
            .chain(&self.deletes)
            .filter(|(_, requests)| !requests.is_empty())
            .cloned()
            .collect();
        split_into_chunks(&groups, self.chunk_size)
            .into_iter()
            .map(|groups| Chunk { groups })
            .collect()
    }

    /// Send every chunk and merge the results
    ///
    /// A single chunk is sent as is and its error returned unchanged. With
    /// several chunks the first failure stops new chunks from being sent and
    /// is reported as [`Error::PartialCommit`] once the chunks in flight
    /// have finished.
    pub async fn commit(self) -> Result<CommitResult, Error> {
        let mut chunks = self.chunks();
        let operations = self.len();
        let model = self.model;
        match chunks.len() {
            0 => return Ok(CommitResult::default()),
            1 => {
                let Some(chunk) = chunks.pop() else {
                    return Ok(CommitResult::default());
                };
                return model.write_groups(chunk.groups).await;
            }
            _ => {}
        }

        info!(operations, chunks = chunks.len(), "committing batch");
        let outcome = dispatch(chunks, model.config().max_concurrency(), |index, chunk| {
            debug!(chunk = index, requests = chunk.len(), "sending chunk");
            model.write_groups(chunk.groups)
        })
        .await;

        let applied_chunks: Vec<usize> =
            outcome.completed.iter().map(|(index, _)| *index).collect();
        let mut completed = outcome.completed;
        completed.sort_by_key(|(index, _)| *index);
        let mut merged = CommitResult::default();
        for (_, result) in completed {
            merged.merge(result);
        }

        match outcome.failure {
            None => Ok(merged),
            Some((failed_chunk, source)) => Err(PartialCommit {
                failed_chunk,
                applied_chunks,
                unsent_chunks: outcome.unsent,
                applied: merged,
                source,
            }
            .into()),
        }
    }
}
