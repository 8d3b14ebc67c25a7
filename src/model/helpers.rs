//! Chunking and concurrent dispatch shared by the batch paths

use aws_sdk_dynamodb::types::AttributeValue;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::cmp::Ordering;
use std::future::Future;
use tracing::error;

use crate::error::Error;
use crate::schema::{Item, compare_numbers};

/// Store cap on write requests per `BatchWriteItem`
pub(crate) const BATCH_WRITE_SIZE: usize = 25;
/// Store cap on keys per `BatchGetItem`
pub(crate) const BATCH_READ_SIZE: usize = 100;

pub(crate) fn clamp_chunk_size(chunk_size: usize) -> usize {
    chunk_size.clamp(1, BATCH_WRITE_SIZE)
}

/// Split ordered groups into chunks of at most `chunk_size` entries
///
/// Groups are drained in order, each one front to back, and the current chunk
/// is filled to the cap before the next one is opened. A group that straddles a
/// boundary appears in both chunks, so concatenating the chunks restores every
/// group's order.
pub(crate) fn split_into_chunks<K: Clone, T: Clone>(
    groups: &[(K, Vec<T>)],
    chunk_size: usize,
) -> Vec<Vec<(K, Vec<T>)>> {
    let chunk_size = clamp_chunk_size(chunk_size);
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut filled = 0;

    for (key, entries) in groups {
        let mut rest = entries.as_slice();
        while !rest.is_empty() {
            let (head, tail) = rest.split_at((chunk_size - filled).min(rest.len()));
            current.push((key.clone(), head.to_vec()));
            filled += head.len();
            rest = tail;

            if filled == chunk_size {
                chunks.push(std::mem::take(&mut current));
                filled = 0;
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// What happened to a set of concurrently dispatched tasks
#[derive(Debug)]
pub(crate) struct Dispatch<R> {
    /// Finished tasks with their index, in completion order
    pub(crate) completed: Vec<(usize, R)>,
    /// First failed task
    pub(crate) failure: Option<(usize, Error)>,
    /// Tasks never started because of the failure
    pub(crate) unsent: Vec<usize>,
}

/// Run `operation` over every task, at most `limit` at a time
///
/// After the first failure no further task is started, but tasks already in
/// flight run to completion so their outcome is known.
pub(crate) async fn dispatch<T, R, F, Fut>(
    tasks: Vec<T>,
    limit: Option<usize>,
    operation: F,
) -> Dispatch<R>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    let limit = limit.unwrap_or(usize::MAX).max(1);
    let mut pending = tasks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut outcome = Dispatch {
        completed: Vec::new(),
        failure: None,
        unsent: Vec::new(),
    };

    loop {
        if outcome.failure.is_none() {
            while in_flight.len() < limit {
                let Some((index, task)) = pending.next() else {
                    break;
                };
                let request = operation(index, task);
                in_flight.push(async move { (index, request.await) });
            }
        }

        match in_flight.next().await {
            Some((index, Ok(result))) => outcome.completed.push((index, result)),
            Some((index, Err(e))) => match outcome.failure {
                None => outcome.failure = Some((index, e)),
                Some((first, _)) => {
                    error!(
                        chunk = index,
                        first_failure = first,
                        error = %e,
                        "additional chunk failed"
                    );
                }
            },
            None => break,
        }
    }

    outcome.unsent = pending.map(|(index, _)| index).collect();
    outcome
}

/// Key equality as the store sees it: numbers match by value, so a requested
/// `2.0` finds the stored `2`
pub(crate) fn same_key_value(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            compare_numbers(a, b) == Some(Ordering::Equal) || a == b
        }
        _ => a == b,
    }
}

/// Order `items` like `keys`, matching on the `key_names` attributes
///
/// Keys without a matching item are skipped; items no key asks for are dropped.
pub(crate) fn sort_by_request_order(
    mut items: Vec<Item>,
    keys: &[Item],
    key_names: &[&str],
) -> Vec<Item> {
    let mut sorted = Vec::with_capacity(items.len());
    for key in keys {
        let position = items.iter().position(|item| {
            key_names
                .iter()
                .all(|name| match (item.get(*name), key.get(*name)) {
                    (Some(found), Some(wanted)) => same_key_value(found, wanted),
                    _ => false,
                })
        });
        if let Some(position) = position {
            sorted.push(items.swap_remove(position));
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    fn group(alias: &str, range: std::ops::Range<usize>) -> (String, Vec<usize>) {
        (alias.to_string(), range.collect())
    }

    #[test]
    fn test_chunk_count_and_order() {
        let groups = vec![group("song", 0..30), group("edit", 100..112)];
        let chunks = split_into_chunks(&groups, 25);

        assert_eq!(chunks.len(), 2); // ceil(42 / 25)
        let sizes: Vec<usize> = chunks
            .iter()
            .map(|c| c.iter().map(|(_, e)| e.len()).sum())
            .collect();
        assert_eq!(sizes, vec![25, 17]);

        let songs: Vec<usize> = chunks
            .iter()
            .flatten()
            .filter(|(alias, _)| alias == "song")
            .flat_map(|(_, e)| e.iter().copied())
            .collect();
        assert_eq!(songs, (0..30).collect::<Vec<_>>());
        assert_eq!(chunks[1][0].0, "song");
        assert_eq!(chunks[1][1].0, "edit");
    }

    #[test]
    fn test_chunk_exact_multiple_and_small_sizes() {
        let chunks = split_into_chunks(&[group("song", 0..50)], 25);
        assert_eq!(chunks.len(), 2);

        let chunks = split_into_chunks(&[group("song", 0..7)], 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2][0].1, vec![6]);

        let chunks = split_into_chunks(&[group("song", 0..4)], 0);
        assert_eq!(chunks.len(), 4);

        let empty: Vec<(String, Vec<usize>)> = vec![group("song", 0..0)];
        assert!(split_into_chunks(&empty, 25).is_empty());
    }

    #[test]
    fn test_chunking_is_repeatable() {
        let groups = vec![group("song", 0..60)];
        assert_eq!(split_into_chunks(&groups, 25), split_into_chunks(&groups, 25));
    }

    #[test]
    fn test_sort_by_request_order() {
        let item = |id: &str| Item::from([("id".to_string(), AttributeValue::N(id.to_string()))]);
        let items = vec![item("1"), item("2"), item("3")];
        let keys = vec![item("3"), item("1"), item("4"), item("2")];

        let sorted = sort_by_request_order(items, &keys, &["id"]);
        assert_eq!(sorted, vec![item("3"), item("1"), item("2")]);
    }

    #[test]
    fn test_sort_matches_numbers_by_value() {
        let item = |id: &str| Item::from([("id".to_string(), AttributeValue::N(id.to_string()))]);
        let found = vec![item("2"), item("12345678901234567890")];
        let keys = vec![item("12345678901234567890.0"), item("2.0")];

        let sorted = sort_by_request_order(found, &keys, &["id"]);
        assert_eq!(sorted, vec![item("12345678901234567890"), item("2")]);

        let text = |id: &str| Item::from([("id".to_string(), AttributeValue::S(id.to_string()))]);
        assert!(sort_by_request_order(vec![text("2")], &[text("2.0")], &["id"]).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_stops_after_failure() {
        let outcome = dispatch(vec![0, 1, 2, 3], Some(1), |_, task| async move {
            if task == 1 {
                Err(Error::store(
                    crate::store::Operation::BatchWriteItem,
                    ["song"],
                    StoreError::service("InternalServerError", "boom"),
                ))
            } else {
                Ok(task * 10)
            }
        })
        .await;

        assert_eq!(outcome.completed, vec![(0, 0)]);
        assert_eq!(outcome.failure.map(|(index, _)| index), Some(1));
        assert_eq!(outcome.unsent, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_dispatch_unbounded_runs_everything() {
        let outcome = dispatch(vec![1, 2, 3], None, |index, task| async move {
            Ok::<_, Error>(index + task)
        })
        .await;

        let mut completed = outcome.completed;
        completed.sort();
        assert_eq!(completed, vec![(0, 1), (1, 3), (2, 5)]);
        assert!(outcome.failure.is_none());
        assert!(outcome.unsent.is_empty());
    }
}
