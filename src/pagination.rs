use std::collections::HashSet;

use itertools::{EitherOrBoth, Itertools};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendError, Fetched};
use crate::sort::KeyValuePair;
use crate::store::Store;

/// Collects every key matching `pattern`, optionally with its value, in scan order.
///
/// Scanning stops once the backend completes a full cycle or, when `limit` is not zero, once
/// `limit` keys were found. Values are then fetched with a single bulk request. Keys that vanish
/// or stop holding a string in between keep an empty value.
///
/// Any backend failure aborts the whole collection.
#[instrument(skip(store, cancel))]
pub async fn collect(
    store: &Store,
    cancel: &CancellationToken,
    pattern: &str,
    with_values: bool,
    limit: usize,
) -> Result<Vec<KeyValuePair>, BackendError> {
    let options = store.options();
    let count = if limit > 0 { limit } else { options.scan_count };

    let mut pairs = Vec::new();
    // Redis may hand out the same key twice during one scan cycle.
    let mut seen = HashSet::new();
    let mut cursor = 0;
    let mut rounds = 0;

    loop {
        if rounds == options.max_scan_rounds {
            return Err(BackendError::ScanRoundsExceeded(rounds));
        }
        rounds += 1;

        let (keys, next_cursor) = store.scan(cancel, cursor, pattern, count).await?;
        for key in keys {
            if seen.insert(key.clone()) {
                pairs.push(KeyValuePair::key_only(key));
            }
        }

        cursor = next_cursor;
        if cursor == 0 || (limit > 0 && pairs.len() >= limit) {
            break;
        }
    }

    // The last batch may overshoot the limit.
    if limit > 0 {
        pairs.truncate(limit);
    }
    debug!(rounds, found = pairs.len(), "Scan finished");

    if with_values && !pairs.is_empty() {
        let keys: Vec<String> = pairs.iter().map(|pair| pair.key.clone()).collect();
        let values = store.bulk_get(cancel, &keys).await?;
        merge(&mut pairs, values);
    }

    Ok(pairs)
}

fn merge(pairs: &mut [KeyValuePair], values: Vec<Fetched>) {
    for item in pairs.iter_mut().zip_longest(values) {
        match item {
            EitherOrBoth::Both(pair, Fetched::Text(value)) => pair.value = value,
            EitherOrBoth::Both(pair, Fetched::Missing) | EitherOrBoth::Left(pair) => {
                warn!(key = %pair.key, "Key has disappeared between scan and bulk fetch");
            }
            EitherOrBoth::Both(pair, Fetched::Unsupported(kind)) => {
                warn!(key = %pair.key, kind, "Key contains a non-string value");
            }
            EitherOrBoth::Right(_) => {
                warn!("Bulk fetch returned more values than requested");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::store::StoreOptions;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned scan batches and records every call it receives.
    #[derive(Default)]
    struct Scripted {
        batches: Mutex<VecDeque<Result<(Vec<String>, u64), BackendError>>>,
        values: Mutex<Option<Vec<Fetched>>>,
        scans: Mutex<Vec<(u64, String, usize)>>,
        bulk_gets: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(batches: Vec<(Vec<&str>, u64)>) -> Scripted {
            let batches = batches
                .into_iter()
                .map(|(keys, cursor)| Ok((keys.into_iter().map(String::from).collect(), cursor)))
                .collect();

            Scripted {
                batches: Mutex::new(batches),
                ..Scripted::default()
            }
        }

        fn with_values(self, values: Vec<Fetched>) -> Scripted {
            *self.values.lock().unwrap() = Some(values);
            self
        }
    }

    #[async_trait]
    impl Backend for Scripted {
        async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
            Ok(None)
        }

        async fn scan(
            &self,
            cursor: u64,
            pattern: &str,
            count: usize,
        ) -> Result<(Vec<String>, u64), BackendError> {
            self.scans
                .lock()
                .unwrap()
                .push((cursor, pattern.to_string(), count));

            // Once the script runs out, keep pointing at a cursor that never completes.
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok((vec![], 1)))
        }

        async fn bulk_get(&self, keys: &[String]) -> Result<Vec<Fetched>, BackendError> {
            self.bulk_gets.lock().unwrap().push(keys.to_vec());

            let values = self.values.lock().unwrap().clone();
            Ok(values.unwrap_or_else(|| {
                keys.iter()
                    .map(|key| Fetched::Text(format!("value of {}", key)))
                    .collect()
            }))
        }
    }

    // The store owns the backend, so tests keep a second handle to inspect the recorded calls.
    struct Shared(std::sync::Arc<Scripted>);

    #[async_trait]
    impl Backend for Shared {
        async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
            self.0.get(key).await
        }

        async fn scan(
            &self,
            cursor: u64,
            pattern: &str,
            count: usize,
        ) -> Result<(Vec<String>, u64), BackendError> {
            self.0.scan(cursor, pattern, count).await
        }

        async fn bulk_get(&self, keys: &[String]) -> Result<Vec<Fetched>, BackendError> {
            self.0.bulk_get(keys).await
        }
    }

    fn store(backend: Scripted) -> (Store, std::sync::Arc<Scripted>) {
        let backend = std::sync::Arc::new(backend);
        (Store::new(Shared(backend.clone())), backend)
    }

    fn keys(pairs: &[KeyValuePair]) -> Vec<&str> {
        pairs.iter().map(|pair| pair.key.as_str()).collect()
    }

    #[tokio::test]
    async fn union_of_all_batches_in_scan_order() {
        let (store, backend) = store(Scripted::new(vec![
            (vec!["c", "a"], 17),
            (vec!["b"], 42),
            (vec!["e", "d"], 0),
        ]));

        let pairs = collect(&store, &CancellationToken::new(), "*", true, 0)
            .await
            .unwrap();

        assert_eq!(keys(&pairs), vec!["c", "a", "b", "e", "d"]);
        assert_eq!(pairs[0].value, "value of c");

        let scans = backend.scans.lock().unwrap();
        let cursors: Vec<u64> = scans.iter().map(|(cursor, _, _)| *cursor).collect();
        assert_eq!(cursors, vec![0, 17, 42]);
        let scan_count = StoreOptions::default().scan_count;
        assert!(scans
            .iter()
            .all(|(_, pattern, count)| pattern == "*" && *count == scan_count));

        let bulk_gets = backend.bulk_gets.lock().unwrap();
        assert_eq!(bulk_gets.len(), 1);
        assert_eq!(bulk_gets[0], vec!["c", "a", "b", "e", "d"]);
    }

    #[tokio::test]
    async fn stops_at_row_limit() {
        let (store, backend) = store(Scripted::new(vec![
            (vec!["a", "b"], 5),
            (vec!["c", "d"], 9),
            (vec!["e"], 0),
        ]));

        let pairs = collect(&store, &CancellationToken::new(), "*", false, 3)
            .await
            .unwrap();

        assert_eq!(keys(&pairs), vec!["a", "b", "c"]);

        let scans = backend.scans.lock().unwrap();
        assert_eq!(scans.len(), 2);
        assert!(scans.iter().all(|(_, _, count)| *count == 3));
    }

    #[tokio::test]
    async fn without_values_skips_bulk_fetch() {
        let (store, backend) = store(Scripted::new(vec![(vec!["a"], 0)]));

        let pairs = collect(&store, &CancellationToken::new(), "a", false, 0)
            .await
            .unwrap();

        assert_eq!(pairs, vec![KeyValuePair::key_only("a")]);
        assert!(backend.bulk_gets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tolerates_missing_and_mistyped_values() {
        let (store, _) = store(
            Scripted::new(vec![(vec!["a", "b", "c"], 0)]).with_values(vec![
                Fetched::Text("1".to_string()),
                Fetched::Missing,
                Fetched::Unsupported("list"),
            ]),
        );

        let pairs = collect(&store, &CancellationToken::new(), "*", true, 0)
            .await
            .unwrap();

        assert_eq!(
            pairs,
            vec![
                KeyValuePair::new("a", "1"),
                KeyValuePair::key_only("b"),
                KeyValuePair::key_only("c"),
            ]
        );
    }

    #[tokio::test]
    async fn tolerates_short_bulk_result() {
        let (store, _) = store(
            Scripted::new(vec![(vec!["a", "b"], 0)])
                .with_values(vec![Fetched::Text("1".to_string())]),
        );

        let pairs = collect(&store, &CancellationToken::new(), "*", true, 0)
            .await
            .unwrap();

        assert_eq!(
            pairs,
            vec![KeyValuePair::new("a", "1"), KeyValuePair::key_only("b")]
        );
    }

    #[tokio::test]
    async fn duplicate_keys_are_kept_once() {
        let (store, _) = store(Scripted::new(vec![
            (vec!["a", "b"], 3),
            (vec!["b", "c"], 0),
        ]));

        let pairs = collect(&store, &CancellationToken::new(), "*", false, 0)
            .await
            .unwrap();

        assert_eq!(keys(&pairs), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn scan_error_aborts() {
        let backend = Scripted::new(vec![(vec!["a"], 3)]);
        backend
            .batches
            .lock()
            .unwrap()
            .push_back(Err(BackendError::Cancelled));
        let (store, backend) = store(backend);

        let result = collect(&store, &CancellationToken::new(), "*", true, 0).await;

        assert!(matches!(result, Err(BackendError::Cancelled)));
        assert!(backend.bulk_gets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bounded_number_of_rounds() {
        let backend = std::sync::Arc::new(Scripted::new(vec![]));
        let store = Store::with_options(
            Shared(backend.clone()),
            StoreOptions {
                max_scan_rounds: 4,
                ..StoreOptions::default()
            },
        );

        let result = collect(&store, &CancellationToken::new(), "*", false, 0).await;

        assert!(matches!(result, Err(BackendError::ScanRoundsExceeded(4))));
        assert_eq!(backend.scans.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn memory_backend_in_three_batches() {
        let backend = MemoryBackend::new();
        for i in 0..25 {
            backend.set(format!("key{:02}", i), format!("value{}", i));
        }
        let store = Store::new(backend);

        let pairs = collect(&store, &CancellationToken::new(), "key*", true, 0)
            .await
            .unwrap();

        assert_eq!(pairs.len(), 25);
        assert_eq!(pairs[0], KeyValuePair::new("key00", "value0"));
        assert_eq!(pairs[24], KeyValuePair::new("key24", "value24"));
    }
}
