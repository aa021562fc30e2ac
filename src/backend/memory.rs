use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use glob_match::glob_match;

use super::{Backend, BackendError, Fetched};

/// An in-process store kept in key order, cheap to clone and share.
///
/// Cursors are offsets into the ordered key space and `count` is the number of keys examined per
/// round, so a scan may return fewer keys than requested, just like Redis does. Patterns are glob
/// patterns where `*` does not cross a `/`.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<BTreeMap<String, Entry>>>,
}

#[derive(Clone, Debug)]
enum Entry {
    String(String),
    List(Vec<String>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::String(_) => "string",
            Entry::List(_) => "list",
        }
    }
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(key.into(), Entry::String(value.into()));
    }

    /// Appends to a list entry, replacing whatever else the key held.
    pub fn push(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut state = self.lock();
        let entry = state
            .entry(key.into())
            .or_insert_with(|| Entry::List(vec![]));

        match entry {
            Entry::List(values) => values.push(value.into()),
            entry => *entry = Entry::List(vec![value.into()]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        // The map is never left half-updated, a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        match self.lock().get(key) {
            None => Ok(None),
            Some(Entry::String(value)) => Ok(Some(value.clone())),
            Some(entry) => Err(BackendError::WrongType {
                key: key.to_string(),
                kind: entry.kind(),
            }),
        }
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(Vec<String>, u64), BackendError> {
        let state = self.lock();
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let count = count.max(1);

        let keys = state
            .keys()
            .skip(start)
            .take(count)
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();

        let next = start.saturating_add(count);
        let next_cursor = if next >= state.len() { 0 } else { next as u64 };

        Ok((keys, next_cursor))
    }

    async fn bulk_get(&self, keys: &[String]) -> Result<Vec<Fetched>, BackendError> {
        let state = self.lock();

        let values = keys
            .iter()
            .map(|key| match state.get(key) {
                None => Fetched::Missing,
                Some(Entry::String(value)) => Fetched::Text(value.clone()),
                Some(entry) => Fetched::Unsupported(entry.kind()),
            })
            .collect();

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_string() {
        let backend = MemoryBackend::new();
        backend.set("key1", "value1");

        assert_eq!(
            backend.get("key1").await.unwrap(),
            Some("value1".to_string())
        );
        assert_eq!(backend.get("key2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_wrong_type() {
        let backend = MemoryBackend::new();
        backend.push("list", "a");

        let err = backend.get("list").await.err().unwrap();

        assert!(matches!(err, BackendError::WrongType { kind: "list", .. }));
    }

    #[tokio::test]
    async fn scan_in_batches() {
        let backend = MemoryBackend::new();
        for i in 0..5 {
            backend.set(format!("key{}", i), i.to_string());
        }

        let (keys, cursor) = backend.scan(0, "key*", 2).await.unwrap();
        assert_eq!(keys, vec!["key0", "key1"]);
        assert_eq!(cursor, 2);

        let (keys, cursor) = backend.scan(cursor, "key*", 2).await.unwrap();
        assert_eq!(keys, vec!["key2", "key3"]);
        assert_eq!(cursor, 4);

        let (keys, cursor) = backend.scan(cursor, "key*", 2).await.unwrap();
        assert_eq!(keys, vec!["key4"]);
        assert_eq!(cursor, 0);
    }

    #[tokio::test]
    async fn scan_filters_by_pattern() {
        let backend = MemoryBackend::new();
        backend.set("alpha", "1");
        backend.set("beta", "2");
        backend.set("apple", "3");

        let (keys, cursor) = backend.scan(0, "a*", 10).await.unwrap();

        assert_eq!(keys, vec!["alpha", "apple"]);
        assert_eq!(cursor, 0);
    }

    #[tokio::test]
    async fn scan_empty_store() {
        let backend = MemoryBackend::new();

        let (keys, cursor) = backend.scan(0, "*", 10).await.unwrap();

        assert!(keys.is_empty());
        assert_eq!(cursor, 0);
    }

    #[tokio::test]
    async fn bulk_get_mixed() {
        let backend = MemoryBackend::new();
        backend.set("a", "1");
        backend.push("b", "x");

        let values = backend
            .bulk_get(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(
            values,
            vec![
                Fetched::Text("1".to_string()),
                Fetched::Unsupported("list"),
                Fetched::Missing
            ]
        );
    }

    #[tokio::test]
    async fn push_replaces_string() {
        let backend = MemoryBackend::new();
        backend.set("key", "value");
        backend.push("key", "item");

        let values = backend.bulk_get(&["key".to_string()]).await.unwrap();

        assert_eq!(values, vec![Fetched::Unsupported("list")]);
    }
}
