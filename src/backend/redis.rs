use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value};
use tracing::info;

use super::{Backend, BackendError, Fetched};

/// Redis (or any server speaking its protocol) as the dictionary store.
///
/// The connection manager multiplexes every call over one connection and reconnects on failure,
/// so a clone is all a concurrent caller needs.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> Result<RedisBackend, BackendError> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected to Redis");

        Ok(RedisBackend { manager })
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;

        Ok(value)
    }

    // Ref: <https://redis.io/docs/latest/commands/scan/>
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(Vec<String>, u64), BackendError> {
        let mut conn = self.manager.clone();
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        Ok((keys, next_cursor))
    }

    async fn bulk_get(&self, keys: &[String]) -> Result<Vec<Fetched>, BackendError> {
        // MGET without keys is a syntax error.
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.manager.clone();
        let values: Vec<Value> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;

        Ok(values.into_iter().map(Fetched::from).collect())
    }
}

impl From<Value> for Fetched {
    fn from(value: Value) -> Self {
        match value {
            Value::Nil => Fetched::Missing,
            Value::Data(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Fetched::Text(text),
                Err(_) => Fetched::Unsupported("binary"),
            },
            Value::Int(_) => Fetched::Unsupported("integer"),
            Value::Bulk(_) => Fetched::Unsupported("array"),
            _ => Fetched::Unsupported("status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetched_from_value() {
        assert_eq!(Fetched::from(Value::Nil), Fetched::Missing);
        assert_eq!(
            Fetched::from(Value::Data(b"value".to_vec())),
            Fetched::Text("value".to_string())
        );
        assert_eq!(
            Fetched::from(Value::Data(vec![0xff, 0xfe])),
            Fetched::Unsupported("binary")
        );
        assert_eq!(Fetched::from(Value::Int(1)), Fetched::Unsupported("integer"));
        assert_eq!(
            Fetched::from(Value::Bulk(vec![])),
            Fetched::Unsupported("array")
        );
    }
}
