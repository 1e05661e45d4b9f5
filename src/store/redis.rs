//! Redis-backed shared store.
//!
//! `WATCH` is scoped to a connection, so [`RedisStore`] owns one dedicated
//! synchronous connection behind a mutex instead of a multiplexed one. A
//! transaction holds the connection for its whole lifetime:
//!
//! ```text
//! WATCH key  →  GET key  →  MULTI / SET key value / EXEC
//! ```
//!
//! `EXEC` answers nil when the watched key changed, which is reported as
//! [`StoreError::Conflict`]. Dropping a transaction without committing sends
//! `UNWATCH` so the connection can be reused.
//!
//! # Reconnection
//!
//! Transport errors (I/O, dropped or refused connections, timeouts) are
//! counted; error replies from the server are not. After
//! [`ERRORS_TO_RECONNECT`] consecutive transport failures the connection is
//! dropped and a fresh one is opened on the next operation.
//!
//! # Feature Flag
//!
//! ```toml
//! [dependencies]
//! condiviso = { version = "0.1", features = ["redis"] }
//! ```

use super::error::is_transport_error;
use super::{parse_total, Result, SharedStore, StoreError, StoreTransaction};
use crate::config::CounterConfig;
use parking_lot::{Mutex, MutexGuard};
use redis::{Client, Connection, Value};

/// Consecutive transport errors tolerated before the connection is replaced.
pub const ERRORS_TO_RECONNECT: usize = 3;

#[derive(Default)]
struct Link {
    connection: Option<Connection>,
    consecutive_errors: usize,
}

impl Link {
    fn connection(&mut self, client: &Client) -> Result<&mut Connection> {
        if self.connection.is_none() {
            let conn = client.get_connection().map_err(|e| {
                tracing::error!(error = %e, "failed to connect to redis");
                e
            })?;
            self.connection = Some(conn);
        }
        self.connection
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("redis connection not established".into()))
    }

    /// Records the outcome of a command, dropping the connection after too
    /// many consecutive transport errors. Error replies from the server
    /// prove the connection works and reset the count.
    fn track<T>(&mut self, result: redis::RedisResult<T>) -> Result<T> {
        match result {
            Ok(v) => {
                self.consecutive_errors = 0;
                Ok(v)
            }
            Err(e) if !is_transport_error(&e) => {
                self.consecutive_errors = 0;
                Err(e.into())
            }
            Err(e) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= ERRORS_TO_RECONNECT {
                    tracing::warn!(
                        errors = self.consecutive_errors,
                        "dropping redis connection after repeated failures"
                    );
                    self.connection = None;
                    self.consecutive_errors = 0;
                }
                Err(e.into())
            }
        }
    }

    fn query<T: redis::FromRedisValue>(&mut self, client: &Client, cmd: &redis::Cmd) -> Result<T> {
        let result = {
            let conn = self.connection(client)?;
            cmd.query::<T>(conn)
        };
        self.track(result)
    }
}

/// A [`SharedStore`] backed by a Redis server.
///
/// # Examples
///
/// ```rust,ignore
/// use condiviso::store::redis::RedisStore;
/// use condiviso::counter::SharedCounter;
/// use condiviso::config::CounterConfig;
///
/// let store = RedisStore::open("redis://127.0.0.1:6379")?;
/// let counter = SharedCounter::new(store, CounterConfig::default());
/// counter.sync_now()?;
/// ```
pub struct RedisStore {
    client: Client,
    link: Mutex<Link>,
}

impl RedisStore {
    /// Validates `url` and prepares a store. No connection is opened until
    /// the first operation.
    pub fn open(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        tracing::info!(%url, "using redis shared store");
        Ok(Self::with_client(client))
    }

    /// Prepares a store at [`CounterConfig::redis_url`].
    ///
    /// ```rust,ignore
    /// let config = CounterConfig::from_env()?;
    /// let store = RedisStore::from_config(&config)?;
    /// let counter = SharedCounter::new(store, config);
    /// ```
    pub fn from_config(config: &CounterConfig) -> Result<Self> {
        Self::open(&config.redis_url)
    }

    /// Wraps an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            link: Mutex::new(Link::default()),
        }
    }

    fn read(link: &mut Link, client: &Client, key: &str) -> Result<Option<u64>> {
        let raw: Option<Vec<u8>> = link.query(client, redis::cmd("GET").arg(key))?;
        raw.map(|raw| parse_total(key, &raw)).transpose()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection_info", self.client.get_connection_info())
            .finish()
    }
}

impl SharedStore for RedisStore {
    type Transaction<'a> = RedisTransaction<'a>;

    fn get(&self, key: &str) -> Result<Option<u64>> {
        let mut link = self.link.lock();
        Self::read(&mut link, &self.client, key)
    }

    fn set(&self, key: &str, value: u64) -> Result<()> {
        self.link
            .lock()
            .query(&self.client, redis::cmd("SET").arg(key).arg(value))
    }

    fn watch<'a>(&'a self, key: &str) -> Result<RedisTransaction<'a>> {
        let mut link = self.link.lock();
        link.query::<()>(&self.client, redis::cmd("WATCH").arg(key))?;
        Ok(RedisTransaction {
            client: &self.client,
            link,
            key: key.to_string(),
            open: true,
        })
    }
}

/// A `WATCH` held on a [`RedisStore`] connection.
pub struct RedisTransaction<'a> {
    client: &'a Client,
    link: MutexGuard<'a, Link>,
    key: String,
    open: bool,
}

impl StoreTransaction for RedisTransaction<'_> {
    fn get(&mut self) -> Result<Option<u64>> {
        RedisStore::read(&mut self.link, self.client, &self.key)
    }

    fn commit(mut self, value: u64) -> Result<()> {
        // EXEC clears the watch whatever its outcome.
        self.open = false;
        let result = {
            let conn = self.link.connection(self.client)?;
            redis::pipe()
                .atomic()
                .set(&self.key, value)
                .query::<Value>(conn)
        };
        match self.link.track(result)? {
            Value::Nil => Err(StoreError::Conflict(self.key.clone())),
            _ => Ok(()),
        }
    }
}

impl Drop for RedisTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self
                .link
                .query::<()>(self.client, &redis::cmd("UNWATCH"))
            {
                tracing::debug!(error = %e, key = %self.key, "failed to release watch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn io_error() -> redis::RedisResult<()> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe").into())
    }

    fn reply_error() -> redis::RedisResult<()> {
        Err((redis::ErrorKind::TypeError, "WRONGTYPE").into())
    }

    #[test]
    fn test_from_config() {
        let vars: HashMap<&str, &str> = [("CONDIVISO_REDIS_URL", "redis://cache.internal:6380/2")]
            .into_iter()
            .collect();
        let config =
            CounterConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        // Opening validates the URL without connecting.
        let store = RedisStore::from_config(&config).unwrap();
        let debug = format!("{:?}", store);
        assert!(debug.contains("cache.internal"), "{}", debug);
        assert!(debug.contains("6380"), "{}", debug);
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = CounterConfig::new().with_redis_url("not a url");
        let err = RedisStore::from_config(&config).unwrap_err();
        assert!(matches!(err, StoreError::Redis(_)));
    }

    #[test]
    fn test_transport_errors_drop_connection() {
        let mut link = Link::default();
        for expected in 1..ERRORS_TO_RECONNECT {
            assert!(link.track(io_error()).is_err());
            assert_eq!(link.consecutive_errors, expected);
        }
        assert!(link.track(io_error()).is_err());
        assert_eq!(link.consecutive_errors, 0);
        assert!(link.connection.is_none());
    }

    #[test]
    fn test_reply_errors_do_not_count() {
        let mut link = Link::default();
        link.track(io_error()).unwrap_err();
        link.track(io_error()).unwrap_err();

        let err = link.track(reply_error()).unwrap_err();
        assert!(!err.is_transport());
        assert_eq!(link.consecutive_errors, 0);

        for _ in 0..ERRORS_TO_RECONNECT * 2 {
            link.track(reply_error()).unwrap_err();
        }
        assert_eq!(link.consecutive_errors, 0);
    }

    /// Needs a server at `CONDIVISO_REDIS_URL` (default `redis://127.0.0.1:6379`).
    /// Run with `cargo test --features redis -- --ignored`.
    #[test]
    #[ignore]
    fn test_live_watch_contract() {
        let config = CounterConfig::from_env().unwrap();
        let key = "condiviso_test_watch_contract";
        let store = RedisStore::from_config(&config).unwrap();
        let mut other = Client::open(config.redis_url.as_str())
            .unwrap()
            .get_connection()
            .unwrap();

        store.set(key, 100).unwrap();

        // Untouched key commits.
        let mut txn = store.watch(key).unwrap();
        assert_eq!(txn.get().unwrap(), Some(100));
        txn.commit(105).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(105));

        // A write from another connection turns EXEC into a conflict.
        let mut txn = store.watch(key).unwrap();
        assert_eq!(txn.get().unwrap(), Some(105));
        redis::cmd("SET")
            .arg(key)
            .arg(200)
            .query::<()>(&mut other)
            .unwrap();
        let err = txn.commit(110).unwrap_err();
        assert!(err.is_conflict(), "{}", err);
        assert_eq!(store.get(key).unwrap(), Some(200));

        // Dropping an open transaction sends UNWATCH: a foreign write made
        // afterwards must not poison the next plain transaction.
        {
            let mut txn = store.watch(key).unwrap();
            txn.get().unwrap();
        }
        redis::cmd("SET")
            .arg(key)
            .arg(300)
            .query::<()>(&mut other)
            .unwrap();
        let txn = store.watch(key).unwrap();
        txn.commit(301).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(301));

        redis::cmd("DEL").arg(key).query::<()>(&mut other).unwrap();
    }
}
