//! Error type shared by every store adapter.
//!
//! The reconciler distinguishes three situations: another writer won the
//! race ([`StoreError::Conflict`]), the store could not be reached
//! ([`StoreError::Unavailable`] or an adapter-specific transport error), and
//! the key holds something that is not a total ([`StoreError::Malformed`]).

use thiserror::Error;

/// Unified error type for all store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The watched key was modified between `watch` and `commit`.
    #[error("key `{0}` was modified by another writer")]
    Conflict(String),

    /// The store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The key holds a value that is not a non-negative integer.
    #[error("malformed total at `{key}`: {value:?}")]
    Malformed {
        /// The key that was read.
        key: String,
        /// The raw content, lossily decoded.
        value: String,
    },

    /// Error from the Redis client.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    /// Returns `true` if the error is an optimistic-lock conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Returns `true` if the error comes from the transport rather than
    /// from the data.
    pub fn is_transport(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            #[cfg(feature = "redis")]
            StoreError::Redis(e) => is_transport_error(e),
            _ => false,
        }
    }
}

/// Returns `true` if `e` means the connection is unusable, as opposed to a
/// reply from a healthy server (`WRONGTYPE`, a script error, ...).
#[cfg(feature = "redis")]
pub(crate) fn is_transport_error(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StoreError::Conflict("k".into()).is_conflict());
        assert!(!StoreError::Conflict("k".into()).is_transport());
        assert!(StoreError::Unavailable("down".into()).is_transport());

        let malformed = StoreError::Malformed {
            key: "k".into(),
            value: "abc".into(),
        };
        assert!(!malformed.is_conflict());
        assert!(!malformed.is_transport());
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(StoreError::from(redis::RedisError::from(io)).is_transport());

        let reply = redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ));
        let err = StoreError::from(reply);
        assert!(!err.is_transport());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_display() {
        let err = StoreError::Malformed {
            key: "total".into(),
            value: "12a".into(),
        };
        assert_eq!(err.to_string(), "malformed total at `total`: \"12a\"");
        assert_eq!(
            StoreError::Conflict("total".into()).to_string(),
            "key `total` was modified by another writer"
        );
    }
}
