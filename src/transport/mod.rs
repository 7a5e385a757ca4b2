//! Pooled, length-prefixed TCP transport to the authorization host.

mod connection;
mod error;
mod pool;
mod retry;

pub use connection::{Connection, encode_frame};
pub use error::TransportError;
pub use pool::{ConnectionPool, PooledConnection};
pub use retry::{RetryPolicy, RetryingSender, backoff_delay};
