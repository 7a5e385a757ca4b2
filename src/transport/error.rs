//! Error types for host communication.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::codec::{DecodingError, EncodingError};

/// Error raised by the connection pool, a framed exchange or the retrying
/// sender.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("could not resolve host {0}")]
    UnresolvedHost(String),

    #[error("connect to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("no response within {0:?}")]
    ReadTimeout(Duration),

    #[error("no connection available within {0:?}")]
    NoConnectionAvailable(Duration),

    #[error("connection pool is shut down")]
    PoolClosed,

    #[error("frame of {len} bytes does not fit a {width}-byte length prefix")]
    FrameTooLarge { len: usize, width: usize },

    #[error("retry wait interrupted by shutdown")]
    Interrupted,

    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("decoding failed: {0}")]
    Decoding(#[from] DecodingError),
}

impl TransportError {
    /// Whether another attempt on a fresh connection may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_)
                | TransportError::UnresolvedHost(_)
                | TransportError::ConnectTimeout { .. }
                | TransportError::ReadTimeout(_)
                | TransportError::NoConnectionAvailable(_)
        )
    }
}
