pub mod amount;
pub mod codec;
pub mod config;
pub mod csv;
pub mod gateway;
pub mod ids;
pub mod mapper;
pub mod model;
pub mod transport;

pub use amount::Amount;
pub use config::{ConfigError, GatewayConfig};
pub use gateway::{Gateway, GatewayError, ValidationError};
pub use model::{
    ResponseCode, TransactionRequest, TransactionResponse, TransactionStatus, TransactionType,
};
