//! Transaction orchestration.
//!
//! The gateway turns business requests into protocol round trips and keeps
//! the bookkeeping needed to reverse them later. Its business operations
//! never fail: every error becomes a response whose code says what went
//! wrong.

use chrono::Local;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::codec::FieldTable;
use crate::config::GatewayConfig;
use crate::ids::{generate_request_id, generate_rrn, generate_stan, generate_transaction_id};
use crate::mapper;
use crate::model::{ResponseCode, TransactionRequest, TransactionResponse, TransactionType};
use crate::transport::{ConnectionPool, RetryPolicy, RetryingSender};

mod error;
pub use error::{GatewayError, ValidationError};

mod pending;
pub use pending::{PendingReversals, ReversalClaim};

const REVERSAL_FAILED: &str = "Reversal failed";
const TRANSACTION_FOUND: &str = "Transaction found";

/// The transaction gateway.
///
/// Sends business requests to the authorization host over a shared pool and
/// tracks transactions that may still be reversed.
pub struct Gateway {
    sender: RetryingSender,
    pending: PendingReversals,
    accepting: AtomicBool,
}

/// Public API
impl Gateway {
    /// Validate the configuration, warm up the pool and build a gateway
    /// using the standard field table.
    pub async fn connect(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::connect_with_fields(config, FieldTable::default()).await
    }

    pub async fn connect_with_fields(
        config: GatewayConfig,
        fields: FieldTable,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let policy = RetryPolicy::from_config(&config);
        let pool = ConnectionPool::connect(Arc::new(config)).await;
        Ok(Self {
            sender: RetryingSender::new(pool, Arc::new(fields), policy),
            pending: PendingReversals::new(),
            accepting: AtomicBool::new(true),
        })
    }

    /// Authorize one transaction with the host.
    ///
    /// Approved debits and every declined outcome stay reversible under the
    /// RRN sent to the host.
    pub async fn process_transaction(&self, request: &TransactionRequest) -> TransactionResponse {
        let started = Instant::now();
        let request_id = generate_request_id();
        info!(
            request_id,
            transaction_type = %request.transaction_type,
            terminal = %request.terminal_id,
            amount = ?request.amount,
            "processing transaction"
        );

        let mut response = match self.authorize(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(request_id, error = %e, "transaction failed");
                system_error(request)
            }
        };
        response.processing_time_ms = elapsed_ms(started);

        info!(
            request_id,
            code = %response.response_code,
            approved = response.approved,
            processing_time_ms = response.processing_time_ms,
            "transaction completed"
        );
        response
    }

    /// Run [`process_transaction`](Self::process_transaction) on its own task.
    pub fn process_transaction_async(
        self: &Arc<Self>,
        request: TransactionRequest,
    ) -> JoinHandle<TransactionResponse> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move { gateway.process_transaction(&request).await })
    }

    /// Reverse a transaction previously processed by this gateway.
    ///
    /// An RRN that is not pending gets code 25 without contacting the host.
    /// The entry is claimed for the duration of the reversal, so a concurrent
    /// reversal of the same RRN also sees 25. Unless the host approves, the
    /// entry comes back, also when this future is dropped mid-send.
    pub async fn reverse_transaction(&self, rrn: &str, stan: &str) -> TransactionResponse {
        let started = Instant::now();
        info!(rrn, stan, "processing reversal");

        if !self.is_accepting() {
            warn!(rrn, "reversal refused, gateway is shutting down");
            let mut response = TransactionResponse::with_code(ResponseCode::SystemError.code());
            response.rrn = Some(rrn.to_string());
            response.stan = Some(stan.to_string());
            return response;
        }

        let Some(claim) = self.pending.claim(rrn) else {
            warn!(rrn, "original transaction not found for reversal");
            let mut response =
                TransactionResponse::with_code(ResponseCode::OriginalNotFound.code());
            response.rrn = Some(rrn.to_string());
            response.stan = Some(stan.to_string());
            response.processing_time_ms = elapsed_ms(started);
            return response;
        };

        let original = claim.request();
        let message = mapper::build_reversal(original, rrn, stan, Local::now().naive_local());
        let mut response = match self.sender.send(&message).await {
            Ok(reply) => {
                let mut response = mapper::parse_response(&reply);
                response.transaction_type = Some(TransactionType::Reversal);
                if response.is_success() {
                    info!(rrn, "reversal approved");
                    claim.consume();
                }
                response
            }
            Err(e) => {
                error!(rrn, error = %e, "reversal failed");
                let mut response =
                    TransactionResponse::with_code(ResponseCode::SystemError.code()).echo(original);
                response.response_message = REVERSAL_FAILED.to_string();
                response
            }
        };
        response.rrn.get_or_insert_with(|| rrn.to_string());
        response.stan.get_or_insert_with(|| stan.to_string());
        response.processing_time_ms = elapsed_ms(started);
        response
    }

    /// Placeholder lookup: no transaction log is kept, so every RRN is
    /// reported as found.
    pub fn transaction_status(&self, rrn: &str) -> TransactionResponse {
        let mut response = TransactionResponse::with_code(ResponseCode::Approved.code());
        response.rrn = Some(rrn.to_string());
        response.response_message = TRANSACTION_FOUND.to_string();
        response
    }

    /// Process a stream of requests concurrently, at most `max_connections`
    /// at a time, returning responses in input order.
    ///
    /// Reversal requests that name both an original RRN and STAN are routed
    /// to [`reverse_transaction`](Self::reverse_transaction).
    pub async fn run(
        self: &Arc<Self>,
        mut stream: impl Stream<Item = TransactionRequest> + Unpin,
    ) -> Vec<TransactionResponse> {
        let window = self.pool().config().max_connections.max(1);
        let mut in_flight = VecDeque::with_capacity(window);
        let mut responses = Vec::new();

        while let Some(request) = stream.next().await {
            if in_flight.len() >= window {
                if let Some(handle) = in_flight.pop_front() {
                    responses.push(join(handle).await);
                }
            }
            in_flight.push_back(self.submit(request));
        }
        while let Some(handle) = in_flight.pop_front() {
            responses.push(join(handle).await);
        }
        responses
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        self.sender.pool()
    }

    pub fn pending_reversals(&self) -> &PendingReversals {
        &self.pending
    }

    /// Forget reversible transactions older than `max_age`.
    pub fn purge_pending_reversals(&self, max_age: Duration) -> usize {
        let purged = self.pending.purge_older_than(max_age);
        if purged > 0 {
            info!(purged, "purged pending reversals");
        }
        purged
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop taking work, then shut the pool down. In-flight requests get the
    /// pool's grace period; pending backoff waits are interrupted.
    pub async fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!("gateway shutting down");
            self.pool().shutdown().await;
        }
    }
}

/// Private methods
impl Gateway {
    async fn authorize(&self, request: &TransactionRequest) -> Result<TransactionResponse, GatewayError> {
        if !self.is_accepting() {
            return Err(GatewayError::ShuttingDown);
        }
        validate(request)?;

        let stan = generate_stan();
        let rrn = generate_rrn();
        let message = mapper::build_request(request, &stan, &rrn, Local::now().naive_local());
        let reply = self.sender.send(&message).await?;

        let mut response = mapper::parse_response(&reply);
        response.transaction_type = Some(request.transaction_type);
        response.rrn.get_or_insert_with(|| rrn.clone());
        response.stan.get_or_insert_with(|| stan.clone());

        let success = response.is_success();
        if !success || request.transaction_type == TransactionType::Debit {
            self.pending.insert(rrn, request.clone());
        }
        Ok(response)
    }

    fn submit(self: &Arc<Self>, request: TransactionRequest) -> JoinHandle<TransactionResponse> {
        match (
            request.transaction_type,
            request.original_rrn.clone(),
            request.original_stan.clone(),
        ) {
            (TransactionType::Reversal, Some(rrn), Some(stan)) => {
                let gateway = Arc::clone(self);
                tokio::spawn(async move { gateway.reverse_transaction(&rrn, &stan).await })
            }
            _ => self.process_transaction_async(request),
        }
    }
}

/// Amount must be present and strictly positive.
pub fn validate(request: &TransactionRequest) -> Result<(), ValidationError> {
    match request.amount {
        None => Err(ValidationError::MissingAmount),
        Some(amount) if !amount.is_positive() => {
            Err(ValidationError::NonPositiveAmount(amount.to_string()))
        }
        Some(_) => Ok(()),
    }
}

fn system_error(request: &TransactionRequest) -> TransactionResponse {
    let mut response =
        TransactionResponse::with_code(ResponseCode::SystemError.code()).echo(request);
    response.transaction_id = Some(generate_transaction_id());
    response.transaction_date = Some(Local::now().naive_local());
    response
}

async fn join(handle: JoinHandle<TransactionResponse>) -> TransactionResponse {
    handle.await.unwrap_or_else(|e| {
        error!(error = %e, "transaction task failed");
        TransactionResponse::with_code(ResponseCode::SystemError.code())
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
