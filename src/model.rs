//! Core domain types for the gateway: business requests and responses.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::Amount;
use crate::ids::mask_card_number;

/// Kind of business transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Debit,
    Credit,
    Refund,
    Reversal,
    Balance,
    PreAuthorization,
    Completion,
}

impl TransactionType {
    /// Message type indicator used for a request of this type.
    pub fn mti(self) -> &'static str {
        match self {
            TransactionType::Debit | TransactionType::Credit => "0200",
            TransactionType::Reversal => "0400",
            TransactionType::Balance | TransactionType::PreAuthorization => "0100",
            TransactionType::Completion => "0220",
            // no dedicated message class
            TransactionType::Refund => "0200",
        }
    }

    /// Leading two digits of the processing code (field 3).
    pub fn processing_code(self) -> &'static str {
        match self {
            TransactionType::Debit | TransactionType::Reversal | TransactionType::Completion => {
                "00"
            }
            TransactionType::Credit | TransactionType::Refund => "20",
            TransactionType::Balance => "31",
            TransactionType::PreAuthorization => "03",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Debit => "DEBIT",
            TransactionType::Credit => "CREDIT",
            TransactionType::Refund => "REFUND",
            TransactionType::Reversal => "REVERSAL",
            TransactionType::Balance => "BALANCE",
            TransactionType::PreAuthorization => "PRE_AUTHORIZATION",
            TransactionType::Completion => "COMPLETION",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized transaction type '{0}'")]
pub struct UnknownTransactionType(pub String);

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBIT" => Ok(TransactionType::Debit),
            "CREDIT" => Ok(TransactionType::Credit),
            "REFUND" => Ok(TransactionType::Refund),
            "REVERSAL" => Ok(TransactionType::Reversal),
            "BALANCE" => Ok(TransactionType::Balance),
            "PRE_AUTHORIZATION" => Ok(TransactionType::PreAuthorization),
            "COMPLETION" => Ok(TransactionType::Completion),
            _ => Err(UnknownTransactionType(s.to_string())),
        }
    }
}

/// Response codes known to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Approved,
    ReferToIssuer,
    DoNotHonor,
    InvalidTransaction,
    InvalidAmount,
    InvalidCard,
    NoIssuer,
    OriginalNotFound,
    FormatError,
    LostCard,
    StolenCard,
    InsufficientFunds,
    ExpiredCard,
    InvalidPin,
    TransactionNotPermitted,
    Duplicate,
    SystemError,
    Timeout,
}

impl ResponseCode {
    const ALL: [ResponseCode; 18] = [
        ResponseCode::Approved,
        ResponseCode::ReferToIssuer,
        ResponseCode::DoNotHonor,
        ResponseCode::InvalidTransaction,
        ResponseCode::InvalidAmount,
        ResponseCode::InvalidCard,
        ResponseCode::NoIssuer,
        ResponseCode::OriginalNotFound,
        ResponseCode::FormatError,
        ResponseCode::LostCard,
        ResponseCode::StolenCard,
        ResponseCode::InsufficientFunds,
        ResponseCode::ExpiredCard,
        ResponseCode::InvalidPin,
        ResponseCode::TransactionNotPermitted,
        ResponseCode::Duplicate,
        ResponseCode::SystemError,
        ResponseCode::Timeout,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ResponseCode::Approved => "00",
            ResponseCode::ReferToIssuer => "01",
            ResponseCode::DoNotHonor => "05",
            ResponseCode::InvalidTransaction => "12",
            ResponseCode::InvalidAmount => "13",
            ResponseCode::InvalidCard => "14",
            ResponseCode::NoIssuer => "15",
            ResponseCode::OriginalNotFound => "25",
            ResponseCode::FormatError => "30",
            ResponseCode::LostCard => "41",
            ResponseCode::StolenCard => "43",
            ResponseCode::InsufficientFunds => "51",
            ResponseCode::ExpiredCard => "54",
            ResponseCode::InvalidPin => "55",
            ResponseCode::TransactionNotPermitted => "57",
            ResponseCode::Duplicate => "94",
            ResponseCode::SystemError => "96",
            ResponseCode::Timeout => "97",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ResponseCode::Approved => "Approved",
            ResponseCode::ReferToIssuer => "Refer to issuer",
            ResponseCode::DoNotHonor => "Do not honor",
            ResponseCode::InvalidTransaction => "Invalid transaction",
            ResponseCode::InvalidAmount => "Invalid amount",
            ResponseCode::InvalidCard => "Invalid card number",
            ResponseCode::NoIssuer => "No such issuer",
            ResponseCode::OriginalNotFound => "Original transaction not found",
            ResponseCode::FormatError => "Format error",
            ResponseCode::LostCard => "Lost card",
            ResponseCode::StolenCard => "Stolen card",
            ResponseCode::InsufficientFunds => "Insufficient funds",
            ResponseCode::ExpiredCard => "Expired card",
            ResponseCode::InvalidPin => "Invalid PIN",
            ResponseCode::TransactionNotPermitted => "Transaction not permitted",
            ResponseCode::Duplicate => "Duplicate transaction",
            ResponseCode::SystemError => "System error",
            ResponseCode::Timeout => "Timeout",
        }
    }

    /// Look up a host code; unknown codes fall back to `SystemError`.
    pub fn from_code(code: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|rc| rc.code() == code)
            .unwrap_or(ResponseCode::SystemError)
    }
}

/// Final status reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Failed,
}

/// Business request handed to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub card_number: String,
    pub transaction_type: TransactionType,
    pub amount: Option<Amount>,
    /// ISO 4217 alpha code, e.g. `USD`.
    pub currency_code: String,
    pub terminal_id: String,
    pub merchant_id: String,
    pub merchant_name: String,
    pub pos_entry_mode: String,
    pub merchant_category_code: Option<String>,
    /// `YYMM`
    pub card_expiry_date: Option<String>,
    pub invoice_number: Option<String>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub description: Option<String>,
    pub original_rrn: Option<String>,
    pub original_stan: Option<String>,
}

impl TransactionRequest {
    /// A request with the mandatory fields set and every optional one empty.
    pub fn new(
        transaction_type: TransactionType,
        card_number: impl Into<String>,
        amount: Option<Amount>,
        currency_code: impl Into<String>,
    ) -> Self {
        Self {
            card_number: card_number.into(),
            transaction_type,
            amount,
            currency_code: currency_code.into(),
            terminal_id: String::new(),
            merchant_id: String::new(),
            merchant_name: String::new(),
            pos_entry_mode: String::new(),
            merchant_category_code: None,
            card_expiry_date: None,
            invoice_number: None,
            from_account: None,
            to_account: None,
            description: None,
            original_rrn: None,
            original_stan: None,
        }
    }
}

/// Business response returned by every gateway operation.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: Option<String>,
    pub rrn: Option<String>,
    pub stan: Option<String>,
    pub auth_code: Option<String>,
    pub response_code: String,
    pub response_message: String,
    pub approved: bool,
    pub status: TransactionStatus,
    pub amount: Option<Amount>,
    pub currency_code: Option<String>,
    pub terminal_id: Option<String>,
    pub merchant_id: Option<String>,
    pub masked_card_number: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub transaction_date: Option<NaiveDateTime>,
    pub processing_time_ms: u64,
    pub host_response_code: Option<String>,
}

impl TransactionResponse {
    /// Response carrying only a code: message looked up, approval derived
    /// from the code.
    pub fn with_code(code: &str) -> Self {
        let approved = code == ResponseCode::Approved.code();
        Self {
            transaction_id: None,
            rrn: None,
            stan: None,
            auth_code: None,
            response_code: code.to_string(),
            response_message: ResponseCode::from_code(code).message().to_string(),
            approved,
            status: if approved {
                TransactionStatus::Success
            } else {
                TransactionStatus::Failed
            },
            amount: None,
            currency_code: None,
            terminal_id: None,
            merchant_id: None,
            masked_card_number: None,
            transaction_type: None,
            transaction_date: None,
            processing_time_ms: 0,
            host_response_code: None,
        }
    }

    /// Copy the identifying fields of the originating request.
    pub fn echo(mut self, request: &TransactionRequest) -> Self {
        self.amount = request.amount;
        self.currency_code = Some(request.currency_code.clone());
        self.terminal_id = Some(request.terminal_id.clone());
        self.merchant_id = Some(request.merchant_id.clone());
        self.masked_card_number = Some(mask_card_number(&request.card_number));
        self.transaction_type = Some(request.transaction_type);
        self
    }

    pub fn is_success(&self) -> bool {
        self.response_code == "00" || self.response_code == "000"
    }
}
