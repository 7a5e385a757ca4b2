use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::amount::{Amount, ParseAmountError};
use crate::model::{TransactionRequest, TransactionResponse, TransactionStatus, TransactionType};

/// Errors that can occur when reading requests or writing responses
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open csv file: {0}")]
    Open(csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized transaction type '{tx_type}'")]
    UnrecognizedType { line: usize, tx_type: String },

    #[error("line {line}: {source}")]
    InvalidAmount {
        line: usize,
        source: ParseAmountError,
    },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush csv output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    card: String,
    amount: Option<String>,
    currency: String,
    terminal: String,
    merchant: String,
    #[serde(default)]
    merchant_name: String,
    #[serde(default)]
    pos_entry_mode: String,
    #[serde(default)]
    mcc: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(default)]
    invoice: Option<String>,
    #[serde(default)]
    from_account: Option<String>,
    #[serde(default)]
    to_account: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    original_rrn: Option<String>,
    #[serde(default)]
    original_stan: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    r#type: &'a str,
    card: &'a str,
    amount: String,
    currency: &'a str,
    rrn: &'a str,
    stan: &'a str,
    auth_code: &'a str,
    response_code: &'a str,
    response_message: &'a str,
    approved: bool,
    status: TransactionStatus,
    processing_time_ms: u64,
}

impl InputRow {
    fn into_request(self, line: usize) -> Result<TransactionRequest, CsvError> {
        let transaction_type: TransactionType =
            self.r#type.parse().map_err(|_| CsvError::UnrecognizedType {
                line,
                tx_type: self.r#type.clone(),
            })?;
        let amount = self
            .amount
            .map(|raw| raw.parse::<Amount>())
            .transpose()
            .map_err(|source| CsvError::InvalidAmount { line, source })?;

        let mut request =
            TransactionRequest::new(transaction_type, self.card, amount, self.currency);
        request.terminal_id = self.terminal;
        request.merchant_id = self.merchant;
        request.merchant_name = self.merchant_name;
        request.pos_entry_mode = self.pos_entry_mode;
        request.merchant_category_code = self.mcc;
        request.card_expiry_date = self.expiry;
        request.invoice_number = self.invoice;
        request.from_account = self.from_account;
        request.to_account = self.to_account;
        request.description = self.description;
        request.original_rrn = self.original_rrn;
        request.original_stan = self.original_stan;
        Ok(request)
    }
}

/// Read transaction requests from a csv file with a header row
pub fn read_requests(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<TransactionRequest, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            row.into_request(line)
        }))
}

/// Write one row per response to `writer`
pub fn write_responses_to<'a, W: io::Write>(
    writer: W,
    responses: impl IntoIterator<Item = &'a TransactionResponse>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for response in responses {
        let row = OutputRow {
            r#type: response.transaction_type.map_or("", TransactionType::as_str),
            card: response.masked_card_number.as_deref().unwrap_or_default(),
            amount: response.amount.map(|a| a.to_string()).unwrap_or_default(),
            currency: response.currency_code.as_deref().unwrap_or_default(),
            rrn: response.rrn.as_deref().unwrap_or_default(),
            stan: response.stan.as_deref().unwrap_or_default(),
            auth_code: response.auth_code.as_deref().unwrap_or_default(),
            response_code: &response.response_code,
            response_message: &response.response_message,
            approved: response.approved,
            status: response.status,
            processing_time_ms: response.processing_time_ms,
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write responses to stdout in csv format
pub fn write_responses<'a>(
    responses: impl IntoIterator<Item = &'a TransactionResponse>,
) -> Result<(), CsvError> {
    let stdout = io::stdout();
    write_responses_to(stdout.lock(), responses)
}
