//! Translation between business transactions and protocol messages.

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::amount::{format_iso, parse_iso};
use crate::codec::{ProtocolMessage, canonicalize, standard_fields};
use crate::ids::{generate_auth_code, generate_transaction_id, mask_card_number};
use crate::model::{TransactionRequest, TransactionResponse};

const MERCHANT_NAME_WIDTH: usize = 40;
/// Normal presentation.
const POS_CONDITION_CODE: &str = "00";
const PIN_CAPTURE_CODE: &str = "12";
/// Fixed acquiring institution placeholder.
const ACQUIRER_ID: &str = "123456";
const MISSING_RESPONSE_CODE: &str = "96";

/// Build the outbound message for a business request.
///
/// Short fixed-length values come back padded to their wire width.
pub fn build_request(
    request: &TransactionRequest,
    stan: &str,
    rrn: &str,
    now: NaiveDateTime,
) -> ProtocolMessage {
    let mti = request.transaction_type.mti();
    let mut msg = ProtocolMessage::new(mti);

    msg.set(2, request.card_number.as_str())
        .set(3, processing_code(request))
        .set(4, format_iso(request.amount))
        .set(7, now.format("%m%d%H%M%S").to_string())
        .set(11, stan)
        .set(12, now.format("%H%M%S").to_string())
        .set(13, now.format("%m%d").to_string());

    if let Some(expiry) = &request.card_expiry_date {
        msg.set(14, expiry.as_str());
    }
    if let Some(mcc) = &request.merchant_category_code {
        msg.set(18, mcc.as_str());
    }

    msg.set(22, request.pos_entry_mode.as_str())
        .set(25, POS_CONDITION_CODE)
        .set(26, PIN_CAPTURE_CODE)
        .set(32, ACQUIRER_ID);

    if let Some(expiry) = &request.card_expiry_date {
        msg.set(35, format!("{}={expiry}", request.card_number));
    }

    msg.set(37, rrn)
        .set(41, request.terminal_id.as_str())
        .set(42, request.merchant_id.as_str())
        .set(43, merchant_name(&request.merchant_name))
        .set(49, request.currency_code.as_str());

    if let Some(invoice) = &request.invoice_number {
        msg.set(60, format!("INV{invoice}"));
    }
    if let Some(description) = request.description.as_deref().filter(|d| !d.is_empty()) {
        msg.set(62, description);
    }
    if let Some(from) = &request.from_account {
        msg.set(102, from.as_str());
    }
    if let Some(to) = &request.to_account {
        msg.set(103, to.as_str());
    }

    canonicalize(&mut msg, standard_fields());
    info!(mti, stan, rrn, "built request message");
    debug!("outbound message\n{msg}");
    msg
}

/// Build a reversal (0400) for a previously sent request.
///
/// Fields 11 and 37 reuse the original STAN and RRN so the host can link the
/// reversal to the transaction it cancels.
pub fn build_reversal(
    request: &TransactionRequest,
    original_rrn: &str,
    original_stan: &str,
    now: NaiveDateTime,
) -> ProtocolMessage {
    let mut msg = ProtocolMessage::new("0400");
    let date = now.format("%m%d").to_string();
    let time = now.format("%H%M%S").to_string();

    msg.set(2, request.card_number.as_str())
        .set(3, processing_code(request))
        .set(4, format_iso(request.amount))
        .set(11, original_stan)
        .set(12, time.as_str())
        .set(13, date.as_str())
        .set(37, original_rrn)
        .set(41, request.terminal_id.as_str())
        .set(42, request.merchant_id.as_str())
        .set(49, request.currency_code.as_str())
        .set(90, format!("{original_stan}{date}{time}"));

    canonicalize(&mut msg, standard_fields());
    info!(rrn = original_rrn, stan = original_stan, "built reversal message");
    debug!("outbound message\n{msg}");
    msg
}

/// Interpret a host reply as a business response.
///
/// A missing field 38 gets a freshly generated auth code.
pub fn parse_response(msg: &ProtocolMessage) -> TransactionResponse {
    let code = msg.get_str(39).unwrap_or(MISSING_RESPONSE_CODE);
    let mut response = TransactionResponse::with_code(code);

    response.transaction_id = Some(generate_transaction_id());
    response.rrn = msg.get_str(37).map(str::to_string);
    response.stan = msg.get_str(11).map(str::to_string);
    response.auth_code = Some(
        msg.get_str(38)
            .map_or_else(generate_auth_code, str::to_string),
    );
    response.host_response_code = Some(code.to_string());
    response.transaction_date = Some(chrono::Local::now().naive_local());

    if let Some(card) = msg.get_str(2) {
        response.masked_card_number = Some(mask_card_number(card));
    }
    if let Some(field) = msg.get_str(4) {
        let amount = parse_iso(field);
        if amount.is_none() {
            warn!(field, "unparseable amount in response, using zero");
        }
        response.amount = Some(amount.unwrap_or_default());
    }
    response.terminal_id = msg.get_str(41).map(str::to_string);
    response.merchant_id = msg.get_str(42).map(str::to_string);
    response.currency_code = msg.get_str(49).map(str::to_string);

    info!(
        code = %response.response_code,
        message = %response.response_message,
        "parsed host response"
    );
    response
}

/// `<type code><from account class><to account class>`
fn processing_code(request: &TransactionRequest) -> String {
    let from = request.from_account.as_deref().map_or("00", account_class);
    let to = request.to_account.as_deref().map_or("00", account_class);
    format!("{}{from}{to}", request.transaction_type.processing_code())
}

fn account_class(account: &str) -> &'static str {
    if account.starts_with('4') {
        // savings
        "10"
    } else if account.starts_with('5') {
        // checking
        "20"
    } else {
        "00"
    }
}

/// Pad or truncate to exactly 40 bytes, never splitting a character.
fn merchant_name(name: &str) -> String {
    let mut end = name.len().min(MERCHANT_NAME_WIDTH);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut padded = name[..end].to_string();
    padded.push_str(&" ".repeat(MERCHANT_NAME_WIDTH - end));
    padded
}
