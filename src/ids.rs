//! Identifier generation and card masking.
//!
//! STAN and RRN are not collision-free: STAN is random and RRN derives from
//! the wall clock, so two requests may share either under load.

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

const RRN_MODULUS: i64 = 1_000_000_000_000;

/// 6-digit zero-padded random system trace audit number.
pub fn generate_stan() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

/// 12-digit retrieval reference number: current epoch millis modulo 10^12.
pub fn generate_rrn() -> String {
    let millis = Utc::now().timestamp_millis().rem_euclid(RRN_MODULUS);
    format!("{millis:012}")
}

/// 16 uppercase hex characters, used for tracing only.
pub fn generate_request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id.to_ascii_uppercase()
}

/// Transaction id attached to parsed responses.
pub fn generate_transaction_id() -> String {
    Uuid::new_v4().to_string()
}

/// Random 6-digit approval code, used when the host omits field 38.
pub fn generate_auth_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

/// Show the first 6 digits, six `*`, then everything from position 12 on.
///
/// Numbers shorter than 16 characters come back unmasked.
pub fn mask_card_number(card: &str) -> String {
    if card.len() < 16 || !card.is_ascii() {
        return card.to_string();
    }
    format!("{}******{}", &card[..6], &card[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_digits(s: &str) -> bool {
        s.bytes().all(|b| b.is_ascii_digit())
    }

    #[test]
    fn stan_is_six_digits() {
        for _ in 0..100 {
            let stan = generate_stan();
            assert_eq!(stan.len(), 6);
            assert!(all_digits(&stan));
        }
    }

    #[test]
    fn rrn_is_twelve_digits() {
        let rrn = generate_rrn();
        assert_eq!(rrn.len(), 12);
        assert!(all_digits(&rrn));
    }

    #[test]
    fn request_id_is_uppercase_hex() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn auth_code_is_six_digits() {
        let code = generate_auth_code();
        assert_eq!(code.len(), 6);
        assert!(all_digits(&code));
    }

    #[test]
    fn masks_sixteen_digit_card() {
        assert_eq!(mask_card_number("4111111111111111"), "411111******1111");
    }

    #[test]
    fn masks_nineteen_digit_card_from_position_twelve() {
        assert_eq!(mask_card_number("4111112222333344445"), "411111******3344445");
    }

    #[test]
    fn short_cards_are_not_masked() {
        assert_eq!(mask_card_number("411111111111"), "411111111111");
        assert_eq!(mask_card_number(""), "");
    }
}
