//! Identifier, invoice number and email matching helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const INVOICE_HRP: &str = "inv_";
pub const BID_HRP: &str = "bid_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Human facing invoice number for a store sequence value, e.g. `INV-000042`.
pub fn format_invoice_number(sequence: u64) -> String {
    format!("INV-{sequence:06}")
}

/// Sequence value back out of an invoice number. `None` for numbers this crate did not format.
pub fn invoice_sequence(number: &str) -> Option<u64> {
    number.strip_prefix("INV-")?.parse().ok()
}

/// Buyer email match: surrounding whitespace ignored, case folded over full Unicode.
pub fn emails_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_numbers_are_zero_padded() {
        assert_eq!(format_invoice_number(42), "INV-000042");
        assert_eq!(format_invoice_number(1_234_567), "INV-1234567");
    }

    #[test]
    fn sequence_survives_past_six_digits() {
        assert_eq!(invoice_sequence(&format_invoice_number(999_999)), Some(999_999));
        assert_eq!(invoice_sequence(&format_invoice_number(1_000_000)), Some(1_000_000));
        assert_eq!(invoice_sequence("DRAFT-7"), None);
    }

    #[test]
    fn email_match_folds_non_ascii_case() {
        assert!(emails_match(" JÖRG@example.com", "jörg@EXAMPLE.com "));
        assert!(!emails_match("jorg@example.com", "jörg@example.com"));
        assert!(!emails_match("  ", "  "));
    }

    #[test]
    fn ids_carry_their_prefix() {
        let id = new_uuid_to_bech32(INVOICE_HRP).unwrap();
        assert!(id.starts_with("inv_1"));
        assert_ne!(id, new_uuid_to_bech32(INVOICE_HRP).unwrap());
    }
}
