//! Bank card numbers.

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::models::mask::{apply_mask, default_mask, normalize_digits};

/// Mask used when a card number is displayed without an explicit mask.
pub const DEFAULT_CARD_MASK: &str = "XXXX-XXXX-XXXX-####";

fn card_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{12,19}$").expect("Invalid regex pattern for card numbers"))
}

/// Luhn (mod 10) checksum over an all-digit string.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (idx, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if idx % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    !digits.is_empty() && sum % 10 == 0
}

/// A validated card number (PAN).
///
/// `Display`, `Debug` and `Serialize` all render masked; use
/// [`BankCardNumber::expose`] to get the digits in clear.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct BankCardNumber(String);

impl BankCardNumber {
    /// Parse a card number; spaces and dashes are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::invalid_argument(
                "card_number",
                "card number must not be blank",
            ));
        }
        let digits = normalize_digits(raw)
            .filter(|d| card_regex().is_match(d))
            .ok_or_else(|| Error::format("card number must be 12 to 19 digits"))?;
        if !luhn_valid(&digits) {
            return Err(Error::format("card number fails the Luhn check"));
        }
        Ok(Self(digits))
    }

    /// Digits in clear.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last_four(&self) -> &str {
        &self.0[self.0.len() - 4..]
    }

    /// Issuer identification number (first six digits).
    pub fn bin(&self) -> &str {
        &self.0[..6]
    }

    /// Render through a mask; see [`crate::models::mask`].
    pub fn format(&self, mask: &str) -> Result<String> {
        apply_mask(mask, &self.0)
    }

    pub fn masked(&self) -> String {
        // Built for our own length, so it always fits.
        apply_mask(&default_mask(self.0.len()), &self.0).unwrap_or_default()
    }
}

impl FromStr for BankCardNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BankCardNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl fmt::Display for BankCardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl fmt::Debug for BankCardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BankCardNumber({})", self.masked())
    }
}

impl Serialize for BankCardNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.masked())
    }
}

/// Validate `value` and render it through `mask`.
pub fn format_card_number(mask: &str, value: &str) -> Result<String> {
    BankCardNumber::parse(value)?.format(mask)
}

/// Whether `value` is a well-formed card number with a valid Luhn digit.
pub fn is_card_number_valid(value: &str) -> bool {
    BankCardNumber::parse(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4234567891234567"));
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("378282246310005"));
        assert!(!luhn_valid("4234567891234568"));
        assert!(!luhn_valid(""));
    }

    #[test]
    fn test_parse_ignores_separators() {
        let card = BankCardNumber::parse("4234 5678-9123 4567").unwrap();
        assert_eq!(card.expose(), "4234567891234567");
        assert_eq!(card.last_four(), "4567");
        assert_eq!(card.bin(), "423456");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            BankCardNumber::parse(""),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            BankCardNumber::parse("42345678912"),
            Err(Error::Format { .. })
        ));
        assert!(matches!(
            BankCardNumber::parse("4234x67891234567"),
            Err(Error::Format { .. })
        ));
        assert!(matches!(
            BankCardNumber::parse("4234567891234568"),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn test_display_and_debug_are_masked() {
        let card: BankCardNumber = "4234567891234567".parse().unwrap();
        assert_eq!(card.to_string(), "XXXX-XXXX-XXXX-4567");
        assert_eq!(format!("{:?}", card), "BankCardNumber(XXXX-XXXX-XXXX-4567)");
    }

    #[test]
    fn test_serde() {
        let card: BankCardNumber = serde_json::from_str("\"5555555555554444\"").unwrap();
        assert_eq!(
            serde_json::to_string(&card).unwrap(),
            "\"XXXX-XXXX-XXXX-4444\""
        );
        assert!(serde_json::from_str::<BankCardNumber>("\"5555555555554445\"").is_err());
    }

    #[test]
    fn test_free_functions() {
        assert_eq!(
            format_card_number(DEFAULT_CARD_MASK, "4234567891234567").unwrap(),
            "XXXX-XXXX-XXXX-4567"
        );
        assert!(format_card_number("XXXX-####", "4234567891234567").is_err());
        assert!(is_card_number_valid("4234567891234567"));
        assert!(!is_card_number_valid("4234567891234566"));
    }
}
