//! Value types for sensitive identifiers.
//!
//! Both types validate on construction and render masked by default.

pub mod card;
pub mod mask;
pub mod ssn;

pub use card::{BankCardNumber, DEFAULT_CARD_MASK, format_card_number, is_card_number_valid};
pub use ssn::{DEFAULT_SSN_MASK, SocialSecurityNumber};
