//! US social security numbers.

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::models::mask::apply_mask;

pub const DEFAULT_SSN_MASK: &str = "XXX-XX-####";

fn ssn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{3}-?[0-9]{2}-?[0-9]{4}$").expect("Invalid regex pattern for SSNs"))
}

/// A validated social security number, stored as nine digits.
///
/// Renders masked through `Display`, `Debug` and `Serialize`.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct SocialSecurityNumber(String);

impl SocialSecurityNumber {
    /// Parse `123-45-6789` or `123456789`.
    ///
    /// Area `000`, `666` and `9xx`, group `00` and serial `0000` are never issued.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid_argument("ssn", "SSN must not be blank"));
        }
        if !ssn_regex().is_match(raw) {
            return Err(Error::format("SSN must look like 123-45-6789"));
        }
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != 9 {
            return Err(Error::format("SSN must have nine digits"));
        }

        let (area, rest) = digits.split_at(3);
        let (group, serial) = rest.split_at(2);
        if area == "000" || area == "666" || area.starts_with('9') {
            return Err(Error::format(format!("SSN area {} is not issued", area)));
        }
        if group == "00" {
            return Err(Error::format("SSN group 00 is not issued"));
        }
        if serial == "0000" {
            return Err(Error::format("SSN serial 0000 is not issued"));
        }
        Ok(Self(digits))
    }

    /// Digits in clear.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn area(&self) -> &str {
        &self.0[..3]
    }

    pub fn group(&self) -> &str {
        &self.0[3..5]
    }

    pub fn serial(&self) -> &str {
        &self.0[5..]
    }

    pub fn format(&self, mask: &str) -> Result<String> {
        apply_mask(mask, &self.0)
    }

    pub fn masked(&self) -> String {
        format!("XXX-XX-{}", self.serial())
    }
}

impl FromStr for SocialSecurityNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SocialSecurityNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl fmt::Display for SocialSecurityNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl fmt::Debug for SocialSecurityNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocialSecurityNumber({})", self.masked())
    }
}

impl Serialize for SocialSecurityNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.masked())
    }
}
