//! Masking mini-language for sensitive digit strings.
//!
//! Each mask character is applied left to right against the value's digits:
//!
//! | char | effect                                   |
//! |------|------------------------------------------|
//! | `#`  | reveal the next digit                    |
//! | `S`  | skip the next digit (emit nothing)       |
//! | `-`  | emit `-`, consume nothing                |
//! | else | emit the char in place of the next digit |
//!
//! A mask must consume exactly as many digits as the value holds.

use crate::error::{Error, Result};

pub const REVEAL: char = '#';
pub const SKIP: char = 'S';
pub const SEPARATOR: char = '-';

/// Number of digits `mask` consumes.
pub fn digit_slots(mask: &str) -> usize {
    mask.chars().filter(|c| *c != SEPARATOR).count()
}

/// Render `digits` through `mask`.
pub fn apply_mask(mask: &str, digits: &str) -> Result<String> {
    let slots = digit_slots(mask);
    let count = digits.chars().count();
    if slots != count {
        return Err(Error::format(format!(
            "mask '{}' covers {} digits but the value has {}",
            mask, slots, count
        )));
    }

    let mut digits = digits.chars();
    let mut out = String::with_capacity(mask.len());
    for symbol in mask.chars() {
        if symbol == SEPARATOR {
            out.push(SEPARATOR);
            continue;
        }
        // Counts match, so a digit is always available here.
        let Some(digit) = digits.next() else {
            break;
        };
        match symbol {
            REVEAL => out.push(digit),
            SKIP => {}
            replacement => out.push(replacement),
        }
    }
    Ok(out)
}

/// Strip spaces and dashes; `None` if anything else is not an ASCII digit.
pub fn normalize_digits(raw: &str) -> Option<String> {
    let mut digits = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' => {}
            _ => return None,
        }
    }
    Some(digits)
}

/// Default mask for `len` digits: groups of four, last four revealed.
pub fn default_mask(len: usize) -> String {
    let mut mask = String::with_capacity(len + len / 4);
    for idx in 0..len {
        if idx > 0 && idx % 4 == 0 {
            mask.push(SEPARATOR);
        }
        mask.push(if idx + 4 >= len { REVEAL } else { 'X' });
    }
    mask
}
