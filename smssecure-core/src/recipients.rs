//! Recipient numbers and identifiers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewest digits accepted in a phone number.
pub const MIN_NUMBER_DIGITS: usize = 3;
/// Most digits accepted in a phone number (E.164).
pub const MAX_NUMBER_DIGITS: usize = 15;

/// Errors resolving a recipient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipientError {
    /// The input contains characters that cannot appear in a number.
    #[error("Recipient formatting error: {0}")]
    Formatting(String),

    /// The input is well-formed but not a usable number.
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

/// Local database id of a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipientId(pub i64);

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: RecipientId,
    /// Canonical number, also the session address name.
    pub number: String,
}

/// Canonicalizes a phone number.
///
/// Spaces, dashes, dots and parentheses are dropped; a single leading `+`
/// is kept. Anything else is a formatting error, and a digit count outside
/// `MIN_NUMBER_DIGITS..=MAX_NUMBER_DIGITS` is an invalid number.
pub fn canonicalize_number(raw: &str) -> Result<String, RecipientError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RecipientError::Formatting("empty number".to_string()));
    }

    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(RecipientError::Formatting(raw.to_string())),
        }
    }

    if !(MIN_NUMBER_DIGITS..=MAX_NUMBER_DIGITS).contains(&digits.len()) {
        return Err(RecipientError::InvalidNumber(raw.to_string()));
    }

    Ok(if plus { format!("+{}", digits) } else { digits })
}
