//! Mobile phone numbers for shipping contacts.

use core::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Exactly ten ASCII digits, no separators or country prefix.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // Pattern is a compile-time constant
    Regex::new(r"^[0-9]{10}$").unwrap()
});

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input is blank.
    #[error("phone number is required")]
    Empty,
    /// The input is not exactly ten digits.
    #[error("please enter a valid 10-digit mobile number")]
    Invalid,
}

/// A ten-digit mobile number.
///
/// ```
/// use bazaar_core::Phone;
///
/// assert!(Phone::parse("9876543210").is_ok());
/// assert!(Phone::parse("12345").is_err());
/// assert!(Phone::parse("98765-43210").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number. Surrounding whitespace is not accepted.
    ///
    /// # Errors
    ///
    /// Returns `PhoneError::Empty` for blank input and `PhoneError::Invalid`
    /// for anything other than exactly ten ASCII digits.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        if s.trim().is_empty() {
            return Err(PhoneError::Empty);
        }
        if !PHONE_PATTERN.is_match(s) {
            return Err(PhoneError::Invalid);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the digits as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_must_be_exact() {
        assert_eq!(Phone::parse("123456789"), Err(PhoneError::Invalid));
        assert_eq!(Phone::parse("12345678901"), Err(PhoneError::Invalid));
        assert!(Phone::parse("0123456789").is_ok());
    }

    #[test]
    fn test_non_ascii_digits_rejected() {
        // Arabic-Indic digits are digits, but not the ones the backend stores.
        assert_eq!(Phone::parse("٠١٢٣٤٥٦٧٨٩"), Err(PhoneError::Invalid));
    }

    #[test]
    fn test_blank_is_empty() {
        assert_eq!(Phone::parse("  "), Err(PhoneError::Empty));
    }
}
