//! Shipping addresses captured at checkout.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::phone::{Phone, PhoneError};

/// Country used when the form leaves it untouched.
pub const DEFAULT_COUNTRY: &str = "India";

/// Errors that can occur when validating an [`Address`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is blank.
    #[error("please fill in all required fields ({0} is missing)")]
    MissingField(&'static str),
    /// The phone number is malformed.
    #[error(transparent)]
    Phone(#[from] PhoneError),
    /// Unknown address type.
    #[error("address type must be Home or Office (got {0:?})")]
    InvalidType(String),
}

/// Kind of delivery location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AddressType {
    #[default]
    Home,
    Office,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "Home"),
            Self::Office => write!(f, "Office"),
        }
    }
}

impl FromStr for AddressType {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Home" | "home" => Ok(Self::Home),
            "Office" | "office" => Ok(Self::Office),
            other => Err(AddressError::InvalidType(other.to_string())),
        }
    }
}

/// A validated shipping address.
///
/// Every field except `address_line2` is non-blank. Values are trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub phone: Phone,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub address_type: AddressType,
}

/// Unvalidated address fields, as typed into a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressInput<'a> {
    pub full_name: &'a str,
    pub phone: &'a str,
    pub address_line1: &'a str,
    pub address_line2: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub postal_code: &'a str,
    pub country: &'a str,
    pub address_type: AddressType,
}

impl Address {
    /// Validate raw form fields into an address.
    ///
    /// Required fields are checked first, in form order, then the phone
    /// pattern. A blank country falls back to [`DEFAULT_COUNTRY`].
    ///
    /// # Errors
    ///
    /// Returns `AddressError::MissingField` naming the first blank required
    /// field, or `AddressError::Phone` if the number is not ten digits.
    pub fn validate(input: &AddressInput<'_>) -> Result<Self, AddressError> {
        let required = [
            ("full name", input.full_name),
            ("phone", input.phone),
            ("address line 1", input.address_line1),
            ("city", input.city),
            ("state", input.state),
            ("postal code", input.postal_code),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AddressError::MissingField(name));
            }
        }

        let phone = Phone::parse(input.phone)?;
        let line2 = input.address_line2.trim();
        let country = input.country.trim();

        Ok(Self {
            full_name: input.full_name.trim().to_owned(),
            phone,
            address_line1: input.address_line1.trim().to_owned(),
            address_line2: (!line2.is_empty()).then(|| line2.to_owned()),
            city: input.city.trim().to_owned(),
            state: input.state.trim().to_owned(),
            postal_code: input.postal_code.trim().to_owned(),
            country: if country.is_empty() {
                DEFAULT_COUNTRY.to_owned()
            } else {
                country.to_owned()
            },
            address_type: input.address_type,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> AddressInput<'static> {
        AddressInput {
            full_name: "Asha Rao",
            phone: "9876543210",
            address_line1: "12 MG Road",
            address_line2: "",
            city: "Bengaluru",
            state: "Karnataka",
            postal_code: "560001",
            country: "",
            address_type: AddressType::Home,
        }
    }

    #[test]
    fn test_valid_address_defaults_country() {
        let address = Address::validate(&input()).unwrap();
        assert_eq!(address.country, DEFAULT_COUNTRY);
        assert_eq!(address.address_line2, None);
    }

    #[test]
    fn test_missing_required_field() {
        let mut form = input();
        form.city = "   ";
        assert_eq!(
            Address::validate(&form),
            Err(AddressError::MissingField("city"))
        );
    }

    #[test]
    fn test_short_phone_rejected() {
        let mut form = input();
        form.phone = "12345";
        assert_eq!(
            Address::validate(&form),
            Err(AddressError::Phone(PhoneError::Invalid))
        );
    }

    #[test]
    fn test_address_type_parse() {
        assert_eq!("Office".parse::<AddressType>().unwrap(), AddressType::Office);
        assert!("Warehouse".parse::<AddressType>().is_err());
    }
}
