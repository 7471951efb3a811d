//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A limit must be a positive number of milliseconds.
    #[error("limit must be positive, got {value}ms")]
    NonPositiveLimit { value: i64 },

    /// Invalid event kind value.
    #[error("invalid event kind: {value}")]
    InvalidEventKind { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated package identifier (e.g. `com.android.chrome`).
    ///
    /// This is the top-level identity of an app and the key used for limits
    /// and persisted usage.
    PackageName, "package name"
);

/// Platform-level account id shared by packages that are administratively one app.
pub type OwnerGroupId = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_rejects_empty() {
        assert!(PackageName::new("").is_err());
        assert!(PackageName::new("   ").is_err());
        assert!(PackageName::new("com.example.app").is_ok());
    }

    #[test]
    fn package_name_serde_rejects_empty() {
        let result: Result<PackageName, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn package_name_serializes_as_plain_string() {
        let name = PackageName::new("com.example.app").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"com.example.app\"");
    }

    #[test]
    fn package_names_order_lexicographically() {
        let a = PackageName::new("com.a").unwrap();
        let b = PackageName::new("com.b").unwrap();
        assert!(a < b);
    }
}
