//! Strongly-typed identifiers used across warden.
//!
//! Both identifiers are opaque strings: subjects can be user ids, service ids,
//! role names or the `any` sentinel; object ids are whatever the owning service
//! assigns. Equality is exact string equality.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identity a permission is granted to or checked against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

/// Identifier of a protected object (a document owned by some service).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create an identifier, rejecting empty or all-whitespace input.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: must not be empty", $name)));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(SubjectId, "SubjectId");
impl_string_newtype!(ObjectId, "ObjectId");

impl SubjectId {
    /// Literal name of the subject every caller implicitly is.
    pub const ANY: &'static str = "any";

    /// The `any` sentinel subject.
    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ids_are_rejected() {
        assert!(SubjectId::new("").is_err());
        assert!(ObjectId::new("   ").is_err());
        assert!(matches!(
            "".parse::<ObjectId>(),
            Err(DomainError::InvalidId(_))
        ));
    }

    #[test]
    fn serde_rejects_empty_ids() {
        let ok: SubjectId = serde_json::from_str("\"u1\"").unwrap();
        assert_eq!(ok.as_str(), "u1");
        assert!(serde_json::from_str::<SubjectId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"u1\"");
    }

    #[test]
    fn any_sentinel() {
        assert!(SubjectId::any().is_any());
        assert!(!SubjectId::new("anyone").unwrap().is_any());
    }
}
