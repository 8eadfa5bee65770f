//! Node, qubit and classical bit identifiers.
//!
//! All identifiers are opaque strings. Qubit and bit ids are unique within a
//! circuit; qubits are additionally owned by exactly one node.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a compute node.
    NodeId
);

string_id!(
    /// Identifier of a qubit, or of the local half of an entangled pair.
    QubitId
);

string_id!(
    /// Identifier of a classical bit.
    BitId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_raw_string() {
        assert_eq!(NodeId::from("QPU_0").to_string(), "QPU_0");
        assert_eq!(QubitId::new("q_0_1").as_str(), "q_0_1");
    }

    #[test]
    fn test_serializes_transparently() {
        let json = serde_json::to_string(&BitId::from("m0")).unwrap();
        assert_eq!(json, "\"m0\"");
    }
}
