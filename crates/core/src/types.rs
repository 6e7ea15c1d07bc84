use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(NodeName, "Logical name of a simulated service node.");
newtype_string!(
    InvocationId,
    "Identifies one inbound invocation in diagnostics."
);

impl InvocationId {
    /// A fresh time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn newtype_from_str() {
        let name = NodeName::from("AuthService");
        assert_eq!(name.as_str(), "AuthService");
        assert_eq!(&*name, "AuthService");
    }

    #[test]
    fn newtype_serde_transparent() {
        let name = NodeName::new("Reporter");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"Reporter\"");
        let back: NodeName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(NodeName::new("auth"), 1);
        assert_eq!(map.get("auth"), Some(&1));
    }

    #[test]
    fn invocation_ids_are_unique() {
        assert_ne!(InvocationId::generate(), InvocationId::generate());
    }
}
