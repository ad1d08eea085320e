use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

// One mounted UI surface. Each scope owns exactly one root coordinator.
id_newtype!(ScopeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_scope_ids_are_distinct() {
        assert_ne!(ScopeId::new(), ScopeId::new());
    }

    #[test]
    fn scope_id_serializes_as_bare_uuid() {
        let raw = Uuid::nil();
        let json = serde_json::to_string(&ScopeId::from(raw)).expect("serialize");
        assert_eq!(json, format!("\"{raw}\""));
    }
}
