//! Typed identifiers.
//!
//! Incidents are keyed by a generated UUID v7 so that two emergencies
//! sharing a display name can never be confused on the status topic.
//! Responders and observers keep the free-form string identifiers the
//! registry and the observers already use.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation identifier for a single emergency, from submission to
/// the terminal lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub Uuid);

impl IncidentId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for IncidentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Generates a newtype wrapper around an owned string identifier.
macro_rules! define_name_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
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

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

define_name_id! {
    /// Stable, unique identifier of a responder (drone) in the registry.
    ResponderId
}

define_name_id! {
    /// Identifier an observer presents when subscribing to status updates.
    ObserverId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incident_ids_are_unique() {
        let a = IncidentId::new();
        let b = IncidentId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn responder_id_serializes_as_plain_string() {
        let id = ResponderId::new("dron-7");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"dron-7\""));
    }

    #[test]
    fn incident_id_display_matches_uuid() {
        let id = IncidentId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
