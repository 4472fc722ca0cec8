//! Enumeration types for the Firewatch dispatch system.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Responder availability
// ---------------------------------------------------------------------------

/// Whether a responder can take a new assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Idle and eligible for selection.
    Available,
    /// Held by an in-flight assignment.
    Busy,
}

impl Availability {
    /// The string stored in the registry for this availability.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
        }
    }

    /// Parse the registry string form. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(Self::Available),
            "busy" => Some(Self::Busy),
            _ => None,
        }
    }
}

impl core::fmt::Display for Availability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Phase of a single emergency response, in emission order.
///
/// `Suppressing` repeats as a heartbeat while mitigation runs. The only
/// terminal state is `Extinguished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// A responder has been handed the emergency.
    Assigned,
    /// The responder is travelling to the incident.
    EnRoute,
    /// The responder is on site and mitigating.
    Suppressing,
    /// Mitigation finished.
    Extinguished,
}

impl LifecycleState {
    /// Whether this state ends the lifecycle.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Extinguished)
    }

    /// Whether `next` may follow `self` in a single invocation's event
    /// sequence.
    pub const fn may_precede(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Assigned, Self::EnRoute)
                | (Self::EnRoute | Self::Suppressing, Self::Suppressing)
                | (Self::Suppressing, Self::Extinguished)
        )
    }
}

impl core::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Assigned => "Assigned",
            Self::EnRoute => "EnRoute",
            Self::Suppressing => "Suppressing",
            Self::Extinguished => "Extinguished",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Archival
// ---------------------------------------------------------------------------

/// Snapshot kind pushed to the durable archival queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivalStage {
    /// A responder was marked busy for the incident.
    InProgress,
    /// The incident reached its terminal state.
    Extinguished,
}
