//! Core entity structs: positions, responders, emergencies, and the
//! events and records that describe a response in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ArchivalStage, Availability, LifecycleState};
use crate::ids::{IncidentId, ResponderId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point on the planar dispatch grid.
///
/// Distances are straight-line Euclidean in coordinate units; no
/// great-circle correction is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude (first grid axis).
    pub lat: f64,
    /// Longitude (second grid axis).
    pub lon: f64,
}

impl Position {
    /// Construct a position.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = other.lat - self.lat;
        let dy = other.lon - self.lon;
        dx.hypot(dy)
    }

    /// Whether both coordinates are finite.
    pub const fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// A mobile responder as recorded in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responder {
    /// Stable identifier.
    pub id: ResponderId,
    /// Last known position.
    pub position: Position,
    /// Whether the responder may be selected.
    pub availability: Availability,
}

impl Responder {
    /// Construct an available responder at `position`.
    pub fn available(id: impl Into<ResponderId>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            availability: Availability::Available,
        }
    }
}

// ---------------------------------------------------------------------------
// Emergency
// ---------------------------------------------------------------------------

/// An emergency submitted by an operator. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emergency {
    /// Correlation identifier generated at submission.
    pub incident_id: IncidentId,
    /// Display name; also the location label on every lifecycle event.
    pub name: String,
    /// Incident coordinates.
    pub position: Position,
    /// Severity; mitigation time scales linearly with it.
    pub magnitude: u32,
}

/// Reasons an emergency is rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidEmergency {
    /// Latitude or longitude is NaN or infinite.
    #[error("emergency '{name}' has non-finite coordinates")]
    NonFiniteCoordinates {
        /// Name of the offending emergency.
        name: String,
    },
}

impl Emergency {
    /// Create an emergency with a freshly generated incident id.
    pub fn new(name: impl Into<String>, position: Position, magnitude: u32) -> Self {
        Self {
            incident_id: IncidentId::new(),
            name: name.into(),
            position,
            magnitude,
        }
    }

    /// Check the emergency can be dispatched.
    pub fn validate(&self) -> Result<(), InvalidEmergency> {
        if self.position.is_finite() {
            Ok(())
        } else {
            Err(InvalidEmergency::NonFiniteCoordinates {
                name: self.name.clone(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Status events
// ---------------------------------------------------------------------------

/// A lifecycle event published on the live status topic.
///
/// All events for one incident originate from a single sequential
/// executor invocation, so `sequence` increases by exactly one per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Incident this event belongs to. Absent on events from publishers
    /// that predate incident ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<IncidentId>,
    /// Position of this event within its incident, starting at 0.
    #[serde(default)]
    pub sequence: u32,
    /// Responder handling the incident.
    pub responder_id: ResponderId,
    /// Lifecycle phase.
    pub state: LifecycleState,
    /// Human-readable incident label (the emergency name).
    pub location_label: String,
    /// Wall-clock time of emission.
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Serialize for the broker.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a broker payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] for malformed payloads.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Whether this event belongs to the given emergency.
    ///
    /// Matches on the incident id when the event carries one, and falls
    /// back to a case-insensitive comparison of the location label with
    /// the emergency name otherwise.
    pub fn concerns(&self, incident_id: IncidentId, name: &str) -> bool {
        self.incident_id.map_or_else(
            || self.location_label.to_lowercase() == name.to_lowercase(),
            |id| id == incident_id,
        )
    }
}

// ---------------------------------------------------------------------------
// Archival
// ---------------------------------------------------------------------------

/// A snapshot pushed to the durable archival queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalRecord {
    /// Incident the snapshot describes.
    pub incident_id: IncidentId,
    /// Responder handling the incident.
    pub responder_id: ResponderId,
    /// Which milestone this snapshot records.
    pub stage: ArchivalStage,
    /// Human-readable incident label.
    pub location_label: String,
    /// Wall-clock time of the milestone.
    pub timestamp: DateTime<Utc>,
}

impl ArchivalRecord {
    /// Build a record stamped with the current time.
    pub fn now(
        incident_id: IncidentId,
        responder_id: ResponderId,
        stage: ArchivalStage,
        location_label: impl Into<String>,
    ) -> Self {
        Self {
            incident_id,
            responder_id,
            stage,
            location_label: location_label.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(1.0, 1.0);
        assert!((a.distance_to(&b) - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!((b.distance_to(&a) - a.distance_to(&b)).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let bad = Emergency::new("Fuego", Position::new(f64::NAN, 1.0), 3);
        assert!(bad.validate().is_err());
        let good = Emergency::new("Fuego", Position::new(2.0, 1.0), 3);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn event_matches_by_incident_id() {
        let incident = IncidentId::new();
        let event = StatusEvent {
            incident_id: Some(incident),
            sequence: 0,
            responder_id: ResponderId::new("d1"),
            state: LifecycleState::Assigned,
            location_label: String::from("Bosque Norte"),
            timestamp: Utc::now(),
        };
        assert!(event.concerns(incident, "anything"));
        // Same name, different incident: no cross-talk.
        assert!(!event.concerns(IncidentId::new(), "Bosque Norte"));
    }

    #[test]
    fn legacy_event_matches_label_case_insensitively() {
        let json = r#"{
            "responder_id": "d1",
            "state": "EnRoute",
            "location_label": "BOSQUE norte",
            "timestamp": "2025-01-01T00:00:00Z"
        }"#;
        let event = StatusEvent::decode(json.as_bytes());
        assert!(event.is_ok());
        let event = event.ok();
        let matched = event.is_some_and(|e| {
            e.incident_id.is_none() && e.sequence == 0 && e.concerns(IncidentId::new(), "Bosque Norte")
        });
        assert!(matched);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(StatusEvent::decode(b"{not json").is_err());
        assert!(StatusEvent::decode(br#"{"state":"Melting"}"#).is_err());
    }
}
