//! Request/reply envelopes and subject names shared by every service.
//!
//! Calls travel as JSON over NATS request/reply. A reply is always an
//! [`RpcReply`]: either the typed success payload or an [`RpcFailure`]
//! naming the failure kind, so callers can rebuild typed errors on their
//! side of the hop.

use serde::{Deserialize, Serialize};

use crate::enums::LifecycleState;
use crate::ids::{IncidentId, ResponderId};
use crate::structs::{Emergency, Position};

/// NATS subjects and stream names.
pub mod subjects {
    /// `AssignEmergency` request/reply subject.
    pub const ASSIGN: &str = "firewatch.rpc.assign";
    /// `ExecuteResponse` request/reply subject.
    pub const EXECUTE: &str = "firewatch.rpc.execute";
    /// Fanout subject for live lifecycle events.
    pub const STATUS: &str = "firewatch.status";
    /// Subject bound to the durable archival stream.
    pub const ARCHIVE: &str = "firewatch.archive";
    /// JetStream stream backing the archival queue.
    pub const ARCHIVE_STREAM: &str = "FIREWATCH_ARCHIVE";
    /// Durable consumer name used by the archiver.
    pub const ARCHIVE_CONSUMER: &str = "archiver";
}

/// `AssignEmergency` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignRequest {
    /// Correlation id generated by the submitter.
    pub incident_id: IncidentId,
    /// Emergency display name.
    pub name: String,
    /// Incident latitude.
    pub latitude: f64,
    /// Incident longitude.
    pub longitude: f64,
    /// Incident magnitude.
    pub magnitude: u32,
}

impl AssignRequest {
    /// Convert into the domain emergency.
    pub fn into_emergency(self) -> Emergency {
        Emergency {
            incident_id: self.incident_id,
            name: self.name,
            position: Position::new(self.latitude, self.longitude),
            magnitude: self.magnitude,
        }
    }
}

impl From<&Emergency> for AssignRequest {
    fn from(e: &Emergency) -> Self {
        Self {
            incident_id: e.incident_id,
            name: e.name.clone(),
            latitude: e.position.lat,
            longitude: e.position.lon,
            magnitude: e.magnitude,
        }
    }
}

/// `AssignEmergency` success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignReply {
    /// The responder that handled the emergency.
    pub responder_id: ResponderId,
    /// Terminal state reported by the executor.
    pub final_state: LifecycleState,
}

/// `ExecuteResponse` request, sent only by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Correlation id stamped on every emitted event.
    pub incident_id: IncidentId,
    /// Responder selected by the coordinator.
    pub responder_id: ResponderId,
    /// Label copied onto every emitted event.
    pub location_label: String,
    /// Incident latitude.
    pub latitude: f64,
    /// Incident longitude.
    pub longitude: f64,
    /// Incident magnitude.
    pub magnitude: u32,
}

impl ExecuteRequest {
    /// Build the executor request for `emergency` handled by `responder_id`.
    pub fn for_emergency(responder_id: ResponderId, emergency: &Emergency) -> Self {
        Self {
            incident_id: emergency.incident_id,
            responder_id,
            location_label: emergency.name.clone(),
            latitude: emergency.position.lat,
            longitude: emergency.position.lon,
            magnitude: emergency.magnitude,
        }
    }

    /// Incident coordinates.
    pub const fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// `ExecuteResponse` success payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteReply {
    /// Terminal state reached.
    pub final_state: LifecycleState,
}

/// Failure categories carried across the RPC hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No responder was available for selection.
    NoResponderAvailable,
    /// The selected responder is missing from the registry.
    ResponderNotFound,
    /// The executor service could not be reached.
    ExecutorUnreachable,
    /// The executor did not reply within the bound.
    ExecutorTimeout,
    /// The executor replied with an error.
    ExecutorError,
    /// The request was rejected before dispatch.
    InvalidRequest,
    /// Any other server-side failure.
    Internal,
}

/// Error half of an [`RpcReply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
}

/// Reply envelope for every request/reply call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcReply<T> {
    /// The call succeeded.
    Ok(T),
    /// The call failed.
    Error(RpcFailure),
}

impl<T> RpcReply<T> {
    /// Build an error reply.
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Error(RpcFailure {
            kind,
            message: message.into(),
        })
    }

    /// Convert into a standard [`Result`].
    pub fn into_result(self) -> Result<T, RpcFailure> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Error(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_envelope_is_tagged() {
        let reply: RpcReply<ExecuteReply> = RpcReply::Ok(ExecuteReply {
            final_state: LifecycleState::Extinguished,
        });
        let json = serde_json::to_value(&reply).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({"status": "ok", "final_state": "Extinguished"}))
        );
    }

    #[test]
    fn error_envelope_carries_kind() {
        let json = r#"{"status":"error","kind":"no_responder_available","message":"none"}"#;
        let reply: Result<RpcReply<AssignReply>, _> = serde_json::from_str(json);
        let failure = reply.ok().and_then(|r| r.into_result().err());
        assert_eq!(
            failure.map(|f| f.kind),
            Some(FailureKind::NoResponderAvailable)
        );
    }

    #[test]
    fn execute_request_copies_emergency_fields() {
        let emergency = Emergency::new("Ladera", Position::new(3.0, -4.0), 5);
        let req = ExecuteRequest::for_emergency(ResponderId::new("d2"), &emergency);
        assert_eq!(req.incident_id, emergency.incident_id);
        assert_eq!(req.location_label, "Ladera");
        assert_eq!(req.magnitude, 5);
        assert_eq!(req.position(), emergency.position);
    }
}
