//! Per-emergency reconciliation of the shared status stream.
//!
//! A [`Reconciler`] follows one submitted emergency:
//!
//! ```text
//! Idle --submitted--> AwaitingAssignment --EnRoute/Suppressing--> InProgress --Extinguished--> Extinguished
//! ```
//!
//! `Assigned` only records the responder. Events for other incidents
//! are ignored, as is anything after `Extinguished`. The submission
//! reply may arrive before, between, or after the stream events; only
//! an `Extinguished` event (or an extinguished reply once the stream is
//! gone) finishes the emergency.

use firewatch_types::{AssignReply, Emergency, IncidentId, LifecycleState, ResponderId, StatusEvent};
use tracing::warn;

/// What the responder is doing while the emergency is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Travelling to the incident.
    EnRoute,
    /// Mitigating on site.
    Suppressing,
}

/// Local phase of one emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not yet submitted.
    Idle,
    /// Submitted, no progress seen.
    AwaitingAssignment,
    /// Responder on the way or on site.
    InProgress(Progress),
    /// Done.
    Extinguished,
}

/// Effect of feeding one stream event to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The event belongs to another incident or arrived too late.
    Ignored,
    /// A responder took the emergency.
    Assigned(ResponderId),
    /// The responder moved to, or stayed in, the given progress phase.
    Progress(Progress),
    /// The emergency is finished.
    Extinguished,
}

/// Tracks one emergency against the shared event stream.
#[derive(Debug, Clone)]
pub struct Reconciler {
    incident_id: IncidentId,
    name: String,
    phase: Phase,
    responder: Option<ResponderId>,
    next_sequence: Option<u32>,
    heartbeats: u32,
    missed: u32,
}

impl Reconciler {
    /// Start tracking `emergency`, in [`Phase::Idle`].
    pub fn new(emergency: &Emergency) -> Self {
        Self {
            incident_id: emergency.incident_id,
            name: emergency.name.clone(),
            phase: Phase::Idle,
            responder: None,
            next_sequence: None,
            heartbeats: 0,
            missed: 0,
        }
    }

    /// Record that the emergency has been submitted.
    pub fn submitted(&mut self) {
        if self.phase == Phase::Idle {
            self.phase = Phase::AwaitingAssignment;
        }
    }

    /// Current phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the emergency has been extinguished.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Extinguished
    }

    /// Responder announced so far.
    pub const fn responder(&self) -> Option<&ResponderId> {
        self.responder.as_ref()
    }

    /// Suppression heartbeats seen after the first `Suppressing`.
    pub const fn heartbeats(&self) -> u32 {
        self.heartbeats
    }

    /// Events inferred lost from gaps in the sequence numbers.
    pub const fn missed(&self) -> u32 {
        self.missed
    }

    /// Incident being tracked.
    pub const fn incident_id(&self) -> IncidentId {
        self.incident_id
    }

    /// Feed one stream event.
    pub fn observe(&mut self, event: &StatusEvent) -> Observation {
        if self.is_done() || !event.concerns(self.incident_id, &self.name) {
            return Observation::Ignored;
        }
        if event.incident_id.is_some() {
            self.track_sequence(event.sequence);
        }

        match event.state {
            LifecycleState::Assigned => {
                self.responder = Some(event.responder_id.clone());
                Observation::Assigned(event.responder_id.clone())
            }
            LifecycleState::EnRoute => self.advance(Progress::EnRoute),
            LifecycleState::Suppressing => {
                if self.phase == Phase::InProgress(Progress::Suppressing) {
                    self.heartbeats = self.heartbeats.saturating_add(1);
                }
                self.advance(Progress::Suppressing)
            }
            LifecycleState::Extinguished => {
                self.responder.get_or_insert_with(|| event.responder_id.clone());
                self.phase = Phase::Extinguished;
                Observation::Extinguished
            }
        }
    }

    /// Apply the submission reply when no further stream events can
    /// arrive. Returns whether this finished the emergency.
    pub fn finish_from_reply(&mut self, reply: &AssignReply) -> bool {
        self.responder.get_or_insert_with(|| reply.responder_id.clone());
        if reply.final_state.is_terminal() {
            self.phase = Phase::Extinguished;
        }
        self.is_done()
    }

    /// One-line progress summary, for the periodic status print.
    pub fn status_line(&self) -> String {
        let responder = self.responder.as_ref().map_or("unassigned", ResponderId::as_str);
        match self.phase {
            Phase::Idle => format!("{}: queued", self.name),
            Phase::AwaitingAssignment => format!("{}: awaiting assignment", self.name),
            Phase::InProgress(Progress::EnRoute) => {
                format!("{}: responder {responder} en route", self.name)
            }
            Phase::InProgress(Progress::Suppressing) => format!(
                "{}: responder {responder} suppressing ({} heartbeats)",
                self.name, self.heartbeats
            ),
            Phase::Extinguished => format!("{}: extinguished by {responder}", self.name),
        }
    }

    fn advance(&mut self, progress: Progress) -> Observation {
        // Never move back from suppressing to en route.
        if self.phase != Phase::InProgress(Progress::Suppressing) {
            self.phase = Phase::InProgress(progress);
        }
        Observation::Progress(progress)
    }

    fn track_sequence(&mut self, sequence: u32) {
        if let Some(expected) = self.next_sequence {
            if sequence > expected {
                let gap = sequence.saturating_sub(expected);
                self.missed = self.missed.saturating_add(gap);
                warn!(
                    incident_id = %self.incident_id,
                    expected,
                    received = sequence,
                    "Gap in status stream"
                );
            }
        }
        let next = sequence.saturating_add(1);
        self.next_sequence = Some(self.next_sequence.map_or(next, |n| n.max(next)));
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use firewatch_types::Position;

    use super::*;

    fn emergency() -> Emergency {
        Emergency::new("Quebrada", Position::new(0.0, 0.0), 3)
    }

    fn event(id: Option<IncidentId>, sequence: u32, state: LifecycleState, label: &str) -> StatusEvent {
        StatusEvent {
            incident_id: id,
            sequence,
            responder_id: ResponderId::new("d7"),
            state,
            location_label: label.to_owned(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn full_lifecycle_reaches_extinguished() {
        let e = emergency();
        let id = Some(e.incident_id);
        let mut r = Reconciler::new(&e);
        assert_eq!(r.phase(), Phase::Idle);
        r.submitted();
        assert_eq!(r.phase(), Phase::AwaitingAssignment);

        assert_eq!(
            r.observe(&event(id, 0, LifecycleState::Assigned, "Quebrada")),
            Observation::Assigned(ResponderId::new("d7"))
        );
        assert_eq!(r.phase(), Phase::AwaitingAssignment);

        r.observe(&event(id, 1, LifecycleState::EnRoute, "Quebrada"));
        assert_eq!(r.phase(), Phase::InProgress(Progress::EnRoute));

        r.observe(&event(id, 2, LifecycleState::Suppressing, "Quebrada"));
        r.observe(&event(id, 3, LifecycleState::Suppressing, "Quebrada"));
        assert_eq!(r.phase(), Phase::InProgress(Progress::Suppressing));
        assert_eq!(r.heartbeats(), 1);

        assert_eq!(
            r.observe(&event(id, 4, LifecycleState::Extinguished, "Quebrada")),
            Observation::Extinguished
        );
        assert!(r.is_done());
        assert_eq!(r.missed(), 0);
        assert!(r.status_line().contains("extinguished by d7"));
    }

    #[test]
    fn other_incidents_are_ignored() {
        let e = emergency();
        let mut r = Reconciler::new(&e);
        r.submitted();
        let other = Some(IncidentId::new());
        assert_eq!(
            r.observe(&event(other, 0, LifecycleState::Extinguished, "Quebrada")),
            Observation::Ignored
        );
        assert!(!r.is_done());
    }

    #[test]
    fn legacy_events_match_label_case_insensitively() {
        let e = emergency();
        let mut r = Reconciler::new(&e);
        r.submitted();
        assert_eq!(
            r.observe(&event(None, 0, LifecycleState::Extinguished, "QUEBRADA")),
            Observation::Extinguished
        );
        let mut r = Reconciler::new(&e);
        assert_eq!(
            r.observe(&event(None, 0, LifecycleState::Extinguished, "Cerro")),
            Observation::Ignored
        );
    }

    #[test]
    fn events_after_terminal_are_ignored() {
        let e = emergency();
        let id = Some(e.incident_id);
        let mut r = Reconciler::new(&e);
        r.observe(&event(id, 0, LifecycleState::Extinguished, "Quebrada"));
        assert_eq!(
            r.observe(&event(id, 1, LifecycleState::Suppressing, "Quebrada")),
            Observation::Ignored
        );
        assert_eq!(r.phase(), Phase::Extinguished);
    }

    #[test]
    fn sequence_gaps_are_counted() {
        let e = emergency();
        let id = Some(e.incident_id);
        let mut r = Reconciler::new(&e);
        r.observe(&event(id, 0, LifecycleState::Assigned, "Quebrada"));
        r.observe(&event(id, 3, LifecycleState::Suppressing, "Quebrada"));
        assert_eq!(r.missed(), 2);
    }

    #[test]
    fn late_en_route_does_not_regress() {
        let e = emergency();
        let id = Some(e.incident_id);
        let mut r = Reconciler::new(&e);
        r.observe(&event(id, 2, LifecycleState::Suppressing, "Quebrada"));
        r.observe(&event(id, 1, LifecycleState::EnRoute, "Quebrada"));
        assert_eq!(r.phase(), Phase::InProgress(Progress::Suppressing));
        // A reordered event does not make the next one look like a gap.
        r.observe(&event(id, 3, LifecycleState::Suppressing, "Quebrada"));
        assert_eq!(r.missed(), 0);
    }

    #[test]
    fn reply_finishes_only_when_terminal() {
        let e = emergency();
        let mut r = Reconciler::new(&e);
        r.submitted();
        let done = r.finish_from_reply(&AssignReply {
            responder_id: ResponderId::new("d2"),
            final_state: LifecycleState::Extinguished,
        });
        assert!(done);
        assert_eq!(r.responder().map(ResponderId::as_str), Some("d2"));

        let mut r = Reconciler::new(&e);
        let done = r.finish_from_reply(&AssignReply {
            responder_id: ResponderId::new("d2"),
            final_state: LifecycleState::EnRoute,
        });
        assert!(!done);
    }
}
