//! Submit-and-wait loop over a list of emergencies.
//!
//! Emergencies are handled one at a time. For each one the loop drops
//! any events already buffered, submits on a separate task, and then
//! waits on three things at once: stream events, the submission reply,
//! and a periodic status print. The emergency is finished by its
//! `Extinguished` event. If the stream has closed, or the event never
//! shows up within a grace period after a terminal reply, the reply's
//! final state is used instead.

use std::sync::Arc;
use std::time::Duration;

use firewatch_types::{AssignReply, Emergency, IncidentId, ResponderId, StatusEvent};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::assign::Submitter;
use crate::reconciler::{Observation, Reconciler};

/// How long to wait for the `Extinguished` event once the coordinator
/// has already reported it.
pub const REPLY_GRACE: Duration = Duration::from_secs(10);

/// How one emergency ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The emergency was extinguished.
    Extinguished {
        /// Responder that handled it.
        responder_id: Option<ResponderId>,
        /// Whether the terminal event was seen on the stream rather than
        /// inferred from the reply.
        confirmed_by_stream: bool,
    },
    /// The submission failed.
    Failed(String),
    /// The stream closed and the reply did not report a terminal state.
    Incomplete,
}

/// Result for one emergency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Emergency name.
    pub name: String,
    /// Incident id used for correlation.
    pub incident_id: IncidentId,
    /// How it ended.
    pub kind: OutcomeKind,
    /// Stale events discarded before submission.
    pub discarded: usize,
    /// Events inferred lost from sequence gaps.
    pub missed: u32,
}

/// Run every emergency in order and report how each ended.
pub async fn run_session(
    emergencies: Vec<Emergency>,
    events: &mut mpsc::Receiver<StatusEvent>,
    submitter: Arc<dyn Submitter>,
    print_interval: Duration,
) -> Vec<Outcome> {
    let mut stream_open = true;
    let mut outcomes = Vec::with_capacity(emergencies.len());
    for emergency in emergencies {
        let outcome = follow(
            emergency,
            events,
            Arc::clone(&submitter),
            print_interval,
            &mut stream_open,
        )
        .await;
        match &outcome.kind {
            OutcomeKind::Extinguished { responder_id, .. } => info!(
                name = %outcome.name,
                responder_id = responder_id.as_ref().map_or("unknown", ResponderId::as_str),
                "Emergency extinguished"
            ),
            OutcomeKind::Failed(reason) => {
                warn!(name = %outcome.name, reason = %reason, "Emergency submission failed");
            }
            OutcomeKind::Incomplete => {
                warn!(name = %outcome.name, "Emergency outcome unknown");
            }
        }
        outcomes.push(outcome);
    }
    outcomes
}

async fn follow(
    emergency: Emergency,
    events: &mut mpsc::Receiver<StatusEvent>,
    submitter: Arc<dyn Submitter>,
    print_interval: Duration,
    stream_open: &mut bool,
) -> Outcome {
    let discarded = discard_buffered(events, stream_open);
    let mut reconciler = Reconciler::new(&emergency);
    let name = emergency.name.clone();
    let incident_id = emergency.incident_id;
    info!(name = %name, incident_id = %incident_id, discarded, "Submitting emergency");

    let mut submission = tokio::spawn(async move { submitter.submit(emergency).await });
    reconciler.submitted();

    let outcome = |reconciler: &Reconciler, kind: OutcomeKind| Outcome {
        name: name.clone(),
        incident_id,
        kind,
        discarded,
        missed: reconciler.missed(),
    };

    let mut pending = true;
    let mut reply: Option<AssignReply> = None;
    let mut grace_deadline: Option<Instant> = None;
    let first_print = Instant::now().checked_add(print_interval).unwrap_or_else(Instant::now);
    let mut ticker = tokio::time::interval_at(first_print, print_interval);

    loop {
        if reconciler.is_done() {
            let kind = OutcomeKind::Extinguished {
                responder_id: reconciler.responder().cloned(),
                confirmed_by_stream: true,
            };
            return outcome(&reconciler, kind);
        }
        if !*stream_open && !pending {
            return settle_from_reply(&mut reconciler, reply.as_ref(), &outcome);
        }

        tokio::select! {
            event = events.recv(), if *stream_open => match event {
                Some(event) => match reconciler.observe(&event) {
                    Observation::Assigned(responder) => {
                        info!(name = %name, responder_id = %responder, "Responder assigned");
                    }
                    Observation::Extinguished => {
                        info!(name = %name, "Extinguished event received");
                    }
                    Observation::Progress(_) | Observation::Ignored => {}
                },
                None => {
                    warn!("Status stream closed, relying on submission replies");
                    *stream_open = false;
                }
            },
            joined = &mut submission, if pending => {
                pending = false;
                match joined {
                    Ok(Ok(assigned)) => {
                        info!(
                            name = %name,
                            responder_id = %assigned.responder_id,
                            final_state = %assigned.final_state,
                            "Submission accepted"
                        );
                        if assigned.final_state.is_terminal() {
                            grace_deadline = Instant::now().checked_add(REPLY_GRACE);
                        }
                        reply = Some(assigned);
                    }
                    Ok(Err(e)) => return outcome(&reconciler, OutcomeKind::Failed(e.to_string())),
                    Err(e) => {
                        return outcome(
                            &reconciler,
                            OutcomeKind::Failed(format!("submission task failed: {e}")),
                        );
                    }
                }
            },
            () = tokio::time::sleep_until(grace_deadline.unwrap_or_else(Instant::now)),
                if grace_deadline.is_some() =>
            {
                warn!(name = %name, "Extinguished event not seen, using submission reply");
                return settle_from_reply(&mut reconciler, reply.as_ref(), &outcome);
            },
            _ = ticker.tick() => info!("{}", reconciler.status_line()),
        }
    }
}

/// Finish from the submission reply because no more events will arrive.
fn settle_from_reply(
    reconciler: &mut Reconciler,
    reply: Option<&AssignReply>,
    outcome: &impl Fn(&Reconciler, OutcomeKind) -> Outcome,
) -> Outcome {
    match reply {
        Some(reply) if reconciler.finish_from_reply(reply) => {
            let kind = OutcomeKind::Extinguished {
                responder_id: reconciler.responder().cloned(),
                confirmed_by_stream: false,
            };
            outcome(reconciler, kind)
        }
        _ => outcome(reconciler, OutcomeKind::Incomplete),
    }
}

/// Drop events left over from earlier emergencies.
fn discard_buffered(events: &mut mpsc::Receiver<StatusEvent>, stream_open: &mut bool) -> usize {
    let mut discarded: usize = 0;
    if !*stream_open {
        return discarded;
    }
    loop {
        match events.try_recv() {
            Ok(_) => discarded = discarded.saturating_add(1),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                *stream_open = false;
                break;
            }
        }
    }
    discarded
}
