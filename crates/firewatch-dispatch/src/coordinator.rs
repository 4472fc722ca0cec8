//! Nearest-available assignment under a single-flight section.
//!
//! [`AssignmentCoordinator::assign`] reads every available responder,
//! picks the nearest one by planar distance, marks it busy, and calls
//! the executor through an [`ExecutorClient`]. Only one assignment is
//! inside the critical section at a time; [`LockScope`] decides whether
//! that section ends after busy-marking or after the executor replies.
//!
//! Once the section has been entered, the rest of the assignment runs on
//! its own task. Dropping the caller's future neither releases the lock
//! early nor cancels the executor call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use firewatch_broker::EventEmitter;
use firewatch_registry::ResponderRegistry;
use firewatch_types::{
    ArchivalRecord, ArchivalStage, AssignReply, Availability, Emergency, ExecuteRequest,
    Position, Responder, ResponderId,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::LockScope;
use crate::error::DispatchError;
use crate::rpc::ExecutorClient;

/// Compare-and-set attempts before giving up in [`LockScope::Selection`].
const CLAIM_ATTEMPTS: usize = 3;

/// When the coordinator writes the responder back to available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePolicy {
    /// After a successful executor reply.
    pub after_success: bool,
    /// After the executor call timed out.
    pub after_timeout: bool,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            after_success: true,
            after_timeout: false,
        }
    }
}

/// Coordinator runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Extent of the single-flight section.
    pub lock_scope: LockScope,
    /// Upper bound on the executor call.
    pub executor_timeout: Duration,
    /// Restore policy.
    pub restore: RestorePolicy,
    /// Archive an `in_progress` snapshot before calling the executor.
    pub archive_in_progress: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            lock_scope: LockScope::Coarse,
            executor_timeout: Duration::from_secs(180),
            restore: RestorePolicy::default(),
            archive_in_progress: true,
        }
    }
}

/// Occupancy counter for the critical section.
///
/// `peak` never exceeding one is the observable form of the
/// single-flight guarantee.
#[derive(Debug, Default)]
pub struct SingleFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    entries: AtomicU64,
}

impl SingleFlightGauge {
    /// Assignments inside the section right now.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest simultaneous occupancy observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total number of times the section was entered.
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> FlightToken {
        let now = self.current.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.entries.fetch_add(1, Ordering::SeqCst);
        FlightToken(Arc::clone(self))
    }
}

struct FlightToken(Arc<SingleFlightGauge>);

impl Drop for FlightToken {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pick the responder nearest to `target`.
///
/// Uses strict less-than, so among equidistant candidates the first in
/// enumeration order wins. Candidates whose distance is not finite are
/// skipped. Returns the chosen responder and its distance.
pub fn nearest_responder<'a>(
    candidates: &'a [Responder],
    target: &Position,
) -> Option<(&'a Responder, f64)> {
    let mut best: Option<(&Responder, f64)> = None;
    for responder in candidates {
        let distance = responder.position.distance_to(target);
        if !distance.is_finite() {
            warn!(responder_id = %responder.id, "Skipping responder with unusable position");
            continue;
        }
        if best.is_none_or(|(_, shortest)| distance < shortest) {
            best = Some((responder, distance));
        }
    }
    best
}

/// Serves `AssignEmergency`. Cheap to clone; clones share the lock.
#[derive(Clone)]
pub struct AssignmentCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<dyn ResponderRegistry>,
    executor: Arc<dyn ExecutorClient>,
    archive: Option<EventEmitter>,
    settings: CoordinatorSettings,
    lock: Arc<Mutex<()>>,
    gauge: Arc<SingleFlightGauge>,
}

impl AssignmentCoordinator {
    /// Create a coordinator.
    ///
    /// `archive` receives the `in_progress` snapshots; pass `None` to run
    /// without an archival queue.
    pub fn new(
        registry: Arc<dyn ResponderRegistry>,
        executor: Arc<dyn ExecutorClient>,
        archive: Option<EventEmitter>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                executor,
                archive,
                settings,
                lock: Arc::new(Mutex::new(())),
                gauge: Arc::new(SingleFlightGauge::default()),
            }),
        }
    }

    /// Occupancy gauge for the critical section.
    pub fn gauge(&self) -> Arc<SingleFlightGauge> {
        Arc::clone(&self.inner.gauge)
    }

    /// Current settings.
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.inner.settings
    }

    /// Assign the nearest available responder and wait for the executor.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidEmergency`] for non-finite coordinates,
    ///   before any registry access.
    /// - [`DispatchError::NoResponderAvailable`] when nobody is available.
    ///   Nothing is written in that case.
    /// - Executor failures ([`DispatchError::ExecutorTimeout`],
    ///   [`DispatchError::ExecutorUnreachable`],
    ///   [`DispatchError::ExecutorError`]) as reported by the client. The
    ///   responder is put back to `Available` for all of them except a
    ///   timeout, which follows `restore.after_timeout`.
    pub async fn assign(&self, emergency: Emergency) -> Result<AssignReply, DispatchError> {
        emergency.validate()?;
        let inner = Arc::clone(&self.inner);

        let task = match inner.settings.lock_scope {
            LockScope::Coarse => {
                let guard = Arc::clone(&inner.lock).lock_owned().await;
                tokio::spawn(async move {
                    let _guard = guard;
                    let _flight = inner.gauge.enter();
                    let responder = inner.claim(&emergency).await?;
                    inner.dispatch(emergency, responder).await
                })
            }
            LockScope::Selection => tokio::spawn(async move {
                let responder = {
                    let _guard = inner.lock.lock().await;
                    let _flight = inner.gauge.enter();
                    inner.claim(&emergency).await?
                };
                inner.dispatch(emergency, responder).await
            }),
        };

        task.await
            .map_err(|e| DispatchError::Internal(format!("assignment task failed: {e}")))?
    }
}

impl std::fmt::Debug for AssignmentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentCoordinator")
            .field("settings", &self.inner.settings)
            .field("gauge", &self.inner.gauge)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Select the nearest responder and mark it busy.
    async fn claim(&self, emergency: &Emergency) -> Result<Responder, DispatchError> {
        for attempt in 1..=CLAIM_ATTEMPTS {
            let candidates = self.registry.find_available().await?;
            let (chosen, distance) = nearest_responder(&candidates, &emergency.position)
                .ok_or(DispatchError::NoResponderAvailable)?;
            let chosen = chosen.clone();

            debug!(
                incident_id = %emergency.incident_id,
                responder_id = %chosen.id,
                distance,
                candidates = candidates.len(),
                "Selected nearest responder"
            );

            match self.settings.lock_scope {
                LockScope::Coarse => {
                    if let Err(e) = self
                        .registry
                        .update_status(&chosen.id, Availability::Busy)
                        .await
                    {
                        warn!(
                            responder_id = %chosen.id,
                            error = %e,
                            "Failed to mark responder busy, dispatching anyway"
                        );
                    }
                    return Ok(chosen);
                }
                LockScope::Selection => {
                    let swapped = self
                        .registry
                        .compare_and_set_status(
                            &chosen.id,
                            Availability::Available,
                            Availability::Busy,
                        )
                        .await?;
                    if swapped {
                        return Ok(chosen);
                    }
                    debug!(
                        responder_id = %chosen.id,
                        attempt,
                        "Responder was claimed elsewhere, reselecting"
                    );
                }
            }
        }
        Err(DispatchError::NoResponderAvailable)
    }

    /// Archive, call the executor, and apply the restore policy.
    async fn dispatch(
        &self,
        emergency: Emergency,
        responder: Responder,
    ) -> Result<AssignReply, DispatchError> {
        if self.settings.archive_in_progress {
            if let Some(archive) = &self.archive {
                archive.archive(ArchivalRecord::now(
                    emergency.incident_id,
                    responder.id.clone(),
                    ArchivalStage::InProgress,
                    emergency.name.as_str(),
                ));
            }
        }

        info!(
            incident_id = %emergency.incident_id,
            responder_id = %responder.id,
            location = %emergency.name,
            magnitude = emergency.magnitude,
            "Assigning responder"
        );

        let request = ExecuteRequest::for_emergency(responder.id.clone(), &emergency);
        match self
            .executor
            .execute(request, self.settings.executor_timeout)
            .await
        {
            Ok(reply) => {
                if self.settings.restore.after_success {
                    self.restore(&responder.id).await;
                }
                info!(
                    incident_id = %emergency.incident_id,
                    responder_id = %responder.id,
                    final_state = %reply.final_state,
                    "Assignment complete"
                );
                Ok(AssignReply {
                    responder_id: responder.id,
                    final_state: reply.final_state,
                })
            }
            Err(err) => {
                // Only a timeout can leave an executor running; every other
                // failure means it never started or has already stopped.
                let restore = match &err {
                    DispatchError::ExecutorTimeout(_) => self.settings.restore.after_timeout,
                    _ => true,
                };
                if restore {
                    self.restore(&responder.id).await;
                }
                warn!(
                    incident_id = %emergency.incident_id,
                    responder_id = %responder.id,
                    restored = restore,
                    error = %err,
                    "Assignment failed"
                );
                Err(err)
            }
        }
    }

    async fn restore(&self, id: &ResponderId) {
        if let Err(e) = self
            .registry
            .update_status(id, Availability::Available)
            .await
        {
            warn!(responder_id = %id, error = %e, "Failed to restore responder availability");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder(id: &str, lat: f64, lon: f64) -> Responder {
        Responder::available(id, Position::new(lat, lon))
    }

    #[test]
    fn picks_strictly_nearest() {
        let fleet = [responder("a", 0.0, 0.0), responder("b", 10.0, 10.0)];
        let chosen = nearest_responder(&fleet, &Position::new(1.0, 1.0));
        assert_eq!(chosen.map(|(r, _)| r.id.as_str()), Some("a"));

        let chosen = nearest_responder(&fleet, &Position::new(9.0, 9.5));
        assert_eq!(chosen.map(|(r, _)| r.id.as_str()), Some("b"));
    }

    #[test]
    fn ties_go_to_first_seen() {
        let fleet = [
            responder("west", 0.0, -1.0),
            responder("east", 0.0, 1.0),
            responder("north", 1.0, 0.0),
        ];
        let chosen = nearest_responder(&fleet, &Position::new(0.0, 0.0));
        assert_eq!(chosen.map(|(r, _)| r.id.as_str()), Some("west"));
    }

    #[test]
    fn empty_or_unusable_candidates_yield_none() {
        assert!(nearest_responder(&[], &Position::new(0.0, 0.0)).is_none());

        let fleet = [responder("lost", f64::NAN, 0.0), responder("ok", 50.0, 50.0)];
        let chosen = nearest_responder(&fleet, &Position::new(0.0, 0.0));
        assert_eq!(chosen.map(|(r, _)| r.id.as_str()), Some("ok"));
    }

    #[test]
    fn gauge_tracks_peak() {
        let gauge = Arc::new(SingleFlightGauge::default());
        {
            let _a = gauge.enter();
            let _b = gauge.enter();
            assert_eq!(gauge.current(), 2);
        }
        let _c = gauge.enter();
        assert_eq!(gauge.current(), 1);
        assert_eq!(gauge.peak(), 2);
        assert_eq!(gauge.entries(), 3);
    }
}
