//! Responder-side lifecycle simulation.
//!
//! [`ResponseExecutor::execute`] runs one dispatch from start to finish
//! on a single task: look up the responder, wait out the preflight
//! delay, announce `assigned` and `en_route`, travel, then suppress for
//! `magnitude` units with periodic heartbeats, and finally announce
//! `extinguished` and park the responder at the incident.
//!
//! Events go through an [`EventEmitter`], so a slow or absent broker
//! never stalls the lifecycle and events leave in emission order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use firewatch_broker::EventEmitter;
use firewatch_registry::ResponderRegistry;
use firewatch_types::{
    ArchivalRecord, ArchivalStage, Availability, ExecuteRequest, IncidentId, InvalidEmergency,
    LifecycleState, ResponderId, StatusEvent,
};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::DispatchError;

/// Timing parameters for the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Wait before the first event.
    pub preflight_delay: Duration,
    /// Travel seconds per unit of planar distance.
    pub travel_secs_per_unit: f64,
    /// Mitigation time per unit of magnitude.
    pub mitigation_per_magnitude: Duration,
    /// Period between suppression heartbeats. Zero disables them.
    pub heartbeat_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            preflight_delay: Duration::from_secs(4),
            travel_secs_per_unit: 0.5,
            mitigation_per_magnitude: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

impl ExecutorSettings {
    /// Time to cover `distance` units.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] if the distance is negative or
    /// not finite.
    pub fn travel_time(&self, distance: f64) -> Result<Duration, DispatchError> {
        Duration::try_from_secs_f64(distance * self.travel_secs_per_unit).map_err(|e| {
            DispatchError::Internal(format!("cannot compute travel time for {distance}: {e}"))
        })
    }

    /// Time to suppress an incident of `magnitude`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] on overflow.
    pub fn mitigation_time(&self, magnitude: u32) -> Result<Duration, DispatchError> {
        self.mitigation_per_magnitude
            .checked_mul(magnitude)
            .ok_or_else(|| {
                DispatchError::Internal(format!("mitigation time overflows for magnitude {magnitude}"))
            })
    }
}

/// Runs dispatches against the registry and emits their lifecycle.
pub struct ResponseExecutor {
    registry: Arc<dyn ResponderRegistry>,
    emitter: EventEmitter,
    settings: ExecutorSettings,
}

impl ResponseExecutor {
    /// Create an executor.
    pub fn new(
        registry: Arc<dyn ResponderRegistry>,
        emitter: EventEmitter,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            registry,
            emitter,
            settings,
        }
    }

    /// Run one dispatch to completion.
    ///
    /// Returns [`LifecycleState::Extinguished`] once the final event has
    /// been queued and the registry write attempted. A failed final
    /// registry write is logged, not returned.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidEmergency`] for non-finite coordinates.
    /// - [`DispatchError::ResponderNotFound`] if the responder is not
    ///   registered. No events are emitted in that case.
    /// - [`DispatchError::Registry`] if the lookup itself fails.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<LifecycleState, DispatchError> {
        let target = request.position();
        if !target.is_finite() {
            return Err(InvalidEmergency::NonFiniteCoordinates {
                name: request.location_label,
            }
            .into());
        }

        let responder = self
            .registry
            .find_by_id(&request.responder_id)
            .await?
            .ok_or_else(|| DispatchError::ResponderNotFound(request.responder_id.clone()))?;

        let distance = responder.position.distance_to(&target);
        let travel = self.settings.travel_time(distance)?;
        let mitigation = self.settings.mitigation_time(request.magnitude)?;

        info!(
            incident_id = %request.incident_id,
            responder_id = %responder.id,
            location = %request.location_label,
            distance,
            travel_ms = travel.as_millis(),
            mitigation_ms = mitigation.as_millis(),
            "Dispatch started"
        );

        let mut announcer = Announcer {
            emitter: &self.emitter,
            incident_id: request.incident_id,
            responder_id: responder.id.clone(),
            location_label: request.location_label.clone(),
            sequence: 0,
        };

        tokio::time::sleep(self.settings.preflight_delay).await;
        announcer.emit(LifecycleState::Assigned);
        announcer.emit(LifecycleState::EnRoute);

        tokio::time::sleep(travel).await;
        announcer.emit(LifecycleState::Suppressing);

        let heartbeats = self.suppress(&mut announcer, mitigation).await;

        announcer.emit(LifecycleState::Extinguished);
        self.emitter.archive(ArchivalRecord::now(
            request.incident_id,
            responder.id.clone(),
            ArchivalStage::Extinguished,
            request.location_label.as_str(),
        ));

        if let Err(e) = self
            .registry
            .update_position(&responder.id, target, Availability::Available)
            .await
        {
            warn!(
                incident_id = %request.incident_id,
                responder_id = %responder.id,
                error = %e,
                "Failed to persist final responder position"
            );
        }

        info!(
            incident_id = %request.incident_id,
            responder_id = %responder.id,
            heartbeats,
            "Dispatch finished"
        );
        Ok(LifecycleState::Extinguished)
    }

    /// Hold the suppression phase for `duration`, emitting a heartbeat
    /// every heartbeat interval strictly before the deadline. Returns the
    /// number of heartbeats emitted.
    async fn suppress(&self, announcer: &mut Announcer<'_>, duration: Duration) -> u32 {
        let start = Instant::now();
        let deadline = tokio::time::sleep_until(start.checked_add(duration).unwrap_or(start));
        tokio::pin!(deadline);

        let period = self.settings.heartbeat_interval;
        if period.is_zero() {
            deadline.await;
            return 0;
        }

        let first = start.checked_add(period).unwrap_or(start);
        let mut ticker = tokio::time::interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut heartbeats: u32 = 0;
        loop {
            tokio::select! {
                biased;
                () = &mut deadline => break,
                _ = ticker.tick() => {
                    announcer.emit(LifecycleState::Suppressing);
                    heartbeats = heartbeats.saturating_add(1);
                }
            }
        }
        heartbeats
    }
}

impl std::fmt::Debug for ResponseExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseExecutor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Stamps and queues events for one incident.
struct Announcer<'a> {
    emitter: &'a EventEmitter,
    incident_id: IncidentId,
    responder_id: ResponderId,
    location_label: String,
    sequence: u32,
}

impl Announcer<'_> {
    fn emit(&mut self, state: LifecycleState) {
        debug!(
            incident_id = %self.incident_id,
            sequence = self.sequence,
            state = %state,
            "Emitting lifecycle event"
        );
        self.emitter.status(StatusEvent {
            incident_id: Some(self.incident_id),
            sequence: self.sequence,
            responder_id: self.responder_id.clone(),
            state,
            location_label: self.location_label.clone(),
            timestamp: Utc::now(),
        });
        self.sequence = self.sequence.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_time_scales_with_distance() {
        let settings = ExecutorSettings::default();
        assert_eq!(settings.travel_time(4.0).ok(), Some(Duration::from_secs(2)));
        assert_eq!(settings.travel_time(0.0).ok(), Some(Duration::ZERO));
        assert!(settings.travel_time(f64::NAN).is_err());
        assert!(settings.travel_time(-1.0).is_err());
    }

    #[test]
    fn mitigation_time_scales_with_magnitude() {
        let settings = ExecutorSettings::default();
        assert_eq!(settings.mitigation_time(3).ok(), Some(Duration::from_secs(6)));
        assert_eq!(settings.mitigation_time(0).ok(), Some(Duration::ZERO));

        let huge = ExecutorSettings {
            mitigation_per_magnitude: Duration::MAX,
            ..ExecutorSettings::default()
        };
        assert!(huge.mitigation_time(2).is_err());
    }
}
