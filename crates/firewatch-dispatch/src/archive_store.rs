//! Dragonfly persistence for archived incidents.

use std::sync::Arc;

use async_trait::async_trait;
use firewatch_broker::{BrokerError, IncidentEntry, IncidentStore};
use firewatch_registry::DragonflyRegistry;
use firewatch_types::IncidentId;

/// Key under which an incident entry is stored.
pub fn incident_key(id: IncidentId) -> String {
    format!("incident:{id}")
}

/// Keeps each incident entry at `incident:{id}` as JSON.
#[derive(Debug, Clone)]
pub struct DragonflyIncidentStore {
    dragonfly: Arc<DragonflyRegistry>,
}

impl DragonflyIncidentStore {
    /// Share the registry's connection.
    pub const fn new(dragonfly: Arc<DragonflyRegistry>) -> Self {
        Self { dragonfly }
    }
}

#[async_trait]
impl IncidentStore for DragonflyIncidentStore {
    async fn load(&self, incident_id: &IncidentId) -> Result<Option<IncidentEntry>, BrokerError> {
        self.dragonfly
            .get_json(&incident_key(*incident_id))
            .await
            .map_err(|e| BrokerError::Store(e.to_string()))
    }

    async fn save(&self, entry: &IncidentEntry) -> Result<(), BrokerError> {
        self.dragonfly
            .set_json(&incident_key(entry.incident_id), entry)
            .await
            .map_err(|e| BrokerError::Store(e.to_string()))
    }
}
