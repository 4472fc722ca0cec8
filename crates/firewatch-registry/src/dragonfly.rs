//! `Dragonfly` (Redis-compatible) responder registry.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `responders:order` | List | Responder ids in registration order |
//! | `responders:ids` | Set | Membership index for `responders:order` |
//! | `responder:{id}` | JSON | Identity and last known position |
//! | `responder:{id}:status` | String | `available` or `busy` |
//! | `incident:{id}` | JSON | Archived incident entry |
//!
//! Availability lives in its own key so the compare-and-set can run as
//! a single server-side script without rewriting the JSON record.

use async_trait::async_trait;
use fred::interfaces::LuaInterface;
use fred::prelude::*;
use firewatch_types::{Availability, Position, Responder, ResponderId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::ResponderRegistry;

const ORDER_KEY: &str = "responders:order";
const MEMBERS_KEY: &str = "responders:ids";

/// Swaps the status key only when it holds the expected value.
const CAS_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('SET', KEYS[1], ARGV[2])
  return 1
end
return 0
";

/// The JSON half of a responder record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResponder {
    id: ResponderId,
    position: Position,
}

fn record_key(id: &ResponderId) -> String {
    format!("responder:{id}")
}

fn status_key(id: &ResponderId) -> String {
    format!("responder:{id}:status")
}

/// Connection handle to a `Dragonfly` instance holding responder records.
#[derive(Clone)]
pub struct DragonflyRegistry {
    client: Client,
}

impl DragonflyRegistry {
    /// Connect to `Dragonfly` at the given URL (`redis://host:port[/db]`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] if the URL cannot be parsed.
    /// Returns [`RegistryError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let config = Config::from_url(url)
            .map_err(|e| RegistryError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly registry");
        Ok(Self { client })
    }

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if serialization or the write fails.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), RegistryError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize it from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the read or deserialization fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RegistryError> {
        let value: Option<String> = self.client.get(key).await?;
        match value {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn read_status(&self, id: &ResponderId) -> Result<Option<Availability>, RegistryError> {
        let key = status_key(id);
        let value: Option<String> = self.client.get(&key).await?;
        value
            .map(|s| {
                Availability::parse(&s).ok_or_else(|| RegistryError::Corrupt {
                    key: key.clone(),
                    reason: format!("unknown availability '{s}'"),
                })
            })
            .transpose()
    }

    async fn load(&self, id: &ResponderId) -> Result<Option<Responder>, RegistryError> {
        let Some(stored) = self.get_json::<StoredResponder>(&record_key(id)).await? else {
            return Ok(None);
        };
        let availability = self.read_status(id).await?.unwrap_or(Availability::Busy);
        Ok(Some(Responder {
            id: stored.id,
            position: stored.position,
            availability,
        }))
    }

    async fn ensure_exists(&self, id: &ResponderId) -> Result<(), RegistryError> {
        let exists: bool = self.client.sismember(MEMBERS_KEY, id.as_str()).await?;
        if exists {
            Ok(())
        } else {
            Err(RegistryError::NotFound(id.to_string()))
        }
    }
}

#[async_trait]
impl ResponderRegistry for DragonflyRegistry {
    async fn find_available(&self) -> Result<Vec<Responder>, RegistryError> {
        let ids: Vec<String> = self.client.lrange(ORDER_KEY, 0, -1).await?;
        let mut available = Vec::with_capacity(ids.len());
        for id in ids {
            let id = ResponderId::new(id);
            match self.load(&id).await? {
                Some(r) if r.availability == Availability::Available => available.push(r),
                Some(_) => {}
                None => {
                    tracing::warn!(responder_id = %id, "ordered id has no record, skipping");
                }
            }
        }
        Ok(available)
    }

    async fn find_by_id(&self, id: &ResponderId) -> Result<Option<Responder>, RegistryError> {
        self.load(id).await
    }

    async fn update_status(
        &self,
        id: &ResponderId,
        availability: Availability,
    ) -> Result<(), RegistryError> {
        self.ensure_exists(id).await?;
        let _: () = self
            .client
            .set(status_key(id), availability.as_str(), None, None, false)
            .await?;
        Ok(())
    }

    async fn update_position(
        &self,
        id: &ResponderId,
        position: Position,
        availability: Availability,
    ) -> Result<(), RegistryError> {
        self.ensure_exists(id).await?;
        let stored = StoredResponder {
            id: id.clone(),
            position,
        };
        self.set_json(&record_key(id), &stored).await?;
        let _: () = self
            .client
            .set(status_key(id), availability.as_str(), None, None, false)
            .await?;
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        id: &ResponderId,
        expected: Availability,
        new: Availability,
    ) -> Result<bool, RegistryError> {
        self.ensure_exists(id).await?;
        let swapped: i64 = self
            .client
            .eval(
                CAS_SCRIPT,
                vec![status_key(id)],
                vec![expected.as_str(), new.as_str()],
            )
            .await?;
        Ok(swapped == 1)
    }

    async fn register(&self, responder: Responder) -> Result<(), RegistryError> {
        let stored = StoredResponder {
            id: responder.id.clone(),
            position: responder.position,
        };
        self.set_json(&record_key(&responder.id), &stored).await?;
        let _: () = self
            .client
            .set(
                status_key(&responder.id),
                responder.availability.as_str(),
                None,
                None,
                false,
            )
            .await?;
        let added: u64 = self.client.sadd(MEMBERS_KEY, responder.id.as_str()).await?;
        if added > 0 {
            let _: u64 = self.client.rpush(ORDER_KEY, responder.id.as_str()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DragonflyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragonflyRegistry").finish_non_exhaustive()
    }
}
