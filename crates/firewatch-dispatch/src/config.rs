//! Configuration loading for the dispatch service.
//!
//! The service reads `firewatch-config.yaml` (or the path in
//! `FIREWATCH_CONFIG`). Every section is optional; missing keys fall
//! back to the defaults below. Connection strings may be overridden
//! from the environment so deployments do not need to edit the file.

use std::path::Path;
use std::time::Duration;

use firewatch_types::{Position, Responder};
use serde::Deserialize;

use crate::coordinator::{CoordinatorSettings, RestorePolicy};
use crate::executor::ExecutorSettings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level dispatch configuration, mirroring `firewatch-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DispatchConfig {
    /// Connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Which roles this process runs.
    #[serde(default)]
    pub dispatch: RolesConfig,

    /// Assignment coordinator behavior.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Response executor timings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Responders registered at startup if the registry lacks them.
    #[serde(default)]
    pub fleet: Vec<FleetEntry>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DispatchConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `NATS_URL` and `DRAGONFLY_URL` override the infrastructure
    /// section when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }

    /// Translate the coordinator section into runtime settings.
    pub const fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            lock_scope: self.coordinator.lock_scope,
            executor_timeout: Duration::from_millis(self.coordinator.executor_timeout_ms),
            restore: RestorePolicy {
                after_success: self.coordinator.restore.after_success,
                after_timeout: self.coordinator.restore.after_timeout,
            },
            archive_in_progress: self.coordinator.archive_in_progress,
        }
    }

    /// Translate the executor section into runtime settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a rate is negative or not
    /// finite.
    pub fn executor_settings(&self) -> Result<ExecutorSettings, ConfigError> {
        let section = &self.executor;
        if !section.travel_secs_per_unit.is_finite() || section.travel_secs_per_unit < 0.0 {
            return Err(ConfigError::Invalid {
                field: "executor.travel_secs_per_unit",
                reason: format!("{} is not a non-negative number", section.travel_secs_per_unit),
            });
        }
        let mitigation = Duration::try_from_secs_f64(section.mitigation_secs_per_magnitude)
            .map_err(|e| ConfigError::Invalid {
                field: "executor.mitigation_secs_per_magnitude",
                reason: e.to_string(),
            })?;
        Ok(ExecutorSettings {
            preflight_delay: Duration::from_millis(section.preflight_delay_ms),
            travel_secs_per_unit: section.travel_secs_per_unit,
            mitigation_per_magnitude: mitigation,
            heartbeat_interval: Duration::from_millis(section.heartbeat_interval_ms),
        })
    }

    /// The configured fleet as registry records, all available.
    pub fn fleet_responders(&self) -> Vec<Responder> {
        self.fleet
            .iter()
            .map(|entry| {
                Responder::available(
                    entry.id.as_str(),
                    Position::new(entry.latitude, entry.longitude),
                )
            })
            .collect()
    }
}

/// Infrastructure connection strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,
}

impl InfrastructureConfig {
    /// Override connection strings from `NATS_URL` and `DRAGONFLY_URL`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            dragonfly_url: default_dragonfly_url(),
        }
    }
}

/// A process role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Serve `AssignEmergency`.
    Coordinator,
    /// Serve `ExecuteResponse`.
    Executor,
    /// Consume the archival queue into Dragonfly.
    Archiver,
}

/// Role selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RolesConfig {
    /// Roles to run in this process.
    #[serde(default = "default_roles")]
    pub roles: Vec<Role>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
        }
    }
}

/// How much of an assignment the single-flight section covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// Selection through the executor's reply and the restore write.
    #[default]
    Coarse,
    /// Selection and busy-marking only, guarded by compare-and-set.
    Selection,
}

/// Assignment coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoordinatorConfig {
    /// Single-flight scope.
    #[serde(default)]
    pub lock_scope: LockScope,

    /// Milliseconds to wait for the executor's reply.
    #[serde(default = "default_executor_timeout_ms")]
    pub executor_timeout_ms: u64,

    /// When to write the responder back to available.
    #[serde(default)]
    pub restore: RestoreConfig,

    /// Whether to archive an `in_progress` snapshot at assignment time.
    #[serde(default = "default_true")]
    pub archive_in_progress: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_scope: LockScope::default(),
            executor_timeout_ms: default_executor_timeout_ms(),
            restore: RestoreConfig::default(),
            archive_in_progress: true,
        }
    }
}

/// Restore policy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RestoreConfig {
    /// Restore after the executor reports success.
    #[serde(default = "default_true")]
    pub after_success: bool,

    /// Restore after the executor call times out.
    #[serde(default)]
    pub after_timeout: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            after_success: true,
            after_timeout: false,
        }
    }
}

/// Response executor timings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutorConfig {
    /// Delay before the first lifecycle event.
    #[serde(default = "default_preflight_delay_ms")]
    pub preflight_delay_ms: u64,

    /// Travel seconds per unit of planar distance.
    #[serde(default = "default_travel_secs_per_unit")]
    pub travel_secs_per_unit: f64,

    /// Mitigation seconds per unit of magnitude.
    #[serde(default = "default_mitigation_secs_per_magnitude")]
    pub mitigation_secs_per_magnitude: f64,

    /// Milliseconds between mitigation heartbeats.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            preflight_delay_ms: default_preflight_delay_ms(),
            travel_secs_per_unit: default_travel_secs_per_unit(),
            mitigation_secs_per_magnitude: default_mitigation_secs_per_magnitude(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

/// One responder to seed into the registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FleetEntry {
    /// Responder id.
    pub id: String,
    /// Home latitude.
    pub latitude: f64,
    /// Home longitude.
    pub longitude: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_roles() -> Vec<Role> {
    vec![Role::Coordinator, Role::Executor, Role::Archiver]
}

const fn default_executor_timeout_ms() -> u64 {
    180_000
}

const fn default_preflight_delay_ms() -> u64 {
    4_000
}

const fn default_travel_secs_per_unit() -> f64 {
    0.5
}

const fn default_mitigation_secs_per_magnitude() -> f64 {
    2.0
}

const fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.coordinator.lock_scope, LockScope::Coarse);
        assert_eq!(config.coordinator.executor_timeout_ms, 180_000);
        assert!(config.coordinator.restore.after_success);
        assert!(!config.coordinator.restore.after_timeout);
        assert!(config.coordinator.archive_in_progress);
        assert_eq!(config.executor.preflight_delay_ms, 4_000);
        assert_eq!(config.executor.heartbeat_interval_ms, 5_000);
        assert_eq!(config.dispatch.roles.len(), 3);
        assert!(config.fleet.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
infrastructure:
  nats_url: nats://testhost:4222
  dragonfly_url: redis://testhost:6379

dispatch:
  roles: [executor]

coordinator:
  lock_scope: selection
  executor_timeout_ms: 1000
  restore:
    after_success: false
    after_timeout: true
  archive_in_progress: false

executor:
  preflight_delay_ms: 0
  travel_secs_per_unit: 1.5
  mitigation_secs_per_magnitude: 0.25
  heartbeat_interval_ms: 100

fleet:
  - id: engine-1
    latitude: 1.0
    longitude: 2.0
  - id: engine-2
    latitude: -3.5
    longitude: 4.0

logging:
  level: debug
";
        let config = DispatchConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.dispatch.roles, vec![Role::Executor]);
        assert_eq!(config.coordinator.lock_scope, LockScope::Selection);
        assert!(!config.coordinator.archive_in_progress);

        let coordinator = config.coordinator_settings();
        assert_eq!(coordinator.executor_timeout, Duration::from_secs(1));
        assert!(!coordinator.restore.after_success);
        assert!(coordinator.restore.after_timeout);

        let executor = config.executor_settings();
        assert!(executor.is_ok());
        let executor = executor.ok().unwrap_or_default();
        assert_eq!(executor.preflight_delay, Duration::ZERO);
        assert_eq!(executor.mitigation_per_magnitude, Duration::from_millis(250));
        assert_eq!(executor.heartbeat_interval, Duration::from_millis(100));

        let fleet = config.fleet_responders();
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet.first().map(|r| r.id.as_str()), Some("engine-1"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = DispatchConfig::parse("coordinator:\n  executor_timeout_ms: 5\n");
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();
        assert_eq!(config.coordinator.executor_timeout_ms, 5);
        assert!(config.coordinator.restore.after_success);
        assert_eq!(config.executor.preflight_delay_ms, 4_000);
    }

    #[test]
    fn unknown_lock_scope_is_rejected() {
        let config = DispatchConfig::parse("coordinator:\n  lock_scope: global\n");
        assert!(matches!(config, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn negative_rates_are_rejected() {
        let mut config = DispatchConfig::default();
        config.executor.mitigation_secs_per_magnitude = -1.0;
        assert!(matches!(
            config.executor_settings(),
            Err(ConfigError::Invalid {
                field: "executor.mitigation_secs_per_magnitude",
                ..
            })
        ));

        let mut config = DispatchConfig::default();
        config.executor.travel_secs_per_unit = f64::NAN;
        assert!(config.executor_settings().is_err());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("firewatch-config.yaml");
        if path.exists() {
            let config = DispatchConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
