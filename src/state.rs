//! Application state
//!
//! Holds all shared components and the configuration they were built from

use crate::access_engine::{AccessDecisionEngine, AccessPolicy, PolicyMode};
use crate::audit_log::{AuditLog, AuditRepository};
use crate::credential_store::{CredentialStore, IdentityRepository, InMemoryCredentialStore};
use crate::detector::{DetectorHandle, MatchPolicy};
use crate::device_proxy::{DeviceProxy, DEFAULT_DEVICE_TIMEOUT_MS};
use crate::error::Result;
use crate::presence_aggregator::PresenceAggregator;
use crate::room_state::{RoomStateRepository, RoomStateStore};
use sqlx::MySqlPool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Linear backoff step between device command retries
const DEVICE_RETRY_BACKOFF_MS: u64 = 200;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Remote microcontroller base URL
    pub device_base_url: String,
    /// Per-exchange device timeout
    pub device_timeout: Duration,
    /// Extra attempts for a failed device command
    pub device_retries: u32,
    /// Vision backend URL; `None` leaves the detector uninitialized
    pub vision_url: Option<String>,
    /// Capture device selector passed to the vision backend
    pub capture_device: String,
    /// Bound on one capture-and-identify
    pub capture_timeout: Duration,
    /// Bound on waiting for the exclusive camera
    pub capture_wait: Duration,
    pub acceptance_distance: f64,
    pub person_confidence: f32,
    pub policy_mode: PolicyMode,
    pub authorized_name: String,
    pub authorized_token: String,
    /// In-memory audit ring size
    pub audit_buffer_capacity: usize,
    /// Periodic presence tick; `None` disables the ticker
    pub presence_tick: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let matching = MatchPolicy::default();
        let policy = AccessPolicy::default();

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mysql://root@localhost/roomgate".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8000),
            device_base_url: std::env::var("DEVICE_BASE_URL")
                .unwrap_or_else(|_| "http://192.168.4.1".to_string()),
            device_timeout: Duration::from_millis(env_or(
                "DEVICE_TIMEOUT_MS",
                DEFAULT_DEVICE_TIMEOUT_MS,
            )),
            device_retries: env_or("DEVICE_RETRIES", 0),
            vision_url: std::env::var("VISION_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            capture_device: std::env::var("CAPTURE_DEVICE").unwrap_or_else(|_| "0".to_string()),
            capture_timeout: Duration::from_millis(env_or("CAPTURE_TIMEOUT_MS", 5000)),
            capture_wait: Duration::from_millis(env_or("CAPTURE_WAIT_MS", 5000)),
            acceptance_distance: env_or("ACCEPTANCE_DISTANCE", matching.acceptance_distance),
            person_confidence: env_or("PERSON_CONFIDENCE", matching.person_confidence),
            policy_mode: env_or("ACCESS_POLICY_MODE", policy.mode),
            authorized_name: std::env::var("AUTHORIZED_NAME").unwrap_or(policy.authorized_name),
            authorized_token: std::env::var("AUTHORIZED_TOKEN").unwrap_or(policy.authorized_token),
            audit_buffer_capacity: env_or("AUDIT_BUFFER_CAPACITY", 2000),
            presence_tick: match env_or::<u64>("PRESENCE_TICK_SECS", 0) {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

impl AppConfig {
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            person_confidence: self.person_confidence,
            acceptance_distance: self.acceptance_distance,
        }
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            mode: self.policy_mode,
            authorized_name: self.authorized_name.clone(),
            authorized_token: self.authorized_token.clone(),
            matching: self.match_policy(),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "Invalid config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// CredentialStore (enrolled identities)
    pub credentials: Arc<dyn CredentialStore>,
    /// RoomStateStore (singleton room record)
    pub room: Arc<RoomStateStore>,
    /// AuditLog
    pub audit: Arc<AuditLog>,
    /// Detector handle (exclusive camera)
    pub detector: Arc<DetectorHandle>,
    /// DeviceProxy (remote microcontroller)
    pub device: Arc<DeviceProxy>,
    /// AccessDecisionEngine
    pub access: Arc<AccessDecisionEngine>,
    /// PresenceAggregator
    pub presence: Arc<PresenceAggregator>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire components around the given stores
    ///
    /// The detector handle starts uninitialized; the caller attaches a backend.
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        room: Arc<RoomStateStore>,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        let device = Arc::new(
            DeviceProxy::new(config.device_base_url.clone(), config.device_timeout)?.with_retries(
                config.device_retries,
                Duration::from_millis(DEVICE_RETRY_BACKOFF_MS),
            ),
        );
        let detector = Arc::new(DetectorHandle::with_timeouts(
            config.capture_wait,
            config.capture_timeout,
        ));

        let access = Arc::new(AccessDecisionEngine::new(
            credentials.clone(),
            detector.clone(),
            room.clone(),
            device.clone(),
            audit.clone(),
            config.access_policy(),
        ));
        let presence = Arc::new(PresenceAggregator::new(
            detector.clone(),
            room.clone(),
            device.clone(),
            audit.clone(),
            config.match_policy(),
        ));

        Ok(Self {
            config,
            credentials,
            room,
            audit,
            detector,
            device,
            access,
            presence,
            started_at: Instant::now(),
        })
    }

    /// Wire components over MySQL when a pool is given, in memory otherwise
    pub fn assemble(config: AppConfig, pool: Option<MySqlPool>) -> Result<Self> {
        let capacity = config.audit_buffer_capacity;

        match pool {
            Some(pool) => Self::new(
                config,
                Arc::new(IdentityRepository::new(pool.clone())),
                Arc::new(RoomStateStore::with_repository(RoomStateRepository::new(
                    pool.clone(),
                ))),
                Arc::new(AuditLog::with_repository(
                    capacity,
                    AuditRepository::new(pool),
                )),
            ),
            None => Self::new(
                config,
                Arc::new(InMemoryCredentialStore::new()),
                Arc::new(RoomStateStore::new()),
                Arc::new(AuditLog::new(capacity)),
            ),
        }
    }

    pub fn uptime_sec(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
