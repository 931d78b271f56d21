//! Roomgate Library
//!
//! Access & presence coordination for a single monitored room
//!
//! ## Architecture (7 Components)
//!
//! 1. RoomState - Single authoritative room record
//! 2. CredentialStore - Enrolled identities and their RFID tokens
//! 3. Detector - Exclusive camera, person detection and face recognition
//! 4. AccessEngine - Fail-closed access decisions
//! 5. PresenceAggregator - Presence set from detector frames
//! 6. DeviceProxy - Remote microcontroller (LEDs, status)
//! 7. AuditLog - Append-only event trail
//!
//! ## Design Principles
//!
//! - Fail-closed: a confirming signal that cannot be obtained never grants
//! - Local state is authoritative: device failures never roll back RoomState
//! - One writer at a time: every RoomState mutation goes through `update`

pub mod access_engine;
pub mod audit_log;
pub mod credential_store;
pub mod detector;
pub mod device_proxy;
pub mod error;
pub mod models;
pub mod presence_aggregator;
pub mod room_state;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
