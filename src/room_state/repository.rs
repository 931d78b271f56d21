//! RoomState Repository
//!
//! Singleton row (`id = 1`) in the `room_state` table

use super::types::*;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};

const SINGLETON_ID: u8 = 1;

/// RoomState repository for database operations
#[derive(Clone)]
pub struct RoomStateRepository {
    pool: MySqlPool,
}

impl RoomStateRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Load the singleton row, if it exists
    pub async fn load(&self) -> Result<Option<RoomState>> {
        let row = sqlx::query(
            r#"
            SELECT detected_people, people_count, temperature, humidity, last_rfid,
                   light_presence, light_accent, light_granted, light_denied, last_update
            FROM room_state WHERE id = ?
            "#,
        )
        .bind(SINGLETON_ID)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let people_json: String = row.try_get("detected_people")?;
        let people: Vec<String> = serde_json::from_str(&people_json)
            .map_err(|e| Error::Database(format!("corrupt detected_people column: {}", e)))?;
        let stored_count: u32 = row.try_get("people_count")?;

        let mut state = RoomState::default();
        state.set_presence(people.into());
        if state.people_count() != stored_count {
            tracing::warn!(
                stored_count = stored_count,
                derived_count = state.people_count(),
                "room_state people_count out of sync with detected_people, using derived value"
            );
        }

        state.temperature = row.try_get("temperature")?;
        state.humidity = row.try_get("humidity")?;
        state.last_rfid = row.try_get("last_rfid")?;
        state.light_presence = row.try_get("light_presence")?;
        state.light_accent = row.try_get("light_accent")?;
        state.light_granted = row.try_get("light_granted")?;
        state.light_denied = row.try_get("light_denied")?;
        state.last_update = row.try_get::<DateTime<Utc>, _>("last_update")?;

        Ok(Some(state))
    }

    /// Insert or replace the singleton row
    pub async fn save(&self, state: &RoomState) -> Result<()> {
        let people_json = serde_json::to_string(state.detected_people())?;

        sqlx::query(
            r#"
            INSERT INTO room_state (
                id, detected_people, people_count, has_presence,
                temperature, humidity, last_rfid,
                light_presence, light_accent, light_granted, light_denied,
                last_update
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                detected_people = VALUES(detected_people),
                people_count = VALUES(people_count),
                has_presence = VALUES(has_presence),
                temperature = VALUES(temperature),
                humidity = VALUES(humidity),
                last_rfid = VALUES(last_rfid),
                light_presence = VALUES(light_presence),
                light_accent = VALUES(light_accent),
                light_granted = VALUES(light_granted),
                light_denied = VALUES(light_denied),
                last_update = VALUES(last_update)
            "#,
        )
        .bind(SINGLETON_ID)
        .bind(people_json)
        .bind(state.people_count())
        .bind(state.has_presence())
        .bind(state.temperature)
        .bind(state.humidity)
        .bind(&state.last_rfid)
        .bind(state.light_presence)
        .bind(state.light_accent)
        .bind(state.light_granted)
        .bind(state.light_denied)
        .bind(state.last_update)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
