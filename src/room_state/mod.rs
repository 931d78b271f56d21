//! RoomState - Single authoritative room record
//!
//! ## Responsibilities
//!
//! - Hold the one RoomState instance for the whole process
//! - Serialize every mutation (no two mutators interleave)
//! - Keep `people_count == |detected_people|` and
//!   `has_presence == (people_count > 0)` before and after every update
//! - Write-through to MySQL when a repository is configured
//!
//! The record is created lazily with all-zero defaults on first access.

mod repository;
mod types;

pub use repository::RoomStateRepository;
pub use types::*;

use crate::error::Result;
use chrono::Utc;
use tokio::sync::Mutex;

/// RoomStateStore instance
pub struct RoomStateStore {
    /// `None` until first access
    slot: Mutex<Option<RoomState>>,
    repo: Option<RoomStateRepository>,
}

impl RoomStateStore {
    /// In-memory store
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            repo: None,
        }
    }

    /// Store backed by the `room_state` table
    pub fn with_repository(repo: RoomStateRepository) -> Self {
        Self {
            slot: Mutex::new(None),
            repo: Some(repo),
        }
    }

    /// Current snapshot
    pub async fn read(&self) -> Result<RoomState> {
        let mut slot = self.slot.lock().await;
        let state = self.ensure_loaded(&mut slot).await?;
        Ok(state.clone())
    }

    /// Apply `mutator` atomically and return the new snapshot
    ///
    /// The mutator works on a draft. The draft replaces the record only after
    /// it has been persisted, so a persistence failure leaves the previous
    /// record in place.
    pub async fn update<F>(&self, mutator: F) -> Result<RoomState>
    where
        F: FnOnce(&mut RoomState),
    {
        let mut slot = self.slot.lock().await;
        let current = self.ensure_loaded(&mut slot).await?;

        let mut draft = current.clone();
        mutator(&mut draft);
        draft.last_update = Utc::now();
        debug_assert!(draft.invariant_holds());

        if let Some(ref repo) = self.repo {
            repo.save(&draft).await?;
        }

        *slot = Some(draft.clone());
        Ok(draft)
    }

    async fn ensure_loaded<'a>(&self, slot: &'a mut Option<RoomState>) -> Result<&'a RoomState> {
        if slot.is_none() {
            let loaded = match self.repo {
                Some(ref repo) => match repo.load().await? {
                    Some(state) => state,
                    None => {
                        let state = RoomState::default();
                        repo.save(&state).await?;
                        tracing::info!("Room state record created with defaults");
                        state
                    }
                },
                None => RoomState::default(),
            };
            *slot = Some(loaded);
        }

        Ok(slot.get_or_insert_with(RoomState::default))
    }
}

impl Default for RoomStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lazy_default_on_first_read() {
        let store = RoomStateStore::new();
        let state = store.read().await.unwrap();
        assert_eq!(state.people_count(), 0);
        assert!(!state.has_presence());
        assert_eq!(state.temperature, 0.0);
        assert!(state.last_rfid.is_empty());
        assert!(LedKind::ALL.iter().all(|k| !state.led(*k)));
    }

    #[tokio::test]
    async fn test_update_returns_new_snapshot() {
        let store = RoomStateStore::new();
        let before = store.read().await.unwrap();

        let after = store
            .update(|s| s.set_presence(["Israel"].into_iter().collect()))
            .await
            .unwrap();

        assert_eq!(after.people_count(), 1);
        assert!(after.last_update >= before.last_update);
        assert_eq!(store.read().await.unwrap(), after);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(RoomStateStore::new());
        let mut handles = Vec::new();

        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(move |s| {
                        let mut people = s.detected_people().clone();
                        people.insert(format!("p{}", i));
                        s.set_presence(people);
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            let snapshot = handle.await.unwrap();
            assert!(snapshot.invariant_holds());
        }

        let state = store.read().await.unwrap();
        assert_eq!(state.people_count(), 50);
        assert!(state.invariant_holds());
    }

    #[tokio::test]
    async fn test_same_led_update_twice_is_idempotent() {
        let store = RoomStateStore::new();
        let first = store.update(|s| s.set_led(LedKind::Accent, true)).await.unwrap();
        let second = store.update(|s| s.set_led(LedKind::Accent, true)).await.unwrap();

        assert_eq!(first.light_accent, second.light_accent);
        assert_eq!(first.detected_people(), second.detected_people());
        assert_eq!(
            LedKind::ALL.map(|k| first.led(k)),
            LedKind::ALL.map(|k| second.led(k))
        );
    }
}
