//! Room Registry: creates, looks up, and garbage-collects rooms.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use sketchforge_protocol::{PlayerId, RoomId};
use tokio::sync::mpsc;

use crate::actor::spawn_room;
use crate::{GameConfig, Room, RoomError, RoomHandle, RoomInfo, RoomNotice, WordBank};

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Random ids tried before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Owns every live room.
///
/// Entry point for room operations from the server. Rooms report back
/// through the notice channel passed to [`RoomRegistry::new`]; the owner
/// of the receiving end calls [`delete_if_empty`](Self::delete_if_empty)
/// on `Idle`.
pub struct RoomRegistry {
    config: Arc<GameConfig>,
    /// Template bank; each room gets a clone with its own history.
    words: WordBank,
    notices: mpsc::UnboundedSender<RoomNotice>,
    rooms: HashMap<RoomId, RoomHandle>,
}

impl RoomRegistry {
    pub fn new(
        config: GameConfig,
        words: WordBank,
        notices: mpsc::UnboundedSender<RoomNotice>,
    ) -> Self {
        Self {
            config: Arc::new(config.validated()),
            words,
            notices,
            rooms: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Creates a private room administered by `creator`.
    ///
    /// The creator is not joined; they still send `joinRoom` like anyone
    /// else.
    pub fn create_room(
        &mut self,
        creator: PlayerId,
    ) -> Result<RoomId, RoomError> {
        let room_id = self.allocate_id()?;
        let room = Room::new(
            room_id.clone(),
            creator.clone(),
            Arc::clone(&self.config),
            self.words.clone(),
        );
        self.insert(room);
        tracing::info!(%room_id, admin = %creator, "room created");
        Ok(room_id)
    }

    /// Creates a public room with an open signup window.
    pub fn create_public_room(&mut self) -> Result<RoomId, RoomError> {
        let room_id = self.allocate_id()?;
        let room = Room::new_public(
            room_id.clone(),
            Arc::clone(&self.config),
            self.words.clone(),
        );
        self.insert(room);
        tracing::info!(
            %room_id,
            window_secs = self.config.enrollment_window.as_secs(),
            "public room opened"
        );
        Ok(room_id)
    }

    fn insert(&mut self, room: Room) {
        let room_id = room.id().clone();
        let handle =
            spawn_room(room, DEFAULT_CHANNEL_SIZE, self.notices.clone());
        self.rooms.insert(room_id, handle);
    }

    /// Eight lowercase hex characters, unique among live rooms.
    fn allocate_id(&self) -> Result<RoomId, RoomError> {
        let mut rng = rand::rng();
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = RoomId::new(format!("{:08x}", rng.random::<u32>()));
            if !self.rooms.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(RoomError::IdAllocation)
    }

    /// A handle to `room_id`, cloned so callers can await on it without
    /// holding the registry.
    pub fn lookup(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }

    /// Deletes `room_id` if it has no players and no game running.
    ///
    /// The room checks its own live state and stops in the same step, so a
    /// join that raced the `Idle` notice either lands first and keeps the
    /// room, or lands after and fails with [`RoomError::Unavailable`].
    /// Returns whether the room was deleted.
    pub async fn delete_if_empty(&mut self, room_id: &RoomId) -> bool {
        let Some(handle) = self.rooms.get(room_id) else {
            return false;
        };
        match handle.shutdown_if_empty().await {
            Ok(false) => {
                tracing::debug!(%room_id, "room busy again, kept");
                return false;
            }
            Ok(true) => {}
            Err(_) => {
                tracing::warn!(%room_id, "room actor gone, removing");
            }
        }
        self.rooms.remove(room_id);
        tracing::info!(%room_id, "room deleted");
        true
    }

    pub async fn info(&self, room_id: &RoomId) -> Result<RoomInfo, RoomError> {
        self.lookup(room_id)?.info().await
    }

    /// Info for every room that answers. Rooms shutting down are skipped.
    pub async fn list(&self) -> Vec<RoomInfo> {
        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }
}
