//! Public Game Scheduler: open-enrollment rooms, on demand and on a daily
//! timetable.
//!
//! At most one public room is enrolling at a time. `joinPublicGame` lands
//! in it, or opens one when there is none. The room itself runs the
//! enrollment window and decides between starting and cancelling; the
//! scheduler only tracks which room is currently open.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sketchforge_protocol::RoomId;

use crate::{RoomError, RoomRegistry};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// A UTC wall-clock time, `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    fn secs_from_midnight(self) -> u64 {
        u64::from(self.hour) * 3600 + u64::from(self.minute) * 60
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Error parsing a [`TimeOfDay`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day {0:?}, expected HH:MM (UTC)")]
pub struct ParseTimeOfDayError(String);

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeOfDayError(s.to_owned());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        let hour = h.parse().map_err(|_| err())?;
        let minute = m.parse().map_err(|_| err())?;
        Self::new(hour, minute).ok_or_else(err)
    }
}

/// Tracks the enrolling public room and the daily timetable.
#[derive(Debug, Default)]
pub struct PublicGameScheduler {
    timetable: Vec<TimeOfDay>,
    open: Option<RoomId>,
}

impl PublicGameScheduler {
    pub fn new(mut timetable: Vec<TimeOfDay>) -> Self {
        timetable.sort_unstable();
        timetable.dedup();
        Self {
            timetable,
            open: None,
        }
    }

    pub fn timetable(&self) -> &[TimeOfDay] {
        &self.timetable
    }

    /// The room `joinPublicGame` should land in: the one currently
    /// enrolling, or a freshly opened one.
    pub async fn join_target(
        &mut self,
        registry: &mut RoomRegistry,
    ) -> Result<RoomId, RoomError> {
        if let Some(room_id) = self.enrolling_room(registry).await {
            return Ok(room_id);
        }
        self.open_room(registry)
    }

    /// Opens a public room unless one is already enrolling. Called at each
    /// timetable slot.
    pub async fn open_scheduled(
        &mut self,
        registry: &mut RoomRegistry,
    ) -> Result<RoomId, RoomError> {
        if let Some(room_id) = self.enrolling_room(registry).await {
            tracing::info!(
                %room_id,
                "timetable slot reached, public room already open"
            );
            return Ok(room_id);
        }
        self.open_room(registry)
    }

    async fn enrolling_room(
        &mut self,
        registry: &RoomRegistry,
    ) -> Option<RoomId> {
        let room_id = self.open.clone()?;
        match registry.info(&room_id).await {
            Ok(info) if info.enrolling => Some(room_id),
            _ => {
                self.open = None;
                None
            }
        }
    }

    fn open_room(
        &mut self,
        registry: &mut RoomRegistry,
    ) -> Result<RoomId, RoomError> {
        let room_id = registry.create_public_room()?;
        self.open = Some(room_id.clone());
        Ok(room_id)
    }

    /// Time from `now` until the next timetable slot. `None` when the
    /// timetable is empty.
    pub fn until_next_slot(&self, now: SystemTime) -> Option<Duration> {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        let day_ms = SECS_PER_DAY * 1000;
        let now_ms = (since_epoch.as_millis() % u128::from(day_ms)) as u64;

        self.timetable
            .iter()
            .map(|slot| {
                let slot_ms = slot.secs_from_midnight() * 1000;
                if slot_ms > now_ms {
                    slot_ms - now_ms
                } else {
                    slot_ms + day_ms - now_ms
                }
            })
            .min()
            .map(Duration::from_millis)
    }
}
