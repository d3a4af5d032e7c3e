//! Rooms for Sketchforge: the game itself.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! roster, scoreboard, word history, and timers.
//!
//! # Key types
//!
//! - [`Room`] — the round state machine, as plain synchronous state
//! - [`RoomHandle`] — send commands to a running room actor
//! - [`RoomRegistry`] — creates, looks up, and deletes rooms
//! - [`PublicGameScheduler`] — open-enrollment public games
//! - [`WordBank`] — candidate words with recent-use exclusion
//! - [`score_correct_guess`] — the scoring formula
//! - [`GameConfig`] — limits, timings, and policies

mod actor;
mod config;
mod error;
mod manager;
mod public;
mod room;
mod scoring;
mod words;

pub use actor::{Outbound, PlayerSender, RoomHandle, RoomInfo};
pub use config::{DrawerPolicy, GameConfig, ScoringPolicy};
pub use error::RoomError;
pub use manager::RoomRegistry;
pub use public::{ParseTimeOfDayError, PublicGameScheduler, TimeOfDay};
pub use room::{MAX_GUESS_CHARS, Room, RoomNotice, TimerEvent, TimerSlot};
pub use scoring::{GuessAward, Scoreboard, score_correct_guess};
pub use words::WordBank;
