//! Keyed one-shot timers and round countdowns for Sketchforge rooms.
//!
//! A room needs a handful of independent deadlines: the next round tick,
//! each disconnected player's grace period, the enrollment window of a
//! public game. [`TimerSet`] holds them all under caller-chosen keys so a
//! room actor can wait on every deadline from a single `select!` branch.
//!
//! # Staleness
//!
//! Arming a key that is already armed replaces the old deadline, and every
//! arm gets a fresh [`Generation`]. The payload travels with the deadline,
//! so callers stamp it with whatever they need to recognize a timer that
//! outlived the state it was armed for (a round number, a connection id).
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fired = timers.next_fired() => {
//!             room.on_timer(fired.key, fired.payload);
//!         }
//!     }
//! }
//! ```
//!
//! All instants are [`tokio::time::Instant`], so tests drive the clock
//! with `tokio::time::pause()` and `advance()`.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Identifies one arming of a timer. Strictly increasing per [`TimerSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Timer set
// ---------------------------------------------------------------------------

/// A timer that came due, returned by [`TimerSet::next_fired`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<K, P> {
    pub key: K,
    pub payload: P,
    pub generation: Generation,
}

#[derive(Debug)]
struct Armed<P> {
    deadline: Instant,
    generation: Generation,
    payload: P,
}

/// One-shot timers keyed by `K`, at most one armed per key.
#[derive(Debug)]
pub struct TimerSet<K, P> {
    timers: HashMap<K, Armed<P>>,
    next_generation: u64,
}

impl<K, P> Default for TimerSet<K, P> {
    fn default() -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 1,
        }
    }
}

impl<K, P> TimerSet<K, P>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` to fire `after` from now, replacing any deadline it had.
    pub fn arm(&mut self, key: K, after: Duration, payload: P) -> Generation {
        let generation = Generation(self.next_generation);
        self.next_generation += 1;
        let armed = Armed {
            deadline: Instant::now() + after,
            generation,
            payload,
        };
        if self.timers.insert(key.clone(), armed).is_some() {
            trace!(?key, %generation, "timer re-armed");
        }
        generation
    }

    /// Disarms `key`. Returns `true` if it was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.timers.remove(key).is_some()
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }

    /// When `key` will fire, if armed.
    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.timers.get(key).map(|a| a.deadline)
    }

    /// Disarms everything.
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Waits for the earliest armed timer, disarms it, and returns it.
    ///
    /// Pends forever while nothing is armed. Cancel-safe: dropping the
    /// future before it resolves leaves every timer armed, which is what
    /// happens each time another `select!` branch wins.
    ///
    /// Timers sharing a deadline fire in the order they were armed.
    pub async fn next_fired(&mut self) -> Fired<K, P> {
        loop {
            let Some((key, deadline)) = self
                .timers
                .iter()
                .min_by_key(|(_, a)| (a.deadline, a.generation))
                .map(|(k, a)| (k.clone(), a.deadline))
            else {
                std::future::pending::<()>().await;
                continue;
            };

            time::sleep_until(deadline).await;

            if let Some(armed) = self.timers.remove(&key) {
                trace!(?key, generation = %armed.generation, "timer fired");
                return Fired {
                    key,
                    payload: armed.payload,
                    generation: armed.generation,
                };
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// Wall-clock view of a round: when it started and how long it lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    started_at: Instant,
    duration: Duration,
}

impl Countdown {
    /// Starts a countdown of `duration` at the current instant.
    pub fn start(duration: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            duration,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed())
    }

    /// Whole seconds left, rounded to nearest.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining().as_secs_f64().round() as u64
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
