//! Game configuration: player limits, round timing, and scoring policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DrawerPolicy
// ---------------------------------------------------------------------------

/// How the next drawer is chosen at the start of each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DrawerPolicy {
    /// Walk the roster in join order, starting after the previous drawer.
    #[default]
    Rotate,
    /// Pick any current player uniformly at random.
    Random,
}

// ---------------------------------------------------------------------------
// ScoringPolicy
// ---------------------------------------------------------------------------

/// Constants for the correct-guess reward.
///
/// See [`score_correct_guess`](crate::score_correct_guess) for the formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Points for a guess at the very first second, before decay.
    pub k_guess: u32,
    /// Fraction of the guesser's points the drawer receives.
    pub drawer_share: f64,
    /// The guesser never gets less than this for a correct guess.
    pub guesser_floor: u32,
    /// The drawer never gets less than this when someone guesses.
    pub drawer_floor: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            k_guess: 1000,
            drawer_share: 0.5,
            guesser_floor: 10,
            drawer_floor: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room the registry creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Players needed to start, and to keep a game going.
    pub min_players: usize,

    /// Roster cap. Rejoining players are admitted even at the cap.
    pub max_players: usize,

    /// Rounds per game.
    pub max_rounds: u32,

    /// Length of one drawing round.
    pub round_duration: Duration,

    /// Spacing of `timeUpdate` broadcasts during a round.
    pub tick_interval: Duration,

    /// Pause between a round result and the next round.
    pub next_round_delay: Duration,

    /// How long a disconnected player keeps their seat.
    pub reconnect_grace: Duration,

    /// How long a public room accepts signups before it starts or cancels.
    pub enrollment_window: Duration,

    pub drawer_policy: DrawerPolicy,

    /// Points taken from the drawer when a round times out. Scores never
    /// drop below zero.
    pub timeout_penalty: u32,

    pub scoring: ScoringPolicy,

    /// Recently used words are excluded from selection; the history holds
    /// at most this fraction of the word list.
    pub used_word_fraction: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 10,
            max_rounds: 3,
            round_duration: Duration::from_secs(90),
            tick_interval: Duration::from_secs(1),
            next_round_delay: Duration::from_secs(3),
            reconnect_grace: Duration::from_secs(30),
            enrollment_window: Duration::from_secs(60),
            drawer_policy: DrawerPolicy::default(),
            timeout_penalty: 0,
            scoring: ScoringPolicy::default(),
            used_word_fraction: 0.75,
        }
    }
}

impl GameConfig {
    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by the room registry on construction. Rules:
    /// - `min_players` at least 1, `max_players` at least `min_players`.
    /// - `max_rounds` at least 1.
    /// - zero durations replaced with their defaults.
    /// - fractions clamped to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.min_players == 0 {
            tracing::warn!("min_players of 0 raised to 1");
            self.min_players = 1;
        }
        if self.max_players < self.min_players {
            tracing::warn!(
                max = self.max_players,
                min = self.min_players,
                "max_players below min_players, raising"
            );
            self.max_players = self.min_players;
        }
        self.max_rounds = self.max_rounds.max(1);
        if self.round_duration.is_zero() {
            self.round_duration = defaults.round_duration;
        }
        if self.tick_interval.is_zero() {
            self.tick_interval = defaults.tick_interval;
        }
        self.scoring.drawer_share = self.scoring.drawer_share.clamp(0.0, 1.0);
        self.used_word_fraction = self.used_word_fraction.clamp(0.0, 1.0);
        self
    }
}
