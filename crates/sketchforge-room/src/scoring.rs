//! The Scoring Engine and the per-room scoreboard.

use std::time::Duration;

use sketchforge_protocol::{PlayerId, ScoreEntry};

use crate::ScoringPolicy;

/// Points awarded for one correct guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessAward {
    pub guesser: u32,
    pub drawer: u32,
}

/// Computes the award for a correct guess `elapsed` into a round of
/// length `duration`.
///
/// With `t` the elapsed time in whole seconds (rounded, at least 1) and
/// `D` the round length in seconds:
///
/// ```text
/// guesser = max(guesser_floor, round(k_guess * (D - t) / D))
/// drawer  = max(drawer_floor,  round(guesser * drawer_share))
/// ```
///
/// Faster guesses never score less than slower ones.
pub fn score_correct_guess(
    policy: &ScoringPolicy,
    elapsed: Duration,
    duration: Duration,
) -> GuessAward {
    let total = duration.as_secs_f64().round().max(1.0);
    let t = elapsed.as_secs_f64().round().max(1.0).min(total);
    let decayed = (f64::from(policy.k_guess) * (total - t) / total).round();
    let guesser = (decayed as u32).max(policy.guesser_floor);
    let drawer = ((f64::from(guesser) * policy.drawer_share).round() as u32)
        .max(policy.drawer_floor);
    GuessAward { guesser, drawer }
}

/// Scores in join order.
///
/// Order matters: the winner tie-break picks the first of the highest
/// scorers, and clients render the list as sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scoreboard {
    entries: Vec<ScoreEntry>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `player` with zero points. No-op if already present.
    pub fn insert(&mut self, player: &PlayerId) {
        if !self.contains(player) {
            self.entries.push(ScoreEntry {
                player: player.clone(),
                score: 0,
            });
        }
    }

    pub fn remove(&mut self, player: &PlayerId) {
        self.entries.retain(|e| &e.player != player);
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.entries.iter().any(|e| &e.player == player)
    }

    pub fn get(&self, player: &PlayerId) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| &e.player == player)
            .map(|e| e.score)
    }

    pub fn add(&mut self, player: &PlayerId, points: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.player == player) {
            entry.score = entry.score.saturating_add(points);
        }
    }

    /// Takes up to `points` away, stopping at zero.
    pub fn deduct(&mut self, player: &PlayerId, points: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.player == player) {
            entry.score = entry.score.saturating_sub(points);
        }
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.score = 0;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The player with the strictly highest score. Among equal scores the
    /// one listed first wins. `None` only when the board is empty.
    pub fn leader(&self) -> Option<&PlayerId> {
        let mut best: Option<&ScoreEntry> = None;
        for entry in &self.entries {
            if best.is_none_or(|b| entry.score > b.score) {
                best = Some(entry);
            }
        }
        best.map(|e| &e.player)
    }

    pub fn entries(&self) -> Vec<ScoreEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
