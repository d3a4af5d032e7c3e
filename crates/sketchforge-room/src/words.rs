//! The Word Bank: candidate words with a bounded recent-use history.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::RoomError;

const BUILTIN_WORDS: &[&str] = &[
    "apple", "banana", "carrot", "dragon", "elephant", "flower", "guitar",
    "house", "island", "jacket", "kangaroo", "lemon", "mountain", "notebook",
    "ocean", "piano", "queen", "river", "snake", "tiger", "umbrella",
    "volcano", "whale", "xylophone", "yacht", "zebra", "bridge", "castle",
    "desert", "forest", "garden", "harbor", "igloo", "jungle", "lake",
    "meadow", "nest", "oasis", "pond", "reef", "stream", "temple", "valley",
    "windmill", "bear", "cat", "deer", "eagle", "fox", "goat", "horse",
    "lion", "monkey", "owl", "penguin", "rabbit", "shark", "turtle", "wolf",
    "airplane", "bicycle", "boat", "car", "drone", "helicopter", "jet",
    "motorcycle", "rocket", "ship", "train", "truck", "balloon", "compass",
    "flag", "globe", "key", "lamp", "map", "phone", "radio", "scissors",
    "sword", "telescope", "watch", "book", "chair", "clock", "door", "table",
    "window", "bed", "couch", "mirror", "shelf", "camera", "painting",
    "statue", "vase", "robot", "computer", "keyboard", "mouse", "monitor",
    "cloud", "sun", "moon", "star", "rain", "snow", "wind", "fire", "earth",
    "water", "tree", "leaf", "grass", "stone", "sand", "beach",
];

/// A shuffled word list plus the words a room used recently.
///
/// The list is shared between clones; the history is not. The registry
/// keeps one bank with an empty history and clones it for each new room.
#[derive(Debug, Clone)]
pub struct WordBank {
    words: Arc<[String]>,
    used: VecDeque<String>,
    history_cap: usize,
}

impl WordBank {
    /// The built-in list.
    pub fn builtin(used_fraction: f64) -> Self {
        let words = BUILTIN_WORDS.iter().map(|w| (*w).to_owned()).collect();
        Self::shuffled(words, used_fraction)
    }

    /// A bank over `words`, normalized (trimmed, lower-cased, deduplicated,
    /// blanks dropped).
    ///
    /// # Errors
    /// [`RoomError::EmptyWordList`] if nothing usable remains.
    pub fn from_words<I, S>(
        words: I,
        used_fraction: f64,
    ) -> Result<Self, RoomError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let list: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .filter(|w| seen.insert(w.clone()))
            .collect();
        if list.is_empty() {
            return Err(RoomError::EmptyWordList);
        }
        Ok(Self::shuffled(list, used_fraction))
    }

    /// Loads a newline-separated list. Lines starting with `#` are comments.
    pub fn from_file(
        path: &Path,
        used_fraction: f64,
    ) -> Result<Self, RoomError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            RoomError::WordFile {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let lines = text.lines().filter(|l| !l.trim_start().starts_with('#'));
        let bank = Self::from_words(lines, used_fraction)?;
        tracing::info!(
            path = %path.display(),
            words = bank.len(),
            "word list loaded"
        );
        Ok(bank)
    }

    fn shuffled(mut words: Vec<String>, used_fraction: f64) -> Self {
        words.shuffle(&mut rand::rng());
        let fraction = used_fraction.clamp(0.0, 1.0);
        let history_cap = (words.len() as f64 * fraction).floor() as usize;
        Self {
            words: words.into(),
            used: VecDeque::with_capacity(history_cap + 1),
            history_cap,
        }
    }

    /// Picks a word not used recently and records it.
    ///
    /// When every word is in the history, the history is cleared first.
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let mut available: Vec<&String> = self
            .words
            .iter()
            .filter(|w| !self.used.contains(w))
            .collect();
        if available.is_empty() {
            tracing::debug!("word history exhausted, resetting");
            self.used.clear();
            available = self.words.iter().collect();
        }
        let word = available[rng.random_range(0..available.len())].clone();

        self.used.push_back(word.clone());
        if self.used.len() > self.history_cap {
            self.used.pop_front();
        }
        word
    }

    /// Forgets the history. Called when a new game starts.
    pub fn reset(&mut self) {
        self.used.clear();
    }

    pub fn recently_used(&self) -> impl Iterator<Item = &str> {
        self.used.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for WordBank {
    fn default() -> Self {
        Self::builtin(0.75)
    }
}
