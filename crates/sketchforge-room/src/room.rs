//! The Room: roster, scoreboard, and the round state machine.
//!
//! A [`Room`] is plain synchronous state. Every operation mutates it to
//! completion and queues what should be said to whom in an outbox; the
//! actor in [`actor`](crate::actor) owns the room, feeds it commands and
//! timer firings one at a time, and delivers the outbox afterwards.
//!
//! ```text
//! Idle ──start──▶ RoundActive ──guess / timeout / drawer lost──▶ RoundEnding
//!                     ▲                                          │
//!                     └──────────── next round delay ────────────┤
//!                                                                ▼
//!                                                            GameEnded
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sketchforge_protocol::{
    PlayerId, Recipient, RoomId, RoomPhase, RoomSnapshot, RoundOutcome,
    ScoreEntry, ServerEvent, StrokeKind,
};
use sketchforge_tick::{Countdown, Fired, TimerSet};
use sketchforge_transport::ConnectionId;
use tokio::time::Instant;

use crate::scoring::{Scoreboard, score_correct_guess};
use crate::{DrawerPolicy, GameConfig, RoomError, WordBank};

const NOT_ENOUGH_PLAYERS: &str = "Not enough players";
const ENROLLMENT_FAILED: &str = "Not enough players joined";

/// Longest guess, in characters, that is relayed to the room.
pub const MAX_GUESS_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// What a room timer is for. At most one timer is armed per slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// The room's single round timer: the next countdown tick, or the
    /// pause before the next round.
    Round,
    /// A disconnected player's grace window.
    Grace(PlayerId),
    /// A public room's signup window.
    Enrollment,
    /// A new private room waiting for its first player.
    Unclaimed,
}

/// What a timer does when it fires, stamped with the state it was armed
/// for so a stale firing can be recognized and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { round: u64 },
    NextRound { round: u64 },
    GraceExpired { connection: ConnectionId },
    EnrollmentClosed,
    UnclaimedExpired,
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// Things a room reports to the server rather than to its players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomNotice {
    /// The room is empty and not playing; the registry may delete it.
    Idle(RoomId),

    /// A game ended. The room stays around for result queries.
    GameFinished {
        room_id: RoomId,
        winner: Option<PlayerId>,
        scores: Vec<ScoreEntry>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Disconnected {
    since: Instant,
    connection: ConnectionId,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One game session.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    config: Arc<GameConfig>,
    admin: Option<PlayerId>,
    /// Join order. Drives drawer rotation and admin succession.
    players: Vec<PlayerId>,
    scores: Scoreboard,
    round: u32,
    /// Bumped at every round start; round timers carry it.
    round_generation: u64,
    drawer: Option<PlayerId>,
    /// Roster position the next rotation starts from when the previous
    /// drawer is gone.
    rotation_hint: Option<usize>,
    word: String,
    words: WordBank,
    game_started: bool,
    phase: RoomPhase,
    countdown: Option<Countdown>,
    disconnected: HashMap<PlayerId, Disconnected>,
    timers: TimerSet<TimerSlot, TimerEvent>,
    is_public: bool,
    enrolling: bool,
    rng: StdRng,
    outbox: Vec<(Recipient, ServerEvent)>,
    notices: Vec<RoomNotice>,
}

impl Room {
    /// A private room. `admin` created it but is not yet a player.
    ///
    /// If nobody joins within the enrollment window the room reports
    /// itself idle.
    pub fn new(
        id: RoomId,
        admin: PlayerId,
        config: Arc<GameConfig>,
        words: WordBank,
    ) -> Self {
        let window = config.enrollment_window;
        let mut room = Self::build(id, Some(admin), config, words, false);
        room.timers.arm(
            TimerSlot::Unclaimed,
            window,
            TimerEvent::UnclaimedExpired,
        );
        room
    }

    /// A public room with an open signup window. Its first player becomes
    /// admin.
    pub fn new_public(
        id: RoomId,
        config: Arc<GameConfig>,
        words: WordBank,
    ) -> Self {
        let window = config.enrollment_window;
        let mut room = Self::build(id, None, config, words, true);
        room.enrolling = true;
        room.timers.arm(
            TimerSlot::Enrollment,
            window,
            TimerEvent::EnrollmentClosed,
        );
        room
    }

    fn build(
        id: RoomId,
        admin: Option<PlayerId>,
        config: Arc<GameConfig>,
        words: WordBank,
        is_public: bool,
    ) -> Self {
        Self {
            id,
            config,
            admin,
            players: Vec::new(),
            scores: Scoreboard::new(),
            round: 0,
            round_generation: 0,
            drawer: None,
            rotation_hint: None,
            word: String::new(),
            words,
            game_started: false,
            phase: RoomPhase::Idle,
            countdown: None,
            disconnected: HashMap::new(),
            timers: TimerSet::new(),
            is_public,
            enrolling: false,
            rng: StdRng::from_rng(&mut rand::rng()),
            outbox: Vec::new(),
            notices: Vec::new(),
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn admin(&self) -> Option<&PlayerId> {
        self.admin.as_ref()
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn is_member(&self, player: &PlayerId) -> bool {
        self.players.contains(player)
    }

    pub fn is_disconnected(&self, player: &PlayerId) -> bool {
        self.disconnected.contains_key(player)
    }

    /// When `player` dropped, if they are inside their grace window.
    pub fn disconnected_since(&self, player: &PlayerId) -> Option<Instant> {
        self.disconnected.get(player).map(|d| d.since)
    }

    pub fn scores(&self) -> &Scoreboard {
        &self.scores
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn current_drawer(&self) -> Option<&PlayerId> {
        self.drawer.as_ref()
    }

    /// The secret word. Empty outside an active round.
    pub fn current_word(&self) -> &str {
        &self.word
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// Whether a public room is still taking signups.
    pub fn is_enrolling(&self) -> bool {
        self.enrolling
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Seconds left in the running round.
    pub fn time_left(&self) -> Option<u64> {
        match (self.phase, &self.countdown) {
            (RoomPhase::RoundActive, Some(c)) => Some(c.remaining_secs()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            admin: self.admin.clone(),
            players: self.players.clone(),
            scores: self.scores.entries(),
            round: self.round,
            max_rounds: self.config.max_rounds,
            game_started: self.game_started,
            phase: self.phase,
            current_drawer: self.drawer.clone(),
            is_public: self.is_public,
            time_left: self.time_left(),
        }
    }

    /// Drains the events queued since the last call.
    pub fn take_outbox(&mut self) -> Vec<(Recipient, ServerEvent)> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_notices(&mut self) -> Vec<RoomNotice> {
        std::mem::take(&mut self.notices)
    }

    // -- Join / start -------------------------------------------------------

    /// Adds `player`, or restores them if they are inside their grace
    /// window.
    ///
    /// Joining a room one is already in re-sends the room state and is
    /// otherwise a no-op.
    ///
    /// # Errors
    /// - [`RoomError::GameInProgress`] if a game is running and the player
    ///   is not already in it.
    /// - [`RoomError::RoomFull`] if the roster is at capacity.
    pub fn join(&mut self, player: &PlayerId) -> Result<(), RoomError> {
        let member = self.is_member(player);
        let rejoining = self.disconnected.contains_key(player);

        if self.game_started && !member && !rejoining {
            return Err(RoomError::GameInProgress(self.id.clone()));
        }
        if !member && !rejoining && self.players.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(self.id.clone()));
        }

        if rejoining {
            self.disconnected.remove(player);
            self.timers.cancel(&TimerSlot::Grace(player.clone()));
            tracing::info!(room_id = %self.id, player_id = %player, "player rejoined");
        } else if member {
            tracing::debug!(
                room_id = %self.id,
                player_id = %player,
                "player re-associated"
            );
        } else {
            self.players.push(player.clone());
            tracing::info!(
                room_id = %self.id,
                player_id = %player,
                players = self.players.len(),
                "player joined"
            );
        }
        self.scores.insert(player);
        self.timers.cancel(&TimerSlot::Unclaimed);
        if self.admin.is_none() {
            self.admin = Some(player.clone());
        }

        self.send(
            Recipient::Player(player.clone()),
            ServerEvent::JoinedRoom {
                room_id: self.id.clone(),
                players: self.players.clone(),
                scores: self.scores.entries(),
                admin: self.admin.clone(),
            },
        );
        self.send(Recipient::AllExcept(player.clone()), self.roster());

        if self.phase == RoomPhase::RoundActive {
            if let Some(drawer) = self.drawer.clone() {
                let event = self.start_drawing_for(player, &drawer);
                self.send(Recipient::Player(player.clone()), event);
            }
        }
        Ok(())
    }

    /// Starts a game on behalf of `requester`.
    ///
    /// Starting a game that is already running is a no-op.
    ///
    /// # Errors
    /// - [`RoomError::NotAdmin`] unless `requester` is the admin.
    /// - [`RoomError::NotEnoughPlayers`] below `min_players`.
    pub fn start(&mut self, requester: &PlayerId) -> Result<(), RoomError> {
        if self.admin.as_ref() != Some(requester) {
            return Err(RoomError::NotAdmin(requester.clone()));
        }
        if self.game_started {
            tracing::debug!(room_id = %self.id, "start ignored, game already running");
            return Ok(());
        }
        if self.players.len() < self.config.min_players {
            return Err(RoomError::NotEnoughPlayers {
                min: self.config.min_players,
            });
        }
        self.begin_game();
        Ok(())
    }

    fn begin_game(&mut self) {
        self.timers.cancel(&TimerSlot::Enrollment);
        self.enrolling = false;
        self.game_started = true;
        self.round = 0;
        self.drawer = None;
        self.rotation_hint = None;
        self.words.reset();
        self.scores.reset();
        tracing::info!(
            room_id = %self.id,
            players = self.players.len(),
            "game started"
        );
        self.send(Recipient::All, ServerEvent::GameStarted);
        self.start_round();
    }

    // -- Rounds -------------------------------------------------------------

    fn start_round(&mut self) {
        self.timers.cancel(&TimerSlot::Round);
        if !self.game_started {
            return;
        }
        if self.players.len() < self.config.min_players {
            self.end_game(Some(NOT_ENOUGH_PLAYERS));
            return;
        }

        self.round += 1;
        self.round_generation += 1;
        let drawer = self.next_drawer();
        self.word = self.words.pick(&mut self.rng);
        self.phase = RoomPhase::RoundActive;
        self.countdown = Some(Countdown::start(self.config.round_duration));
        tracing::info!(
            room_id = %self.id,
            round = self.round,
            drawer = %drawer,
            "round started"
        );

        for player in self.players.clone() {
            let event = self.start_drawing_for(&player, &drawer);
            self.send(Recipient::Player(player), event);
        }
        self.drawer = Some(drawer);

        self.timers.arm(
            TimerSlot::Round,
            self.config.tick_interval,
            TimerEvent::Tick {
                round: self.round_generation,
            },
        );
    }

    /// Caller guarantees `players` is non-empty.
    fn next_drawer(&mut self) -> PlayerId {
        let count = self.players.len();
        let index = match self.config.drawer_policy {
            DrawerPolicy::Rotate => {
                let previous = self
                    .drawer
                    .as_ref()
                    .and_then(|d| self.players.iter().position(|p| p == d));
                match (previous, self.rotation_hint) {
                    (Some(i), _) => (i + 1) % count,
                    (None, Some(hint)) => hint % count,
                    (None, None) => 0,
                }
            }
            DrawerPolicy::Random => self.rng.random_range(0..count),
        };
        self.rotation_hint = None;
        self.players[index].clone()
    }

    fn start_drawing_for(&self, player: &PlayerId, drawer: &PlayerId) -> ServerEvent {
        let word = if player == drawer {
            self.word.clone()
        } else {
            "_".repeat(self.word.chars().count())
        };
        ServerEvent::StartDrawing {
            drawer: drawer.clone(),
            word,
            round: self.round,
            max_rounds: self.config.max_rounds,
            time_left: self
                .countdown
                .map_or(0, |c| c.remaining_secs()),
        }
    }

    fn on_tick(&mut self, round: u64) {
        if !self.round_is_current(round, RoomPhase::RoundActive) {
            tracing::trace!(room_id = %self.id, round, "stale tick dropped");
            return;
        }
        let time_left = self.countdown.map_or(0, |c| c.remaining_secs());
        self.send(Recipient::All, ServerEvent::TimeUpdate { time_left });

        if time_left == 0 {
            self.end_round(RoundOutcome::Timeout);
        } else {
            self.timers.arm(
                TimerSlot::Round,
                self.config.tick_interval,
                TimerEvent::Tick { round },
            );
        }
    }

    fn on_next_round(&mut self, round: u64) {
        if !self.round_is_current(round, RoomPhase::RoundEnding) {
            tracing::trace!(room_id = %self.id, round, "stale round delay dropped");
            return;
        }
        self.start_round();
    }

    fn round_is_current(&self, round: u64, phase: RoomPhase) -> bool {
        self.game_started && self.phase == phase && self.round_generation == round
    }

    fn end_round(&mut self, outcome: RoundOutcome) {
        self.timers.cancel(&TimerSlot::Round);
        self.phase = RoomPhase::RoundEnding;
        self.countdown = None;

        if outcome == RoundOutcome::Timeout && self.config.timeout_penalty > 0 {
            if let Some(drawer) = &self.drawer {
                self.scores.deduct(drawer, self.config.timeout_penalty);
            }
        }

        tracing::info!(
            room_id = %self.id,
            round = self.round,
            %outcome,
            "round ended"
        );
        let word = std::mem::take(&mut self.word);
        self.send(
            Recipient::All,
            ServerEvent::RoundEnd {
                outcome,
                word,
                scores: self.scores.entries(),
            },
        );

        if self.round >= self.config.max_rounds {
            self.end_game(None);
        } else if self.players.len() < self.config.min_players {
            self.end_game(Some(NOT_ENOUGH_PLAYERS));
        } else {
            self.timers.arm(
                TimerSlot::Round,
                self.config.next_round_delay,
                TimerEvent::NextRound {
                    round: self.round_generation,
                },
            );
        }
    }

    fn end_game(&mut self, reason: Option<&str>) {
        self.timers.cancel(&TimerSlot::Round);
        self.game_started = false;
        self.phase = RoomPhase::GameEnded;
        self.drawer = None;
        self.word.clear();
        self.countdown = None;

        let winner = self.scores.leader().cloned();
        let scores = self.scores.entries();
        tracing::info!(
            room_id = %self.id,
            winner = ?winner.as_ref().map(PlayerId::as_str),
            reason = reason.unwrap_or("max rounds"),
            "game ended"
        );
        self.send(
            Recipient::All,
            ServerEvent::GameEnd {
                scores: scores.clone(),
                winner: winner.clone(),
                reason: reason.map(str::to_owned),
            },
        );
        self.notices.push(RoomNotice::GameFinished {
            room_id: self.id.clone(),
            winner,
            scores,
        });
    }

    // -- Player actions -----------------------------------------------------

    /// Evaluates a guess. Guesses outside a running round, from the
    /// drawer, from non-members, or longer than [`MAX_GUESS_CHARS`] are
    /// dropped.
    pub fn guess(&mut self, player: &PlayerId, text: &str) {
        if !self.game_started || self.phase != RoomPhase::RoundActive {
            tracing::debug!(
                room_id = %self.id,
                player_id = %player,
                "guess outside round"
            );
            return;
        }
        if !self.is_member(player) {
            tracing::warn!(
                room_id = %self.id,
                player_id = %player,
                "guess from non-member"
            );
            return;
        }
        let Some(drawer) = self.drawer.clone() else {
            return;
        };
        if &drawer == player {
            tracing::debug!(
                room_id = %self.id,
                player_id = %player,
                "drawer guess ignored"
            );
            return;
        }
        let guess = text.trim();
        if guess.is_empty() {
            return;
        }
        if guess.chars().count() > MAX_GUESS_CHARS {
            tracing::warn!(
                room_id = %self.id,
                player_id = %player,
                len = guess.len(),
                "oversized guess dropped"
            );
            return;
        }

        self.send(
            Recipient::All,
            ServerEvent::GuessUpdate {
                formatted_guess: format!("{}: {guess}", player.short()),
            },
        );

        if guess.to_lowercase() == self.word.to_lowercase() {
            let elapsed = self.countdown.map(|c| c.elapsed()).unwrap_or_default();
            let award = score_correct_guess(
                &self.config.scoring,
                elapsed,
                self.config.round_duration,
            );
            self.scores.add(player, award.guesser);
            self.scores.add(&drawer, award.drawer);
            tracing::info!(
                room_id = %self.id,
                player_id = %player,
                guesser = award.guesser,
                drawer = award.drawer,
                "correct guess"
            );
            self.end_round(RoundOutcome::Guessed {
                winner: player.clone(),
            });
        }
    }

    /// Relays a stroke point from the drawer to everyone else.
    pub fn draw(&mut self, player: &PlayerId, x: f64, y: f64, kind: StrokeKind) {
        if self.phase != RoomPhase::RoundActive || self.drawer.as_ref() != Some(player) {
            tracing::trace!(room_id = %self.id, player_id = %player, "stroke dropped");
            return;
        }
        self.send(
            Recipient::AllExcept(player.clone()),
            ServerEvent::Draw { x, y, kind },
        );
    }

    // -- Disconnects --------------------------------------------------------

    /// Starts `player`'s grace window. `connection` is the connection
    /// that closed; only its own expiry may remove the player.
    pub fn disconnect(&mut self, player: &PlayerId, connection: ConnectionId) {
        if !self.is_member(player) {
            tracing::debug!(
                room_id = %self.id,
                player_id = %player,
                "disconnect from non-member"
            );
            return;
        }
        self.disconnected.insert(
            player.clone(),
            Disconnected {
                since: Instant::now(),
                connection,
            },
        );
        self.timers.arm(
            TimerSlot::Grace(player.clone()),
            self.config.reconnect_grace,
            TimerEvent::GraceExpired { connection },
        );
        tracing::info!(
            room_id = %self.id,
            player_id = %player,
            conn_id = %connection,
            grace_secs = self.config.reconnect_grace.as_secs(),
            "player disconnected"
        );
    }

    fn on_grace_expired(&mut self, player: &PlayerId, connection: ConnectionId) {
        match self.disconnected.get(player) {
            Some(d) if d.connection == connection => {}
            _ => {
                tracing::trace!(
                    room_id = %self.id,
                    player_id = %player,
                    "stale grace expiry"
                );
                return;
            }
        }
        self.disconnected.remove(player);
        let Some(index) = self.players.iter().position(|p| p == player) else {
            return;
        };
        self.players.remove(index);
        self.scores.remove(player);
        tracing::info!(
            room_id = %self.id,
            player_id = %player,
            players = self.players.len(),
            "player removed after grace window"
        );
        self.send(Recipient::All, self.roster());

        if self.admin.as_ref() == Some(player) {
            self.admin = self.players.first().cloned();
            if let Some(admin) = self.admin.clone() {
                tracing::info!(room_id = %self.id, admin = %admin, "admin reassigned");
                self.notice(format!("Admin left. {} is new admin.", admin.short()));
                self.send(Recipient::All, self.roster());
            }
        }

        let was_drawer = self.drawer.as_ref() == Some(player);
        if was_drawer {
            self.drawer = None;
            self.rotation_hint = Some(index);
        }

        if self.game_started {
            if was_drawer && self.phase == RoomPhase::RoundActive {
                self.notice(format!("Drawer ({}) disconnected.", player.short()));
                self.end_round(RoundOutcome::DrawerDisconnected);
            } else if self.players.len() < self.config.min_players {
                self.end_game(Some(NOT_ENOUGH_PLAYERS));
            }
        } else if self.players.is_empty() {
            self.notices.push(RoomNotice::Idle(self.id.clone()));
        }
    }

    fn on_enrollment_closed(&mut self) {
        if !self.enrolling {
            return;
        }
        self.enrolling = false;
        if self.game_started {
            return;
        }
        if self.players.len() >= self.config.min_players {
            tracing::info!(room_id = %self.id, "enrollment closed, starting public game");
            self.begin_game();
            return;
        }

        tracing::info!(
            room_id = %self.id,
            players = self.players.len(),
            "enrollment closed, public game cancelled"
        );
        self.send(
            Recipient::All,
            ServerEvent::GameCancelled {
                reason: ENROLLMENT_FAILED.into(),
            },
        );
        self.players.clear();
        self.scores.clear();
        self.disconnected.clear();
        self.timers.clear();
        self.admin = None;
        self.notices.push(RoomNotice::Idle(self.id.clone()));
    }

    fn on_unclaimed_expired(&mut self) {
        if !self.players.is_empty() || self.game_started {
            return;
        }
        tracing::info!(room_id = %self.id, "room never joined, releasing");
        self.notices.push(RoomNotice::Idle(self.id.clone()));
    }

    // -- Timers -------------------------------------------------------------

    /// Waits for the room's next timer. Cancel-safe.
    pub async fn next_timer(&mut self) -> (TimerSlot, TimerEvent) {
        let Fired { key, payload, .. } = self.timers.next_fired().await;
        (key, payload)
    }

    /// Applies a fired timer. Stale firings change nothing.
    pub fn on_timer(&mut self, slot: TimerSlot, event: TimerEvent) {
        match (slot, event) {
            (TimerSlot::Round, TimerEvent::Tick { round }) => self.on_tick(round),
            (TimerSlot::Round, TimerEvent::NextRound { round }) => {
                self.on_next_round(round)
            }
            (TimerSlot::Grace(player), TimerEvent::GraceExpired { connection }) => {
                self.on_grace_expired(&player, connection)
            }
            (TimerSlot::Enrollment, TimerEvent::EnrollmentClosed) => {
                self.on_enrollment_closed()
            }
            (TimerSlot::Unclaimed, TimerEvent::UnclaimedExpired) => {
                self.on_unclaimed_expired()
            }
            (slot, event) => {
                tracing::warn!(room_id = %self.id, ?slot, ?event, "mismatched timer");
            }
        }
    }

    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    // -- Helpers ------------------------------------------------------------

    fn roster(&self) -> ServerEvent {
        ServerEvent::PlayersUpdate {
            players: self.players.clone(),
            scores: self.scores.entries(),
            admin: self.admin.clone(),
        }
    }

    fn notice(&mut self, text: String) {
        self.send(Recipient::All, ServerEvent::Notice { text });
    }

    fn send(&mut self, to: Recipient, event: ServerEvent) {
        self.outbox.push((to, event));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time;

    use super::*;

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn words() -> WordBank {
        WordBank::from_words(["apple"], 0.75).unwrap()
    }

    fn room_with_config(config: GameConfig, players: &[&str]) -> Room {
        let mut room =
            Room::new(RoomId::from("r1"), pid(players[0]), Arc::new(config), words());
        for p in players {
            room.join(&pid(p)).unwrap();
        }
        room.take_outbox();
        room
    }

    fn room_with(players: &[&str]) -> Room {
        room_with_config(GameConfig::default(), players)
    }

    fn started(players: &[&str]) -> Room {
        let mut room = room_with(players);
        room.start(&pid(players[0])).unwrap();
        room.take_outbox();
        room
    }

    fn events(room: &mut Room) -> Vec<ServerEvent> {
        room.take_outbox().into_iter().map(|(_, e)| e).collect()
    }

    async fn fire(room: &mut Room) {
        let (slot, event) = room.next_timer().await;
        room.on_timer(slot, event);
    }

    // -- join ---------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_join_sends_joined_room_to_joiner_and_roster_to_others() {
        let mut room = room_with(&["0xa"]);

        room.join(&pid("0xb")).unwrap();

        let out = room.take_outbox();
        assert!(matches!(
            &out[0],
            (Recipient::Player(p), ServerEvent::JoinedRoom { players, .. })
                if p == &pid("0xb") && players.len() == 2
        ));
        assert!(matches!(
            &out[1],
            (Recipient::AllExcept(p), ServerEvent::PlayersUpdate { .. }) if p == &pid("0xb")
        ));
        assert_eq!(room.scores().get(&pid("0xb")), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_full_room_rejected() {
        let config = GameConfig {
            max_players: 2,
            ..GameConfig::default()
        };
        let mut room = room_with_config(config, &["0xa", "0xb"]);

        let result = room.join(&pid("0xc"));

        assert!(matches!(result, Err(RoomError::RoomFull(_))));
        assert_eq!(room.players().len(), 2);
        assert!(room.take_outbox().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_during_game_rejected() {
        let mut room = started(&["0xa", "0xb"]);

        let result = room.join(&pid("0xc"));

        assert!(matches!(result, Err(RoomError::GameInProgress(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_twice_is_idempotent() {
        let mut room = room_with(&["0xa", "0xb"]);

        room.join(&pid("0xb")).unwrap();

        assert_eq!(room.players(), &[pid("0xa"), pid("0xb")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_public_joiner_becomes_admin() {
        let mut room =
            Room::new_public(RoomId::from("pub"), Arc::new(GameConfig::default()), words());

        room.join(&pid("0xa")).unwrap();
        room.join(&pid("0xb")).unwrap();

        assert_eq!(room.admin(), Some(&pid("0xa")));
        assert!(room.is_enrolling());
    }

    // -- start --------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_start_by_non_admin_rejected() {
        let mut room = room_with(&["0xa", "0xb"]);

        let result = room.start(&pid("0xb"));

        assert!(matches!(result, Err(RoomError::NotAdmin(_))));
        assert!(!room.game_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_one_player_rejected() {
        let mut room = room_with(&["0xa"]);

        let result = room.start(&pid("0xa"));

        assert!(matches!(result, Err(RoomError::NotEnoughPlayers { min: 2 })));
        assert_eq!(room.phase(), RoomPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reveals_word_only_to_drawer() {
        let mut room = room_with(&["0xa", "0xb"]);

        room.start(&pid("0xa")).unwrap();

        let out = room.take_outbox();
        assert!(matches!(out[0], (Recipient::All, ServerEvent::GameStarted)));
        for (to, event) in &out[1..] {
            let ServerEvent::StartDrawing { drawer, word, round, time_left, .. } = event
            else {
                panic!("unexpected {event:?}");
            };
            assert_eq!(drawer, &pid("0xa"));
            assert_eq!(*round, 1);
            assert_eq!(*time_left, 90);
            match to {
                Recipient::Player(p) if p == &pid("0xa") => assert_eq!(word, "apple"),
                Recipient::Player(_) => assert_eq!(word, "_____"),
                other => panic!("unexpected recipient {other:?}"),
            }
        }
        assert_eq!(room.phase(), RoomPhase::RoundActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let mut room = started(&["0xa", "0xb"]);

        assert!(room.start(&pid("0xa")).is_ok());

        assert_eq!(room.round(), 1);
        assert!(room.take_outbox().is_empty());
    }

    // -- guesses ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_correct_guess_scores_and_ends_round() {
        let mut room = started(&["0xa", "0xbob"]);
        time::advance(Duration::from_secs(30)).await;

        room.guess(&pid("0xbob"), "  APPLE ");

        let out = events(&mut room);
        assert_eq!(
            out[0],
            ServerEvent::GuessUpdate {
                formatted_guess: "0xbob...: APPLE".into()
            }
        );
        assert!(matches!(
            &out[1],
            ServerEvent::RoundEnd { outcome: RoundOutcome::Guessed { winner }, word, .. }
                if winner == &pid("0xbob") && word == "apple"
        ));
        assert_eq!(room.scores().get(&pid("0xbob")), Some(667));
        assert_eq!(room.scores().get(&pid("0xa")), Some(334));
        assert_eq!(room.phase(), RoomPhase::RoundEnding);
        assert_eq!(room.current_word(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_guess_is_broadcast_and_round_continues() {
        let mut room = started(&["0xa", "0xb"]);

        room.guess(&pid("0xb"), "banana");

        let out = events(&mut room);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], ServerEvent::GuessUpdate { .. }));
        assert_eq!(room.phase(), RoomPhase::RoundActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_guess_is_not_relayed() {
        let mut room = started(&["0xa", "0xb"]);

        room.guess(&pid("0xb"), &"x".repeat(MAX_GUESS_CHARS + 1));
        assert!(events(&mut room).is_empty());

        room.guess(&pid("0xb"), &"é".repeat(MAX_GUESS_CHARS));
        assert_eq!(events(&mut room).len(), 1);
        assert_eq!(room.phase(), RoomPhase::RoundActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drawer_guess_never_scores() {
        let mut room = started(&["0xa", "0xb"]);

        room.guess(&pid("0xa"), "apple");

        assert!(room.take_outbox().is_empty());
        assert_eq!(room.phase(), RoomPhase::RoundActive);
        assert_eq!(room.scores().get(&pid("0xa")), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guess_before_start_ignored() {
        let mut room = room_with(&["0xa", "0xb"]);

        room.guess(&pid("0xb"), "apple");

        assert!(room.take_outbox().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_relayed_to_everyone_but_drawer() {
        let mut room = started(&["0xa", "0xb"]);

        room.draw(&pid("0xa"), 1.0, 2.0, StrokeKind::Start);
        room.draw(&pid("0xb"), 3.0, 4.0, StrokeKind::Draw);

        let out = room.take_outbox();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, Recipient::AllExcept(pid("0xa")));
    }

    // -- round timer --------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_then_times_out() {
        let mut room = started(&["0xa", "0xb"]);
        let mut time_updates = Vec::new();

        while room.phase() == RoomPhase::RoundActive {
            fire(&mut room).await;
            for event in events(&mut room) {
                if let ServerEvent::TimeUpdate { time_left } = event {
                    time_updates.push(time_left);
                }
            }
        }

        assert_eq!(time_updates.len(), 90);
        assert_eq!(time_updates.first(), Some(&89));
        assert_eq!(time_updates.last(), Some(&0));
        assert_eq!(room.phase(), RoomPhase::RoundEnding);
        assert_eq!(room.scores().get(&pid("0xb")), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_round_rotates_drawer_after_delay() {
        let mut room = started(&["0xa", "0xb", "0xc"]);
        room.guess(&pid("0xb"), "apple");
        room.take_outbox();

        let before = Instant::now();
        fire(&mut room).await;

        assert!(before.elapsed() >= Duration::from_secs(3));
        assert_eq!(room.round(), 2);
        assert_eq!(room.current_drawer(), Some(&pid("0xb")));
        assert_eq!(room.phase(), RoomPhase::RoundActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_is_ignored() {
        let mut room = started(&["0xa", "0xb"]);

        room.on_timer(TimerSlot::Round, TimerEvent::Tick { round: 0 });

        assert!(room.take_outbox().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_penalty_floors_at_zero() {
        let config = GameConfig {
            timeout_penalty: 50,
            round_duration: Duration::from_secs(2),
            ..GameConfig::default()
        };
        let mut room = room_with_config(config, &["0xa", "0xb"]);
        room.start(&pid("0xa")).unwrap();

        while room.phase() == RoomPhase::RoundActive {
            fire(&mut room).await;
        }

        assert_eq!(room.scores().get(&pid("0xa")), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_round_ends_game_and_keeps_room() {
        let config = GameConfig {
            max_rounds: 1,
            ..GameConfig::default()
        };
        let mut room = room_with_config(config, &["0xa", "0xb"]);
        room.start(&pid("0xa")).unwrap();
        room.take_outbox();

        room.guess(&pid("0xb"), "apple");

        let out = events(&mut room);
        assert!(matches!(
            out.last(),
            Some(ServerEvent::GameEnd { winner: Some(w), reason: None, .. }) if w == &pid("0xb")
        ));
        assert!(!room.game_started());
        assert_eq!(room.phase(), RoomPhase::GameEnded);
        assert_eq!(room.armed_timers(), 0);
        assert!(matches!(
            room.take_notices().as_slice(),
            [RoomNotice::GameFinished { winner: Some(_), .. }]
        ));
    }

    // -- disconnects --------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_within_grace_keeps_score() {
        let mut room = started(&["0xa", "0xb"]);
        room.guess(&pid("0xb"), "apple");
        room.disconnect(&pid("0xb"), ConnectionId::new(2));
        let dropped_at = Instant::now();
        assert_eq!(room.disconnected_since(&pid("0xb")), Some(dropped_at));

        time::advance(Duration::from_secs(20)).await;
        room.join(&pid("0xb")).unwrap();

        assert!(!room.is_disconnected(&pid("0xb")));
        assert_eq!(room.disconnected_since(&pid("0xb")), None);
        assert_eq!(room.scores().get(&pid("0xb")), Some(989));
        assert_eq!(room.players().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_mid_round_resends_round_state() {
        let mut room = started(&["0xa", "0xb"]);
        room.disconnect(&pid("0xb"), ConnectionId::new(2));
        time::advance(Duration::from_secs(10)).await;

        room.join(&pid("0xb")).unwrap();

        let out = room.take_outbox();
        assert!(out.iter().any(|(to, e)| {
            to == &Recipient::Player(pid("0xb"))
                && matches!(e, ServerEvent::StartDrawing { word, time_left: 80, .. } if word == "_____")
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_expiry_removes_player_and_reassigns_admin() {
        let mut room = room_with(&["0xadmin", "0xb", "0xc"]);
        room.disconnect(&pid("0xadmin"), ConnectionId::new(1));

        fire(&mut room).await;

        assert_eq!(room.players(), &[pid("0xb"), pid("0xc")]);
        assert_eq!(room.admin(), Some(&pid("0xb")));
        assert!(!room.scores().contains(&pid("0xadmin")));
        let out = events(&mut room);
        assert!(out.contains(&ServerEvent::Notice {
            text: "Admin left. 0xb... is new admin.".into()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_expiry_for_superseded_connection_is_ignored() {
        let mut room = room_with(&["0xa", "0xb"]);
        room.disconnect(&pid("0xb"), ConnectionId::new(2));
        room.join(&pid("0xb")).unwrap();
        room.disconnect(&pid("0xb"), ConnectionId::new(3));

        room.on_timer(
            TimerSlot::Grace(pid("0xb")),
            TimerEvent::GraceExpired {
                connection: ConnectionId::new(2),
            },
        );

        assert!(room.is_member(&pid("0xb")));
        assert!(room.is_disconnected(&pid("0xb")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drawer_lost_ends_round_then_game() {
        let mut room = started(&["0xa", "0xb"]);
        room.disconnect(&pid("0xa"), ConnectionId::new(1));

        // Keep the round ticking until the grace window closes.
        while room.is_member(&pid("0xa")) {
            fire(&mut room).await;
        }

        let out = events(&mut room);
        let round_end = out.iter().position(|e| {
            matches!(e, ServerEvent::RoundEnd { outcome: RoundOutcome::DrawerDisconnected, .. })
        });
        let game_end = out.iter().position(|e| {
            matches!(e, ServerEvent::GameEnd { reason: Some(r), .. } if r == "Not enough players")
        });
        assert!(round_end.is_some());
        assert!(game_end > round_end);
        assert_eq!(room.players(), &[pid("0xb")]);
        assert_eq!(room.current_drawer(), None);
        assert!(!room.game_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_player_leaving_idle_room_reports_idle() {
        let mut room = room_with(&["0xa"]);
        room.disconnect(&pid("0xa"), ConnectionId::new(1));

        fire(&mut room).await;

        assert!(room.players().is_empty());
        assert_eq!(room.take_notices(), vec![RoomNotice::Idle(RoomId::from("r1"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unjoined_private_room_reports_idle_after_window() {
        let config = Arc::new(GameConfig::default());
        let mut room =
            Room::new(RoomId::from("r1"), pid("0xa"), Arc::clone(&config), words());
        let created = Instant::now();

        fire(&mut room).await;

        assert!(created.elapsed() >= config.enrollment_window);
        assert_eq!(room.take_notices(), vec![RoomNotice::Idle(RoomId::from("r1"))]);
        assert_eq!(room.armed_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_join_disarms_unclaimed_timer() {
        let mut room = Room::new(
            RoomId::from("r1"),
            pid("0xa"),
            Arc::new(GameConfig::default()),
            words(),
        );
        assert_eq!(room.armed_timers(), 1);

        room.join(&pid("0xa")).unwrap();

        assert_eq!(room.armed_timers(), 0);
        room.on_timer(TimerSlot::Unclaimed, TimerEvent::UnclaimedExpired);
        assert!(room.take_notices().is_empty());
    }

    // -- public enrollment --------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_enrollment_with_enough_players_starts_game() {
        let mut room =
            Room::new_public(RoomId::from("pub"), Arc::new(GameConfig::default()), words());
        room.join(&pid("0xa")).unwrap();
        room.join(&pid("0xb")).unwrap();

        fire(&mut room).await;

        assert!(room.game_started());
        assert!(!room.is_enrolling());
        assert_eq!(room.round(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrollment_without_enough_players_cancels() {
        let mut room =
            Room::new_public(RoomId::from("pub"), Arc::new(GameConfig::default()), words());
        room.join(&pid("0xa")).unwrap();
        room.take_outbox();

        fire(&mut room).await;

        assert_eq!(
            events(&mut room),
            vec![ServerEvent::GameCancelled {
                reason: "Not enough players joined".into()
            }]
        );
        assert!(room.players().is_empty());
        assert_eq!(room.take_notices(), vec![RoomNotice::Idle(RoomId::from("pub"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_never_contains_word() {
        let room = started(&["0xa", "0xb"]);

        let snapshot = room.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();

        assert_eq!(snapshot.time_left, Some(90));
        assert_eq!(snapshot.current_drawer, Some(pid("0xa")));
        assert!(!json.contains("apple"));
    }
}
