//! Room actor: an isolated Tokio task that owns one [`Room`].
//!
//! Commands arrive on a bounded mpsc channel and the room's timers are
//! polled in the same `select!` loop, so joins, guesses, disconnects and
//! timer firings for one room are handled strictly one at a time. Nothing
//! about a room is shared; everything goes through its [`RoomHandle`].

use std::collections::HashMap;
use std::ops::ControlFlow;

use sketchforge_protocol::{
    Channel, PlayerId, Recipient, RoomId, RoomPhase, RoomSnapshot, ServerEvent,
    StrokeKind,
};
use sketchforge_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::{Room, RoomError, RoomNotice};

/// An event on its way from a room to one player's connection.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub channel: Channel,
    pub event: ServerEvent,
}

impl From<ServerEvent> for Outbound {
    fn from(event: ServerEvent) -> Self {
        Self {
            channel: event.channel(),
            event,
        }
    }
}

/// Channel sender for delivering outbound events to a player.
pub type PlayerSender = mpsc::UnboundedSender<Outbound>;

/// Commands sent to a room actor through its channel.
///
/// Variants with a `oneshot::Sender` are requests: the caller waits for
/// the reply. The rest are fire-and-forget.
pub(crate) enum RoomCommand {
    Join {
        player: PlayerId,
        connection: ConnectionId,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Start {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Draw {
        player: PlayerId,
        x: f64,
        y: f64,
        kind: StrokeKind,
    },
    Guess {
        player: PlayerId,
        text: String,
    },
    Disconnect {
        player: PlayerId,
        connection: ConnectionId,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    /// Stops the room if it has no players and no game. The check and the
    /// stop are one step, so a join queued behind it never lands in a
    /// room that is going away.
    ShutdownIfEmpty {
        reply: oneshot::Sender<bool>,
    },
}

/// Room metadata for the registry and lobby listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub phase: RoomPhase,
    pub player_count: usize,
    pub max_players: usize,
    pub game_started: bool,
    pub is_public: bool,
    /// Public room still inside its signup window.
    pub enrolling: bool,
}

/// Handle to a running room actor.
///
/// Cheap to clone: it's an `mpsc::Sender` and the room id.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Joins (or rejoins) `player` and subscribes `sender` to the room.
    ///
    /// On success the player's first event is `joinedRoom`.
    pub async fn join(
        &self,
        player: PlayerId,
        connection: ConnectionId,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            player,
            connection,
            sender,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn start(&self, player: PlayerId) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Start { player, reply }).await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Relays a stroke point (fire-and-forget).
    pub async fn draw(
        &self,
        player: PlayerId,
        x: f64,
        y: f64,
        kind: StrokeKind,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Draw { player, x, y, kind }).await
    }

    /// Submits a guess (fire-and-forget).
    pub async fn guess(
        &self,
        player: PlayerId,
        text: String,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Guess { player, text }).await
    }

    /// Reports that `connection`, which spoke for `player`, has closed.
    pub async fn disconnect(
        &self,
        player: PlayerId,
        connection: ConnectionId,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnect { player, connection })
            .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Info { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Stops the room if nobody is in it and no game is running.
    ///
    /// Returns whether it stopped. Pending timers are dropped with it, and
    /// commands still queued behind this one fail with
    /// [`RoomError::Unavailable`].
    pub async fn shutdown_if_empty(&self) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::ShutdownIfEmpty { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room_id.clone())
    }
}

struct Subscriber {
    connection: ConnectionId,
    sender: PlayerSender,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room: Room,
    subscribers: HashMap<PlayerId, Subscriber>,
    receiver: mpsc::Receiver<RoomCommand>,
    notices: mpsc::UnboundedSender<RoomNotice>,
}

impl RoomActor {
    async fn run(mut self) {
        let room_id = self.room.id().clone();
        tracing::info!(%room_id, public = self.room.is_public(), "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if self.handle(cmd).is_break() {
                        break;
                    }
                }
                (slot, event) = self.room.next_timer() => {
                    self.room.on_timer(slot, event);
                }
            }
            self.flush();
        }

        tracing::info!(%room_id, "room actor stopped");
    }

    /// Applies one command. `Break` stops the actor.
    fn handle(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Join {
                player,
                connection,
                sender,
                reply,
            } => {
                let result = self.room.join(&player);
                if result.is_ok() {
                    self.subscribers
                        .insert(player, Subscriber { connection, sender });
                }
                let _ = reply.send(result);
            }
            RoomCommand::Start { player, reply } => {
                let _ = reply.send(self.room.start(&player));
            }
            RoomCommand::Draw { player, x, y, kind } => {
                self.room.draw(&player, x, y, kind);
            }
            RoomCommand::Guess { player, text } => {
                self.room.guess(&player, &text);
            }
            RoomCommand::Disconnect { player, connection } => {
                let superseded = self
                    .subscribers
                    .get(&player)
                    .is_some_and(|s| s.connection != connection);
                if superseded {
                    tracing::debug!(
                        room_id = %self.room.id(),
                        player_id = %player,
                        conn_id = %connection,
                        "stale disconnect ignored"
                    );
                    return ControlFlow::Continue(());
                }
                self.subscribers.remove(&player);
                self.room.disconnect(&player, connection);
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.room.snapshot());
            }
            RoomCommand::ShutdownIfEmpty { reply } => {
                let empty =
                    self.room.players().is_empty() && !self.room.game_started();
                let _ = reply.send(empty);
                if empty {
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Delivers queued events, drops subscribers who are no longer in the
    /// room, and forwards notices.
    fn flush(&mut self) {
        for (recipient, event) in self.room.take_outbox() {
            self.dispatch(recipient, event);
        }
        self.subscribers.retain(|player, _| self.room.is_member(player));
        for notice in self.room.take_notices() {
            let _ = self.notices.send(notice);
        }
    }

    /// Sends to every matching subscriber. A closed receiver means the
    /// connection is going away; its disconnect follows separately.
    fn dispatch(&self, recipient: Recipient, event: ServerEvent) {
        let outbound = Outbound::from(event);
        match recipient {
            Recipient::All => {
                for sub in self.subscribers.values() {
                    let _ = sub.sender.send(outbound.clone());
                }
            }
            Recipient::Player(player) => {
                if let Some(sub) = self.subscribers.get(&player) {
                    let _ = sub.sender.send(outbound);
                }
            }
            Recipient::AllExcept(excluded) => {
                for (player, sub) in &self.subscribers {
                    if *player != excluded {
                        let _ = sub.sender.send(outbound.clone());
                    }
                }
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room.id().clone(),
            phase: self.room.phase(),
            player_count: self.room.players().len(),
            max_players: self.room.config().max_players,
            game_started: self.room.game_started(),
            is_public: self.room.is_public(),
            enrolling: self.room.is_enrolling(),
        }
    }
}

/// Spawns a room actor task and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub(crate) fn spawn_room(
    room: Room,
    channel_size: usize,
    notices: mpsc::UnboundedSender<RoomNotice>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let room_id = room.id().clone();

    let actor = RoomActor {
        room,
        subscribers: HashMap::new(),
        receiver: rx,
        notices,
    };
    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}
