//! `SketchServer` builder and server loop.
//!
//! This is the entry point for running a Sketchforge coordinator. It ties
//! together all the layers: transport → protocol → session → room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sketchforge_protocol::{Codec, JsonCodec};
use sketchforge_room::{
    GameConfig, PublicGameScheduler, RoomNotice, RoomRegistry, TimeOfDay,
    WordBank,
};
use sketchforge_session::{Authenticator, ConnectionRegistry};
use sketchforge_transport::{ConnectionId, Transport, WebSocketTransport};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::SketchError;
use crate::escrow::WinnerReporter;
use crate::handler::handle_connection;

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default receive timeout before an idle connection is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared server state passed to each connection handler task.
///
/// Lock order when more than one is needed: `public`, then `rooms`.
/// `connections` and `evictions` are never held together. Never hold a
/// lock across an await on a connection.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) connections: Mutex<ConnectionRegistry>,
    /// Stops a connection's handler once a newer handshake took over its
    /// identity.
    pub(crate) evictions: Mutex<HashMap<ConnectionId, oneshot::Sender<()>>>,
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) public: Mutex<PublicGameScheduler>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Sketchforge server.
///
/// # Example
///
/// ```rust,no_run
/// use sketchforge::prelude::*;
///
/// # async fn run() -> Result<(), SketchError> {
/// let server = SketchServer::builder()
///     .bind("0.0.0.0:3001")
///     .game_config(GameConfig {
///         max_rounds: 5,
///         ..GameConfig::default()
///     })
///     .build(OpaqueIdentity)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct SketchServerBuilder {
    bind_addr: String,
    game_config: GameConfig,
    words: Option<WordBank>,
    timetable: Vec<TimeOfDay>,
    reporter: WinnerReporter,
    idle_timeout: Duration,
}

impl SketchServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            game_config: GameConfig::default(),
            words: None,
            timetable: Vec::new(),
            reporter: WinnerReporter::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the rules every room is created with.
    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Replaces the built-in word list.
    pub fn words(mut self, words: WordBank) -> Self {
        self.words = Some(words);
        self
    }

    /// Daily UTC times at which a public room opens.
    pub fn timetable(mut self, slots: Vec<TimeOfDay>) -> Self {
        self.timetable = slots;
        self
    }

    pub fn winner_reporter(mut self, reporter: WinnerReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// How long a connection may stay silent before it is dropped.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and assembles the server with the given
    /// authenticator.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<SketchServer<A, JsonCodec>, SketchError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let words = self.words.unwrap_or_else(|| {
            WordBank::builtin(self.game_config.used_word_fraction)
        });
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let state = Arc::new(ServerState {
            connections: Mutex::new(ConnectionRegistry::new()),
            evictions: Mutex::new(HashMap::new()),
            rooms: Mutex::new(RoomRegistry::new(
                self.game_config,
                words,
                notice_tx,
            )),
            public: Mutex::new(PublicGameScheduler::new(self.timetable)),
            auth,
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        });

        Ok(SketchServer {
            transport,
            state,
            notices: notice_rx,
            reporter: self.reporter,
        })
    }
}

impl Default for SketchServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Sketchforge coordinator.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SketchServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
    notices: mpsc::UnboundedReceiver<RoomNotice>,
    reporter: WinnerReporter,
}

impl SketchServer<sketchforge_session::OpaqueIdentity, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> SketchServerBuilder {
        SketchServerBuilder::new()
    }
}

impl<A, C> SketchServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server until the process is terminated.
    ///
    /// Spawns the room-notice loop and, when a timetable is configured,
    /// the public-game timetable loop, then accepts connections and
    /// spawns a handler task for each.
    pub async fn run(mut self) -> Result<(), SketchError> {
        tracing::info!("sketchforge coordinator running");

        tokio::spawn(notice_loop(
            Arc::clone(&self.state),
            self.notices,
            self.reporter,
        ));
        if !self.state.public.lock().await.timetable().is_empty() {
            tokio::spawn(timetable_loop(Arc::clone(&self.state)));
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Reacts to what rooms report: deletes idle rooms and forwards winners.
async fn notice_loop<A: Authenticator, C: Codec>(
    state: Arc<ServerState<A, C>>,
    mut notices: mpsc::UnboundedReceiver<RoomNotice>,
    reporter: WinnerReporter,
) {
    while let Some(notice) = notices.recv().await {
        match notice {
            RoomNotice::Idle(room_id) => {
                state.rooms.lock().await.delete_if_empty(&room_id).await;
            }
            RoomNotice::GameFinished {
                room_id,
                winner: Some(winner),
                scores,
            } => {
                reporter.report(room_id, winner, &scores);
            }
            RoomNotice::GameFinished {
                room_id,
                winner: None,
                ..
            } => {
                tracing::info!(%room_id, "game finished without a winner");
            }
        }
    }
}

/// Opens a public room at every timetable slot.
async fn timetable_loop<A: Authenticator, C: Codec>(
    state: Arc<ServerState<A, C>>,
) {
    loop {
        let wait = state.public.lock().await.until_next_slot(SystemTime::now());
        let Some(wait) = wait else {
            return;
        };
        tracing::debug!(wait_secs = wait.as_secs(), "next public game slot");
        tokio::time::sleep(wait).await;

        let mut public = state.public.lock().await;
        let mut rooms = state.rooms.lock().await;
        match public.open_scheduled(&mut rooms).await {
            Ok(room_id) => {
                tracing::info!(%room_id, "scheduled public game open");
            }
            Err(e) => {
                tracing::warn!(error = %e, "scheduled public game failed");
            }
        }
    }
}
