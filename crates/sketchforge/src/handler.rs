//! Per-connection handler: handshake, identity binding, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version and identity
//!   2. Send HandshakeAck, bind the identity to this connection and evict
//!      the connection it replaces
//!   3. Spawn the writer task that drains room events onto the socket
//!   4. Loop: receive envelopes → dispatch system or client events
//!   5. On exit: unbind the identity and tell the joined room

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sketchforge_protocol::{
    Channel, ClientEvent, Codec, Envelope, Payload, PlayerId, ProtocolError,
    RoomId, ServerEvent, SystemMessage,
};
use sketchforge_room::{Outbound, PlayerSender, RoomError, RoomHandle};
use sketchforge_session::{Authenticator, authorize};
use sketchforge_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::SketchError;
use crate::server::{PROTOCOL_VERSION, ServerState};

/// How long a fresh connection has to send its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reason sent back when an event claims someone else's identity.
const AUTH_ERROR: &str = "Authentication error.";

/// Disconnect reason for a connection whose identity moved elsewhere.
const SUPERSEDED: &str = "signed in on another connection";

/// Writes envelopes to one socket under a single outbound sequence.
///
/// Both the reader (handshake, heartbeats, errors) and the writer task
/// (room events) send through here; the sequence lock keeps `seq` in
/// send order.
struct Outgoing<A: Authenticator, C: Codec> {
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
    seq: Mutex<u64>,
    started: Instant,
}

impl<A: Authenticator, C: Codec> Outgoing<A, C> {
    async fn send(
        &self,
        channel: Channel,
        payload: Payload,
    ) -> Result<(), SketchError> {
        let mut seq = self.seq.lock().await;
        let envelope = Envelope {
            seq: *seq,
            timestamp: self.started.elapsed().as_millis() as u64,
            channel,
            payload,
        };
        let bytes = self.state.codec.encode(&envelope)?;
        match channel {
            Channel::Unreliable => self.conn.send_unreliable(&bytes).await?,
            _ => self.conn.send(&bytes).await?,
        }
        *seq += 1;
        Ok(())
    }

    async fn system(&self, msg: SystemMessage) -> Result<(), SketchError> {
        self.send(Channel::ReliableOrdered, Payload::System(msg))
            .await
    }

    async fn error(
        &self,
        code: u16,
        message: impl Into<String>,
    ) -> Result<(), SketchError> {
        self.system(SystemMessage::Error {
            code,
            message: message.into(),
        })
        .await
    }
}

/// Everything one authenticated connection knows about itself.
///
/// Dropping it releases the connection: the identity is unbound and the
/// room it was in hears about the disconnect. `Drop` is synchronous, so
/// that work runs on a spawned task; it still happens if the handler
/// panics.
struct ConnectionContext<A: Authenticator, C: Codec> {
    conn_id: ConnectionId,
    player: PlayerId,
    state: Arc<ServerState<A, C>>,
    out: Arc<Outgoing<A, C>>,
    /// Feeds the writer task. Rooms hold clones of it.
    events: PlayerSender,
    writer: JoinHandle<()>,
    /// The room this connection last joined.
    room: Option<RoomHandle>,
}

impl<A: Authenticator, C: Codec> Drop for ConnectionContext<A, C> {
    fn drop(&mut self) {
        self.writer.abort();
        let state = Arc::clone(&self.state);
        let player = self.player.clone();
        let conn_id = self.conn_id;
        let room = self.room.take();
        tokio::spawn(async move {
            state.evictions.lock().await.remove(&conn_id);
            let live =
                state.connections.lock().await.unbind(&player, conn_id);
            tracing::debug!(
                %conn_id,
                player_id = %player,
                live,
                "connection released"
            );
            // A superseded connection still reports; the room ignores it
            // if the newer connection already re-subscribed.
            if let Some(room) = room {
                let _ = room.disconnect(player, conn_id).await;
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), SketchError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");
    let out = Arc::new(Outgoing {
        conn,
        state: Arc::clone(&state),
        seq: Mutex::new(0),
        started: Instant::now(),
    });

    // --- Step 1: Handshake ---
    let player = perform_handshake(&out).await?;
    out.system(SystemMessage::HandshakeAck {
        player_id: player.clone(),
        server_time: unix_millis(),
    })
    .await?;

    let (evict_tx, mut evicted) = oneshot::channel::<()>();
    state.evictions.lock().await.insert(conn_id, evict_tx);
    let (previous, online) = {
        let mut connections = state.connections.lock().await;
        let previous = connections.bind(player.clone(), conn_id);
        (previous, connections.len())
    };
    if let Some(previous) = previous {
        tracing::info!(
            %conn_id,
            player_id = %player,
            superseded = %previous.connection,
            held_secs = previous.bound_at.elapsed().as_secs(),
            "identity moved to a newer connection"
        );
        let evict = state.evictions.lock().await.remove(&previous.connection);
        if let Some(evict) = evict {
            let _ = evict.send(());
        }
    }
    tracing::info!(%conn_id, player_id = %player, online, "player connected");

    // --- Step 2: Writer ---
    let (events, mut events_rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = {
        let out = Arc::clone(&out);
        tokio::spawn(async move {
            while let Some(Outbound { channel, event }) =
                events_rx.recv().await
            {
                let sent = out.send(channel, Payload::Server(event)).await;
                if let Err(e) = sent {
                    tracing::debug!(
                        %conn_id,
                        error = %e,
                        "write failed, writer stopping"
                    );
                    break;
                }
            }
        })
    };

    let mut ctx = ConnectionContext {
        conn_id,
        player,
        state: Arc::clone(&state),
        out: Arc::clone(&out),
        events,
        writer,
        room: None,
    };

    // --- Step 3: Message loop ---
    loop {
        let received = tokio::select! {
            _ = &mut evicted => {
                tracing::info!(
                    %conn_id,
                    player_id = %ctx.player,
                    "connection superseded, closing"
                );
                let _ = out
                    .system(SystemMessage::Disconnect {
                        reason: SUPERSEDED.into(),
                    })
                    .await;
                let _ = out.conn.close().await;
                break;
            }
            received = tokio::time::timeout(
                state.idle_timeout,
                out.conn.recv(),
            ) => received,
        };
        let data = match received {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(
                    %conn_id,
                    player_id = %ctx.player,
                    "connection closed cleanly"
                );
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(
                    %conn_id,
                    player_id = %ctx.player,
                    "connection idle, closing"
                );
                let _ = out
                    .system(SystemMessage::Disconnect {
                        reason: "idle timeout".into(),
                    })
                    .await;
                break;
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(
                    %conn_id,
                    error = %e,
                    "failed to decode envelope"
                );
                out.error(400, format!("malformed frame: {e}")).await?;
                continue;
            }
        };

        match envelope.payload {
            Payload::System(msg) => {
                if ctx.handle_system(msg).await? {
                    break;
                }
            }
            Payload::Client(event) => {
                if !ctx.is_live().await {
                    tracing::debug!(
                        %conn_id,
                        player_id = %ctx.player,
                        "event from superseded connection dropped"
                    );
                    continue;
                }
                ctx.handle_client(event).await;
            }
            Payload::Server(_) => {
                tracing::warn!(
                    %conn_id,
                    "client sent a server event, ignored"
                );
            }
        }
    }

    // ctx drops here → unbind and room disconnect fire.
    Ok(())
}

/// Receives and checks the handshake. The caller sends the ack.
async fn perform_handshake<A, C>(
    out: &Outgoing<A, C>,
) -> Result<PlayerId, SketchError>
where
    A: Authenticator,
    C: Codec,
{
    let data =
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, out.conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(ProtocolError::InvalidMessage(
                    "connection closed before handshake".into(),
                )
                .into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ProtocolError::InvalidMessage(
                    "handshake timed out".into(),
                )
                .into());
            }
        };

    let envelope: Envelope = match out.state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            out.error(400, "malformed handshake").await?;
            return Err(e.into());
        }
    };

    let (version, identity) = match envelope.payload {
        Payload::System(SystemMessage::Handshake { version, identity }) => {
            (version, identity)
        }
        _ => {
            out.error(400, "expected Handshake").await?;
            return Err(ProtocolError::InvalidMessage(
                "first message must be Handshake".into(),
            )
            .into());
        }
    };

    if version != PROTOCOL_VERSION {
        out.error(
            400,
            format!(
                "version mismatch: expected {PROTOCOL_VERSION}, got {version}"
            ),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage(
            "protocol version mismatch".into(),
        )
        .into());
    }

    match out.state.auth.authenticate(&identity).await {
        Ok(player) => Ok(player),
        Err(e) => {
            tracing::warn!(
                conn_id = %out.conn.id(),
                error = %e,
                "handshake identity rejected"
            );
            out.error(401, "unauthorized").await?;
            Err(e.into())
        }
    }
}

impl<A: Authenticator, C: Codec> ConnectionContext<A, C> {
    /// Whether this connection still speaks for its player.
    async fn is_live(&self) -> bool {
        self.state
            .connections
            .lock()
            .await
            .is_live(&self.player, self.conn_id)
    }

    /// Handles a system message. Returns `true` if the connection should
    /// close.
    async fn handle_system(
        &mut self,
        msg: SystemMessage,
    ) -> Result<bool, SketchError> {
        match msg {
            SystemMessage::Heartbeat { client_time } => {
                self.out
                    .system(SystemMessage::HeartbeatAck {
                        client_time,
                        server_time: unix_millis(),
                    })
                    .await?;
            }
            SystemMessage::Disconnect { reason } => {
                tracing::info!(
                    conn_id = %self.conn_id,
                    player_id = %self.player,
                    %reason,
                    "client disconnected"
                );
                return Ok(true);
            }
            _ => {
                tracing::debug!(
                    conn_id = %self.conn_id,
                    "ignoring unexpected system message"
                );
            }
        }
        Ok(false)
    }

    /// Routes a game event. Failures go back to this connection only.
    async fn handle_client(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::CreateRoom { identity } => {
                if !self.authorized(&identity, join_error) {
                    return;
                }
                let created = self
                    .state
                    .rooms
                    .lock()
                    .await
                    .create_room(self.player.clone());
                match created {
                    Ok(room_id) => {
                        self.reply(ServerEvent::RoomCreated { room_id });
                    }
                    Err(e) => self.reject(&e, join_error),
                }
            }

            ClientEvent::JoinRoom { room_id, identity } => {
                if !self.authorized(&identity, join_error) {
                    return;
                }
                let handle = self.state.rooms.lock().await.lookup(&room_id);
                match handle {
                    Ok(handle) => self.join(handle).await,
                    Err(e) => self.reject(&e, join_error),
                }
            }

            ClientEvent::JoinPublicGame { identity } => {
                if !self.authorized(&identity, join_error) {
                    return;
                }
                let handle = {
                    let mut public = self.state.public.lock().await;
                    let mut rooms = self.state.rooms.lock().await;
                    match public.join_target(&mut rooms).await {
                        Ok(room_id) => rooms.lookup(&room_id),
                        Err(e) => Err(e),
                    }
                };
                match handle {
                    Ok(handle) => self.join(handle).await,
                    Err(e) => self.reject(&e, join_error),
                }
            }

            ClientEvent::StartGame { room_id } => {
                let result = match self.room_for(&room_id).await {
                    Ok(handle) => handle.start(self.player.clone()).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    self.reject(&e, game_error);
                }
            }

            ClientEvent::Draw { room_id, x, y, kind } => {
                // Strokes are best-effort: no error replies at stroke rate.
                if let Ok(handle) = self.room_for(&room_id).await {
                    let _ =
                        handle.draw(self.player.clone(), x, y, kind).await;
                }
            }

            ClientEvent::Guess {
                room_id,
                text,
                identity,
            } => {
                if !self.authorized(&identity, game_error) {
                    return;
                }
                let result = match self.room_for(&room_id).await {
                    Ok(handle) => {
                        handle.guess(self.player.clone(), text).await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    self.reject(&e, game_error);
                }
            }

            ClientEvent::QueryRoom { room_id } => {
                let snapshot = match self.room_for(&room_id).await {
                    Ok(handle) => handle.snapshot().await,
                    Err(e) => Err(e),
                };
                match snapshot {
                    Ok(snapshot) => {
                        self.reply(ServerEvent::RoomState { snapshot });
                    }
                    Err(e) => self.reject(&e, game_error),
                }
            }
        }
    }

    /// Joins `handle`'s room; on success, leaves the previous room if it
    /// was a different one.
    async fn join(&mut self, handle: RoomHandle) {
        let joined = handle
            .join(self.player.clone(), self.conn_id, self.events.clone())
            .await;
        if let Err(e) = joined {
            self.reject(&e, join_error);
            return;
        }

        let room_id = handle.room_id().clone();
        let previous = self.room.replace(handle);
        if let Some(previous) = previous.filter(|p| p.room_id() != &room_id) {
            tracing::info!(
                conn_id = %self.conn_id,
                player_id = %self.player,
                room_id = %previous.room_id(),
                "left previous room"
            );
            let _ = previous
                .disconnect(self.player.clone(), self.conn_id)
                .await;
        }
    }

    /// The room `room_id` names, reusing the joined room's handle when it
    /// matches.
    async fn room_for(
        &self,
        room_id: &RoomId,
    ) -> Result<RoomHandle, RoomError> {
        let joined = self.room.as_ref().filter(|h| h.room_id() == room_id);
        if let Some(handle) = joined {
            return Ok(handle.clone());
        }
        self.state.rooms.lock().await.lookup(room_id)
    }

    /// Checks an event's claimed identity against the bound one, replying
    /// with an authentication error on mismatch.
    fn authorized(
        &self,
        claimed: &str,
        wrap: fn(String) -> ServerEvent,
    ) -> bool {
        match authorize(&self.player, claimed) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    conn_id = %self.conn_id,
                    player_id = %self.player,
                    error = %e,
                    "event rejected"
                );
                self.reply(wrap(AUTH_ERROR.into()));
                false
            }
        }
    }

    fn reject(&self, error: &RoomError, wrap: fn(String) -> ServerEvent) {
        tracing::debug!(
            conn_id = %self.conn_id,
            player_id = %self.player,
            error = %error,
            "request rejected"
        );
        self.reply(wrap(error.client_reason()));
    }

    /// Queues a direct reply behind any room events already sent to this
    /// connection.
    fn reply(&self, event: ServerEvent) {
        let _ = self.events.send(Outbound::from(event));
    }
}

fn join_error(reason: String) -> ServerEvent {
    ServerEvent::JoinError { reason }
}

fn game_error(reason: String) -> ServerEvent {
    ServerEvent::GameError { reason }
}

/// Wall-clock milliseconds since the Unix epoch.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
