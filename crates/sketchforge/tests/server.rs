//! Integration tests for the Sketchforge server, handler, and full
//! connection flow over a real WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sketchforge::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const ALICE: &str = "0xA11CE";
const BOB: &str = "0xB0B";

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    start_server_with(SketchServerBuilder::new()).await
}

async fn start_server_with(builder: SketchServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .build(OpaqueIdentity)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode_envelope(envelope: &Envelope) -> Message {
    let text = serde_json::to_string(envelope).expect("encode");
    Message::Text(text.into())
}

fn decode_envelope(msg: Message) -> Envelope {
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

async fn send_payload(ws: &mut ClientWs, payload: Payload) {
    let envelope = Envelope {
        seq: 0,
        timestamp: 0,
        channel: Channel::ReliableOrdered,
        payload,
    };
    ws.send(encode_envelope(&envelope)).await.expect("send");
}

async fn send_event(ws: &mut ClientWs, event: ClientEvent) {
    send_payload(ws, Payload::Client(event)).await;
}

async fn next_envelope(ws: &mut ClientWs) -> Envelope {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket error");
    decode_envelope(msg)
}

/// Skips frames until a server event matches; returns its envelope.
async fn wait_for(
    ws: &mut ClientWs,
    pred: impl Fn(&ServerEvent) -> bool,
) -> Envelope {
    loop {
        let envelope = next_envelope(ws).await;
        if let Payload::Server(event) = &envelope.payload {
            if pred(event) {
                return envelope;
            }
        }
    }
}

async fn wait_for_event(
    ws: &mut ClientWs,
    pred: impl Fn(&ServerEvent) -> bool,
) -> ServerEvent {
    match wait_for(ws, pred).await.payload {
        Payload::Server(event) => event,
        other => unreachable!("wait_for returned {other:?}"),
    }
}

/// Sends a handshake and returns the first reply.
async fn handshake(ws: &mut ClientWs, identity: &str) -> Envelope {
    send_payload(
        ws,
        Payload::System(SystemMessage::Handshake {
            version: PROTOCOL_VERSION,
            identity: identity.into(),
        }),
    )
    .await;
    next_envelope(ws).await
}

/// Connects and shakes hands as `identity`.
async fn player(addr: &str, identity: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    handshake(&mut ws, identity).await;
    ws
}

/// Creates a room as `identity` and returns its id.
async fn create_room(ws: &mut ClientWs, identity: &str) -> RoomId {
    send_event(
        ws,
        ClientEvent::CreateRoom {
            identity: identity.into(),
        },
    )
    .await;
    match wait_for_event(ws, |e| matches!(e, ServerEvent::RoomCreated { .. }))
        .await
    {
        ServerEvent::RoomCreated { room_id } => room_id,
        other => panic!("expected roomCreated, got {other:?}"),
    }
}

async fn join_room(
    ws: &mut ClientWs,
    room_id: &RoomId,
    identity: &str,
) -> ServerEvent {
    send_event(
        ws,
        ClientEvent::JoinRoom {
            room_id: room_id.clone(),
            identity: identity.into(),
        },
    )
    .await;
    wait_for_event(ws, |e| {
        matches!(
            e,
            ServerEvent::JoinedRoom { .. } | ServerEvent::JoinError { .. }
        )
    })
    .await
}

/// Alice creates a room, Alice and Bob join, Alice starts. Returns the
/// room id and the word Alice (the first drawer) was given.
async fn started_room(
    alice: &mut ClientWs,
    bob: &mut ClientWs,
) -> (RoomId, String) {
    let room_id = create_room(alice, ALICE).await;
    join_room(alice, &room_id, ALICE).await;
    join_room(bob, &room_id, BOB).await;

    send_event(
        alice,
        ClientEvent::StartGame {
            room_id: room_id.clone(),
        },
    )
    .await;
    let word = match wait_for_event(alice, |e| {
        matches!(e, ServerEvent::StartDrawing { .. })
    })
    .await
    {
        ServerEvent::StartDrawing { word, .. } => word,
        other => panic!("expected startDrawing, got {other:?}"),
    };
    (room_id, word)
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_success() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let ack = handshake(&mut ws, ALICE).await;
    match ack.payload {
        Payload::System(SystemMessage::HandshakeAck { player_id, .. }) => {
            assert_eq!(player_id, PlayerId::from(ALICE));
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send_payload(
        &mut ws,
        Payload::System(SystemMessage::Handshake {
            version: 999,
            identity: ALICE.into(),
        }),
    )
    .await;

    let env = next_envelope(&mut ws).await;
    match env.payload {
        Payload::System(SystemMessage::Error { code, .. }) => {
            assert_eq!(code, 400);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_empty_identity_unauthorized() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let env = handshake(&mut ws, "   ").await;
    match env.payload {
        Payload::System(SystemMessage::Error { code, .. }) => {
            assert_eq!(code, 401);
        }
        other => panic!("expected Error 401, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_must_come_first() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send_event(
        &mut ws,
        ClientEvent::CreateRoom {
            identity: ALICE.into(),
        },
    )
    .await;

    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Error { code: 400, .. })
    ));
}

#[tokio::test]
async fn test_heartbeat_response() {
    let addr = start_server().await;
    let mut ws = player(&addr, ALICE).await;

    send_payload(
        &mut ws,
        Payload::System(SystemMessage::Heartbeat { client_time: 12345 }),
    )
    .await;

    let env = next_envelope(&mut ws).await;
    match env.payload {
        Payload::System(SystemMessage::HeartbeatAck {
            client_time,
            server_time,
        }) => {
            assert_eq!(client_time, 12345);
            assert!(server_time > 0);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = start_server().await;
    let mut ws = player(&addr, ALICE).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Error { code: 400, .. })
    ));

    send_payload(
        &mut ws,
        Payload::System(SystemMessage::Heartbeat { client_time: 1 }),
    )
    .await;
    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::HeartbeatAck { .. })
    ));
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let addr = start_server_with(
        SketchServerBuilder::new().idle_timeout(Duration::from_millis(200)),
    )
    .await;
    let mut ws = player(&addr, ALICE).await;

    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Disconnect { .. })
    ));
}

#[tokio::test]
async fn test_outbound_seq_increases() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    let ack = handshake(&mut ws, ALICE).await;

    send_payload(
        &mut ws,
        Payload::System(SystemMessage::Heartbeat { client_time: 1 }),
    )
    .await;
    let reply = next_envelope(&mut ws).await;

    assert!(reply.seq > ack.seq);
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_create_and_join_room() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;

    let room_id = create_room(&mut alice, ALICE).await;
    let joined = join_room(&mut alice, &room_id, ALICE).await;
    assert!(matches!(
        joined,
        ServerEvent::JoinedRoom { ref admin, .. } if admin == &Some(PlayerId::from(ALICE))
    ));

    let joined = join_room(&mut bob, &room_id, BOB).await;
    match joined {
        ServerEvent::JoinedRoom { players, .. } => {
            assert_eq!(
                players,
                vec![PlayerId::from(ALICE), PlayerId::from(BOB)]
            );
        }
        other => panic!("expected joinedRoom, got {other:?}"),
    }

    let update = wait_for_event(&mut alice, |e| {
        matches!(e, ServerEvent::PlayersUpdate { .. })
    })
    .await;
    assert!(matches!(
        update,
        ServerEvent::PlayersUpdate { ref players, .. } if players.len() == 2
    ));
}

#[tokio::test]
async fn test_join_unknown_room_rejected() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;

    let reply = join_room(&mut alice, &RoomId::from("ffffffff"), ALICE).await;

    assert_eq!(
        reply,
        ServerEvent::JoinError {
            reason: "Room not found.".into()
        }
    );
}

#[tokio::test]
async fn test_join_with_foreign_identity_rejected() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let room_id = create_room(&mut alice, ALICE).await;

    let reply = join_room(&mut alice, &room_id, BOB).await;

    assert_eq!(
        reply,
        ServerEvent::JoinError {
            reason: "Authentication error.".into()
        }
    );
}

#[tokio::test]
async fn test_non_admin_cannot_start() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;
    let room_id = create_room(&mut alice, ALICE).await;
    join_room(&mut alice, &room_id, ALICE).await;
    join_room(&mut bob, &room_id, BOB).await;

    send_event(&mut bob, ClientEvent::StartGame { room_id }).await;

    let reply = wait_for_event(&mut bob, |e| {
        matches!(e, ServerEvent::GameError { .. })
    })
    .await;
    assert_eq!(
        reply,
        ServerEvent::GameError {
            reason: "Only the admin can start the game.".into()
        }
    );
}

// =========================================================================
// Gameplay
// =========================================================================

#[tokio::test]
async fn test_correct_guess_ends_round_for_everyone() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;
    let (room_id, word) = started_room(&mut alice, &mut bob).await;

    let masked = wait_for_event(&mut bob, |e| {
        matches!(e, ServerEvent::StartDrawing { .. })
    })
    .await;
    assert!(matches!(
        masked,
        ServerEvent::StartDrawing { word: ref w, .. }
            if w.chars().all(|c| c == '_') && w.chars().count() == word.chars().count()
    ));

    send_event(
        &mut bob,
        ClientEvent::Guess {
            room_id,
            text: format!("  {}  ", word.to_uppercase()),
            identity: BOB.into(),
        },
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let round_end = wait_for_event(ws, |e| {
            matches!(e, ServerEvent::RoundEnd { .. })
        })
        .await;
        let ServerEvent::RoundEnd {
            outcome,
            word: revealed,
            scores,
        } = round_end
        else {
            unreachable!()
        };
        assert_eq!(
            outcome,
            RoundOutcome::Guessed {
                winner: PlayerId::from(BOB)
            }
        );
        assert_eq!(revealed, word);
        assert!(scores.iter().all(|e| e.score > 0));
    }
}

#[tokio::test]
async fn test_guess_with_foreign_identity_rejected() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;
    let (room_id, word) = started_room(&mut alice, &mut bob).await;

    send_event(
        &mut bob,
        ClientEvent::Guess {
            room_id: room_id.clone(),
            text: word,
            identity: ALICE.into(),
        },
    )
    .await;

    let reply = wait_for_event(&mut bob, |e| {
        matches!(e, ServerEvent::GameError { .. })
    })
    .await;
    assert_eq!(
        reply,
        ServerEvent::GameError {
            reason: "Authentication error.".into()
        }
    );

    send_event(&mut bob, ClientEvent::QueryRoom { room_id }).await;
    let state = wait_for_event(&mut bob, |e| {
        matches!(e, ServerEvent::RoomState { .. })
    })
    .await;
    let ServerEvent::RoomState { snapshot } = state else {
        unreachable!()
    };
    assert_eq!(snapshot.phase, RoomPhase::RoundActive);
    assert!(snapshot.scores.iter().all(|e| e.score == 0));
}

#[tokio::test]
async fn test_strokes_relayed_on_unreliable_channel() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;
    let (room_id, _word) = started_room(&mut alice, &mut bob).await;

    send_event(
        &mut alice,
        ClientEvent::Draw {
            room_id,
            x: 0.25,
            y: 0.75,
            kind: StrokeKind::Start,
        },
    )
    .await;

    let envelope =
        wait_for(&mut bob, |e| matches!(e, ServerEvent::Draw { .. })).await;
    assert_eq!(envelope.channel, Channel::Unreliable);
    assert_eq!(
        envelope.payload,
        Payload::Server(ServerEvent::Draw {
            x: 0.25,
            y: 0.75,
            kind: StrokeKind::Start
        })
    );
}

#[tokio::test]
async fn test_query_room_hides_word() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;
    let (room_id, word) = started_room(&mut alice, &mut bob).await;

    send_event(&mut bob, ClientEvent::QueryRoom { room_id: room_id.clone() })
        .await;
    let state = wait_for(&mut bob, |e| {
        matches!(e, ServerEvent::RoomState { .. })
    })
    .await;

    let raw = serde_json::to_string(&state).unwrap();
    assert!(!raw.contains(&format!("\"{word}\"")));
    let Payload::Server(ServerEvent::RoomState { snapshot }) = state.payload
    else {
        unreachable!()
    };
    assert_eq!(snapshot.room_id, room_id);
    assert_eq!(snapshot.current_drawer, Some(PlayerId::from(ALICE)));
    assert!(snapshot.game_started);
}

#[tokio::test]
async fn test_reconnect_rejoins_without_duplicate() {
    let addr = start_server().await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;
    let (room_id, _word) = started_room(&mut alice, &mut bob).await;

    bob.close(None).await.unwrap();
    drop(bob);
    let mut bob = player(&addr, BOB).await;
    let rejoined = join_room(&mut bob, &room_id, BOB).await;

    match rejoined {
        ServerEvent::JoinedRoom { players, .. } => {
            assert_eq!(
                players,
                vec![PlayerId::from(ALICE), PlayerId::from(BOB)]
            );
        }
        other => panic!("expected joinedRoom, got {other:?}"),
    }
    // Mid-round rejoin also gets the round in progress, masked.
    let drawing = wait_for_event(&mut bob, |e| {
        matches!(e, ServerEvent::StartDrawing { .. })
    })
    .await;
    assert!(matches!(
        drawing,
        ServerEvent::StartDrawing { ref drawer, .. } if drawer == &PlayerId::from(ALICE)
    ));
}

#[tokio::test]
async fn test_second_handshake_evicts_older_connection() {
    let addr = start_server().await;
    let mut first = player(&addr, ALICE).await;
    let mut second = player(&addr, ALICE).await;

    let env = next_envelope(&mut first).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Disconnect { ref reason })
            if reason.contains("another connection")
    ));
    let after = tokio::time::timeout(Duration::from_secs(5), first.next())
        .await
        .expect("old connection should be closed");
    assert!(!matches!(after, Some(Ok(Message::Text(_)))));

    // The newer connection keeps full authority.
    let room_id = create_room(&mut second, ALICE).await;
    let joined = join_room(&mut second, &room_id, ALICE).await;
    assert!(matches!(joined, ServerEvent::JoinedRoom { .. }));
}

#[tokio::test]
async fn test_padded_identity_authorizes_events() {
    let addr = start_server().await;
    let mut ws = player(&addr, " 0xA11CE ").await;

    let room_id = create_room(&mut ws, " 0xA11CE ").await;

    assert_eq!(room_id.as_str().len(), 8);
}

// =========================================================================
// Public games
// =========================================================================

#[tokio::test]
async fn test_public_game_starts_after_enrollment() {
    let config = GameConfig {
        enrollment_window: Duration::from_millis(300),
        ..GameConfig::default()
    };
    let addr =
        start_server_with(SketchServerBuilder::new().game_config(config)).await;
    let mut alice = player(&addr, ALICE).await;
    let mut bob = player(&addr, BOB).await;

    let mut rooms = Vec::new();
    for (ws, identity) in [(&mut alice, ALICE), (&mut bob, BOB)] {
        send_event(
            ws,
            ClientEvent::JoinPublicGame {
                identity: identity.into(),
            },
        )
        .await;
        match wait_for_event(ws, |e| {
            matches!(e, ServerEvent::JoinedRoom { .. })
        })
        .await
        {
            ServerEvent::JoinedRoom { room_id, admin, .. } => {
                assert_eq!(admin, Some(PlayerId::from(ALICE)));
                rooms.push(room_id);
            }
            other => panic!("expected joinedRoom, got {other:?}"),
        }
    }
    assert_eq!(rooms[0], rooms[1]);

    wait_for_event(&mut alice, |e| matches!(e, ServerEvent::GameStarted))
        .await;
    wait_for_event(&mut bob, |e| matches!(e, ServerEvent::GameStarted)).await;
}

#[tokio::test]
async fn test_public_game_cancelled_when_alone() {
    let config = GameConfig {
        enrollment_window: Duration::from_millis(200),
        ..GameConfig::default()
    };
    let addr =
        start_server_with(SketchServerBuilder::new().game_config(config)).await;
    let mut alice = player(&addr, ALICE).await;

    send_event(
        &mut alice,
        ClientEvent::JoinPublicGame {
            identity: ALICE.into(),
        },
    )
    .await;

    let cancelled = wait_for_event(&mut alice, |e| {
        matches!(e, ServerEvent::GameCancelled { .. })
    })
    .await;
    assert_eq!(
        cancelled,
        ServerEvent::GameCancelled {
            reason: "Not enough players joined".into()
        }
    );
}
