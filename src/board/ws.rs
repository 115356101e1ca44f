use axum::{
    extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::models::*;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    // Boards
    BoardCreated {
        board: Board,
    },
    BoardUpdated {
        board: Board,
    },
    BoardDeleted {
        board_id: String,
    },
    MemberAdded {
        board_id: String,
        user_id: String,
    },
    MemberRemoved {
        board_id: String,
        user_id: String,
    },

    // Columns
    ColumnCreated {
        column: Column,
    },
    ColumnUpdated {
        column: Column,
    },
    ColumnDeleted {
        board_id: String,
        column_id: String,
    },
    ColumnCompacted {
        board_id: String,
        column_id: String,
        rewritten: usize,
    },

    // Cards
    CardCreated {
        card: Card,
    },
    CardUpdated {
        card: Card,
    },
    CardMoved {
        board_id: String,
        card_id: String,
        from_column: String,
        to_column: String,
        order: i64,
    },
    CardDeleted {
        board_id: String,
        card_id: String,
        column_id: String,
    },

    // Labels
    LabelCreated {
        label: Label,
    },
    LabelDeleted {
        board_id: String,
        label_id: String,
    },

    // Conversation
    CommentAdded {
        comment: Comment,
    },
    MessagePosted {
        message: Message,
    },
    NotificationCreated {
        notification: Notification,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

/// Upgrade and subscribe the socket to the board event channel.
pub async fn ws_handler_with_sender(
    ws: WebSocketUpgrade,
    tx: broadcast::Sender<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, tx))
}

async fn handle_socket(socket: WebSocket, tx: broadcast::Sender<String>) {
    let (sender, receiver) = socket.split();
    let rx = tx.subscribe();
    tracing::debug!(subscribers = tx.receiver_count(), "WebSocket client connected");
    run_socket_loop(sender, receiver, rx).await;
    tracing::debug!("WebSocket client disconnected");
}

/// Forward broadcast events to one client with ping/pong keepalive.
///
/// If no Pong arrives within [`PONG_TIMEOUT`] of a Ping, the connection is
/// considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, WsFrame>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("WebSocket pong timeout");
                    break;
                }
                if sender.send(WsFrame::Ping(Vec::<u8>::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(json) => {
                        if sender.send(WsFrame::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagged behind event stream");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsFrame::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(WsFrame::Close(_))) | None => break,
                    // Clients only listen.
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(WsFrame::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage to all connected clients.
/// Having no subscribers is not an error.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WsMessage");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card {
            id: "c1".into(),
            column_id: "col1".into(),
            board_id: "b1".into(),
            title: "Test".into(),
            description: None,
            due_date: None,
            color: None,
            story_points: Some(3),
            time_estimate: None,
            time_spent: None,
            assignees: vec![],
            labels: vec![],
            order: 0,
            created_by: "u1".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_ws_message_card_created_serialization() {
        let msg = WsMessage::CardCreated { card: card() };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"CardCreated\""));
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"title\":\"Test\""));
        assert!(json.contains("\"story_points\":3"));
    }

    #[test]
    fn test_ws_message_card_moved_serialization() {
        let msg = WsMessage::CardMoved {
            board_id: "b1".into(),
            card_id: "c1".into(),
            from_column: "col1".into(),
            to_column: "col2".into(),
            order: 0,
        };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "CardMoved");
        assert_eq!(value["data"]["from_column"], "col1");
        assert_eq!(value["data"]["to_column"], "col2");
        assert_eq!(value["data"]["order"], 0);
    }

    #[test]
    fn test_ws_message_round_trip() {
        let msg = WsMessage::ColumnCompacted {
            board_id: "b1".into(),
            column_id: "col1".into(),
            rewritten: 2,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: WsMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            WsMessage::ColumnCompacted { rewritten, .. } => assert_eq!(rewritten, 2),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_message_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        broadcast_message(
            &tx,
            &WsMessage::CardDeleted {
                board_id: "b1".into(),
                card_id: "c1".into(),
                column_id: "col1".into(),
            },
        );
        let json = rx.try_recv().unwrap();
        assert!(json.contains("\"type\":\"CardDeleted\""));
        assert!(json.contains("\"card_id\":\"c1\""));
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let (tx, rx) = broadcast::channel::<String>(4);
        drop(rx);
        broadcast_message(&tx, &WsMessage::BoardDeleted { board_id: "b1".into() });
    }
}
