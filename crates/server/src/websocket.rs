//! WebSocket Handler
//!
//! Text conversation over `/ws?user_id=...`. Every recorded turn is forwarded
//! live as it happens; the counselor's final reply follows as a response.
//! While the risk assessment waits for an answer, the next inbound frame is
//! taken as that answer instead of a new patient message.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use chia_agent::ConversationEvent;
use chia_core::{AgentRole, ConversationTurn};

use crate::session::{Outbound, Session};
use crate::state::AppState;

/// WebSocket message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Patient input
    Text { content: String },
    /// Live turn between two agents
    Turn {
        sender: String,
        receiver: String,
        message: String,
    },
    /// Counselor reply or informational text
    Response { text: String },
    /// Question waiting for the patient's answer
    Question { text: String },
    /// Error
    Error { message: String },
    /// Session info
    SessionInfo { user_id: String },
    /// Conversation ended
    Ended { reason: String },
    /// Ping/Pong
    Ping,
    Pong,
}

impl WsMessage {
    fn turn(turn: &ConversationTurn) -> Self {
        WsMessage::Turn {
            sender: turn.sender.clone(),
            receiver: turn.receiver.clone(),
            message: turn.message.clone(),
        }
    }

    /// Plain-text rendering; `None` for frames that only exist in JSON mode
    pub fn plain_text(&self) -> Option<String> {
        match self {
            WsMessage::Turn {
                sender, message, ..
            } => Some(format!("{}: {}", sender, message)),
            WsMessage::Response { text } | WsMessage::Question { text } => Some(text.clone()),
            WsMessage::Error { message } => Some(format!("Error: {}", message)),
            WsMessage::Text { .. }
            | WsMessage::SessionInfo { .. }
            | WsMessage::Ended { .. }
            | WsMessage::Ping
            | WsMessage::Pong => None,
        }
    }

    /// Frame text for the configured wire format
    pub fn encode(&self, json: bool) -> Option<String> {
        if json {
            serde_json::to_string(self).ok()
        } else {
            self.plain_text()
        }
    }
}

/// Inbound frame after decoding
#[derive(Debug, Clone, PartialEq, Eq)]
enum Inbound {
    Message(String),
    Ping,
    Ignored,
}

/// JSON `text`/`ping` frames are unwrapped; anything else is the message itself
fn decode_inbound(raw: &str) -> Inbound {
    match serde_json::from_str::<WsMessage>(raw) {
        Ok(WsMessage::Text { content }) => Inbound::Message(content),
        Ok(WsMessage::Ping) => Inbound::Ping,
        Ok(_) => Inbound::Ignored,
        Err(_) => Inbound::Message(raw.to_string()),
    }
}

/// The counselor's reply to the patient is sent as a response, not a live turn
fn is_final_reply(turn: &ConversationTurn) -> bool {
    turn.sender == AgentRole::Counselor.default_name()
        && turn.receiver == AgentRole::Patient.default_name()
}

/// Query parameters for the upgrade
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Option<String>,
}

/// `GET /ws?user_id=...`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Result<Response, StatusCode> {
    let user_id = params
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let session = state.sessions.get_or_create(&user_id).map_err(StatusCode::from)?;
    let json = state.settings.server.ws_json;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, session, json)))
}

async fn handle_socket(socket: WebSocket, session: Arc<Session>, json: bool) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();

    // Single writer so frames from all tasks keep their order
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let Some(text) = msg.encode(json) else {
                continue;
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                tracing::debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let _ = out_tx.send(WsMessage::SessionInfo {
        user_id: session.user_id.clone(),
    });
    let _ = out_tx.send(WsMessage::Response {
        text: session.greeting.clone(),
    });

    let (connection_id, mut questions) = session.channel.attach();
    let bridge = {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(outbound) = questions.recv().await {
                let msg = match outbound {
                    Outbound::Question(text) => WsMessage::Question { text },
                    Outbound::Notice(text) => WsMessage::Response { text },
                };
                if out_tx.send(msg).is_err() {
                    break;
                }
            }
        })
    };

    let forwarder = {
        let out_tx = out_tx.clone();
        let mut events = session.agent.subscribe();
        tokio::spawn(async move {
            loop {
                let msg = match events.recv().await {
                    Ok(ConversationEvent::Turn(turn)) if !is_final_reply(&turn) => {
                        WsMessage::turn(&turn)
                    },
                    Ok(ConversationEvent::Turn(_)) => continue,
                    Ok(ConversationEvent::Ended { reason }) => WsMessage::Ended {
                        reason: reason.as_str().to_string(),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "Turn forwarder lagged");
                        continue;
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if out_tx.send(msg).is_err() {
                    break;
                }
            }
        })
    };

    tracing::info!(user_id = %session.user_id, connection = connection_id, "WebSocket connected");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(raw)) => {
                session.touch();

                let input = match decode_inbound(&raw) {
                    Inbound::Message(text) => text,
                    Inbound::Ping => {
                        let _ = out_tx.send(WsMessage::Pong);
                        continue;
                    },
                    Inbound::Ignored => continue,
                };

                let input = match session.channel.deliver(input) {
                    Ok(()) => continue,
                    Err(input) => input,
                };

                // Processing runs off the read loop so assessment answers can still arrive
                let session = session.clone();
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    match session.agent.process(&input).await {
                        Ok(reply) => {
                            if !reply.text.is_empty() {
                                let _ = out_tx.send(WsMessage::Response { text: reply.text });
                            }
                        },
                        Err(e) => {
                            tracing::warn!(user_id = %session.user_id, error = %e, "Message failed");
                            let _ = out_tx.send(WsMessage::Error {
                                message: e.to_string(),
                            });
                        },
                    }
                });
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive failed");
                break;
            },
            _ => {},
        }
    }

    session.channel.detach(connection_id);
    bridge.abort();
    forwarder.abort();
    drop(out_tx);
    writer.abort();

    tracing::info!(user_id = %session.user_id, connection = connection_id, "WebSocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_frames() {
        let frame = WsMessage::Turn {
            sender: "search_bot".into(),
            receiver: "counselor".into(),
            message: "Suggested tool call".into(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&frame.encode(true).unwrap()).unwrap();
        assert_eq!(value["type"], "turn");
        assert_eq!(value["sender"], "search_bot");

        let info = WsMessage::SessionInfo { user_id: "u1".into() };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"type": "session_info", "user_id": "u1"})
        );
    }

    #[test]
    fn test_plain_frames() {
        let frame = WsMessage::Turn {
            sender: "patient".into(),
            receiver: "manager".into(),
            message: "hi".into(),
        };
        assert_eq!(frame.encode(false).as_deref(), Some("patient: hi"));
        assert_eq!(
            WsMessage::Question { text: "Q1?".into() }.encode(false).as_deref(),
            Some("Q1?")
        );
        assert_eq!(WsMessage::Ended { reason: "terminated".into() }.encode(false), None);
    }

    #[test]
    fn test_decode_inbound() {
        assert_eq!(
            decode_inbound(r#"{"type":"text","content":"What is PrEP?"}"#),
            Inbound::Message("What is PrEP?".into())
        );
        assert_eq!(decode_inbound(r#"{"type":"ping"}"#), Inbound::Ping);
        assert_eq!(decode_inbound("yes"), Inbound::Message("yes".into()));
        assert_eq!(decode_inbound(r#"{"type":"pong"}"#), Inbound::Ignored);
    }

    #[test]
    fn test_final_reply_detection() {
        assert!(is_final_reply(&ConversationTurn::new("counselor", "patient", "Hi")));
        assert!(!is_final_reply(&ConversationTurn::new("counselor", "search_bot", "[]")));
        assert!(!is_final_reply(&ConversationTurn::new("patient", "manager", "Hi")));
    }
}
