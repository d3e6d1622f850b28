//! Conversation log
//!
//! Ordered record of every `(sender, receiver, message)` turn in a session.
//! Each recorded turn is broadcast so transports can forward it live.

use parking_lot::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use chia_config::constants::messages;
use chia_core::ConversationTurn;

/// Conversation event
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// Turn recorded
    Turn(ConversationTurn),
    /// Conversation ended
    Ended { reason: EndReason },
}

/// Reason for conversation end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Patient sent the exit phrase
    PatientExit,
    /// Counselor reply carried the termination sentinel
    Terminated,
    Timeout,
    Error(String),
}

impl EndReason {
    /// Short label used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::PatientExit => "patient_exit",
            EndReason::Terminated => "terminated",
            EndReason::Timeout => "timeout",
            EndReason::Error(_) => "error",
        }
    }
}

/// Conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Active,
    Ended,
}

/// Per-session turn log
pub struct ConversationLog {
    session_id: String,
    turns: RwLock<Vec<ConversationTurn>>,
    state: Mutex<ConversationState>,
    last_activity: Mutex<Instant>,
    event_tx: broadcast::Sender<ConversationEvent>,
}

impl ConversationLog {
    pub fn new(session_id: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            session_id: session_id.into(),
            turns: RwLock::new(Vec::new()),
            state: Mutex::new(ConversationState::Active),
            last_activity: Mutex::new(Instant::now()),
            event_tx,
        }
    }

    /// Subscribe to turn events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.event_tx.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append a turn and broadcast it
    pub fn record(
        &self,
        sender: &str,
        receiver: &str,
        message: impl Into<String>,
    ) -> ConversationTurn {
        let turn = ConversationTurn::new(sender, receiver, message);
        self.turns.write().push(turn.clone());
        *self.last_activity.lock() = Instant::now();

        tracing::trace!(
            session = %self.session_id,
            sender,
            receiver,
            "Turn recorded"
        );

        // No subscribers is fine
        let _ = self.event_tx.send(ConversationEvent::Turn(turn.clone()));
        turn
    }

    /// All turns in order
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.turns.read().clone()
    }

    /// `"sender to receiver: message"` lines
    pub fn formatted_history(&self) -> Vec<String> {
        self.turns
            .read()
            .iter()
            .map(ConversationTurn::history_line)
            .collect()
    }

    /// Message of the last turn
    pub fn latest_response(&self) -> String {
        self.turns
            .read()
            .last()
            .map(|t| t.message.clone())
            .unwrap_or_else(|| messages::NO_MESSAGES.to_string())
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    pub fn state(&self) -> ConversationState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConversationState::Active
    }

    /// Time since the last recorded turn
    pub fn idle_time(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Mark ended; only the first call broadcasts
    pub fn end(&self, reason: EndReason) {
        {
            let mut state = self.state.lock();
            if *state == ConversationState::Ended {
                return;
            }
            *state = ConversationState::Ended;
        }
        tracing::info!(session = %self.session_id, reason = ?reason, "Conversation ended");
        let _ = self.event_tx.send(ConversationEvent::Ended { reason });
    }
}
