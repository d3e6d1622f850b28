//! Session Management
//!
//! One counselor per user id. A session outlives individual WebSocket
//! connections: the [`SessionChannel`] is attached while a socket is open so
//! the risk assessment can ask its questions there, and falls back to the
//! detached behavior otherwise.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};

use chia_agent::{Agent, DetachedChannel};
use chia_core::{AnswerChannel, Error, Result};

use crate::metrics::set_active_sessions;
use crate::ServerError;

/// Builds the agent for a new session
pub type AgentFactory = Arc<dyn Fn(&str, Arc<dyn AnswerChannel>) -> Arc<dyn Agent> + Send + Sync>;

/// Message pushed from the assessment to the attached connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Needs an answer
    Question(String),
    /// Informational text
    Notice(String),
}

struct Attachment {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// Answer channel routed to whichever connection is attached
#[derive(Default)]
pub struct SessionChannel {
    attachment: RwLock<Option<Attachment>>,
    pending: Mutex<Option<oneshot::Sender<String>>>,
    next_id: AtomicU64,
}

impl SessionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route questions to a new connection, replacing any previous one
    pub fn attach(&self) -> (u64, mpsc::UnboundedReceiver<Outbound>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.attachment.write() = Some(Attachment { id, outbound: tx });
        // A question asked on the old connection can no longer be answered
        self.pending.lock().take();
        (id, rx)
    }

    /// Detach connection `id`; a newer attachment is left alone
    pub fn detach(&self, id: u64) {
        let mut attachment = self.attachment.write();
        if attachment.as_ref().map(|a| a.id) == Some(id) {
            *attachment = None;
            self.pending.lock().take();
        }
    }

    /// Drop any attachment and pending question
    pub fn close(&self) {
        *self.attachment.write() = None;
        self.pending.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.read().is_some()
    }

    pub fn awaiting_answer(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Hand `text` to the pending question
    ///
    /// Gives the text back when no question is waiting, so the caller can
    /// treat it as a regular patient message.
    pub fn deliver(&self, text: String) -> std::result::Result<(), String> {
        match self.pending.lock().take() {
            Some(tx) => tx.send(text),
            None => Err(text),
        }
    }
}

#[async_trait]
impl AnswerChannel for SessionChannel {
    async fn ask(&self, prompt: &str) -> Result<String> {
        let outbound = self.attachment.read().as_ref().map(|a| a.outbound.clone());
        let Some(outbound) = outbound else {
            return DetachedChannel.ask(prompt).await;
        };

        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);

        if outbound.send(Outbound::Question(prompt.to_string())).is_err() {
            self.pending.lock().take();
            return Err(Error::Channel("Connection closed".to_string()));
        }

        rx.await
            .map_err(|_| Error::Channel("Connection closed before an answer arrived".to_string()))
    }

    async fn notify(&self, text: &str) -> Result<()> {
        let outbound = self.attachment.read().as_ref().map(|a| a.outbound.clone());
        match outbound {
            Some(outbound) => {
                let _ = outbound.send(Outbound::Notice(text.to_string()));
                Ok(())
            },
            None => DetachedChannel.notify(text).await,
        }
    }

    fn name(&self) -> &str {
        "session"
    }
}

/// Session state
pub struct Session {
    /// User id the session is keyed by
    pub user_id: String,
    /// Counselor for this user
    pub agent: Arc<dyn Agent>,
    /// Channel the agent's assessment tool asks through
    pub channel: Arc<SessionChannel>,
    /// Opening line recorded at creation
    pub greeting: String,
    /// Creation time
    pub created_at: Instant,
    /// Last activity
    last_activity: RwLock<Instant>,
}

impl Session {
    fn new(user_id: &str, factory: &AgentFactory) -> Self {
        let channel = Arc::new(SessionChannel::new());
        let agent = factory(user_id, channel.clone());
        let greeting = agent.greet();
        Self {
            user_id: user_id.to_string(),
            agent,
            channel,
            greeting,
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Check if session is expired
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    /// Whether the conversation can take more messages
    pub fn is_active(&self) -> bool {
        self.agent.is_active()
    }

    /// Close session
    pub fn close(&self) {
        self.channel.close();
    }
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    factory: AgentFactory,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(factory: AgentFactory, max_sessions: usize) -> Self {
        Self::with_config(
            factory,
            max_sessions,
            Duration::from_secs(1800),
            Duration::from_secs(60),
        )
    }

    /// Create a new session manager with custom timeout and cleanup interval
    pub fn with_config(
        factory: AgentFactory,
        max_sessions: usize,
        session_timeout: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            max_sessions,
            session_timeout,
            cleanup_interval,
        }
    }

    /// Start a background task that periodically evicts idle sessions.
    ///
    /// Send `true` on the returned sender to stop it.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = manager.count(),
                                "Evicted idle sessions"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Session for `user_id`, created on first use
    ///
    /// A session whose conversation has ended is replaced by a fresh one.
    pub fn get_or_create(&self, user_id: &str) -> std::result::Result<Arc<Session>, ServerError> {
        if user_id.trim().is_empty() {
            return Err(ServerError::InvalidRequest("user_id is required".to_string()));
        }

        if let Some(session) = self.get(user_id) {
            if session.is_active() {
                return Ok(session);
            }
        }

        let mut sessions = self.sessions.write();

        // Another request may have created it while we waited for the lock
        if let Some(session) = sessions.get(user_id) {
            if session.is_active() {
                return Ok(session.clone());
            }
        }
        if let Some(ended) = sessions.remove(user_id) {
            ended.close();
            tracing::info!(user_id, "Replacing ended session");
        }

        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);

            if sessions.len() >= self.max_sessions {
                return Err(ServerError::Capacity("Max sessions reached".to_string()));
            }
        }

        let session = Arc::new(Session::new(user_id, &self.factory));
        sessions.insert(user_id.to_string(), session.clone());
        set_active_sessions(sessions.len());

        tracing::info!(user_id, "Created session");
        Ok(session)
    }

    /// Get a session by user id
    pub fn get(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(user_id).cloned()
    }

    /// Remove a session
    pub fn remove(&self, user_id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.remove(user_id) {
            session.close();
            set_active_sessions(sessions.len());
            tracing::info!(user_id, "Removed session");
        }
    }

    /// Get session count
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Evict idle sessions; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions)
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                session.close();
                tracing::debug!(user_id = %id, "Expired session");
            }
        }
        set_active_sessions(sessions.len());
        expired.len()
    }

    /// List all user ids
    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chia_agent::{AgentError, AgentReply, ConversationEvent, ConversationLog};
    use chia_core::ConversationTurn;
    use tokio::sync::broadcast;

    /// Echoes messages back; "assess" runs one question over the channel,
    /// "end conversation" ends the session
    pub struct EchoAgent {
        log: ConversationLog,
        channel: Arc<dyn AnswerChannel>,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        async fn process(&self, input: &str) -> std::result::Result<AgentReply, AgentError> {
            if !self.log.is_active() {
                return Err(AgentError::Conversation("Conversation has ended".to_string()));
            }
            self.log.record("patient", "manager", input);

            if input == "end conversation" {
                self.log.end(chia_agent::EndReason::PatientExit);
                return Ok(AgentReply { text: String::new(), ended: true, tool_calls: 0 });
            }

            let text = if input == "assess" {
                let answer = self
                    .channel
                    .ask("Q1?")
                    .await
                    .unwrap_or_else(|e| format!("unavailable: {}", e));
                self.log.record("assessment_bot", "counselor", "Suggested tool call: assess_hiv_risk({})");
                format!("answered {}", answer)
            } else {
                format!("echo {}", input)
            };

            self.log.record("counselor", "patient", text.clone());
            Ok(AgentReply { text, ended: false, tool_calls: 0 })
        }

        fn greet(&self) -> String {
            self.log.record("counselor", "patient", "How can I help you?");
            "How can I help you?".to_string()
        }

        fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
            self.log.subscribe()
        }

        fn history(&self) -> Vec<ConversationTurn> {
            self.log.history()
        }

        fn latest_response(&self) -> String {
            self.log.latest_response()
        }

        fn is_active(&self) -> bool {
            self.log.is_active()
        }

        fn name(&self) -> &str {
            "counselor"
        }
    }

    pub fn echo_factory() -> AgentFactory {
        Arc::new(|user_id: &str, channel: Arc<dyn AnswerChannel>| {
            Arc::new(EchoAgent {
                log: ConversationLog::new(user_id),
                channel,
            }) as Arc<dyn Agent>
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::echo_factory;
    use super::*;

    #[test]
    fn test_get_or_create() {
        let manager = SessionManager::new(echo_factory(), 10);
        let first = manager.get_or_create("alice").unwrap();
        let again = manager.get_or_create("alice").unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(manager.count(), 1);
        assert_eq!(first.greeting, "How can I help you?");
        assert_eq!(first.agent.history().len(), 1);
    }

    #[test]
    fn test_blank_user_id() {
        let manager = SessionManager::new(echo_factory(), 10);
        assert!(matches!(
            manager.get_or_create("  "),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_capacity() {
        let manager = SessionManager::new(echo_factory(), 1);
        manager.get_or_create("alice").unwrap();
        assert!(matches!(
            manager.get_or_create("bob"),
            Err(ServerError::Capacity(_))
        ));
    }

    #[test]
    fn test_expired_sessions_make_room() {
        let manager =
            SessionManager::with_config(echo_factory(), 1, Duration::ZERO, Duration::from_secs(60));
        manager.get_or_create("alice").unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert!(manager.get_or_create("bob").is_ok());
        assert!(manager.get("alice").is_none());
    }

    #[tokio::test]
    async fn test_ended_session_is_replaced() {
        let manager = SessionManager::new(echo_factory(), 10);
        let session = manager.get_or_create("alice").unwrap();
        session.agent.process("end conversation").await.unwrap();
        assert!(!session.is_active());

        let fresh = manager.get_or_create("alice").unwrap();
        assert!(!Arc::ptr_eq(&session, &fresh));
        assert!(fresh.is_active());
    }

    #[test]
    fn test_remove() {
        let manager = SessionManager::new(echo_factory(), 10);
        manager.get_or_create("alice").unwrap();
        manager.remove("alice");
        assert!(manager.get("alice").is_none());
        assert!(manager.list().is_empty());
    }

    #[tokio::test]
    async fn test_detached_channel_refuses_questions() {
        let channel = SessionChannel::new();
        let err = channel.ask("Q1?").await.unwrap_err();
        assert!(err.is_channel_closed());
        assert!(channel.notify("hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_attached_channel_round_trip() {
        let channel = Arc::new(SessionChannel::new());
        let (_, mut outbound) = channel.attach();

        let asking = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.ask("Q1?").await })
        };

        assert_eq!(outbound.recv().await, Some(Outbound::Question("Q1?".to_string())));
        assert!(channel.awaiting_answer());
        assert!(channel.deliver("yes".to_string()).is_ok());
        assert_eq!(asking.await.unwrap().unwrap(), "yes");

        // Nothing pending: the text is handed back
        assert_eq!(channel.deliver("hello".to_string()), Err("hello".to_string()));
    }

    #[tokio::test]
    async fn test_detach_aborts_pending_question() {
        let channel = Arc::new(SessionChannel::new());
        let (id, mut outbound) = channel.attach();

        let asking = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.ask("Q1?").await })
        };
        outbound.recv().await;
        channel.detach(id);

        assert!(asking.await.unwrap().is_err());
        assert!(!channel.is_attached());
    }

    #[test]
    fn test_stale_detach_keeps_newer_connection() {
        let channel = SessionChannel::new();
        let (old, _rx_old) = channel.attach();
        let (_new, _rx_new) = channel.attach();

        channel.detach(old);
        assert!(channel.is_attached());
    }
}
