//! Short-term session memory.
//!
//! Sessions live in a guarded map keyed by opaque string ids. The message
//! buffer is a sliding window; all mutating operations refresh
//! last-activity, and a background sweep purges sessions idle beyond the
//! configured timeout.

use booking_agent_core::{
    slots::{SlotPatch, SlotSet},
    CoreError, Role, Scenario, Turn,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    #[default]
    Neutral,
    Positive,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
        }
    }
}

/// Per-session conversational flags, separate from the slot values.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionContext {
    /// User messages seen so far, including the one being processed.
    pub message_count: usize,
    pub last_scenario: Option<Scenario>,
    /// Consecutive turns that fell back to degraded handling.
    pub fallback_count: u32,
    pub sentiment: Sentiment,
}

/// Partial update to [`SessionContext`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub last_scenario: Option<Scenario>,
    pub fallback_count: Option<u32>,
    pub sentiment: Option<Sentiment>,
}

/// One conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub turns: VecDeque<Turn>,
    pub slots: SlotSet,
    pub context: SessionContext,
    pub created_at: DateTime<Utc>,
    last_activity: Instant,
    buffer_size: usize,
}

impl Session {
    fn new(id: String, buffer_size: usize) -> Self {
        Self {
            id,
            turns: VecDeque::with_capacity(buffer_size),
            slots: SlotSet::default(),
            context: SessionContext::default(),
            created_at: Utc::now(),
            last_activity: Instant::now(),
            buffer_size,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn push_turn(&mut self, turn: Turn) {
        if turn.role == Role::User {
            self.context.message_count += 1;
        }
        while self.turns.len() >= self.buffer_size {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Tail slice of the buffer, oldest first.
    pub fn recent_turns(&self, n: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }
}

/// Session store contract. Mutations on absent sessions are contract
/// errors, not silent no-ops.
pub trait SessionStore: Send + Sync {
    /// Create a session with a server-generated id.
    fn create(&self) -> String;

    /// Create with a client-supplied id. Idempotent: an existing id is
    /// returned as-is with a warning. Blank ids fall back to generation.
    fn create_with_id(&self, id: &str) -> String;

    fn get(&self, id: &str) -> Option<Session>;

    fn append_message(&self, id: &str, turn: Turn) -> Result<(), CoreError>;

    /// Shallow slot merge, returns the post-merge slot set.
    fn merge_slots(&self, id: &str, patch: &SlotPatch) -> Result<SlotSet, CoreError>;

    fn merge_context(&self, id: &str, patch: ContextPatch) -> Result<(), CoreError>;

    fn recent_messages(&self, id: &str, n: usize) -> Result<Vec<Turn>, CoreError>;

    /// Reset slots after a completed booking.
    fn reset_slots(&self, id: &str) -> Result<(), CoreError>;

    fn delete(&self, id: &str) -> bool;

    /// Remove sessions idle beyond the timeout; returns how many.
    fn sweep_expired(&self, timeout: Duration) -> usize;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    buffer_size: usize,
}

impl InMemorySessionStore {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            buffer_size,
        }
    }

    fn with_session<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, CoreError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;
        let result = f(session);
        session.touch();
        Ok(result)
    }

    #[cfg(test)]
    fn backdate(&self, id: &str, by: Duration) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(id) {
            session.last_activity = Instant::now() - by;
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .insert(id.clone(), Session::new(id.clone(), self.buffer_size));
        tracing::debug!(session_id = %id, "session created");
        id
    }

    fn create_with_id(&self, id: &str) -> String {
        let id = id.trim();
        if id.is_empty() {
            return self.create();
        }
        let mut sessions = self.sessions.write();
        if sessions.contains_key(id) {
            tracing::warn!(session_id = %id, "create requested for existing session");
            return id.to_string();
        }
        sessions.insert(id.to_string(), Session::new(id.to_string(), self.buffer_size));
        tracing::debug!(session_id = %id, "session created with client id");
        id.to_string()
    }

    fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    fn append_message(&self, id: &str, turn: Turn) -> Result<(), CoreError> {
        self.with_session(id, |session| session.push_turn(turn))
    }

    fn merge_slots(&self, id: &str, patch: &SlotPatch) -> Result<SlotSet, CoreError> {
        self.with_session(id, |session| {
            session.slots.apply(patch);
            session.slots.clone()
        })
    }

    fn merge_context(&self, id: &str, patch: ContextPatch) -> Result<(), CoreError> {
        self.with_session(id, |session| {
            if let Some(scenario) = patch.last_scenario {
                session.context.last_scenario = Some(scenario);
            }
            if let Some(count) = patch.fallback_count {
                session.context.fallback_count = count;
            }
            if let Some(sentiment) = patch.sentiment {
                session.context.sentiment = sentiment;
            }
        })
    }

    fn recent_messages(&self, id: &str, n: usize) -> Result<Vec<Turn>, CoreError> {
        let sessions = self.sessions.read();
        let session = sessions
            .get(id)
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;
        Ok(session.recent_turns(n))
    }

    fn reset_slots(&self, id: &str) -> Result<(), CoreError> {
        self.with_session(id, |session| session.slots.reset())
    }

    fn delete(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    fn sweep_expired(&self, timeout: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for() <= timeout);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "expired sessions swept");
        }
        removed
    }

    fn clear(&self) {
        self.sessions.write().clear();
    }

    fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Spawn the periodic expiry sweep. Dropping `true` into the returned
/// channel stops the task.
pub fn start_sweep_task(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    timeout: Duration,
) -> tokio::sync::watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    store.sweep_expired(timeout);
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("session sweep task stopping");
                        break;
                    }
                }
            }
        }
    });

    shutdown_tx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new(10)
    }

    #[test]
    fn create_with_id_is_idempotent() {
        let store = store();
        let id = store.create_with_id("abc");
        store
            .merge_slots(
                "abc",
                &SlotPatch {
                    name: Some("Alice".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let again = store.create_with_id("abc");
        assert_eq!(id, again);
        assert_eq!(store.get("abc").unwrap().slots.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn blank_id_generates_one() {
        let store = store();
        let id = store.create_with_id("   ");
        assert!(!id.trim().is_empty());
        assert!(store.get(&id).is_some());
    }

    #[test]
    fn append_to_absent_session_fails() {
        let store = store();
        let err = store.append_message("ghost", Turn::user("hi")).unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound(_)));
    }

    #[test]
    fn buffer_drops_oldest_on_overflow() {
        let store = InMemorySessionStore::new(3);
        let id = store.create();
        for i in 0..5 {
            store.append_message(&id, Turn::user(format!("m{}", i))).unwrap();
        }
        let session = store.get(&id).unwrap();
        let texts: Vec<_> = session.turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
        // message_count tracks all user messages, not just retained ones
        assert_eq!(session.context.message_count, 5);
    }

    #[test]
    fn recent_messages_returns_tail() {
        let store = store();
        let id = store.create();
        for i in 0..4 {
            store.append_message(&id, Turn::user(format!("m{}", i))).unwrap();
        }
        let recent = store.recent_messages(&id, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "m2");
        assert_eq!(recent[1].text, "m3");
    }

    #[test]
    fn sweep_removes_only_expired_sessions() {
        let store = store();
        let stale = store.create();
        let fresh = store.create();
        store.backdate(&stale, Duration::from_secs(31 * 60));
        store.backdate(&fresh, Duration::from_secs(29 * 60));

        let removed = store.sweep_expired(Duration::from_secs(30 * 60));

        assert_eq!(removed, 1);
        assert!(store.get(&stale).is_none());
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn context_patch_applies_selectively() {
        let store = store();
        let id = store.create();
        store
            .merge_context(
                &id,
                ContextPatch {
                    fallback_count: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        let session = store.get(&id).unwrap();
        assert_eq!(session.context.fallback_count, 2);
        assert_eq!(session.context.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn reset_slots_clears_values() {
        let store = store();
        let id = store.create();
        store
            .merge_slots(
                &id,
                &SlotPatch {
                    name: Some("Alice".into()),
                    email: Some("a@b.c".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        store.reset_slots(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().slots, SlotSet::default());
    }
}
