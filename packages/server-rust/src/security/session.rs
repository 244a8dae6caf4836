//! Session tracking and send/subscribe authorization.
//!
//! A session exists only after successful authentication and is destroyed by
//! explicit removal or by a collaborator-owned expiry sweep comparing
//! `last_used` against the configured timeout. Authorization denials are
//! booleans, never errors, so gateways choose how to react (drop the frame,
//! close the connection).

use std::sync::Arc;
use std::time::SystemTime;

use conduit_core::{Cri, Participant};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::security::pattern::{CriPattern, PatternError};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connected, authenticated participant.
pub struct Session {
    participant: Participant,
    session_id: String,
    reply_to_id: String,
    last_used: Mutex<SystemTime>,
    send_patterns: Vec<CriPattern>,
    subscribe_patterns: Vec<CriPattern>,
    temporary_send_patterns: Mutex<Vec<CriPattern>>,
}

impl Session {
    fn new(
        participant: Participant,
        session_id: String,
        reply_to_id: String,
        send_patterns: Vec<CriPattern>,
        subscribe_patterns: Vec<CriPattern>,
    ) -> Self {
        Self {
            participant,
            session_id,
            reply_to_id,
            last_used: Mutex::new(SystemTime::now()),
            send_patterns,
            subscribe_patterns,
            temporary_send_patterns: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn reply_to_id(&self) -> &str {
        &self.reply_to_id
    }

    /// When the session last carried traffic. The expiry sweep compares this
    /// against the configured session timeout.
    #[must_use]
    pub fn last_used(&self) -> SystemTime {
        *self.last_used.lock()
    }

    /// Marks the session as used now. Called on every inbound frame
    /// attributed to it.
    pub fn touch(&self) {
        *self.last_used.lock() = SystemTime::now();
    }

    /// Grants exactly one send matching `pattern`; the grant is consumed by
    /// the first [`Session::send_allowed`] it satisfies.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the pattern does not compile.
    pub fn add_temporary_send_allowed(&self, pattern: &str) -> Result<(), PatternError> {
        let compiled = CriPattern::new(pattern)?;
        self.temporary_send_patterns.lock().push(compiled);
        Ok(())
    }

    /// Whether this session may send to `cri`. A permanent rule match leaves
    /// the rules untouched; a temporary match consumes the matching pattern,
    /// making the grant self-expiring.
    #[must_use]
    pub fn send_allowed(&self, cri: &Cri) -> bool {
        if self.send_patterns.iter().any(|p| p.matches(cri)) {
            return true;
        }
        let mut temporary = self.temporary_send_patterns.lock();
        if let Some(index) = temporary.iter().position(|p| p.matches(cri)) {
            temporary.remove(index);
            return true;
        }
        false
    }

    /// Whether this session may subscribe to `cri`. Permanent rules only;
    /// there are no temporary subscribe grants.
    #[must_use]
    pub fn subscribe_allowed(&self, cri: &Cri) -> bool {
        self.subscribe_patterns.iter().any(|p| p.matches(cri))
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// The session store: safe for concurrent use from multiple gateway
/// connections. An explicit instance owned by the gateway process, never a
/// process-wide singleton.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    send_patterns: Vec<CriPattern>,
    subscribe_patterns: Vec<CriPattern>,
}

impl SessionManager {
    /// Compiles the configured permanent allow patterns once.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when a configured pattern does not compile.
    pub fn new(config: &SessionConfig) -> Result<Self, PatternError> {
        Ok(Self {
            sessions: DashMap::new(),
            send_patterns: compile_all(&config.send_patterns)?,
            subscribe_patterns: compile_all(&config.subscribe_patterns)?,
        })
    }

    /// Creates a session for an authenticated participant.
    ///
    /// Beyond the configured permanent rules, the session may always send
    /// and subscribe to its own scoped reply stream.
    pub fn create(&self, participant: Participant, reply_to_id: &str) -> Arc<Session> {
        let session_id = Uuid::new_v4().to_string();

        let mut send_patterns = self.send_patterns.clone();
        let mut subscribe_patterns = self.subscribe_patterns.clone();
        if let Ok(own_replies) = CriPattern::new(&format!("stream://{reply_to_id}@**")) {
            send_patterns.push(own_replies.clone());
            subscribe_patterns.push(own_replies);
        }

        let session = Arc::new(Session::new(
            participant,
            session_id.clone(),
            reply_to_id.to_string(),
            send_patterns,
            subscribe_patterns,
        ));
        self.sessions.insert(session_id, session.clone());
        session
    }

    #[must_use]
    pub fn find_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Removes a session. Returns whether one existed. Terminal: a removed
    /// session id is never revived.
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Snapshot of all live sessions, for the collaborator-owned expiry
    /// sweep to inspect `last_used`.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<CriPattern>, PatternError> {
    patterns.iter().map(|p| CriPattern::new(p)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(&SessionConfig {
            send_patterns: vec!["srv://org.acme.**".to_string()],
            subscribe_patterns: vec!["stream://public.feed".to_string()],
            ..SessionConfig::default()
        })
        .unwrap()
    }

    fn cri(literal: &str) -> Cri {
        Cri::parse(literal).unwrap()
    }

    #[test]
    fn create_find_remove_lifecycle() {
        let manager = manager();
        let session = manager.create(Participant::new("user-1"), "reply-1");

        let found = manager.find_session(session.session_id()).unwrap();
        assert_eq!(found.participant().id, "user-1");
        assert_eq!(found.reply_to_id(), "reply-1");

        assert!(manager.remove_session(session.session_id()));
        assert!(manager.find_session(session.session_id()).is_none());
        // removal is terminal
        assert!(!manager.remove_session(session.session_id()));
    }

    #[test]
    fn permanent_send_rules_are_not_consumed() {
        let manager = manager();
        let session = manager.create(Participant::new("user-1"), "reply-1");

        let target = cri("srv://org.acme.Foo/bar");
        assert!(session.send_allowed(&target));
        assert!(session.send_allowed(&target));
    }

    #[test]
    fn temporary_send_grant_is_consumed_by_first_match() {
        let manager = manager();
        let session = manager.create(Participant::new("user-1"), "reply-1");

        session
            .add_temporary_send_allowed("srv://other.Foo/*")
            .unwrap();

        let target = cri("srv://other.Foo/bar");
        assert!(session.send_allowed(&target));
        // consumed: the same CRI is now denied
        assert!(!session.send_allowed(&target));
    }

    #[test]
    fn denials_are_boolean_not_errors() {
        let manager = manager();
        let session = manager.create(Participant::new("user-1"), "reply-1");

        assert!(!session.send_allowed(&cri("srv://forbidden.Service/run")));
        assert!(!session.subscribe_allowed(&cri("stream://private.feed")));
    }

    #[test]
    fn subscribe_rules_have_no_consumption_semantics() {
        let manager = manager();
        let session = manager.create(Participant::new("user-1"), "reply-1");

        let feed = cri("stream://public.feed");
        assert!(session.subscribe_allowed(&feed));
        assert!(session.subscribe_allowed(&feed));
    }

    #[test]
    fn session_may_use_its_own_reply_stream() {
        let manager = manager();
        let session = manager.create(Participant::new("user-1"), "reply-1");

        let own = cri("stream://reply-1@rpc.replies");
        assert!(session.send_allowed(&own));
        assert!(session.subscribe_allowed(&own));

        let other = cri("stream://reply-2@rpc.replies");
        assert!(!session.send_allowed(&other));
        assert!(!session.subscribe_allowed(&other));
    }

    #[test]
    fn touch_advances_last_used() {
        let manager = manager();
        let session = manager.create(Participant::new("user-1"), "reply-1");

        let before = session.last_used();
        std::thread::sleep(std::time::Duration::from_millis(5));
        session.touch();
        assert!(session.last_used() > before);
    }

    #[test]
    fn sessions_snapshot_exposes_expiry_data() {
        let manager = manager();
        manager.create(Participant::new("a"), "r1");
        manager.create(Participant::new("b"), "r2");

        let sessions = manager.sessions();
        assert_eq!(sessions.len(), 2);
        for session in sessions {
            assert!(session.last_used() <= SystemTime::now());
        }
    }
}
