//! Signed-in user sessions.
//!
//! A session binds a GitHub identity to the bearer token obtained through
//! OAuth and to that user's review board. Handlers receive the session as an
//! explicit value; nothing reads it from global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::Identity;
use crate::orchestrator::ReviewBoard;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "pr_review_session";

/// Lifetime of an OAuth `state` value between sign-in redirect and callback
const STATE_TTL_MINUTES: i64 = 10;

/// The signed-in user and their credential
#[derive(Clone)]
pub struct Session {
    pub id: Uuid,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
    access_token: String,
    board: Arc<ReviewBoard>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(identity: Identity, access_token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            expires_at: Utc::now() + ttl,
            access_token: access_token.into(),
            board: Arc::new(ReviewBoard::default()),
        }
    }

    /// Bearer token attached to every GitHub call made for this user
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Owner key for persisted review records
    pub fn owner(&self) -> &str {
        self.identity.owner()
    }

    pub fn board(&self) -> &ReviewBoard {
        &self.board
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-memory session table keyed by signed cookie values
pub struct SessionStore {
    mac: HmacSha256,
    ttl: Duration,
    sessions: RwLock<HashMap<Uuid, Session>>,
    oauth_states: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SessionStore {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_bytes())?,
            ttl,
            sessions: RwLock::new(HashMap::new()),
            oauth_states: Mutex::new(HashMap::new()),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session and return it with its signed cookie value
    pub fn create(&self, identity: Identity, access_token: String) -> (Session, String) {
        let session = Session::new(identity, access_token, self.ttl);
        let cookie = self.sign(&session.id);

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| !s.is_expired());
        sessions.insert(session.id, session.clone());

        info!(login = %session.identity.login, "Session created");

        (session, cookie)
    }

    /// Look up the session behind a cookie value. Tampered, unknown and
    /// expired cookies all resolve to `None`.
    pub fn resolve(&self, cookie: &str) -> Option<Session> {
        let id = self.verify(cookie)?;

        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()?;

        if session.is_expired() {
            debug!(session = %id, "Session expired");
            self.sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return None;
        }

        Some(session)
    }

    /// End the session behind a cookie value
    pub fn remove(&self, cookie: &str) -> bool {
        let Some(id) = self.verify(cookie) else {
            return false;
        };

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Issue a one-time OAuth `state` value
    pub fn issue_state(&self) -> String {
        let state = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let mut states = self.oauth_states.lock().unwrap_or_else(PoisonError::into_inner);
        states.retain(|_, issued| now - *issued < Duration::minutes(STATE_TTL_MINUTES));
        states.insert(state.clone(), now);

        state
    }

    /// Consume an OAuth `state` value; true only for a live, unused state
    pub fn take_state(&self, state: &str) -> bool {
        let mut states = self.oauth_states.lock().unwrap_or_else(PoisonError::into_inner);
        match states.remove(state) {
            Some(issued) => Utc::now() - issued < Duration::minutes(STATE_TTL_MINUTES),
            None => false,
        }
    }

    fn sign(&self, id: &Uuid) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        format!("{}.{}", id, hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, cookie: &str) -> Option<Uuid> {
        let (id, signature) = cookie.split_once('.')?;
        let id = Uuid::parse_str(id).ok()?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(id)
    }
}

/// `Set-Cookie` value carrying a session
pub fn session_cookie(value: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        value,
        ttl.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that clears the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::zero(), secure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            login: "octocat".to_string(),
            name: Some("The Octocat".to_string()),
            email: Some("octocat@example.com".to_string()),
        }
    }

    #[test]
    fn test_create_and_resolve() {
        let store = SessionStore::new("secret", Duration::hours(1)).unwrap();
        let (session, cookie) = store.create(identity(), "gho_token".to_string());

        let resolved = store.resolve(&cookie).unwrap();
        assert_eq!(resolved.id, session.id);
        assert_eq!(resolved.access_token(), "gho_token");
        assert_eq!(resolved.owner(), "octocat@example.com");
    }

    #[test]
    fn test_tampered_cookie_rejected() {
        let store = SessionStore::new("secret", Duration::hours(1)).unwrap();
        let (_, cookie) = store.create(identity(), "gho_token".to_string());

        let (id, _) = cookie.split_once('.').unwrap();
        assert!(store.resolve(&format!("{}.{}", id, "00".repeat(32))).is_none());
        assert!(store.resolve(id).is_none());
        assert!(store.resolve("garbage").is_none());

        let other = SessionStore::new("other-secret", Duration::hours(1)).unwrap();
        assert!(other.resolve(&cookie).is_none());
    }

    #[test]
    fn test_expired_session_not_resolved() {
        let store = SessionStore::new("secret", Duration::seconds(-1)).unwrap();
        let (_, cookie) = store.create(identity(), "gho_token".to_string());
        assert!(store.resolve(&cookie).is_none());
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new("secret", Duration::hours(1)).unwrap();
        let (_, cookie) = store.create(identity(), "gho_token".to_string());

        assert!(store.remove(&cookie));
        assert!(store.resolve(&cookie).is_none());
        assert!(!store.remove(&cookie));
    }

    #[test]
    fn test_oauth_state_is_single_use() {
        let store = SessionStore::new("secret", Duration::hours(1)).unwrap();
        let state = store.issue_state();

        assert!(store.take_state(&state));
        assert!(!store.take_state(&state));
        assert!(!store.take_state("never-issued"));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc.def", Duration::hours(1), true);
        assert!(cookie.starts_with("pr_review_session=abc.def;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));

        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }
}
