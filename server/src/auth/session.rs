//! Session management
//!
//! This module provides in-memory session storage for authenticated users,
//! the short-lived records that carry OAuth state between the sign-in redirect
//! and the callback, and the HMAC signature protecting the session cookie.

use super::User;
use crate::config::MAX_SESSION_TTL_SECS;
use anyhow::Result;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// How long a sign-in attempt may take before its state is discarded
const PENDING_LOGIN_TTL_SECS: i64 = 10 * 60;

/// Represents an active session
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// Authenticated user
    pub user: User,
    /// Discord access token
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// OAuth state kept between the sign-in redirect and the callback
#[derive(Debug, Clone)]
pub struct PendingLogin {
    /// CSRF state sent to Discord
    pub state: String,
    pub pkce_verifier: String,
    /// Redirect URI used for the authorization request
    pub redirect_uri: String,
    /// Where to send the user after signing in
    pub callback_url: String,
    pub created_at: DateTime<Utc>,
}

impl PendingLogin {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Duration::seconds(PENDING_LOGIN_TTL_SECS)
    }
}

/// Session manager
///
/// This is a simple in-memory store; sessions do not survive a restart.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    pending: Arc<Mutex<HashMap<String, PendingLogin>>>,
    signing_key: Vec<u8>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(signing_secret: &str, ttl_secs: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            signing_key: signing_secret.as_bytes().to_vec(),
            ttl: Duration::seconds(ttl_secs.clamp(0, MAX_SESSION_TTL_SECS)),
        }
    }

    /// Create a new session for an authenticated user
    pub fn create_session(&self, user: User, access_token: String) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user,
            access_token,
            expires_at: Utc::now() + self.ttl,
        };

        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| anyhow::anyhow!("Failed to acquire session lock: {}", e))?;
        sessions.insert(session.id.clone(), session.clone());

        Ok(session)
    }

    /// Get a live session by its ID
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let now = Utc::now();
        let session = {
            let sessions = self
                .sessions
                .read()
                .map_err(|e| anyhow::anyhow!("Failed to acquire session lock: {}", e))?;
            sessions.get(session_id).cloned()
        };

        match session {
            Some(session) if session.is_expired(now) => {
                self.delete_session(session_id)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Delete a specific session (logout)
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| anyhow::anyhow!("Failed to acquire session lock: {}", e))?;
        sessions.remove(session_id);
        Ok(())
    }

    /// Get count of stored sessions
    pub fn session_count(&self) -> Result<usize> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| anyhow::anyhow!("Failed to acquire session lock: {}", e))?;

        Ok(sessions.len())
    }

    /// Drop expired sessions and abandoned sign-in attempts
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();

        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| anyhow::anyhow!("Failed to acquire session lock: {}", e))?;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        let removed = before - sessions.len();
        drop(sessions);

        let mut pending = self
            .pending
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire pending login lock: {}", e))?;
        pending.retain(|_, login| !login.is_expired(now));

        Ok(removed)
    }

    /// Remember a sign-in attempt until its callback arrives
    pub fn store_pending_login(&self, login: PendingLogin) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire pending login lock: {}", e))?;
        pending.insert(login.state.clone(), login);
        Ok(())
    }

    /// Consume the sign-in attempt for `state`. Each state is usable once.
    pub fn take_pending_login(&self, state: &str) -> Result<Option<PendingLogin>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire pending login lock: {}", e))?;

        Ok(pending
            .remove(state)
            .filter(|login| !login.is_expired(Utc::now())))
    }

    /// Cookie value for a session: `<id>.<base64url hmac(id)>`
    pub fn cookie_value(&self, session_id: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| anyhow::anyhow!("Invalid session signing key: {}", e))?;
        mac.update(session_id.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", session_id, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Return the session id of a cookie whose signature checks out
    pub fn verify_cookie_value(&self, value: &str) -> Option<String> {
        let (session_id, signature) = value.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.signing_key).ok()?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(session_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new("test-secret", 3600)
    }

    fn pending(state: &str, created_at: DateTime<Utc>) -> PendingLogin {
        PendingLogin {
            state: state.to_string(),
            pkce_verifier: "verifier".to_string(),
            redirect_uri: "http://localhost:8000/auth/callback/discord".to_string(),
            callback_url: "/".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_create_and_get_session() {
        let manager = manager();
        let user = User::new("Alice", "123");

        let session = manager.create_session(user, "token123".to_string()).unwrap();

        let stored = manager.get_session(&session.id).unwrap();
        assert!(stored.is_some());

        let stored = stored.unwrap();
        assert_eq!(stored.user.provider_id, "123");
        assert_eq!(stored.access_token, "token123");
    }

    #[test]
    fn test_multiple_concurrent_sessions() {
        let manager = manager();

        let first = manager
            .create_session(User::new("Alice", "1"), "token1".to_string())
            .unwrap();
        let second = manager
            .create_session(User::new("Bob", "2"), "token2".to_string())
            .unwrap();

        assert_eq!(
            manager.get_session(&first.id).unwrap().unwrap().user.name,
            "Alice"
        );
        assert_eq!(
            manager.get_session(&second.id).unwrap().unwrap().user.name,
            "Bob"
        );
        assert_eq!(manager.session_count().unwrap(), 2);
    }

    #[test]
    fn test_delete_session() {
        let manager = manager();
        let first = manager
            .create_session(User::new("Alice", "1"), "token1".to_string())
            .unwrap();
        let second = manager
            .create_session(User::new("Bob", "2"), "token2".to_string())
            .unwrap();

        manager.delete_session(&first.id).unwrap();

        assert!(manager.get_session(&first.id).unwrap().is_none());
        assert!(manager.get_session(&second.id).unwrap().is_some());
        assert_eq!(manager.session_count().unwrap(), 1);
    }

    #[test]
    fn test_expired_session_is_dropped() {
        let manager = SessionManager::new("test-secret", 0);
        let session = manager
            .create_session(User::new("Alice", "1"), "token".to_string())
            .unwrap();

        assert!(manager.get_session(&session.id).unwrap().is_none());
        assert_eq!(manager.session_count().unwrap(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let manager = SessionManager::new("test-secret", 0);
        manager
            .create_session(User::new("Alice", "1"), "token".to_string())
            .unwrap();

        assert_eq!(manager.purge_expired().unwrap(), 1);
        assert_eq!(manager.session_count().unwrap(), 0);
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let manager = SessionManager::new("test-secret", i64::MAX);
        let session = manager
            .create_session(User::new("Alice", "1"), "token".to_string())
            .unwrap();

        assert!(session.expires_at <= Utc::now() + Duration::seconds(MAX_SESSION_TTL_SECS));
        assert!(manager.get_session(&session.id).unwrap().is_some());
    }

    #[test]
    fn test_invalid_session_id() {
        let manager = manager();
        manager
            .create_session(User::new("Alice", "1"), "token".to_string())
            .unwrap();

        assert!(manager.get_session("invalid-id").unwrap().is_none());
    }

    #[test]
    fn test_pending_login_single_use() {
        let manager = manager();
        manager
            .store_pending_login(pending("state-1", Utc::now()))
            .unwrap();

        let login = manager.take_pending_login("state-1").unwrap();
        assert_eq!(login.unwrap().pkce_verifier, "verifier");
        assert!(manager.take_pending_login("state-1").unwrap().is_none());
    }

    #[test]
    fn test_pending_login_expires() {
        let manager = manager();
        let stale = Utc::now() - Duration::seconds(PENDING_LOGIN_TTL_SECS + 1);
        manager.store_pending_login(pending("old", stale)).unwrap();

        assert!(manager.take_pending_login("old").unwrap().is_none());
    }

    #[test]
    fn test_cookie_signature_round_trip() {
        let manager = manager();
        let value = manager.cookie_value("abc-123").unwrap();
        assert!(value.starts_with("abc-123."));
        assert_eq!(manager.verify_cookie_value(&value), Some("abc-123".to_string()));
    }

    #[test]
    fn test_tampered_cookie_rejected() {
        let manager = manager();
        let value = manager.cookie_value("abc-123").unwrap();
        let forged = value.replacen("abc-123", "abc-124", 1);

        assert_eq!(manager.verify_cookie_value(&forged), None);
        assert_eq!(manager.verify_cookie_value("abc-123"), None);

        let other = SessionManager::new("other-secret", 3600);
        assert_eq!(other.verify_cookie_value(&value), None);
    }
}
