//! Session tokens and login attempt limiting.
//!
//! A session binds an opaque token to the connection that authenticated it.
//! Tokens are only honored on their owning connection and disappear when that
//! connection closes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Session-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Invalid credentials (unknown username or wrong password).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Username is locked due to too many failed attempts.
    #[error("account locked for {0} seconds")]
    AccountLocked(u64),

    /// Token is not registered.
    #[error("session not found")]
    SessionNotFound,

    /// Token belongs to a different connection.
    #[error("session belongs to another connection")]
    ForeignConnection,
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque session token (UUID v4).
    pub token: String,
    /// Authenticated username.
    pub username: String,
    /// Connection that created and owns this session.
    pub connection_id: Uuid,
    /// Remote peer address of the owning connection.
    pub peer_addr: SocketAddr,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(username: &str, connection_id: Uuid, peer_addr: SocketAddr) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            username: username.to_string(),
            connection_id,
            peer_addr,
            created_at: Utc::now(),
        }
    }
}

/// Shared map of live session tokens.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `username` owned by `connection_id`.
    pub async fn create(
        &self,
        username: &str,
        connection_id: Uuid,
        peer_addr: SocketAddr,
    ) -> Session {
        let session = Session::new(username, connection_id, peer_addr);
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        debug!(
            username = %username,
            connection = %connection_id,
            "Session created"
        );
        session
    }

    /// Resolve a token presented on `connection_id`.
    pub async fn validate(&self, token: &str, connection_id: Uuid) -> Result<Session, SessionError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(token).ok_or(SessionError::SessionNotFound)?;
        if session.connection_id != connection_id {
            return Err(SessionError::ForeignConnection);
        }
        Ok(session.clone())
    }

    /// Remove a single token.
    pub async fn remove(&self, token: &str) -> Option<Session> {
        let removed = self.sessions.write().await.remove(token);
        if let Some(session) = &removed {
            info!(
                username = %session.username,
                connection = %session.connection_id,
                "Session logged out"
            );
        }
        removed
    }

    /// Remove every token owned by a connection, returning how many were dropped.
    pub async fn remove_connection(&self, connection_id: Uuid) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.connection_id != connection_id);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(connection = %connection_id, count = removed, "Sessions removed");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Result of a login attempt rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitResult {
    /// Login attempt is allowed.
    Allowed,
    /// Username is locked for the specified duration.
    Locked(Duration),
}

/// Login attempt rate limiter.
///
/// Tracks failed login attempts per username (case-insensitive) and enforces
/// a lockout after too many failures inside the counting window.
#[derive(Debug)]
pub struct LoginLimiter {
    attempts: HashMap<String, Vec<Instant>>,
    max_attempts: u32,
    window: Duration,
    lockout: Duration,
    last_cleanup: Instant,
}

impl LoginLimiter {
    /// Create a limiter with the given limits.
    pub fn with_config(max_attempts: u32, window_secs: u64, lockout_secs: u64) -> Self {
        Self {
            attempts: HashMap::new(),
            max_attempts,
            window: Duration::from_secs(window_secs),
            lockout: Duration::from_secs(lockout_secs),
            last_cleanup: Instant::now(),
        }
    }

    /// Check if a login attempt is allowed for the given username.
    ///
    /// Usernames without recorded failures are not added to the table.
    pub fn check(&mut self, username: &str) -> LimitResult {
        let now = Instant::now();
        let window = self.window;
        let key = username.to_lowercase();
        let Some(attempts) = self.attempts.get_mut(&key) else {
            return LimitResult::Allowed;
        };

        attempts.retain(|t| now.duration_since(*t) < window);

        if attempts.len() >= self.max_attempts as usize {
            if let Some(oldest) = attempts.first() {
                let elapsed = now.duration_since(*oldest);
                if elapsed < self.lockout {
                    return LimitResult::Locked(self.lockout - elapsed);
                }
                attempts.clear();
            }
        }

        if attempts.is_empty() {
            self.attempts.remove(&key);
        }
        LimitResult::Allowed
    }

    /// Record a failed login attempt.
    ///
    /// Expired usernames are swept at most once per window, so the table only
    /// holds names that failed recently.
    pub fn record_failure(&mut self, username: &str) {
        let now = Instant::now();
        if now.duration_since(self.last_cleanup) >= self.window {
            self.cleanup();
        }

        let window = self.window;
        let attempts = self.attempts.entry(username.to_lowercase()).or_default();

        attempts.retain(|t| now.duration_since(*t) < window);
        attempts.push(now);

        debug!(
            username = %username,
            attempt_count = attempts.len(),
            "Recorded failed login attempt"
        );
    }

    /// Forget all failures for a username (called on successful login).
    pub fn clear(&mut self, username: &str) {
        self.attempts.remove(&username.to_lowercase());
    }

    /// Number of failures currently counted for a username.
    pub fn attempt_count(&mut self, username: &str) -> usize {
        let now = Instant::now();
        let window = self.window;
        match self.attempts.get_mut(&username.to_lowercase()) {
            Some(attempts) => {
                attempts.retain(|t| now.duration_since(*t) < window);
                attempts.len()
            }
            None => 0,
        }
    }

    /// Drop usernames with no failures left in the window.
    pub fn cleanup(&mut self) {
        let now = Instant::now();
        let window = self.window;
        let before = self.attempts.len();
        self.attempts.retain(|_, attempts| {
            attempts.retain(|t| now.duration_since(*t) < window);
            !attempts.is_empty()
        });
        self.last_cleanup = now;

        let removed = before - self.attempts.len();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired login failures");
        }
    }

    /// Number of usernames with failures on record.
    pub fn tracked_users(&self) -> usize {
        self.attempts.len()
    }
}
