//! Credential table and the login flow built on top of it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};
use uuid::Uuid;

use super::password::{check_hash_format, hash_password, verify_password};
use super::session::{LimitResult, LoginLimiter, Session, SessionError, SessionRegistry};
use crate::config::{AuthConfig, UserEntry};
use crate::{FilebinError, Result};

/// Read-only map of username to Argon2 password hash.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    users: HashMap<String, String>,
}

impl CredentialTable {
    /// Build the table from configured users.
    ///
    /// Plaintext passwords are hashed here; pre-hashed entries must be valid
    /// PHC strings.
    pub fn from_entries(entries: &[UserEntry]) -> Result<Self> {
        let mut users = HashMap::with_capacity(entries.len());
        for entry in entries {
            let hash = match (&entry.password, &entry.password_hash) {
                (Some(password), None) => hash_password(password)?,
                (None, Some(hash)) => {
                    check_hash_format(hash)?;
                    hash.clone()
                }
                _ => {
                    return Err(FilebinError::Config(format!(
                        "user '{}' must set exactly one of password or password_hash",
                        entry.username
                    )))
                }
            };
            if users.insert(entry.username.clone(), hash).is_some() {
                return Err(FilebinError::Config(format!(
                    "duplicate user '{}'",
                    entry.username
                )));
            }
        }
        Ok(Self { users })
    }

    /// Check a username/password pair.
    pub fn verify(&self, username: &str, password: &str) -> Result<()> {
        let hash = self.users.get(username).ok_or(FilebinError::AuthFailed)?;
        verify_password(password, hash).map_err(|_| FilebinError::AuthFailed)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Verifies credentials, throttles repeated failures and issues sessions.
#[derive(Debug)]
pub struct Authenticator {
    credentials: Arc<CredentialTable>,
    limiter: Mutex<LoginLimiter>,
    registry: SessionRegistry,
}

impl Authenticator {
    pub fn new(credentials: CredentialTable, registry: SessionRegistry, config: &AuthConfig) -> Self {
        Self {
            credentials: Arc::new(credentials),
            limiter: Mutex::new(LoginLimiter::with_config(
                config.max_login_attempts,
                config.lockout_secs,
                config.lockout_secs,
            )),
            registry,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Attempt a login for `connection_id`, returning the new session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        connection_id: Uuid,
        peer_addr: SocketAddr,
    ) -> std::result::Result<Session, SessionError> {
        if let LimitResult::Locked(remaining) = self.with_limiter(|l| l.check(username)) {
            warn!(
                username = %username,
                peer = %peer_addr,
                remaining_secs = remaining.as_secs(),
                "Login attempt blocked: account locked"
            );
            return Err(SessionError::AccountLocked(remaining.as_secs()));
        }

        // Argon2 verification is CPU bound; keep it off the async workers.
        let credentials = Arc::clone(&self.credentials);
        let user = username.to_string();
        let pass = password.to_string();
        let verified = match tokio::task::spawn_blocking(move || credentials.verify(&user, &pass))
            .await
        {
            Ok(result) => result.is_ok(),
            Err(e) => {
                error!(error = %e, "Password verification task failed");
                false
            }
        };

        if !verified {
            self.with_limiter(|l| l.record_failure(username));
            warn!(username = %username, peer = %peer_addr, "Login failed");
            return Err(SessionError::InvalidCredentials);
        }

        self.with_limiter(|l| l.clear(username));
        let session = self.registry.create(username, connection_id, peer_addr).await;
        info!(username = %username, peer = %peer_addr, "Login successful");
        Ok(session)
    }

    fn with_limiter<T>(&self, f: impl FnOnce(&mut LoginLimiter) -> T) -> T {
        let mut limiter = self.limiter.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut limiter)
    }
}
