//! Authentication: credential checks, login throttling and session tokens.

mod credentials;
mod password;
mod session;

pub use credentials::{Authenticator, CredentialTable};
pub use password::{hash_password, verify_password, PasswordError, MAX_PASSWORD_LENGTH};
pub use session::{LimitResult, LoginLimiter, Session, SessionError, SessionRegistry};
