//! filebin - a small network file-sharing server.
//!
//! Clients log in, then upload, download, search and delete files. Deleted
//! files go to a recycle bin where they can be restored until the retention
//! sweeper purges them.

pub mod auth;
pub mod config;
pub mod error;
pub mod file;
pub mod logging;
pub mod server;
pub mod sweeper;

pub use auth::{
    hash_password, verify_password, Authenticator, CredentialTable, LimitResult, LoginLimiter,
    PasswordError, Session, SessionError, SessionRegistry,
};
pub use config::Config;
pub use error::{FilebinError, Result};
pub use file::{validate_filename, FileNameError, FileStore};
pub use server::{
    handle_connection, serve, ErrorKind, FileServer, Request, Response, ServerContext, SEPARATOR,
};
pub use sweeper::{start_retention_sweeper, RetentionSweeper};
