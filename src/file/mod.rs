//! File storage for filebin.
//!
//! This module provides:
//! - Filename validation
//! - Per-name locking
//! - Active storage and the recycle bin
//! - Length-delimited transfers

mod locks;
mod name;
mod recycle;
mod store;
mod transfer;

pub use locks::{NameGuard, NameLocks};
pub use name::{validate_filename, FileNameError, MAX_FILENAME_LENGTH, STAGING_DIR};
pub use recycle::RecycleIndex;
pub use store::{FileStore, DEFAULT_TRANSFER_TIMEOUT};
pub use transfer::{stream_exact, CHUNK_SIZE};
