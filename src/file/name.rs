//! Filename validation.
//!
//! Stored files live in flat directories, so a client-supplied name must be a
//! single plain path component before it is joined onto any storage path.

use thiserror::Error;

/// Maximum filename length in bytes.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Name of the staging subdirectory inside the active directory.
pub const STAGING_DIR: &str = ".staging";

/// Filename validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileNameError {
    /// Name is empty.
    #[error("filename cannot be empty")]
    Empty,

    /// Name is too long.
    #[error("filename must be at most {MAX_FILENAME_LENGTH} bytes")]
    TooLong,

    /// Name would escape the storage directory.
    #[error("filename must not contain path separators or refer to a parent directory")]
    Traversal,

    /// Name contains NUL or control characters.
    #[error("filename contains invalid characters")]
    InvalidChars,

    /// Name is used internally.
    #[error("filename is reserved")]
    Reserved,
}

/// Validate a client-supplied filename.
pub fn validate_filename(name: &str) -> Result<(), FileNameError> {
    if name.is_empty() {
        return Err(FileNameError::Empty);
    }
    if name.len() > MAX_FILENAME_LENGTH {
        return Err(FileNameError::TooLong);
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(FileNameError::Traversal);
    }
    if has_drive_prefix(name) {
        return Err(FileNameError::Traversal);
    }
    if name.chars().any(char::is_control) {
        return Err(FileNameError::InvalidChars);
    }
    if name == STAGING_DIR {
        return Err(FileNameError::Reserved);
    }
    Ok(())
}

/// `C:` style prefixes address another root on Windows.
fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
