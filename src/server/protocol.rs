//! Wire format.
//!
//! Every text message is one UTF-8 line ending in `\n`, with fields joined by
//! [`SEPARATOR`]. Raw file bytes follow an `UPLOAD` request line and a
//! successful `DOWNLOAD` response line; their length is always announced in
//! the preceding line.
//!
//! ```text
//! C: alice<SEPARATOR>1234
//! S: AUTH_SUCCESS<SEPARATOR>6f1c...
//! C: UPLOAD<SEPARATOR>6f1c...<SEPARATOR>notes.txt<SEPARATOR>5
//! C: hello
//! S: OK<SEPARATOR>notes.txt uploaded successfully.
//! ```

use std::fmt;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Field separator.
pub const SEPARATOR: &str = "<SEPARATOR>";

/// Longest accepted line, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Error categories reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthFailed,
    Unauthenticated,
    NotFound,
    MalformedRequest,
    IoFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthFailed => "AUTH_FAILED",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::MalformedRequest => "MALFORMED_REQUEST",
            ErrorKind::IoFailure => "IO_FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTH_FAILED" => Some(ErrorKind::AuthFailed),
            "UNAUTHENTICATED" => Some(ErrorKind::Unauthenticated),
            "NOT_FOUND" => Some(ErrorKind::NotFound),
            "MALFORMED_REQUEST" => Some(ErrorKind::MalformedRequest),
            "IO_FAILURE" => Some(ErrorKind::IoFailure),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Upload,
    Download,
    Search,
    Delete,
    Restore,
    SearchRecycle,
    BulkDelete,
    BulkRestore,
    Logout,
}

impl Command {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPLOAD" => Some(Command::Upload),
            "DOWNLOAD" => Some(Command::Download),
            "SEARCH" => Some(Command::Search),
            "DELETE" => Some(Command::Delete),
            "RESTORE" => Some(Command::Restore),
            "SEARCH_RECYCLE" => Some(Command::SearchRecycle),
            "BULK_DELETE" => Some(Command::BulkDelete),
            "BULK_RESTORE" => Some(Command::BulkRestore),
            "LOGOUT" => Some(Command::Logout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Upload => "UPLOAD",
            Command::Download => "DOWNLOAD",
            Command::Search => "SEARCH",
            Command::Delete => "DELETE",
            Command::Restore => "RESTORE",
            Command::SearchRecycle => "SEARCH_RECYCLE",
            Command::BulkDelete => "BULK_DELETE",
            Command::BulkRestore => "BULK_RESTORE",
            Command::Logout => "LOGOUT",
        }
    }
}

/// Request line parse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{0} is missing {1}")]
    MissingField(&'static str, &'static str),

    #[error("{0} takes no more than {1} arguments")]
    TooManyFields(&'static str, usize),

    /// Upload size is not a non-negative integer; the payload length is unknown.
    #[error("invalid upload size '{0}'")]
    InvalidSize(String),

    #[error("expected username and password")]
    InvalidLogin,
}

/// An authenticated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Upload { token: String, name: String, size: u64 },
    Download { token: String, name: String },
    Search { token: String, keyword: String },
    SearchRecycle { token: String, keyword: String },
    Delete { token: String, name: String },
    Restore { token: String, name: String },
    BulkDelete { token: String, names: Vec<String> },
    BulkRestore { token: String, names: Vec<String> },
    Logout { token: String },
}

impl Request {
    /// Parse a command line.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields = line.split(SEPARATOR);
        let keyword = fields.next().unwrap_or_default();
        let command = Command::parse(keyword)
            .ok_or_else(|| ProtocolError::UnknownCommand(keyword.to_string()))?;
        let cmd = command.as_str();

        let token = fields
            .next()
            .filter(|t| !t.is_empty())
            .ok_or(ProtocolError::MissingField(cmd, "a session token"))?
            .to_string();
        let args: Vec<&str> = fields.collect();

        let request = match command {
            Command::Upload => {
                let (name, size) = match args.as_slice() {
                    [name, size] => (*name, *size),
                    [_] | [] => return Err(ProtocolError::MissingField(cmd, "filename and size")),
                    _ => return Err(ProtocolError::TooManyFields(cmd, 2)),
                };
                let size = size
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::InvalidSize(size.to_string()))?;
                Request::Upload {
                    token,
                    name: name.to_string(),
                    size,
                }
            }
            Command::Download | Command::Delete | Command::Restore => {
                let name = single_arg(cmd, &args)?
                    .ok_or(ProtocolError::MissingField(cmd, "a filename"))?;
                match command {
                    Command::Download => Request::Download { token, name },
                    Command::Delete => Request::Delete { token, name },
                    _ => Request::Restore { token, name },
                }
            }
            Command::Search | Command::SearchRecycle => {
                let keyword = single_arg(cmd, &args)?.unwrap_or_default();
                if command == Command::Search {
                    Request::Search { token, keyword }
                } else {
                    Request::SearchRecycle { token, keyword }
                }
            }
            Command::BulkDelete | Command::BulkRestore => {
                let names: Vec<String> = args
                    .iter()
                    .filter(|n| !n.is_empty())
                    .map(|n| n.to_string())
                    .collect();
                if names.is_empty() {
                    return Err(ProtocolError::MissingField(cmd, "filenames"));
                }
                if command == Command::BulkDelete {
                    Request::BulkDelete { token, names }
                } else {
                    Request::BulkRestore { token, names }
                }
            }
            Command::Logout => {
                if !args.is_empty() {
                    return Err(ProtocolError::TooManyFields(cmd, 0));
                }
                Request::Logout { token }
            }
        };

        Ok(request)
    }

    pub fn command(&self) -> Command {
        match self {
            Request::Upload { .. } => Command::Upload,
            Request::Download { .. } => Command::Download,
            Request::Search { .. } => Command::Search,
            Request::SearchRecycle { .. } => Command::SearchRecycle,
            Request::Delete { .. } => Command::Delete,
            Request::Restore { .. } => Command::Restore,
            Request::BulkDelete { .. } => Command::BulkDelete,
            Request::BulkRestore { .. } => Command::BulkRestore,
            Request::Logout { .. } => Command::Logout,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Request::Upload { token, .. }
            | Request::Download { token, .. }
            | Request::Search { token, .. }
            | Request::SearchRecycle { token, .. }
            | Request::Delete { token, .. }
            | Request::Restore { token, .. }
            | Request::BulkDelete { token, .. }
            | Request::BulkRestore { token, .. }
            | Request::Logout { token } => token,
        }
    }
}

fn single_arg(cmd: &'static str, args: &[&str]) -> Result<Option<String>, ProtocolError> {
    match args {
        [] => Ok(None),
        [arg] if arg.is_empty() => Ok(None),
        [arg] => Ok(Some(arg.to_string())),
        _ => Err(ProtocolError::TooManyFields(cmd, 1)),
    }
}

/// Whether a line starts with a command keyword rather than a username.
pub fn is_command_line(line: &str) -> bool {
    let keyword = line.split(SEPARATOR).next().unwrap_or_default();
    Command::parse(keyword).is_some()
}

/// Parse a `username SEP password` login line.
pub fn parse_login(line: &str) -> Result<(String, String), ProtocolError> {
    let fields: Vec<&str> = line.split(SEPARATOR).collect();
    match fields.as_slice() {
        [username, password] if !username.is_empty() => {
            Ok((username.to_string(), password.to_string()))
        }
        _ => Err(ProtocolError::InvalidLogin),
    }
}

/// A server reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    AuthSuccess(String),
    AuthFailed,
    Ok(Vec<String>),
    Error { kind: ErrorKind, message: String },
}

impl Response {
    /// Single-field success.
    pub fn ok(message: impl Into<String>) -> Self {
        Response::Ok(vec![message.into()])
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_) | Response::AuthSuccess(_))
    }

    /// Encode as a newline-terminated line.
    pub fn to_line(&self) -> String {
        let mut line = match self {
            Response::AuthSuccess(token) => format!("AUTH_SUCCESS{SEPARATOR}{token}"),
            Response::AuthFailed => ErrorKind::AuthFailed.as_str().to_string(),
            Response::Ok(fields) => {
                let fields: Vec<String> = fields.iter().map(|f| single_line(f)).collect();
                format!("OK{SEPARATOR}{}", fields.join(SEPARATOR))
            }
            Response::Error { kind, message } => {
                format!("ERROR{SEPARATOR}{kind}{SEPARATOR}{}", single_line(message))
            }
        };
        line.push('\n');
        line
    }

    /// Decode a reply line (without its terminator).
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == ErrorKind::AuthFailed.as_str() {
            return Some(Response::AuthFailed);
        }

        let (head, rest) = line.split_once(SEPARATOR)?;
        match head {
            "AUTH_SUCCESS" => Some(Response::AuthSuccess(rest.to_string())),
            "OK" if rest.is_empty() => Some(Response::Ok(Vec::new())),
            "OK" => Some(Response::Ok(
                rest.split(SEPARATOR).map(str::to_string).collect(),
            )),
            "ERROR" => {
                let (kind, message) = rest.split_once(SEPARATOR).unwrap_or((rest, ""));
                Some(Response::Error {
                    kind: ErrorKind::parse(kind)?,
                    message: message.to_string(),
                })
            }
            _ => None,
        }
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

/// Per-name result of a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub name: String,
    pub error: Option<ErrorKind>,
}

impl BulkOutcome {
    /// Encode as `name:OK` or `name:KIND`.
    pub fn encode(&self) -> String {
        let status = self.error.map_or("OK", |kind| kind.as_str());
        format!("{}:{status}", self.name)
    }

    /// Decode a `name:STATUS` field; the name itself may contain colons.
    pub fn decode(field: &str) -> Option<Self> {
        let (name, status) = field.rsplit_once(':')?;
        let error = match status {
            "OK" => None,
            other => Some(ErrorKind::parse(other)?),
        };
        Some(Self {
            name: name.to_string(),
            error,
        })
    }
}

/// Line read failures.
#[derive(Error, Debug)]
pub enum LineError {
    #[error("line exceeds {MAX_LINE_LENGTH} bytes")]
    TooLong,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Read one line, stripping `\n` and a trailing `\r`.
///
/// Returns `Ok(None)` at end of stream. A final line without a terminator is
/// treated as end of stream.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, LineError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    let limit = MAX_LINE_LENGTH as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() > MAX_LINE_LENGTH {
            return Err(LineError::TooLong);
        }
        return Ok(None);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > MAX_LINE_LENGTH {
        return Err(LineError::TooLong);
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| LineError::InvalidUtf8)
}
