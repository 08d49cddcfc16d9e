//! Command dispatch.
//!
//! Checks the session token of each request, runs the matching file store
//! operation and turns the result into a [`Response`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::protocol::{BulkOutcome, Command, ErrorKind, Request, Response};
use crate::auth::SessionRegistry;
use crate::file::{stream_exact, validate_filename, FileStore};
use crate::FilebinError;

/// What the connection should do after a request.
#[derive(Debug)]
pub enum Outcome {
    /// Send the response and wait for the next request.
    Reply(Response),
    /// Send the response, then exactly `size` bytes from `file`.
    Stream {
        response: Response,
        file: File,
        size: u64,
    },
    /// Send the response and close the connection.
    Close(Response),
}

/// Routes authenticated requests to the file store.
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<FileStore>,
    registry: SessionRegistry,
    max_upload_bytes: u64,
    transfer_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<FileStore>,
        registry: SessionRegistry,
        max_upload_bytes: u64,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            max_upload_bytes,
            transfer_timeout,
        }
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Handle one request. `reader` supplies the payload of an upload.
    pub async fn dispatch<R>(&self, request: Request, connection_id: Uuid, reader: &mut R) -> Outcome
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let command = request.command();

        if let Request::Upload { size, .. } = &request {
            if *size > self.max_upload_bytes {
                warn!(size = size, max = self.max_upload_bytes, "Upload exceeds size limit");
                return Outcome::Close(Response::error(
                    ErrorKind::MalformedRequest,
                    format!("Upload of {size} bytes exceeds the {} byte limit.", self.max_upload_bytes),
                ));
            }
        }

        let session = match self.registry.validate(request.token(), connection_id).await {
            Ok(session) => session,
            Err(e) => {
                debug!(command = command.as_str(), error = %e, "Request rejected");
                if let Request::Upload { size, .. } = &request {
                    if let Err(e) = self.discard_payload(reader, *size).await {
                        return Outcome::Close(io_failure(e));
                    }
                }
                return Outcome::Reply(unauthenticated());
            }
        };

        debug!(
            username = %session.username,
            command = command.as_str(),
            "Dispatching request"
        );

        match request {
            Request::Upload { name, size, .. } => self.upload(&name, size, reader).await,
            Request::Download { name, .. } => self.download(&name).await,
            Request::Search { keyword, .. } => {
                Outcome::Reply(listing(self.store.list_active(&keyword).await))
            }
            Request::SearchRecycle { keyword, .. } => {
                Outcome::Reply(listing(self.store.list_recycled(&keyword).await))
            }
            Request::Delete { name, .. } => Outcome::Reply(self.delete(&name).await),
            Request::Restore { name, .. } => Outcome::Reply(self.restore(&name).await),
            Request::BulkDelete { names, .. } => {
                Outcome::Reply(self.bulk(Command::BulkDelete, &names).await)
            }
            Request::BulkRestore { names, .. } => {
                Outcome::Reply(self.bulk(Command::BulkRestore, &names).await)
            }
            Request::Logout { token } => {
                self.registry.remove(&token).await;
                Outcome::Close(Response::ok("Logged out."))
            }
        }
    }

    /// Read and drop an announced payload so the next line stays in sync.
    pub async fn discard_payload<R>(&self, reader: &mut R, size: u64) -> io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        stream_exact(reader, &mut tokio::io::sink(), size, self.transfer_timeout).await?;
        Ok(())
    }

    async fn upload<R>(&self, name: &str, size: u64, reader: &mut R) -> Outcome
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if let Err(e) = validate_filename(name) {
            warn!(file = %name, error = %e, "Upload rejected");
            if let Err(e) = self.discard_payload(reader, size).await {
                return Outcome::Close(io_failure(e));
            }
            return Outcome::Reply(Response::error(ErrorKind::MalformedRequest, e.to_string()));
        }

        match self.store.put(name, reader, size).await {
            Ok(_) => Outcome::Reply(Response::ok(format!("{name} uploaded successfully."))),
            Err(e) => {
                // Part of the payload may have been consumed; the stream is no
                // longer aligned on a request boundary.
                error!(file = %name, error = %e, "Upload failed");
                Outcome::Close(error_response(&e, name))
            }
        }
    }

    async fn download(&self, name: &str) -> Outcome {
        match self.store.open(name).await {
            Ok((file, size)) => Outcome::Stream {
                response: Response::Ok(vec![name.to_string(), size.to_string()]),
                file,
                size,
            },
            Err(FilebinError::NotFound(_)) => Outcome::Reply(Response::error(
                ErrorKind::NotFound,
                format!("File {name} not found."),
            )),
            Err(e) => Outcome::Reply(error_response(&e, name)),
        }
    }

    async fn delete(&self, name: &str) -> Response {
        match self.store.soft_delete(name).await {
            Ok(()) => Response::ok(format!("{name} moved to recycle bin.")),
            Err(FilebinError::NotFound(_)) => {
                Response::error(ErrorKind::NotFound, format!("File {name} not found."))
            }
            Err(e) => error_response(&e, name),
        }
    }

    async fn restore(&self, name: &str) -> Response {
        match self.store.restore(name).await {
            Ok(()) => Response::ok(format!("{name} restored.")),
            Err(FilebinError::NotFound(_)) => Response::error(
                ErrorKind::NotFound,
                format!("File {name} not found in recycle bin."),
            ),
            Err(e) => error_response(&e, name),
        }
    }

    /// Apply delete or restore to each name independently.
    async fn bulk(&self, command: Command, names: &[String]) -> Response {
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let result = match command {
                Command::BulkRestore => self.store.restore(name).await,
                _ => self.store.soft_delete(name).await,
            };
            if let Err(e) = &result {
                if e.kind() == ErrorKind::IoFailure {
                    error!(file = %name, error = %e, "Bulk operation failed");
                }
            }
            outcomes.push(BulkOutcome {
                name: name.clone(),
                error: result.err().map(|e| e.kind()),
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.error.is_none()).count();
        let summary = match command {
            Command::BulkRestore => format!("{succeeded} of {} files restored.", names.len()),
            _ => format!(
                "{succeeded} of {} files moved to recycle bin.",
                names.len()
            ),
        };

        let mut fields = vec![summary];
        fields.extend(outcomes.iter().map(BulkOutcome::encode));
        Response::Ok(fields)
    }
}

fn listing(result: crate::Result<Vec<String>>) -> Response {
    match result {
        Ok(names) => Response::Ok(names),
        Err(e) => {
            error!(error = %e, "Listing failed");
            Response::error(ErrorKind::IoFailure, "Could not list files.")
        }
    }
}

fn unauthenticated() -> Response {
    Response::error(ErrorKind::Unauthenticated, "Not authenticated.")
}

fn io_failure(e: io::Error) -> Response {
    Response::error(ErrorKind::IoFailure, e.to_string())
}

fn error_response(e: &FilebinError, name: &str) -> Response {
    let kind = e.kind();
    if kind == ErrorKind::IoFailure {
        error!(file = %name, error = %e, "File operation failed");
    }
    Response::error(kind, e.to_string())
}
