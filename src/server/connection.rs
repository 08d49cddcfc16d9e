//! Per-connection state machine.
//!
//! A connection starts unauthenticated and accepts exactly one login line.
//! After a successful login it serves requests one at a time until the client
//! logs out, disconnects, goes idle or the stream breaks. Sessions created by
//! the connection are dropped when it ends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dispatcher::{Dispatcher, Outcome};
use super::protocol::{
    is_command_line, parse_login, read_line, ErrorKind, LineError, ProtocolError, Request,
    Response,
};
use crate::auth::{Authenticator, SessionError};
use crate::config::Config;
use crate::file::{stream_exact, FileStore, CHUNK_SIZE};
use crate::{FilebinError, Result};

/// Connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingAuth,
    Authenticated,
    Closed,
}

/// Shared services and limits handed to every connection.
#[derive(Debug)]
pub struct ServerContext {
    pub authenticator: Authenticator,
    pub dispatcher: Dispatcher,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl ServerContext {
    pub fn new(config: &Config, authenticator: Authenticator, store: Arc<FileStore>) -> Self {
        let dispatcher = Dispatcher::new(
            store,
            authenticator.registry().clone(),
            config.storage.max_upload_bytes(),
            config.server.transfer_timeout(),
        );
        Self {
            authenticator,
            dispatcher,
            read_timeout: config.server.read_timeout(),
            idle_timeout: config.server.idle_timeout(),
            transfer_timeout: config.server.transfer_timeout(),
        }
    }
}

/// Serve one client until the connection closes.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connection = Connection::new(stream, peer, ctx);
    connection.run().await;
}

struct Connection<S> {
    id: Uuid,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    reader: BufReader<tokio::io::ReadHalf<S>>,
    writer: BufWriter<tokio::io::WriteHalf<S>>,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(stream: S, peer: SocketAddr, ctx: Arc<ServerContext>) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            id: Uuid::new_v4(),
            peer,
            ctx,
            reader: BufReader::with_capacity(CHUNK_SIZE, read_half),
            writer: BufWriter::with_capacity(CHUNK_SIZE, write_half),
            state: ConnectionState::AwaitingAuth,
        }
    }

    async fn run(mut self) {
        info!(peer = %self.peer, connection = %self.id, "Client connected");

        if let Err(e) = self.serve().await {
            warn!(peer = %self.peer, error = %e, "Connection error");
        }
        self.state = ConnectionState::Closed;

        let _ = self.writer.shutdown().await;
        let dropped = self.ctx.authenticator.registry().remove_connection(self.id).await;
        info!(
            peer = %self.peer,
            connection = %self.id,
            sessions = dropped,
            "Client disconnected"
        );
    }

    async fn serve(&mut self) -> Result<()> {
        while self.state != ConnectionState::Closed {
            let wait = match self.state {
                ConnectionState::AwaitingAuth => self.ctx.read_timeout,
                _ => self.ctx.idle_timeout,
            };

            let line = match timeout(wait, read_line(&mut self.reader)).await {
                Err(_) => {
                    info!(peer = %self.peer, state = ?self.state, "Connection timed out");
                    return Ok(());
                }
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(LineError::InvalidUtf8)) => {
                    self.send(&Response::error(
                        ErrorKind::MalformedRequest,
                        "Request is not valid UTF-8.",
                    ))
                    .await?;
                    continue;
                }
                Ok(Err(LineError::TooLong)) => {
                    warn!(peer = %self.peer, "Request line too long");
                    self.send(&Response::error(
                        ErrorKind::MalformedRequest,
                        LineError::TooLong.to_string(),
                    ))
                    .await?;
                    return Ok(());
                }
                Ok(Err(LineError::Io(e))) => return Err(e.into()),
            };

            match self.state {
                ConnectionState::AwaitingAuth => self.handle_login(&line).await?,
                ConnectionState::Authenticated => self.handle_request(&line).await?,
                ConnectionState::Closed => {}
            }
        }
        Ok(())
    }

    async fn handle_login(&mut self, line: &str) -> Result<()> {
        if is_command_line(line) {
            debug!(peer = %self.peer, "Command before login");
            // An upload announces a payload that must be consumed either way.
            if let Ok(Request::Upload { size, .. }) = Request::parse(line) {
                if size > self.ctx.dispatcher.max_upload_bytes() {
                    self.close_with(unauthenticated()).await?;
                    return Ok(());
                }
                self.ctx
                    .dispatcher
                    .discard_payload(&mut self.reader, size)
                    .await?;
            }
            return self.send(&unauthenticated()).await;
        }

        let (username, password) = match parse_login(line) {
            Ok(credentials) => credentials,
            Err(e) => {
                return self
                    .send(&Response::error(ErrorKind::MalformedRequest, e.to_string()))
                    .await
            }
        };

        match self
            .ctx
            .authenticator
            .login(&username, &password, self.id, self.peer)
            .await
        {
            Ok(session) => {
                self.state = ConnectionState::Authenticated;
                self.send(&Response::AuthSuccess(session.token)).await
            }
            Err(SessionError::AccountLocked(secs)) => {
                debug!(peer = %self.peer, locked_secs = secs, "Login refused");
                self.close_with(Response::AuthFailed).await
            }
            Err(_) => self.close_with(Response::AuthFailed).await,
        }
    }

    async fn handle_request(&mut self, line: &str) -> Result<()> {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(e @ ProtocolError::InvalidSize(_)) => {
                // Payload length unknown; the stream cannot be resynchronized.
                warn!(peer = %self.peer, error = %e, "Unreadable upload header");
                return self
                    .close_with(Response::error(ErrorKind::MalformedRequest, e.to_string()))
                    .await;
            }
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Malformed request");
                return self
                    .send(&Response::error(ErrorKind::MalformedRequest, e.to_string()))
                    .await;
            }
        };

        let outcome = self
            .ctx
            .dispatcher
            .dispatch(request, self.id, &mut self.reader)
            .await;

        match outcome {
            Outcome::Reply(response) => self.send(&response).await,
            Outcome::Close(response) => self.close_with(response).await,
            Outcome::Stream {
                response,
                mut file,
                size,
            } => {
                self.send(&response).await?;
                stream_exact(&mut file, &mut self.writer, size, self.ctx.transfer_timeout)
                    .await
                    .map_err(FilebinError::Io)?;
                Ok(())
            }
        }
    }

    async fn close_with(&mut self, response: Response) -> Result<()> {
        self.state = ConnectionState::Closed;
        self.send(&response).await
    }

    async fn send(&mut self, response: &Response) -> Result<()> {
        let line = response.to_line();
        let wait = self.ctx.transfer_timeout;
        let writer = &mut self.writer;
        let write = async move {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        match timeout(wait, write).await {
            Ok(result) => result.map_err(FilebinError::Io),
            Err(_) => Err(FilebinError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "response write timed out",
            ))),
        }
    }
}

fn unauthenticated() -> Response {
    Response::error(ErrorKind::Unauthenticated, "Log in first.")
}
