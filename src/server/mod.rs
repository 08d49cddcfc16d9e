//! Network side of the file server.
//!
//! This module provides the TCP listener, the wire protocol, the
//! per-connection state machine and command dispatch.

mod connection;
mod dispatcher;
mod listener;
pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

pub use connection::{handle_connection, ConnectionState, ServerContext};
pub use dispatcher::{Dispatcher, Outcome};
pub use listener::{FileServer, Incoming};
pub use protocol::{
    BulkOutcome, Command, ErrorKind, ProtocolError, Request, Response, MAX_LINE_LENGTH, SEPARATOR,
};

use crate::Result;

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serve clients on `server` until the process stops.
///
/// Each client runs on its own task and keeps its slot until the connection
/// state machine returns.
pub async fn serve(server: FileServer, ctx: Arc<ServerContext>) -> Result<()> {
    loop {
        match server.next_client().await {
            Ok(mut incoming) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let peer = incoming.peer;
                    handle_connection(&mut incoming.stream, peer, ctx).await;
                });
            }
            Err(e) => {
                error!(
                    error = %e,
                    active = server.active_connections(),
                    "Failed to accept connection"
                );
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
