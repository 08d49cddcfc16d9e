//! Test helpers for integration tests.
//!
//! Provides TestServer, which runs a real server on an ephemeral port backed
//! by temporary directories, and TestClient, which speaks the line protocol.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use filebin::config::UserEntry;
use filebin::server::BulkOutcome;
use filebin::{
    serve, Authenticator, Config, CredentialTable, ErrorKind, FileServer, FileStore, Response,
    ServerContext, SessionRegistry, SEPARATOR,
};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "1234";

/// A running server with its own storage directories.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<FileStore>,
    pub ctx: Arc<ServerContext>,
    temp_dir: TempDir,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with default settings and a single user.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start a server after letting the caller adjust the configuration.
    pub async fn start_with(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.transfer_timeout_secs = 5;
        config.storage.active_dir = temp_dir.path().join("server_files").display().to_string();
        config.storage.recycle_dir = temp_dir.path().join("recycle_bin").display().to_string();
        config.users = vec![UserEntry {
            username: USERNAME.to_string(),
            password: Some(PASSWORD.to_string()),
            password_hash: None,
        }];
        adjust(&mut config);
        config.validate().expect("valid test config");

        let store = Arc::new(
            FileStore::new(&config.storage.active_dir, &config.storage.recycle_dir)
                .await
                .expect("open store")
                .with_transfer_timeout(config.server.transfer_timeout()),
        );
        let credentials = CredentialTable::from_entries(&config.users).expect("credentials");
        let authenticator = Authenticator::new(credentials, SessionRegistry::new(), &config.auth);
        let ctx = Arc::new(ServerContext::new(&config, authenticator, Arc::clone(&store)));

        let server = FileServer::bind(&config.server).await.expect("bind");
        let addr = server.local_addr().expect("local addr");
        let serve_ctx = Arc::clone(&ctx);
        let handle = tokio::spawn(async move {
            let _ = serve(server, serve_ctx).await;
        });

        Self {
            addr,
            store,
            ctx,
            temp_dir,
            handle,
        }
    }

    pub fn active_dir(&self) -> PathBuf {
        self.temp_dir.path().join("server_files")
    }

    pub fn recycle_dir(&self) -> PathBuf {
        self.temp_dir.path().join("recycle_bin")
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await.expect("connect")
    }

    /// Connect and log in, returning the client and its token.
    pub async fn login(&self) -> (TestClient, String) {
        let mut client = self.connect().await;
        let token = client.login(USERNAME, PASSWORD).await.expect("login");
        (client, token)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Protocol client.
pub struct TestClient {
    stream: BufReader<TcpStream>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Send raw bytes.
    pub async fn send_raw(&mut self, data: &[u8]) -> std::io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(data).await?;
        stream.flush().await
    }

    /// Send fields joined by the separator, terminated by a newline.
    pub async fn send_fields(&mut self, fields: &[&str]) -> std::io::Result<()> {
        let mut line = fields.join(SEPARATOR);
        line.push('\n');
        self.send_raw(line.as_bytes()).await
    }

    /// Receive one response line; `None` once the server has closed.
    pub async fn recv(&mut self) -> Option<Response> {
        let mut line = String::new();
        let n = timeout(DEFAULT_TIMEOUT, self.stream.read_line(&mut line))
            .await
            .expect("response timed out")
            .ok()?;
        if n == 0 {
            return None;
        }
        Some(Response::parse(&line).unwrap_or_else(|| panic!("unparseable response {line:?}")))
    }

    /// True if the server closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(
            timeout(DEFAULT_TIMEOUT, self.stream.read(&mut buf)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<String, Response> {
        self.send_fields(&[username, password]).await.expect("send");
        match self.recv().await {
            Some(Response::AuthSuccess(token)) => Ok(token),
            Some(other) => Err(other),
            None => Err(Response::AuthFailed),
        }
    }

    pub async fn command(&mut self, fields: &[&str]) -> Response {
        self.send_fields(fields).await.expect("send");
        self.recv().await.expect("connection closed")
    }

    pub async fn upload(&mut self, token: &str, name: &str, data: &[u8]) -> Response {
        let size = data.len().to_string();
        self.send_fields(&["UPLOAD", token, name, &size])
            .await
            .expect("send header");
        self.send_raw(data).await.expect("send payload");
        self.recv().await.expect("connection closed")
    }

    /// Download a file, returning its bytes or the error response.
    pub async fn download(&mut self, token: &str, name: &str) -> Result<Vec<u8>, Response> {
        match self.command(&["DOWNLOAD", token, name]).await {
            Response::Ok(fields) => {
                assert_eq!(fields.len(), 2, "DOWNLOAD header: {fields:?}");
                assert_eq!(fields[0], name);
                let size: usize = fields[1].parse().expect("size");
                let mut data = vec![0u8; size];
                timeout(DEFAULT_TIMEOUT, self.stream.read_exact(&mut data))
                    .await
                    .expect("download timed out")
                    .expect("read payload");
                Ok(data)
            }
            other => Err(other),
        }
    }

    pub async fn search(&mut self, token: &str, keyword: &str) -> Vec<String> {
        ok_fields(self.command(&["SEARCH", token, keyword]).await)
    }

    pub async fn search_recycle(&mut self, token: &str, keyword: &str) -> Vec<String> {
        ok_fields(self.command(&["SEARCH_RECYCLE", token, keyword]).await)
    }
}

/// Fields of an OK response; panics on anything else.
pub fn ok_fields(response: Response) -> Vec<String> {
    match response {
        Response::Ok(fields) => fields,
        other => panic!("expected OK, got {other:?}"),
    }
}

/// Kind of an ERROR response; panics on anything else.
pub fn error_kind(response: &Response) -> ErrorKind {
    match response {
        Response::Error { kind, .. } => *kind,
        other => panic!("expected ERROR, got {other:?}"),
    }
}

/// Per-name results of a bulk response, after the summary field.
pub fn bulk_outcomes(response: Response) -> Vec<BulkOutcome> {
    ok_fields(response)
        .iter()
        .skip(1)
        .map(|f| BulkOutcome::decode(f).expect("bulk outcome"))
        .collect()
}
