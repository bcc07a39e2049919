//! Unix socket server for display clients

use crate::protocol::{Request, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

const BROADCAST_CAPACITY: usize = 64;

pub struct SocketServer {
    path: PathBuf,
    listener: UnixListener,
    broadcast_tx: broadcast::Sender<String>,
}

impl SocketServer {
    pub async fn bind(path: &Path) -> std::io::Result<Self> {
        let _ = std::fs::remove_file(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        info!("Socket server listening on {:?}", path);
        Ok(Self { path: path.to_path_buf(), listener, broadcast_tx })
    }

    pub fn broadcast_sender(&self) -> broadcast::Sender<String> {
        self.broadcast_tx.clone()
    }

    pub async fn accept(&self) -> std::io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    /// `$XDG_RUNTIME_DIR/healthpulse.sock`, falling back to `/run/user/<uid>`.
    pub fn socket_path() -> PathBuf {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let uid = unsafe { libc::getuid() };
                PathBuf::from(format!("/run/user/{}", uid))
            });
        runtime_dir.join("healthpulse.sock")
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Serialize a message for the newline-delimited wire format.
pub fn encode(response: &Response) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(json) => Some(json + "\n"),
        Err(e) => {
            error!("Failed to encode response: {}", e);
            None
        }
    }
}

/// Answers one request line. A malformed line gets an error reply and the
/// client stays connected.
pub async fn dispatch<H: RequestHandler>(handler: &H, line: &str) -> Response {
    match serde_json::from_str::<Request>(line.trim()) {
        Ok(request) => handler.handle(request).await,
        Err(e) => {
            warn!("Invalid request {:?}: {}", line.trim(), e);
            Response::error(format!("invalid request: {}", e))
        }
    }
}

/// Serves one display client: replies to its requests and forwards every
/// broadcast status and alert until either side goes away.
pub async fn handle_client<H>(
    stream: UnixStream,
    mut updates: broadcast::Receiver<String>,
    handler: Arc<H>,
) where
    H: RequestHandler + Send + Sync + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut requests = BufReader::new(reader).lines();

    loop {
        let outgoing = tokio::select! {
            line = requests.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match encode(&dispatch(handler.as_ref(), &line).await) {
                    Some(json) => json,
                    None => continue,
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Read error: {}", e);
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(json) => json,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Slow client skipped {} updates", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        if let Err(e) = writer.write_all(outgoing.as_bytes()).await {
            debug!("Client went away: {}", e);
            break;
        }
    }
    debug!("Client disconnected");
}

#[async_trait::async_trait]
pub trait RequestHandler {
    async fn handle(&self, request: Request) -> Response;
}
