//! [`AccessoryServer`] – WebSocket endpoint for accessory controllers.
//!
//! Listens on `0.0.0.0:51826` (configurable via [`AccessoryServer::with_port`]).
//!
//! * WebSocket upgrades → a protocol session (see [`crate::protocol`]).
//! * Any other HTTP request → 200 OK with the accessory listing as JSON.
//!
//! Every request of a session runs in its own task, so a slow write (the
//! command dispatcher sleeps before contacting the remote API) never holds
//! up reads on the same connection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use remobridge_accessory::AccessoryRegistry;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::protocol::{Handler, Response, ResponseBody, Session};

/// Default TCP port of the accessory server.
pub const DEFAULT_PORT: u16 = 51826;

/// Upper bound on the request head read before answering plain HTTP.
const MAX_HEAD: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// AccessoryServer
// ─────────────────────────────────────────────────────────────────────────────

/// Serves one [`AccessoryRegistry`] to any number of controllers.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use remobridge_accessory::{AccessoryInfo, AccessoryRegistry};
/// use remobridge_server::AccessoryServer;
///
/// #[tokio::main]
/// async fn main() {
///     let registry = Arc::new(AccessoryRegistry::new(AccessoryInfo::named("Home")));
///     let (_stop, shutdown) = tokio::sync::watch::channel(false);
///     AccessoryServer::new(registry, "12344321")
///         .run(shutdown)
///         .await
///         .expect("accessory server failed");
/// }
/// ```
pub struct AccessoryServer {
    handler: Handler,
    port: u16,
}

impl AccessoryServer {
    /// Create a server for `registry`, paired with `pin`, on the [`DEFAULT_PORT`].
    pub fn new(registry: Arc<AccessoryRegistry>, pin: impl Into<String>) -> Self {
        Self {
            handler: Handler {
                registry,
                pin: Arc::from(pin.into()),
            },
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the configured port and serve until `shutdown` turns `true`.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the listener cannot bind.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound `listener`.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        info!(addr = %local, accessories = self.handler.registry.len(), "accessory server listening");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = self.handler.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, handler, shutdown).await {
                                warn!(%peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("accessory server stopped");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-connection handling
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Handler,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    // `peek` leaves the request in place for the websocket handshake.
    let mut buf = [0u8; 1024];
    let n = stream.peek(&mut buf).await?;
    let head = String::from_utf8_lossy(&buf[..n]);
    let is_upgrade = head.lines().any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    });

    if is_upgrade {
        handle_session(stream, peer, handler, shutdown).await
    } else {
        serve_listing(stream, &handler).await
    }
}

async fn serve_listing(mut stream: TcpStream, handler: &Handler) -> Result<(), ServerError> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_HEAD {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    let listing = ResponseBody::Accessories {
        accessories: handler.registry.describe(),
    };
    let body = serde_json::to_string(&listing).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Handler,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let session = Arc::new(Session::new());
    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Response>();
    info!(%peer, session = %session.id, "controller connected");

    loop {
        tokio::select! {
            Some(response) = resp_rx.recv() => {
                match serde_json::to_string(&response) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "response serialization failed"),
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let handler = handler.clone();
                    let session = Arc::clone(&session);
                    let resp_tx = resp_tx.clone();
                    tokio::spawn(async move {
                        let response = handler.handle_text(&session, text.as_str()).await;
                        // Receiver gone means the session already closed.
                        let _ = resp_tx.send(response);
                    });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "websocket read failed");
                    break;
                }
                _ => {}
            },
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    info!(%peer, session = %session.id, "controller disconnected");
    Ok(())
}
