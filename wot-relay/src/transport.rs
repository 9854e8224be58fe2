//! Relay transport
//!
//! A [`RelayConnector`] opens one [`RelayChannel`] per relay per fetch. The
//! channel owns its socket: `close()` shuts it down cleanly, and dropping the
//! channel (abandonment) drops the socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::{validate_relay_url, ClientMessage, RelayError, RelayMessage};

/// An open connection to one relay
#[async_trait]
pub trait RelayChannel: Send {
    /// Send a protocol message
    async fn send(&mut self, message: &ClientMessage) -> Result<(), RelayError>;

    /// Next message; `None` once the relay has closed the connection
    async fn recv(&mut self) -> Option<Result<RelayMessage, RelayError>>;

    /// Close the connection
    async fn close(&mut self);
}

/// Opens relay connections
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayChannel>, RelayError>;
}

/// Shared connector handle
pub type SharedConnector = Arc<dyn RelayConnector>;

/// WebSocket relay connector
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn shared(connect_timeout: Duration) -> SharedConnector {
        Arc::new(Self::new(connect_timeout))
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl RelayConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayChannel>, RelayError> {
        validate_relay_url(url)?;

        let connected = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| RelayError::Timeout(self.connect_timeout.as_millis() as u64))?;

        let (stream, _response) = connected.map_err(|e| RelayError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!("Connected to {}", url);
        Ok(Box::new(WebSocketChannel {
            url: url.to_string(),
            stream,
        }))
    }
}

struct WebSocketChannel {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RelayChannel for WebSocketChannel {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), RelayError> {
        self.stream
            .send(Message::Text(message.to_json()))
            .await
            .map_err(|e| RelayError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<RelayMessage, RelayError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(RelayError::Closed(e.to_string()))),
            };

            match frame {
                Message::Text(text) => return Some(RelayMessage::from_json(&text)),
                Message::Binary(bytes) => {
                    return Some(match std::str::from_utf8(&bytes) {
                        Ok(text) => RelayMessage::from_json(text),
                        Err(e) => Err(RelayError::Malformed(e.to_string())),
                    })
                }
                Message::Close(_) => {
                    trace!("{} closed the connection", self.url);
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            trace!("Close of {} failed: {}", self.url, e);
        }
    }
}
