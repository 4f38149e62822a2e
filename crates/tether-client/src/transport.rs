//! Transport seam between the driver and the wire.
//!
//! The driver owns exactly one boxed [`Transport`] at a time and replaces it
//! wholesale on reconnect. [`Connector`] produces transports; the production
//! implementation is [`WsConnector`] over `tokio-tungstenite`, and tests
//! inject channel-backed fakes through the same trait.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::trace;

use tether_core::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open duplex channel carrying text frames.
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Read the next text frame.
    ///
    /// `None` means a graceful close; `Some(Err(..))` an abnormal one.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Initiate a graceful close. Errors are ignored by callers; the
    /// transport is dropped right after.
    async fn close(&mut self);
}

/// Factory for transports, one per (re)connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        trace!(status = %response.status(), url, "websocket established");
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(Some(frame)))
                    if !matches!(frame.code, CloseCode::Normal | CloseCode::Away) =>
                {
                    // Abnormal close code from the peer.
                    return Some(Err(TransportError::AbnormalClose {
                        reason: format!("close code {}: {}", frame.code, frame.reason),
                    }));
                }
                Ok(Message::Close(_)) => return None,
                // Control and binary frames are not part of the envelope
                // protocol; tungstenite answers pings itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
                Err(e) => {
                    return Some(Err(TransportError::AbnormalClose {
                        reason: e.to_string(),
                    }))
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
