use std::future::Future;

use futures::{SinkExt, StreamExt};
use log::debug;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("invalid feed url {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),
}

/// One live connection to the feed.
pub trait FeedSession: Send {
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), FeedError>> + Send;

    /// Next inbound text frame. `None` once the peer has closed the stream.
    fn next_message(&mut self) -> impl Future<Output = Option<Result<String, FeedError>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens feed sessions. The connection manager owns reconnect policy; a
/// transport only performs a single handshake per call.
pub trait FeedTransport: Send + Sync + 'static {
    type Session: FeedSession;

    fn connect(&self) -> impl Future<Output = Result<Self::Session, FeedError>> + Send;
}

pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: &str) -> Result<Self, FeedError> {
        let parsed = url::Url::parse(url).map_err(|e| FeedError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(FeedError::InvalidUrl(format!(
                "{}: expected ws or wss scheme",
                url
            )));
        }

        Ok(Self {
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FeedTransport for WebSocketTransport {
    type Session = WebSocketSession;

    async fn connect(&self) -> Result<WebSocketSession, FeedError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        Ok(WebSocketSession { stream })
    }
}

pub struct WebSocketSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FeedSession for WebSocketSession {
    async fn send(&mut self, text: String) -> Result<(), FeedError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| FeedError::Send(e.to_string()))
    }

    async fn next_message(&mut self) -> Option<Result<String, FeedError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => debug!("Skipping non-UTF-8 binary frame: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    debug!("Feed closed by peer: {:?}", frame);
                    return None;
                },
                // Ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(FeedError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Error while closing feed socket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_urls() {
        assert!(WebSocketTransport::new("wss://pumpportal.fun/api/data").is_ok());
        assert!(WebSocketTransport::new("ws://127.0.0.1:9000").is_ok());
        assert!(matches!(
            WebSocketTransport::new("https://pumpportal.fun/api/data"),
            Err(FeedError::InvalidUrl(_))
        ));
        assert!(matches!(
            WebSocketTransport::new("not a url"),
            Err(FeedError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = WebSocketTransport::new(&format!("ws://{}", addr)).unwrap();
        assert!(matches!(transport.connect().await, Err(FeedError::Connect(_))));
    }
}
