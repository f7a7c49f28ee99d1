//! WebSocket transport for the provider push stream.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::{InboundMessage, StreamConnection, StreamError, StreamTransport};

pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: &str) -> Self {
        WsTransport {
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>, StreamError> {
        info!("Connecting to stream: {}", self.url);
        match connect_async(self.url.as_str()).await {
            Ok((ws, response)) => {
                debug!("Stream handshake accepted: {}", response.status());
                Ok(Box::new(WsConnection {
                    ws,
                    topic: String::new(),
                }))
            }
            Err(e) => {
                // Surface the rejection code when the server answered at all
                let detail = match &e {
                    tungstenite::Error::Http(resp) => {
                        format!("handshake rejected with HTTP {}", resp.status())
                    }
                    other => other.to_string(),
                };
                Err(StreamError::Connect(detail))
            }
        }
    }
}

struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Topic sent with the subscribe frame; tagged onto inbound messages
    topic: String,
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn subscribe(&mut self, topic: &str) -> Result<(), StreamError> {
        let frame = serde_json::json!({
            "action": "subscribe",
            "topic": topic,
        });
        self.ws
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| StreamError::Subscribe(e.to_string()))?;
        self.topic = topic.to_string();
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<InboundMessage, StreamError>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(Ok(InboundMessage {
                        topic: self.topic.clone(),
                        payload: text,
                    }));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return Some(Ok(InboundMessage {
                        topic: self.topic.clone(),
                        payload: String::from_utf8_lossy(&bytes).into_owned(),
                    }));
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.ws.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => return None,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(StreamError::ConnectionLost(e.to_string()))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
