//! Push-stream subscriber. The provider pushes match updates over a single
//! topic; the subscriber keeps the connection alive forever, reconnecting at
//! a fixed backoff after any disconnect. The transport sits behind a trait
//! so the reconnect behavior is testable with scripted connections.

pub mod websocket;

pub use websocket::WsTransport;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::sink::{FeedEvent, StreamPayload};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// A message delivered on the push stream, tagged with its topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>, StreamError>;
}

#[async_trait]
pub trait StreamConnection: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<(), StreamError>;

    /// Next inbound message. `None` means the peer closed the connection.
    async fn next_message(&mut self) -> Option<Result<InboundMessage, StreamError>>;

    async fn close(&mut self);
}

pub struct Subscriber {
    transport: Arc<dyn StreamTransport>,
    topic: String,
    reconnect_backoff: Duration,
    events: mpsc::Sender<FeedEvent>,
}

impl Subscriber {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        topic: &str,
        reconnect_backoff: Duration,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Subscriber {
            transport,
            topic: topic.to_string(),
            reconnect_backoff,
            events,
        }
    }

    /// Connect once, subscribe, then handle messages until shutdown.
    ///
    /// A failure of the *initial* connect is reported to the caller and not
    /// retried. Disconnects after that are retried forever at the configured
    /// backoff, resubscribing once per successful reconnect.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        let mut conn = match self.transport.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Stream connect failed (not retrying): {}", e);
                return Err(e);
            }
        };
        conn.subscribe(&self.topic).await?;
        info!("Subscribed to {}", self.topic);

        loop {
            tokio::select! {
                msg = conn.next_message() => {
                    match msg {
                        Some(Ok(message)) => self.handle_message(message),
                        Some(Err(e)) => {
                            warn!("Stream error: {}", e);
                            match self.reconnect(&mut shutdown).await {
                                Some(new_conn) => conn = new_conn,
                                None => return Ok(()),
                            }
                        }
                        None => {
                            warn!("Stream disconnected by peer");
                            match self.reconnect(&mut shutdown).await {
                                Some(new_conn) => conn = new_conn,
                                None => return Ok(()),
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        conn.close().await;
                        info!("Stream subscriber stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Reconnect loop: fixed backoff, no attempt bound. Returns `None` when
    /// shutdown was requested while waiting.
    async fn reconnect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Box<dyn StreamConnection>> {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_backoff) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return None;
                    }
                    continue;
                }
            }

            match self.transport.connect().await {
                Ok(mut conn) => match conn.subscribe(&self.topic).await {
                    Ok(()) => {
                        info!("Reconnected, resubscribed to {}", self.topic);
                        return Some(conn);
                    }
                    Err(e) => {
                        warn!("Resubscribe failed, retrying in {:?}: {}", self.reconnect_backoff, e);
                    }
                },
                Err(e) => {
                    warn!("Reconnect failed, retrying in {:?}: {}", self.reconnect_backoff, e);
                }
            }
        }
    }

    /// Decode the payload as JSON when possible, pass it through raw
    /// otherwise, and forward it with its topic.
    fn handle_message(&self, message: InboundMessage) {
        let payload = match serde_json::from_str::<serde_json::Value>(&message.payload) {
            Ok(value) => StreamPayload::Json(value),
            Err(_) => StreamPayload::Text(message.payload),
        };
        let event = FeedEvent::StreamMessage {
            topic: message.topic,
            payload,
        };
        if let Err(e) = self.events.try_send(event) {
            error!("Feed channel full, stream message DROPPED: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// One scripted connection: yields its messages, then either reports a
    /// peer close or parks forever.
    struct MockConnection {
        messages: VecDeque<Result<InboundMessage, StreamError>>,
        park_when_drained: bool,
        subscriptions: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl StreamConnection for MockConnection {
        async fn subscribe(&mut self, topic: &str) -> Result<(), StreamError> {
            self.subscriptions.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn next_message(&mut self) -> Option<Result<InboundMessage, StreamError>> {
            if let Some(msg) = self.messages.pop_front() {
                return Some(msg);
            }
            if self.park_when_drained {
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
            None
        }

        async fn close(&mut self) {}
    }

    /// Scripted transport: each connect attempt pops the next outcome.
    struct MockTransport {
        script: Mutex<VecDeque<Result<MockConnection, StreamError>>>,
        connects: AtomicUsize,
    }

    impl MockTransport {
        fn new(script: Vec<Result<MockConnection, StreamError>>) -> Self {
            MockTransport {
                script: Mutex::new(script.into_iter().collect()),
                connects: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StreamTransport for MockTransport {
        async fn connect(&self) -> Result<Box<dyn StreamConnection>, StreamError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(conn)) => Ok(Box::new(conn)),
                Some(Err(e)) => Err(e),
                None => Err(StreamError::Connect("script exhausted".into())),
            }
        }
    }

    fn dropping_conn(subs: &Arc<Mutex<Vec<String>>>) -> MockConnection {
        MockConnection {
            messages: VecDeque::new(),
            park_when_drained: false,
            subscriptions: Arc::clone(subs),
        }
    }

    fn parked_conn(
        subs: &Arc<Mutex<Vec<String>>>,
        messages: Vec<InboundMessage>,
    ) -> MockConnection {
        MockConnection {
            messages: messages.into_iter().map(Ok).collect(),
            park_when_drained: true,
            subscriptions: Arc::clone(subs),
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_not_retried() {
        let transport = Arc::new(MockTransport::new(vec![Err(StreamError::Connect(
            "handshake rejected with HTTP 403".into(),
        ))]));
        let (tx, _rx) = crate::sink::channel();
        let subscriber = Subscriber::new(transport.clone(), "topic/a", Duration::ZERO, tx);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        assert!(subscriber.run(shutdown_rx).await.is_err());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resubscribes_exactly_once_per_reconnect() {
        let subs = Arc::new(Mutex::new(Vec::new()));
        // Three connections that drop immediately, then one that stays up
        let transport = Arc::new(MockTransport::new(vec![
            Ok(dropping_conn(&subs)),
            Ok(dropping_conn(&subs)),
            Ok(dropping_conn(&subs)),
            Ok(parked_conn(&subs, vec![])),
        ]));
        let (tx, _rx) = crate::sink::channel();
        let subscriber = Subscriber::new(transport.clone(), "topic/a", Duration::ZERO, tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { subscriber.run(shutdown_rx).await });

        let subs_probe = Arc::clone(&subs);
        wait_for(move || subs_probe.lock().unwrap().len() == 4).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // One subscribe per successful (re)connect, none duplicated
        assert_eq!(subs.lock().unwrap().len(), 4);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 4);
        assert!(subs.lock().unwrap().iter().all(|t| t == "topic/a"));

        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_messages_decoded_json_or_raw() {
        let subs = Arc::new(Mutex::new(Vec::new()));
        let messages = vec![
            InboundMessage {
                topic: "topic/a".into(),
                payload: r#"{"match_id": "m1", "score": [1, 0]}"#.into(),
            },
            InboundMessage {
                topic: "topic/a".into(),
                payload: "not json at all".into(),
            },
        ];
        let transport = Arc::new(MockTransport::new(vec![Ok(parked_conn(&subs, messages))]));
        let (tx, mut rx) = crate::sink::channel();
        let subscriber = Subscriber::new(transport, "topic/a", Duration::ZERO, tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { subscriber.run(shutdown_rx).await });

        let first = rx.recv().await.unwrap();
        match first {
            FeedEvent::StreamMessage {
                topic,
                payload: StreamPayload::Json(value),
            } => {
                assert_eq!(topic, "topic/a");
                assert_eq!(value["match_id"], "m1");
            }
            other => panic!("expected decoded JSON message, got {:?}", other),
        }

        let second = rx.recv().await.unwrap();
        match second {
            FeedEvent::StreamMessage {
                payload: StreamPayload::Text(text),
                ..
            } => assert_eq!(text, "not json at all"),
            other => panic!("expected raw text message, got {:?}", other),
        }

        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_during_reconnect_wait() {
        let subs = Arc::new(Mutex::new(Vec::new()));
        // First connection drops; the long backoff would stall reconnect
        let transport = Arc::new(MockTransport::new(vec![Ok(dropping_conn(&subs))]));
        let (tx, _rx) = crate::sink::channel();
        let subscriber =
            Subscriber::new(transport, "topic/a", Duration::from_secs(3600), tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { subscriber.run(shutdown_rx).await });

        let subs_probe = Arc::clone(&subs);
        wait_for(move || subs_probe.lock().unwrap().len() == 1).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("subscriber did not honor shutdown");
        assert!(result.unwrap().is_ok());
    }
}
