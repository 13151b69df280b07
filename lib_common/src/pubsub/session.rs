//! The long-lived PubSub subscription session.
//!
//! One `PubSubSession` owns one websocket connection. The run loop is the
//! sole owner of the outbound sink; the keep-alive pinger and the subscribe
//! handshake both route their frames through it, so sends never interleave.
//! Events are dispatched to the registered handler strictly in arrival
//! order from the single read path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::connect_async;

use crate::pubsub::model;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: WsError,
    },

    #[error("failed to send {frame} frame: {source}")]
    Send {
        frame: &'static str,
        #[source]
        source: WsError,
    },

    #[error("transport failure while subscribed: {0}")]
    Transport(#[from] WsError),
}

/// Receives each decoded cheer event, in arrival order.
///
/// Returns whether the cheer was applied to the trending state; failures
/// are surfaced to the session, which logs them without terminating.
pub trait CheerHandler: Send + Sync {
    fn on_cheer(&self, chat_message: &str, bits_used: u64) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Subscribed,
    Closing,
    Closed,
}

/// Connection parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ws_host: String,
    pub topic: String,
    pub auth_token: String,
    pub keep_alive_interval: Duration,
}

#[derive(Debug)]
enum Command {
    Ping,
}

pub struct PubSubSession {
    config: SessionConfig,
    handler: Arc<dyn CheerHandler>,
    shutdown_tx: broadcast::Sender<()>,
    stopping: AtomicBool,
    state: Mutex<SessionState>,
}

impl PubSubSession {
    pub fn new(config: SessionConfig, handler: Arc<dyn CheerHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            shutdown_tx,
            stopping: AtomicBool::new(false),
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().expect("session state lock poisoned");
        log::debug!("Session state: {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Requests shutdown. Idempotent; safe to call before `run` ever started.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Connects, subscribes and processes frames until `stop` is called or
    /// the transport fails. The initial connect is never retried here.
    pub async fn run(&self) -> Result<(), SessionError> {
        let mut shutdown = self.shutdown_tx.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            self.set_state(SessionState::Closed);
            return Ok(());
        }

        self.set_state(SessionState::Connecting);
        log::info!("Connecting to PubSub endpoint: {}", self.config.ws_host);

        let (ws_stream, _) = match connect_async(&self.config.ws_host).await {
            Ok(conn) => conn,
            Err(source) => {
                self.set_state(SessionState::Closed);
                return Err(SessionError::Connect {
                    host: self.config.ws_host.clone(),
                    source,
                });
            }
        };
        let (mut write, mut read) = ws_stream.split();

        // Subscribe handshake: LISTEN names the topic and carries the token.
        let listen = model::listen_frame(&self.config.topic, &self.config.auth_token);
        if let Err(source) = write.send(WsMessage::Text(listen.into())).await {
            self.set_state(SessionState::Closed);
            return Err(SessionError::Send {
                frame: "LISTEN",
                source,
            });
        }
        self.set_state(SessionState::Subscribed);
        log::info!("Subscribed to topic {}", self.config.topic);

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
        let pinger = tokio::spawn(keep_alive(
            cmd_tx,
            self.config.keep_alive_interval,
            self.shutdown_tx.subscribe(),
        ));

        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Session shutting down...");
                    break Ok(());
                }
                Some(cmd) = cmd_rx.recv() => match cmd {
                    Command::Ping => {
                        log::debug!("Sending keep-alive PING");
                        if let Err(source) = write.send(WsMessage::Text(model::ping_frame().into())).await {
                            break Err(SessionError::Send { frame: "PING", source });
                        }
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(&text),
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => {
                        log::warn!("PubSub stream closed by remote host");
                        break Err(SessionError::Transport(WsError::ConnectionClosed));
                    }
                    Some(Err(source)) => break Err(SessionError::Transport(source)),
                    Some(Ok(_)) => {}
                },
            }
        };

        self.set_state(SessionState::Closing);
        let _ = write.close().await;
        let _ = self.shutdown_tx.send(());
        let _ = pinger.await;
        self.set_state(SessionState::Closed);
        result
    }

    // A single bad frame is logged and dropped, never fatal.
    fn dispatch(&self, raw: &str) {
        let envelope: model::Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        match envelope.frame_type.as_str() {
            model::FRAME_TYPE_MESSAGE => {}
            model::FRAME_TYPE_RESPONSE => {
                match envelope.error.as_deref() {
                    Some(error) if !error.is_empty() => log::warn!("LISTEN rejected: {}", error),
                    _ => log::debug!("LISTEN acknowledged"),
                }
                return;
            }
            model::FRAME_TYPE_PONG => {
                log::debug!("Keep-alive PONG received");
                return;
            }
            other => {
                log::debug!("Ignoring {} frame", other);
                return;
            }
        }

        let Some(data) = envelope.data else {
            log::warn!("Dropping MESSAGE frame without data");
            return;
        };
        if data.topic != self.config.topic {
            log::debug!("Ignoring message for topic {}", data.topic);
            return;
        }

        let event: model::BitsEvent = match serde_json::from_str(&data.message) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Dropping malformed bits event: {}", e);
                return;
            }
        };

        if let Some(user_name) = &event.user_name {
            log::info!("New cheer from {}!", user_name);
        }
        log::info!("Message: {}", event.chat_message);
        log::info!("Bits cheered: {}", event.bits_used);

        match self.handler.on_cheer(&event.chat_message, event.bits_used) {
            Ok(true) => log::debug!("Cheer applied to trending state"),
            Ok(false) => log::debug!("Cheer carried no known game id"),
            Err(e) => log::error!("Cheer handler failed: {:#}", e),
        }
    }
}

// Periodic PING producer. It never touches the websocket itself; frames go
// through the command channel so the run loop stays the only writer.
async fn keep_alive(
    cmd_tx: mpsc::UnboundedSender<Command>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    // The first tick fires immediately, so a PING follows the subscribe
    // handshake right away, then once per period.
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                if cmd_tx.send(Command::Ping).is_err() {
                    break;
                }
            }
        }
    }
    log::debug!("Keep-alive pinger terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::accept_async;

    struct RecordingHandler {
        events: StdMutex<Vec<(String, u64)>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: StdMutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<(String, u64)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl CheerHandler for RecordingHandler {
        fn on_cheer(&self, chat_message: &str, bits_used: u64) -> anyhow::Result<bool> {
            self.events
                .lock()
                .unwrap()
                .push((chat_message.to_string(), bits_used));
            Ok(true)
        }
    }

    fn session_config(ws_host: String, topic: &str, keep_alive: Duration) -> SessionConfig {
        SessionConfig {
            ws_host,
            topic: topic.to_string(),
            auth_token: "oauth-abc".to_string(),
            keep_alive_interval: keep_alive,
        }
    }

    fn message_frame(topic: &str, payload: &str) -> String {
        json!({
            "type": "MESSAGE",
            "data": { "topic": topic, "message": payload }
        })
        .to_string()
    }

    // Accepts one client, records every inbound text frame (the first one
    // is the LISTEN handshake), pushes the given frames, then drains until
    // the client closes.
    async fn spawn_stub_server(frames: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let handle = tokio::spawn(async move {
            let mut inbound = Vec::new();
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return inbound,
            };
            let mut ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => return inbound,
            };
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => inbound.push(text.to_string()),
                _ => return inbound,
            }
            for frame in frames {
                if ws.send(WsMessage::Text(frame.into())).await.is_err() {
                    return inbound;
                }
            }
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    WsMessage::Text(text) => inbound.push(text.to_string()),
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            inbound
        });
        (format!("ws://{}", addr), handle)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    #[tokio::test]
    async fn dispatches_matching_events_and_skips_noise() {
        let topic = "channel-bitsevents.44322889";
        let payload = json!({
            "user_name": "dallasnchains",
            "chat_message": "Omg that baneling bust was Kreygasm CM16 cheer10 cheer10 cheer100",
            "bits_used": 120
        })
        .to_string();
        let frames = vec![
            json!({"type": "RESPONSE", "error": "", "nonce": ""}).to_string(),
            "{ not json".to_string(),
            message_frame("channel-bitsevents.999", &payload),
            message_frame(topic, r#"{"chat_message": 3}"#),
            message_frame(topic, &payload),
        ];
        let (ws_host, server) = spawn_stub_server(frames).await;

        let handler = RecordingHandler::new();
        let session = Arc::new(PubSubSession::new(
            session_config(ws_host, topic, Duration::from_secs(30)),
            handler.clone(),
        ));

        let runner = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.run().await }
        });

        wait_until(|| !handler.events().is_empty(), "dispatched event").await;
        session.stop();

        runner.await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        let events = handler.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, 120);
        assert!(events[0].0.contains("CM16"));

        let inbound = server.await.unwrap();
        assert_eq!(inbound[0], model::listen_frame(topic, "oauth-abc"));
    }

    #[tokio::test]
    async fn keep_alive_pings_flow_through_the_connection() {
        let topic = "channel-bitsevents.1";
        let (ws_host, server) = spawn_stub_server(Vec::new()).await;

        let handler = RecordingHandler::new();
        let session = Arc::new(PubSubSession::new(
            session_config(ws_host, topic, Duration::from_millis(50)),
            handler,
        ));

        let runner = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.run().await }
        });

        tokio::time::sleep(Duration::from_millis(180)).await;
        session.stop();
        runner.await.unwrap().unwrap();

        let inbound = server.await.unwrap();
        assert_eq!(inbound[0], model::listen_frame(topic, "oauth-abc"));
        let pings: Vec<_> = inbound[1..]
            .iter()
            .filter(|frame| frame.as_str() == model::ping_frame())
            .collect();
        assert!(
            pings.len() >= 2,
            "expected at least 2 keep-alive pings, got {}",
            pings.len()
        );
        assert_eq!(pings.len(), inbound.len() - 1);
    }

    #[tokio::test]
    async fn connect_failure_is_fatal_and_not_retried() {
        // Grab a port that nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = PubSubSession::new(
            session_config(format!("ws://{}", addr), "t", Duration::from_secs(30)),
            RecordingHandler::new(),
        );

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, SessionError::Connect { .. }));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_before_start() {
        let session = PubSubSession::new(
            session_config("ws://127.0.0.1:1".to_string(), "t", Duration::from_secs(30)),
            RecordingHandler::new(),
        );

        session.stop();
        session.stop();

        // A stopped session closes without ever touching the network.
        session.run().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn remote_close_surfaces_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await; // LISTEN
            let _ = ws.close(None).await;
        });

        let session = PubSubSession::new(
            session_config(format!("ws://{}", addr), "t", Duration::from_secs(30)),
            RecordingHandler::new(),
        );

        let err = session.run().await.unwrap_err();
        // Depending on timing the failure shows up on the read side or on
        // the next keep-alive send; both are transport-level conditions.
        assert!(matches!(
            err,
            SessionError::Transport(_) | SessionError::Send { .. }
        ));
        assert_eq!(session.state(), SessionState::Closed);
        server.await.unwrap();
    }
}
