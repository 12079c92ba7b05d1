//! Broadcast Server
//!
//! Owns the fixed topic registry, the connection hub and the publish workers,
//! and drives the HTTP/WebSocket accept loop.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──serve──▶ Listening ──stop──▶ ShuttingDown ──loop exits──▶ Stopped
//!    └──────────────────stop───────────────────────────────────────────▲
//! ```
//!
//! # Endpoints
//!
//! - `GET /` and `GET /ws` - WebSocket upgrade
//! - `GET /health` - Server status

mod error;
pub mod health;

pub use error::{ServerError, ServerResult};
pub use health::HealthResponse;

use axum::{routing::get, Router};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::device::{DeviceError, DeviceProxy, StreamKind};
use crate::protocol::{Action, Command, Message};
use crate::publisher::{DepthPublisher, Publisher, VideoPublisher};
use crate::websocket::{
    websocket_handler, Channel, ConnectionHub, ConnectionId, HubError, Outbound, Transport,
};

/// Reply to a command that does not parse
pub const INVALID_COMMAND: &str = "Invalid command provided.";

/// Reply to a command naming an unknown topic
pub const NO_MATCHING_CHANNEL: &str = "No matching channel.";

/// Upper bound on waiting for closed connections to drain after shutdown
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Server lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Created => "created",
            ServerState::Listening => "listening",
            ServerState::ShuttingDown => "shutting_down",
            ServerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered topic and the stream that feeds it
struct Topic {
    kind: StreamKind,
    channel: Arc<Channel>,
}

/// WebSocket server broadcasting device frames to topic subscribers
pub struct BroadcastServer {
    config: ServerConfig,
    device: Arc<dyn DeviceProxy>,
    hub: Arc<ConnectionHub>,
    /// Fixed at construction
    topics: BTreeMap<&'static str, Topic>,
    state: Mutex<ServerState>,
    /// Stops the publish workers
    termination: CancellationToken,
    /// Stops the accept loop; child of `termination`
    accept: CancellationToken,
    started_at: Instant,
}

impl BroadcastServer {
    pub fn new(config: ServerConfig, device: Arc<dyn DeviceProxy>) -> Self {
        let hub = Arc::new(ConnectionHub::new(config.hub_config()));

        let topics = StreamKind::ALL
            .into_iter()
            .map(|kind| {
                let transport = Arc::clone(&hub) as Arc<dyn Transport>;
                let channel = Arc::new(Channel::new(kind.topic(), transport));
                (kind.topic(), Topic { kind, channel })
            })
            .collect();

        let termination = CancellationToken::new();
        let accept = termination.child_token();

        Self {
            config,
            device,
            hub,
            topics,
            state: Mutex::new(ServerState::Created),
            termination,
            accept,
            started_at: Instant::now(),
        }
    }

    /// Bind the configured address and serve until stopped
    pub async fn run(self: &Arc<Self>) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve(listener).await
    }

    /// Start the device streams and publish workers, then serve connections on
    /// `listener` until [`stop`](Self::stop) is called.
    ///
    /// Only valid once, from `Created`. If a device stream fails to start, any
    /// stream already started is stopped again and the server stays `Created`.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> ServerResult<()> {
        {
            let mut state = self.lock_state();
            if *state != ServerState::Created {
                return Err(ServerError::InvalidState(*state));
            }
            self.start_streams()?;
            *state = ServerState::Listening;
        }

        let workers: Vec<_> = self
            .topics
            .values()
            .map(|topic| {
                let mut publisher = self.make_publisher(topic.kind);
                let channel = Arc::clone(&topic.channel);
                let termination = self.termination.clone();
                tokio::task::spawn_blocking(move || {
                    broadcast_to_channel(publisher.as_mut(), &channel, &termination)
                })
            })
            .collect();

        match listener.local_addr() {
            Ok(addr) => tracing::info!("Depthcast listening on {}", addr),
            Err(e) => tracing::warn!(error = %e, "Listening on unknown address"),
        }

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(self.accept.clone().cancelled_owned())
            .await;

        self.stop();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Publish worker panicked");
            }
        }
        self.drain_connections().await;

        *self.lock_state() = ServerState::Stopped;
        tracing::info!("Depthcast stopped");

        served.map_err(ServerError::from)
    }

    /// Begin shutdown. Safe to call from any thread, any number of times.
    pub fn stop(&self) {
        {
            let mut state = self.lock_state();
            match *state {
                ServerState::Created => {
                    *state = ServerState::Stopped;
                    self.termination.cancel();
                    tracing::info!("Server stopped before serving");
                    return;
                }
                ServerState::Listening => *state = ServerState::ShuttingDown,
                ServerState::ShuttingDown | ServerState::Stopped => return,
            }
        }

        tracing::info!("Shutting down");
        self.accept.cancel();

        for kind in StreamKind::ALL {
            if let Err(e) = self.device.stop_stream(kind) {
                tracing::warn!(stream = %kind, error = %e, "Failed to stop device stream");
            }
        }

        let closed = self.hub.close_all(&self.config.close_reason);
        tracing::info!(connections = closed, "Closing connections");

        self.termination.cancel();
    }

    /// Build the HTTP router serving this server
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", get(websocket_handler))
            .route("/ws", get(websocket_handler))
            .route("/health", get(health::health))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(self))
    }

    /// Register a newly upgraded connection
    pub fn on_connection_opened(
        &self,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Result<ConnectionId, HubError> {
        // Hold the state lock so a registration cannot slip past close_all
        let state = self.lock_state();
        if *state != ServerState::Listening {
            return Err(HubError::NotAccepting);
        }
        self.hub.register(sender)
    }

    /// Drop a connection from every topic, then from the hub
    pub fn on_connection_closed(&self, id: ConnectionId) {
        for topic in self.topics.values() {
            topic.channel.unsubscribe(id);
        }
        self.hub.unregister(id);
    }

    /// Apply a command received from `id`
    pub fn on_message(&self, id: ConnectionId, payload: &str) {
        let command = Command::parse(payload);

        match (command.action(), self.channel(command.topic())) {
            (Action::Invalid, _) => {
                tracing::debug!(connection_id = %id, payload, "Invalid command");
                self.send_error(id, INVALID_COMMAND);
            }
            (_, None) => {
                tracing::debug!(connection_id = %id, topic = command.topic(), "Unknown topic");
                self.send_error(id, NO_MATCHING_CHANNEL);
            }
            (Action::Subscribe, Some(channel)) => {
                channel.subscribe(id);
            }
            (Action::Unsubscribe, Some(channel)) => {
                channel.unsubscribe(id);
            }
        }
    }

    /// Send an Error message to one connection
    pub fn send_error(&self, id: ConnectionId, text: &str) {
        let encoded = match Message::error(text).encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode error message");
                return;
            }
        };

        if let Err(e) = self.hub.send_to(id, Outbound::Binary(encoded)) {
            tracing::debug!(connection_id = %id, error = %e, "Failed to send error message");
        }
    }

    pub fn state(&self) -> ServerState {
        *self.lock_state()
    }

    pub fn channel(&self, topic: &str) -> Option<&Arc<Channel>> {
        self.topics.get(topic).map(|t| &t.channel)
    }

    /// Registered topic names, sorted
    pub fn topics(&self) -> Vec<&'static str> {
        self.topics.keys().copied().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.hub.connection_count()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn start_streams(&self) -> Result<(), DeviceError> {
        let mut started = Vec::with_capacity(StreamKind::ALL.len());

        for kind in StreamKind::ALL {
            if let Err(e) = self.device.start_stream(kind) {
                tracing::error!(stream = %kind, error = %e, "Failed to start device stream");
                for &running in started.iter().rev() {
                    if let Err(stop_err) = self.device.stop_stream(running) {
                        tracing::warn!(
                            stream = %running,
                            error = %stop_err,
                            "Failed to stop device stream"
                        );
                    }
                }
                return Err(e);
            }
            tracing::info!(
                stream = %kind,
                resolution = %self.device.resolution(kind),
                "Device stream started"
            );
            started.push(kind);
        }

        Ok(())
    }

    fn make_publisher(&self, kind: StreamKind) -> Box<dyn Publisher> {
        let device = Arc::clone(&self.device);
        let timeout = self.config.frame_timeout();
        match kind {
            StreamKind::Depth => Box::new(DepthPublisher::new(device, timeout)),
            StreamKind::Video => Box::new(VideoPublisher::new(device, timeout)),
        }
    }

    async fn drain_connections(&self) {
        let deadline = Instant::now() + CLOSE_DRAIN_TIMEOUT;
        while self.hub.connection_count() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let remaining = self.hub.connection_count();
        if remaining > 0 {
            tracing::warn!(connections = remaining, "Connections still open after shutdown");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publish loop run by one blocking worker per topic.
///
/// Exits within one device timeout of `termination` being cancelled.
pub fn broadcast_to_channel(
    publisher: &mut dyn Publisher,
    channel: &Channel,
    termination: &CancellationToken,
) {
    tracing::info!(topic = channel.topic(), "Publish worker started");

    let mut published: u64 = 0;
    while !termination.is_cancelled() {
        match publisher.publish_new_data(channel) {
            Ok(true) => published += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(topic = channel.topic(), error = %e, "Failed to publish frame");
            }
        }
    }

    tracing::info!(topic = channel.topic(), frames = published, "Publish worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceResult, Frame, Resolution};
    use crate::protocol::{MessageType, Payload};

    /// Device that records stream calls and can refuse to start one kind
    #[derive(Default)]
    struct StubDevice {
        fail_start: Option<StreamKind>,
        calls: Mutex<Vec<(&'static str, StreamKind)>>,
    }

    impl StubDevice {
        fn calls(&self) -> Vec<(&'static str, StreamKind)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DeviceProxy for StubDevice {
        fn resolution(&self, _kind: StreamKind) -> Resolution {
            Resolution::new(2, 2)
        }

        fn start_stream(&self, kind: StreamKind) -> DeviceResult<()> {
            if self.fail_start == Some(kind) {
                return Err(DeviceError::StartStream {
                    kind,
                    reason: "unplugged".to_string(),
                });
            }
            self.calls.lock().unwrap().push(("start", kind));
            Ok(())
        }

        fn stop_stream(&self, kind: StreamKind) -> DeviceResult<()> {
            self.calls.lock().unwrap().push(("stop", kind));
            Ok(())
        }

        fn next_frame(&self, _kind: StreamKind, timeout: Duration) -> Option<Frame> {
            std::thread::sleep(timeout);
            None
        }
    }

    fn server_with(device: StubDevice) -> (Arc<BroadcastServer>, Arc<StubDevice>) {
        let device = Arc::new(device);
        let server = Arc::new(BroadcastServer::new(
            ServerConfig::default(),
            Arc::clone(&device) as Arc<dyn DeviceProxy>,
        ));
        (server, device)
    }

    fn listening_server() -> Arc<BroadcastServer> {
        let (server, _) = server_with(StubDevice::default());
        *server.lock_state() = ServerState::Listening;
        server
    }

    fn expect_error(rx: &mut mpsc::UnboundedReceiver<Outbound>, expected: &str) {
        match rx.try_recv() {
            Ok(Outbound::Binary(data)) => {
                let message = Message::decode(&data).unwrap();
                assert_eq!(message.message_type(), MessageType::Error);
                match message.payload {
                    Payload::Error { text } => assert_eq!(text, expected),
                    _ => unreachable!(),
                }
            }
            other => panic!("Expected error message, got {:?}", other),
        }
    }

    #[test]
    fn test_fixed_topics() {
        let (server, _) = server_with(StubDevice::default());

        assert_eq!(server.topics(), vec!["depth", "video"]);
        assert_eq!(server.channel("video").unwrap().topic(), "video");
        assert!(server.channel("audio").is_none());
        assert_eq!(server.state(), ServerState::Created);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let server = listening_server();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = server.on_connection_opened(tx).unwrap();

        server.on_message(id, "SUBSCRIBE video");
        assert!(server.channel("video").unwrap().is_subscribed(id));
        assert!(!server.channel("depth").unwrap().is_subscribed(id));

        server.on_message(id, "UNSUBSCRIBE video");
        assert!(!server.channel("video").unwrap().is_subscribed(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_command_reply() {
        let server = listening_server();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        let id = server.on_connection_opened(tx).unwrap();
        server.on_connection_opened(other_tx).unwrap();

        server.on_message(id, "JUMP video");
        expect_error(&mut rx, INVALID_COMMAND);

        server.on_message(id, "SUBSCRIBE");
        expect_error(&mut rx, INVALID_COMMAND);

        // Only the sender hears about it
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_topic_reply() {
        let server = listening_server();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = server.on_connection_opened(tx).unwrap();

        server.on_message(id, "SUBSCRIBE audio");
        expect_error(&mut rx, NO_MATCHING_CHANNEL);
        assert_eq!(server.channel("video").unwrap().subscriber_count(), 0);
        assert_eq!(server.channel("depth").unwrap().subscriber_count(), 0);
    }

    #[test]
    fn test_connection_closed_unsubscribes_everywhere() {
        let server = listening_server();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = server.on_connection_opened(tx).unwrap();

        server.on_message(id, "SUBSCRIBE video");
        server.on_message(id, "SUBSCRIBE depth");
        server.on_connection_closed(id);

        assert_eq!(server.channel("video").unwrap().subscriber_count(), 0);
        assert_eq!(server.channel("depth").unwrap().subscriber_count(), 0);
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_connections_refused_unless_listening() {
        let (server, _) = server_with(StubDevice::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            server.on_connection_opened(tx),
            Err(HubError::NotAccepting)
        ));
    }

    #[test]
    fn test_stop_from_listening() {
        let (server, device) = server_with(StubDevice::default());
        *server.lock_state() = ServerState::Listening;
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.on_connection_opened(tx).unwrap();

        server.stop();
        assert_eq!(server.state(), ServerState::ShuttingDown);
        assert!(server.termination.is_cancelled());
        assert!(server.accept.is_cancelled());
        assert_eq!(
            device.calls(),
            vec![("stop", StreamKind::Video), ("stop", StreamKind::Depth)]
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close {
                reason: "Goodbye!".to_string()
            }
        );

        // Second call is a no-op
        server.stop();
        assert_eq!(device.calls().len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_before_serve() {
        let (server, device) = server_with(StubDevice::default());

        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert!(matches!(
            server.serve(listener).await,
            Err(ServerError::InvalidState(ServerState::Stopped))
        ));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back() {
        let (server, device) = server_with(StubDevice {
            fail_start: Some(StreamKind::Depth),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = server.serve(listener).await;

        assert!(matches!(result, Err(ServerError::Device(_))));
        assert_eq!(server.state(), ServerState::Created);
        assert_eq!(
            device.calls(),
            vec![("start", StreamKind::Video), ("stop", StreamKind::Video)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serve_until_stopped() {
        let (server, device) = server_with(StubDevice::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let serving = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve(listener).await }
        });

        while server.state() != ServerState::Listening {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        server.stop();

        serving.await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(
            device.calls(),
            vec![
                ("start", StreamKind::Video),
                ("start", StreamKind::Depth),
                ("stop", StreamKind::Video),
                ("stop", StreamKind::Depth),
            ]
        );

        // Stopping again changes nothing
        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
