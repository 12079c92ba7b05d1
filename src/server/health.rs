//! Health Route
//!
//! - GET /health - Server state, connection and subscriber counts

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BroadcastServer, ServerState};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: String,
    pub connections: usize,
    /// Subscriber count per topic
    pub topics: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health
pub async fn health(State(server): State<Arc<BroadcastServer>>) -> Json<HealthResponse> {
    let state = server.state();
    let status = match state {
        ServerState::Listening => "healthy",
        ServerState::Created => "starting",
        ServerState::ShuttingDown | ServerState::Stopped => "stopping",
    };

    let topics = server
        .topics()
        .into_iter()
        .filter_map(|topic| {
            server
                .channel(topic)
                .map(|channel| (topic.to_string(), channel.subscriber_count()))
        })
        .collect();

    Json(HealthResponse {
        status: status.to_string(),
        state: state.to_string(),
        connections: server.connection_count(),
        topics,
        uptime_seconds: server.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::device::{SyntheticConfig, SyntheticDevice};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let device = SyntheticDevice::new(SyntheticConfig::default()).unwrap();
        let server = Arc::new(BroadcastServer::new(ServerConfig::default(), Arc::new(device)));

        let response = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "starting");
        assert_eq!(health.state, "created");
        assert_eq!(health.connections, 0);
        assert_eq!(health.topics.get("video"), Some(&0));
        assert_eq!(health.topics.get("depth"), Some(&0));
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }
}
