//! HTTP endpoint: `GET /events` streams snapshots, `GET /tree` returns one
//! snapshot.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fs::tree::TreeSource;
use crate::server::hub::{HubHandle, Subscription};
use crate::sse;

/// Default keep-alive cadence on idle event streams.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;

#[derive(Clone)]
struct ServerState {
    hub: HubHandle,
    source: Arc<dyn TreeSource>,
    heartbeat: Duration,
}

/// Routes of the snapshot server. Other methods on these paths get 405,
/// other paths 404.
pub fn router(hub: HubHandle, source: Arc<dyn TreeSource>, heartbeat: Duration) -> Router {
    Router::new()
        .route("/events", get(events))
        .route("/tree", get(tree))
        .with_state(ServerState {
            hub,
            source,
            heartbeat,
        })
}

/// Serve until the listener fails.
pub async fn serve(
    listener: TcpListener,
    hub: HubHandle,
    source: Arc<dyn TreeSource>,
    heartbeat: Duration,
) -> Result<()> {
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(hub, source, heartbeat)).await?;
    Ok(())
}

async fn events(State(state): State<ServerState>) -> Response {
    let subscription = match state.hub.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("cannot open event stream: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "unavailable\n").into_response();
        }
    };
    debug!(subscriber = subscription.id(), "event stream opened");

    // Heartbeats are only sent after `heartbeat` without a snapshot.
    Sse::new(snapshot_events(subscription))
        .keep_alive(
            KeepAlive::new()
                .interval(state.heartbeat)
                .text(sse::HEARTBEAT_COMMENT),
        )
        .into_response()
}

/// One data event per pushed snapshot. The subscription, and with it the
/// registration, goes away when the client disconnects and the body is dropped.
fn snapshot_events(
    subscription: Subscription,
) -> impl Stream<Item = std::result::Result<SseEvent, Infallible>> {
    stream::unfold(subscription, |mut subscription| async move {
        let payload = subscription.recv().await?;
        Some((Ok(SseEvent::default().data(&*payload)), subscription))
    })
}

async fn tree(State(state): State<ServerState>) -> Response {
    let snapshot = match state.source.ensure_exists().await {
        Ok(()) => state.source.read_snapshot().await,
        Err(e) => Err(e),
    };
    match snapshot.and_then(|s| s.to_json()) {
        Ok(json) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            json,
        )
            .into_response(),
        Err(e) => {
            warn!("snapshot read for bootstrap failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "snapshot unavailable\n").into_response()
        }
    }
}
