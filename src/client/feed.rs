//! Viewer side of the push channel: a one-shot bootstrap fetch and a
//! reconnecting event-stream follower.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::event::Event;
use crate::fs::tree::Snapshot;
use crate::sse::{self, Decoder, Record};

pub const DEFAULT_RECONNECT_MIN_MS: u64 = 500;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Connecting,
    Live,
    Reconnecting { attempt: u32, delay: Duration },
}

/// Doubling reconnect delay, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempt += 1;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Shared HTTP client for both endpoints.
///
/// Only connecting is bounded in time; the event stream stays open indefinitely.
pub fn http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Send a GET and return the response if it answered 2xx.
async fn open(client: &Client, addr: &str, path: &str, accept: &str) -> Result<reqwest::Response> {
    let response = client
        .get(format!("http://{addr}{path}"))
        .header(ACCEPT, accept)
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(AppError::Protocol(format!(
            "GET {path} answered {}",
            response.status()
        )));
    }
    Ok(response)
}

/// Fetch the current snapshot once from `GET /tree`.
pub async fn fetch_snapshot(client: &Client, addr: &str) -> Result<Snapshot> {
    let body = open(client, addr, "/tree", "application/json")
        .await?
        .text()
        .await?;
    Snapshot::from_json(&body)
}

/// Fetch the bootstrap snapshot and report the outcome as one event.
pub async fn bootstrap(client: Client, addr: String, tx: UnboundedSender<Event>) {
    let result = fetch_snapshot(&client, &addr).await.map_err(|e| {
        warn!("bootstrap fetch from {addr} failed: {e}");
        e.to_string()
    });
    let _ = tx.send(Event::Bootstrap(result));
}

/// Follow `GET /events` until the viewer goes away, reconnecting with backoff.
pub async fn run_feed(
    client: Client,
    addr: String,
    mut backoff: Backoff,
    tx: UnboundedSender<Event>,
) {
    loop {
        if tx.send(Event::Feed(FeedStatus::Connecting)).is_err() {
            return;
        }
        match follow(&client, &addr, &mut backoff, &tx).await {
            Ok(()) => info!("event stream from {addr} ended"),
            Err(e) => warn!("event stream from {addr} failed: {e}"),
        }
        if tx.is_closed() {
            return;
        }

        let delay = backoff.next_delay();
        let status = FeedStatus::Reconnecting {
            attempt: backoff.attempt(),
            delay,
        };
        if tx.send(Event::Feed(status)).is_err() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

async fn follow(
    client: &Client,
    addr: &str,
    backoff: &mut Backoff,
    tx: &UnboundedSender<Event>,
) -> Result<()> {
    let response = open(client, addr, "/events", sse::CONTENT_TYPE).await?;
    backoff.reset();
    if tx.send(Event::Feed(FeedStatus::Live)).is_err() {
        return Ok(());
    }

    let mut body = response.bytes_stream();
    let mut decoder = Decoder::new();
    while let Some(chunk) = body.next().await {
        for record in decoder.push_bytes(&chunk?) {
            match record {
                Record::Data(json) => match Snapshot::from_json(&json) {
                    Ok(snapshot) => {
                        if tx.send(Event::Snapshot(snapshot)).is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => warn!("discarding malformed snapshot: {e}"),
                },
                Record::Comment(comment) => debug!(%comment, "keep-alive"),
            }
        }
    }
    Ok(())
}
