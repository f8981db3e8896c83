// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cancel::Aggregator;

/// Error delivered on a reader's error channel. Wrapped in `Arc` so the same
/// failure can be fanned out to every reader without cloning the source
/// error.
pub type ReaderError = Arc<anyhow::Error>;

const READER_CHANNEL_CAPACITY: usize = 8;

struct ReaderSlot {
    error_tx: Option<oneshot::Sender<Option<ReaderError>>>,
    body: Option<DuplexStream>,
}

struct State {
    readers: Vec<ReaderSlot>,
    finished: bool,
}

/// Owns one outbound HTTP GET and fans its response body out to every
/// reader registered before the request finished.
///
/// `started` gates the single-flight outbound call; `finished` (inside
/// `state`) marks a duplicator as spent so the multiplexer replaces it with
/// a fresh one on the next caller.
pub struct Duplicator {
    method: reqwest::Method,
    url: String,
    aggregator: Arc<Aggregator>,
    started: AtomicBool,
    state: Mutex<State>,
    fanout_buffer_bytes: usize,
}

impl Duplicator {
    pub fn new(
        method: reqwest::Method,
        url: String,
        aggregator: Arc<Aggregator>,
        fanout_buffer_bytes: usize,
    ) -> Self {
        Self {
            method,
            url,
            aggregator,
            started: AtomicBool::new(false),
            state: Mutex::new(State { readers: Vec::new(), finished: false }),
            fanout_buffer_bytes,
        }
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub async fn is_finished(&self) -> bool {
        self.state.lock().await.finished
    }

    /// Register a new reader. Returns the read half of a duplex pipe plus a
    /// one-shot error channel: the reader must consume exactly one value
    /// from the channel before treating the pipe as readable.
    pub async fn register_reader(&self) -> (DuplexStream, oneshot::Receiver<Option<ReaderError>>) {
        let (body_tx, body_rx) = tokio::io::duplex(self.fanout_buffer_bytes);
        let (error_tx, error_rx) = oneshot::channel();
        let mut state = self.state.lock().await;
        state.readers.push(ReaderSlot { error_tx: Some(error_tx), body: Some(body_tx) });
        (body_rx, error_rx)
    }

    /// Run the outbound request exactly once. Subsequent calls return
    /// immediately — `started` is a single-flight gate, not a re-entrant
    /// lock.
    pub async fn run(self: Arc<Self>, client: reqwest::Client) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let cancel = self.aggregator.output();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(anyhow::anyhow!("all readers abandoned the request")),
            result = client.request(self.method.clone(), &self.url).send() => {
                result.map_err(anyhow::Error::from)
            }
        };

        let response = match outcome {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                let err =
                    anyhow::anyhow!("upstream returned status {}", response.status());
                self.fail_all(err).await;
                return;
            }
            Err(err) => {
                self.fail_all(err).await;
                return;
            }
        };

        self.succeed_all().await;
        self.copy_body(response, cancel).await;
        self.close_all().await;
    }

    async fn fail_all(&self, err: anyhow::Error) {
        let shared = Arc::new(err);
        let mut state = self.state.lock().await;
        state.finished = true;
        for reader in &mut state.readers {
            if let Some(tx) = reader.error_tx.take() {
                let _ = tx.send(Some(shared.clone()));
            }
            reader.body = None;
        }
    }

    async fn succeed_all(&self) {
        let mut state = self.state.lock().await;
        for reader in &mut state.readers {
            if let Some(tx) = reader.error_tx.take() {
                let _ = tx.send(None);
            }
        }
    }

    async fn copy_body(&self, mut response: reqwest::Response, cancel: CancellationToken) {
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                chunk = response.chunk() => chunk,
            };
            let bytes = match chunk {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, url = %self.url, "upstream body read failed mid-stream");
                    break;
                }
            };

            let mut state = self.state.lock().await;
            for reader in &mut state.readers {
                if let Some(body) = reader.body.as_mut() {
                    if body.write_all(&bytes).await.is_err() {
                        reader.body = None;
                    }
                }
            }
        }
    }

    async fn close_all(&self) {
        let mut state = self.state.lock().await;
        state.finished = true;
        for reader in &mut state.readers {
            if let Some(mut body) = reader.body.take() {
                let _ = body.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
#[path = "duplicator_tests.rs"]
mod tests;
