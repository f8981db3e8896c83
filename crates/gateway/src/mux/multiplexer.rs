// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::duplicator::{Duplicator, ReaderError};
use crate::cancel::Aggregator;

/// Deduplicates concurrent identical outbound GETs by `"METHOD:URL"`
/// fingerprint, fanning each one out to every reader that registered before
/// it finished.
pub struct ResponseMultiplexer {
    client: reqwest::Client,
    duplicators: Mutex<HashMap<String, Arc<Duplicator>>>,
    fanout_buffer_bytes: usize,
    root: CancellationToken,
}

impl ResponseMultiplexer {
    /// `root` is the process-wide shutdown token every duplicator's
    /// aggregator derives its output from; it is independent of any single
    /// caller's per-request context.
    pub fn new(client: reqwest::Client, fanout_buffer_bytes: usize, root: CancellationToken) -> Self {
        Self { client, duplicators: Mutex::new(HashMap::new()), fanout_buffer_bytes, root }
    }

    /// Submit a `GET` for `url`, joining an in-flight request for the same
    /// fingerprint if one exists and has not finished.
    pub async fn get_request(
        &self,
        ctx: CancellationToken,
        method: reqwest::Method,
        url: String,
    ) -> (DuplexStream, oneshot::Receiver<Option<ReaderError>>) {
        let fingerprint = format!("{method}:{url}");
        let mut map = self.duplicators.lock().await;

        if let Some(existing) = map.get(&fingerprint).cloned() {
            if !existing.is_finished().await {
                if existing.aggregator().add_inputs(vec![ctx.clone()]).await.is_ok() {
                    drop(map);
                    return existing.register_reader().await;
                }
            }
        }

        let aggregator = Aggregator::new(&self.root);
        let _ = aggregator.add_inputs(vec![ctx]).await;
        let duplicator =
            Arc::new(Duplicator::new(method, url, aggregator, self.fanout_buffer_bytes));
        map.insert(fingerprint, duplicator.clone());
        drop(map);

        let reader = duplicator.register_reader().await;
        tokio::spawn(duplicator.run(self.client.clone()));
        reader
    }
}

#[cfg(test)]
#[path = "multiplexer_tests.rs"]
mod tests;
