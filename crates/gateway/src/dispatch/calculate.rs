// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::container::{ContainerEntry, Hook, HookEffect, Params, Status};
use crate::error::GatewayError;
use crate::mux::ResponseMultiplexer;
use crate::registry::Registry;
use crate::runtime::ContainerRuntime;

/// Orchestrates a single `Calculate` call: obtain or create a registry
/// entry for `seed`, drive it to `Ready`, then fetch the result through the
/// response multiplexer.
pub struct CalculateDispatcher {
    registry: Arc<Registry>,
    runtime: Arc<dyn ContainerRuntime>,
    mux: Arc<ResponseMultiplexer>,
    container_wait_timeout: Duration,
    touch_interval: Duration,
}

impl CalculateDispatcher {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn ContainerRuntime>,
        mux: Arc<ResponseMultiplexer>,
        container_wait_timeout: Duration,
        touch_interval: Duration,
    ) -> Self {
        Self { registry, runtime, mux, container_wait_timeout, touch_interval }
    }

    pub async fn calculate(&self, ctx: CancellationToken, params: Params) -> Result<Bytes, GatewayError> {
        let (existed, entry) = self.registry.existing_or_new_by_params(params.clone()).await;
        info!(seed = %params.seed, existed, "dispatching calculate request");

        if entry.status().await == Status::Failed {
            warn!(seed = %params.seed, "rejecting fast: entry for seed is terminally failed");
            return Err(GatewayError::EntryFailed);
        }

        let refresher = self.spawn_last_used_refresher(entry.clone(), ctx.clone());
        let result = self.drive(ctx, entry.clone(), params).await;
        refresher.abort();
        result
    }

    async fn drive(
        &self,
        ctx: CancellationToken,
        entry: Arc<ContainerEntry>,
        params: Params,
    ) -> Result<Bytes, GatewayError> {
        if let Err(err) = self.ensure_created(&entry).await {
            let _ = self.registry.mark_failed(&entry, vec![]).await;
            return Err(err);
        }

        self.ensure_started(&entry).await?;
        self.await_ready(&entry).await?;

        let addr = entry.addr().await.ok_or(GatewayError::Internal(anyhow::anyhow!(
            "entry reached Ready without an address"
        )))?;
        let url = format!("http://{addr}:8080/calculate/{}", params.input);

        let (mut body, error_rx) =
            self.mux.get_request(ctx, reqwest::Method::GET, url).await;

        match error_rx.await {
            Ok(Some(err)) => return Err(GatewayError::Probe(anyhow::anyhow!(err.to_string()))),
            Ok(None) => {}
            Err(_) => return Err(GatewayError::Internal(anyhow::anyhow!("duplicator dropped without a reply"))),
        }

        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)
            .await
            .map_err(|err| GatewayError::Probe(anyhow::anyhow!(err)))?;
        Ok(Bytes::from(bytes))
    }

    /// `New -> Created`. Treats `TransitionNotAllowed` as success when the
    /// entry is observably already at or past `Created`.
    async fn ensure_created(&self, entry: &Arc<ContainerEntry>) -> Result<(), GatewayError> {
        let runtime = self.runtime.clone();
        let params = entry.params().await;
        let hook: Hook = Box::pin(async move {
            let id = runtime.create_container(&params).await?;
            Ok(HookEffect::SetId(id))
        });

        match self.registry.ensure_created(entry, vec![hook]).await {
            Ok(()) => Ok(()),
            Err(GatewayError::TransitionNotAllowed { .. }) if entry.status().await.is_at_least_created() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// `Created/Paused/Stopped -> Starting`.
    async fn ensure_started(&self, entry: &Arc<ContainerEntry>) -> Result<(), GatewayError> {
        let runtime = self.runtime.clone();
        let id = entry.id().await;
        let hook: Hook = Box::pin(async move {
            let addr = runtime.start_container(&id).await?;
            Ok(HookEffect::SetAddr(addr))
        });

        match entry.transition(Status::Starting, vec![hook]).await {
            Ok(()) => Ok(()),
            Err(GatewayError::TransitionNotAllowed { from, .. })
                if !matches!(from, Status::New | Status::Failed) =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Subscribes before re-checking `status` to close the race between
    /// subscribe and the event that motivated it, then blocks on events
    /// until `Ready` or the wait timeout.
    async fn await_ready(&self, entry: &Arc<ContainerEntry>) -> Result<(), GatewayError> {
        let (initial, mut sub) = entry.subscribe().await;
        if initial == Status::Ready {
            entry.unsubscribe(sub).await;
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + self.container_wait_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                entry.unsubscribe(sub).await;
                return Err(GatewayError::Timeout);
            }
            match tokio::time::timeout(remaining, sub.recv()).await {
                Ok(Some(Status::Ready)) => {
                    entry.unsubscribe(sub).await;
                    return Ok(());
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    // Channel closed without ever seeing Ready; re-check
                    // status directly since events can be dropped.
                    if entry.status().await == Status::Ready {
                        return Ok(());
                    }
                    return Err(GatewayError::Timeout);
                }
                Err(_) => {
                    entry.unsubscribe(sub).await;
                    return Err(GatewayError::Timeout);
                }
            }
        }
    }

    fn spawn_last_used_refresher(
        &self,
        entry: Arc<ContainerEntry>,
        ctx: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let interval = self.touch_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = ticker.tick() => entry.touch().await,
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "calculate_tests.rs"]
mod tests;
