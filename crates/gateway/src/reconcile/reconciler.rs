// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::container::{ContainerEntry, Hook, HookEffect, Status};
use crate::error::GatewayError;
use crate::registry::Registry;
use crate::runtime::{ContainerRuntime, ContainerState};

enum Probe {
    Ready,
    NotReady,
    Unreachable,
}

/// Two independent periodic sweeps over the registry's active entries: a
/// runtime-state probe that reconciles `status` with what the container
/// runtime and the container's own `/health` endpoint report, and an idle
/// reaper that stops containers whose `lastUsed` has aged out.
pub struct Reconciler {
    registry: Arc<Registry>,
    runtime: Arc<dyn ContainerRuntime>,
    http_client: reqwest::Client,
    tick_interval: Duration,
    inactive_timeout: Duration,
    stop_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn ContainerRuntime>,
        http_client: reqwest::Client,
        tick_interval: Duration,
        inactive_timeout: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self { registry, runtime, http_client, tick_interval, inactive_timeout, stop_timeout }
    }

    /// Spawn both sweeps as independent tasks, each stopping when `shutdown`
    /// is canceled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> (JoinHandle<()>, JoinHandle<()>) {
        let probe_sweep = self.clone();
        let probe_shutdown = shutdown.clone();
        let probe_handle = tokio::spawn(async move { probe_sweep.run_probe_sweep(probe_shutdown).await });

        let reaper_sweep = self;
        let reaper_handle = tokio::spawn(async move { reaper_sweep.run_idle_reaper(shutdown).await });

        (probe_handle, reaper_handle)
    }

    async fn run_probe_sweep(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => self.probe_active_containers().await,
            }
        }
    }

    async fn run_idle_reaper(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => self.reap_idle_containers().await,
            }
        }
    }

    async fn probe_active_containers(&self) {
        for entry in self.registry.active_containers().await {
            self.probe_one(&entry).await;
        }
    }

    async fn probe_one(&self, entry: &Arc<ContainerEntry>) {
        let id = entry.id().await;
        if id.is_empty() {
            return;
        }

        let inspection = match self.runtime.inspect_container(&id).await {
            Ok(inspection) => inspection,
            Err(err) => {
                warn!(container_id = %id, error = %err, "reconciler probe failed to inspect container");
                return;
            }
        };

        let target = match inspection.state {
            ContainerState::Running => Some(match self.health_check(entry).await {
                Probe::Ready => Status::Ready,
                Probe::NotReady => Status::Running,
                Probe::Unreachable => Status::Unreachable,
            }),
            ContainerState::Paused => Some(Status::Paused),
            ContainerState::Restarting => Some(Status::Starting),
            ContainerState::Removing | ContainerState::Exited | ContainerState::Dead => Some(Status::Stopped),
            ContainerState::Created | ContainerState::Other => None,
        };

        let Some(target) = target else { return };

        let result = if target == Status::Stopped {
            self.registry.ensure_stopped(entry, vec![]).await
        } else {
            entry.transition(target, vec![]).await
        };

        match result {
            Ok(()) | Err(GatewayError::TransitionNotAllowed { .. }) => {}
            Err(err) => warn!(container_id = %id, target = ?target, error = %err, "reconciler transition failed"),
        }
    }

    async fn health_check(&self, entry: &Arc<ContainerEntry>) -> Probe {
        let Some(addr) = entry.addr().await else { return Probe::Unreachable };
        let url = format!("http://{addr}:8080/health");
        match self.http_client.get(url).send().await {
            Ok(response) if response.status().is_success() => Probe::Ready,
            Ok(_) => Probe::NotReady,
            Err(_) => Probe::Unreachable,
        }
    }

    async fn reap_idle_containers(&self) {
        let threshold = Instant::now() - self.inactive_timeout;
        for entry in self.registry.old_containers(threshold).await {
            self.reap_one(entry).await;
        }
    }

    async fn reap_one(&self, entry: Arc<ContainerEntry>) {
        let inactive_timeout = self.inactive_timeout;
        let stop_timeout = self.stop_timeout;
        let runtime = self.runtime.clone();
        let id = entry.id().await;

        let hook: Hook = Box::pin(async move {
            runtime.stop_container(&id, stop_timeout).await?;
            Ok(HookEffect::None)
        });

        // Re-checked under the entry lock, atomically with the transition,
        // to close the race with an in-flight dispatcher that bumped
        // `lastUsed` after the sweep snapshot was taken.
        let recheck = move |last_used: Instant| last_used < Instant::now() - inactive_timeout;

        match self.registry.ensure_stopped_checked(&entry, recheck, vec![hook]).await {
            Ok(()) => info!(container_id = %entry.id().await, "reconciler reaped idle container"),
            Err(GatewayError::HookFailure { .. }) => {}
            Err(GatewayError::TransitionNotAllowed { .. }) => {}
            Err(err) => warn!(error = %err, "reconciler reap failed"),
        }
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
