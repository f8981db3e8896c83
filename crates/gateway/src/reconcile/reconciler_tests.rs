// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::container::Params;
use crate::runtime::InMemoryRuntime;

async fn running_entry(
    registry: &Arc<Registry>,
    runtime: &Arc<InMemoryRuntime>,
    seed: &str,
) -> anyhow::Result<Arc<ContainerEntry>> {
    let (_, entry) = registry
        .existing_or_new_by_params(Params { seed: seed.to_string(), input: "x".to_string() })
        .await;
    let id = runtime.create_container(&entry.params().await).await?;
    entry.set_id(id.clone()).await;
    registry.ensure_created(&entry, vec![]).await?;
    runtime.start_container(&id).await?;
    entry.transition(Status::Starting, vec![]).await?;
    entry.transition(Status::Running, vec![]).await?;
    Ok(entry)
}

fn reconciler(registry: Arc<Registry>, runtime: Arc<InMemoryRuntime>, inactive_timeout: Duration) -> Reconciler {
    Reconciler::new(
        registry,
        runtime,
        reqwest::Client::new(),
        Duration::from_millis(10),
        inactive_timeout,
        Duration::from_millis(100),
    )
}

#[tokio::test]
async fn running_container_with_unreachable_health_becomes_unreachable() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(2));
    let runtime = Arc::new(InMemoryRuntime::new());
    let entry = running_entry(&registry, &runtime, "a").await?;
    let reconciler = reconciler(registry, runtime, Duration::from_secs(120));

    reconciler.probe_active_containers().await;
    assert_eq!(entry.status().await, Status::Unreachable);
    Ok(())
}

#[tokio::test]
async fn paused_runtime_state_maps_to_paused_status() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(2));
    let runtime = Arc::new(InMemoryRuntime::new());
    let entry = running_entry(&registry, &runtime, "a").await?;
    let id = entry.id().await;
    runtime.set_state(&id, ContainerState::Paused).await;
    let reconciler = reconciler(registry, runtime, Duration::from_secs(120));

    reconciler.probe_active_containers().await;
    assert_eq!(entry.status().await, Status::Paused);
    Ok(())
}

#[tokio::test]
async fn exited_runtime_state_stops_the_entry_and_moves_bucket() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(2));
    let runtime = Arc::new(InMemoryRuntime::new());
    let entry = running_entry(&registry, &runtime, "a").await?;
    let id = entry.id().await;
    runtime.set_state(&id, ContainerState::Exited).await;
    let reconciler = reconciler(registry.clone(), runtime, Duration::from_secs(120));

    reconciler.probe_active_containers().await;
    assert_eq!(entry.status().await, Status::Stopped);
    assert!(registry.active_containers().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn unmapped_runtime_state_leaves_status_untouched() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(2));
    let runtime = Arc::new(InMemoryRuntime::new());
    let entry = running_entry(&registry, &runtime, "a").await?;
    let id = entry.id().await;
    runtime.set_state(&id, ContainerState::Created).await;
    let reconciler = reconciler(registry, runtime, Duration::from_secs(120));

    reconciler.probe_active_containers().await;
    assert_eq!(entry.status().await, Status::Running);
    Ok(())
}

#[tokio::test]
async fn idle_entry_past_threshold_is_reaped() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(2));
    let runtime = Arc::new(InMemoryRuntime::new());
    let entry = running_entry(&registry, &runtime, "a").await?;
    let reconciler = reconciler(registry.clone(), runtime, Duration::from_millis(20));

    tokio::time::sleep(Duration::from_millis(40)).await;
    reconciler.reap_idle_containers().await;

    assert_eq!(entry.status().await, Status::Stopped);
    assert!(registry.active_containers().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn reap_aborts_when_last_used_advances_before_the_hook_rechecks() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(2));
    let runtime = Arc::new(InMemoryRuntime::new());
    let entry = running_entry(&registry, &runtime, "a").await?;
    let reconciler = reconciler(registry.clone(), runtime, Duration::from_millis(20));

    tokio::time::sleep(Duration::from_millis(40)).await;
    // An in-flight dispatcher bumps lastUsed between the sweep's snapshot
    // and the hook's re-check.
    entry.touch().await;
    reconciler.reap_one(entry.clone()).await;

    assert_eq!(entry.status().await, Status::Running);
    assert_eq!(registry.active_containers().await.len(), 1);
    Ok(())
}
