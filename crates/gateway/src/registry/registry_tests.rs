// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc as StdArc;

fn params(seed: &str) -> Params {
    Params { seed: seed.into(), input: "x".into() }
}

#[tokio::test]
async fn existing_or_new_creates_once_per_seed() {
    let registry = Registry::new(2);
    let (existed_a, entry_a) = registry.existing_or_new_by_params(params("A")).await;
    let (existed_b, entry_b) = registry.existing_or_new_by_params(params("A")).await;

    assert!(!existed_a);
    assert!(existed_b);
    assert!(StdArc::ptr_eq(&entry_a, &entry_b));
}

#[tokio::test]
async fn existing_or_new_concurrent_same_seed_yields_one_entry() -> anyhow::Result<()> {
    let registry = StdArc::new(Registry::new(2));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.existing_or_new_by_params(params("same")).await.1 }));
    }
    let mut entries = Vec::new();
    for handle in handles {
        entries.push(handle.await?);
    }
    let first = &entries[0];
    assert!(entries.iter().all(|e| StdArc::ptr_eq(e, first)));
    Ok(())
}

#[tokio::test]
async fn ensure_created_indexes_by_id_on_success() -> anyhow::Result<()> {
    let registry = Registry::new(2);
    let (_, entry) = registry.existing_or_new_by_params(params("A")).await;

    let hook: Hook = Box::pin(async move { Ok(HookEffect::SetId("container-1".into())) });
    registry.ensure_created(&entry, vec![hook]).await?;

    let by_id = registry.get_by_id("container-1").await?;
    assert!(StdArc::ptr_eq(&by_id, &entry));
    Ok(())
}

#[tokio::test]
async fn ensure_created_does_not_index_on_hook_failure() -> anyhow::Result<()> {
    let registry = Registry::new(2);
    let (_, entry) = registry.existing_or_new_by_params(params("A")).await;
    let hook: Hook = Box::pin(async move { Err(anyhow::anyhow!("runtime down")) });

    match registry.ensure_created(&entry, vec![hook]).await {
        Err(GatewayError::HookFailure { .. }) => {}
        other => anyhow::bail!("expected HookFailure, got {other:?}"),
    }
    assert!(registry.get_by_id("").await.is_err());
    Ok(())
}

#[tokio::test]
async fn ensure_stopped_moves_out_of_active_buckets() -> anyhow::Result<()> {
    let registry = Registry::new(2);
    let (_, entry) = registry.existing_or_new_by_params(params("A")).await;
    registry
        .ensure_created(&entry, vec![Box::pin(async move { Ok(HookEffect::SetId("c1".into())) })])
        .await?;
    entry.transition(Status::Starting, vec![]).await?;
    entry.transition(Status::Running, vec![]).await?;

    registry.ensure_stopped(&entry, vec![]).await?;

    assert!(registry.get_by_id("c1").await.is_err());
    assert!(registry.get_by_seed("A").await.is_err());
    Ok(())
}

#[tokio::test]
async fn mark_failed_keeps_entry_reachable_by_seed_for_reject_fast() -> anyhow::Result<()> {
    let registry = Registry::new(2);
    let (_, entry) = registry.existing_or_new_by_params(params("A")).await;
    let hook: Hook = Box::pin(async move { Err(anyhow::anyhow!("create failed")) });
    // Created is unreachable after this, go straight New -> Failed.
    let _ = registry.ensure_created(&entry, vec![hook]).await;
    registry.mark_failed(&entry, vec![]).await?;

    // Still reachable by seed so a retried Calculate observes Failed and
    // rejects fast rather than silently spinning up a replacement.
    let by_seed = registry.get_by_seed("A").await?;
    assert!(StdArc::ptr_eq(&by_seed, &entry));
    assert_eq!(entry.status().await, Status::Failed);
    Ok(())
}

#[tokio::test]
async fn old_containers_filters_by_last_used() -> anyhow::Result<()> {
    let registry = Registry::new(2);
    let (_, fresh) = registry.existing_or_new_by_params(params("fresh")).await;
    registry
        .ensure_created(&fresh, vec![Box::pin(async move { Ok(HookEffect::SetId("fresh-id".into())) })])
        .await?;

    let cutoff = Instant::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let old = registry.old_containers(cutoff).await;
    assert!(old.is_empty(), "freshly-touched entry must not appear as old");

    let future_cutoff = Instant::now() + std::time::Duration::from_secs(3600);
    let old = registry.old_containers(future_cutoff).await;
    assert_eq!(old.len(), 1);
    Ok(())
}

#[tokio::test]
async fn delete_removes_from_every_bucket() -> anyhow::Result<()> {
    let registry = Registry::new(2);
    let (_, entry) = registry.existing_or_new_by_params(params("A")).await;
    registry
        .ensure_created(&entry, vec![Box::pin(async move { Ok(HookEffect::SetId("c1".into())) })])
        .await?;

    registry.delete("c1").await;
    assert!(registry.get_by_id("c1").await.is_err());
    assert!(registry.get_by_seed("A").await.is_err());
    Ok(())
}

#[tokio::test]
async fn bucket_counts_reflect_membership() -> anyhow::Result<()> {
    let registry = Registry::new(2);
    let (_, active) = registry.existing_or_new_by_params(params("active")).await;
    registry
        .ensure_created(&active, vec![Box::pin(async move { Ok(HookEffect::SetId("c-active".into())) })])
        .await?;

    let (_, failed) = registry.existing_or_new_by_params(params("failed")).await;
    registry.mark_failed(&failed, vec![]).await?;

    let counts = registry.bucket_counts().await;
    // The failed entry never acquired a runtime ID, so it was never indexed
    // into active_by_id; it remains reachable only by seed (see
    // `mark_failed`'s reject-fast contract) and is counted in `failed`.
    assert_eq!(counts.active, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.stopping, 0);
    Ok(())
}
