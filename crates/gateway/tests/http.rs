// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the HTTP-JSON transport, exercised against the
//! real router with an in-memory container runtime.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use tokio_util::sync::CancellationToken;

use calc_gateway::config::GatewayConfig;
use calc_gateway::container::Params;
use calc_gateway::dispatch::CalculateDispatcher;
use calc_gateway::mux::ResponseMultiplexer;
use calc_gateway::registry::Registry;
use calc_gateway::runtime::InMemoryRuntime;
use calc_gateway::transport::build_router;
use calc_gateway::GatewayState;

fn test_config() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        http_port: 0,
        grpc_port: 0,
        image: "mi-labs-test:latest".into(),
        container_wait_secs: 1,
        inactive_timeout_secs: 120,
        check_interval_ms: 1000,
        runtime_timeout_ms: 1000,
        mux_buffer_bytes: 65536,
        subscription_capacity: 4,
        touch_interval_ms: 1000,
    }
}

fn test_state() -> (Arc<GatewayState>, Arc<Registry>, Arc<InMemoryRuntime>) {
    let config = test_config();
    let registry = Arc::new(Registry::new(config.subscription_capacity));
    let runtime = Arc::new(InMemoryRuntime::new());
    let shutdown = CancellationToken::new();
    let http_client = reqwest::Client::new();
    let mux = Arc::new(ResponseMultiplexer::new(http_client, config.mux_buffer_bytes, shutdown.clone()));
    let dispatcher = Arc::new(CalculateDispatcher::new(
        registry.clone(),
        runtime.clone(),
        mux,
        config.container_wait_timeout(),
        config.touch_interval(),
    ));
    let state = Arc::new(GatewayState { registry: registry.clone(), dispatcher, config, shutdown });
    (state, registry, runtime)
}

fn test_server(state: Arc<GatewayState>) -> anyhow::Result<TestServer> {
    Ok(TestServer::new(build_router(state))?)
}

#[tokio::test]
async fn health_reports_empty_buckets() -> anyhow::Result<()> {
    let (state, _registry, _runtime) = test_state();
    let server = test_server(state)?;

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["buckets"]["active"], 0);
    assert_eq!(body["buckets"]["stopping"], 0);
    assert_eq!(body["buckets"]["failed"], 0);
    Ok(())
}

#[tokio::test]
async fn get_container_info_for_unknown_id_returns_404() -> anyhow::Result<()> {
    let (state, _registry, _runtime) = test_state();
    let server = test_server(state)?;

    let resp = server.get("/api/v1/containers/does-not-exist").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn calculate_rejects_fast_on_terminal_failed_entry() -> anyhow::Result<()> {
    let (state, registry, _runtime) = test_state();
    let (_, entry) =
        registry.existing_or_new_by_params(Params { seed: "doomed".into(), input: "x".into() }).await;
    registry.mark_failed(&entry, vec![]).await?;

    let server = test_server(state)?;
    let resp = server
        .post("/api/v1/calculate")
        .json(&serde_json::json!({"params": {"seed": "doomed", "input": "x"}}))
        .await;
    resp.assert_status(axum::http::StatusCode::CONFLICT);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "ENTRY_FAILED");
    Ok(())
}

#[tokio::test]
async fn calculate_times_out_when_container_never_becomes_ready() -> anyhow::Result<()> {
    // Nothing drives Running -> Ready in this test (that's the reconciler's
    // job in `run`), so the dispatcher's wait for readiness must expire.
    let (state, registry, _runtime) = test_state();
    let server = test_server(state)?;

    let resp = server
        .post("/api/v1/calculate")
        .json(&serde_json::json!({"params": {"seed": "stalled", "input": "x"}}))
        .await;
    resp.assert_status(axum::http::StatusCode::GATEWAY_TIMEOUT);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "TIMEOUT");

    let entry = registry.get_by_seed("stalled").await?;
    assert_eq!(entry.status().await, calc_gateway::container::Status::Starting);
    Ok(())
}

#[tokio::test]
async fn concurrent_calculate_calls_for_the_same_seed_coalesce_onto_one_entry() -> anyhow::Result<()> {
    let (state, registry, _runtime) = test_state();
    let server = Arc::new(test_server(state)?);

    let mut handles = Vec::new();
    for i in 0..5 {
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            server
                .post("/api/v1/calculate")
                .json(&serde_json::json!({"params": {"seed": "shared", "input": i.to_string()}}))
                .await
                .assert_status(axum::http::StatusCode::GATEWAY_TIMEOUT);
        }));
    }
    for h in handles {
        h.await?;
    }

    let counts = registry.bucket_counts().await;
    assert_eq!(counts.active, 1);
    Ok(())
}

#[tokio::test]
async fn get_container_info_reflects_a_ready_container() -> anyhow::Result<()> {
    let (state, registry, runtime) = test_state();
    let (_, entry) =
        registry.existing_or_new_by_params(Params { seed: "info-seed".into(), input: "x".into() }).await;
    let id = runtime.create_container(&entry.params().await).await?;
    entry.set_id(id.clone()).await;
    registry.ensure_created(&entry, vec![]).await?;
    runtime.start_container(&id).await?;
    entry.set_addr("10.0.0.5".into()).await;
    entry.transition(calc_gateway::container::Status::Starting, vec![]).await?;
    entry.transition(calc_gateway::container::Status::Ready, vec![]).await?;

    let server = test_server(state)?;
    let resp = server.get(&format!("/api/v1/containers/{id}")).await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["info"]["id"], id);
    assert_eq!(body["info"]["seed"], "info-seed");
    assert_eq!(body["info"]["addr"], "10.0.0.5");
    assert_eq!(body["info"]["status"], "ready");
    Ok(())
}

#[tokio::test]
async fn timestamps_in_container_info_are_monotonic() -> anyhow::Result<()> {
    let (state, registry, runtime) = test_state();
    let (_, entry) =
        registry.existing_or_new_by_params(Params { seed: "timing".into(), input: "x".into() }).await;
    let id = runtime.create_container(&entry.params().await).await?;
    entry.set_id(id.clone()).await;
    registry.ensure_created(&entry, vec![]).await?;

    let server = test_server(state)?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let resp = server.get(&format!("/api/v1/containers/{id}")).await;
    let body: serde_json::Value = resp.json();

    let created = body["info"]["created_unix_ms"].as_u64().ok_or_else(|| anyhow::anyhow!("missing created_unix_ms"))?;
    let updated = body["info"]["updated_unix_ms"].as_u64().ok_or_else(|| anyhow::anyhow!("missing updated_unix_ms"))?;
    assert!(updated >= created);
    Ok(())
}
