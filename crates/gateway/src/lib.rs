// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Calc-gateway: a compute-dispatch gateway that coalesces concurrent
//! requests for the same seed onto one worker container and streams its
//! response back to every caller.

pub mod cancel;
pub mod config;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod mux;
pub mod reconcile;
pub mod registry;
pub mod runtime;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::dispatch::CalculateDispatcher;
use crate::mux::ResponseMultiplexer;
use crate::reconcile::Reconciler;
use crate::registry::Registry;
use crate::runtime::ContainerRuntime;
#[cfg(feature = "docker")]
use crate::runtime::DockerRuntime;
use crate::transport::build_router;

/// Shared state handed to every HTTP and gRPC handler.
pub struct GatewayState {
    pub registry: Arc<Registry>,
    pub dispatcher: Arc<CalculateDispatcher>,
    pub config: GatewayConfig,
    pub shutdown: CancellationToken,
}

/// Return current epoch millis, used to render `Instant` timestamps as
/// wall-clock values in `GetContainerInfo` responses.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Run the gateway until `shutdown` is canceled: bind the HTTP-JSON and
/// gRPC surfaces, spawn the reconciler's two sweeps, and serve.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let registry = Arc::new(Registry::new(config.subscription_capacity));
    let runtime = build_runtime(&config)?;
    let http_client = reqwest::Client::builder().timeout(config.runtime_timeout()).build()?;
    let mux = Arc::new(ResponseMultiplexer::new(
        http_client.clone(),
        config.mux_buffer_bytes,
        shutdown.clone(),
    ));
    let dispatcher = Arc::new(CalculateDispatcher::new(
        registry.clone(),
        runtime.clone(),
        mux,
        config.container_wait_timeout(),
        config.touch_interval(),
    ));

    let reconciler = Arc::new(Reconciler::new(
        registry.clone(),
        runtime,
        http_client,
        config.check_interval(),
        config.inactive_container_timeout(),
        Duration::from_secs(10),
    ));
    reconciler.spawn(shutdown.clone());

    let state = Arc::new(GatewayState {
        registry,
        dispatcher,
        config: config.clone(),
        shutdown: shutdown.clone(),
    });

    let http_addr = format!("{}:{}", config.host, config.http_port);
    let grpc_addr = format!("{}:{}", config.host, config.grpc_port).parse()?;

    tracing::info!(http_addr = %http_addr, grpc_addr = %grpc_addr, "calc-gateway listening");

    let router = build_router(state.clone());
    let http_listener = TcpListener::bind(&http_addr).await?;
    let http_shutdown = shutdown.clone();
    let http_server =
        tokio::spawn(
            async move { axum::serve(http_listener, router).with_graceful_shutdown(http_shutdown.cancelled_owned()).await },
        );

    let grpc_service = crate::transport::grpc::GatewayGrpc::new(state);
    let grpc_shutdown = shutdown.clone();
    let grpc_server = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(crate::transport::grpc::proto::gateway_server::GatewayServer::new(grpc_service))
            .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled())
            .await
    });

    http_server.await??;
    grpc_server.await??;
    Ok(())
}

fn build_runtime(config: &GatewayConfig) -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    #[cfg(feature = "docker")]
    {
        Ok(Arc::new(DockerRuntime::connect(config.image.clone())?))
    }
    #[cfg(not(feature = "docker"))]
    {
        let _ = config;
        Ok(Arc::new(crate::runtime::InMemoryRuntime::new()))
    }
}
