// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-JSON and gRPC transport for the gateway, both surfaces identical
//! in semantics (spec.md §6).

pub mod grpc;
pub mod http;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::GatewayState;

/// Cancels its token when dropped.
///
/// Both axum and tonic drop the future driving a handler when the client
/// disconnects mid-request, before the handler itself returns — holding one
/// of these for the lifetime of a `calculate` call turns that drop into a
/// cancellation signal the dispatcher's multiplexer can observe, rather than
/// only ever canceling on full process shutdown.
pub(crate) struct CancelOnDrop(CancellationToken);

impl CancelOnDrop {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self(token)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Build the axum `Router` exposing the HTTP-JSON gateway surface.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/calculate", post(http::calculate))
        .route("/api/v1/containers/{id}", get(http::get_container_info))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
