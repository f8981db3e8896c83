// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-JSON handlers for the gateway.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::container::Params;
use crate::error::GatewayError;
use crate::registry::BucketCounts;
use crate::transport::CancelOnDrop;
use crate::GatewayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub buckets: BucketCounts,
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub params: ParamsRequest,
}

#[derive(Debug, Deserialize)]
pub struct ParamsRequest {
    pub seed: String,
    pub input: String,
}

#[derive(Debug, Serialize)]
pub struct ContainerInfoResponse {
    pub info: ContainerInfo,
}

#[derive(Debug, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub addr: Option<String>,
    pub seed: String,
    pub input: String,
    pub status: String,
    pub created_unix_ms: u64,
    pub updated_unix_ms: u64,
    pub last_used_unix_ms: u64,
}

/// `GET /api/v1/health`
pub async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let buckets = state.registry.bucket_counts().await;
    Json(HealthResponse { status: "running".to_owned(), buckets })
}

/// `POST /api/v1/calculate`
pub async fn calculate(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CalculateRequest>,
) -> Result<Bytes, GatewayError> {
    let ctx = state.shutdown.child_token();
    let _cancel_on_drop = CancelOnDrop::new(ctx.clone());
    let params = Params { seed: req.params.seed, input: req.params.input };
    state.dispatcher.calculate(ctx, params).await
}

/// `GET /api/v1/containers/{id}`
pub async fn get_container_info(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<ContainerInfoResponse>, GatewayError> {
    let entry = state.registry.get_by_id(&id).await?;
    let params = entry.params().await;
    let status = entry.status().await;
    let addr = entry.addr().await;
    let timestamps = entry.timestamps().await;

    Ok(Json(ContainerInfoResponse {
        info: ContainerInfo {
            id,
            addr,
            seed: params.seed,
            input: params.input,
            status: format!("{status:?}").to_lowercase(),
            created_unix_ms: crate::epoch_ms().saturating_sub(timestamps.created.elapsed().as_millis() as u64),
            updated_unix_ms: crate::epoch_ms().saturating_sub(timestamps.updated.elapsed().as_millis() as u64),
            last_used_unix_ms: crate::epoch_ms().saturating_sub(timestamps.last_used.elapsed().as_millis() as u64),
        },
    }))
}
