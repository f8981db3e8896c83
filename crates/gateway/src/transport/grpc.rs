// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gRPC transport implementing the `Gateway` service defined in
//! `gateway.v1`.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::container::Params;
use crate::transport::CancelOnDrop;
use crate::GatewayState;

/// Generated protobuf types for the `gateway.v1` package.
pub mod proto {
    tonic::include_proto!("gateway.v1");
}

/// gRPC implementation of the `gateway.v1.Gateway` service.
pub struct GatewayGrpc {
    state: Arc<GatewayState>,
}

impl GatewayGrpc {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl proto::gateway_server::Gateway for GatewayGrpc {
    async fn calculate(
        &self,
        request: Request<proto::CalculateRequest>,
    ) -> Result<Response<proto::CalculateResponse>, Status> {
        let req = request.into_inner();
        let params = req.params.ok_or_else(|| Status::invalid_argument("params is required"))?;
        let ctx = self.state.shutdown.child_token();
        let _cancel_on_drop = CancelOnDrop::new(ctx.clone());

        let data = self
            .state
            .dispatcher
            .calculate(ctx, Params { seed: params.seed, input: params.input })
            .await
            .map_err(|err| err.to_tonic_status())?;

        Ok(Response::new(proto::CalculateResponse { data: data.to_vec() }))
    }

    async fn get_container_info(
        &self,
        request: Request<proto::GetContainerInfoRequest>,
    ) -> Result<Response<proto::GetContainerInfoResponse>, Status> {
        let id = request.into_inner().id;
        let entry = self.state.registry.get_by_id(&id).await.map_err(|err| err.to_tonic_status())?;
        let params = entry.params().await;
        let status = entry.status().await;
        let addr = entry.addr().await.unwrap_or_default();
        let timestamps = entry.timestamps().await;
        let now = crate::epoch_ms();

        let info = proto::ContainerInfo {
            id,
            addr,
            params: Some(proto::Params { seed: params.seed, input: params.input }),
            status: format!("{status:?}").to_lowercase(),
            created_unix_ms: now.saturating_sub(timestamps.created.elapsed().as_millis() as u64) as i64,
            updated_unix_ms: now.saturating_sub(timestamps.updated.elapsed().as_millis() as u64) as i64,
            last_used_unix_ms: now.saturating_sub(timestamps.last_used.elapsed().as_millis() as u64) as i64,
        };

        Ok(Response::new(proto::GetContainerInfoResponse { info: Some(info) }))
    }
}
