// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{Config, CreateContainerOptions, StartContainerOptions, StopContainerOptions};
use bollard::query_parameters::InspectContainerOptions;
use bollard::Docker;

use super::client::{ContainerRuntime, ContainerState, Inspection, RuntimeError};
use crate::container::Params;

/// Docker-backed [`ContainerRuntime`], talking to the local daemon over its
/// default connection (unix socket on Linux, named pipe on Windows).
pub struct DockerRuntime {
    docker: Docker,
    image: String,
}

impl DockerRuntime {
    pub fn connect(image: String) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|err| RuntimeError::Communication(err.into()))?;
        Ok(Self { docker, image })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, params: &Params) -> Result<String, RuntimeError> {
        let mut labels = HashMap::new();
        labels.insert("calc-gateway.seed".to_string(), params.seed.clone());

        let config = Config {
            image: Some(self.image.clone()),
            labels: Some(labels),
            ..Default::default()
        };
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|err| RuntimeError::Communication(err.into()))?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<String, RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|err| RuntimeError::Communication(err.into()))?;

        let inspection = self.inspect_container(id).await?;
        inspection.ip_address.ok_or_else(|| {
            RuntimeError::Communication(anyhow::anyhow!("container {id} started without an IP address"))
        })
    }

    async fn inspect_container(&self, id: &str) -> Result<Inspection, RuntimeError> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|err| match err {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    RuntimeError::NotFound(id.to_string())
                }
                other => RuntimeError::Communication(other.into()),
            })?;

        let state = response
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|status| ContainerState::parse(&status.to_string()))
            .unwrap_or(ContainerState::Other);

        let ip_address = response
            .network_settings
            .as_ref()
            .and_then(|settings| settings.ip_address.clone())
            .filter(|addr| !addr.is_empty());

        Ok(Inspection { state, ip_address })
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let options = StopContainerOptions { t: Some(timeout.as_secs() as i64) };
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|err| RuntimeError::Communication(err.into()))
    }
}
