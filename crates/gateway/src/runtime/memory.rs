// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::client::{ContainerRuntime, ContainerState, Inspection, RuntimeError};
use crate::container::Params;

struct FakeContainer {
    state: ContainerState,
    ip_address: Option<String>,
}

/// In-memory [`ContainerRuntime`] fake: every container "runs" instantly
/// with a synthesized loopback address. Used by dispatcher/reconciler
/// tests that need a runtime without a Docker daemon.
pub struct InMemoryRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self { containers: Mutex::new(HashMap::new()) }
    }

    pub async fn set_state(&self, id: &str, state: ContainerState) {
        if let Some(container) = self.containers.lock().await.get_mut(id) {
            container.state = state;
        }
    }
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn create_container(&self, _params: &Params) -> Result<String, RuntimeError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.containers
            .lock()
            .await
            .insert(id.clone(), FakeContainer { state: ContainerState::Created, ip_address: None });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<String, RuntimeError> {
        let mut containers = self.containers.lock().await;
        let container = containers.get_mut(id).ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        container.state = ContainerState::Running;
        container.ip_address = Some("127.0.0.1".to_string());
        Ok("127.0.0.1".to_string())
    }

    async fn inspect_container(&self, id: &str) -> Result<Inspection, RuntimeError> {
        let containers = self.containers.lock().await;
        let container = containers.get(id).ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        Ok(Inspection { state: container.state, ip_address: container.ip_address.clone() })
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().await;
        let container = containers.get_mut(id).ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        container.state = ContainerState::Exited;
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
