// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use async_trait::async_trait;

use crate::container::Params;

/// Recognized container runtime states. Anything else is treated as
/// unmapped by the reconciler and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Other,
}

impl ContainerState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Other,
        }
    }
}

/// Inspection result surfaced by the runtime client.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub state: ContainerState,
    pub ip_address: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("container runtime communication failure: {0}")]
    Communication(#[source] anyhow::Error),

    #[error("container runtime timed out")]
    Timeout,

    #[error("container not found: {0}")]
    NotFound(String),
}

/// The four capabilities the gateway core needs from a container runtime.
/// Any runtime that can provide these can stand in for Docker.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_container(&self, params: &Params) -> Result<String, RuntimeError>;

    /// Start a container and return the IP address it is reachable on.
    async fn start_container(&self, id: &str) -> Result<String, RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<Inspection, RuntimeError>;

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError>;
}
