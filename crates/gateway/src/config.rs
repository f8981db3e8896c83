// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the compute-dispatch gateway.
#[derive(Debug, Clone, clap::Parser)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CALC_GATEWAY_HOST")]
    pub host: String,

    /// Port for the HTTP-JSON gateway surface.
    #[arg(long = "http-port", default_value_t = 4224, env = "CALC_GATEWAY_HTTP_PORT")]
    pub http_port: u16,

    /// Port for the binary-RPC (gRPC) surface.
    #[arg(long = "grpc-port", default_value_t = 4334, env = "CALC_GATEWAY_GRPC_PORT")]
    pub grpc_port: u16,

    /// Container image used to spawn worker containers.
    #[arg(long, default_value = "mi-labs-test:latest", env = "CALC_GATEWAY_IMAGE")]
    pub image: String,

    /// Seconds to wait for a newly-started container to report `Ready`.
    #[arg(long, default_value_t = 200, env = "CALC_GATEWAY_CONTAINER_WAIT_SECS")]
    pub container_wait_secs: u64,

    /// Seconds of inactivity (no `Calculate` call) before a container is reaped.
    #[arg(long, default_value_t = 120, env = "CALC_GATEWAY_INACTIVE_TIMEOUT_SECS")]
    pub inactive_timeout_secs: u64,

    /// Interval in milliseconds between reconciler sweeps.
    #[arg(long, default_value_t = 1000, env = "CALC_GATEWAY_CHECK_INTERVAL_MS")]
    pub check_interval_ms: u64,

    /// Per-request timeout in milliseconds for container-runtime client calls.
    #[arg(long, default_value_t = 1000, env = "CALC_GATEWAY_RUNTIME_TIMEOUT_MS")]
    pub runtime_timeout_ms: u64,

    /// Fan-out buffer size (bytes) used when copying an upstream response body
    /// to every multiplexer reader.
    #[arg(long, default_value_t = 102_400, env = "CALC_GATEWAY_MUX_BUFFER_BYTES")]
    pub mux_buffer_bytes: usize,

    /// Bounded channel capacity for per-entry status-change subscriptions.
    #[arg(long, default_value_t = 2, env = "CALC_GATEWAY_SUBSCRIPTION_CAPACITY")]
    pub subscription_capacity: usize,

    /// How often (milliseconds) the dispatcher bumps `lastUsed` for an
    /// in-flight `Calculate` call.
    #[arg(long, default_value_t = 1000, env = "CALC_GATEWAY_TOUCH_INTERVAL_MS")]
    pub touch_interval_ms: u64,
}

impl GatewayConfig {
    pub fn container_wait_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.container_wait_secs)
    }

    pub fn inactive_container_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.inactive_timeout_secs)
    }

    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.check_interval_ms)
    }

    pub fn runtime_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.runtime_timeout_ms)
    }

    pub fn touch_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.touch_interval_ms)
    }
}
