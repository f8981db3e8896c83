// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use futures_util::future::select_all;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

struct InputSlot {
    id: u64,
    caller: CancellationToken,
    wrapper: CancellationToken,
}

struct State {
    inputs: Vec<InputSlot>,
    sentinel: Option<u64>,
    finalized: bool,
    next_id: u64,
}

/// Derives an output [`CancellationToken`] that is canceled iff every
/// registered input is canceled, or [`Aggregator::force_cancel`] is called.
///
/// Used by the response multiplexer so an outbound request is canceled only
/// once every in-process reader has abandoned interest — conjunction for
/// natural completion, disjunction for force-cancel.
pub struct Aggregator {
    output: CancellationToken,
    state: Mutex<State>,
    changed: Notify,
}

impl Aggregator {
    /// Derive a new aggregator from `root`. Spawns a background waiter that
    /// lives until the output is canceled.
    pub fn new(root: &CancellationToken) -> Arc<Self> {
        let sentinel = CancellationToken::new();
        let aggregator = Arc::new(Self {
            output: root.child_token(),
            state: Mutex::new(State {
                inputs: vec![InputSlot { id: 0, caller: sentinel.clone(), wrapper: sentinel }],
                sentinel: Some(0),
                finalized: false,
                next_id: 1,
            }),
            changed: Notify::new(),
        });
        tokio::spawn(Self::run(aggregator.clone()));
        aggregator
    }

    pub fn output(&self) -> CancellationToken {
        self.output.clone()
    }

    /// Register additional input tokens. Returns `Canceled` if the
    /// aggregator has already finalized (output canceled).
    pub async fn add_inputs(&self, tokens: Vec<CancellationToken>) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if state.finalized {
            return Err(GatewayError::Canceled);
        }
        for caller in tokens {
            let id = state.next_id;
            state.next_id += 1;
            state.inputs.push(InputSlot { id, caller, wrapper: CancellationToken::new() });
        }
        if let Some(sentinel_id) = state.sentinel.take() {
            if let Some(slot) = state.inputs.iter().find(|s| s.id == sentinel_id) {
                slot.wrapper.cancel();
            }
            state.inputs.retain(|s| s.id != sentinel_id);
        }
        drop(state);
        self.changed.notify_one();
        Ok(())
    }

    /// Cancel the output and every input wrapper. Idempotent.
    pub async fn force_cancel(&self) {
        let mut state = self.state.lock().await;
        if state.finalized {
            return;
        }
        state.finalized = true;
        for slot in &state.inputs {
            slot.wrapper.cancel();
        }
        state.inputs.clear();
        self.output.cancel();
    }

    async fn run(self: Arc<Self>) {
        loop {
            let snapshot: Vec<(u64, CancellationToken, CancellationToken)> = {
                let state = self.state.lock().await;
                if state.finalized {
                    return;
                }
                state.inputs.iter().map(|s| (s.id, s.caller.clone(), s.wrapper.clone())).collect()
            };

            if snapshot.is_empty() {
                let mut state = self.state.lock().await;
                if !state.finalized {
                    state.finalized = true;
                    self.output.cancel();
                }
                return;
            }

            let waits = snapshot.iter().map(|(id, caller, wrapper)| {
                let id = *id;
                let caller = caller.clone();
                let wrapper = wrapper.clone();
                Box::pin(async move {
                    tokio::select! {
                        _ = caller.cancelled() => {}
                        _ = wrapper.cancelled() => {}
                    }
                    id
                })
            });

            tokio::select! {
                (done_id, _, _) = select_all(waits) => {
                    let mut state = self.state.lock().await;
                    state.inputs.retain(|s| s.id != done_id);
                }
                _ = self.changed.notified() => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;
