// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single registry entry: one logical worker container, its lifecycle
//! status, timestamps, and status-change subscribers.

use std::collections::HashMap;
use std::time::Instant;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::error::GatewayError;

/// A hook attached to a transition: arbitrary side-effecting work (a runtime
/// call, an HTTP probe) run under the entry lock before the status changes.
/// Any error aborts the transition.
///
/// A hook reports the mutation it wants applied via its `Ok` value rather
/// than calling back into `ContainerEntry`'s own locking accessors (`set_id`,
/// `set_addr`, `last_used`, `touch`) — those take the same lock `transition`
/// already holds while running hooks, and `tokio::sync::Mutex` is not
/// reentrant.
pub type Hook = BoxFuture<'static, anyhow::Result<HookEffect>>;

/// The mutation a hook's side effect wants applied to the entry once it
/// resolves, applied by `transition` itself while the lock is already held.
#[derive(Debug, Clone)]
pub enum HookEffect {
    None,
    SetId(String),
    SetAddr(String),
}

/// Container lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    Created,
    Starting,
    Running,
    Ready,
    Unreachable,
    Paused,
    Stopped,
    Failed,
}

impl Status {
    /// Whether `from -> to` is a legal edge in the lifecycle graph.
    /// A self-loop (`s -> s`) is handled separately by the caller; it is not
    /// one of these edges.
    pub fn allowed(from: Status, to: Status) -> bool {
        use Status::*;
        matches!(
            (from, to),
            (New, Created)
                | (New, Failed)
                | (Created, Starting)
                | (Created, Running)
                | (Created, Ready)
                | (Starting, Running)
                | (Starting, Paused)
                | (Starting, Stopped)
                | (Starting, Unreachable)
                | (Running, Ready)
                | (Running, Unreachable)
                | (Running, Paused)
                | (Running, Stopped)
                | (Ready, Running)
                | (Ready, Unreachable)
                | (Ready, Paused)
                | (Ready, Stopped)
                | (Unreachable, Running)
                | (Unreachable, Ready)
                | (Unreachable, Paused)
                | (Unreachable, Stopped)
                | (Paused, Starting)
                | (Paused, Stopped)
                | (Stopped, Starting)
        )
    }

    /// `true` for every status at or past `Created` in the lifecycle — the
    /// point at which a container has a runtime-assigned ID. `Failed` is
    /// excluded: it is a terminal sibling of `Created` reachable only from
    /// `New`, not something downstream of it. Used by late-binding-style
    /// callers to decide whether an ID exists yet.
    pub fn is_at_least_created(self) -> bool {
        !matches!(self, Status::New | Status::Failed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Failed)
    }
}

/// Coalescing parameters for a `Calculate` call.
///
/// Only `seed` participates in registry coalescing; `input` travels with
/// each call and is retained here only as the value the entry was first
/// created with (see spec.md §9 on the `input`-as-key ambiguity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    pub seed: String,
    pub input: String,
}

struct Inner {
    id: String,
    addr: Option<String>,
    params: Params,
    status: Status,
    created: Instant,
    scheduled: Option<Instant>,
    started: Option<Instant>,
    stopped: Option<Instant>,
    updated: Instant,
    last_used: Instant,
    subscribers: HashMap<u64, mpsc::Sender<Status>>,
    next_subscriber_id: u64,
}

/// One registry record representing one logical worker container.
pub struct ContainerEntry {
    inner: Mutex<Inner>,
    default_subscription_capacity: usize,
}

/// A handle returned by [`ContainerEntry::subscribe`]. Consumers receive
/// status transitions on `recv` and must call
/// [`ContainerEntry::unsubscribe`] with the handle when done.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Status>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next status transition, or `None` if unsubscribed.
    ///
    /// Delivery is at-most-once per transition, best-effort: a transition
    /// that occurs while this channel's buffer is full is silently dropped.
    /// Callers must re-read `status()` after each received event rather than
    /// trust this stream to enumerate every transition.
    pub async fn recv(&mut self) -> Option<Status> {
        self.rx.recv().await
    }
}

impl ContainerEntry {
    pub fn new(params: Params, default_subscription_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            inner: Mutex::new(Inner {
                id: String::new(),
                addr: None,
                params,
                status: Status::New,
                created: now,
                scheduled: None,
                started: None,
                stopped: None,
                updated: now,
                last_used: now,
                subscribers: HashMap::new(),
                next_subscriber_id: 1,
            }),
            default_subscription_capacity,
        }
    }

    pub async fn status(&self) -> Status {
        self.inner.lock().await.status
    }

    pub async fn id(&self) -> String {
        self.inner.lock().await.id.clone()
    }

    pub async fn addr(&self) -> Option<String> {
        self.inner.lock().await.addr.clone()
    }

    pub async fn params(&self) -> Params {
        self.inner.lock().await.params.clone()
    }

    pub async fn last_used(&self) -> Instant {
        self.inner.lock().await.last_used
    }

    pub async fn touch(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        if now > inner.last_used {
            inner.last_used = now;
        }
    }

    pub async fn set_id(&self, id: String) {
        self.inner.lock().await.id = id;
    }

    pub async fn set_addr(&self, addr: String) {
        self.inner.lock().await.addr = Some(addr);
    }

    pub async fn timestamps(&self) -> EntryTimestamps {
        let inner = self.inner.lock().await;
        EntryTimestamps {
            created: inner.created,
            scheduled: inner.scheduled,
            started: inner.started,
            stopped: inner.stopped,
            updated: inner.updated,
            last_used: inner.last_used,
        }
    }

    /// Drive the entry toward `target`, running `hooks` in order under the
    /// entry's exclusive lock.
    ///
    /// - `target == current`: hooks run (the idempotence hatch); status,
    ///   `updated`, and subscribers are left untouched.
    /// - `target` not reachable from `current`: `TransitionNotAllowed`,
    ///   hooks never run.
    /// - otherwise: hooks run; on success, status is set, `updated` is
    ///   stamped, `persist()` (a stub) is invoked, subscribers are notified.
    ///
    /// Any hook error aborts the transition (status unchanged, no notify)
    /// and is returned as `HookFailure`. Each hook's `Ok(HookEffect)` is
    /// applied to the entry directly, without re-acquiring the lock.
    pub async fn transition(&self, target: Status, hooks: Vec<Hook>) -> Result<(), GatewayError> {
        self.transition_locked(target, None, hooks).await
    }

    /// As `transition`, but first re-checks `last_used` against `recheck`
    /// while still holding the lock, aborting with `HookFailure` if it
    /// returns `false`. Used by the idle reaper to close the race between a
    /// sweep's snapshot and a concurrent caller bumping `last_used`.
    pub async fn transition_with_recheck(
        &self,
        target: Status,
        recheck: impl FnOnce(Instant) -> bool + Send + 'static,
        hooks: Vec<Hook>,
    ) -> Result<(), GatewayError> {
        self.transition_locked(target, Some(Box::new(recheck)), hooks).await
    }

    async fn transition_locked(
        &self,
        target: Status,
        recheck: Option<Box<dyn FnOnce(Instant) -> bool + Send>>,
        hooks: Vec<Hook>,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        let from = inner.status;

        if from != target && !Status::allowed(from, target) {
            return Err(GatewayError::TransitionNotAllowed { from, to: target });
        }

        if let Some(recheck) = recheck {
            if !recheck(inner.last_used) {
                return Err(GatewayError::HookFailure {
                    from,
                    to: target,
                    source: anyhow::anyhow!("transition precondition failed on recheck"),
                });
            }
        }

        for hook in hooks {
            let effect = hook.await.map_err(|source| GatewayError::HookFailure { from, to: target, source })?;
            match effect {
                HookEffect::None => {}
                HookEffect::SetId(id) => inner.id = id,
                HookEffect::SetAddr(addr) => inner.addr = Some(addr),
            }
        }

        if from == target {
            return Ok(());
        }

        match (from, target) {
            (_, Status::Starting) => inner.scheduled = Some(Instant::now()),
            (Status::Starting, Status::Ready) => inner.started = Some(Instant::now()),
            (_, Status::Stopped) => inner.stopped = Some(Instant::now()),
            _ => {}
        }
        inner.status = target;
        inner.updated = Instant::now();
        self.persist();
        notify_subscribers(&inner, target);
        Ok(())
    }

    /// Deliberate stub: the gateway is memory-resident and never persists
    /// entry state across a restart (see spec.md §1 Non-goals). Left
    /// overridable so a future revision can wire a real store without
    /// touching `transition`'s contract.
    fn persist(&self) {}

    /// Subscribe to status transitions. Checks `status` *once before* the
    /// first read closes the race between subscribing and the event that
    /// motivated it — callers should read the returned status before
    /// looping on `recv`.
    pub async fn subscribe(&self) -> (Status, Subscription) {
        let mut inner = self.inner.lock().await;
        let (tx, rx) = mpsc::channel(self.default_subscription_capacity.max(2));
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(id, tx);
        (inner.status, Subscription { id, rx })
    }

    /// Remove a subscription and drain any buffered events without holding
    /// the entry lock across the drain.
    pub async fn unsubscribe(&self, sub: Subscription) {
        let Subscription { id, mut rx } = sub;
        {
            let mut inner = self.inner.lock().await;
            inner.subscribers.remove(&id);
        }
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
    }
}

fn notify_subscribers(inner: &Inner, status: Status) {
    for tx in inner.subscribers.values() {
        // Non-blocking: a full channel means the event is dropped, never
        // buffered elsewhere and never allowed to block the lock holder.
        let _ = tx.try_send(status);
    }
}

/// Snapshot of an entry's timestamps, for `GetContainerInfo` responses.
#[derive(Debug, Clone, Copy)]
pub struct EntryTimestamps {
    pub created: Instant,
    pub scheduled: Option<Instant>,
    pub started: Option<Instant>,
    pub stopped: Option<Instant>,
    pub updated: Instant,
    pub last_used: Instant,
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
