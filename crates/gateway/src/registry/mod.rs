// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coalescing index over [`ContainerEntry`](crate::container::ContainerEntry)
//! values: active/stopping/failed buckets behind one readers-writer lock.

mod registry;

pub use registry::{BucketCounts, Registry};
