// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response multiplexer: at most one outbound HTTP GET per `(method, url)`
//! fingerprint, fanned out to every in-process reader that registered
//! before the request finished.

mod duplicator;
mod multiplexer;

pub use duplicator::{Duplicator, ReaderError};
pub use multiplexer::ResponseMultiplexer;
