// Copyright 2025 TraceLens Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # TraceLens Store
//!
//! Two operating modes over the same filter/paginate/aggregate contract:
//!
//! - [`BoundedTraceBuffer`] — the anonymous path: a fixed-capacity,
//!   most-recent-first buffer with FIFO-by-insertion eviction.
//! - [`ScopedTraceStore`] — the authenticated path: an async contract an
//!   external storage engine implements, with every operation scoped by an
//!   opaque identity. [`InMemoryScopedStore`] is the reference
//!   implementation.
//!
//! On insert both modes recompute `evaluation.status` from
//! `evaluation.score` when both are present; the score is authoritative.

use thiserror::Error;

pub mod filter;
pub mod memory;
pub mod scoped;

pub use filter::{EvalStatusCounts, TraceFilter, TraceStats, DEFAULT_QUERY_LIMIT};
pub use memory::{BoundedTraceBuffer, DEFAULT_CAPACITY};
pub use scoped::{InMemoryScopedStore, ScopeKey, ScopedTraceStore};

/// Errors surfaced by scoped storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}
