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

//! Bounded in-memory trace buffer (anonymous ingestion path)
//!
//! An explicit ring-like deque behind a single mutex. Insertion prepends;
//! once capacity is exceeded the oldest entries are evicted from the tail
//! (FIFO by insertion order, not LRU by access). Because every insert holds
//! the lock for its whole prepend-then-truncate sequence, no interleaving of
//! concurrent inserts can leave the buffer over capacity.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

use crate::filter::{compute_stats, TraceFilter, TraceStats};
use tracelens_core::{Trace, DEFAULT_PASS_THRESHOLD};

pub const DEFAULT_CAPACITY: usize = 1000;

pub struct BoundedTraceBuffer {
    inner: Mutex<VecDeque<Trace>>,
    capacity: usize,
    pass_threshold: f64,
}

impl Default for BoundedTraceBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_PASS_THRESHOLD)
    }
}

impl BoundedTraceBuffer {
    pub fn new(capacity: usize, pass_threshold: f64) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            pass_threshold,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Insert a batch, newest ending up at the front. Returns the post-insert
    /// store size. Evaluation status is reconciled against the score before
    /// the trace becomes visible.
    pub fn insert(&self, traces: Vec<Trace>) -> usize {
        let mut buffer = self.inner.lock();
        for mut trace in traces {
            if let Some(eval) = trace.evaluation.as_mut() {
                eval.reconcile_status(self.pass_threshold);
            }
            buffer.push_front(trace);
        }
        if buffer.len() > self.capacity {
            let evicted = buffer.len() - self.capacity;
            buffer.truncate(self.capacity);
            debug!(evicted, "evicted oldest traces past capacity");
        }
        buffer.len()
    }

    /// Filtered, paginated read. Returns the page and total matching count.
    pub fn query(&self, filter: &TraceFilter) -> (Vec<Trace>, usize) {
        let buffer = self.inner.lock();
        filter.paginate(buffer.iter())
    }

    /// Look up a single trace by record id.
    pub fn get(&self, id: &str) -> Option<Trace> {
        self.inner.lock().iter().find(|t| t.id == id).cloned()
    }

    /// Replace a stored trace's evaluation block (last write wins).
    pub fn set_evaluation(&self, id: &str, evaluation: tracelens_core::Evaluation) -> bool {
        let mut buffer = self.inner.lock();
        if let Some(trace) = buffer.iter_mut().find(|t| t.id == id) {
            let mut evaluation = evaluation;
            evaluation.reconcile_status(self.pass_threshold);
            trace.evaluation = Some(evaluation);
            true
        } else {
            false
        }
    }

    pub fn aggregate_stats(&self) -> TraceStats {
        let buffer = self.inner.lock();
        compute_stats(buffer.iter())
    }

    /// Snapshot of every stored trace, most recent first.
    pub fn snapshot(&self) -> Vec<Trace> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Delete everything; returns the count removed.
    pub fn clear(&self) -> usize {
        let mut buffer = self.inner.lock();
        let removed = buffer.len();
        buffer.clear();
        removed
    }
}
