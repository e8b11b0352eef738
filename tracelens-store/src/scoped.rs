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

//! Identity-scoped trace storage (authenticated path)
//!
//! The persistent database is an external collaborator; this module defines
//! the contract the core consumes and a DashMap-backed reference
//! implementation. The contract only requires the scope key to be passed
//! through — transaction and consistency guarantees belong to the backend.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::filter::{compute_stats, TraceFilter, TraceStats};
use crate::StoreError;
use tracelens_core::{Evaluation, Trace, DEFAULT_PASS_THRESHOLD};

/// Opaque identity a scoped operation runs under: a user plus an optional
/// sub-scope such as a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ScopeKey {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Storage contract for the authenticated path. No operation may read or
/// delete traces belonging to a different scope.
#[async_trait]
pub trait ScopedTraceStore: Send + Sync {
    /// Insert a batch under `scope`; returns the scope's post-insert size.
    async fn insert(&self, scope: &ScopeKey, traces: Vec<Trace>) -> Result<usize, StoreError>;

    /// Filtered, paginated read; returns the page and total matching count.
    async fn query(
        &self,
        scope: &ScopeKey,
        filter: &TraceFilter,
    ) -> Result<(Vec<Trace>, usize), StoreError>;

    /// Look up a single trace by record id.
    async fn get(&self, scope: &ScopeKey, id: &str) -> Result<Option<Trace>, StoreError>;

    /// Replace a trace's evaluation block; returns false when the id is not
    /// found in this scope.
    async fn set_evaluation(
        &self,
        scope: &ScopeKey,
        id: &str,
        evaluation: Evaluation,
    ) -> Result<bool, StoreError>;

    async fn aggregate_stats(&self, scope: &ScopeKey) -> Result<TraceStats, StoreError>;

    /// Delete everything in `scope`; returns the count removed.
    async fn clear(&self, scope: &ScopeKey) -> Result<usize, StoreError>;
}

/// Reference implementation over a concurrent map, most-recent-first within
/// each scope. Durable backends implement [`ScopedTraceStore`] instead.
pub struct InMemoryScopedStore {
    scopes: DashMap<ScopeKey, Vec<Trace>>,
    pass_threshold: f64,
}

impl Default for InMemoryScopedStore {
    fn default() -> Self {
        Self::new(DEFAULT_PASS_THRESHOLD)
    }
}

impl InMemoryScopedStore {
    pub fn new(pass_threshold: f64) -> Self {
        Self {
            scopes: DashMap::new(),
            pass_threshold,
        }
    }
}

#[async_trait]
impl ScopedTraceStore for InMemoryScopedStore {
    async fn insert(&self, scope: &ScopeKey, traces: Vec<Trace>) -> Result<usize, StoreError> {
        let mut entry = self.scopes.entry(scope.clone()).or_default();
        for mut trace in traces {
            if let Some(eval) = trace.evaluation.as_mut() {
                eval.reconcile_status(self.pass_threshold);
            }
            entry.insert(0, trace);
        }
        Ok(entry.len())
    }

    async fn query(
        &self,
        scope: &ScopeKey,
        filter: &TraceFilter,
    ) -> Result<(Vec<Trace>, usize), StoreError> {
        Ok(match self.scopes.get(scope) {
            Some(traces) => filter.paginate(traces.iter()),
            None => (Vec::new(), 0),
        })
    }

    async fn get(&self, scope: &ScopeKey, id: &str) -> Result<Option<Trace>, StoreError> {
        Ok(self
            .scopes
            .get(scope)
            .and_then(|traces| traces.iter().find(|t| t.id == id).cloned()))
    }

    async fn set_evaluation(
        &self,
        scope: &ScopeKey,
        id: &str,
        evaluation: Evaluation,
    ) -> Result<bool, StoreError> {
        let Some(mut traces) = self.scopes.get_mut(scope) else {
            return Ok(false);
        };
        match traces.iter_mut().find(|t| t.id == id) {
            Some(trace) => {
                let mut evaluation = evaluation;
                evaluation.reconcile_status(self.pass_threshold);
                trace.evaluation = Some(evaluation);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn aggregate_stats(&self, scope: &ScopeKey) -> Result<TraceStats, StoreError> {
        Ok(match self.scopes.get(scope) {
            Some(traces) => compute_stats(traces.iter()),
            None => TraceStats::default(),
        })
    }

    async fn clear(&self, scope: &ScopeKey) -> Result<usize, StoreError> {
        Ok(self
            .scopes
            .remove(scope)
            .map(|(_, traces)| traces.len())
            .unwrap_or(0))
    }
}
