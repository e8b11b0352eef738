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

//! # TraceLens Core
//!
//! Canonical trace model shared by every other TraceLens crate.
//!
//! A [`Trace`] is the normalized representation of one span of work,
//! independent of the wire format it arrived in. Traces that represent model
//! calls carry an [`LlmCall`] record; evaluation results are appended after
//! ingestion as an [`Evaluation`].

pub mod evaluation;
pub mod trace;

pub use evaluation::{EvalStatus, Evaluation, DEFAULT_PASS_THRESHOLD, REVIEW_BAND_FACTOR};
pub use trace::{ContextText, LlmCall, SpanKind, Trace, TraceSource, TraceStatus};
