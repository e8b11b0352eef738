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

//! Deterministic text-heuristic scoring
//!
//! Three sub-scores in 0-1 (similarity, grounding, completeness), combined
//! into a weighted 0-10 score. No model calls, no randomness.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::{apply_score, EvalError};
use tracelens_core::{Evaluation, Trace};

const SIMILARITY_WEIGHT: f64 = 0.3;
const GROUNDING_WEIGHT: f64 = 0.5;
const COMPLETENESS_WEIGHT: f64 = 0.2;

/// Minimum fraction of a sentence's content words that must appear in the
/// context for the sentence to count as grounded.
const SENTENCE_SUPPORT_FRACTION: f64 = 0.5;

/// Words at or below this length are treated as stop-word noise.
const CONTENT_WORD_MIN_LEN: usize = 3;

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap between the prompt and response token sets.
fn similarity(input: &str, output: &str) -> f64 {
    let a = tokens(input);
    let b = tokens(output);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    intersection / union
}

/// Fraction of output sentences whose content words are mostly present in
/// the context. With no context there is nothing to contradict, so the
/// score is vacuously 1.0.
fn grounding(output: &str, context: Option<&str>) -> f64 {
    let Some(context) = context.filter(|c| !c.trim().is_empty()) else {
        return 1.0;
    };
    let context_tokens = tokens(context);

    let sentences: Vec<&str> = output
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }

    let supported = sentences
        .iter()
        .filter(|sentence| {
            let content: Vec<String> = tokens(sentence)
                .into_iter()
                .filter(|w| w.len() > CONTENT_WORD_MIN_LEN)
                .collect();
            if content.is_empty() {
                return true;
            }
            let hits = content.iter().filter(|w| context_tokens.contains(*w)).count();
            hits as f64 / content.len() as f64 >= SENTENCE_SUPPORT_FRACTION
        })
        .count();

    supported as f64 / sentences.len() as f64
}

/// Length sanity: empty responses score 0, very short ones half credit.
fn completeness(output: &str) -> f64 {
    match output.trim().chars().count() {
        0 => 0.0,
        1..=39 => 0.5,
        _ => 1.0,
    }
}

/// Score a trace with the text heuristics. Requires an LLM call record with
/// both input and output text.
pub fn evaluate_heuristic(
    trace: &Trace,
    pass_threshold: f64,
    now: DateTime<Utc>,
) -> Result<Evaluation, EvalError> {
    let llm = trace.llm.as_ref().ok_or(EvalError::NotLlmTrace)?;
    let output = llm.output.as_deref().ok_or(EvalError::MissingOutput)?;
    let input = llm.input.as_deref().unwrap_or("");
    let context = llm.context.as_ref().map(|c| c.joined());

    let similarity = similarity(input, output);
    let grounding = grounding(output, context.as_deref());
    let completeness = completeness(output);

    let score = 10.0
        * (similarity * SIMILARITY_WEIGHT
            + grounding * GROUNDING_WEIGHT
            + completeness * COMPLETENESS_WEIGHT);

    let mut criteria = BTreeMap::new();
    criteria.insert("similarity".to_string(), similarity);
    criteria.insert("grounding".to_string(), grounding);
    criteria.insert("completeness".to_string(), completeness);

    Ok(apply_score(
        score,
        Some(criteria),
        None,
        None,
        pass_threshold,
        now,
    ))
}
