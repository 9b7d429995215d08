//! Retrieval quality metrics.
//!
//! Counts are pooled over all queries before dividing:
//!
//! - **precision@k** = Σ true positives / (k × number of queries)
//! - **recall@k** = Σ true positives / Σ relevant items
//! - **F1@k** = harmonic mean of the two, 0 when both are 0

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Precision, recall and F1 at a fixed cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct RetrievalMetrics {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub f1_at_k: f64,
}

/// Harmonic mean of precision and recall.
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// One returned neighbour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub item_id: String,
    /// Distance reported by the index (lower is closer).
    pub distance: f64,
}

/// Everything needed to score a single query after the fact.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub hits: Vec<Hit>,
    pub relevant: HashSet<String>,
}

impl QueryOutcome {
    pub fn new(hits: Vec<Hit>, relevant: impl IntoIterator<Item = String>) -> Self {
        Self {
            hits,
            relevant: relevant.into_iter().collect(),
        }
    }

    /// Number of returned hits that are relevant. Repeated ids count once.
    pub fn true_positives(&self) -> usize {
        let mut seen = HashSet::new();
        self.hits
            .iter()
            .filter(|h| self.relevant.contains(&h.item_id) && seen.insert(h.item_id.as_str()))
            .count()
    }
}

/// Pools per-query counts into [`RetrievalMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    k: usize,
    queries: usize,
    true_positives: usize,
    relevant_total: usize,
}

impl MetricsAccumulator {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            queries: 0,
            true_positives: 0,
            relevant_total: 0,
        }
    }

    pub fn record(&mut self, outcome: &QueryOutcome) {
        self.queries += 1;
        self.true_positives += outcome.true_positives();
        self.relevant_total += outcome.relevant.len();
    }

    pub fn queries(&self) -> usize {
        self.queries
    }

    pub fn finish(&self) -> RetrievalMetrics {
        let retrieved_slots = self.k * self.queries;

        let precision_at_k = if retrieved_slots == 0 {
            0.0
        } else {
            self.true_positives as f64 / retrieved_slots as f64
        };
        let recall_at_k = if self.relevant_total == 0 {
            0.0
        } else {
            self.true_positives as f64 / self.relevant_total as f64
        };

        RetrievalMetrics {
            precision_at_k,
            recall_at_k,
            f1_at_k: f1_score(precision_at_k, recall_at_k),
        }
    }
}

/// Score a batch of outcomes at cutoff `k`.
pub fn compute_metrics(outcomes: &[QueryOutcome], k: usize) -> RetrievalMetrics {
    let mut acc = MetricsAccumulator::new(k);
    for outcome in outcomes {
        acc.record(outcome);
    }
    acc.finish()
}

/// Best distance cutoff found by [`find_best_threshold`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ThresholdResult {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Sweep every observed distance as a cutoff and keep the one with the best F1.
///
/// A hit is kept when `distance <= threshold`. Precision here is relevant kept
/// hits over all kept hits. Ties go to the smaller threshold. Returns `None`
/// when no query returned anything.
pub fn find_best_threshold(outcomes: &[QueryOutcome]) -> Option<ThresholdResult> {
    let mut candidates: Vec<f64> = outcomes
        .iter()
        .flat_map(|o| o.hits.iter().map(|h| h.distance))
        .filter(|d| d.is_finite())
        .collect();
    candidates.sort_by(|a, b| a.total_cmp(b));
    candidates.dedup();

    let relevant_total: usize = outcomes.iter().map(|o| o.relevant.len()).sum();

    let mut best: Option<ThresholdResult> = None;
    for threshold in candidates {
        let mut kept = 0usize;
        let mut tp = 0usize;
        for outcome in outcomes {
            let mut seen = HashSet::new();
            for hit in outcome.hits.iter().filter(|h| h.distance <= threshold) {
                kept += 1;
                if outcome.relevant.contains(&hit.item_id) && seen.insert(hit.item_id.as_str()) {
                    tp += 1;
                }
            }
        }

        let precision = if kept == 0 { 0.0 } else { tp as f64 / kept as f64 };
        let recall = if relevant_total == 0 {
            0.0
        } else {
            tp as f64 / relevant_total as f64
        };
        let f1 = f1_score(precision, recall);

        if best.is_none_or(|b| f1 > b.f1) {
            best = Some(ThresholdResult {
                threshold,
                precision,
                recall,
                f1,
            });
        }
    }

    best
}
