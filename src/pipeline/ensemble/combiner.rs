//! Agreement-based combination of completed engine results.
//!
//! Results are ordered by (confidence desc, engine name asc) before anything
//! else happens, so task completion order never changes the outcome.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::similarity::{agrees, normalize_for_comparison};
use crate::config::{DEFAULT_AGREEMENT_BOOST, DEFAULT_SIMILARITY_THRESHOLD};
use crate::pipeline::ocr::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleSettings {
    /// Levenshtein ratio at or above which two texts agree, in (0, 1].
    pub similarity_threshold: f64,
    /// Added to the chosen confidence when engines agree.
    pub agreement_boost: f64,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            agreement_boost: DEFAULT_AGREEMENT_BOOST,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub chosen: EngineResult,
    /// Aggregate confidence, never below the best single engine.
    pub confidence: f64,
    /// Members of the winning agreement cluster, in ranking order. Empty
    /// when no two engines agreed.
    pub agreeing_engines: Vec<String>,
    /// Every combined engine, in ranking order.
    pub contributors: Vec<String>,
}

/// Highest confidence first, engine name breaks ties.
pub fn rank(a: &EngineResult, b: &EngineResult) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.engine_name.cmp(&b.engine_name))
}

/// `None` only when `results` is empty.
///
/// CPU-bound on long texts; async callers run it on the blocking pool.
pub fn combine(mut results: Vec<EngineResult>, settings: &EnsembleSettings) -> Option<Combination> {
    results.sort_by(rank);
    let contributors: Vec<String> = results.iter().map(|r| r.engine_name.clone()).collect();
    let best_single = results.first()?.confidence;

    if results.len() == 1 {
        let chosen = results.swap_remove(0);
        return Some(Combination {
            confidence: chosen.confidence,
            chosen,
            agreeing_engines: Vec::new(),
            contributors,
        });
    }

    let normalized: Vec<Vec<char>> = results
        .iter()
        .map(|r| normalize_for_comparison(&r.text).chars().collect())
        .collect();

    let mut clusters = UnionFind::new(results.len());
    for i in 0..results.len() {
        for j in (i + 1)..results.len() {
            // Two empty outputs are not agreement
            if normalized[i].is_empty() || normalized[j].is_empty() {
                continue;
            }
            if agrees(&normalized[i], &normalized[j], settings.similarity_threshold) {
                clusters.union(i, j);
            }
        }
    }

    // Members are pushed in ranking order, so members[0] is the cluster's best.
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..results.len() {
        groups.entry(clusters.find(i)).or_default().push(i);
    }

    let winner = groups
        .into_values()
        .filter(|members| members.len() >= 2)
        .min_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

    match winner {
        Some(members) => {
            let agreeing_engines = members
                .iter()
                .map(|&i| results[i].engine_name.clone())
                .collect();
            let chosen = results.swap_remove(members[0]);
            let boosted = (chosen.confidence + settings.agreement_boost).min(100.0);
            Some(Combination {
                confidence: boosted.max(best_single),
                chosen,
                agreeing_engines,
                contributors,
            })
        }
        None => {
            let chosen = results.swap_remove(0);
            Some(Combination {
                confidence: chosen.confidence,
                chosen,
                agreeing_engines: Vec::new(),
                contributors,
            })
        }
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// The smaller index becomes the root.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}
