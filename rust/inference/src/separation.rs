// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vertical separation of plan-overlapping elements.
//!
//! Elements of different disciplines that share a grid cell must be at
//! least the pair's clearance apart in z. Violations are repaired by moving
//! one element of the pair, repeated pass after pass until a pass changes
//! nothing or the iteration bound is hit. Pairs are visited in element-id
//! order, so the result does not depend on the order elements arrive in.

use crate::grid::SpatialGrid;
use cad_lift_model::{
    ClearanceLookup, DisciplinePair, ElementStatus, Issue, IssueKind, MatchedElement,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Slack used when comparing a gap against its required clearance
const GAP_EPSILON: f64 = 1e-9;

/// Why an element was moved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentReason {
    ClearanceShortfall {
        other: String,
        disciplines: DisciplinePair,
        required: f64,
        actual: f64,
    },
}

/// One logged z change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub element_id: String,
    pub prior_z: f64,
    pub new_z: f64,
    pub reason: AdjustmentReason,
    /// 1-based pass number
    pub iteration: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub converged: bool,
    pub iterations: usize,
    /// Elements still violating a clearance after the last pass
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparationSettings {
    pub cell_size: f64,
    pub safety_margin: f64,
    pub max_iterations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SeparationOutcome {
    pub adjustments: Vec<Adjustment>,
    pub convergence: ConvergenceReport,
    pub issues: Vec<Issue>,
}

/// A pair of element indices to keep apart, `a` having the smaller id
#[derive(Debug, Clone)]
struct CheckedPair {
    a: usize,
    b: usize,
    disciplines: DisciplinePair,
    required: f64,
}

fn checked_pairs(
    elements: &[MatchedElement],
    clearances: &ClearanceLookup,
    cell_size: f64,
) -> Vec<CheckedPair> {
    let grid = SpatialGrid::from_elements(elements, cell_size);
    let mut pairs: Vec<CheckedPair> = grid
        .candidate_pairs()
        .into_iter()
        .filter(|&(i, j, _)| elements[i].discipline != elements[j].discipline)
        .map(|(i, j, _)| {
            let (a, b) = if elements[i].id <= elements[j].id {
                (i, j)
            } else {
                (j, i)
            };
            let disciplines = DisciplinePair::new(
                elements[a].discipline.clone(),
                elements[b].discipline.clone(),
            );
            let required = clearances.required(&disciplines);
            CheckedPair {
                a,
                b,
                disciplines,
                required,
            }
        })
        .collect();
    pairs.sort_by(|p, q| {
        (&elements[p.a].id, &elements[p.b].id).cmp(&(&elements[q.a].id, &elements[q.b].id))
    });
    pairs
}

fn is_violated(elements: &[MatchedElement], pair: &CheckedPair) -> bool {
    (elements[pair.a].z() - elements[pair.b].z()).abs() + GAP_EPSILON < pair.required
}

/// Index of the element that yields: lower confidence, then greater id.
fn mover(elements: &[MatchedElement], pair: &CheckedPair) -> (usize, usize) {
    let (a, b) = (&elements[pair.a], &elements[pair.b]);
    if a.confidence < b.confidence {
        (pair.a, pair.b)
    } else {
        // Equal confidence: `b` has the greater id
        (pair.b, pair.a)
    }
}

/// Run the bounded fixpoint over `elements`, moving them in place.
pub fn separate(
    elements: &mut [MatchedElement],
    clearances: &ClearanceLookup,
    settings: &SeparationSettings,
) -> SeparationOutcome {
    let pairs = checked_pairs(elements, clearances, settings.cell_size);
    tracing::debug!(pairs = pairs.len(), "Separation candidate pairs");

    let mut outcome = SeparationOutcome::default();
    let mut converged = false;
    let mut iterations = 0;

    while iterations < settings.max_iterations {
        iterations += 1;
        let mut changed = false;

        for pair in &pairs {
            if !is_violated(elements, pair) {
                continue;
            }
            let (moving, fixed) = mover(elements, pair);
            let anchor_z = elements[fixed].z();
            let prior_z = elements[moving].z();
            let step = pair.required + settings.safety_margin;
            let new_z = if prior_z >= anchor_z {
                anchor_z + step
            } else {
                anchor_z - step
            };

            elements[moving].position.z = new_z;
            outcome.adjustments.push(Adjustment {
                element_id: elements[moving].id.clone(),
                prior_z,
                new_z,
                reason: AdjustmentReason::ClearanceShortfall {
                    other: elements[fixed].id.clone(),
                    disciplines: pair.disciplines.clone(),
                    required: pair.required,
                    actual: (prior_z - anchor_z).abs(),
                },
                iteration: iterations,
            });
            changed = true;
        }

        if !changed {
            converged = true;
            break;
        }
    }

    let mut unresolved: BTreeSet<usize> = BTreeSet::new();
    if !converged {
        for pair in pairs.iter().filter(|p| is_violated(elements, p)) {
            unresolved.insert(pair.a);
            unresolved.insert(pair.b);
        }
        // A final pass of changes may have cleared every violation
        converged = unresolved.is_empty();
    }

    for (index, element) in elements.iter_mut().enumerate() {
        element.status = if unresolved.contains(&index) {
            ElementStatus::UnresolvedClashRisk
        } else {
            ElementStatus::Separated
        };
    }

    let mut unresolved_ids: Vec<String> =
        unresolved.iter().map(|&i| elements[i].id.clone()).collect();
    unresolved_ids.sort();

    if !converged {
        let message = format!(
            "separation did not converge after {} iterations; {} elements remain within clearance: {}",
            iterations,
            unresolved_ids.len(),
            unresolved_ids.join(", ")
        );
        tracing::warn!("{}", message);
        outcome
            .issues
            .push(Issue::new(IssueKind::ConvergenceFailure, "separation", message));
    }

    tracing::info!(
        iterations,
        converged,
        adjustments = outcome.adjustments.len(),
        unresolved = unresolved_ids.len(),
        "Vertical separation complete"
    );

    outcome.convergence = ConvergenceReport {
        converged,
        iterations,
        unresolved: unresolved_ids,
    };
    outcome
}
