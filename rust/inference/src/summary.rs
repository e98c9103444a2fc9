// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run summary: coverage, confidence mix and outstanding risk.

use crate::clash::ClashReport;
use crate::separation::ConvergenceReport;
use cad_lift_model::{count_by_kind, Confidence, Issue, IssueKind, MatchedElement, Provenance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierShare {
    pub count: usize,
    /// Percent of placed elements
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_entities: usize,
    pub classified: usize,
    pub unclassified: usize,
    /// Percent of input entities that became elements
    pub classified_pct: f64,
    pub direct: usize,
    pub inferred: usize,
    pub confidence: BTreeMap<Confidence, TierShare>,
    pub issues: BTreeMap<IssueKind, usize>,
    pub candidate_clashes: usize,
    pub high_risk_cells: usize,
    pub unresolved_elements: usize,
    pub separation_iterations: usize,
    pub converged: bool,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl RunSummary {
    pub fn build(
        total_entities: usize,
        elements: &[MatchedElement],
        issues: &[Issue],
        convergence: &ConvergenceReport,
        clash: &ClashReport,
    ) -> Self {
        let classified = elements.len();
        let confidence = Confidence::ALL
            .iter()
            .map(|&tier| {
                let count = elements.iter().filter(|e| e.confidence == tier).count();
                (
                    tier,
                    TierShare {
                        count,
                        pct: percent(count, classified),
                    },
                )
            })
            .collect();
        let inferred = elements
            .iter()
            .filter(|e| e.provenance == Provenance::Inferred)
            .count();

        Self {
            total_entities,
            classified,
            unclassified: total_entities.saturating_sub(classified),
            classified_pct: percent(classified, total_entities),
            direct: classified - inferred,
            inferred,
            confidence,
            issues: count_by_kind(issues),
            candidate_clashes: clash.total(),
            high_risk_cells: clash.high_risk_cells.len(),
            unresolved_elements: elements.iter().filter(|e| e.is_unresolved()).count(),
            separation_iterations: convergence.iterations,
            converged: convergence.converged,
        }
    }

    pub fn tier(&self, tier: Confidence) -> TierShare {
        self.confidence.get(&tier).copied().unwrap_or_default()
    }

    /// Emit the summary as one structured log event.
    pub fn log(&self) {
        tracing::info!(
            entities = self.total_entities,
            classified = self.classified,
            unclassified = self.unclassified,
            classified_pct = format_args!("{:.1}", self.classified_pct),
            high = self.tier(Confidence::High).count,
            medium = self.tier(Confidence::Medium).count,
            low = self.tier(Confidence::Low).count,
            inferred = self.inferred,
            clashes = self.candidate_clashes,
            high_risk_cells = self.high_risk_cells,
            unresolved = self.unresolved_elements,
            converged = self.converged,
            "Run summary"
        );
    }
}
