// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only clash prediction over placed elements.
//!
//! Never moves anything, so the same element slice can be analysed before
//! and after separation and the two reports compared.

use crate::grid::{CellKey, SpatialGrid};
use cad_lift_model::{ClashSettings, Discipline, DisciplinePair, MatchedElement};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum number of distinct disciplines stacked in a high-risk cell
pub const HIGH_RISK_DISCIPLINES: usize = 3;

/// Two elements of different disciplines closer than the tolerance in z
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClashRecord {
    /// Lexically smaller element id
    pub a: String,
    pub b: String,
    pub disciplines: DisciplinePair,
    pub cell: CellKey,
    pub vertical_gap: f64,
}

/// A cell where several disciplines crowd into one vertical window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighRiskCell {
    pub cell: CellKey,
    pub disciplines: Vec<Discipline>,
    pub z_min: f64,
    pub z_max: f64,
    pub element_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCount {
    pub pair: DisciplinePair,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClashReport {
    pub element_count: usize,
    pub tolerance: f64,
    pub candidate_clashes: Vec<ClashRecord>,
    pub by_pair: BTreeMap<DisciplinePair, usize>,
    pub high_risk_cells: Vec<HighRiskCell>,
    pub worst_pair: Option<PairCount>,
    pub unresolved_elements: Vec<String>,
    pub warnings: Vec<String>,
}

impl ClashReport {
    pub fn total(&self) -> usize {
        self.candidate_clashes.len()
    }

    pub fn is_clear(&self) -> bool {
        self.candidate_clashes.is_empty() && self.high_risk_cells.is_empty()
    }

    /// Differences between two reports, e.g. before and after separation.
    pub fn compare(before: &ClashReport, after: &ClashReport) -> ClashComparison {
        let key = |c: &ClashRecord| (c.a.clone(), c.b.clone());
        let before_keys: BTreeSet<_> = before.candidate_clashes.iter().map(key).collect();
        let after_keys: BTreeSet<_> = after.candidate_clashes.iter().map(key).collect();

        let pairs: BTreeSet<&DisciplinePair> =
            before.by_pair.keys().chain(after.by_pair.keys()).collect();
        let by_pair_delta = pairs
            .into_iter()
            .filter_map(|pair| {
                let b = before.by_pair.get(pair).copied().unwrap_or(0) as i64;
                let a = after.by_pair.get(pair).copied().unwrap_or(0) as i64;
                (a != b).then(|| (pair.clone(), a - b))
            })
            .collect();

        ClashComparison {
            before_total: before.total(),
            after_total: after.total(),
            resolved: before_keys.difference(&after_keys).count(),
            introduced: after_keys.difference(&before_keys).count(),
            by_pair_delta,
            high_risk_before: before.high_risk_cells.len(),
            high_risk_after: after.high_risk_cells.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClashComparison {
    pub before_total: usize,
    pub after_total: usize,
    /// Clashes present before and gone after
    pub resolved: usize,
    pub introduced: usize,
    /// `after - before` per pair; unchanged pairs are omitted
    pub by_pair_delta: BTreeMap<DisciplinePair, i64>,
    pub high_risk_before: usize,
    pub high_risk_after: usize,
}

/// Predict clashes among `elements`.
pub fn predict(elements: &[MatchedElement], settings: &ClashSettings) -> ClashReport {
    let grid = SpatialGrid::from_elements(elements, settings.cell_size);

    let mut candidate_clashes: Vec<ClashRecord> = grid
        .candidate_pairs()
        .into_iter()
        .filter_map(|(i, j, cell)| {
            let (a, b) = (&elements[i], &elements[j]);
            if a.discipline == b.discipline {
                return None;
            }
            let gap = (a.z() - b.z()).abs();
            if gap >= settings.tolerance {
                return None;
            }
            let (a, b) = if a.id <= b.id { (a, b) } else { (b, a) };
            Some(ClashRecord {
                a: a.id.clone(),
                b: b.id.clone(),
                disciplines: DisciplinePair::new(a.discipline.clone(), b.discipline.clone()),
                cell,
                vertical_gap: gap,
            })
        })
        .collect();
    candidate_clashes.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));

    let mut by_pair: BTreeMap<DisciplinePair, usize> = BTreeMap::new();
    for clash in &candidate_clashes {
        *by_pair.entry(clash.disciplines.clone()).or_default() += 1;
    }

    // Strictly greater keeps the lexically first pair on ties
    let mut worst_pair: Option<PairCount> = None;
    for (pair, &count) in &by_pair {
        if worst_pair.as_ref().map_or(true, |w| count > w.count) {
            worst_pair = Some(PairCount {
                pair: pair.clone(),
                count,
            });
        }
    }

    let high_risk_cells: Vec<HighRiskCell> = grid
        .occupied_cells()
        .into_iter()
        .filter_map(|(cell, members)| high_risk_window(elements, cell, members, settings.high_risk_band))
        .collect();

    let mut unresolved_elements: Vec<String> = elements
        .iter()
        .filter(|e| e.is_unresolved())
        .map(|e| e.id.clone())
        .collect();
    unresolved_elements.sort();

    let mut warnings = Vec::new();
    for (pair, count) in &by_pair {
        warnings.push(format!(
            "{} candidate clash(es) between {} and {} within {:.3} m",
            count,
            pair.first(),
            pair.second(),
            settings.tolerance
        ));
    }
    for cell in &high_risk_cells {
        warnings.push(format!(
            "high-risk cell ({}, {}): {} disciplines between z {:.3} and {:.3}",
            cell.cell.0,
            cell.cell.1,
            cell.disciplines
                .iter()
                .map(Discipline::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            cell.z_min,
            cell.z_max
        ));
    }
    if !unresolved_elements.is_empty() {
        warnings.push(format!(
            "{} element(s) flagged as unresolved clash risk",
            unresolved_elements.len()
        ));
    }

    tracing::info!(
        elements = elements.len(),
        clashes = candidate_clashes.len(),
        high_risk_cells = high_risk_cells.len(),
        "Clash prediction complete"
    );

    ClashReport {
        element_count: elements.len(),
        tolerance: settings.tolerance,
        candidate_clashes,
        by_pair,
        high_risk_cells,
        worst_pair,
        unresolved_elements,
        warnings,
    }
}

/// First vertical window of height `band` holding enough distinct
/// disciplines, scanning upward from the lowest element.
fn high_risk_window(
    elements: &[MatchedElement],
    cell: CellKey,
    members: &[usize],
    band: f64,
) -> Option<HighRiskCell> {
    if members.len() < HIGH_RISK_DISCIPLINES {
        return None;
    }
    let mut stack: Vec<&MatchedElement> = members.iter().map(|&i| &elements[i]).collect();
    stack.sort_by(|a, b| a.z().total_cmp(&b.z()).then_with(|| a.id.cmp(&b.id)));

    for lo in 0..stack.len() {
        let base = stack[lo].z();
        let window: Vec<&MatchedElement> = stack[lo..]
            .iter()
            .copied()
            .take_while(|e| e.z() - base <= band)
            .collect();
        let disciplines: BTreeSet<&Discipline> = window.iter().map(|e| &e.discipline).collect();
        if disciplines.len() >= HIGH_RISK_DISCIPLINES {
            let mut element_ids: Vec<String> = window.iter().map(|e| e.id.clone()).collect();
            element_ids.sort();
            return Some(HighRiskCell {
                cell,
                disciplines: disciplines.into_iter().cloned().collect(),
                z_min: base,
                z_max: window.last().map_or(base, |e| e.z()),
                element_ids,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_lift_model::{ElementStatus, Geometry, Point3D, Provenance, RawEntity};

    fn element(id: &str, discipline: &str, x: f64, z: f64) -> MatchedElement {
        let entity = RawEntity::new(
            "L1.dwg",
            "X",
            Geometry::Point {
                at: Point3D::new(x, 0.2, 0.0),
            },
        );
        let mut e = MatchedElement::classified(
            &entity,
            0,
            Discipline::new(discipline),
            "thing".to_string(),
            None,
            None,
            Provenance::Direct,
        );
        e.id = id.to_string();
        e.position.z = z;
        e
    }

    fn settings() -> ClashSettings {
        ClashSettings {
            cell_size: 0.5,
            tolerance: 0.05,
            high_risk_band: 0.30,
        }
    }

    #[test]
    fn test_candidate_clashes_and_counts() {
        let elements = vec![
            element("b", "electrical", 0.1, 3.00),
            element("a", "fire_protection", 0.2, 3.03),
            element("c", "electrical", 0.3, 3.01),
            // Same discipline as b and c, far from a in z
            element("d", "mechanical", 0.4, 3.50),
            // Different cell
            element("e", "plumbing", 5.0, 3.00),
        ];
        let report = predict(&elements, &settings());

        let pairs: Vec<(&str, &str)> = report
            .candidate_clashes
            .iter()
            .map(|c| (c.a.as_str(), c.b.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("a", "c")]);
        assert_eq!(report.candidate_clashes[0].disciplines.to_string(), "electrical/fire_protection");
        assert_eq!(report.by_pair.len(), 1);
        assert_eq!(report.worst_pair.as_ref().map(|w| w.count), Some(2));
        assert!(report.high_risk_cells.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_high_risk_cell_needs_three_disciplines_in_band() {
        let stacked = vec![
            element("a", "fire_protection", 0.1, 4.40),
            element("b", "electrical", 0.1, 4.25),
            element("c", "mechanical", 0.1, 4.15),
        ];
        let report = predict(&stacked, &settings());
        assert_eq!(report.high_risk_cells.len(), 1);
        let cell = &report.high_risk_cells[0];
        assert_eq!(cell.disciplines.len(), 3);
        assert!((cell.z_min - 4.15).abs() < 1e-12);
        assert!((cell.z_max - 4.40).abs() < 1e-12);
        assert_eq!(cell.element_ids, vec!["a", "b", "c"]);

        let spread = vec![
            element("a", "fire_protection", 0.1, 4.40),
            element("b", "electrical", 0.1, 4.05),
            element("c", "mechanical", 0.1, 3.70),
        ];
        assert!(predict(&spread, &settings()).high_risk_cells.is_empty());
    }

    #[test]
    fn test_worst_pair_ties_resolve_by_name() {
        let elements = vec![
            element("a", "plumbing", 0.1, 3.0),
            element("b", "mechanical", 0.1, 3.0),
            element("c", "electrical", 2.1, 3.0),
            element("d", "fire_protection", 2.1, 3.0),
        ];
        let report = predict(&elements, &settings());
        assert_eq!(report.total(), 2);
        let worst = report.worst_pair.unwrap();
        assert_eq!(worst.pair.to_string(), "electrical/fire_protection");
    }

    #[test]
    fn test_compare_reports() {
        let mut elements = vec![
            element("a", "fire_protection", 0.1, 3.0),
            element("b", "electrical", 0.1, 3.0),
        ];
        let before = predict(&elements, &settings());
        elements[1].position.z = 2.8;
        elements[1].status = ElementStatus::Separated;
        let after = predict(&elements, &settings());

        let cmp = ClashReport::compare(&before, &after);
        assert_eq!(cmp.before_total, 1);
        assert_eq!(cmp.after_total, 0);
        assert_eq!(cmp.resolved, 1);
        assert_eq!(cmp.introduced, 0);
        assert_eq!(cmp.by_pair_delta.values().copied().collect::<Vec<_>>(), vec![-1]);
        assert!(after.is_clear());
    }

    #[test]
    fn test_report_serializes_pair_keys() {
        let elements = vec![
            element("a", "fire_protection", 0.1, 3.0),
            element("b", "electrical", 0.1, 3.0),
        ];
        let report = predict(&elements, &settings());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["by_pair"]["electrical/fire_protection"], 1);
        let back: ClashReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
