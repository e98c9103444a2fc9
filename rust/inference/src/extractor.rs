// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Template extraction from a reference 3D dataset.
//!
//! Records are grouped by (discipline, element class, element type). Each
//! group becomes one template carrying:
//! - vertical offsets above the storey base (global and per storey)
//! - a match signature learned from the observed layers, symbols and kinds
//! - nominal spacing, for classes configured as regular layouts
//!
//! Extraction is deterministic: groups live in ordered maps, records are
//! sorted by id before any arithmetic, and the library stores digests of its
//! inputs instead of timestamps.

use crate::grid::nearest_neighbor_distances;
use cad_lift_model::{
    json_digest, Discipline, ElementRecord, Error, ExtractionSettings, Issue, IssueKind,
    MatchSignature, Point2D, ReferenceDataset, Result, SpacingStats, StoreyOffset, Template,
    TemplateConfidence, TemplateLibrary, VerticalStats,
};
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, BTreeSet};

const CASE_INSENSITIVE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

type GroupKey = (Discipline, String, Option<String>);

/// Result of an extraction run
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub library: TemplateLibrary,
    /// `InsufficientSamples` issues; the affected templates are kept but
    /// marked low-confidence
    pub issues: Vec<Issue>,
}

/// Extract a template library from reference data.
pub fn extract_templates(
    dataset: &ReferenceDataset,
    settings: &ExtractionSettings,
) -> Result<ExtractionOutcome> {
    if settings.min_samples == 0 {
        return Err(Error::Configuration(
            "min_samples must be at least 1".to_string(),
        ));
    }
    let layout_patterns = settings
        .regular_layout_classes
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                Error::Configuration(format!("invalid class pattern '{}': {}", p, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        records = dataset.records.len(),
        storeys = dataset.storeys.len(),
        min_samples = settings.min_samples,
        "Starting template extraction"
    );

    let mut groups: BTreeMap<GroupKey, Vec<&ElementRecord>> = BTreeMap::new();
    for record in &dataset.records {
        groups
            .entry((
                record.discipline.clone(),
                record.element_class.clone(),
                record.element_type.clone(),
            ))
            .or_default()
            .push(record);
    }

    let mut templates = Vec::with_capacity(groups.len());
    let mut issues = Vec::new();

    for ((discipline, class, element_type), mut records) in groups {
        records.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then(a.position.x.total_cmp(&b.position.x))
                .then(a.position.y.total_cmp(&b.position.y))
                .then(a.position.z.total_cmp(&b.position.z))
        });

        let id = Template::make_id(&discipline, &class, element_type.as_deref());
        let count = records.len();
        let regular = layout_patterns
            .iter()
            .any(|p| p.matches_with(&class, CASE_INSENSITIVE));

        let confidence = if count < settings.min_samples {
            tracing::warn!(
                template = %id,
                count,
                required = settings.min_samples,
                "Insufficient samples, template marked low-confidence"
            );
            issues.push(Issue::new(
                IssueKind::InsufficientSamples,
                id.clone(),
                format!(
                    "{} samples, at least {} required",
                    count, settings.min_samples
                ),
            ));
            TemplateConfidence::LowConfidence
        } else {
            TemplateConfidence::Normal
        };

        let template = Template {
            vertical: vertical_stats(dataset, &records),
            spacing: if regular {
                spacing_stats(&records)
            } else {
                None
            },
            signature: learn_signature(&records),
            instance_count: count,
            confidence_weight: count as f64 / (count + settings.min_samples) as f64,
            confidence,
            id,
            discipline,
            element_class: class,
            element_type,
        };
        tracing::debug!(
            template = %template.id,
            count,
            layers = template.signature.layer_patterns.len(),
            symbols = template.signature.symbol_patterns.len(),
            "Extracted template"
        );
        templates.push(template);
    }

    let mut library = TemplateLibrary::new(templates)?;
    library.source_digest = json_digest(dataset)?;
    library.config_digest = json_digest(settings)?;

    tracing::info!(
        templates = library.len(),
        low_confidence = issues.len(),
        source_digest = %library.source_digest,
        "Template extraction complete"
    );

    Ok(ExtractionOutcome { library, issues })
}

/// Offset of a record above its storey base elevation.
fn relative_offset(dataset: &ReferenceDataset, record: &ElementRecord) -> f64 {
    let base = record
        .storey
        .as_deref()
        .and_then(|s| dataset.storey_elevation(s))
        .unwrap_or(0.0);
    record.position.z - base
}

/// Mean, min and max of a sorted sample set.
fn summarize(values: &[f64]) -> (f64, f64, f64) {
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (sum / values.len() as f64, min, max)
}

fn vertical_stats(dataset: &ReferenceDataset, records: &[&ElementRecord]) -> Option<VerticalStats> {
    let offsets: Vec<f64> = records
        .iter()
        .map(|r| relative_offset(dataset, r))
        .filter(|z| z.is_finite())
        .collect();
    if offsets.is_empty() {
        return None;
    }
    let (mean, min, max) = summarize(&offsets);

    let mut by_storey: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in records {
        if let Some(storey) = &record.storey {
            let z = relative_offset(dataset, record);
            if z.is_finite() {
                by_storey.entry(storey.clone()).or_default().push(z);
            }
        }
    }
    let per_storey = by_storey
        .into_iter()
        .map(|(storey, values)| {
            let (mean, min, max) = summarize(&values);
            (
                storey,
                StoreyOffset {
                    mean,
                    min,
                    max,
                    count: values.len(),
                },
            )
        })
        .collect();

    Some(VerticalStats {
        mean,
        min,
        max,
        per_storey,
    })
}

/// Median nearest-neighbour spacing, measured within each storey.
fn spacing_stats(records: &[&ElementRecord]) -> Option<SpacingStats> {
    let mut by_storey: BTreeMap<Option<&str>, Vec<Point2D>> = BTreeMap::new();
    for record in records {
        by_storey
            .entry(record.storey.as_deref())
            .or_default()
            .push(record.position.planar());
    }

    let mut distances: Vec<f64> = by_storey
        .values()
        .flat_map(|points| nearest_neighbor_distances(points))
        .filter(|d| *d > 1e-9)
        .collect();
    if distances.is_empty() {
        return None;
    }
    distances.sort_by(f64::total_cmp);

    let mid = distances.len() / 2;
    let typical_spacing = if distances.len() % 2 == 0 {
        (distances[mid - 1] + distances[mid]) / 2.0
    } else {
        distances[mid]
    };

    Some(SpacingStats {
        typical_spacing,
        coverage_radius: typical_spacing * std::f64::consts::FRAC_1_SQRT_2,
    })
}

/// Observed layers and symbols become literal (escaped) patterns.
fn learn_signature(records: &[&ElementRecord]) -> MatchSignature {
    let mut layers = BTreeSet::new();
    let mut symbols = BTreeSet::new();
    let mut kinds = BTreeSet::new();
    for record in records {
        if let Some(layer) = record.layer.as_deref().filter(|l| !l.is_empty()) {
            layers.insert(Pattern::escape(layer));
        }
        if let Some(symbol) = record.symbol.as_deref().filter(|s| !s.is_empty()) {
            symbols.insert(Pattern::escape(symbol));
        }
        if let Some(kind) = record.geometry_kind {
            kinds.insert(kind);
        }
    }
    MatchSignature {
        layer_patterns: layers,
        symbol_patterns: symbols,
        geometry_kinds: kinds,
    }
}
