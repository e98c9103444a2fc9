// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Z-height assignment.
//!
//! Each element gets `z = storey elevation + offset + perturbation`. The
//! offset comes from the first available source:
//!
//! | Source | Confidence |
//! |---|---|
//! | per-storey statistics of the matched template | `High` |
//! | global mean of the matched template | `Medium` |
//! | building profile default for the discipline | `Low` |
//!
//! The perturbation is a hash of the element id, so it does not depend on
//! processing order and two runs with the same seed agree exactly.

use cad_lift_model::{
    BuildingContext, BuildingProfile, Confidence, ElementStatus, Issue, IssueKind, MatchedElement,
    OffsetSource, StoreyLookup, TemplateLibrary,
};
use rayon::prelude::*;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Deterministic per-element z jitter in `[0, bound)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    pub seed: u64,
    pub bound: f64,
}

impl Perturbation {
    pub fn new(seed: u64, bound: f64) -> Self {
        Self { seed, bound }
    }

    pub fn none() -> Self {
        Self::new(0, 0.0)
    }

    pub fn offset(&self, element_id: &str) -> f64 {
        if self.bound <= 0.0 {
            return 0.0;
        }
        // Top 53 bits give a uniform double in [0, 1)
        let h = xxh3_64_with_seed(element_id.as_bytes(), self.seed);
        let unit = (h >> 11) as f64 / (1u64 << 53) as f64;
        unit * self.bound
    }
}

/// Placement chosen for one element
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub z: f64,
    pub base_elevation: f64,
    pub offset: f64,
    pub confidence: Confidence,
    pub offset_source: OffsetSource,
    pub storey: Option<String>,
    /// Set when storeys are configured but none could be resolved
    pub storey_failure: Option<String>,
}

/// Elements with z assigned, plus the issues raised on the way
#[derive(Debug, Clone, Default)]
pub struct AssignmentOutcome {
    pub elements: Vec<MatchedElement>,
    pub issues: Vec<Issue>,
}

/// Assigns storey-relative heights from templates and profile defaults
#[derive(Debug)]
pub struct ZAssigner<'a> {
    library: &'a TemplateLibrary,
    context: &'a BuildingContext,
    profile: &'a BuildingProfile,
    perturbation: Perturbation,
}

impl<'a> ZAssigner<'a> {
    pub fn new(
        library: &'a TemplateLibrary,
        context: &'a BuildingContext,
        profile: &'a BuildingProfile,
        perturbation: Perturbation,
    ) -> Self {
        Self {
            library,
            context,
            profile,
            perturbation,
        }
    }

    /// Compute the placement of one element without modifying it.
    pub fn place(&self, element: &MatchedElement) -> Placement {
        let anchor = element.geometry.anchor();
        let (storey, base_elevation, storey_failure) = match self.context.resolve(
            element.storey.as_deref(),
            &element.source_file,
            &anchor,
        ) {
            StoreyLookup::Resolved(s, _) => (Some(s.name.clone()), s.elevation, None),
            StoreyLookup::NoStoreys => (None, 0.0, None),
            StoreyLookup::Failed(reason) => (None, 0.0, Some(reason)),
        };

        let template = element
            .template_id
            .as_deref()
            .and_then(|id| self.library.get(id));
        let vertical = template.and_then(|t| t.vertical.as_ref());
        let per_storey = storey
            .as_deref()
            .and_then(|name| vertical.and_then(|v| v.per_storey.get(name)));

        let (offset, mut confidence, offset_source) = match (per_storey, vertical) {
            (Some(s), _) => (s.mean, Confidence::High, OffsetSource::Storey),
            (None, Some(v)) => (v.mean, Confidence::Medium, OffsetSource::TemplateMean),
            (None, None) => (
                self.profile.default_offset(&element.discipline),
                Confidence::Low,
                OffsetSource::DisciplineDefault,
            ),
        };
        // Thin templates never claim more than MEDIUM
        if template.is_some_and(|t| t.is_low_confidence()) {
            confidence = confidence.min(Confidence::Medium);
        }

        Placement {
            z: base_elevation + offset + self.perturbation.offset(&element.id),
            base_elevation,
            offset,
            confidence,
            offset_source,
            storey,
            storey_failure,
        }
    }

    /// Place every element. The input order is preserved.
    pub fn assign(&self, elements: Vec<MatchedElement>) -> AssignmentOutcome {
        let placed: Vec<(MatchedElement, Option<Issue>)> = elements
            .into_par_iter()
            .map(|mut element| {
                let placement = self.place(&element);
                let issue = placement.storey_failure.as_ref().map(|reason| {
                    Issue::new(
                        IssueKind::StoreyResolutionFailure,
                        element.id.clone(),
                        format!("{}; placed relative to elevation 0", reason),
                    )
                });
                element.position.z = placement.z;
                element.confidence = placement.confidence;
                element.offset_source = Some(placement.offset_source);
                element.storey = placement.storey;
                element.status = ElementStatus::Placed;
                (element, issue)
            })
            .collect();

        let mut outcome = AssignmentOutcome::default();
        for (element, issue) in placed {
            if let Some(issue) = issue {
                tracing::warn!(element = %issue.subject, "{}", issue.message);
                outcome.issues.push(issue);
            }
            outcome.elements.push(element);
        }

        tracing::info!(
            elements = outcome.elements.len(),
            high = tier_count(&outcome.elements, Confidence::High),
            medium = tier_count(&outcome.elements, Confidence::Medium),
            low = tier_count(&outcome.elements, Confidence::Low),
            storey_failures = outcome.issues.len(),
            "Z assignment complete"
        );
        outcome
    }
}

fn tier_count(elements: &[MatchedElement], tier: Confidence) -> usize {
    elements.iter().filter(|e| e.confidence == tier).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cad_lift_model::{
        Discipline, Geometry, MatchSignature, Point2D, Point3D, Provenance, RawEntity, Storey,
        StoreyOffset, Template, TemplateConfidence, VerticalStats, UNMATCHED_CLASS,
    };

    fn sprinkler_template() -> Template {
        let mut vertical = VerticalStats::uniform(4.4);
        vertical.per_storey.insert(
            "L2".to_string(),
            StoreyOffset {
                mean: 4.25,
                min: 4.2,
                max: 4.3,
                count: 12,
            },
        );
        Template::curated("fire_protection", "sprinkler", MatchSignature::default())
            .with_vertical(vertical)
            .with_instance_count(40)
    }

    fn element(layer: &str, discipline: &str, template: Option<&Template>) -> MatchedElement {
        let entity = RawEntity::new(
            "L1.dwg",
            layer,
            Geometry::Point {
                at: Point3D::new(2.0, 2.0, 0.0),
            },
        )
        .with_handle(layer);
        match template {
            Some(t) => MatchedElement::classified(
                &entity,
                0,
                t.discipline.clone(),
                t.element_class.clone(),
                None,
                Some(t.id.clone()),
                Provenance::Direct,
            ),
            None => MatchedElement::classified(
                &entity,
                0,
                Discipline::new(discipline),
                UNMATCHED_CLASS.to_string(),
                None,
                None,
                Provenance::Inferred,
            ),
        }
    }

    fn square(size: f64) -> Vec<Point2D> {
        vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(size, 0.0),
            Point2D::new(size, size),
            Point2D::new(0.0, size),
        ]
    }

    #[test]
    fn test_perturbation_is_bounded_and_stable() {
        let p = Perturbation::new(7, 0.05);
        for i in 0..200 {
            let id = format!("el-{}", i);
            let v = p.offset(&id);
            assert!((0.0..0.05).contains(&v));
            assert_eq!(v, p.offset(&id));
        }
        assert_ne!(p.offset("el-1"), Perturbation::new(8, 0.05).offset("el-1"));
        assert_eq!(Perturbation::none().offset("el-1"), 0.0);
    }

    #[test]
    fn test_confidence_tiers() {
        let template = sprinkler_template();
        let library = TemplateLibrary::new(vec![template.clone()]).unwrap();
        let mut context = BuildingContext::new(vec![Storey::new("L1", 0.0), Storey::new("L2", 4.5)]);
        context
            .source_storeys
            .insert("L1.dwg".to_string(), "L2".to_string());
        let profile = BuildingProfile::office();
        let assigner = ZAssigner::new(&library, &context, &profile, Perturbation::none());

        // Per-storey data for L2
        let p = assigner.place(&element("FP-SPRINKLER", "", Some(&template)));
        assert_eq!(p.confidence, Confidence::High);
        assert_eq!(p.offset_source, OffsetSource::Storey);
        assert_relative_eq!(p.z, 4.5 + 4.25, epsilon = 1e-9);

        // L1 has no per-storey data: template mean
        let mut e = element("FP-SPRINKLER", "", Some(&template));
        e.storey = Some("L1".to_string());
        let p = assigner.place(&e);
        assert_eq!(p.confidence, Confidence::Medium);
        assert_eq!(p.offset_source, OffsetSource::TemplateMean);
        assert_relative_eq!(p.z, 4.4, epsilon = 1e-9);

        // No template: office electrical default is 4.5 - 0.2
        let p = assigner.place(&element("ELEC-POWER", "electrical", None));
        assert_eq!(p.confidence, Confidence::Low);
        assert_eq!(p.offset_source, OffsetSource::DisciplineDefault);
        assert_relative_eq!(p.z, 4.5 + 4.3, epsilon = 1e-9);
    }

    #[test]
    fn test_low_confidence_template_caps_tier() {
        let mut template = sprinkler_template();
        template.confidence = TemplateConfidence::LowConfidence;
        let library = TemplateLibrary::new(vec![template.clone()]).unwrap();
        let context = BuildingContext::new(vec![Storey::new("L2", 4.5)]);
        let profile = BuildingProfile::office();
        let assigner = ZAssigner::new(&library, &context, &profile, Perturbation::none());

        let mut e = element("FP-SPRINKLER", "", Some(&template));
        e.storey = Some("L2".to_string());
        let p = assigner.place(&e);
        assert_eq!(p.offset_source, OffsetSource::Storey);
        assert_eq!(p.confidence, Confidence::Medium);
    }

    #[test]
    fn test_storey_failure_falls_back_to_zero() {
        let template = sprinkler_template();
        let library = TemplateLibrary::new(vec![template.clone()]).unwrap();
        // The element anchor (2, 2) lies in neither footprint
        let context = BuildingContext::new(vec![
            Storey::new("L1", 0.0).with_footprint(vec![
                Point2D::new(10.0, 10.0),
                Point2D::new(11.0, 10.0),
                Point2D::new(11.0, 11.0),
            ]),
            Storey::new("L2", 4.5).with_footprint(vec![
                Point2D::new(20.0, 20.0),
                Point2D::new(21.0, 20.0),
                Point2D::new(21.0, 21.0),
            ]),
        ]);
        let profile = BuildingProfile::office();
        let assigner = ZAssigner::new(&library, &context, &profile, Perturbation::none());

        let outcome = assigner.assign(vec![element("FP-SPRINKLER", "", Some(&template))]);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, IssueKind::StoreyResolutionFailure);
        let placed = &outcome.elements[0];
        assert_eq!(placed.status, ElementStatus::Placed);
        assert_eq!(placed.storey, None);
        assert_relative_eq!(placed.z(), 4.4, epsilon = 1e-9);
    }

    #[test]
    fn test_footprint_containment_resolves_storey() {
        let template = sprinkler_template();
        let library = TemplateLibrary::new(vec![template.clone()]).unwrap();
        let context = BuildingContext::new(vec![Storey::new("L2", 4.5).with_footprint(square(10.0))]);
        let profile = BuildingProfile::office();
        let assigner = ZAssigner::new(&library, &context, &profile, Perturbation::none());

        let outcome = assigner.assign(vec![element("FP-SPRINKLER", "", Some(&template))]);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.elements[0].storey.as_deref(), Some("L2"));
        assert_eq!(outcome.elements[0].confidence, Confidence::High);
    }

    #[test]
    fn test_no_storeys_is_not_a_failure() {
        let library = TemplateLibrary::empty();
        let context = BuildingContext::default();
        let profile = BuildingProfile::residential();
        let assigner = ZAssigner::new(&library, &context, &profile, Perturbation::new(1, 0.05));

        let outcome = assigner.assign(vec![element("P-WATER", "plumbing", None)]);
        assert!(outcome.issues.is_empty());
        let z = outcome.elements[0].z();
        assert!(z >= 2.5 && z < 2.55, "z = {}", z);
    }
}
