// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Templates learned from a reference model, persisted, and applied to a
//! new drawing.

use approx::assert_relative_eq;
use cad_lift_inference::{extract_templates, Pipeline};
use cad_lift_model::{
    BuildingContext, Confidence, ElementRecord, Geometry, GeometryKind, OffsetSource,
    PipelineConfig, Point3D, RawEntity, ReferenceDataset, Storey, TemplateLibrary,
};
use std::sync::Arc;

fn sprinkler(id: usize, storey: &str, x: f64, y: f64, z: f64) -> ElementRecord {
    ElementRecord {
        id: format!("ref-{:03}", id),
        discipline: "fire_protection".into(),
        element_class: "sprinkler".to_string(),
        element_type: None,
        layer: Some("FP-SPRINKLER".to_string()),
        symbol: Some("SPK-PENDENT".to_string()),
        geometry_kind: Some(GeometryKind::Insert),
        geometry: None,
        position: Point3D::new(x, y, z),
        storey: Some(storey.to_string()),
        confidence: None,
        offset_source: None,
        status: None,
        source_file: None,
        handle: None,
        attributes: Default::default(),
    }
}

/// Two storeys, a 3 m sprinkler grid on each; the upper ceiling is lower.
fn reference() -> ReferenceDataset {
    let mut records = Vec::new();
    for (storey, elevation, offset) in [("L1", 0.0, 4.40), ("L2", 4.5, 4.20)] {
        for i in 0..4 {
            for j in 0..3 {
                let id = records.len();
                records.push(sprinkler(
                    id,
                    storey,
                    i as f64 * 3.0,
                    j as f64 * 3.0,
                    elevation + offset,
                ));
            }
        }
    }
    ReferenceDataset {
        storeys: vec![Storey::new("L1", 0.0), Storey::new("L2", 4.5)],
        records,
    }
}

fn context() -> BuildingContext {
    let mut context = BuildingContext::new(reference().storeys);
    context
        .source_storeys
        .insert("L2.dwg".to_string(), "L2".to_string());
    context
}

#[test]
fn test_learned_templates_drive_placement() {
    let config = PipelineConfig::default();
    let outcome = extract_templates(&reference(), &config.extraction()).unwrap();
    assert!(outcome.issues.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.json");
    outcome.library.save(&path).unwrap();
    let library = TemplateLibrary::load(&path).unwrap();
    assert_eq!(library, outcome.library);

    let template = library.get("fire_protection.sprinkler").unwrap();
    let spacing = template.spacing.unwrap();
    assert_relative_eq!(spacing.typical_spacing, 3.0, epsilon = 1e-9);

    let entity = RawEntity::new(
        "L2.dwg",
        "FP-SPRINKLER",
        Geometry::Insert {
            at: Point3D::new(1.5, 1.5, 0.0),
            rotation: 0.0,
            scale: 1.0,
        },
    )
    .with_symbol("spk-pendent")
    .with_handle("2F");

    let pipeline = Pipeline::new(config.clone(), Arc::new(library)).unwrap();
    let out = pipeline.run(&[entity], &context()).unwrap();
    let element = &out.elements[0];

    assert_eq!(element.template_id.as_deref(), Some("fire_protection.sprinkler"));
    assert_eq!(element.confidence, Confidence::High);
    assert_eq!(element.offset_source, Some(OffsetSource::Storey));
    let z = element.z();
    assert!(z >= 4.5 + 4.20 - 1e-9 && z < 4.5 + 4.20 + config.perturbation_bound);
}

#[test]
fn test_exported_elements_feed_extraction_again() {
    let config = PipelineConfig::default();
    let library = extract_templates(&reference(), &config.extraction())
        .unwrap()
        .library;

    // Convert a copy of the upper floor layout
    let entities: Vec<RawEntity> = (0..12)
        .map(|n| {
            RawEntity::new(
                "L2.dwg",
                "FP-SPRINKLER",
                Geometry::Insert {
                    at: Point3D::new((n % 4) as f64 * 3.0, (n / 4) as f64 * 3.0, 0.0),
                    rotation: 0.0,
                    scale: 1.0,
                },
            )
            .with_symbol("SPK-PENDENT")
            .with_handle(&format!("{:X}", n + 0x100))
        })
        .collect();
    let out = Pipeline::new(config.clone(), Arc::new(library))
        .unwrap()
        .run(&entities, &context())
        .unwrap();

    let exported = ReferenceDataset {
        storeys: reference().storeys,
        records: out.elements.iter().map(|e| e.to_record()).collect(),
    };
    let relearned = extract_templates(&exported, &config.extraction())
        .unwrap()
        .library;
    let vertical = relearned
        .get("fire_protection.sprinkler")
        .and_then(|t| t.vertical.clone())
        .unwrap();
    let upper = vertical.per_storey.get("L2").unwrap();
    assert_eq!(upper.count, 12);
    assert!(upper.mean >= 4.20 - 1e-9 && upper.mean < 4.20 + config.perturbation_bound);
}

#[test]
fn test_spacing_of_single_row_layouts() {
    // One row along x on the lower floor, one along y on the upper floor
    let mut records: Vec<ElementRecord> = (0..12)
        .map(|i| sprinkler(i, "L1", i as f64 * 3.0, 7.5, 4.40))
        .collect();
    records.extend((0..12).map(|i| sprinkler(100 + i, "L2", 2.0, i as f64 * 3.0, 8.70)));
    let dataset = ReferenceDataset {
        storeys: reference().storeys,
        records,
    };

    let outcome = extract_templates(&dataset, &PipelineConfig::default().extraction()).unwrap();
    let spacing = outcome
        .library
        .get("fire_protection.sprinkler")
        .and_then(|t| t.spacing)
        .unwrap();
    assert_relative_eq!(spacing.typical_spacing, 3.0, epsilon = 1e-9);
}
