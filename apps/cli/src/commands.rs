// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subcommand implementations. Every output file is written atomically.

use anyhow::{Context, Result};
use cad_lift_inference::{
    extract_templates, predict, Adjustment, ClashComparison, ClashReport, ConvergenceReport,
    Pipeline, RunSummary, UnclassifiedEntity,
};
use cad_lift_model::{
    load_json, save_json_atomic, BuildingContext, Drawing, Issue, MatchedElement, PipelineConfig,
    ReferenceDataset, TemplateLibrary,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const ELEMENTS_FILE: &str = "elements.json";
pub const CLASH_REPORT_FILE: &str = "clash_report.json";
pub const ADJUSTMENTS_FILE: &str = "adjustments.json";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Serialize)]
struct ClashFile<'a> {
    report: &'a ClashReport,
    before_separation: &'a ClashReport,
    comparison: ClashComparison,
}

#[derive(Serialize)]
struct AdjustmentsFile<'a> {
    convergence: &'a ConvergenceReport,
    adjustments: &'a [Adjustment],
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    summary: &'a RunSummary,
    issues: &'a [Issue],
    unclassified: &'a [UnclassifiedEntity],
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

pub fn extract(reference: &Path, config: Option<&Path>, output: &Path) -> Result<()> {
    let config = load_config(config)?;
    let dataset: ReferenceDataset = load_json(reference)
        .with_context(|| format!("Failed to read reference dataset {}", reference.display()))?;
    tracing::info!(
        records = dataset.records.len(),
        storeys = dataset.storeys.len(),
        "Extracting templates"
    );

    let outcome = extract_templates(&dataset, &config.extraction())?;
    outcome
        .library
        .save(output)
        .with_context(|| format!("Failed to write library {}", output.display()))?;

    println!(
        "{} templates written to {} ({} low-confidence)",
        outcome.library.len(),
        output.display(),
        outcome.issues.len()
    );
    Ok(())
}

pub fn convert(
    entities: &Path,
    library: &Path,
    context: Option<&Path>,
    config: Option<&Path>,
    out_dir: &Path,
) -> Result<()> {
    let config = load_config(config)?;
    let drawing: Drawing = load_json(entities)
        .with_context(|| format!("Failed to read entities {}", entities.display()))?;
    let entities = drawing.into_entities();
    let library = TemplateLibrary::load(library)
        .with_context(|| format!("Failed to load library {}", library.display()))?;
    let context: BuildingContext = match context {
        Some(path) => load_json(path)
            .with_context(|| format!("Failed to read building context {}", path.display()))?,
        None => BuildingContext::default(),
    };

    let pipeline = Pipeline::new(config, Arc::new(library))?;
    let out = pipeline.run(&entities, &context)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let elements = ReferenceDataset {
        storeys: context.storeys.clone(),
        records: out.elements.iter().map(MatchedElement::to_record).collect(),
    };
    save_json_atomic(&out_dir.join(ELEMENTS_FILE), &elements)?;
    save_json_atomic(
        &out_dir.join(CLASH_REPORT_FILE),
        &ClashFile {
            report: &out.clash_report,
            before_separation: &out.clash_before,
            comparison: ClashReport::compare(&out.clash_before, &out.clash_report),
        },
    )?;
    save_json_atomic(
        &out_dir.join(ADJUSTMENTS_FILE),
        &AdjustmentsFile {
            convergence: &out.convergence,
            adjustments: &out.adjustments,
        },
    )?;
    save_json_atomic(
        &out_dir.join(SUMMARY_FILE),
        &SummaryFile {
            summary: &out.summary,
            issues: &out.issues,
            unclassified: &out.unclassified,
        },
    )?;

    let s = &out.summary;
    println!(
        "{}/{} entities classified ({:.1}%), {} candidate clashes, {} unresolved",
        s.classified, s.total_entities, s.classified_pct, s.candidate_clashes, s.unresolved_elements
    );
    for warning in &out.clash_report.warnings {
        println!("  warning: {}", warning);
    }
    println!("Results written to {}", out_dir.display());
    Ok(())
}

pub fn clash(
    elements: &Path,
    config: Option<&Path>,
    tolerance: Option<f64>,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let dataset: ReferenceDataset = load_json(elements)
        .with_context(|| format!("Failed to read elements {}", elements.display()))?;
    let placed: Vec<MatchedElement> = dataset
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| MatchedElement::from_record(r, i))
        .collect();

    let mut settings = config.clash();
    if let Some(tolerance) = tolerance {
        anyhow::ensure!(
            tolerance.is_finite() && tolerance >= 0.0,
            "tolerance must be non-negative, got {}",
            tolerance
        );
        settings.tolerance = tolerance;
    }
    let report = predict(&placed, &settings);

    match output {
        Some(path) => {
            save_json_atomic(path, &report)?;
            println!(
                "{} candidate clashes, {} high-risk cells; report written to {}",
                report.total(),
                report.high_risk_cells.len(),
                path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
