// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end conversion run: classify, assign, separate, predict.

use crate::classifier::{Classifier, UnclassifiedEntity};
use crate::clash::{predict, ClashReport};
use crate::separation::{separate, Adjustment, ConvergenceReport, SeparationSettings};
use crate::summary::RunSummary;
use crate::zheight::{Perturbation, ZAssigner};
use cad_lift_model::{
    BuildingContext, ClearanceLookup, Error, Issue, MatchedElement, PipelineConfig, RawEntity,
    Result, TemplateLibrary,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Everything a conversion run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub elements: Vec<MatchedElement>,
    pub unclassified: Vec<UnclassifiedEntity>,
    pub adjustments: Vec<Adjustment>,
    pub convergence: ConvergenceReport,
    /// Prediction over the assigned heights, before separation
    pub clash_before: ClashReport,
    pub clash_report: ClashReport,
    pub summary: RunSummary,
    pub issues: Vec<Issue>,
}

/// A validated configuration bound to a frozen template library
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    library: Arc<TemplateLibrary>,
    clearances: ClearanceLookup,
}

impl Pipeline {
    /// Fails with a configuration error before any stage can run.
    pub fn new(config: PipelineConfig, library: Arc<TemplateLibrary>) -> Result<Self> {
        config.validate()?;
        library.validate()?;
        let clearances = config.clearances.compile();
        Ok(Self {
            config,
            library,
            clearances,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    pub fn run(&self, entities: &[RawEntity], context: &BuildingContext) -> Result<RunOutput> {
        self.run_with_cancel(entities, context, &AtomicBool::new(false))
    }

    /// Like [`Pipeline::run`], checking `cancel` between stages.
    pub fn run_with_cancel(
        &self,
        entities: &[RawEntity],
        context: &BuildingContext,
        cancel: &AtomicBool,
    ) -> Result<RunOutput> {
        let start = Instant::now();
        let checkpoint = |stage: &'static str| {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(stage, "Run cancelled");
                Err(Error::Cancelled { stage })
            } else {
                Ok(())
            }
        };
        let profile = self.config.profile()?;
        let mut issues = Vec::new();

        checkpoint("classify")?;
        let classifier = Classifier::new(
            &self.library,
            &self.config.disciplines,
            self.config.tie_break,
            self.config.infer_unmatched,
        )?;
        let classified = classifier.classify_all(entities);
        issues.extend(classified.issues);

        checkpoint("assign")?;
        let assigner = ZAssigner::new(
            &self.library,
            context,
            profile,
            Perturbation::new(self.config.perturbation_seed, self.config.perturbation_bound),
        );
        let assigned = assigner.assign(classified.elements);
        issues.extend(assigned.issues);
        let mut elements = assigned.elements;

        checkpoint("separate")?;
        let clash_settings = self.config.clash();
        let clash_before = predict(&elements, &clash_settings);
        let separation = separate(
            &mut elements,
            &self.clearances,
            &SeparationSettings {
                cell_size: self.config.grid_cell_size,
                safety_margin: self.config.safety_margin,
                max_iterations: self.config.max_separation_iterations,
            },
        );
        issues.extend(separation.issues);

        checkpoint("predict")?;
        let clash_report = predict(&elements, &clash_settings);

        let summary = RunSummary::build(
            entities.len(),
            &elements,
            &issues,
            &separation.convergence,
            &clash_report,
        );
        summary.log();
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline finished"
        );

        Ok(RunOutput {
            elements,
            unclassified: classified.unclassified,
            adjustments: separation.adjustments,
            convergence: separation.convergence,
            clash_before,
            clash_report,
            summary,
            issues,
        })
    }
}
