// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # cad-lift inference
//!
//! Discipline-aware stages that lift 2D drawing entities to 3D:
//!
//! 1. [`extract_templates`] learns placement statistics from a reference model
//! 2. [`Classifier`] binds entities to templates
//! 3. [`ZAssigner`] gives every element a storey-relative height
//! 4. [`separate`] pushes plan-overlapping disciplines apart
//! 5. [`predict`] reports the clashes that remain
//!
//! [`Pipeline`] runs stages 2 to 5 in order.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cad_lift_inference::Pipeline;
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::new(config, Arc::new(library))?;
//! let output = pipeline.run(&entities, &context)?;
//! println!("{} clashes", output.clash_report.total());
//! ```

pub mod classifier;
pub mod clash;
pub mod extractor;
pub mod grid;
pub mod pipeline;
pub mod separation;
pub mod summary;
pub mod zheight;

pub use classifier::{
    Classification, ClassificationOutcome, Classifier, MatchScore, UnclassifiedEntity,
    UnclassifiedReason,
};
pub use clash::{predict, ClashComparison, ClashRecord, ClashReport, HighRiskCell, PairCount};
pub use extractor::{extract_templates, ExtractionOutcome};
pub use grid::{nearest_neighbor_distances, CellKey, SpatialGrid};
pub use pipeline::{Pipeline, RunOutput};
pub use separation::{
    separate, Adjustment, AdjustmentReason, ConvergenceReport, SeparationOutcome,
    SeparationSettings,
};
pub use summary::{RunSummary, TierShare};
pub use zheight::{AssignmentOutcome, Perturbation, Placement, ZAssigner};
