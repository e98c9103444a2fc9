// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # cad-lift model
//!
//! Shared data model for lifting 2D CAD drawing entities into positioned 3D
//! building elements:
//!
//! - [`RawEntity`]: a parsed drawing primitive (layer, symbol, geometry)
//! - [`Template`] / [`TemplateLibrary`]: placement statistics learned from a
//!   reference 3D model, one per discipline and element class
//! - [`MatchedElement`]: an entity bound to a template and given a `z`
//! - [`PipelineConfig`]: rule tables (discipline dictionary, layering
//!   heights, clearances) and tolerances
//!
//! The inference stages live in `cad-lift-inference`.

pub mod config;
pub mod discipline;
pub mod element;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod issue;
pub mod persist;
pub mod storey;
pub mod template;

pub use config::{
    BuildingProfile, ClashSettings, ClearanceLookup, ClearanceRule, ClearanceTable,
    DisciplineLayer, ExtractionSettings, PipelineConfig, TieBreak,
};
pub use discipline::{Discipline, DisciplineDictionary, DisciplinePair, DisciplineRule, MatchMode};
pub use element::{
    Confidence, ElementRecord, ElementStatus, MatchedElement, OffsetSource, Provenance,
    ReferenceDataset, UNMATCHED_CLASS,
};
pub use entity::{Attributes, Drawing, RawEntity};
pub use error::{Error, Result};
pub use geometry::{Bounds2D, Geometry, GeometryKind, Point2D, Point3D};
pub use issue::{count_by_kind, Issue, IssueKind};
pub use persist::{json_digest, load_json, save_json_atomic};
pub use storey::{BuildingContext, Storey, StoreyEvidence, StoreyLookup};
pub use template::{
    MatchSignature, SpacingStats, StoreyOffset, Template, TemplateConfidence, TemplateLibrary,
    VerticalStats, LIBRARY_SCHEMA_VERSION,
};
