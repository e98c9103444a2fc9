// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building storeys and the per-run building context

use crate::geometry::{point_in_polygon, Point2D};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A building level
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Storey {
    pub name: String,
    /// Base elevation in metres
    pub elevation: f64,
    /// Floor-to-floor height in metres
    #[serde(default = "default_storey_height")]
    pub height: f64,
    /// Plan footprint used for containment lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<Vec<Point2D>>,
}

fn default_storey_height() -> f64 {
    3.0
}

impl Storey {
    pub fn new(name: &str, elevation: f64) -> Self {
        Self {
            name: name.to_string(),
            elevation,
            height: default_storey_height(),
            footprint: None,
        }
    }

    pub fn with_footprint(mut self, footprint: Vec<Point2D>) -> Self {
        self.footprint = Some(footprint);
        self
    }

    pub fn contains(&self, point: &Point2D) -> bool {
        self.footprint
            .as_deref()
            .map(|fp| point_in_polygon(point, fp))
            .unwrap_or(false)
    }
}

/// How a storey was determined for an entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreyEvidence {
    /// Storey metadata on the entity itself
    Explicit,
    /// The drawing file is mapped to a storey
    SourceFile,
    /// The entity lies inside exactly one storey footprint
    Footprint,
}

/// Outcome of a storey lookup
#[derive(Debug, Clone, PartialEq)]
pub enum StoreyLookup<'a> {
    Resolved(&'a Storey, StoreyEvidence),
    /// The context defines no storeys at all; not a failure
    NoStoreys,
    /// Storeys exist but none could be chosen
    Failed(String),
}

/// Storey layout of the building being converted
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildingContext {
    #[serde(default)]
    pub storeys: Vec<Storey>,
    /// Drawing file → storey name
    #[serde(default)]
    pub source_storeys: BTreeMap<String, String>,
}

impl BuildingContext {
    pub fn new(storeys: Vec<Storey>) -> Self {
        Self {
            storeys,
            source_storeys: BTreeMap::new(),
        }
    }

    pub fn storey(&self, name: &str) -> Option<&Storey> {
        self.storeys.iter().find(|s| s.name == name)
    }

    /// Resolve the storey of an entity.
    ///
    /// Explicit metadata is tried first, then the source file mapping, then
    /// footprint containment of `anchor`. Containment must be unique.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        source_file: &str,
        anchor: &Point2D,
    ) -> StoreyLookup<'_> {
        if self.storeys.is_empty() {
            return StoreyLookup::NoStoreys;
        }

        if let Some(name) = explicit {
            return match self.storey(name) {
                Some(s) => StoreyLookup::Resolved(s, StoreyEvidence::Explicit),
                None => StoreyLookup::Failed(format!("unknown storey '{}'", name)),
            };
        }

        if let Some(name) = self.source_storeys.get(source_file) {
            return match self.storey(name) {
                Some(s) => StoreyLookup::Resolved(s, StoreyEvidence::SourceFile),
                None => StoreyLookup::Failed(format!(
                    "source file '{}' mapped to unknown storey '{}'",
                    source_file, name
                )),
            };
        }

        let mut containing = self.storeys.iter().filter(|s| s.contains(anchor));
        match (containing.next(), containing.next()) {
            (Some(s), None) => StoreyLookup::Resolved(s, StoreyEvidence::Footprint),
            (Some(_), Some(_)) => StoreyLookup::Failed(format!(
                "point ({:.3}, {:.3}) lies in several storey footprints",
                anchor.x, anchor.y
            )),
            (None, _) => StoreyLookup::Failed(format!(
                "point ({:.3}, {:.3}) lies in no storey footprint",
                anchor.x, anchor.y
            )),
        }
    }
}
