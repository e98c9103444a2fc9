// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Learned placement templates and the template library

use crate::discipline::Discipline;
use crate::error::{Error, Result};
use crate::geometry::GeometryKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current on-disk schema version of [`TemplateLibrary`]
pub const LIBRARY_SCHEMA_VERSION: u32 = 1;

/// Signals that bind a raw entity to a template.
///
/// Patterns accept `*` and `?` wildcards and compare case-insensitively.
/// An empty `geometry_kinds` set accepts any kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSignature {
    #[serde(default)]
    pub layer_patterns: BTreeSet<String>,
    #[serde(default)]
    pub symbol_patterns: BTreeSet<String>,
    #[serde(default)]
    pub geometry_kinds: BTreeSet<GeometryKind>,
}

impl MatchSignature {
    pub fn accepts_kind(&self, kind: GeometryKind) -> bool {
        self.geometry_kinds.is_empty() || self.geometry_kinds.contains(&kind)
    }
}

/// Offset statistics for one storey
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StoreyOffset {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Vertical offsets in metres above the storey base elevation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerticalStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_storey: BTreeMap<String, StoreyOffset>,
}

impl VerticalStats {
    /// Flat statistics without a storey table.
    pub fn uniform(mean: f64) -> Self {
        Self {
            mean,
            min: mean,
            max: mean,
            per_storey: BTreeMap::new(),
        }
    }
}

/// Layout regularity of classes placed on a grid (sprinklers, lights...)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpacingStats {
    /// Median horizontal nearest-neighbour distance
    pub typical_spacing: f64,
    /// Radius served by one instance on a square layout of that spacing
    pub coverage_radius: f64,
}

/// Trust level of a template's statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateConfidence {
    Normal,
    /// Built from fewer than the configured minimum number of samples
    LowConfidence,
}

/// Spatial placement statistics for one (discipline, element class) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: String,
    pub discipline: Discipline,
    pub element_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default)]
    pub signature: MatchSignature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<VerticalStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<SpacingStats>,
    #[serde(default)]
    pub instance_count: usize,
    #[serde(default = "default_weight")]
    pub confidence_weight: f64,
    #[serde(default = "default_template_confidence")]
    pub confidence: TemplateConfidence,
}

fn default_weight() -> f64 {
    1.0
}

fn default_template_confidence() -> TemplateConfidence {
    TemplateConfidence::Normal
}

impl Template {
    /// Canonical template id for a group key.
    pub fn make_id(discipline: &Discipline, class: &str, element_type: Option<&str>) -> String {
        match element_type {
            Some(t) => format!("{}.{}.{}", discipline, class, t),
            None => format!("{}.{}", discipline, class),
        }
    }

    /// Hand-curated template with no extracted statistics.
    pub fn curated(discipline: &str, class: &str, signature: MatchSignature) -> Self {
        let discipline = Discipline::new(discipline);
        Self {
            id: Self::make_id(&discipline, class, None),
            discipline,
            element_class: class.to_string(),
            element_type: None,
            signature,
            vertical: None,
            spacing: None,
            instance_count: 0,
            confidence_weight: default_weight(),
            confidence: TemplateConfidence::Normal,
        }
    }

    pub fn with_vertical(mut self, vertical: VerticalStats) -> Self {
        self.vertical = Some(vertical);
        self
    }

    pub fn with_instance_count(mut self, count: usize) -> Self {
        self.instance_count = count;
        self
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == TemplateConfidence::LowConfidence
    }
}

/// Immutable snapshot of templates used by one conversion run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateLibrary {
    pub schema_version: u32,
    /// Digest of the reference dataset the templates were extracted from
    #[serde(default)]
    pub source_digest: String,
    /// Digest of the extraction settings
    #[serde(default)]
    pub config_digest: String,
    pub templates: Vec<Template>,
}

impl TemplateLibrary {
    /// Builds a library, ordering templates by id.
    ///
    /// Fails on duplicate ids.
    pub fn new(mut templates: Vec<Template>) -> Result<Self> {
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(w) = templates.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(Error::InvalidInput(format!(
                "duplicate template id '{}'",
                w[0].id
            )));
        }
        Ok(Self {
            schema_version: LIBRARY_SCHEMA_VERSION,
            source_digest: String::new(),
            config_digest: String::new(),
            templates,
        })
    }

    pub fn empty() -> Self {
        Self {
            schema_version: LIBRARY_SCHEMA_VERSION,
            source_digest: String::new(),
            config_digest: String::new(),
            templates: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates
            .binary_search_by(|t| t.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.templates[i])
    }

    /// Templates of one discipline, in id order.
    pub fn for_discipline<'a>(
        &'a self,
        discipline: &'a Discipline,
    ) -> impl Iterator<Item = &'a Template> + 'a {
        self.templates
            .iter()
            .filter(move |t| &t.discipline == discipline)
    }

    /// True when both libraries come from the same dataset and settings.
    pub fn is_same_extraction(&self, other: &TemplateLibrary) -> bool {
        self.source_digest == other.source_digest && self.config_digest == other.config_digest
    }

    /// Sanity checks on a loaded library.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != LIBRARY_SCHEMA_VERSION {
            return Err(Error::InvalidInput(format!(
                "unsupported template library schema version {} (expected {})",
                self.schema_version, LIBRARY_SCHEMA_VERSION
            )));
        }
        if self.templates.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(Error::InvalidInput(
                "template ids must be unique and sorted".to_string(),
            ));
        }
        for t in &self.templates {
            for pattern in t.signature.layer_patterns.iter().chain(&t.signature.symbol_patterns) {
                glob::Pattern::new(pattern).map_err(|e| {
                    Error::InvalidInput(format!(
                        "template '{}' has invalid pattern '{}': {}",
                        t.id, pattern, e
                    ))
                })?;
            }
        }
        Ok(())
    }
}
