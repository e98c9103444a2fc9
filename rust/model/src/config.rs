// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline configuration.
//!
//! Every numeric rule (layering heights, clearances, tolerances) is data here
//! rather than a constant in the stages, since the shipped defaults come from
//! a single reference building and rarely transfer unchanged.

use crate::discipline::{Discipline, DisciplineDictionary, DisciplinePair};
use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Nominal height of one discipline's services, relative to the ceiling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisciplineLayer {
    pub discipline: Discipline,
    /// Distance below the ceiling line in metres
    pub below_ceiling: f64,
}

impl DisciplineLayer {
    pub fn new(discipline: &str, below_ceiling: f64) -> Self {
        Self {
            discipline: Discipline::new(discipline),
            below_ceiling,
        }
    }
}

/// Building-type defaults for elements without template vertical data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildingProfile {
    /// Ceiling line above the storey base elevation
    pub ceiling_height: f64,
    /// Ordered discipline layering, top of the ceiling void first
    pub layers: Vec<DisciplineLayer>,
    /// Used for disciplines missing from `layers`
    #[serde(default = "default_fallback_below_ceiling")]
    pub fallback_below_ceiling: f64,
}

fn default_fallback_below_ceiling() -> f64 {
    0.5
}

impl BuildingProfile {
    /// Default offset above the storey base for a discipline.
    pub fn default_offset(&self, discipline: &Discipline) -> f64 {
        let below = self
            .layers
            .iter()
            .find(|l| &l.discipline == discipline)
            .map(|l| l.below_ceiling)
            .unwrap_or(self.fallback_below_ceiling);
        self.ceiling_height - below
    }

    pub fn office() -> Self {
        Self {
            ceiling_height: 4.5,
            layers: vec![
                DisciplineLayer::new(Discipline::STRUCTURE, 0.0),
                DisciplineLayer::new(Discipline::FIRE_PROTECTION, 0.1),
                DisciplineLayer::new(Discipline::ELECTRICAL, 0.2),
                DisciplineLayer::new(Discipline::MECHANICAL, 0.6),
                DisciplineLayer::new(Discipline::PLUMBING, 0.9),
                DisciplineLayer::new(Discipline::ARCHITECTURE, 4.5),
            ],
            fallback_below_ceiling: default_fallback_below_ceiling(),
        }
    }

    pub fn residential() -> Self {
        Self {
            ceiling_height: 3.0,
            layers: vec![
                DisciplineLayer::new(Discipline::STRUCTURE, 0.0),
                DisciplineLayer::new(Discipline::FIRE_PROTECTION, 0.1),
                DisciplineLayer::new(Discipline::ELECTRICAL, 0.15),
                DisciplineLayer::new(Discipline::MECHANICAL, 0.35),
                DisciplineLayer::new(Discipline::PLUMBING, 0.5),
                DisciplineLayer::new(Discipline::ARCHITECTURE, 3.0),
            ],
            fallback_below_ceiling: 0.3,
        }
    }

    pub fn industrial() -> Self {
        Self {
            ceiling_height: 8.0,
            layers: vec![
                DisciplineLayer::new(Discipline::STRUCTURE, 0.0),
                DisciplineLayer::new(Discipline::FIRE_PROTECTION, 0.2),
                DisciplineLayer::new(Discipline::ELECTRICAL, 0.5),
                DisciplineLayer::new(Discipline::MECHANICAL, 1.0),
                DisciplineLayer::new(Discipline::PLUMBING, 1.5),
                DisciplineLayer::new(Discipline::ARCHITECTURE, 8.0),
            ],
            fallback_below_ceiling: 1.0,
        }
    }
}

/// Minimum vertical separation for one discipline pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearanceRule {
    pub a: Discipline,
    pub b: Discipline,
    pub clearance: f64,
}

impl ClearanceRule {
    pub fn new(a: &str, b: &str, clearance: f64) -> Self {
        Self {
            a: Discipline::new(a),
            b: Discipline::new(b),
            clearance,
        }
    }
}

/// Discipline pair → required clearance, with a conservative default for
/// pairs not listed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearanceTable {
    pub default_clearance: f64,
    #[serde(default)]
    pub rules: Vec<ClearanceRule>,
}

impl Default for ClearanceTable {
    fn default() -> Self {
        use Discipline as D;
        Self {
            default_clearance: 0.20,
            rules: vec![
                ClearanceRule::new(D::FIRE_PROTECTION, D::ELECTRICAL, 0.10),
                ClearanceRule::new(D::FIRE_PROTECTION, D::MECHANICAL, 0.15),
                ClearanceRule::new(D::FIRE_PROTECTION, D::PLUMBING, 0.10),
                ClearanceRule::new(D::ELECTRICAL, D::MECHANICAL, 0.10),
                ClearanceRule::new(D::ELECTRICAL, D::PLUMBING, 0.15),
                ClearanceRule::new(D::MECHANICAL, D::PLUMBING, 0.15),
                ClearanceRule::new(D::STRUCTURE, D::FIRE_PROTECTION, 0.05),
                ClearanceRule::new(D::STRUCTURE, D::ELECTRICAL, 0.05),
                ClearanceRule::new(D::STRUCTURE, D::MECHANICAL, 0.10),
                ClearanceRule::new(D::STRUCTURE, D::PLUMBING, 0.10),
            ],
        }
    }
}

impl ClearanceTable {
    /// Table with only a default entry.
    pub fn uniform(clearance: f64) -> Self {
        Self {
            default_clearance: clearance,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, a: &str, b: &str, clearance: f64) -> Self {
        self.rules.push(ClearanceRule::new(a, b, clearance));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.default_clearance.is_finite() || self.default_clearance < 0.0 {
            return Err(Error::Configuration(format!(
                "default clearance must be a non-negative number, got {}",
                self.default_clearance
            )));
        }
        let mut seen: BTreeMap<DisciplinePair, f64> = BTreeMap::new();
        for rule in &self.rules {
            if !rule.clearance.is_finite() || rule.clearance < 0.0 {
                return Err(Error::Configuration(format!(
                    "clearance for {}/{} must be a non-negative number, got {}",
                    rule.a, rule.b, rule.clearance
                )));
            }
            let pair = DisciplinePair::new(rule.a.clone(), rule.b.clone());
            if let Some(previous) = seen.insert(pair.clone(), rule.clearance) {
                if previous != rule.clearance {
                    return Err(Error::Configuration(format!(
                        "conflicting clearances for {}: {} and {}",
                        pair, previous, rule.clearance
                    )));
                }
            }
        }
        Ok(())
    }

    /// Hash lookup form of the table.
    pub fn compile(&self) -> ClearanceLookup {
        let pairs = self
            .rules
            .iter()
            .map(|r| (DisciplinePair::new(r.a.clone(), r.b.clone()), r.clearance))
            .collect();
        ClearanceLookup {
            default_clearance: self.default_clearance,
            pairs,
        }
    }
}

/// Compiled, symmetric clearance lookup
#[derive(Debug, Clone)]
pub struct ClearanceLookup {
    default_clearance: f64,
    pairs: FxHashMap<DisciplinePair, f64>,
}

impl ClearanceLookup {
    pub fn required(&self, pair: &DisciplinePair) -> f64 {
        self.pairs
            .get(pair)
            .copied()
            .unwrap_or(self.default_clearance)
    }
}

/// Tie-break between equally scored templates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    TemplateIdAscending,
    TemplateIdDescending,
}

/// Settings that shape template extraction; hashed into the library digest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSettings {
    pub min_samples: usize,
    pub regular_layout_classes: Vec<String>,
}

/// Settings of the read-only clash predictor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClashSettings {
    pub cell_size: f64,
    pub tolerance: f64,
    pub high_risk_band: f64,
}

/// Complete configuration of an extraction or conversion run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub building_profile: String,
    pub profiles: BTreeMap<String, BuildingProfile>,
    pub disciplines: DisciplineDictionary,
    pub grid_cell_size: f64,
    pub clearances: ClearanceTable,
    pub safety_margin: f64,
    pub max_separation_iterations: usize,
    pub clash_tolerance: f64,
    pub high_risk_band: f64,
    pub min_samples: usize,
    pub perturbation_bound: f64,
    pub perturbation_seed: u64,
    pub tie_break: TieBreak,
    pub infer_unmatched: bool,
    pub regular_layout_classes: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("office".to_string(), BuildingProfile::office());
        profiles.insert("residential".to_string(), BuildingProfile::residential());
        profiles.insert("industrial".to_string(), BuildingProfile::industrial());

        Self {
            building_profile: "office".to_string(),
            profiles,
            disciplines: DisciplineDictionary::default(),
            grid_cell_size: 0.5,
            clearances: ClearanceTable::default(),
            safety_margin: 0.02,
            max_separation_iterations: 16,
            clash_tolerance: 0.05,
            high_risk_band: 0.30,
            min_samples: 5,
            perturbation_bound: 0.05,
            perturbation_seed: 0,
            tie_break: TieBreak::default(),
            infer_unmatched: true,
            regular_layout_classes: vec![
                "*sprinkler*".to_string(),
                "*light*".to_string(),
                "*diffuser*".to_string(),
                "*smoke_detector*".to_string(),
                "*grille*".to_string(),
            ],
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// The selected building profile.
    pub fn profile(&self) -> Result<&BuildingProfile> {
        self.profiles.get(&self.building_profile).ok_or_else(|| {
            Error::Configuration(format!(
                "building profile '{}' is not defined (known: {})",
                self.building_profile,
                self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn extraction(&self) -> ExtractionSettings {
        ExtractionSettings {
            min_samples: self.min_samples,
            regular_layout_classes: self.regular_layout_classes.clone(),
        }
    }

    pub fn clash(&self) -> ClashSettings {
        ClashSettings {
            cell_size: self.grid_cell_size,
            tolerance: self.clash_tolerance,
            high_risk_band: self.high_risk_band,
        }
    }

    /// Reject setup defects before any stage runs.
    pub fn validate(&self) -> Result<()> {
        self.profile()?;
        for (name, p) in &self.profiles {
            if !p.ceiling_height.is_finite() || p.ceiling_height <= 0.0 {
                return Err(Error::Configuration(format!(
                    "profile '{}' needs a positive ceiling height, got {}",
                    name, p.ceiling_height
                )));
            }
            if p.layers.iter().any(|l| !l.below_ceiling.is_finite()) {
                return Err(Error::Configuration(format!(
                    "profile '{}' has a non-finite layer height",
                    name
                )));
            }
        }

        positive("grid_cell_size", self.grid_cell_size)?;
        non_negative("safety_margin", self.safety_margin)?;
        non_negative("clash_tolerance", self.clash_tolerance)?;
        non_negative("high_risk_band", self.high_risk_band)?;
        non_negative("perturbation_bound", self.perturbation_bound)?;

        if self.max_separation_iterations == 0 {
            return Err(Error::Configuration(
                "max_separation_iterations must be at least 1".to_string(),
            ));
        }
        if self.min_samples == 0 {
            return Err(Error::Configuration(
                "min_samples must be at least 1".to_string(),
            ));
        }
        if let Some(rule) = self
            .disciplines
            .rules
            .iter()
            .find(|r| r.pattern.trim().is_empty() || r.discipline.as_str().is_empty())
        {
            return Err(Error::Configuration(format!(
                "discipline rule with empty pattern or discipline: {:?}",
                rule
            )));
        }
        for pattern in &self.regular_layout_classes {
            glob::Pattern::new(pattern).map_err(|e| {
                Error::Configuration(format!("invalid class pattern '{}': {}", pattern, e))
            })?;
        }

        self.clearances.validate()
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}
