// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disciplines and the layer-name dictionary that derives them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named engineering partition of the building model.
///
/// Disciplines are plain data so rule tables can name any of them. Names are
/// stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Discipline(String);

impl Discipline {
    pub const ARCHITECTURE: &'static str = "architecture";
    pub const STRUCTURE: &'static str = "structure";
    pub const FIRE_PROTECTION: &'static str = "fire_protection";
    pub const ELECTRICAL: &'static str = "electrical";
    pub const MECHANICAL: &'static str = "mechanical";
    pub const PLUMBING: &'static str = "plumbing";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Discipline {
    fn from(s: String) -> Self {
        Discipline::new(s)
    }
}

impl From<&str> for Discipline {
    fn from(s: &str) -> Self {
        Discipline::new(s)
    }
}

impl From<Discipline> for String {
    fn from(d: Discipline) -> Self {
        d.0
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unordered pair of disciplines, stored sorted.
///
/// Serialized as `"a/b"` so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisciplinePair {
    first: Discipline,
    second: Discipline,
}

impl DisciplinePair {
    pub fn new(a: Discipline, b: Discipline) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &Discipline {
        &self.first
    }

    pub fn second(&self) -> &Discipline {
        &self.second
    }

    pub fn is_same_discipline(&self) -> bool {
        self.first == self.second
    }
}

impl fmt::Display for DisciplinePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

impl From<DisciplinePair> for String {
    fn from(p: DisciplinePair) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for DisciplinePair {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.split_once('/') {
            Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
                Ok(DisciplinePair::new(a.into(), b.into()))
            }
            _ => Err(format!("expected 'discipline/discipline', got '{}'", s)),
        }
    }
}

/// How a dictionary pattern is compared against a layer name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Prefix,
    Substring,
}

/// One entry of the layer-name dictionary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisciplineRule {
    pub pattern: String,
    pub mode: MatchMode,
    pub discipline: Discipline,
}

impl DisciplineRule {
    pub fn prefix(pattern: &str, discipline: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            mode: MatchMode::Prefix,
            discipline: Discipline::new(discipline),
        }
    }

    pub fn substring(pattern: &str, discipline: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            mode: MatchMode::Substring,
            discipline: Discipline::new(discipline),
        }
    }

    /// Case-insensitive test against an uppercased layer name.
    fn matches_upper(&self, layer_upper: &str) -> bool {
        let pattern = self.pattern.to_ascii_uppercase();
        match self.mode {
            MatchMode::Prefix => layer_upper.starts_with(&pattern),
            MatchMode::Substring => layer_upper.contains(&pattern),
        }
    }
}

/// Ordered layer-name dictionary. The first matching rule wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DisciplineDictionary {
    pub rules: Vec<DisciplineRule>,
}

impl DisciplineDictionary {
    pub fn new(rules: Vec<DisciplineRule>) -> Self {
        Self { rules }
    }

    /// Derive the discipline token of a layer name.
    pub fn resolve(&self, layer: &str) -> Option<&Discipline> {
        let upper = layer.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches_upper(&upper))
            .map(|rule| &rule.discipline)
    }
}

impl Default for DisciplineDictionary {
    fn default() -> Self {
        Self::new(vec![
            DisciplineRule::prefix("FP-", Discipline::FIRE_PROTECTION),
            DisciplineRule::substring("SPRINK", Discipline::FIRE_PROTECTION),
            DisciplineRule::prefix("ELEC", Discipline::ELECTRICAL),
            DisciplineRule::prefix("E-", Discipline::ELECTRICAL),
            DisciplineRule::prefix("ACMV", Discipline::MECHANICAL),
            DisciplineRule::prefix("HVAC", Discipline::MECHANICAL),
            DisciplineRule::prefix("M-", Discipline::MECHANICAL),
            DisciplineRule::prefix("PLUMB", Discipline::PLUMBING),
            DisciplineRule::prefix("P-", Discipline::PLUMBING),
            DisciplineRule::prefix("STR", Discipline::STRUCTURE),
            DisciplineRule::prefix("S-", Discipline::STRUCTURE),
            DisciplineRule::prefix("ARCH", Discipline::ARCHITECTURE),
            DisciplineRule::prefix("A-", Discipline::ARCHITECTURE),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dictionary() {
        let dict = DisciplineDictionary::default();
        assert_eq!(dict.resolve("FP-SPRINKLER").unwrap().as_str(), "fire_protection");
        assert_eq!(dict.resolve("elec-light").unwrap().as_str(), "electrical");
        assert_eq!(dict.resolve("ACMV-DIFFUSER").unwrap().as_str(), "mechanical");
        assert!(dict.resolve("DEFPOINTS").is_none());
        assert!(dict.resolve("  ").is_none());
    }

    #[test]
    fn test_first_rule_wins() {
        let dict = DisciplineDictionary::new(vec![
            DisciplineRule::substring("LIGHT", "electrical"),
            DisciplineRule::prefix("FP-", "fire_protection"),
        ]);
        // Both rules match; list order decides
        assert_eq!(dict.resolve("FP-LIGHT").unwrap().as_str(), "electrical");
    }

    #[test]
    fn test_pair_is_unordered() {
        let a = DisciplinePair::new("mechanical".into(), "electrical".into());
        let b = DisciplinePair::new("electrical".into(), "mechanical".into());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "electrical/mechanical");

        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"electrical/mechanical\"");
        let back: DisciplinePair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
        assert!(serde_json::from_str::<DisciplinePair>("\"electrical\"").is_err());
    }
}
