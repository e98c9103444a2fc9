// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity classification against a template library.
//!
//! 1. The layer name yields a discipline through the ordered dictionary;
//!    no discipline means the entity is unclassified.
//! 2. Every template of that discipline accepting the entity's geometry kind
//!    is scored: exact symbol match, wildcard symbol match, layer match only.
//! 3. The winner is the highest score, then the highest instance count, then
//!    the template id in the configured lexical order.
//!
//! Classification of one entity only reads that entity and the library, so
//! entities are classified in parallel and collected in input order.

use cad_lift_model::{
    Discipline, DisciplineDictionary, Error, Issue, IssueKind, MatchedElement, Provenance,
    RawEntity, Result, Template, TemplateLibrary, TieBreak, UNMATCHED_CLASS,
};
use glob::{MatchOptions, Pattern};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const CASE_INSENSITIVE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Strength of a template match, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScore {
    LayerPattern = 1,
    SymbolPattern = 2,
    SymbolExact = 3,
}

/// Why an entity was excluded from the matched set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnclassifiedReason {
    /// The layer name matched no dictionary entry
    NoDiscipline,
    /// Discipline known, no template matched and inference is disabled
    NoTemplate,
}

/// An entity routed to the unclassified bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnclassifiedEntity {
    pub entity_index: usize,
    pub source_file: String,
    pub layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discipline: Option<Discipline>,
    pub reason: UnclassifiedReason,
}

/// Result of classifying one entity
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Matched {
        element: MatchedElement,
        score: Option<MatchScore>,
    },
    Unclassified(UnclassifiedEntity),
}

/// Classification of a whole input batch
#[derive(Debug, Clone, Default)]
pub struct ClassificationOutcome {
    pub elements: Vec<MatchedElement>,
    pub unclassified: Vec<UnclassifiedEntity>,
    pub issues: Vec<Issue>,
}

impl ClassificationOutcome {
    /// Matched plus unclassified; always equals the input count.
    pub fn total(&self) -> usize {
        self.elements.len() + self.unclassified.len()
    }
}

/// Template signature with its patterns compiled once per run
#[derive(Debug)]
struct CompiledTemplate {
    index: usize,
    layers: Vec<Pattern>,
    symbols: Vec<(String, Pattern)>,
}

impl CompiledTemplate {
    fn compile(index: usize, template: &Template) -> Result<Self> {
        let compile = |p: &String| {
            Pattern::new(p).map_err(|e| {
                Error::InvalidInput(format!(
                    "template '{}' has invalid pattern '{}': {}",
                    template.id, p, e
                ))
            })
        };
        Ok(Self {
            index,
            layers: template
                .signature
                .layer_patterns
                .iter()
                .map(compile)
                .collect::<Result<_>>()?,
            symbols: template
                .signature
                .symbol_patterns
                .iter()
                .map(|p| -> Result<(String, Pattern)> { Ok((p.clone(), compile(p)?)) })
                .collect::<Result<_>>()?,
        })
    }

    fn score(&self, entity: &RawEntity) -> Option<MatchScore> {
        if let Some(symbol) = entity.symbol.as_deref() {
            let escaped = Pattern::escape(symbol);
            let mut wildcard = false;
            for (raw, pattern) in &self.symbols {
                if raw.eq_ignore_ascii_case(symbol) || raw.eq_ignore_ascii_case(&escaped) {
                    return Some(MatchScore::SymbolExact);
                }
                if pattern.matches_with(symbol, CASE_INSENSITIVE) {
                    wildcard = true;
                }
            }
            if wildcard {
                return Some(MatchScore::SymbolPattern);
            }
        }
        self.layers
            .iter()
            .any(|p| p.matches_with(&entity.layer, CASE_INSENSITIVE))
            .then_some(MatchScore::LayerPattern)
    }
}

/// Maps raw entities onto templates of a frozen library
#[derive(Debug)]
pub struct Classifier<'a> {
    library: &'a TemplateLibrary,
    dictionary: &'a DisciplineDictionary,
    tie_break: TieBreak,
    infer_unmatched: bool,
    by_discipline: FxHashMap<Discipline, Vec<CompiledTemplate>>,
}

impl<'a> Classifier<'a> {
    pub fn new(
        library: &'a TemplateLibrary,
        dictionary: &'a DisciplineDictionary,
        tie_break: TieBreak,
        infer_unmatched: bool,
    ) -> Result<Self> {
        let mut by_discipline: FxHashMap<Discipline, Vec<CompiledTemplate>> = FxHashMap::default();
        for (index, template) in library.templates.iter().enumerate() {
            by_discipline
                .entry(template.discipline.clone())
                .or_default()
                .push(CompiledTemplate::compile(index, template)?);
        }
        Ok(Self {
            library,
            dictionary,
            tie_break,
            infer_unmatched,
            by_discipline,
        })
    }

    /// Priority order of two scored candidates; `Less` wins.
    fn rank(&self, a: (MatchScore, &Template), b: (MatchScore, &Template)) -> Ordering {
        b.0.cmp(&a.0)
            .then(b.1.instance_count.cmp(&a.1.instance_count))
            .then_with(|| match self.tie_break {
                TieBreak::TemplateIdAscending => a.1.id.cmp(&b.1.id),
                TieBreak::TemplateIdDescending => b.1.id.cmp(&a.1.id),
            })
    }

    /// Best template for an entity within a discipline.
    pub fn best_template(
        &self,
        discipline: &Discipline,
        entity: &RawEntity,
    ) -> Option<(MatchScore, &'a Template)> {
        let library: &'a TemplateLibrary = self.library;
        let candidates = self.by_discipline.get(discipline)?;
        let kind = entity.kind();
        candidates
            .iter()
            .filter_map(|c| {
                let template = &library.templates[c.index];
                if !template.signature.accepts_kind(kind) {
                    return None;
                }
                c.score(entity).map(|score| (score, template))
            })
            .min_by(|a, b| self.rank(*a, *b))
    }

    /// Classify one entity. Pure in (entity, library, dictionary).
    pub fn classify(&self, entity_index: usize, entity: &RawEntity) -> Classification {
        let unclassified = |discipline: Option<Discipline>, reason| {
            Classification::Unclassified(UnclassifiedEntity {
                entity_index,
                source_file: entity.source_file.clone(),
                layer: entity.layer.clone(),
                symbol: entity.symbol.clone(),
                discipline,
                reason,
            })
        };

        let Some(discipline) = self.dictionary.resolve(&entity.layer) else {
            return unclassified(None, UnclassifiedReason::NoDiscipline);
        };

        match self.best_template(discipline, entity) {
            Some((score, template)) => Classification::Matched {
                element: MatchedElement::classified(
                    entity,
                    entity_index,
                    template.discipline.clone(),
                    template.element_class.clone(),
                    template.element_type.clone(),
                    Some(template.id.clone()),
                    Provenance::Direct,
                ),
                score: Some(score),
            },
            None if self.infer_unmatched => Classification::Matched {
                element: MatchedElement::classified(
                    entity,
                    entity_index,
                    discipline.clone(),
                    UNMATCHED_CLASS.to_string(),
                    None,
                    None,
                    Provenance::Inferred,
                ),
                score: None,
            },
            None => unclassified(Some(discipline.clone()), UnclassifiedReason::NoTemplate),
        }
    }

    /// Classify a batch. Every entity ends up in exactly one bucket.
    pub fn classify_all(&self, entities: &[RawEntity]) -> ClassificationOutcome {
        let results: Vec<Classification> = entities
            .par_iter()
            .enumerate()
            .map(|(i, e)| self.classify(i, e))
            .collect();

        let mut outcome = ClassificationOutcome::default();
        for result in results {
            match result {
                Classification::Matched { element, .. } => outcome.elements.push(element),
                Classification::Unclassified(u) => {
                    outcome.issues.push(Issue::new(
                        IssueKind::UnclassifiedEntity,
                        format!("entity #{}", u.entity_index),
                        match u.reason {
                            UnclassifiedReason::NoDiscipline => {
                                format!("layer '{}' yields no discipline", u.layer)
                            }
                            UnclassifiedReason::NoTemplate => {
                                format!("no template matches layer '{}'", u.layer)
                            }
                        },
                    ));
                    outcome.unclassified.push(u);
                }
            }
        }

        disambiguate_ids(&mut outcome.elements, entities, &mut outcome.issues);

        tracing::info!(
            entities = entities.len(),
            matched = outcome.elements.len(),
            inferred = outcome
                .elements
                .iter()
                .filter(|e| e.provenance == Provenance::Inferred)
                .count(),
            unclassified = outcome.unclassified.len(),
            "Classification complete"
        );
        outcome
    }
}

/// Give every element sharing an id a distinct one.
///
/// Colliding elements are suffixed with the content hash of their entity,
/// so the outcome does not depend on input order. Entities identical in
/// content as well fall back to their input ordinal.
fn disambiguate_ids(
    elements: &mut [MatchedElement],
    entities: &[RawEntity],
    issues: &mut Vec<Issue>,
) {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (n, element) in elements.iter().enumerate() {
        groups.entry(element.id.clone()).or_default().push(n);
    }
    let mut taken: FxHashSet<String> = groups.keys().cloned().collect();

    for (id, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
        let mut renamed = Vec::with_capacity(members.len());
        for n in members {
            let element = &mut elements[n];
            let content = entities
                .get(element.entity_index)
                .map(|e| e.content_hash())
                .unwrap_or_default();
            let mut candidate = format!("{}-{:08x}", id, content as u32);
            if !taken.insert(candidate.clone()) {
                candidate = format!("{}-{}", candidate, element.entity_index);
                taken.insert(candidate.clone());
            }
            element.id = candidate.clone();
            renamed.push(candidate);
        }
        let message = format!(
            "{} entities share source file and handle; renamed to {}",
            renamed.len(),
            renamed.join(", ")
        );
        tracing::warn!(id = %id, "{}", message);
        issues.push(Issue::new(IssueKind::DuplicateIdentifier, id, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_lift_model::{Geometry, GeometryKind, MatchSignature, Point3D};
    use std::collections::BTreeSet;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn template(discipline: &str, class: &str, layers: &[&str], symbols: &[&str]) -> Template {
        Template::curated(
            discipline,
            class,
            MatchSignature {
                layer_patterns: set(layers),
                symbol_patterns: set(symbols),
                geometry_kinds: BTreeSet::new(),
            },
        )
    }

    fn insert(layer: &str, symbol: Option<&str>) -> RawEntity {
        let e = RawEntity::new(
            "L1.dwg",
            layer,
            Geometry::Insert {
                at: Point3D::new(1.0, 1.0, 0.0),
                rotation: 0.0,
                scale: 1.0,
            },
        );
        match symbol {
            Some(s) => e.with_symbol(s),
            None => e,
        }
    }

    fn matched_template(c: &Classification) -> Option<&str> {
        match c {
            Classification::Matched { element, .. } => element.template_id.as_deref(),
            Classification::Unclassified(_) => None,
        }
    }

    #[test]
    fn test_exact_symbol_beats_layer_only() {
        let lib = TemplateLibrary::new(vec![
            template("fire_protection", "pipe", &["FP-*"], &[]).with_instance_count(500),
            template("fire_protection", "sprinkler", &["FP-*"], &["SPK-PENDENT"]),
        ])
        .unwrap();
        let dict = DisciplineDictionary::default();
        let classifier = Classifier::new(&lib, &dict, TieBreak::default(), true).unwrap();

        let c = classifier.classify(0, &insert("FP-SPRINKLER", Some("spk-pendent")));
        assert_eq!(matched_template(&c), Some("fire_protection.sprinkler"));
        match c {
            Classification::Matched { score, .. } => assert_eq!(score, Some(MatchScore::SymbolExact)),
            _ => unreachable!(),
        }

        // Unknown symbol: layer-only, more evidence wins
        let c = classifier.classify(1, &insert("FP-SPRINKLER", Some("OTHER")));
        assert_eq!(matched_template(&c), Some("fire_protection.pipe"));
    }

    #[test]
    fn test_wildcard_symbol_scores_below_exact() {
        let lib = TemplateLibrary::new(vec![
            template("electrical", "light", &[], &["LT-*"]),
            template("electrical", "downlight", &[], &["LT-DOWN"]),
        ])
        .unwrap();
        let dict = DisciplineDictionary::default();
        let classifier = Classifier::new(&lib, &dict, TieBreak::default(), true).unwrap();

        let c = classifier.classify(0, &insert("E-LIGHT", Some("LT-DOWN")));
        assert_eq!(matched_template(&c), Some("electrical.downlight"));
        let c = classifier.classify(0, &insert("E-LIGHT", Some("LT-PANEL")));
        assert_eq!(matched_template(&c), Some("electrical.light"));
    }

    #[test]
    fn test_equal_scores_use_lexical_tie_break() {
        let lib = TemplateLibrary::new(vec![
            template("electrical", "b_light", &["E-LIGHT"], &[]).with_instance_count(10),
            template("electrical", "a_light", &["E-LIGHT"], &[]).with_instance_count(10),
        ])
        .unwrap();
        let dict = DisciplineDictionary::default();
        let entity = insert("E-LIGHT", None);

        let asc = Classifier::new(&lib, &dict, TieBreak::TemplateIdAscending, true).unwrap();
        for _ in 0..10 {
            assert_eq!(
                matched_template(&asc.classify(0, &entity)),
                Some("electrical.a_light")
            );
        }

        let desc = Classifier::new(&lib, &dict, TieBreak::TemplateIdDescending, true).unwrap();
        assert_eq!(
            matched_template(&desc.classify(0, &entity)),
            Some("electrical.b_light")
        );
    }

    #[test]
    fn test_geometry_kind_filter() {
        let mut lines_only = template("mechanical", "duct", &["ACMV-*"], &[]);
        lines_only.signature.geometry_kinds.insert(GeometryKind::Line);
        let lib = TemplateLibrary::new(vec![lines_only]).unwrap();
        let dict = DisciplineDictionary::default();
        let classifier = Classifier::new(&lib, &dict, TieBreak::default(), false).unwrap();

        let c = classifier.classify(0, &insert("ACMV-DUCT", None));
        match c {
            Classification::Unclassified(u) => assert_eq!(u.reason, UnclassifiedReason::NoTemplate),
            _ => panic!("insert must not match a lines-only template"),
        }
    }

    #[test]
    fn test_unknown_layer_is_unclassified_and_counted() {
        let lib = TemplateLibrary::new(vec![template("electrical", "light", &["E-*"], &[])]).unwrap();
        let dict = DisciplineDictionary::default();
        let classifier = Classifier::new(&lib, &dict, TieBreak::default(), true).unwrap();

        let entities = vec![
            insert("E-LIGHT", None),
            insert("DEFPOINTS", None),
            insert("ELEC-POWER", None),
        ];
        let outcome = classifier.classify_all(&entities);

        assert_eq!(outcome.total(), entities.len());
        assert_eq!(outcome.unclassified.len(), 1);
        assert_eq!(outcome.unclassified[0].entity_index, 1);
        assert_eq!(outcome.unclassified[0].reason, UnclassifiedReason::NoDiscipline);
        assert_eq!(outcome.issues.len(), 1);

        // ELEC-POWER has a discipline but no template: inferred
        let inferred = &outcome.elements[1];
        assert_eq!(inferred.provenance, Provenance::Inferred);
        assert_eq!(inferred.element_class, UNMATCHED_CLASS);
    }

    #[test]
    fn test_classification_independent_of_batch_order() {
        let lib = TemplateLibrary::new(vec![
            template("electrical", "light", &["E-*"], &[]),
            template("fire_protection", "sprinkler", &["FP-*"], &[]),
        ])
        .unwrap();
        let dict = DisciplineDictionary::default();
        let classifier = Classifier::new(&lib, &dict, TieBreak::default(), true).unwrap();

        let a = insert("E-LIGHT", None).with_handle("A1");
        let b = insert("FP-SPRINKLER", None).with_handle("B2");

        let forward = classifier.classify_all(&[a.clone(), b.clone()]);
        let backward = classifier.classify_all(&[b, a]);
        assert_eq!(forward.elements[0].id, backward.elements[1].id);
        assert_eq!(forward.elements[0].template_id, backward.elements[1].template_id);
        assert_eq!(forward.elements[1].template_id, backward.elements[0].template_id);
    }

    #[test]
    fn test_shared_handles_get_distinct_ids() {
        let lib = TemplateLibrary::new(vec![
            template("fire_protection", "sprinkler", &["FP-*"], &[]),
            template("plumbing", "pipe", &["PLUMB-*"], &[]),
        ])
        .unwrap();
        let dict = DisciplineDictionary::default();
        let classifier = Classifier::new(&lib, &dict, TieBreak::default(), true).unwrap();

        let fp = insert("FP-SPRINKLER", None).with_handle("1A");
        let plumb = insert("PLUMB-PIPE", None).with_handle("1A");
        let copy = fp.clone();
        let shared = fp.element_id(0);

        let forward = classifier.classify_all(&[fp.clone(), plumb.clone(), copy.clone()]);
        let ids: BTreeSet<&str> = forward.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| id.starts_with(&shared) && *id != shared));
        assert_eq!(forward.issues.len(), 1);
        assert_eq!(forward.issues[0].kind, IssueKind::DuplicateIdentifier);
        assert_eq!(forward.issues[0].subject, shared);

        // Distinct entities keep their ids whatever the input order
        let backward = classifier.classify_all(&[plumb, fp]);
        let id_of = |outcome: &ClassificationOutcome, layer: &str| {
            outcome
                .elements
                .iter()
                .find(|e| e.layer == layer)
                .map(|e| e.id.clone())
        };
        for layer in ["FP-SPRINKLER", "PLUMB-PIPE"] {
            assert_eq!(id_of(&forward, layer), id_of(&backward, layer));
        }
    }
}
