// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Matched elements and the record format shared by export and reference data

use crate::discipline::Discipline;
use crate::entity::{Attributes, RawEntity};
use crate::geometry::{Geometry, GeometryKind, Point3D};
use crate::storey::Storey;
use serde::{Deserialize, Serialize};

/// Element class given to entities whose discipline is known but which
/// matched no template.
pub const UNMATCHED_CLASS: &str = "unmatched";

/// Placement confidence tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub const ALL: [Confidence; 3] = [Confidence::High, Confidence::Medium, Confidence::Low];
}

/// Where the base vertical offset came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OffsetSource {
    Storey,
    TemplateMean,
    DisciplineDefault,
}

/// How the element was classified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Bound to a template by symbol or layer signature
    Direct,
    /// Discipline known, no template matched
    Inferred,
}

/// Pipeline progress of an element
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementStatus {
    Classified,
    Placed,
    Separated,
    /// Separation hit its iteration bound with this element still too close
    UnresolvedClashRisk,
}

/// A raw entity bound to a template and placed in 3D
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedElement {
    pub id: String,
    /// Index of the source entity in the run input
    pub entity_index: usize,
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub discipline: Discipline,
    pub element_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub provenance: Provenance,
    pub layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Attributes,
    /// Plan anchor plus the assigned elevation
    pub position: Point3D,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storey: Option<String>,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_source: Option<OffsetSource>,
    pub status: ElementStatus,
}

impl MatchedElement {
    /// Bind an entity to a classification. The element starts unplaced at the
    /// entity's nominal elevation.
    pub fn classified(
        entity: &RawEntity,
        entity_index: usize,
        discipline: Discipline,
        element_class: String,
        element_type: Option<String>,
        template_id: Option<String>,
        provenance: Provenance,
    ) -> Self {
        let anchor = entity.geometry.anchor();
        Self {
            id: entity.element_id(entity_index),
            entity_index,
            source_file: entity.source_file.clone(),
            handle: entity.handle.clone(),
            discipline,
            element_class,
            element_type,
            template_id,
            provenance,
            layer: entity.layer.clone(),
            symbol: entity.symbol.clone(),
            geometry: entity.geometry.clone(),
            attributes: entity.attributes.clone(),
            position: Point3D::new(anchor.x, anchor.y, 0.0),
            storey: entity.storey.clone(),
            confidence: Confidence::Low,
            offset_source: None,
            status: ElementStatus::Classified,
        }
    }

    pub fn z(&self) -> f64 {
        self.position.z
    }

    pub fn is_unresolved(&self) -> bool {
        self.status == ElementStatus::UnresolvedClashRisk
    }

    /// Export form; the same shape the template extractor reads.
    pub fn to_record(&self) -> ElementRecord {
        ElementRecord {
            id: self.id.clone(),
            discipline: self.discipline.clone(),
            element_class: self.element_class.clone(),
            element_type: self.element_type.clone(),
            layer: Some(self.layer.clone()),
            symbol: self.symbol.clone(),
            geometry_kind: Some(self.geometry.kind()),
            geometry: Some(self.geometry.clone()),
            position: self.position,
            storey: self.storey.clone(),
            confidence: Some(self.confidence),
            offset_source: self.offset_source,
            status: Some(self.status),
            source_file: Some(self.source_file.clone()),
            handle: self.handle.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Rebuild a placed element from an exported record. Records without a
    /// footprint become points at their position; records without a status
    /// count as placed.
    pub fn from_record(record: &ElementRecord, index: usize) -> Self {
        let geometry = record.geometry.clone().unwrap_or(Geometry::Point {
            at: record.position,
        });
        Self {
            id: record.id.clone(),
            entity_index: index,
            source_file: record.source_file.clone().unwrap_or_default(),
            handle: record.handle.clone(),
            discipline: record.discipline.clone(),
            element_class: record.element_class.clone(),
            element_type: record.element_type.clone(),
            template_id: None,
            provenance: Provenance::Direct,
            layer: record.layer.clone().unwrap_or_default(),
            symbol: record.symbol.clone(),
            geometry,
            attributes: record.attributes.clone(),
            position: record.position,
            storey: record.storey.clone(),
            confidence: record.confidence.unwrap_or(Confidence::Low),
            offset_source: record.offset_source,
            status: record.status.unwrap_or(ElementStatus::Placed),
        }
    }
}

/// Linked element record in a 3D dataset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementRecord {
    pub id: String,
    pub discipline: Discipline,
    pub element_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_kind: Option<GeometryKind>,
    /// Plan footprint; absent for point-like reference data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    pub position: Point3D,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_source: Option<OffsetSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ElementStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Passed through from the source entity
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Attributes,
}

/// Previously validated 3D data used for template extraction
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferenceDataset {
    #[serde(default)]
    pub storeys: Vec<Storey>,
    pub records: Vec<ElementRecord>,
}

impl ReferenceDataset {
    pub fn storey_elevation(&self, name: &str) -> Option<f64> {
        self.storeys
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.elevation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip_shape() {
        let entity = RawEntity::new(
            "L1.dwg",
            "FP-SPRINKLER",
            Geometry::Insert {
                at: Point3D::new(2.0, 3.0, 0.0),
                rotation: 0.0,
                scale: 1.0,
            },
        )
        .with_symbol("SPK-PENDENT");

        let mut el = MatchedElement::classified(
            &entity,
            0,
            Discipline::new("fire_protection"),
            "sprinkler".into(),
            None,
            Some("fire_protection.sprinkler".into()),
            Provenance::Direct,
        );
        el.position.z = 4.41;

        let record = el.to_record();
        assert_eq!(record.id, el.id);
        assert_eq!(record.geometry_kind, Some(GeometryKind::Insert));
        assert_eq!(record.position, Point3D::new(2.0, 3.0, 4.41));

        let json = serde_json::to_string(&record).unwrap();
        let back: ElementRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        let rebuilt = MatchedElement::from_record(&back, 0);
        assert_eq!(rebuilt.id, el.id);
        assert_eq!(rebuilt.geometry, el.geometry);
        assert_eq!(rebuilt.z(), 4.41);
    }

    #[test]
    fn test_point_record_without_geometry() {
        let record = ElementRecord {
            id: "ref-1".into(),
            discipline: Discipline::new("electrical"),
            element_class: "light".into(),
            element_type: None,
            layer: None,
            symbol: None,
            geometry_kind: None,
            geometry: None,
            position: Point3D::new(1.0, 2.0, 4.3),
            storey: None,
            confidence: None,
            offset_source: None,
            status: None,
            source_file: None,
            handle: None,
            attributes: Attributes::new(),
        };
        let el = MatchedElement::from_record(&record, 3);
        assert_eq!(el.geometry.kind(), GeometryKind::Point);
        assert_eq!(el.confidence, Confidence::Low);
        assert_eq!(el.entity_index, 3);
        assert_eq!(el.status, ElementStatus::Placed);
    }

    #[test]
    fn test_record_keeps_status_and_pass_through_data() {
        let mut entity = RawEntity::new(
            "L3.dwg",
            "FP-SPRINKLER",
            Geometry::Point {
                at: Point3D::new(1.0, 1.0, 0.0),
            },
        )
        .with_handle("1A");
        entity
            .attributes
            .insert("color".to_string(), serde_json::json!(7));

        let mut el = MatchedElement::classified(
            &entity,
            0,
            Discipline::new("fire_protection"),
            UNMATCHED_CLASS.into(),
            None,
            None,
            Provenance::Inferred,
        );
        el.status = ElementStatus::UnresolvedClashRisk;

        let json = serde_json::to_value(el.to_record()).unwrap();
        assert_eq!(json["status"], "UNRESOLVED_CLASH_RISK");
        assert_eq!(json["attributes"]["color"], 7);
        assert_eq!(json["source_file"], "L3.dwg");
        assert_eq!(json["handle"], "1A");

        let record: ElementRecord = serde_json::from_value(json).unwrap();
        let back = MatchedElement::from_record(&record, 0);
        assert!(back.is_unresolved());
        assert_eq!(back.attributes, entity.attributes);
        assert_eq!(back.source_file, "L3.dwg");
        assert_eq!(back.handle.as_deref(), Some("1A"));
    }

    #[test]
    fn test_confidence_order() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }
}
