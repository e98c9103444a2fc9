// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw drawing entities delivered by the ingestion step

use crate::geometry::{Geometry, GeometryKind};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Opaque extra attributes, passed through untouched
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// One CAD primitive as parsed from a drawing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEntity {
    /// CAD handle, when the source format provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Identifier of the drawing this entity came from
    pub source_file: String,
    /// Owning layer name
    pub layer: String,
    /// Referenced block / symbol name (insertions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Explicit storey metadata, if the drawing carries it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storey: Option<String>,
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Attributes,
}

impl RawEntity {
    pub fn new(source_file: &str, layer: &str, geometry: Geometry) -> Self {
        Self {
            handle: None,
            source_file: source_file.to_string(),
            layer: layer.to_string(),
            symbol: None,
            storey: None,
            geometry,
            attributes: Attributes::new(),
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_handle(mut self, handle: &str) -> Self {
        self.handle = Some(handle.to_string());
        self
    }

    pub fn with_storey(mut self, storey: &str) -> Self {
        self.storey = Some(storey.to_string());
        self
    }

    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }

    /// Stable element identifier.
    ///
    /// Derived from the source file and the CAD handle, or the entity's
    /// ordinal in the input when there is no handle, so it never depends on
    /// wall-clock state or on how other entities are processed.
    pub fn element_id(&self, ordinal: usize) -> String {
        let key = match &self.handle {
            Some(handle) => format!("{}\u{1f}h:{}", self.source_file, handle),
            None => format!("{}\u{1f}n:{}", self.source_file, ordinal),
        };
        format!("el-{:016x}", xxh3_64(key.as_bytes()))
    }

    /// Hash of what the entity is and where it sits, ignoring its handle.
    pub fn content_hash(&self) -> u64 {
        let anchor = self.geometry.anchor();
        let key = format!(
            "{}\u{1f}{}\u{1f}{:?}\u{1f}{:016x}\u{1f}{:016x}",
            self.layer,
            self.symbol.as_deref().unwrap_or(""),
            self.kind(),
            anchor.x.to_bits(),
            anchor.y.to_bits()
        );
        xxh3_64(key.as_bytes())
    }
}

/// Ingested drawing file. Both `{"entities": [...]}` and a bare array are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Drawing {
    Wrapped { entities: Vec<RawEntity> },
    Bare(Vec<RawEntity>),
}

impl Drawing {
    pub fn into_entities(self) -> Vec<RawEntity> {
        match self {
            Drawing::Wrapped { entities } | Drawing::Bare(entities) => entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3D;

    fn point(x: f64, y: f64) -> Geometry {
        Geometry::Point {
            at: Point3D::new(x, y, 0.0),
        }
    }

    #[test]
    fn test_element_id_is_stable() {
        let e = RawEntity::new("L01.dwg", "FP-SPRINKLER", point(0.0, 0.0));
        assert_eq!(e.element_id(3), e.element_id(3));
        assert_ne!(e.element_id(3), e.element_id(4));

        // A handle makes the id independent of the ordinal
        let h = e.clone().with_handle("2F1A");
        assert_eq!(h.element_id(3), h.element_id(99));
        assert!(h.element_id(0).starts_with("el-"));
    }

    #[test]
    fn test_content_hash_ignores_handle() {
        let a = RawEntity::new("L01.dwg", "FP-SPRINKLER", point(1.0, 2.0)).with_handle("1A");
        let b = a.clone().with_handle("1B");
        assert_eq!(a.content_hash(), b.content_hash());

        let moved = RawEntity::new("L01.dwg", "FP-SPRINKLER", point(1.0, 2.5)).with_handle("1A");
        assert_ne!(a.content_hash(), moved.content_hash());
        assert_ne!(
            a.content_hash(),
            RawEntity::new("L01.dwg", "PLUMB-PIPE", point(1.0, 2.0)).content_hash()
        );
    }

    #[test]
    fn test_drawing_formats() {
        let wrapped = r#"{"entities":[{"source_file":"a","layer":"E-LIGHT","geometry":{"kind":"point","at":{"x":1,"y":2}}}]}"#;
        let bare = r#"[{"source_file":"a","layer":"E-LIGHT","geometry":{"kind":"point","at":{"x":1,"y":2}},"attributes":{"color":7}}]"#;

        let a: Drawing = serde_json::from_str(wrapped).unwrap();
        let b: Drawing = serde_json::from_str(bare).unwrap();
        assert_eq!(a.into_entities().len(), 1);
        let entities = b.into_entities();
        assert_eq!(entities[0].attributes["color"], serde_json::json!(7));
    }
}
