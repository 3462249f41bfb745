//! Identifier types for the two identity spaces.
//!
//! Durable ids come from the persistence service and survive reloads.
//! Canvas ids are minted by the diagramming surface and die with it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a diagram (one shared document, one real-time room)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagramId(pub String);

impl DiagramId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh id for a diagram created outside the persistence service
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DiagramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the Model Store to a class or link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurableId(pub String);

impl DurableId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint a fresh id (used by in-process stores)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DurableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DurableId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Canvas element identifier - UUID, valid only for one canvas instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasId(pub Uuid);

impl CanvasId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CanvasId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CanvasId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a relationship endpoint refers to in the durable space.
///
/// Only the dashed link of an intermediate construct uses `Link`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Endpoint {
    Class(DurableId),
    Link(DurableId),
}

impl Endpoint {
    pub fn id(&self) -> &DurableId {
        match self {
            Endpoint::Class(id) | Endpoint::Link(id) => id,
        }
    }

    pub fn as_class(&self) -> Option<&DurableId> {
        match self {
            Endpoint::Class(id) => Some(id),
            Endpoint::Link(_) => None,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Endpoint::Link(_))
    }
}

/// What an edge endpoint refers to on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanvasRef {
    Node(CanvasId),
    Edge(CanvasId),
}

impl CanvasRef {
    pub fn id(self) -> CanvasId {
        match self {
            CanvasRef::Node(id) | CanvasRef::Edge(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Endpoint::Link(DurableId::from("l1"))).unwrap();
        assert_eq!(json, r#"{"link":"l1"}"#);
        let back: Endpoint = serde_json::from_str(r#"{"class":"c9"}"#).unwrap();
        assert_eq!(back, Endpoint::Class(DurableId::from("c9")));
    }

    #[test]
    fn generated_durable_ids_are_unique() {
        assert_ne!(DurableId::generate(), DurableId::generate());
    }
}
