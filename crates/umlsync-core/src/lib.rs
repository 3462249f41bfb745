//! Core types for collaborative UML class diagrams.
//!
//! - [`ids`]: durable and canvas identifiers
//! - [`model`]: classes, links and the intermediate (association-class) construct
//! - [`multiplicity`]: multiplicity grammar and member descriptors
//! - [`identity`]: the bidirectional Identity Map
//! - [`canvas`]: the Canvas Graph trait and an in-memory surface
//! - [`links`]: edge styling and relationship construction helpers

pub mod canvas;
pub mod identity;
pub mod ids;
pub mod links;
pub mod model;
pub mod multiplicity;

pub use canvas::{CanvasError, CanvasEvent, CanvasGraph, CanvasNode, MemoryCanvas, NodeContent};
pub use identity::{Binding, ConstructIds, IdentityError, IdentityMap};
pub use ids::{CanvasId, CanvasRef, DiagramId, DurableId, Endpoint};
pub use links::{CanvasEdge, EdgeLabels, EdgeStyle, Marker, Stroke};
pub use model::{
    ClassPatch, ConstructSpec, ConstructView, Diagram, DiagramClass, DiagramLink, DiagramSummary, IntermediateConstruct,
    LinkPatch, LinkType, NewClass, NewLink, Position, Size,
};
pub use multiplicity::{Descriptor, Multiplicity, MultiplicityError, Upper};
