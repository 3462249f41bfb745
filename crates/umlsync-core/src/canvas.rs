//! Canvas Graph: the transient diagramming surface.
//!
//! The trait is what the sync engine drives. `MemoryCanvas` is the
//! in-process surface used by sessions and tests; it queues the same
//! property-change events a graphical toolkit would emit.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::ids::{CanvasId, CanvasRef};
use crate::links::{CanvasEdge, EdgeLabels, EdgeStyle};
use crate::model::{DiagramClass, Position, Size};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    #[error("edge endpoint {0} is not on the canvas")]
    MissingEndpoint(CanvasId),
    #[error("no canvas element {0}")]
    NotFound(CanvasId),
    #[error("canvas element {0} is not a {1}")]
    WrongKind(CanvasId, &'static str),
}

/// Text content of a class node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeContent {
    pub name: String,
    pub attributes: Vec<String>,
    pub methods: Vec<String>,
}

impl From<&DiagramClass> for NodeContent {
    fn from(class: &DiagramClass) -> Self {
        Self {
            name: class.name.clone(),
            attributes: class.attributes.clone(),
            methods: class.methods.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub content: NodeContent,
    pub position: Position,
    pub size: Size,
}

impl From<&DiagramClass> for CanvasNode {
    fn from(class: &DiagramClass) -> Self {
        Self {
            content: NodeContent::from(class),
            position: class.position,
            size: class.size,
        }
    }
}

/// Property-change and gesture notifications
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    Added(CanvasId),
    Removed(CanvasId),
    PositionChanged { id: CanvasId, position: Position },
    ContentChanged(CanvasId),
    /// End of a drag gesture
    PointerUp,
}

/// Operations the sync engine needs from a diagramming surface
pub trait CanvasGraph {
    fn add_node(&mut self, node: CanvasNode) -> CanvasId;

    /// Fails with `MissingEndpoint` unless both endpoints exist
    fn add_edge(&mut self, edge: CanvasEdge) -> Result<CanvasId, CanvasError>;

    /// Remove an element and everything attached to it. Returns every id
    /// that left the canvas, `id` first. Unknown ids remove nothing.
    fn remove(&mut self, id: CanvasId) -> Vec<CanvasId>;

    fn contains(&self, id: CanvasId) -> bool;

    fn position(&self, id: CanvasId) -> Option<Position>;

    /// Move a node. Emits `PositionChanged` only when the value changes.
    fn set_position(&mut self, id: CanvasId, position: Position) -> Result<(), CanvasError>;

    fn size(&self, id: CanvasId) -> Option<Size>;

    fn set_size(&mut self, id: CanvasId, size: Size) -> Result<(), CanvasError>;

    fn node(&self, id: CanvasId) -> Option<&CanvasNode>;

    fn update_node(&mut self, id: CanvasId, content: NodeContent) -> Result<(), CanvasError>;

    fn edge(&self, id: CanvasId) -> Option<&CanvasEdge>;

    fn set_edge_labels(&mut self, id: CanvasId, labels: EdgeLabels) -> Result<(), CanvasError>;

    fn set_edge_style(&mut self, id: CanvasId, style: EdgeStyle) -> Result<(), CanvasError>;

    /// Every element id in insertion order
    fn ids(&self) -> Vec<CanvasId>;

    fn clear(&mut self);

    /// Plain object tree of the whole graph
    fn to_json(&self) -> serde_json::Value;

    /// Drain queued events in emission order
    fn take_events(&mut self) -> Vec<CanvasEvent>;
}

#[derive(Debug, Clone, PartialEq)]
enum Element {
    Node(CanvasNode),
    Edge(CanvasEdge),
}

/// In-memory canvas
#[derive(Debug, Default)]
pub struct MemoryCanvas {
    /// Elements in insertion order
    elements: Vec<(CanvasId, Element)>,
    /// Fast lookup by ID
    by_id: HashMap<CanvasId, usize>,
    events: Vec<CanvasEvent>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.elements.iter().filter(|(_, e)| matches!(e, Element::Node(_))).count()
    }

    pub fn edge_count(&self) -> usize {
        self.elements.iter().filter(|(_, e)| matches!(e, Element::Edge(_))).count()
    }

    /// Simulate a user dragging a node to `position`
    pub fn drag(&mut self, id: CanvasId, position: Position) -> Result<(), CanvasError> {
        self.set_position(id, position)
    }

    /// Simulate the user releasing the pointer
    pub fn pointer_up(&mut self) {
        self.events.push(CanvasEvent::PointerUp);
    }

    fn get(&self, id: CanvasId) -> Option<&Element> {
        self.by_id.get(&id).map(|&idx| &self.elements[idx].1)
    }

    fn get_mut(&mut self, id: CanvasId) -> Option<&mut Element> {
        let idx = *self.by_id.get(&id)?;
        Some(&mut self.elements[idx].1)
    }

    fn node_mut(&mut self, id: CanvasId) -> Result<&mut CanvasNode, CanvasError> {
        match self.get_mut(id) {
            Some(Element::Node(node)) => Ok(node),
            Some(Element::Edge(_)) => Err(CanvasError::WrongKind(id, "node")),
            None => Err(CanvasError::NotFound(id)),
        }
    }

    fn edge_mut(&mut self, id: CanvasId) -> Result<&mut CanvasEdge, CanvasError> {
        match self.get_mut(id) {
            Some(Element::Edge(edge)) => Ok(edge),
            Some(Element::Node(_)) => Err(CanvasError::WrongKind(id, "edge")),
            None => Err(CanvasError::NotFound(id)),
        }
    }

    fn push(&mut self, element: Element) -> CanvasId {
        let id = CanvasId::new();
        self.by_id.insert(id, self.elements.len());
        self.elements.push((id, element));
        self.events.push(CanvasEvent::Added(id));
        id
    }

    fn reindex(&mut self) {
        self.by_id = self
            .elements
            .iter()
            .enumerate()
            .map(|(idx, (id, _))| (*id, idx))
            .collect();
    }
}

impl CanvasGraph for MemoryCanvas {
    fn add_node(&mut self, node: CanvasNode) -> CanvasId {
        self.push(Element::Node(node))
    }

    fn add_edge(&mut self, edge: CanvasEdge) -> Result<CanvasId, CanvasError> {
        for end in [edge.source, edge.target] {
            let present = match (end, self.get(end.id())) {
                (CanvasRef::Node(_), Some(Element::Node(_))) => true,
                (CanvasRef::Edge(_), Some(Element::Edge(_))) => true,
                _ => false,
            };
            if !present {
                return Err(CanvasError::MissingEndpoint(end.id()));
            }
        }
        Ok(self.push(Element::Edge(edge)))
    }

    fn remove(&mut self, id: CanvasId) -> Vec<CanvasId> {
        if !self.by_id.contains_key(&id) {
            return Vec::new();
        }

        // Collect the element plus everything transitively attached to it
        let mut doomed = vec![id];
        let mut seen: HashSet<CanvasId> = HashSet::from([id]);
        let mut cursor = 0;
        while cursor < doomed.len() {
            let current = doomed[cursor];
            cursor += 1;
            for (edge_id, element) in &self.elements {
                if let Element::Edge(edge) = element {
                    if edge.touches(current) && seen.insert(*edge_id) {
                        doomed.push(*edge_id);
                    }
                }
            }
        }

        self.elements.retain(|(eid, _)| !seen.contains(eid));
        self.reindex();
        self.events.extend(doomed.iter().map(|&d| CanvasEvent::Removed(d)));
        doomed
    }

    fn contains(&self, id: CanvasId) -> bool {
        self.by_id.contains_key(&id)
    }

    fn position(&self, id: CanvasId) -> Option<Position> {
        match self.get(id)? {
            Element::Node(node) => Some(node.position),
            Element::Edge(_) => None,
        }
    }

    fn set_position(&mut self, id: CanvasId, position: Position) -> Result<(), CanvasError> {
        let node = self.node_mut(id)?;
        if node.position == position {
            return Ok(());
        }
        node.position = position;
        self.events.push(CanvasEvent::PositionChanged { id, position });
        Ok(())
    }

    fn size(&self, id: CanvasId) -> Option<Size> {
        match self.get(id)? {
            Element::Node(node) => Some(node.size),
            Element::Edge(_) => None,
        }
    }

    fn set_size(&mut self, id: CanvasId, size: Size) -> Result<(), CanvasError> {
        self.node_mut(id)?.size = size;
        Ok(())
    }

    fn node(&self, id: CanvasId) -> Option<&CanvasNode> {
        match self.get(id)? {
            Element::Node(node) => Some(node),
            Element::Edge(_) => None,
        }
    }

    fn update_node(&mut self, id: CanvasId, content: NodeContent) -> Result<(), CanvasError> {
        let node = self.node_mut(id)?;
        if node.content != content {
            node.content = content;
            self.events.push(CanvasEvent::ContentChanged(id));
        }
        Ok(())
    }

    fn edge(&self, id: CanvasId) -> Option<&CanvasEdge> {
        match self.get(id)? {
            Element::Edge(edge) => Some(edge),
            Element::Node(_) => None,
        }
    }

    fn set_edge_labels(&mut self, id: CanvasId, labels: EdgeLabels) -> Result<(), CanvasError> {
        let edge = self.edge_mut(id)?;
        if edge.labels != labels {
            edge.labels = labels;
            self.events.push(CanvasEvent::ContentChanged(id));
        }
        Ok(())
    }

    fn set_edge_style(&mut self, id: CanvasId, style: EdgeStyle) -> Result<(), CanvasError> {
        self.edge_mut(id)?.style = style;
        Ok(())
    }

    fn ids(&self) -> Vec<CanvasId> {
        self.elements.iter().map(|(id, _)| *id).collect()
    }

    fn clear(&mut self) {
        let removed: Vec<_> = self.ids();
        self.elements.clear();
        self.by_id.clear();
        self.events.extend(removed.into_iter().map(CanvasEvent::Removed));
    }

    fn to_json(&self) -> serde_json::Value {
        let cells: Vec<_> = self
            .elements
            .iter()
            .map(|(id, element)| match element {
                Element::Node(node) => json!({
                    "type": "uml.Class",
                    "id": id.to_string(),
                    "name": node.content.name,
                    "attributes": node.content.attributes,
                    "methods": node.content.methods,
                    "position": node.position,
                    "size": node.size,
                }),
                Element::Edge(edge) => json!({
                    "type": "link",
                    "id": id.to_string(),
                    "source": { "id": edge.source.id().to_string() },
                    "target": { "id": edge.target.id().to_string() },
                    "style": edge.style,
                    "labels": edge.labels.as_array(),
                }),
            })
            .collect();
        json!({ "cells": cells })
    }

    fn take_events(&mut self) -> Vec<CanvasEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinkType;

    fn node(name: &str) -> CanvasNode {
        CanvasNode {
            content: NodeContent { name: name.into(), ..Default::default() },
            position: Position::default(),
            size: Size::default(),
        }
    }

    fn edge(source: CanvasRef, target: CanvasRef) -> CanvasEdge {
        CanvasEdge {
            source,
            target,
            style: EdgeStyle::for_type(LinkType::Association),
            labels: EdgeLabels::default(),
        }
    }

    #[test]
    fn edge_needs_both_endpoints() {
        let mut canvas = MemoryCanvas::new();
        let a = canvas.add_node(node("A"));
        let ghost = CanvasId::new();
        assert_eq!(
            canvas.add_edge(edge(CanvasRef::Node(a), CanvasRef::Node(ghost))),
            Err(CanvasError::MissingEndpoint(ghost))
        );
        // A node id is not a valid edge endpoint reference
        assert_eq!(
            canvas.add_edge(edge(CanvasRef::Edge(a), CanvasRef::Node(a))),
            Err(CanvasError::MissingEndpoint(a))
        );
        assert_eq!(canvas.edge_count(), 0);
    }

    #[test]
    fn removing_node_cascades_through_edges_on_edges() {
        let mut canvas = MemoryCanvas::new();
        let a = canvas.add_node(node("A"));
        let b = canvas.add_node(node("B"));
        let i = canvas.add_node(node("I"));
        let direct = canvas.add_edge(edge(CanvasRef::Node(a), CanvasRef::Node(b))).unwrap();
        let dashed = canvas.add_edge(edge(CanvasRef::Edge(direct), CanvasRef::Node(i))).unwrap();

        let removed = canvas.remove(a);
        assert_eq!(removed, vec![a, direct, dashed]);
        assert!(canvas.contains(b));
        assert!(canvas.contains(i));
        assert_eq!(canvas.edge_count(), 0);
        assert_eq!(canvas.position(b), Some(Position::default()));
    }

    #[test]
    fn set_position_emits_only_on_change() {
        let mut canvas = MemoryCanvas::new();
        let a = canvas.add_node(node("A"));
        canvas.take_events();

        canvas.set_position(a, Position::default()).unwrap();
        assert!(canvas.take_events().is_empty());

        canvas.set_position(a, Position::new(10.0, 20.0)).unwrap();
        assert_eq!(
            canvas.take_events(),
            vec![CanvasEvent::PositionChanged { id: a, position: Position::new(10.0, 20.0) }]
        );
    }

    #[test]
    fn to_json_lists_cells() {
        let mut canvas = MemoryCanvas::new();
        let a = canvas.add_node(node("A"));
        let b = canvas.add_node(node("B"));
        canvas.add_edge(edge(CanvasRef::Node(a), CanvasRef::Node(b))).unwrap();

        let json = canvas.to_json();
        let cells = json["cells"].as_array().unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0]["name"], "A");
        assert_eq!(cells[2]["source"]["id"], a.to_string());
    }

    #[test]
    fn wrong_kind_is_reported() {
        let mut canvas = MemoryCanvas::new();
        let a = canvas.add_node(node("A"));
        assert_eq!(
            canvas.set_edge_labels(a, EdgeLabels::default()),
            Err(CanvasError::WrongKind(a, "edge"))
        );
    }
}
