//! Relationship construction primitives: edge styling, labels and the
//! placement of an intermediate class.

use serde::{Deserialize, Serialize};

use crate::ids::CanvasRef;
use crate::model::{DiagramLink, LinkType, Position};

/// Label shown for a multiplicity the store never recorded
pub const DEFAULT_MULTIPLICITY_LABEL: &str = "1..1";

/// Vertical offset of a new intermediate class below the midpoint
pub const INTERMEDIATE_OFFSET_Y: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stroke {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Marker {
    None,
    OpenArrow,
    HollowTriangle,
    HollowDiamond,
    FilledDiamond,
}

/// How an edge is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub stroke: Stroke,
    pub source_marker: Marker,
    pub target_marker: Marker,
}

impl EdgeStyle {
    const PLAIN: EdgeStyle = EdgeStyle {
        stroke: Stroke::Solid,
        source_marker: Marker::None,
        target_marker: Marker::None,
    };

    /// Style of a class-to-class link of the given type
    pub fn for_type(link_type: LinkType) -> Self {
        match link_type {
            LinkType::Association | LinkType::Intermediate => Self::PLAIN,
            LinkType::Composition => EdgeStyle { source_marker: Marker::FilledDiamond, ..Self::PLAIN },
            LinkType::Aggregation => EdgeStyle { source_marker: Marker::HollowDiamond, ..Self::PLAIN },
            LinkType::Generalization => EdgeStyle { target_marker: Marker::HollowTriangle, ..Self::PLAIN },
            LinkType::Dependency => EdgeStyle {
                stroke: Stroke::Dashed,
                target_marker: Marker::OpenArrow,
                ..Self::PLAIN
            },
        }
    }

    /// The dashed link from an association to its intermediate class
    pub fn construct_dashed() -> Self {
        EdgeStyle { stroke: Stroke::Dashed, ..Self::PLAIN }
    }

    pub fn for_link(link: &DiagramLink) -> Self {
        if link.is_dashed() {
            Self::construct_dashed()
        } else {
            Self::for_type(link.link_type)
        }
    }
}

/// The three labels of an edge: type, source and target multiplicity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeLabels {
    pub link_type: String,
    pub source_multiplicity: String,
    pub target_multiplicity: String,
}

impl EdgeLabels {
    /// Labels exactly as recorded on the link
    pub fn for_link(link: &DiagramLink) -> Self {
        Self {
            link_type: link.link_type.to_string(),
            source_multiplicity: link.source_multiplicity.clone(),
            target_multiplicity: link.target_multiplicity.clone(),
        }
    }

    /// Labels for a link read back from the store: unrecorded multiplicities
    /// on multiplicity-bearing links show as `1..1`.
    pub fn loaded(link: &DiagramLink) -> Self {
        let mut labels = Self::for_link(link);
        if link.link_type.has_multiplicities() && !link.is_dashed() {
            for label in [&mut labels.source_multiplicity, &mut labels.target_multiplicity] {
                if label.trim().is_empty() {
                    *label = DEFAULT_MULTIPLICITY_LABEL.to_string();
                }
            }
        }
        labels
    }

    pub fn as_array(&self) -> [&str; 3] {
        [&self.link_type, &self.source_multiplicity, &self.target_multiplicity]
    }
}

/// An edge as the canvas holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasEdge {
    pub source: CanvasRef,
    pub target: CanvasRef,
    pub style: EdgeStyle,
    pub labels: EdgeLabels,
}

impl CanvasEdge {
    pub fn for_link(link: &DiagramLink, source: CanvasRef, target: CanvasRef) -> Self {
        Self {
            source,
            target,
            style: EdgeStyle::for_link(link),
            labels: EdgeLabels::for_link(link),
        }
    }

    pub fn touches(&self, id: crate::ids::CanvasId) -> bool {
        self.source.id() == id || self.target.id() == id
    }
}

/// Where a new intermediate class goes: between the two classes, lowered
pub fn intermediate_placement(source: Position, target: Position) -> Position {
    source.midpoint(target).offset(0.0, INTERMEDIATE_OFFSET_Y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{DurableId, Endpoint};

    fn link(link_type: LinkType, source: Endpoint) -> DiagramLink {
        DiagramLink {
            id: DurableId::from("l"),
            source,
            target: Endpoint::Class("b".into()),
            link_type,
            source_multiplicity: String::new(),
            target_multiplicity: "0..*".into(),
        }
    }

    #[test]
    fn whole_end_gets_the_diamond() {
        assert_eq!(EdgeStyle::for_type(LinkType::Composition).source_marker, Marker::FilledDiamond);
        assert_eq!(EdgeStyle::for_type(LinkType::Aggregation).source_marker, Marker::HollowDiamond);
        assert_eq!(EdgeStyle::for_type(LinkType::Composition).target_marker, Marker::None);
    }

    #[test]
    fn dependency_is_dashed_arrow() {
        let style = EdgeStyle::for_type(LinkType::Dependency);
        assert_eq!(style.stroke, Stroke::Dashed);
        assert_eq!(style.target_marker, Marker::OpenArrow);
    }

    #[test]
    fn dashed_construct_link_has_no_markers() {
        let dashed = link(LinkType::Intermediate, Endpoint::Link("direct".into()));
        assert_eq!(EdgeStyle::for_link(&dashed), EdgeStyle::construct_dashed());
        let direct = link(LinkType::Intermediate, Endpoint::Class("a".into()));
        assert_eq!(EdgeStyle::for_link(&direct).stroke, Stroke::Solid);
    }

    #[test]
    fn loaded_labels_default_missing_multiplicity() {
        let labels = EdgeLabels::loaded(&link(LinkType::Association, Endpoint::Class("a".into())));
        assert_eq!(labels.as_array(), ["association", "1..1", "0..*"]);

        let labels = EdgeLabels::loaded(&link(LinkType::Generalization, Endpoint::Class("a".into())));
        assert_eq!(labels.source_multiplicity, "");
    }

    #[test]
    fn intermediate_class_sits_below_midpoint() {
        let p = intermediate_placement(Position::new(0.0, 0.0), Position::new(200.0, 100.0));
        assert_eq!(p, Position::new(100.0, 150.0));
    }
}
