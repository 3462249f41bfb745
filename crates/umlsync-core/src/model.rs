//! Durable diagram model: classes, links and the intermediate construct.
//!
//! `Diagram` is the per-session mirror of what the Model Store holds. It is
//! keyed by durable id and never contains canvas identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{DiagramId, DurableId, Endpoint};

/// Canvas position of a class (top-left corner)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Position) -> Position {
        Position::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn offset(self, dx: f64, dy: f64) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(200.0, 100.0)
    }
}

/// Relationship kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Association,
    Composition,
    Aggregation,
    Generalization,
    Dependency,
    Intermediate,
}

impl LinkType {
    pub const ALL: [LinkType; 6] = [
        LinkType::Association,
        LinkType::Composition,
        LinkType::Aggregation,
        LinkType::Generalization,
        LinkType::Dependency,
        LinkType::Intermediate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LinkType::Association => "association",
            LinkType::Composition => "composition",
            LinkType::Aggregation => "aggregation",
            LinkType::Generalization => "generalization",
            LinkType::Dependency => "dependency",
            LinkType::Intermediate => "intermediate",
        }
    }

    /// Whether the two ends carry multiplicities in the exchange format
    pub fn has_multiplicities(self) -> bool {
        matches!(
            self,
            LinkType::Association | LinkType::Composition | LinkType::Aggregation | LinkType::Intermediate
        )
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown link type '{0}'")]
pub struct UnknownLinkType(pub String);

impl FromStr for LinkType {
    type Err = UnknownLinkType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "associationclass" {
            return Ok(LinkType::Intermediate);
        }
        LinkType::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| UnknownLinkType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramClass {
    pub id: DurableId,
    pub name: String,
    pub attributes: Vec<String>,
    pub methods: Vec<String>,
    pub position: Position,
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramLink {
    pub id: DurableId,
    pub source: Endpoint,
    pub target: Endpoint,
    pub link_type: LinkType,
    #[serde(default)]
    pub source_multiplicity: String,
    #[serde(default)]
    pub target_multiplicity: String,
}

impl DiagramLink {
    /// The dashed half of an intermediate construct
    pub fn is_dashed(&self) -> bool {
        self.source.is_link()
    }

    pub fn touches_class(&self, class: &DurableId) -> bool {
        self.source.as_class() == Some(class) || self.target.as_class() == Some(class)
    }
}

/// Create request for a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClass {
    pub name: String,
    pub attributes: Vec<String>,
    pub methods: Vec<String>,
    pub position: Position,
    pub size: Size,
}

impl NewClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            methods: Vec::new(),
            position: Position::default(),
            size: Size::default(),
        }
    }

    /// The class a user gets from "add class"
    pub fn placeholder() -> Self {
        Self {
            name: "NewClass".to_string(),
            attributes: vec!["- attribute: Type".to_string()],
            methods: vec!["+ method(): ReturnType".to_string()],
            position: Position::new(50.0, 50.0),
            size: Size::new(150.0, 150.0),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_methods(mut self, methods: Vec<String>) -> Self {
        self.methods = methods;
        self
    }

    pub fn into_class(self, id: DurableId) -> DiagramClass {
        DiagramClass {
            id,
            name: self.name,
            attributes: self.attributes,
            methods: self.methods,
            position: self.position,
            size: self.size,
        }
    }
}

/// Create request for a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLink {
    pub source: Endpoint,
    pub target: Endpoint,
    pub link_type: LinkType,
    #[serde(default)]
    pub source_multiplicity: String,
    #[serde(default)]
    pub target_multiplicity: String,
}

impl NewLink {
    pub fn into_link(self, id: DurableId) -> DiagramLink {
        DiagramLink {
            id,
            source: self.source,
            target: self.target,
            link_type: self.link_type,
            source_multiplicity: self.source_multiplicity,
            target_multiplicity: self.target_multiplicity,
        }
    }
}

/// Field-level overwrite of a class; `None` leaves the field alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
}

impl ClassPatch {
    pub fn apply(&self, class: &mut DiagramClass) {
        if let Some(name) = &self.name {
            class.name = name.clone();
        }
        if let Some(attributes) = &self.attributes {
            class.attributes = attributes.clone();
        }
        if let Some(methods) = &self.methods {
            class.methods = methods.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_multiplicity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_multiplicity: Option<String>,
}

impl LinkPatch {
    pub fn apply(&self, link: &mut DiagramLink) {
        if let Some(link_type) = self.link_type {
            link.link_type = link_type;
        }
        if let Some(m) = &self.source_multiplicity {
            link.source_multiplicity = m.clone();
        }
        if let Some(m) = &self.target_multiplicity {
            link.target_multiplicity = m.clone();
        }
    }
}

/// Content of the intermediate class of a new construct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructSpec {
    pub name: String,
    pub attributes: Vec<String>,
    pub methods: Vec<String>,
    pub source_multiplicity: String,
    pub target_multiplicity: String,
}

impl Default for ConstructSpec {
    fn default() -> Self {
        Self {
            name: "IntermediateClass".to_string(),
            attributes: Vec::new(),
            methods: Vec::new(),
            source_multiplicity: String::new(),
            target_multiplicity: String::new(),
        }
    }
}

/// The three durable records of an association class.
///
/// `direct.id` is the association id that keys the construct everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateConstruct {
    pub class: DiagramClass,
    pub direct: DiagramLink,
    pub dashed: DiagramLink,
}

impl IntermediateConstruct {
    pub fn association_id(&self) -> &DurableId {
        &self.direct.id
    }
}

/// Borrowed view of a construct found in a `Diagram`
#[derive(Debug, Clone, Copy)]
pub struct ConstructView<'a> {
    pub class: &'a DiagramClass,
    pub direct: &'a DiagramLink,
    pub dashed: &'a DiagramLink,
}

impl ConstructView<'_> {
    pub fn to_owned(&self) -> IntermediateConstruct {
        IntermediateConstruct {
            class: self.class.clone(),
            direct: self.direct.clone(),
            dashed: self.dashed.clone(),
        }
    }
}

/// A diagram as returned by `getDiagram`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diagram {
    pub id: Option<DiagramId>,
    pub classes: Vec<DiagramClass>,
    pub links: Vec<DiagramLink>,
}

/// One entry of the diagram list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSummary {
    pub id: DiagramId,
    pub name: String,
}

impl Diagram {
    pub fn new(id: DiagramId) -> Self {
        Self { id: Some(id), classes: Vec::new(), links: Vec::new() }
    }

    pub fn class(&self, id: &DurableId) -> Option<&DiagramClass> {
        self.classes.iter().find(|c| &c.id == id)
    }

    pub fn class_mut(&mut self, id: &DurableId) -> Option<&mut DiagramClass> {
        self.classes.iter_mut().find(|c| &c.id == id)
    }

    pub fn link(&self, id: &DurableId) -> Option<&DiagramLink> {
        self.links.iter().find(|l| &l.id == id)
    }

    pub fn link_mut(&mut self, id: &DurableId) -> Option<&mut DiagramLink> {
        self.links.iter_mut().find(|l| &l.id == id)
    }

    /// Insert or overwrite a class (last writer wins)
    pub fn upsert_class(&mut self, class: DiagramClass) {
        match self.class_mut(&class.id) {
            Some(existing) => *existing = class,
            None => self.classes.push(class),
        }
    }

    pub fn upsert_link(&mut self, link: DiagramLink) {
        match self.link_mut(&link.id) {
            Some(existing) => *existing = link,
            None => self.links.push(link),
        }
    }

    pub fn remove_class(&mut self, id: &DurableId) -> Option<DiagramClass> {
        let idx = self.classes.iter().position(|c| &c.id == id)?;
        Some(self.classes.remove(idx))
    }

    pub fn remove_link(&mut self, id: &DurableId) -> Option<DiagramLink> {
        let idx = self.links.iter().position(|l| &l.id == id)?;
        Some(self.links.remove(idx))
    }

    /// Links whose class endpoints include `class`
    pub fn links_touching<'a>(&'a self, class: &'a DurableId) -> impl Iterator<Item = &'a DiagramLink> + 'a {
        self.links.iter().filter(move |l| l.touches_class(class))
    }

    /// Resolve the construct whose direct link is `association`
    pub fn construct_of(&self, association: &DurableId) -> Option<ConstructView<'_>> {
        let direct = self.link(association)?;
        let dashed = self
            .links
            .iter()
            .find(|l| matches!(&l.source, Endpoint::Link(id) if id == association))?;
        let class = self.class(dashed.target.as_class()?)?;
        Some(ConstructView { class, direct, dashed })
    }

    /// Association id of the construct `member` belongs to, if any.
    ///
    /// `member` may be the direct link, the dashed link or the intermediate class.
    pub fn construct_containing(&self, member: &DurableId) -> Option<DurableId> {
        self.constructs()
            .find(|c| &c.direct.id == member || &c.dashed.id == member || &c.class.id == member)
            .map(|c| c.direct.id.clone())
    }

    /// Every complete construct in link order
    pub fn constructs(&self) -> impl Iterator<Item = ConstructView<'_>> + '_ {
        self.links.iter().filter(|l| l.is_dashed()).filter_map(|dashed| {
            let direct = self.link(dashed.source.id())?;
            let class = self.class(dashed.target.as_class()?)?;
            Some(ConstructView { class, direct, dashed })
        })
    }

    /// Classes that exist only as the intermediate class of a construct
    pub fn is_intermediate_class(&self, class: &DurableId) -> bool {
        self.links
            .iter()
            .any(|l| l.is_dashed() && l.target.as_class() == Some(class))
    }

    pub fn insert_construct(&mut self, construct: IntermediateConstruct) {
        self.upsert_class(construct.class);
        self.upsert_link(construct.direct);
        self.upsert_link(construct.dashed);
    }
}
