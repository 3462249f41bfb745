//! Import plan: what a decoded exchange document asks the engine to create.
//!
//! Endpoints are document ids. They become durable ids only once the
//! classes they name have been created.

use thiserror::Error;
use umlsync_core::{LinkType, MultiplicityError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedClass {
    /// `xmi:id` (or `xmi.id`) in the source document
    pub document_id: String,
    pub name: String,
    pub attributes: Vec<String>,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLink {
    pub document_id: Option<String>,
    pub source: String,
    pub target: String,
    pub link_type: LinkType,
    pub source_multiplicity: String,
    pub target_multiplicity: String,
}

impl PlannedLink {
    pub fn new(source: impl Into<String>, target: impl Into<String>, link_type: LinkType) -> Self {
        Self {
            document_id: None,
            source: source.into(),
            target: target.into(),
            link_type,
            source_multiplicity: String::new(),
            target_multiplicity: String::new(),
        }
    }

    pub fn label(&self) -> String {
        match &self.document_id {
            Some(id) => format!("{} {id}", self.link_type),
            None => format!("{} {} -> {}", self.link_type, self.source, self.target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedRelationship {
    Link(PlannedLink),
    /// Association class: the direct link plus its intermediate class
    Construct { link: PlannedLink, class: PlannedClass },
}

impl PlannedRelationship {
    pub fn link(&self) -> &PlannedLink {
        match self {
            PlannedRelationship::Link(link) | PlannedRelationship::Construct { link, .. } => link,
        }
    }

    pub fn link_mut(&mut self) -> &mut PlannedLink {
        match self {
            PlannedRelationship::Link(link) | PlannedRelationship::Construct { link, .. } => link,
        }
    }
}

/// A per-element problem; the element is skipped and decoding continues
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportIssue {
    #[error("{element}: missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: &'static str },
    #[error("{element}: duplicate id '{id}'")]
    DuplicateId { element: String, id: String },
    #[error("{element}: endpoint '{id}' is not a class of this document")]
    UnknownEndpoint { element: String, id: String },
    #[error("{element}: association needs two ends, found {found}")]
    MissingEnds { element: String, found: usize },
    #[error("{element}: bad multiplicity: {source}")]
    Multiplicity {
        element: String,
        #[source]
        source: MultiplicityError,
    },
}

/// Result of decoding: classes first, relationships second
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    pub classes: Vec<PlannedClass>,
    pub relationships: Vec<PlannedRelationship>,
    pub issues: Vec<ImportIssue>,
}

impl ImportPlan {
    pub fn class(&self, document_id: &str) -> Option<&PlannedClass> {
        self.classes.iter().find(|c| c.document_id == document_id)
    }

    pub fn class_named(&self, name: &str) -> Option<&PlannedClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn links(&self) -> impl Iterator<Item = &PlannedLink> {
        self.relationships.iter().map(PlannedRelationship::link)
    }

    pub fn constructs(&self) -> impl Iterator<Item = (&PlannedLink, &PlannedClass)> {
        self.relationships.iter().filter_map(|r| match r {
            PlannedRelationship::Construct { link, class } => Some((link, class)),
            PlannedRelationship::Link(_) => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
