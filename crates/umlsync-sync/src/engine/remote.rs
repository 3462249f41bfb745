use tracing::{debug, warn};
use umlsync_core::{CanvasGraph, DiagramClass, DiagramLink, DurableId, IntermediateConstruct, NodeContent, Position};

use super::SyncEngine;
use crate::error::SyncError;
use crate::realtime::{ConstructParts, RealtimeEvent};
use crate::store::ModelStore;

/// What applying a remote event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    /// Duplicate, stale or for another diagram
    Ignored,
}

impl<S: ModelStore, C: CanvasGraph> SyncEngine<S, C> {
    /// Apply an event from another session to the canvas.
    ///
    /// The echo guard goes up before the canvas is touched and stays up until
    /// the next [`tick`](Self::tick). Events naming ids this session no longer
    /// (or never) had are ignored; a new link whose endpoints are unknown is
    /// `UnknownEndpoint`.
    pub fn apply_remote(&mut self, event: RealtimeEvent) -> Result<RemoteOutcome, SyncError> {
        if event.diagram_id() != &self.diagram_id {
            debug!(kind = event.kind(), diagram = %event.diagram_id(), "event for another diagram");
            return Ok(RemoteOutcome::Ignored);
        }
        // Whatever the canvas reported so far was the user's doing.
        self.stash_pending();
        self.echo_guard = true;

        let kind = event.kind();
        let outcome = match event {
            RealtimeEvent::ClassAdded { new_class, .. } => self.remote_class_added(new_class),
            RealtimeEvent::ClassUpdated { class_id, updated_class, .. } => {
                self.remote_class_updated(&class_id, &updated_class)
            }
            RealtimeEvent::ClassDeleted { class_id, .. } => Ok(self.remote_class_deleted(&class_id)),
            RealtimeEvent::ClassPositionChanged { class_id, new_position, .. } => {
                self.remote_position(&class_id, new_position)
            }
            RealtimeEvent::LinkAdded { new_link, construct, .. } => self.remote_link_added(new_link, construct),
            RealtimeEvent::LinkDeleted { link_id, .. } => Ok(self.remote_link_deleted(&link_id)),
            RealtimeEvent::LinkUpdated { link_id, updated_link, .. } => {
                self.remote_link_updated(&link_id, &updated_link)
            }
        };

        match &outcome {
            Ok(RemoteOutcome::Applied) => debug!(kind, "applied remote event"),
            Ok(RemoteOutcome::Ignored) => debug!(kind, "remote event ignored"),
            Err(e) => warn!(kind, error = %e, "remote event not applied"),
        }
        outcome
    }

    fn remote_class_added(&mut self, class: DiagramClass) -> Result<RemoteOutcome, SyncError> {
        if self.identity.contains(&class.id) || self.model.class(&class.id).is_some() {
            return Ok(RemoteOutcome::Ignored);
        }
        self.place_class(&class)?;
        Ok(RemoteOutcome::Applied)
    }

    fn remote_class_updated(&mut self, class: &DurableId, record: &DiagramClass) -> Result<RemoteOutcome, SyncError> {
        let Some(node) = self.node_of(class) else {
            return Ok(RemoteOutcome::Ignored);
        };
        self.canvas.update_node(node, NodeContent::from(record))?;
        if let Some(mirror) = self.model.class_mut(class) {
            mirror.name = record.name.clone();
            mirror.attributes = record.attributes.clone();
            mirror.methods = record.methods.clone();
        }
        Ok(RemoteOutcome::Applied)
    }

    fn remote_class_deleted(&mut self, class: &DurableId) -> RemoteOutcome {
        if let Some(association) = self.model.construct_containing(class) {
            self.remove_construct_locally(&association);
            return RemoteOutcome::Applied;
        }
        if !self.identity.contains(class) && self.model.class(class).is_none() {
            return RemoteOutcome::Ignored;
        }
        self.remove_class_locally(class);
        RemoteOutcome::Applied
    }

    fn remote_position(&mut self, class: &DurableId, position: Position) -> Result<RemoteOutcome, SyncError> {
        // A move can arrive after the delete that removed the class.
        let Some(node) = self.node_of(class) else {
            return Ok(RemoteOutcome::Ignored);
        };
        self.canvas.set_position(node, position)?;
        if let Some(mirror) = self.model.class_mut(class) {
            mirror.position = position;
        }
        Ok(RemoteOutcome::Applied)
    }

    fn remote_link_added(
        &mut self,
        link: DiagramLink,
        construct: Option<ConstructParts>,
    ) -> Result<RemoteOutcome, SyncError> {
        if self.identity.contains(&link.id) || self.model.link(&link.id).is_some() {
            return Ok(RemoteOutcome::Ignored);
        }
        match construct {
            Some(parts) => {
                let construct = IntermediateConstruct {
                    class: parts.intermediate_class,
                    direct: link,
                    dashed: parts.dashed_link,
                };
                self.place_construct(&construct)?;
            }
            None => {
                let source = self
                    .endpoint_ref(&link.source)
                    .ok_or_else(|| SyncError::UnknownEndpoint(link.source.id().clone()))?;
                let target = self
                    .endpoint_ref(&link.target)
                    .ok_or_else(|| SyncError::UnknownEndpoint(link.target.id().clone()))?;
                self.place_link(&link, source, target)?;
            }
        }
        Ok(RemoteOutcome::Applied)
    }

    fn remote_link_deleted(&mut self, link: &DurableId) -> RemoteOutcome {
        if let Some(association) = self.model.construct_containing(link) {
            self.remove_construct_locally(&association);
            return RemoteOutcome::Applied;
        }
        if !self.identity.contains(link) && self.model.link(link).is_none() {
            return RemoteOutcome::Ignored;
        }
        self.remove_link_locally(link);
        RemoteOutcome::Applied
    }

    fn remote_link_updated(&mut self, link: &DurableId, record: &DiagramLink) -> Result<RemoteOutcome, SyncError> {
        let Some(edge) = self.edge_of(link) else {
            return Ok(RemoteOutcome::Ignored);
        };
        let Some(mirror) = self.model.link_mut(link) else {
            return Ok(RemoteOutcome::Ignored);
        };
        mirror.link_type = record.link_type;
        mirror.source_multiplicity = record.source_multiplicity.clone();
        mirror.target_multiplicity = record.target_multiplicity.clone();
        let updated = mirror.clone();
        self.restyle_edge(edge, &updated)?;
        Ok(RemoteOutcome::Applied)
    }
}
