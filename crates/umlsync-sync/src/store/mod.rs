//! Model Store seam.
//!
//! The store is the source of truth for a diagram's classes and links and
//! the only place durable ids come from. [`HttpStore`] talks to the REST
//! service; [`MemoryStore`] keeps everything in process.

mod http;
mod memory;

pub use http::HttpStore;
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use tracing::{error, warn};
use umlsync_core::{
    ClassPatch, Diagram, DiagramClass, DiagramId, DiagramLink, DiagramSummary, DurableId, Endpoint,
    IntermediateConstruct, LinkPatch, LinkType, NewClass, NewLink, Position,
};

use crate::error::{StoreError, StoreResult};

#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Every diagram the store holds
    async fn list_diagrams(&self) -> StoreResult<Vec<DiagramSummary>>;

    /// Create an empty diagram
    async fn create_diagram(&self, name: &str) -> StoreResult<DiagramSummary>;

    async fn get_diagram(&self, diagram: &DiagramId) -> StoreResult<Diagram>;

    async fn create_class(&self, diagram: &DiagramId, class: NewClass) -> StoreResult<DiagramClass>;

    async fn create_link(&self, diagram: &DiagramId, link: NewLink) -> StoreResult<DiagramLink>;

    async fn update_class_position(&self, diagram: &DiagramId, class: &DurableId, position: Position)
    -> StoreResult<()>;

    async fn update_class(&self, diagram: &DiagramId, class: &DurableId, patch: &ClassPatch) -> StoreResult<()>;

    async fn update_link(&self, diagram: &DiagramId, link: &DurableId, patch: &LinkPatch) -> StoreResult<()>;

    async fn delete_class(&self, diagram: &DiagramId, class: &DurableId) -> StoreResult<()>;

    async fn delete_link(&self, diagram: &DiagramId, link: &DurableId) -> StoreResult<()>;

    /// Create the three records of an intermediate construct as one unit.
    ///
    /// Order is class, direct link, dashed link. When a later create fails
    /// the records already created are deleted again, newest first, and the
    /// original error is returned. If that cleanup fails too the result is
    /// `StoreError::Integrity` naming what was left behind.
    async fn create_construct(
        &self,
        diagram: &DiagramId,
        class: NewClass,
        direct: NewLink,
    ) -> StoreResult<IntermediateConstruct> {
        let class = self.create_class(diagram, class).await?;

        let direct = match self.create_link(diagram, direct).await {
            Ok(link) => link,
            Err(err) => {
                let leftover = compensate(self, diagram, &[], &class.id).await;
                return Err(integrity_or(err, leftover));
            }
        };

        let dashed = NewLink {
            source: Endpoint::Link(direct.id.clone()),
            target: Endpoint::Class(class.id.clone()),
            link_type: LinkType::Intermediate,
            source_multiplicity: String::new(),
            target_multiplicity: String::new(),
        };
        match self.create_link(diagram, dashed).await {
            Ok(dashed) => Ok(IntermediateConstruct { class, direct, dashed }),
            Err(err) => {
                let leftover = compensate(self, diagram, std::slice::from_ref(&direct.id), &class.id).await;
                Err(integrity_or(err, leftover))
            }
        }
    }
}

/// Undo a partial construct. Returns the ids that could not be deleted.
async fn compensate<S: ModelStore + ?Sized>(
    store: &S,
    diagram: &DiagramId,
    links: &[DurableId],
    class: &DurableId,
) -> Vec<DurableId> {
    let mut leftover = Vec::new();
    for link in links.iter().rev() {
        if let Err(e) = store.delete_link(diagram, link).await {
            error!(%link, error = %e, "rollback of construct link failed");
            leftover.push(link.clone());
        }
    }
    if let Err(e) = store.delete_class(diagram, class).await {
        error!(%class, error = %e, "rollback of intermediate class failed");
        leftover.push(class.clone());
    }
    leftover
}

fn integrity_or(err: StoreError, leftover: Vec<DurableId>) -> StoreError {
    if leftover.is_empty() {
        warn!(error = %err, "intermediate construct rolled back");
        return err;
    }
    let ids: Vec<&str> = leftover.iter().map(DurableId::as_str).collect();
    StoreError::Integrity(format!("{err}; rollback left {}", ids.join(", ")))
}
