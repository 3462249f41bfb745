use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use umlsync_core::{
    ClassPatch, Diagram, DiagramClass, DiagramId, DiagramLink, DiagramSummary, DurableId, Endpoint, LinkPatch,
    NewClass, NewLink, Position,
};

use super::ModelStore;
use crate::error::{StoreError, StoreResult};

/// Store operation, for call counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListDiagrams,
    CreateDiagram,
    GetDiagram,
    CreateClass,
    CreateLink,
    UpdateClassPosition,
    UpdateClass,
    UpdateLink,
    DeleteClass,
    DeleteLink,
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    at_call: usize,
    error: StoreError,
}

#[derive(Debug, Default)]
struct Inner {
    diagrams: HashMap<DiagramId, Diagram>,
    names: HashMap<DiagramId, String>,
    calls: HashMap<StoreOp, usize>,
    faults: Vec<Fault>,
}

impl Inner {
    /// Count the call and fire a pending fault for it
    fn call(&mut self, op: StoreOp) -> StoreResult<()> {
        let count = self.calls.entry(op).or_default();
        *count += 1;
        let count = *count;
        match self.faults.iter().position(|f| f.op == op && f.at_call == count) {
            Some(idx) => {
                let fault = self.faults.remove(idx);
                debug!(?op, count, "injected store fault");
                Err(fault.error)
            }
            None => Ok(()),
        }
    }

    fn diagram(&mut self, id: &DiagramId) -> StoreResult<&mut Diagram> {
        self.diagrams.get_mut(id).ok_or_else(|| StoreError::Validation {
            status: 404,
            message: format!("diagram {id} not found"),
        })
    }
}

/// In-process Model Store shared by every session that holds a clone
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds one empty diagram
    pub fn with_diagram(id: &DiagramId) -> Self {
        let store = Self::new();
        store.insert_diagram(Diagram::new(id.clone()));
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a diagram; it is listed under its id until named
    pub fn insert_diagram(&self, diagram: Diagram) {
        let Some(id) = diagram.id.clone() else {
            return;
        };
        let mut inner = self.lock();
        inner.names.entry(id.clone()).or_insert_with(|| id.to_string());
        inner.diagrams.insert(id, diagram);
    }

    /// Copy of the stored diagram
    pub fn diagram(&self, id: &DiagramId) -> Option<Diagram> {
        self.lock().diagrams.get(id).cloned()
    }

    /// Number of times `op` has been called
    pub fn calls(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the `n`th call of `op` from now on (1-based) fail once with `error`
    pub fn fail_nth(&self, op: StoreOp, n: usize, error: StoreError) {
        let mut inner = self.lock();
        let at_call = inner.calls.get(&op).copied().unwrap_or(0) + n.max(1);
        inner.faults.push(Fault { op, at_call, error });
    }
}

fn not_found(kind: &'static str, id: &DurableId) -> StoreError {
    StoreError::NotFound { kind, id: id.clone() }
}

fn check_endpoint(diagram: &Diagram, endpoint: &Endpoint) -> StoreResult<()> {
    let exists = match endpoint {
        Endpoint::Class(id) => diagram.class(id).is_some(),
        Endpoint::Link(id) => diagram.link(id).is_some(),
    };
    if exists {
        Ok(())
    } else {
        Err(StoreError::Validation {
            status: 400,
            message: format!("link endpoint {} does not exist", endpoint.id()),
        })
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn list_diagrams(&self) -> StoreResult<Vec<DiagramSummary>> {
        let mut inner = self.lock();
        inner.call(StoreOp::ListDiagrams)?;
        let mut summaries: Vec<DiagramSummary> = inner
            .diagrams
            .keys()
            .map(|id| DiagramSummary {
                id: id.clone(),
                name: inner.names.get(id).cloned().unwrap_or_else(|| id.to_string()),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.as_str().cmp(b.id.as_str())));
        Ok(summaries)
    }

    async fn create_diagram(&self, name: &str) -> StoreResult<DiagramSummary> {
        let mut inner = self.lock();
        inner.call(StoreOp::CreateDiagram)?;
        if name.trim().is_empty() {
            return Err(StoreError::Validation { status: 400, message: "diagram name is required".into() });
        }
        let id = DiagramId::generate();
        inner.diagrams.insert(id.clone(), Diagram::new(id.clone()));
        inner.names.insert(id.clone(), name.to_string());
        debug!(%id, name, "created diagram");
        Ok(DiagramSummary { id, name: name.to_string() })
    }

    async fn get_diagram(&self, diagram: &DiagramId) -> StoreResult<Diagram> {
        let mut inner = self.lock();
        inner.call(StoreOp::GetDiagram)?;
        Ok(inner.diagram(diagram)?.clone())
    }

    async fn create_class(&self, diagram: &DiagramId, class: NewClass) -> StoreResult<DiagramClass> {
        let mut inner = self.lock();
        inner.call(StoreOp::CreateClass)?;
        let record = class.into_class(DurableId::generate());
        inner.diagram(diagram)?.classes.push(record.clone());
        Ok(record)
    }

    async fn create_link(&self, diagram: &DiagramId, link: NewLink) -> StoreResult<DiagramLink> {
        let mut inner = self.lock();
        inner.call(StoreOp::CreateLink)?;
        let stored = inner.diagram(diagram)?;
        check_endpoint(stored, &link.source)?;
        check_endpoint(stored, &link.target)?;
        let record = link.into_link(DurableId::generate());
        stored.links.push(record.clone());
        Ok(record)
    }

    async fn update_class_position(
        &self,
        diagram: &DiagramId,
        class: &DurableId,
        position: Position,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.call(StoreOp::UpdateClassPosition)?;
        let record = inner.diagram(diagram)?.class_mut(class).ok_or_else(|| not_found("class", class))?;
        record.position = position;
        Ok(())
    }

    async fn update_class(&self, diagram: &DiagramId, class: &DurableId, patch: &ClassPatch) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.call(StoreOp::UpdateClass)?;
        let record = inner.diagram(diagram)?.class_mut(class).ok_or_else(|| not_found("class", class))?;
        patch.apply(record);
        Ok(())
    }

    async fn update_link(&self, diagram: &DiagramId, link: &DurableId, patch: &LinkPatch) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.call(StoreOp::UpdateLink)?;
        let record = inner.diagram(diagram)?.link_mut(link).ok_or_else(|| not_found("link", link))?;
        patch.apply(record);
        Ok(())
    }

    async fn delete_class(&self, diagram: &DiagramId, class: &DurableId) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.call(StoreOp::DeleteClass)?;
        inner
            .diagram(diagram)?
            .remove_class(class)
            .map(|_| ())
            .ok_or_else(|| not_found("class", class))
    }

    async fn delete_link(&self, diagram: &DiagramId, link: &DurableId) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.call(StoreOp::DeleteLink)?;
        inner
            .diagram(diagram)?
            .remove_link(link)
            .map(|_| ())
            .ok_or_else(|| not_found("link", link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umlsync_core::{ConstructSpec, LinkType};

    fn diagram_id() -> DiagramId {
        DiagramId::new("d1")
    }

    fn association(source: &DurableId, target: &DurableId) -> NewLink {
        NewLink {
            source: Endpoint::Class(source.clone()),
            target: Endpoint::Class(target.clone()),
            link_type: LinkType::Association,
            source_multiplicity: "1..1".into(),
            target_multiplicity: "0..*".into(),
        }
    }

    fn intermediate() -> NewClass {
        let spec = ConstructSpec::default();
        NewClass::new(spec.name)
    }

    #[tokio::test]
    async fn diagrams_are_listed_by_name() {
        let store = MemoryStore::with_diagram(&diagram_id());
        let shop = store.create_diagram("Shop").await.unwrap();
        let bank = store.create_diagram("Bank").await.unwrap();
        assert_ne!(shop.id, bank.id);

        let names: Vec<String> = store.list_diagrams().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["Bank", "Shop", "d1"]);

        let created = store.get_diagram(&shop.id).await.unwrap();
        assert_eq!(created.id.as_ref(), Some(&shop.id));
        assert!(created.classes.is_empty() && created.links.is_empty());
        assert_eq!(store.calls(StoreOp::CreateDiagram), 2);
    }

    #[tokio::test]
    async fn blank_diagram_name_is_rejected() {
        let store = MemoryStore::new();
        let err = store.create_diagram("  ").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation { status: 400, .. }));
        assert!(store.list_diagrams().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_records_get_fresh_ids() {
        let store = MemoryStore::with_diagram(&diagram_id());
        let a = store.create_class(&diagram_id(), NewClass::new("A")).await.unwrap();
        let b = store.create_class(&diagram_id(), NewClass::new("B")).await.unwrap();
        assert_ne!(a.id, b.id);

        let link = store.create_link(&diagram_id(), association(&a.id, &b.id)).await.unwrap();
        let stored = store.diagram(&diagram_id()).unwrap();
        assert_eq!(stored.classes.len(), 2);
        assert_eq!(stored.link(&link.id).unwrap().target_multiplicity, "0..*");
        assert_eq!(store.calls(StoreOp::CreateClass), 2);
    }

    #[tokio::test]
    async fn link_to_missing_class_is_rejected() {
        let store = MemoryStore::with_diagram(&diagram_id());
        let a = store.create_class(&diagram_id(), NewClass::new("A")).await.unwrap();
        let err = store
            .create_link(&diagram_id(), association(&a.id, &"ghost".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { status: 400, .. }));
    }

    #[tokio::test]
    async fn fault_fires_once_on_the_nth_call() {
        let store = MemoryStore::with_diagram(&diagram_id());
        store.fail_nth(StoreOp::CreateClass, 2, StoreError::Network { status: Some(503), message: "down".into() });

        assert!(store.create_class(&diagram_id(), NewClass::new("A")).await.is_ok());
        assert!(store.create_class(&diagram_id(), NewClass::new("B")).await.is_err());
        assert!(store.create_class(&diagram_id(), NewClass::new("C")).await.is_ok());
        assert_eq!(store.diagram(&diagram_id()).unwrap().classes.len(), 2);
    }

    #[tokio::test]
    async fn construct_is_created_in_order() {
        let store = MemoryStore::with_diagram(&diagram_id());
        let a = store.create_class(&diagram_id(), NewClass::new("A")).await.unwrap();
        let b = store.create_class(&diagram_id(), NewClass::new("B")).await.unwrap();

        let mut direct = association(&a.id, &b.id);
        direct.link_type = LinkType::Intermediate;
        let construct = store.create_construct(&diagram_id(), intermediate(), direct).await.unwrap();

        assert_eq!(construct.dashed.source, Endpoint::Link(construct.direct.id.clone()));
        assert_eq!(construct.dashed.target, Endpoint::Class(construct.class.id.clone()));
        let stored = store.diagram(&diagram_id()).unwrap();
        assert_eq!(stored.constructs().count(), 1);
    }

    #[tokio::test]
    async fn failed_dashed_link_rolls_back_everything() {
        let store = MemoryStore::with_diagram(&diagram_id());
        let a = store.create_class(&diagram_id(), NewClass::new("A")).await.unwrap();
        let b = store.create_class(&diagram_id(), NewClass::new("B")).await.unwrap();
        store.fail_nth(StoreOp::CreateLink, 2, StoreError::Network { status: None, message: "reset".into() });

        let err = store
            .create_construct(&diagram_id(), intermediate(), association(&a.id, &b.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Network { .. }));

        let stored = store.diagram(&diagram_id()).unwrap();
        assert_eq!(stored.classes.len(), 2);
        assert!(stored.links.is_empty());
        assert_eq!(store.calls(StoreOp::DeleteLink), 1);
        assert_eq!(store.calls(StoreOp::DeleteClass), 1);
    }

    #[tokio::test]
    async fn failed_rollback_is_an_integrity_error() {
        let store = MemoryStore::with_diagram(&diagram_id());
        let a = store.create_class(&diagram_id(), NewClass::new("A")).await.unwrap();
        let b = store.create_class(&diagram_id(), NewClass::new("B")).await.unwrap();
        store.fail_nth(StoreOp::CreateLink, 1, StoreError::Validation { status: 422, message: "bad".into() });
        store.fail_nth(StoreOp::DeleteClass, 1, StoreError::Network { status: None, message: "gone".into() });

        let err = store
            .create_construct(&diagram_id(), intermediate(), association(&a.id, &b.id))
            .await
            .unwrap_err();
        match err {
            StoreError::Integrity(message) => assert!(message.contains("rollback left")),
            other => panic!("expected integrity error, got {other:?}"),
        }
    }
}
