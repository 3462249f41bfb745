//! Sync Engine: one per open diagram.
//!
//! The engine owns the canvas, the Identity Map and a mirror of the durable
//! diagram. Local intents go to the Model Store first and reach the canvas
//! only once the store has answered (positions are the one optimistic
//! exception). Every successful local change queues one [`RealtimeEvent`]
//! for the session to publish.
//!
//! Canvas events the engine causes itself are discarded as soon as the
//! mutation is done. Events caused by a remote update are left for [`tick`]
//! with the echo guard raised, so they never turn into new broadcasts.
//!
//! [`tick`]: SyncEngine::tick

mod import;
mod remote;

pub use import::{ImportError, ImportReport, grid_position};
pub use remote::RemoteOutcome;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, error, info, trace, warn};
use umlsync_core::links::intermediate_placement;
use umlsync_core::{
    Binding, CanvasEdge, CanvasEvent, CanvasGraph, CanvasId, CanvasNode, CanvasRef, ClassPatch, ConstructIds,
    ConstructSpec, Diagram, DiagramClass, DiagramId, DiagramLink, DurableId, EdgeLabels, EdgeStyle, Endpoint,
    IdentityMap, IntermediateConstruct, LinkPatch, LinkType, NewClass, NewLink, NodeContent, Position,
};

use crate::error::{StoreError, SyncError};
use crate::realtime::RealtimeEvent;
use crate::store::ModelStore;

/// A canvas event together with whether the echo guard covered it
#[derive(Debug, Clone)]
struct Observed {
    event: CanvasEvent,
    echo: bool,
}

/// One step of a delete, in the order it has to happen
#[derive(Debug, Clone, PartialEq, Eq)]
enum Removal {
    Link(DurableId),
    Construct(DurableId),
    Class(DurableId),
}

pub struct SyncEngine<S, C> {
    diagram_id: DiagramId,
    store: S,
    canvas: C,
    identity: IdentityMap,
    /// Durable records as last confirmed, keyed by durable id
    model: Diagram,
    echo_guard: bool,
    /// Classes dragged since the last pointer-up
    moving: BTreeSet<DurableId>,
    backlog: Vec<Observed>,
    outbox: VecDeque<RealtimeEvent>,
    outbound_count: usize,
}

impl<S: ModelStore, C: CanvasGraph> SyncEngine<S, C> {
    pub fn new(diagram_id: DiagramId, store: S, canvas: C) -> Self {
        Self {
            model: Diagram::new(diagram_id.clone()),
            diagram_id,
            store,
            canvas,
            identity: IdentityMap::new(),
            echo_guard: false,
            moving: BTreeSet::new(),
            backlog: Vec::new(),
            outbox: VecDeque::new(),
            outbound_count: 0,
        }
    }

    pub fn diagram_id(&self) -> &DiagramId {
        &self.diagram_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// The surface, for feeding user gestures
    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    /// Mirror of the durable diagram, including anything not yet shown
    pub fn model(&self) -> &Diagram {
        &self.model
    }

    pub fn echo_guard(&self) -> bool {
        self.echo_guard
    }

    /// Total number of real-time events this engine has produced
    pub fn outbound_count(&self) -> usize {
        self.outbound_count
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbox.len()
    }

    /// Take the queued outbound events, oldest first
    pub fn drain_outbound(&mut self) -> Vec<RealtimeEvent> {
        self.outbox.drain(..).collect()
    }

    fn emit(&mut self, event: RealtimeEvent) {
        trace!(kind = event.kind(), "queued outbound event");
        self.outbound_count += 1;
        self.outbox.push_back(event);
    }

    /// Keep events already queued on the canvas for the next tick
    fn stash_pending(&mut self) {
        let echo = self.echo_guard;
        let pending = self.canvas.take_events();
        self.backlog.extend(pending.into_iter().map(|event| Observed { event, echo }));
    }

    /// Run a canvas mutation whose own events must not be observed
    fn quietly<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.stash_pending();
        let out = f(self);
        let own = self.canvas.take_events();
        trace!(count = own.len(), "discarded engine-caused canvas events");
        out
    }

    // --- Lookups ---

    /// Canvas element standing for a durable id, construct members included
    fn canvas_ref_of(&self, durable: &DurableId) -> Option<CanvasRef> {
        match self.identity.binding(durable) {
            Some(Binding::Single(id)) => Some(if self.model.class(durable).is_some() {
                CanvasRef::Node(*id)
            } else {
                CanvasRef::Edge(*id)
            }),
            Some(Binding::Construct(ids)) => Some(CanvasRef::Edge(ids.direct_link)),
            None => {
                let association = self.model.construct_containing(durable)?;
                let ids = self.identity.construct_of(&association)?;
                let view = self.model.construct_of(&association)?;
                if &view.class.id == durable {
                    Some(CanvasRef::Node(ids.intermediate_class))
                } else if &view.dashed.id == durable {
                    Some(CanvasRef::Edge(ids.dashed_link))
                } else {
                    None
                }
            }
        }
    }

    fn node_of(&self, class: &DurableId) -> Option<CanvasId> {
        match self.canvas_ref_of(class)? {
            CanvasRef::Node(id) => Some(id),
            CanvasRef::Edge(_) => None,
        }
    }

    fn edge_of(&self, link: &DurableId) -> Option<CanvasId> {
        match self.canvas_ref_of(link)? {
            CanvasRef::Edge(id) => Some(id),
            CanvasRef::Node(_) => None,
        }
    }

    /// Resolve an endpoint, insisting the kinds agree
    fn endpoint_ref(&self, endpoint: &Endpoint) -> Option<CanvasRef> {
        match (endpoint, self.canvas_ref_of(endpoint.id())?) {
            (Endpoint::Class(_), node @ CanvasRef::Node(_)) => Some(node),
            (Endpoint::Link(_), edge @ CanvasRef::Edge(_)) => Some(edge),
            _ => None,
        }
    }

    fn class_endpoint(&self, class: &DurableId) -> Result<CanvasRef, SyncError> {
        self.endpoint_ref(&Endpoint::Class(class.clone()))
            .ok_or_else(|| SyncError::UnknownEndpoint(class.clone()))
    }

    /// Durable id of the class shown by a canvas node
    fn class_at(&self, canvas: CanvasId) -> Option<DurableId> {
        let durable = self.identity.durable_of(canvas)?;
        match self.identity.binding(durable)? {
            Binding::Single(_) => self.model.class(durable).map(|c| c.id.clone()),
            Binding::Construct(ids) if ids.intermediate_class == canvas => {
                self.model.construct_of(durable).map(|view| view.class.id.clone())
            }
            Binding::Construct(_) => None,
        }
    }

    // --- Loading and export ---

    /// Full reload: rebuild canvas and Identity Map from the store
    pub async fn load(&mut self) -> Result<(), SyncError> {
        let loaded = self
            .store
            .get_diagram(&self.diagram_id)
            .await
            .inspect_err(|e| error!(diagram = %self.diagram_id, error = %e, "loading diagram failed"))?;
        self.model = Diagram { id: Some(self.diagram_id.clone()), classes: loaded.classes, links: loaded.links };
        self.backlog.clear();
        self.quietly(Self::rebuild)?;
        info!(
            diagram = %self.diagram_id,
            classes = self.model.classes.len(),
            links = self.model.links.len(),
            bound = self.identity.len(),
            "diagram loaded"
        );
        Ok(())
    }

    fn rebuild(&mut self) -> Result<(), SyncError> {
        self.canvas.clear();
        self.identity.clear();
        self.moving.clear();

        let constructs: Vec<IntermediateConstruct> = self.model.constructs().map(|view| view.to_owned()).collect();
        let mut placed: HashMap<DurableId, CanvasRef> = HashMap::new();

        for class in &self.model.classes {
            let node = self.canvas.add_node(CanvasNode::from(class));
            placed.insert(class.id.clone(), CanvasRef::Node(node));
        }

        // Dashed links hang off their direct link, so they go last.
        let (dashed, plain): (Vec<&DiagramLink>, Vec<&DiagramLink>) =
            self.model.links.iter().partition(|l| l.is_dashed());
        for link in plain.into_iter().chain(dashed) {
            let resolve = |endpoint: &Endpoint| match (endpoint, placed.get(endpoint.id())) {
                (Endpoint::Class(_), Some(node @ CanvasRef::Node(_))) => Some(*node),
                (Endpoint::Link(_), Some(edge @ CanvasRef::Edge(_))) => Some(*edge),
                _ => None,
            };
            let (Some(source), Some(target)) = (resolve(&link.source), resolve(&link.target)) else {
                warn!(link = %link.id, "link endpoint is not in the diagram, link not shown");
                continue;
            };
            let edge = CanvasEdge { labels: EdgeLabels::loaded(link), ..CanvasEdge::for_link(link, source, target) };
            let id = self.canvas.add_edge(edge)?;
            placed.insert(link.id.clone(), CanvasRef::Edge(id));
        }

        let mut in_construct: HashSet<DurableId> = HashSet::new();
        for construct in &constructs {
            let members = (
                placed.get(&construct.direct.id),
                placed.get(&construct.dashed.id),
                placed.get(&construct.class.id),
            );
            let (Some(CanvasRef::Edge(direct)), Some(CanvasRef::Edge(dashed)), Some(CanvasRef::Node(class))) = members
            else {
                warn!(association = %construct.direct.id, "construct not fully shown, binding members singly");
                continue;
            };
            let ids = ConstructIds { direct_link: *direct, dashed_link: *dashed, intermediate_class: *class };
            self.identity.bind_construct(construct.direct.id.clone(), ids)?;
            in_construct.extend([construct.direct.id.clone(), construct.dashed.id.clone(), construct.class.id.clone()]);
        }

        for link in self.model.links.iter().filter(|l| l.is_dashed() && !in_construct.contains(&l.id)) {
            warn!(link = %link.id, "incomplete intermediate construct");
        }

        for (durable, canvas) in placed {
            if !in_construct.contains(&durable) {
                self.identity.bind(durable, canvas.id())?;
            }
        }
        Ok(())
    }

    /// What export sees: the mirror minus anything not (fully) on the canvas
    pub fn snapshot(&self) -> Diagram {
        let mut excluded: HashSet<&DurableId> = HashSet::new();
        for view in self.model.constructs() {
            if !self.identity.is_ready(&view.direct.id) {
                excluded.extend([&view.class.id, &view.direct.id, &view.dashed.id]);
            }
        }
        let shown = |id: &DurableId| !excluded.contains(id) && self.canvas_ref_of(id).is_some();
        Diagram {
            id: Some(self.diagram_id.clone()),
            classes: self.model.classes.iter().filter(|c| shown(&c.id)).cloned().collect(),
            links: self.model.links.iter().filter(|l| shown(&l.id)).cloned().collect(),
        }
    }

    // --- Create ---

    pub async fn create_class(&mut self, class: NewClass) -> Result<DiagramClass, SyncError> {
        let record = self
            .store
            .create_class(&self.diagram_id, class)
            .await
            .inspect_err(|e| error!(error = %e, "create class failed"))?;
        self.quietly(|engine| engine.place_class(&record))?;
        debug!(class = %record.id, name = %record.name, "class created");
        self.emit(RealtimeEvent::ClassAdded { diagram_id: self.diagram_id.clone(), new_class: record.clone() });
        Ok(record)
    }

    pub async fn create_link(
        &mut self,
        source: &DurableId,
        target: &DurableId,
        link_type: LinkType,
        source_multiplicity: &str,
        target_multiplicity: &str,
    ) -> Result<DiagramLink, SyncError> {
        let source_ref = self.class_endpoint(source)?;
        let target_ref = self.class_endpoint(target)?;
        let request = NewLink {
            source: Endpoint::Class(source.clone()),
            target: Endpoint::Class(target.clone()),
            link_type,
            source_multiplicity: source_multiplicity.to_string(),
            target_multiplicity: target_multiplicity.to_string(),
        };
        let record = self
            .store
            .create_link(&self.diagram_id, request)
            .await
            .inspect_err(|e| error!(error = %e, %link_type, "create link failed"))?;
        self.quietly(|engine| engine.place_link(&record, source_ref, target_ref))?;
        debug!(link = %record.id, %link_type, "link created");
        self.emit(RealtimeEvent::LinkAdded {
            diagram_id: self.diagram_id.clone(),
            new_link: record.clone(),
            construct: None,
        });
        Ok(record)
    }

    pub async fn create_intermediate_construct(
        &mut self,
        source: &DurableId,
        target: &DurableId,
    ) -> Result<IntermediateConstruct, SyncError> {
        self.create_intermediate_construct_with(source, target, ConstructSpec::default())
            .await
    }

    /// Create class, direct link and dashed link as one unit
    pub async fn create_intermediate_construct_with(
        &mut self,
        source: &DurableId,
        target: &DurableId,
        spec: ConstructSpec,
    ) -> Result<IntermediateConstruct, SyncError> {
        let source_ref = self.class_endpoint(source)?;
        let target_ref = self.class_endpoint(target)?;
        let placement = intermediate_placement(
            self.canvas.position(source_ref.id()).unwrap_or_default(),
            self.canvas.position(target_ref.id()).unwrap_or_default(),
        );

        let class = NewClass::new(spec.name)
            .with_attributes(spec.attributes)
            .with_methods(spec.methods)
            .at(placement);
        let direct = NewLink {
            source: Endpoint::Class(source.clone()),
            target: Endpoint::Class(target.clone()),
            link_type: LinkType::Intermediate,
            source_multiplicity: spec.source_multiplicity,
            target_multiplicity: spec.target_multiplicity,
        };
        let construct = self
            .store
            .create_construct(&self.diagram_id, class, direct)
            .await
            .inspect_err(|e| error!(error = %e, "create intermediate construct failed"))?;

        if let Err(err) = self.quietly(|engine| engine.place_construct(&construct)) {
            error!(association = %construct.direct.id, error = %err, "construct could not be shown, rolling back");
            return Err(self.rollback_construct(&construct).await.unwrap_or(err));
        }
        debug!(association = %construct.direct.id, class = %construct.class.id, "construct created");
        self.emit(RealtimeEvent::construct_added(self.diagram_id.clone(), construct.clone()));
        Ok(construct)
    }

    /// Delete the records of a construct the canvas refused.
    /// Returns an integrity error when something stays behind.
    async fn rollback_construct(&mut self, construct: &IntermediateConstruct) -> Option<SyncError> {
        let mut leftover = Vec::new();
        for link in [&construct.dashed.id, &construct.direct.id] {
            if let Err(e) = self.store.delete_link(&self.diagram_id, link).await {
                error!(%link, error = %e, "rollback failed");
                leftover.push(link.to_string());
            }
        }
        if let Err(e) = self.store.delete_class(&self.diagram_id, &construct.class.id).await {
            error!(class = %construct.class.id, error = %e, "rollback failed");
            leftover.push(construct.class.id.to_string());
        }
        (!leftover.is_empty()).then(|| SyncError::ConstructIntegrity(format!("left behind {}", leftover.join(", "))))
    }

    fn place_class(&mut self, class: &DiagramClass) -> Result<CanvasId, SyncError> {
        let node = self.canvas.add_node(CanvasNode::from(class));
        if let Err(e) = self.identity.bind(class.id.clone(), node) {
            self.canvas.remove(node);
            return Err(e.into());
        }
        self.model.upsert_class(class.clone());
        Ok(node)
    }

    fn place_link(&mut self, link: &DiagramLink, source: CanvasRef, target: CanvasRef) -> Result<CanvasId, SyncError> {
        let edge = self.canvas.add_edge(CanvasEdge::for_link(link, source, target))?;
        if let Err(e) = self.identity.bind(link.id.clone(), edge) {
            self.canvas.remove(edge);
            return Err(e.into());
        }
        self.model.upsert_link(link.clone());
        Ok(edge)
    }

    /// Show all three members and bind them under the association id
    fn place_construct(&mut self, construct: &IntermediateConstruct) -> Result<ConstructIds, SyncError> {
        let direct_link = &construct.direct;
        let source = self
            .endpoint_ref(&direct_link.source)
            .ok_or_else(|| SyncError::UnknownEndpoint(direct_link.source.id().clone()))?;
        let target = self
            .endpoint_ref(&direct_link.target)
            .ok_or_else(|| SyncError::UnknownEndpoint(direct_link.target.id().clone()))?;

        let node = self.canvas.add_node(CanvasNode::from(&construct.class));
        let direct = match self.canvas.add_edge(CanvasEdge::for_link(direct_link, source, target)) {
            Ok(id) => id,
            Err(e) => {
                self.canvas.remove(node);
                return Err(e.into());
            }
        };
        let dashed_edge = CanvasEdge::for_link(&construct.dashed, CanvasRef::Edge(direct), CanvasRef::Node(node));
        let dashed = match self.canvas.add_edge(dashed_edge) {
            Ok(id) => id,
            Err(e) => {
                self.canvas.remove(direct);
                self.canvas.remove(node);
                return Err(e.into());
            }
        };

        let ids = ConstructIds { direct_link: direct, dashed_link: dashed, intermediate_class: node };
        if let Err(e) = self.identity.bind_construct(direct_link.id.clone(), ids) {
            self.canvas.remove(dashed);
            self.canvas.remove(direct);
            self.canvas.remove(node);
            return Err(e.into());
        }
        self.model.insert_construct(construct.clone());
        Ok(ids)
    }

    // --- Update ---

    /// Move a class: canvas first, then the store, then the room
    pub async fn update_class_position(&mut self, class: &DurableId, position: Position) -> Result<(), SyncError> {
        let node = self.node_of(class).ok_or_else(|| SyncError::UnknownElement(class.clone()))?;
        self.quietly(|engine| engine.canvas.set_position(node, position))?;
        self.persist_position(class, position).await
    }

    async fn persist_position(&mut self, class: &DurableId, position: Position) -> Result<(), SyncError> {
        if let Some(record) = self.model.class_mut(class) {
            record.position = position;
        }
        self.store
            .update_class_position(&self.diagram_id, class, position)
            .await
            .inspect_err(|e| error!(%class, error = %e, "position not saved, canvas and store now differ"))?;
        self.emit(RealtimeEvent::ClassPositionChanged {
            diagram_id: self.diagram_id.clone(),
            class_id: class.clone(),
            new_position: position,
        });
        Ok(())
    }

    pub async fn update_class(&mut self, class: &DurableId, patch: ClassPatch) -> Result<DiagramClass, SyncError> {
        let node = self.node_of(class).ok_or_else(|| SyncError::UnknownElement(class.clone()))?;
        self.store
            .update_class(&self.diagram_id, class, &patch)
            .await
            .inspect_err(|e| error!(%class, error = %e, "update class failed"))?;

        let record = self
            .model
            .class_mut(class)
            .map(|record| {
                patch.apply(record);
                record.clone()
            })
            .ok_or_else(|| SyncError::UnknownElement(class.clone()))?;
        self.quietly(|engine| engine.canvas.update_node(node, NodeContent::from(&record)))?;
        self.emit(RealtimeEvent::ClassUpdated {
            diagram_id: self.diagram_id.clone(),
            class_id: class.clone(),
            updated_class: record.clone(),
        });
        Ok(record)
    }

    pub async fn update_link(&mut self, link: &DurableId, patch: LinkPatch) -> Result<DiagramLink, SyncError> {
        let edge = self.edge_of(link).ok_or_else(|| SyncError::UnknownElement(link.clone()))?;
        self.store
            .update_link(&self.diagram_id, link, &patch)
            .await
            .inspect_err(|e| error!(%link, error = %e, "update link failed"))?;

        let record = self
            .model
            .link_mut(link)
            .map(|record| {
                patch.apply(record);
                record.clone()
            })
            .ok_or_else(|| SyncError::UnknownElement(link.clone()))?;
        self.quietly(|engine| engine.restyle_edge(edge, &record))?;
        self.emit(RealtimeEvent::LinkUpdated {
            diagram_id: self.diagram_id.clone(),
            link_id: link.clone(),
            updated_link: record.clone(),
        });
        Ok(record)
    }

    fn restyle_edge(&mut self, edge: CanvasId, link: &DiagramLink) -> Result<(), SyncError> {
        self.canvas.set_edge_labels(edge, EdgeLabels::for_link(link))?;
        self.canvas.set_edge_style(edge, EdgeStyle::for_link(link))?;
        Ok(())
    }

    // --- Delete ---

    /// Delete a class together with every link that touches it.
    ///
    /// An intermediate class takes its whole construct with it.
    pub async fn delete_class(&mut self, class: &DurableId) -> Result<(), SyncError> {
        if self.model.class(class).is_none() {
            return Err(SyncError::UnknownElement(class.clone()));
        }
        let mut plan = RemovalPlan::default();
        self.plan_class_removal(class, &mut plan);
        self.execute(plan.steps).await
    }

    /// Delete a link. Any member of a construct deletes the whole construct.
    pub async fn delete_link(&mut self, link: &DurableId) -> Result<(), SyncError> {
        if self.model.link(link).is_none() {
            return Err(SyncError::UnknownElement(link.clone()));
        }
        let mut plan = RemovalPlan::default();
        self.plan_link_removal(link, &mut plan);
        self.execute(plan.steps).await
    }

    fn plan_class_removal(&self, class: &DurableId, plan: &mut RemovalPlan) {
        if let Some(association) = self.model.construct_containing(class) {
            self.plan_construct_removal(&association, plan);
            return;
        }
        if !plan.visited.insert(class.clone()) {
            return;
        }
        for link in self.model.links_touching(class) {
            self.plan_link_removal(&link.id, plan);
        }
        plan.push(Removal::Class(class.clone()));
    }

    fn plan_link_removal(&self, link: &DurableId, plan: &mut RemovalPlan) {
        match self.model.construct_containing(link) {
            Some(association) => self.plan_construct_removal(&association, plan),
            None => plan.push(Removal::Link(link.clone())),
        }
    }

    /// Links attached to the intermediate class go before the construct
    fn plan_construct_removal(&self, association: &DurableId, plan: &mut RemovalPlan) {
        if !plan.visited.insert(association.clone()) {
            return;
        }
        if let Some(view) = self.model.construct_of(association) {
            for link in self.model.links_touching(&view.class.id) {
                if link.id != view.direct.id && link.id != view.dashed.id {
                    self.plan_link_removal(&link.id, plan);
                }
            }
        }
        plan.push(Removal::Construct(association.clone()));
    }

    async fn execute(&mut self, plan: Vec<Removal>) -> Result<(), SyncError> {
        for step in plan {
            match step {
                Removal::Link(link) => {
                    self.delete_in_store(StoreKind::Link, &link).await?;
                    self.quietly(|engine| engine.remove_link_locally(&link));
                    self.emit(RealtimeEvent::LinkDeleted { diagram_id: self.diagram_id.clone(), link_id: link });
                }
                Removal::Construct(association) => self.remove_construct(association).await?,
                Removal::Class(class) => {
                    self.delete_in_store(StoreKind::Class, &class).await?;
                    self.quietly(|engine| engine.remove_class_locally(&class));
                    self.emit(RealtimeEvent::ClassDeleted { diagram_id: self.diagram_id.clone(), class_id: class });
                }
            }
        }
        Ok(())
    }

    /// Delete a construct from the store, the dashed link first. Once that
    /// is gone the construct no longer exists, so it leaves the canvas and
    /// the room even when a later delete fails. Leftover records then come
    /// back as plain elements through a reload.
    async fn remove_construct(&mut self, association: DurableId) -> Result<(), SyncError> {
        let mut leftover = Vec::new();
        match self.model.construct_of(&association).map(|view| view.to_owned()) {
            Some(construct) => {
                self.delete_in_store(StoreKind::Link, &construct.dashed.id).await?;
                if self.delete_in_store(StoreKind::Link, &construct.direct.id).await.is_err() {
                    leftover.push(construct.direct.id.to_string());
                }
                if self.delete_in_store(StoreKind::Class, &construct.class.id).await.is_err() {
                    leftover.push(construct.class.id.to_string());
                }
            }
            None => self.delete_in_store(StoreKind::Link, &association).await?,
        }

        self.quietly(|engine| engine.remove_construct_locally(&association));
        self.emit(RealtimeEvent::LinkDeleted { diagram_id: self.diagram_id.clone(), link_id: association.clone() });
        if leftover.is_empty() {
            return Ok(());
        }

        error!(%association, ?leftover, "construct only partly deleted, reloading");
        self.load().await?;
        Err(SyncError::ConstructIntegrity(format!("left behind {}", leftover.join(", "))))
    }

    /// Delete a record; one that is already gone counts as deleted
    async fn delete_in_store(&self, kind: StoreKind, id: &DurableId) -> Result<(), SyncError> {
        let result = match kind {
            StoreKind::Class => self.store.delete_class(&self.diagram_id, id).await,
            StoreKind::Link => self.store.delete_link(&self.diagram_id, id).await,
        };
        match result {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. } | StoreError::Validation { status: 404, .. }) => {
                debug!(%id, "already deleted in store");
                Ok(())
            }
            Err(e) => {
                error!(%id, error = %e, "delete failed");
                Err(e.into())
            }
        }
    }

    fn remove_class_locally(&mut self, class: &DurableId) {
        if let Some(binding) = self.identity.unbind(class) {
            self.canvas.remove(binding.primary());
        }
        self.model.remove_class(class);
        self.moving.remove(class);
        self.prune_dangling();
    }

    fn remove_link_locally(&mut self, link: &DurableId) {
        if let Some(binding) = self.identity.unbind(link) {
            self.canvas.remove(binding.primary());
        }
        self.model.remove_link(link);
        self.prune_dangling();
    }

    fn remove_construct_locally(&mut self, association: &DurableId) {
        let construct = self.model.construct_of(association).map(|view| view.to_owned());
        match self.identity.unbind(association) {
            Some(Binding::Construct(ids)) => {
                for member in ids.members() {
                    self.canvas.remove(member);
                }
            }
            Some(Binding::Single(id)) => {
                self.canvas.remove(id);
            }
            None => {}
        }
        if let Some(construct) = construct {
            for member in [&construct.dashed.id, &construct.class.id] {
                if let Some(binding) = self.identity.unbind(member) {
                    self.canvas.remove(binding.primary());
                }
            }
            self.model.remove_link(&construct.dashed.id);
            self.model.remove_class(&construct.class.id);
            self.moving.remove(&construct.class.id);
        }
        self.model.remove_link(association);
        self.prune_dangling();
    }

    /// Forget bindings whose canvas elements went away with a cascading removal
    fn prune_dangling(&mut self) {
        let dangling: Vec<DurableId> = self
            .identity
            .iter()
            .filter(|(_, binding)| match binding {
                Binding::Single(id) => !self.canvas.contains(*id),
                Binding::Construct(ids) => ids.members().iter().any(|id| !self.canvas.contains(*id)),
            })
            .map(|(durable, _)| durable.clone())
            .collect();

        for durable in dangling {
            debug!(%durable, "dropping binding of removed canvas element");
            if let Some(Binding::Construct(ids)) = self.identity.unbind(&durable) {
                for member in ids.members() {
                    self.canvas.remove(member);
                }
                if let Some(construct) = self.model.construct_of(&durable).map(|view| view.to_owned()) {
                    self.model.remove_link(&construct.dashed.id);
                    self.model.remove_class(&construct.class.id);
                }
            }
            self.model.remove_class(&durable);
            self.model.remove_link(&durable);
            self.moving.remove(&durable);
        }
    }

    // --- Gesture pipeline ---

    /// React to one canvas event as if it had just been observed
    pub async fn handle_canvas_event(&mut self, event: CanvasEvent) -> Result<(), SyncError> {
        let echo = self.echo_guard;
        self.observe(Observed { event, echo }).await
    }

    async fn observe(&mut self, observed: Observed) -> Result<(), SyncError> {
        match observed.event {
            CanvasEvent::PositionChanged { id, position } => {
                if observed.echo {
                    trace!(%id, "position change from a remote update, not re-broadcast");
                    return Ok(());
                }
                if let Some(class) = self.class_at(id) {
                    trace!(%class, x = position.x, y = position.y, "class moving");
                    self.moving.insert(class);
                }
                Ok(())
            }
            CanvasEvent::PointerUp => self.persist_moves().await,
            CanvasEvent::Added(id) | CanvasEvent::Removed(id) | CanvasEvent::ContentChanged(id) => {
                trace!(%id, echo = observed.echo, "canvas change");
                Ok(())
            }
        }
    }

    /// Save and broadcast every class dragged since the last pointer-up
    async fn persist_moves(&mut self) -> Result<(), SyncError> {
        let moved = std::mem::take(&mut self.moving);
        let mut first_error = None;
        for class in moved {
            let Some(position) = self.node_of(&class).and_then(|node| self.canvas.position(node)) else {
                debug!(%class, "moved class left the canvas, dropping stale move");
                continue;
            };
            if let Err(e) = self.persist_position(&class, position).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Process everything the canvas reported since the last tick, then
    /// lower the echo guard.
    pub async fn tick(&mut self) -> Result<(), SyncError> {
        self.stash_pending();
        let observed = std::mem::take(&mut self.backlog);
        let mut first_error = None;
        for item in observed {
            if let Err(e) = self.observe(item).await {
                first_error.get_or_insert(e);
            }
        }
        self.echo_guard = false;
        first_error.map_or(Ok(()), Err)
    }
}

#[derive(Debug, Clone, Copy)]
enum StoreKind {
    Class,
    Link,
}

/// Deletion steps in execution order
#[derive(Debug, Default)]
struct RemovalPlan {
    steps: Vec<Removal>,
    visited: HashSet<DurableId>,
}

impl RemovalPlan {
    fn push(&mut self, step: Removal) {
        if !self.steps.contains(&step) {
            self.steps.push(step);
        }
    }
}
