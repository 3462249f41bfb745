//! Real-time channel: typed diagram events and per-diagram rooms.
//!
//! Rooms are `tokio::sync::broadcast` channels kept in a [`RoomHub`]. A
//! [`ChannelClient`] belongs to one session, joins at most one room at a
//! time and never receives its own messages back. Delivery is
//! fire-and-forget: a lagging client loses events and stays inconsistent
//! until its next full reload.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};
use umlsync_core::{DiagramClass, DiagramId, DiagramLink, DurableId, IntermediateConstruct, Position};
use uuid::Uuid;

use crate::error::SyncError;

/// Default number of undelivered events a room buffers per member
pub const ROOM_CAPACITY: usize = 256;

/// Extra records carried by `link-added` when the link is the direct link of
/// an intermediate construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructParts {
    pub intermediate_class: DiagramClass,
    pub dashed_link: DiagramLink,
}

/// Everything that travels between sessions of the same diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RealtimeEvent {
    ClassAdded {
        diagram_id: DiagramId,
        new_class: DiagramClass,
    },
    ClassUpdated {
        diagram_id: DiagramId,
        class_id: DurableId,
        updated_class: DiagramClass,
    },
    ClassDeleted {
        diagram_id: DiagramId,
        class_id: DurableId,
    },
    ClassPositionChanged {
        diagram_id: DiagramId,
        class_id: DurableId,
        new_position: Position,
    },
    LinkAdded {
        diagram_id: DiagramId,
        new_link: DiagramLink,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        construct: Option<ConstructParts>,
    },
    LinkDeleted {
        diagram_id: DiagramId,
        link_id: DurableId,
    },
    LinkUpdated {
        diagram_id: DiagramId,
        link_id: DurableId,
        updated_link: DiagramLink,
    },
}

impl RealtimeEvent {
    /// `link-added` for a whole construct
    pub fn construct_added(diagram_id: DiagramId, construct: IntermediateConstruct) -> Self {
        RealtimeEvent::LinkAdded {
            diagram_id,
            new_link: construct.direct,
            construct: Some(ConstructParts { intermediate_class: construct.class, dashed_link: construct.dashed }),
        }
    }

    pub fn diagram_id(&self) -> &DiagramId {
        match self {
            RealtimeEvent::ClassAdded { diagram_id, .. }
            | RealtimeEvent::ClassUpdated { diagram_id, .. }
            | RealtimeEvent::ClassDeleted { diagram_id, .. }
            | RealtimeEvent::ClassPositionChanged { diagram_id, .. }
            | RealtimeEvent::LinkAdded { diagram_id, .. }
            | RealtimeEvent::LinkDeleted { diagram_id, .. }
            | RealtimeEvent::LinkUpdated { diagram_id, .. } => diagram_id,
        }
    }

    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeEvent::ClassAdded { .. } => "class-added",
            RealtimeEvent::ClassUpdated { .. } => "class-updated",
            RealtimeEvent::ClassDeleted { .. } => "class-deleted",
            RealtimeEvent::ClassPositionChanged { .. } => "class-position-changed",
            RealtimeEvent::LinkAdded { .. } => "link-added",
            RealtimeEvent::LinkDeleted { .. } => "link-deleted",
            RealtimeEvent::LinkUpdated { .. } => "link-updated",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    sender: Uuid,
    event: RealtimeEvent,
}

type Room = broadcast::Sender<Envelope>;

/// In-process broker of per-diagram rooms
#[derive(Debug, Clone)]
pub struct RoomHub {
    rooms: Arc<Mutex<HashMap<DiagramId, Room>>>,
    capacity: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::with_capacity(ROOM_CAPACITY)
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { rooms: Arc::default(), capacity: capacity.max(1) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DiagramId, Room>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn room(&self, diagram: &DiagramId) -> Room {
        self.lock()
            .entry(diagram.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Drop the room once nobody listens any more
    fn release(&self, diagram: &DiagramId) {
        let mut rooms = self.lock();
        if rooms.get(diagram).is_some_and(|room| room.receiver_count() == 0) {
            rooms.remove(diagram);
            debug!(%diagram, "room closed");
        }
    }

    /// Number of clients currently in the room
    pub fn members(&self, diagram: &DiagramId) -> usize {
        self.lock().get(diagram).map_or(0, |room| room.receiver_count())
    }

    pub fn client(&self) -> ChannelClient {
        ChannelClient::new(self.clone())
    }
}

#[derive(Debug)]
struct Membership {
    diagram: DiagramId,
    room: Room,
    receiver: broadcast::Receiver<Envelope>,
}

/// One session's connection to the real-time channel
#[derive(Debug)]
pub struct ChannelClient {
    id: Uuid,
    hub: RoomHub,
    membership: Option<Membership>,
}

impl ChannelClient {
    pub fn new(hub: RoomHub) -> Self {
        Self { id: Uuid::new_v4(), hub, membership: None }
    }

    /// Enter the room of `diagram`, leaving any room joined before
    pub fn join(&mut self, diagram: &DiagramId) {
        self.leave();
        let room = self.hub.room(diagram);
        let receiver = room.subscribe();
        debug!(client = %self.id, %diagram, "joined room");
        self.membership = Some(Membership { diagram: diagram.clone(), room, receiver });
    }

    pub fn leave(&mut self) {
        if let Some(membership) = self.membership.take() {
            let diagram = membership.diagram.clone();
            drop(membership);
            self.hub.release(&diagram);
            debug!(client = %self.id, %diagram, "left room");
        }
    }

    pub fn room(&self) -> Option<&DiagramId> {
        self.membership.as_ref().map(|m| &m.diagram)
    }

    /// Send to every other member of the room. Returns how many were reached.
    pub fn publish(&self, event: RealtimeEvent) -> Result<usize, SyncError> {
        let membership = self
            .membership
            .as_ref()
            .ok_or_else(|| SyncError::Channel("publish outside of a room".into()))?;
        if event.diagram_id() != &membership.diagram {
            return Err(SyncError::Channel(format!(
                "event for diagram {} published in room {}",
                event.diagram_id(),
                membership.diagram
            )));
        }

        let kind = event.kind();
        match membership.room.send(Envelope { sender: self.id, event }) {
            Ok(receivers) => {
                let peers = receivers.saturating_sub(1);
                debug!(kind, peers, "published");
                Ok(peers)
            }
            Err(_) => {
                debug!(kind, "no subscribers to receive event");
                Ok(0)
            }
        }
    }

    /// Next event from another member. `None` when not in a room.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        let me = self.id;
        let membership = self.membership.as_mut()?;
        loop {
            match membership.receiver.recv().await {
                Ok(envelope) if envelope.sender == me => continue,
                Ok(envelope) => return Some(envelope.event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, diagram = %membership.diagram, "real-time receiver lagged, events lost");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered event from another member, without waiting
    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        let me = self.id;
        let membership = self.membership.as_mut()?;
        loop {
            match membership.receiver.try_recv() {
                Ok(envelope) if envelope.sender == me => continue,
                Ok(envelope) => return Some(envelope.event),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, diagram = %membership.diagram, "real-time receiver lagged, events lost");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.leave();
    }
}
