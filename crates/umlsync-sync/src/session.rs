//! Editing sessions.
//!
//! A [`Session`] is one open diagram: a sync engine plus the channel client
//! it publishes through. [`spawn_session`] runs one on its own thread so a
//! front end can drive it with commands and poll for events.

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, info, warn};
use umlsync_core::{
    CanvasGraph, ClassPatch, ConstructSpec, Diagram, DiagramClass, DiagramId, DiagramLink, DurableId,
    IntermediateConstruct, LinkPatch, LinkType, MemoryCanvas, NewClass, Position,
};

use crate::engine::{RemoteOutcome, SyncEngine};
use crate::error::SyncError;
use crate::realtime::{ChannelClient, RealtimeEvent, RoomHub};
use crate::store::ModelStore;

/// Commands from the front end to a session thread
#[derive(Debug)]
pub enum SessionCommand {
    CreateClass(NewClass),
    CreateLink {
        source: DurableId,
        target: DurableId,
        link_type: LinkType,
        source_multiplicity: String,
        target_multiplicity: String,
    },
    CreateConstruct {
        source: DurableId,
        target: DurableId,
        spec: ConstructSpec,
    },
    MoveClass {
        class: DurableId,
        position: Position,
    },
    UpdateClass {
        class: DurableId,
        patch: ClassPatch,
    },
    UpdateLink {
        link: DurableId,
        patch: LinkPatch,
    },
    DeleteClass(DurableId),
    DeleteLink(DurableId),
    /// Import an exchange document
    Import(String),
    /// Export what the canvas shows
    Export,
    Snapshot,
    Reload,
    Shutdown,
}

/// Events from a session thread to the front end
#[derive(Debug)]
pub enum SessionEvent {
    /// Diagram loaded and room joined
    Ready { diagram_id: DiagramId, classes: usize, links: usize },
    ClassCreated(DiagramClass),
    LinkCreated(DiagramLink),
    ConstructCreated(IntermediateConstruct),
    /// A change from another session reached the canvas
    RemoteApplied { kind: &'static str },
    Imported { classes: usize, links: usize, constructs: usize, errors: Vec<String> },
    Exported(String),
    Snapshot(Diagram),
    Reloaded,
    Error(String),
    Closed,
}

enum Step {
    Command(SessionCommand),
    Remote(RealtimeEvent),
    Stop,
}

pub struct Session<S, C> {
    engine: SyncEngine<S, C>,
    channel: ChannelClient,
}

impl<S: ModelStore, C: CanvasGraph> Session<S, C> {
    /// Join the diagram's room, then load it
    pub async fn open(diagram_id: DiagramId, store: S, canvas: C, mut channel: ChannelClient) -> Result<Self, SyncError> {
        channel.join(&diagram_id);
        let mut engine = SyncEngine::new(diagram_id, store, canvas);
        engine.load().await?;
        Ok(Self { engine, channel })
    }

    pub fn close(mut self) {
        info!(diagram = %self.engine.diagram_id(), "closing session");
        self.channel.leave();
    }

    pub fn engine(&self) -> &SyncEngine<S, C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine<S, C> {
        &mut self.engine
    }

    /// Publish everything the engine queued. Returns the number of events sent.
    pub fn flush(&mut self) -> Result<usize, SyncError> {
        let outbound = self.engine.drain_outbound();
        let count = outbound.len();
        for event in outbound {
            self.channel.publish(event)?;
        }
        Ok(count)
    }

    /// Apply one remote event. Failures are logged and do not end the session.
    pub fn receive(&mut self, event: RealtimeEvent) -> Option<RemoteOutcome> {
        self.engine.apply_remote(event).ok()
    }

    /// Apply every event already delivered, tick, then publish.
    /// Returns how many remote events were applied.
    pub async fn pump(&mut self) -> Result<usize, SyncError> {
        let mut applied = 0;
        while let Some(event) = self.channel.try_recv() {
            if self.receive(event) == Some(RemoteOutcome::Applied) {
                applied += 1;
            }
        }
        let ticked = self.engine.tick().await;
        self.flush()?;
        ticked.map(|_| applied)
    }

    /// Carry out one command. `Ok(None)` for commands with nothing to report.
    pub async fn execute(&mut self, command: SessionCommand) -> Result<Option<SessionEvent>, SyncError> {
        let engine = &mut self.engine;
        let event = match command {
            SessionCommand::CreateClass(class) => Some(SessionEvent::ClassCreated(engine.create_class(class).await?)),
            SessionCommand::CreateLink { source, target, link_type, source_multiplicity, target_multiplicity } => {
                let link = engine
                    .create_link(&source, &target, link_type, &source_multiplicity, &target_multiplicity)
                    .await?;
                Some(SessionEvent::LinkCreated(link))
            }
            SessionCommand::CreateConstruct { source, target, spec } => {
                let construct = engine.create_intermediate_construct_with(&source, &target, spec).await?;
                Some(SessionEvent::ConstructCreated(construct))
            }
            SessionCommand::MoveClass { class, position } => {
                engine.update_class_position(&class, position).await?;
                None
            }
            SessionCommand::UpdateClass { class, patch } => {
                engine.update_class(&class, patch).await?;
                None
            }
            SessionCommand::UpdateLink { link, patch } => {
                engine.update_link(&link, patch).await?;
                None
            }
            SessionCommand::DeleteClass(class) => {
                engine.delete_class(&class).await?;
                None
            }
            SessionCommand::DeleteLink(link) => {
                engine.delete_link(&link).await?;
                None
            }
            SessionCommand::Import(xml) => {
                let report = engine.import_document(&xml).await?;
                Some(SessionEvent::Imported {
                    classes: report.classes_created,
                    links: report.links_created,
                    constructs: report.constructs_created,
                    errors: report.errors.iter().map(ToString::to_string).collect(),
                })
            }
            SessionCommand::Export => Some(SessionEvent::Exported(engine.export_document()?)),
            SessionCommand::Snapshot => Some(SessionEvent::Snapshot(engine.snapshot())),
            SessionCommand::Reload => {
                engine.load().await?;
                Some(SessionEvent::Reloaded)
            }
            SessionCommand::Shutdown => None,
        };
        Ok(event)
    }

    /// The session loop: one command or one remote event at a time, each
    /// followed by a tick and a flush. Ends on `Shutdown` or when the
    /// command sender goes away.
    pub async fn run(
        mut self,
        mut commands: tokio_mpsc::UnboundedReceiver<SessionCommand>,
        events: std_mpsc::Sender<SessionEvent>,
    ) {
        loop {
            let step = tokio::select! {
                command = commands.recv() => command.map_or(Step::Stop, Step::Command),
                remote = self.channel.recv() => remote.map_or(Step::Stop, Step::Remote),
            };

            let mut report = Vec::new();
            match step {
                Step::Stop | Step::Command(SessionCommand::Shutdown) => break,
                Step::Command(command) => match self.execute(command).await {
                    Ok(event) => report.extend(event),
                    Err(e) => report.push(SessionEvent::Error(e.to_string())),
                },
                Step::Remote(event) => {
                    let kind = event.kind();
                    match self.engine.apply_remote(event) {
                        Ok(RemoteOutcome::Applied) => report.push(SessionEvent::RemoteApplied { kind }),
                        Ok(RemoteOutcome::Ignored) => {}
                        Err(e) => report.push(SessionEvent::Error(e.to_string())),
                    }
                }
            }

            if let Err(e) = self.engine.tick().await {
                report.push(SessionEvent::Error(e.to_string()));
            }
            if let Err(e) = self.flush() {
                report.push(SessionEvent::Error(e.to_string()));
            }
            for event in report {
                if events.send(event).is_err() {
                    debug!("front end stopped listening");
                }
            }
        }

        self.close();
        let _ = events.send(SessionEvent::Closed);
    }
}

/// Handle for talking to a session thread
pub struct SessionHandle {
    command_tx: tokio_mpsc::UnboundedSender<SessionCommand>,
    event_rx: std_mpsc::Receiver<SessionEvent>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Non-blocking check for session events
    pub fn poll_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block until the next event or until `timeout` passes
    pub fn wait_event(&self, timeout: Duration) -> Option<SessionEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn send_command(&self, command: SessionCommand) -> Result<(), SyncError> {
        self.command_tx
            .send(command)
            .map_err(|_| SyncError::Channel("session thread has stopped".into()))
    }

    /// Ask the session to stop and wait for its thread
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("session thread panicked");
            }
        }
    }
}

/// Open `diagram_id` on a new thread with its own current-thread runtime
/// and an in-memory canvas.
pub fn spawn_session<S: ModelStore + 'static>(diagram_id: DiagramId, store: S, hub: RoomHub) -> SessionHandle {
    let (event_tx, event_rx) = std_mpsc::channel();
    let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();

    let thread = thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                let _ = event_tx.send(SessionEvent::Error(format!("failed to create tokio runtime: {e}")));
                return;
            }
        };

        rt.block_on(async move {
            match Session::open(diagram_id.clone(), store, MemoryCanvas::new(), hub.client()).await {
                Ok(session) => {
                    let model = session.engine().model();
                    let _ = event_tx.send(SessionEvent::Ready {
                        diagram_id,
                        classes: model.classes.len(),
                        links: model.links.len(),
                    });
                    session.run(command_rx, event_tx).await;
                }
                Err(e) => {
                    let _ = event_tx.send(SessionEvent::Error(e.to_string()));
                    let _ = event_tx.send(SessionEvent::Closed);
                }
            }
        });
    });

    SessionHandle { command_tx, event_rx, thread: Some(thread) }
}
