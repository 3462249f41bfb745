//! Keeping a diagram canvas, the Model Store and other sessions in step.
//!
//! - [`store`]: the Model Store client trait, an HTTP client and an in-memory store
//! - [`realtime`]: per-diagram broadcast rooms and the real-time event shapes
//! - [`engine`]: the Sync Engine
//! - [`session`]: an engine wired to a room, optionally on its own thread

pub mod engine;
pub mod error;
pub mod realtime;
pub mod session;
pub mod store;

pub use engine::{ImportError, ImportReport, RemoteOutcome, SyncEngine, grid_position};
pub use error::{StoreError, StoreResult, SyncError};
pub use realtime::{ChannelClient, ConstructParts, ROOM_CAPACITY, RealtimeEvent, RoomHub};
pub use session::{Session, SessionCommand, SessionEvent, SessionHandle, spawn_session};
pub use store::{HttpStore, MemoryStore, ModelStore, StoreOp};
