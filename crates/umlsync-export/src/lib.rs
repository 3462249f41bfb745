//! Interchange codec for umlsync diagrams.
//!
//! [`encode`] writes an XMI 2.0 document; [`decode`] reads XMI 2.0 or
//! legacy UML 1.x documents into an [`ImportPlan`] that the sync engine
//! replays through its ordinary create operations.

pub mod decode;
pub mod encode;
pub mod plan;
pub mod xml;

pub use decode::{DecodeError, decode};
pub use encode::{EncodeError, EncodeWarning, Encoded, encode, encode_with_report};
pub use plan::{ImportIssue, ImportPlan, PlannedClass, PlannedLink, PlannedRelationship};
