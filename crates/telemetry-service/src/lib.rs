//! Single-writer plumbing around the analytics engine.
//!
//! Each live session is owned by one actor task; membership notifications,
//! analytics queries, and the session-end request all go through its mailbox
//! in order. Session ends from different sessions meet at the shared
//! aggregate store, which serializes them.

pub mod actor;
pub mod state;

pub use actor::SessionHandle;
pub use state::{ArchivedSession, SessionReport, TelemetryService};
