//! Session persistence for axon.
//!
//! A session is a long-lived conversation bound to a workspace and an
//! append-only event log. The store keeps a JSON index of sessions plus,
//! per session, an `<id>.events.jsonl` log and an `<id>.state.json`
//! checkpoint. Persistence is at-least-once; consumers are idempotent.

pub mod store;

pub use store::{SessionEntry, SessionStore};
