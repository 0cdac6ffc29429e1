//! Background actors
//!
//! Each actor runs as an independent tokio task and is driven through a
//! cloneable handle wrapping its mpsc command channel.
//!
//! ## Actor Types
//!
//! - **SnapshotActor**: rewrites the snapshot file on a fixed period when the
//!   collector runs with periodic persistence
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod snapshot;
