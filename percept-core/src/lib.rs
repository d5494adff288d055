//! Percept is a small publish/subscribe middleware for perception pipelines.
//!
//! It provides the pieces that every node in the graph relies on:
//!
//! 1. Publishers and Subscribers with an iterator-like subscription API
//! 2. The `SyncNode` and `AsyncNode` traits
//! 3. A tokio-backed runtime that tracks every spawned node
//! 4. A logging system with per-node log targets

pub mod logging;
pub mod node;
pub mod pubsub;
pub mod runtime;

pub use anyhow;
pub use log;
pub use tokio;
