//! # Polyphony Core
//!
//! Core data model for the polyphony behavioral-programming runtime.
//!
//! This crate contains:
//! - Event bounds for the selection loop
//! - Sync specs: what a b-thread posts, waits for, blocks, and runs at
//!   each synchronization point
//! - Fault values exchanged between async operations and b-thread bodies
//!
//! This crate does NOT care about:
//! - How b-thread bodies are suspended and resumed
//! - When async operations are started or cancelled
//! - Which posted event wins a selection round
//!
//! All of that lives in `polyphony-runtime`.

pub mod error;
pub mod event;
pub mod sync;

pub use error::Fault;
pub use event::Event;
pub use sync::{Op, OpFuture, SyncSpec};
