//! # Polyphony Runtime
//!
//! A behavioral-programming scheduler: a dynamic set of cooperative
//! b-threads coordinated through a shared, turn-based event selection
//! loop, extended with interruptible async operations whose completion
//! values feed back into the event stream.
//!
//! This crate contains:
//! - The body↔scheduler suspension protocol and per-thread records
//! - The async operation runner (start, harvest, synchronous cancel)
//! - Dynamic admission of b-threads into a running system
//! - The turn algorithm (harvest → select → advance) and outer loop
//!
//! Entry point: [`run_system`]. The program body receives an
//! [`Admitter`] and registers behaviors; each behavior yields
//! [`SyncSpec`]s through its [`SyncHandle`] and is resumed with the
//! events the scheduler selects.

mod admission;
mod ops;
mod scheduler;
mod thread;

pub use admission::Admitter;
pub use scheduler::{run_system, run_system_with_config, RuntimeError, SchedulerConfig};
pub use thread::SyncHandle;

// Re-export the core data model so applications depend on one crate.
pub use polyphony_core::{Event, Fault, Op, OpFuture, SyncSpec};

/// Convenient imports for applications.
pub mod prelude {
    pub use crate::{
        run_system, run_system_with_config, Admitter, Event, Fault, RuntimeError, SchedulerConfig,
        SyncHandle, SyncSpec,
    };
}
