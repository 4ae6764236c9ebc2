//! Event bounds for the selection loop.
//!
//! Events are opaque to the runtime: they are matched against posts by
//! equality and examined through caller-supplied predicates. The runtime
//! never interns or registers them.

use std::fmt::Debug;

/// Marker bound for application event types.
///
/// The runtime clones events to deliver one selection to several
/// b-threads and compares them with `PartialEq` to match posts against
/// the selected event. `Debug` feeds the tracing output.
pub trait Event: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T> Event for T where T: Clone + PartialEq + Debug + Send + Sync + 'static {}
