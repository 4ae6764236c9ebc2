//! B-thread bodies and their runtime records.
//!
//! A body is an async task that talks to the scheduler over a channel
//! pair: it yields a `SyncSpec` together with a one-shot reply slot, then
//! suspends until the scheduler resumes it with the selected event or
//! throws a fault at the sync point. `Bthread` is the scheduler-side
//! record holding the channel endpoints and the spec the body most
//! recently yielded.

use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use polyphony_core::{Event, Fault, SyncSpec};

use crate::ops::OpState;

/// What a body sends the scheduler at each sync point.
pub(crate) struct StepYield<E> {
    pub(crate) spec: SyncSpec<E>,
    pub(crate) reply: oneshot::Sender<Result<E, Fault>>,
}

/// Body-side handle for yielding sync specs.
///
/// Handed to the behavior closure passed to [`Admitter::admit`]. Each
/// call to [`SyncHandle::sync`] suspends the body until an event that
/// posts to or wakes this thread is selected.
///
/// [`Admitter::admit`]: crate::Admitter::admit
pub struct SyncHandle<E> {
    tx: mpsc::Sender<StepYield<E>>,
}

impl<E: Event> SyncHandle<E> {
    pub(crate) fn new(tx: mpsc::Sender<StepYield<E>>) -> Self {
        Self { tx }
    }

    /// Yield `spec` and suspend until the scheduler resumes this thread.
    ///
    /// Returns the selected event, or the fault of a failed async
    /// operation thrown back at this sync point. Propagating the fault
    /// with `?` terminates the b-thread; matching on it and syncing
    /// again keeps it alive.
    pub async fn sync(&mut self, spec: SyncSpec<E>) -> Result<E, Fault> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let step = StepYield {
            spec,
            reply: reply_tx,
        };
        if self.tx.send(step).await.is_err() {
            return Err(Fault::new("scheduler shut down"));
        }
        match reply_rx.await {
            Ok(resume) => resume,
            Err(_) => Err(Fault::new("scheduler shut down")),
        }
    }
}

/// Outcome of stepping a body once.
pub(crate) enum StepOutcome {
    /// The body yielded a new sync spec, now stored on the record.
    Yielded,
    /// The body returned or failed; the record should be discarded.
    Terminated,
}

/// Scheduler-side record for one live b-thread.
pub(crate) struct Bthread<E> {
    name: String,
    priority: i32,
    pub(crate) sync: SyncSpec<E>,
    pub(crate) op: OpState<E>,
    reply: Option<oneshot::Sender<Result<E, Fault>>>,
    yields: mpsc::Receiver<StepYield<E>>,
    task: JoinHandle<()>,
}

impl<E: Event> Bthread<E> {
    /// Spawn `behavior` and step it to its first sync point. Returns
    /// `None` for a body that finishes without ever syncing.
    pub(crate) async fn spawn<F, Fut>(name: &str, priority: i32, behavior: F) -> Option<Self>
    where
        F: FnOnce(SyncHandle<E>) -> Fut,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        let (tx, mut yields) = mpsc::channel(1);
        let body = behavior(SyncHandle::new(tx));
        let thread_name = name.to_string();
        let task = tokio::spawn(async move {
            if let Err(fault) = body.await {
                tracing::warn!(thread = %thread_name, error = %fault, "b-thread terminated with fault");
            }
        });
        match yields.recv().await {
            Some(StepYield { spec, reply }) => Some(Self {
                name: name.to_string(),
                priority,
                sync: spec,
                op: OpState::Idle,
                reply: Some(reply),
                yields,
                task,
            }),
            None => {
                tracing::debug!(thread = %name, "behavior finished without syncing; not admitted");
                None
            }
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    /// Resume the body with the selected event or a fault and run it to
    /// its next sync point.
    pub(crate) async fn resume(&mut self, input: Result<E, Fault>) -> StepOutcome {
        let Some(reply) = self.reply.take() else {
            return StepOutcome::Terminated;
        };
        if reply.send(input).is_err() {
            return StepOutcome::Terminated;
        }
        match self.yields.recv().await {
            Some(StepYield { spec, reply }) => {
                self.sync = spec;
                self.reply = Some(reply);
                StepOutcome::Yielded
            }
            None => StepOutcome::Terminated,
        }
    }
}

impl<E> Drop for Bthread<E> {
    fn drop(&mut self) {
        // A suspended body would observe the closed reply channel; abort
        // also covers a body parked on unrelated work during teardown.
        self.task.abort();
    }
}
