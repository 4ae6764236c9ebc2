//! Async operation runner.
//!
//! Starts the operation attached to a freshly-installed sync spec, tracks
//! its cancellation handle, and routes its terminal result back to the
//! scheduler through a one-shot cell plus the shared wake signal. The
//! cell is written at most once; cancellation drops the receiver, so a
//! result raced against a cancel is discarded rather than observed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use polyphony_core::{Event, Fault};

use crate::scheduler::RuntimeError;
use crate::thread::Bthread;

/// Execution state of a thread's async operation.
pub(crate) enum OpState<E> {
    /// No operation attached, or the previous one was consumed or
    /// cancelled.
    Idle,
    /// The operation is live in a background task.
    Running(RunningOp<E>),
}

impl<E> OpState<E> {
    pub(crate) fn is_running(&self) -> bool {
        matches!(self, OpState::Running(_))
    }
}

/// Handle on a live operation: cancellation capability, the task running
/// it, and the cell its terminal result lands in.
pub(crate) struct RunningOp<E> {
    token: CancellationToken,
    task: JoinHandle<()>,
    result: oneshot::Receiver<Result<E, Fault>>,
}

impl<E> Drop for RunningOp<E> {
    fn drop(&mut self) {
        // Releases the op task if the record is discarded mid-run.
        self.token.cancel();
    }
}

/// Start the operation queued on `thread`'s current spec, if any.
///
/// The spawned task runs the op under a cancellation token; on completion
/// it writes the terminal result exactly once and pings `wake` so the
/// scheduler reconsiders the thread. A panicking op is caught and
/// reported as a `Fault`.
pub(crate) fn start_pending_op<E: Event>(thread: &mut Bthread<E>, wake: &Arc<Notify>) {
    let Some(op) = thread.sync.take_exec() else {
        return;
    };
    let token = CancellationToken::new();
    let (result_tx, result_rx) = oneshot::channel();
    let task = tokio::spawn({
        let token = token.clone();
        let wake = Arc::clone(wake);
        async move {
            let run = AssertUnwindSafe(async move { op().await }).catch_unwind();
            tokio::select! {
                _ = token.cancelled() => {}
                outcome = run => {
                    let outcome = outcome.unwrap_or_else(|payload| Err(Fault::from_panic(payload)));
                    let _ = result_tx.send(outcome);
                    wake.notify_one();
                }
            }
        }
    });
    thread.op = OpState::Running(RunningOp {
        token,
        task,
        result: result_rx,
    });
}

/// Harvest the operation's terminal result if it has finished. Leaves a
/// still-running operation untouched.
pub(crate) fn try_take_result<E: Event>(thread: &mut Bthread<E>) -> Option<Result<E, Fault>> {
    let OpState::Running(running) = &mut thread.op else {
        return None;
    };
    match running.result.try_recv() {
        Ok(outcome) => {
            thread.op = OpState::Idle;
            Some(outcome)
        }
        Err(oneshot::error::TryRecvError::Empty) => None,
        Err(oneshot::error::TryRecvError::Closed) => {
            // The task ended without reporting; surfaced as a fault.
            thread.op = OpState::Idle;
            Some(Err(Fault::new("async operation dropped its result")))
        }
    }
}

/// Cancel the running operation, if any, and wait for its task to wind
/// down. The thread does not count as advanced until the task has
/// observed cancellation; any result the op produced concurrently is
/// discarded with the receiver.
pub(crate) async fn cancel_op<E: Event>(thread: &mut Bthread<E>) -> Result<(), RuntimeError> {
    let OpState::Running(mut running) = std::mem::replace(&mut thread.op, OpState::Idle) else {
        return Ok(());
    };
    running.token.cancel();
    (&mut running.task).await.map_err(|err| {
        RuntimeError::Internal(format!("op task failed during cancellation: {err}"))
    })?;
    Ok(())
}
