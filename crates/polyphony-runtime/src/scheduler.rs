//! The selection loop.
//!
//! One scheduler cycle merges pending admissions, then runs turns until a
//! turn makes no progress. A turn has three phases, in order: harvest
//! finished operations, select an event under the blocking constraints,
//! advance every thread the selection affects. Between cycles the
//! scheduler parks on the wake signal it shares with op tasks and the
//! admitter, or on the program body's completion.

use std::cmp::Reverse;
use std::future::Future;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use polyphony_core::{Event, Fault};

use crate::admission::{Admitter, Shared};
use crate::ops::{cancel_op, start_pending_op, try_take_result};
use crate::thread::{Bthread, StepOutcome};

/// Fatal scheduler failures surfaced from [`run_system`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The program body panicked or was torn down before the system went
    /// quiescent.
    #[error("program body failed: {0}")]
    Program(String),

    /// The configured turn budget was exhausted.
    #[error("turn limit of {0} exceeded")]
    TurnLimitExceeded(u64),

    /// Infrastructure failure inside the scheduler.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Tunables for a run. `Default` matches the classical model: priority-1
/// threads and no turn budget.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Priority given to threads admitted through [`Admitter::admit`].
    pub default_priority: i32,
    /// Upper bound on productive turns; `None` runs unbounded.
    pub turn_limit: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_priority: 1,
            turn_limit: None,
        }
    }
}

/// Run a behavioral program to quiescence and return its body's value.
///
/// `program` receives an [`Admitter`] and may register b-threads at any
/// point, synchronously or from its own async work. The call returns
/// once the body has returned, no requested event can be selected, no
/// async operation is live, and no admission is pending. A panic in the
/// body is fatal for the run; a fault inside an individual b-thread
/// terminates that thread only.
pub async fn run_system<E, V, F, Fut>(program: F) -> Result<V, RuntimeError>
where
    E: Event,
    V: Send + 'static,
    F: FnOnce(Admitter<E>) -> Fut,
    Fut: Future<Output = V> + Send + 'static,
{
    run_system_with_config(SchedulerConfig::default(), program).await
}

/// [`run_system`] with explicit tunables.
pub async fn run_system_with_config<E, V, F, Fut>(
    config: SchedulerConfig,
    program: F,
) -> Result<V, RuntimeError>
where
    E: Event,
    V: Send + 'static,
    F: FnOnce(Admitter<E>) -> Fut,
    Fut: Future<Output = V> + Send + 'static,
{
    let shared = Arc::new(Shared::new());
    let admitter = Admitter::new(Arc::clone(&shared), config.default_priority);
    let mut program_task = tokio::spawn(program(admitter));
    let mut scheduler = Scheduler {
        active: Vec::new(),
        shared,
        config,
        turns: 0,
    };

    let outcome = scheduler.drive(&mut program_task).await;
    if outcome.is_err() {
        program_task.abort();
    }
    outcome
}

struct Scheduler<E> {
    active: Vec<Bthread<E>>,
    shared: Arc<Shared<E>>,
    config: SchedulerConfig,
    turns: u64,
}

impl<E: Event> Scheduler<E> {
    /// Outer loop: cycle until the program body has returned and the
    /// system is quiescent.
    async fn drive<V>(&mut self, program: &mut JoinHandle<V>) -> Result<V, RuntimeError> {
        let mut program_out: Option<V> = None;
        loop {
            self.merge_pending().await;
            while self.turn().await? {}
            if self.has_pending().await {
                // New admissions may unblock progress; take another cycle.
                continue;
            }
            if let Some(value) = program_out.take() {
                if self.is_idle() {
                    return Ok(value);
                }
                program_out = Some(value);
                self.shared.wake.notified().await;
            } else {
                tokio::select! {
                    _ = self.shared.wake.notified() => {}
                    joined = &mut *program => {
                        program_out = Some(joined.map_err(join_failure)?);
                    }
                }
            }
        }
    }

    /// One turn: harvest, select, advance. Returns whether any progress
    /// was made.
    async fn turn(&mut self) -> Result<bool, RuntimeError> {
        let mut did_work = self.harvest_ops().await;
        if let Some(event) = self.select_event() {
            tracing::debug!(event = ?event, turn = self.turns, "event selected");
            self.advance_on(&event).await?;
            did_work = true;
        }
        if did_work {
            self.turns += 1;
            if let Some(limit) = self.config.turn_limit {
                if self.turns > limit {
                    return Err(RuntimeError::TurnLimitExceeded(limit));
                }
            }
        }
        Ok(did_work)
    }

    /// Phase A: fold finished operations back into their threads before
    /// selection, so results get a chance to influence the current turn.
    async fn harvest_ops(&mut self) -> bool {
        let mut did_work = false;
        let mut terminated = Vec::new();
        for idx in 0..self.active.len() {
            let Some(outcome) = try_take_result(&mut self.active[idx]) else {
                continue;
            };
            did_work = true;
            match outcome {
                Ok(value) => {
                    // The value competes for selection like any other
                    // post; the body stays suspended.
                    tracing::debug!(
                        thread = %self.active[idx].name(),
                        value = ?value,
                        "op completed"
                    );
                    self.active[idx].sync.push_post(value);
                }
                Err(fault) => {
                    tracing::debug!(
                        thread = %self.active[idx].name(),
                        error = %fault,
                        "op failed; fault thrown into body"
                    );
                    match self.active[idx].resume(Err(fault)).await {
                        StepOutcome::Yielded => {
                            start_pending_op(&mut self.active[idx], &self.shared.wake);
                        }
                        StepOutcome::Terminated => terminated.push(idx),
                    }
                }
            }
        }
        self.discard(terminated);
        did_work
    }

    /// Phase B: pick the first posted event, in priority order, that no
    /// live thread blocks. Priority ties fall to admission order; an
    /// event posted by several threads is considered once, at its first
    /// encounter.
    fn select_event(&self) -> Option<E> {
        let mut order: Vec<usize> = (0..self.active.len()).collect();
        order.sort_by_key(|&idx| Reverse(self.active[idx].priority()));
        let mut considered: Vec<&E> = Vec::new();
        for &idx in &order {
            for candidate in self.active[idx].sync.posts() {
                if considered.iter().any(|seen| *seen == candidate) {
                    continue;
                }
                considered.push(candidate);
                if !self.active.iter().any(|t| t.sync.blocks(candidate)) {
                    return Some(candidate.clone());
                }
            }
        }
        None
    }

    /// Phase C: advance every thread whose current spec posts or waits
    /// on the selected event, cancelling its live operation first. The
    /// affected set is snapshotted before any advance, so specs yielded
    /// during this phase take effect next turn.
    async fn advance_on(&mut self, event: &E) -> Result<(), RuntimeError> {
        let affected: Vec<usize> = self
            .active
            .iter()
            .enumerate()
            .filter(|(_, thread)| thread.sync.advances_on(event))
            .map(|(idx, _)| idx)
            .collect();
        let mut terminated = Vec::new();
        for idx in affected {
            cancel_op(&mut self.active[idx]).await?;
            match self.active[idx].resume(Ok(event.clone())).await {
                StepOutcome::Yielded => {
                    start_pending_op(&mut self.active[idx], &self.shared.wake);
                }
                StepOutcome::Terminated => terminated.push(idx),
            }
        }
        self.discard(terminated);
        Ok(())
    }

    /// Drop terminated threads, preserving admission order of the rest.
    fn discard(&mut self, mut indices: Vec<usize>) {
        indices.sort_unstable();
        for idx in indices.into_iter().rev() {
            let thread = self.active.remove(idx);
            tracing::debug!(thread = %thread.name(), "b-thread terminated");
        }
    }

    async fn merge_pending(&mut self) {
        let mut pending = self.shared.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "merging admitted b-threads");
            self.active.append(&mut pending);
        }
    }

    async fn has_pending(&self) -> bool {
        !self.shared.pending.lock().await.is_empty()
    }

    /// Quiescence check for the post-program phase: no live operation
    /// remains. Selectable events and pending admissions are already
    /// ruled out by the turn fixed point and the pending check.
    fn is_idle(&self) -> bool {
        self.active.iter().all(|thread| !thread.op.is_running())
    }
}

fn join_failure(err: JoinError) -> RuntimeError {
    if err.is_panic() {
        RuntimeError::Program(Fault::from_panic(err.into_panic()).message().to_string())
    } else {
        RuntimeError::Program(err.to_string())
    }
}
