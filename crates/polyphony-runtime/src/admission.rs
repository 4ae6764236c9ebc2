//! Dynamic admission of b-threads.
//!
//! The admitter is handed to the program body and may be cloned into
//! behaviors. Admission steps the new body to its first sync point,
//! starts its queued operation, parks the record on the pending list,
//! and pings the wake signal; the scheduler merges pending records at
//! the top of its next cycle, so a new thread never influences the turn
//! in flight.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use polyphony_core::{Event, Fault};

use crate::ops::start_pending_op;
use crate::thread::{Bthread, SyncHandle};

/// State shared between the scheduler, the admitter, and op tasks.
pub(crate) struct Shared<E> {
    pub(crate) pending: Mutex<Vec<Bthread<E>>>,
    pub(crate) wake: Arc<Notify>,
}

impl<E> Shared<E> {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            wake: Arc::new(Notify::new()),
        }
    }
}

/// Handle for registering b-threads with a running system.
///
/// Obtained by the program body passed to [`run_system`]; clones may be
/// captured by behaviors that admit peers when advanced.
///
/// [`run_system`]: crate::run_system
pub struct Admitter<E> {
    shared: Arc<Shared<E>>,
    default_priority: i32,
}

impl<E> Clone for Admitter<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            default_priority: self.default_priority,
        }
    }
}

impl<E: Event> Admitter<E> {
    pub(crate) fn new(shared: Arc<Shared<E>>, default_priority: i32) -> Self {
        Self {
            shared,
            default_priority,
        }
    }

    /// Admit a b-thread with the default priority.
    ///
    /// The behavior runs to its first sync point before this returns; a
    /// behavior that finishes without syncing is dropped silently. The
    /// new thread takes part in selection from the scheduler's next
    /// cycle on.
    pub async fn admit<F, Fut>(&self, name: &str, behavior: F)
    where
        F: FnOnce(SyncHandle<E>) -> Fut,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.admit_with_priority(name, self.default_priority, behavior)
            .await;
    }

    /// Admit a b-thread with an explicit priority. Higher priorities win
    /// selection ties across threads; equal priorities fall back to
    /// admission order.
    pub async fn admit_with_priority<F, Fut>(&self, name: &str, priority: i32, behavior: F)
    where
        F: FnOnce(SyncHandle<E>) -> Fut,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        let Some(mut thread) = Bthread::spawn(name, priority, behavior).await else {
            return;
        };
        start_pending_op(&mut thread, &self.shared.wake);
        tracing::debug!(thread = %name, priority, "b-thread admitted");
        self.shared.pending.lock().await.push(thread);
        self.shared.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyphony_core::SyncSpec;

    #[test]
    fn test_admitted_thread_lands_on_the_pending_list() {
        tokio_test::block_on(async {
            let shared = Arc::new(Shared::new());
            let admitter = Admitter::new(Arc::clone(&shared), 1);

            admitter
                .admit("parked", |mut hx: SyncHandle<&str>| async move {
                    let _ = hx.sync(SyncSpec::new()).await;
                    Ok(())
                })
                .await;

            let pending = shared.pending.lock().await;
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].name(), "parked");
            assert_eq!(pending[0].priority(), 1);
        });
    }

    #[test]
    fn test_empty_behavior_is_dropped_silently() {
        tokio_test::block_on(async {
            let shared = Arc::new(Shared::<&str>::new());
            let admitter = Admitter::new(Arc::clone(&shared), 1);

            admitter
                .admit("vanishes", |_hx| async move { Ok(()) })
                .await;

            assert!(shared.pending.lock().await.is_empty());
        });
    }

    #[test]
    fn test_admission_starts_the_queued_op() {
        tokio_test::block_on(async {
            let shared = Arc::new(Shared::<&str>::new());
            let admitter = Admitter::new(Arc::clone(&shared), 1);

            admitter
                .admit("op-carrier", |mut hx: SyncHandle<&str>| async move {
                    let _ = hx
                        .sync(SyncSpec::new().with_exec(|| async { Ok("value") }))
                        .await;
                    Ok(())
                })
                .await;

            let pending = shared.pending.lock().await;
            assert!(pending[0].op.is_running());
        });
    }
}
