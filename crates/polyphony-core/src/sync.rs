//! Sync specs: what a b-thread declares at each synchronization point.
//!
//! A spec carries four declarations:
//! - `post`: events this thread requests, in preference order
//! - `wait`: a predicate marking events that should advance this thread
//! - `block`: a predicate vetoing events from selection while the spec
//!   is current
//! - `exec`: an optional async operation started when the spec becomes
//!   current; its success value enters this thread's post list, its
//!   failure is thrown back into the body

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::error::Fault;
use crate::event::Event;

/// Future produced by an async operation attached to a sync spec.
pub type OpFuture<E> = BoxFuture<'static, Result<E, Fault>>;

/// Deferred async operation: a thunk the runtime invokes once the spec
/// it rides on becomes current.
pub type Op<E> = Box<dyn FnOnce() -> OpFuture<E> + Send>;

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send>;

/// One b-thread's declaration at a sync point.
///
/// Missing predicates default to "never" and the post list to empty, so
/// `SyncSpec::new()` is an inert spec that suspends its thread until the
/// system shuts down.
pub struct SyncSpec<E> {
    post: Vec<E>,
    wait: Option<Predicate<E>>,
    block: Option<Predicate<E>>,
    exec: Option<Op<E>>,
}

impl<E: Event> SyncSpec<E> {
    /// An empty spec: no posts, never waits, never blocks, no operation.
    pub fn new() -> Self {
        Self {
            post: Vec::new(),
            wait: None,
            block: None,
            exec: None,
        }
    }

    /// Request that `event` be selected. Earlier posts on the same spec
    /// are preferred over later ones.
    pub fn with_post(mut self, event: E) -> Self {
        self.post.push(event);
        self
    }

    /// Request several events, in preference order.
    pub fn with_posts(mut self, events: impl IntoIterator<Item = E>) -> Self {
        self.post.extend(events);
        self
    }

    /// Advance the owning thread when a selected event matches.
    pub fn with_wait(mut self, wait: impl Fn(&E) -> bool + Send + 'static) -> Self {
        self.wait = Some(Box::new(wait));
        self
    }

    /// Veto matching events from selection while this spec is current.
    pub fn with_block(mut self, block: impl Fn(&E) -> bool + Send + 'static) -> Self {
        self.block = Some(Box::new(block));
        self
    }

    /// Attach an async operation, started when this spec becomes
    /// current. On success its value is appended to this spec's post
    /// list; on failure the fault is thrown into the body at the sync
    /// point. The operation is cancelled if an event advances the
    /// thread first.
    pub fn with_exec<F, Fut>(mut self, op: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<E, Fault>> + Send + 'static,
    {
        self.exec = Some(Box::new(move || Box::pin(op())));
        self
    }

    /// Events this spec asks to have selected, in preference order.
    pub fn posts(&self) -> &[E] {
        &self.post
    }

    /// Whether `event` satisfies the wait predicate.
    pub fn wait_matches(&self, event: &E) -> bool {
        self.wait.as_ref().is_some_and(|wait| wait(event))
    }

    /// Whether this spec vetoes `event`.
    pub fn blocks(&self, event: &E) -> bool {
        self.block.as_ref().is_some_and(|block| block(event))
    }

    /// Whether a selected `event` should advance the owning thread:
    /// membership in the post list and a wait match are one OR'd
    /// condition.
    pub fn advances_on(&self, event: &E) -> bool {
        self.post.iter().any(|posted| posted == event) || self.wait_matches(event)
    }

    /// Append an event to the back of the post list. The runtime feeds a
    /// completed operation's value into the selection channel this way.
    pub fn push_post(&mut self, event: E) {
        self.post.push(event);
    }

    /// Take the not-yet-started operation out of the spec, if any.
    pub fn take_exec(&mut self) -> Option<Op<E>> {
        self.exec.take()
    }

    /// Whether an operation is attached and not yet started.
    pub fn has_exec(&self) -> bool {
        self.exec.is_some()
    }
}

impl<E: Event> Default for SyncSpec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> std::fmt::Debug for SyncSpec<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSpec")
            .field("post", &self.post)
            .field("wait", &self.wait.is_some())
            .field("block", &self.block.is_some())
            .field("exec", &self.exec.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_spec_is_inert() {
        let spec: SyncSpec<&str> = SyncSpec::new();
        assert!(spec.posts().is_empty());
        assert!(!spec.wait_matches(&"e"));
        assert!(!spec.blocks(&"e"));
        assert!(!spec.has_exec());
        assert!(!spec.advances_on(&"e"));
    }

    #[test]
    fn test_posts_keep_declaration_order() {
        let spec = SyncSpec::new().with_post("a").with_posts(["b", "c"]);
        assert_eq!(spec.posts().to_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_advances_on_post_or_wait() {
        let spec = SyncSpec::new().with_post("a").with_wait(|e| *e == "b");
        assert!(spec.advances_on(&"a"));
        assert!(spec.advances_on(&"b"));
        assert!(!spec.advances_on(&"c"));
    }

    #[test]
    fn test_take_exec_consumes_the_thunk() {
        let mut spec: SyncSpec<&str> = SyncSpec::new().with_exec(|| async { Ok("v") });
        assert!(spec.has_exec());
        assert!(spec.take_exec().is_some());
        assert!(!spec.has_exec());
        assert!(spec.take_exec().is_none());
    }
}
