//! In-Flight Call Module
//!
//! State shared by every caller waiting on one producer execution.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::GroupError;

/// Settled outcome broadcast to every waiter.
pub(crate) type Settled<V, E> = Option<Result<V, GroupError<E>>>;

/// Calls currently registered, by key.
pub(crate) type Registry<K, V, E> = Arc<Mutex<HashMap<K, Arc<InFlightCall<V, E>>>>>;

/// Removes `call` from the registry if it is still the one registered
/// under `key`.
pub(crate) fn unregister<K, V, E>(
    calls: &Registry<K, V, E>,
    key: &K,
    call: &Arc<InFlightCall<V, E>>,
) where
    K: Hash + Eq,
{
    let mut calls = calls.lock();
    if calls
        .get(key)
        .is_some_and(|registered| Arc::ptr_eq(registered, call))
    {
        calls.remove(key);
    }
}

// == In-Flight Call ==
/// One producer execution and the callers interested in it.
///
/// The result slot is a `watch` channel: it is level-triggered, so a caller
/// that subscribes after the value was published still observes it.
#[derive(Debug)]
pub(crate) struct InFlightCall<V, E> {
    /// Receiving half of the settle-once result slot
    result: watch::Receiver<Settled<V, E>>,
    /// Callers still waiting; the run token is cancelled when it drops to zero
    waiters: AtomicUsize,
    /// Callers that ever joined, used for the `shared` flag
    callers: AtomicUsize,
    /// Token handed to the producer
    run_token: CancellationToken,
}

impl<V, E> InFlightCall<V, E> {
    // == Constructor ==
    /// Creates a call owned by its initiator, returning the sender that
    /// publishes the outcome.
    pub(crate) fn new() -> (Arc<Self>, watch::Sender<Settled<V, E>>) {
        let (tx, rx) = watch::channel(None);
        let call = Arc::new(Self {
            result: rx,
            waiters: AtomicUsize::new(1),
            callers: AtomicUsize::new(1),
            run_token: CancellationToken::new(),
        });
        (call, tx)
    }

    // == Join ==
    /// Registers one more interested caller.
    ///
    /// Must be called while the registry lock is held, so that no caller
    /// joins after the call has been unregistered.
    pub(crate) fn join(&self) {
        self.callers.fetch_add(1, Ordering::SeqCst);
        self.waiters.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn run_token(&self) -> CancellationToken {
        self.run_token.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Settled<V, E>> {
        self.result.clone()
    }

    /// True when more than one caller joined this call.
    pub(crate) fn is_shared(&self) -> bool {
        self.callers.load(Ordering::SeqCst) > 1
    }

    #[cfg(test)]
    pub(crate) fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Drops one waiter, returning true if it was the last one.
    fn leave(&self) -> bool {
        self.waiters.fetch_sub(1, Ordering::SeqCst) == 1
    }
}

// == Interest ==
/// Drop guard for one waiter's interest in a call.
///
/// Dropping it before [`Interest::settle`] counts as the waiter leaving,
/// whether it left because its token fired or because its future was
/// dropped. The last waiter to leave unregisters the call and cancels its
/// run token, so the next caller for the key starts a fresh execution
/// instead of joining one nobody wants anymore.
pub(crate) struct Interest<K, V, E>
where
    K: Hash + Eq,
{
    calls: Registry<K, V, E>,
    key: K,
    call: Arc<InFlightCall<V, E>>,
    settled: bool,
}

impl<K, V, E> Interest<K, V, E>
where
    K: Hash + Eq,
{
    pub(crate) fn new(calls: Registry<K, V, E>, key: K, call: Arc<InFlightCall<V, E>>) -> Self {
        Self {
            calls,
            key,
            call,
            settled: false,
        }
    }

    /// Marks the wait as finished with a published outcome.
    pub(crate) fn settle(mut self) {
        self.settled = true;
    }
}

impl<K, V, E> Drop for Interest<K, V, E>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        // Joins happen under the registry lock, so leaving does too
        let abandoned = {
            let mut calls = self.calls.lock();
            let last = self.call.leave();
            if last
                && calls
                    .get(&self.key)
                    .is_some_and(|registered| Arc::ptr_eq(registered, &self.call))
            {
                calls.remove(&self.key);
            }
            last
        };

        if abandoned {
            debug!("Last waiter left, cancelling producer");
            self.call.run_token.cancel();
        }
    }
}
