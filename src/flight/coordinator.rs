//! Deduplication Coordinator
//!
//! Runs at most one producer per key and fans its outcome out to every
//! caller that asked for the same key while it was running.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{GroupError, Result};
use crate::flight::call::{unregister, InFlightCall, Interest, Registry, Settled};
use crate::flight::Outcome;

// == Coordinator ==
/// Per-key call deduplication.
///
/// The first caller for a key becomes the initiator: it registers an
/// in-flight call and spawns the producer on the tokio runtime. Callers that
/// arrive while the call is registered join it and receive a clone of the
/// same outcome. The registry lock is only held to look up, insert or remove
/// a call, never while waiting.
pub struct Coordinator<K, V, E> {
    calls: Registry<K, V, E>,
}

impl<K, V, E> Default for Coordinator<K, V, E> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V, E> fmt::Debug for Coordinator<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

impl<K, V, E> Coordinator<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    // == Execute ==
    /// Executes `producer` for `key`, or joins the execution already running.
    ///
    /// The producer receives a run token that is cancelled only once every
    /// caller waiting on the execution has gone away. A caller whose own
    /// `ctx` fires stops waiting and gets [`GroupError::Cancelled`]; the
    /// execution carries on for the others.
    ///
    /// Once every waiter has gone away the call is unregistered, so the next
    /// caller for `key` starts a fresh execution. A producer that panics,
    /// either while building its future or while running it, settles the
    /// call with [`GroupError::Panicked`].
    ///
    /// Must be called from within a tokio runtime.
    pub async fn execute<F, Fut>(
        &self,
        key: K,
        ctx: &CancellationToken,
        producer: F,
    ) -> Result<Outcome<V>, E>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        if ctx.is_cancelled() {
            return Err(GroupError::Cancelled);
        }

        let (call, sender) = {
            let mut calls = self.calls.lock();
            match calls.get(&key) {
                Some(call) => {
                    call.join();
                    (call.clone(), None)
                }
                None => {
                    let (call, tx) = InFlightCall::new();
                    calls.insert(key.clone(), call.clone());
                    (call, Some(tx))
                }
            }
        };
        let interest = Interest::new(self.calls.clone(), key.clone(), call.clone());
        let mut result = call.subscribe();

        match sender {
            Some(tx) => {
                debug!("Initiating call");
                let run_token = call.run_token();
                match std::panic::catch_unwind(AssertUnwindSafe(|| producer(run_token))) {
                    Ok(fut) => self.drive(key.clone(), call.clone(), tx, fut),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!(%message, "Producer panicked before returning a future");
                        unregister(&self.calls, &key, &call);
                        tx.send_replace(Some(Err(GroupError::Panicked(message))));
                    }
                }
            }
            None => {
                drop(producer);
                debug!("Joining in-flight call");
            }
        }

        tokio::select! {
            biased;
            settled = result.wait_for(Option::is_some) => {
                interest.settle();
                let outcome = match settled {
                    Ok(slot) => (*slot).clone().unwrap_or(Err(GroupError::Abandoned)),
                    Err(_) => {
                        warn!("In-flight call abandoned");
                        unregister(&self.calls, &key, &call);
                        Err(GroupError::Abandoned)
                    }
                };
                outcome.map(|value| Outcome {
                    value,
                    shared: call.is_shared(),
                })
            }
            _ = ctx.cancelled() => {
                debug!("Caller cancelled while waiting");
                Err(GroupError::Cancelled)
            }
        }
    }

    /// Number of calls currently registered.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Spawns the producer future and publishes its outcome once it returns.
    fn drive<Fut>(
        &self,
        key: K,
        call: Arc<InFlightCall<V, E>>,
        tx: watch::Sender<Settled<V, E>>,
        fut: Fut,
    ) where
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        let calls = self.calls.clone();
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(GroupError::Producer(err)),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(%message, "Producer panicked");
                    Err(GroupError::Panicked(message))
                }
            };
            unregister(&calls, &key, &call);
            tx.send_replace(Some(outcome));
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
