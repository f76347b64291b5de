//! In-Flight Registry
//!
//! Coalesces concurrent requests for the same key into one running task.
//!
//! The first caller for a key registers a task and spawns its operation; every
//! caller arriving before it completes awaits a clone of the same shared
//! future. The spawned task removes its own registration when it finishes,
//! fails, panics or is aborted, so entries never leak.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FetchError, Result};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T>>>;
type TaskMap<T> = HashMap<String, FetchTask<T>>;

// == Fetch Task ==
/// One running operation and the handle its waiters await.
struct FetchTask<T> {
    id: u64,
    result: SharedFetch<T>,
    cancel: CancellationToken,
}

// == In-Flight Registry ==
pub struct InFlightRegistry<T> {
    tasks: Arc<Mutex<TaskMap<T>>>,
    next_id: AtomicU64,
    coalesced: AtomicU64,
    /// Parent of every task token; cancelled on shutdown
    root: CancellationToken,
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    // == Join Or Start ==
    /// Awaits the running task for `key`, or starts one with `operation`.
    ///
    /// Lookup and registration happen under one lock, so exactly one caller
    /// per key invokes its `operation`; the others drop theirs unused.
    /// `operation` receives the task's cancellation token.
    ///
    /// Dropping the returned future only detaches this caller. The task keeps
    /// running until it completes or [`cancel`](Self::cancel) is called.
    /// After [`shutdown`](Self::shutdown) no operation is started.
    pub async fn join_or_start<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if self.is_shut_down() {
            debug!(key, "Registry shut down, not starting fetch");
            return Err(FetchError::Cancelled);
        }

        let result = {
            let mut tasks = self.lock();

            match tasks.get(key) {
                Some(task) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "Joining in-flight fetch");
                    task.result.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let cancel = self.root.child_token();
                    let guard = Deregister {
                        tasks: Arc::clone(&self.tasks),
                        key: key.to_string(),
                        id,
                    };

                    let operation = operation(cancel.clone());
                    let handle = tokio::spawn(async move {
                        let _guard = guard;
                        operation.await
                    });
                    let result = async move {
                        match handle.await {
                            Ok(outcome) => outcome,
                            Err(err) if err.is_cancelled() => Err(FetchError::Cancelled),
                            Err(err) => Err(FetchError::Internal(format!("fetch task failed: {}", err))),
                        }
                    }
                    .boxed()
                    .shared();

                    tasks.insert(
                        key.to_string(),
                        FetchTask {
                            id,
                            result: result.clone(),
                            cancel,
                        },
                    );
                    debug!(key, id, "Started fetch task");
                    result
                }
            }
        };

        result.await
    }

    // == Cancellation ==
    /// Cancels the running task for `key`. Every waiter receives
    /// [`FetchError::Cancelled`]. Returns false if nothing was in flight.
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().get(key) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every running task and every task started afterwards.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    // == Accessors ==
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of callers that joined an existing task.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, TaskMap<T>> {
        lock_tasks(&self.tasks)
    }
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock_tasks<T>(tasks: &Mutex<TaskMap<T>>) -> MutexGuard<'_, TaskMap<T>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

// == Deregistration Guard ==
/// Removes the task registration when the spawned operation ends, however it ends.
struct Deregister<T> {
    tasks: Arc<Mutex<TaskMap<T>>>,
    key: String,
    id: u64,
}

impl<T> Drop for Deregister<T> {
    fn drop(&mut self) {
        let mut tasks = lock_tasks(&self.tasks);
        // A newer task may already own the key
        if tasks.get(&self.key).map(|task| task.id) == Some(self.id) {
            tasks.remove(&self.key);
        }
    }
}
