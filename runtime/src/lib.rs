//! # Busline Runtime
//!
//! Runtime implementation for the Busline reducer architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns state behind a single-writer lock and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Reply Registry**: Hands each waiting caller the outcome of its own request
//!
//! ## Example
//!
//! ```ignore
//! use busline_runtime::Store;
//!
//! let store = Store::new(TicketState::seeded(), TicketReducer::new(), env);
//!
//! // Send an action
//! store.send(TicketAction::CancelTicket { .. }).await?;
//!
//! // Read state
//! let count = store.state(|s| s.len()).await;
//! ```

use busline_core::{effect::Effect, reducer::Reducer};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, oneshot, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// An effect execution failed
        ///
        /// This error is logged but does not halt the store.
        #[error("Effect execution failed: {0}")]
        EffectFailed(String),

        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// The reply channel closed before a matching action arrived
        #[error("Reply channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for waiting on the effects started by one `send()`
///
/// Actions fed back by effects are tracked by the same handle, so waiting
/// covers the whole cascade (e.g. a simulated round trip and the event it
/// produces).
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Ensures the counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type Matcher<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;

struct Waiter<A> {
    id: u64,
    matches: Matcher<A>,
    reply: oneshot::Sender<A>,
}

/// Callers blocked in `send_and_wait_for`, each with its own reply channel
///
/// Every effect-produced action is offered to every waiter; a waiter is
/// removed once its predicate matches, so no caller can miss its outcome
/// however many others finish at the same time.
struct Waiters<A> {
    next_id: AtomicU64,
    pending: Mutex<Vec<Waiter<A>>>,
}

impl<A: Clone> Waiters<A> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, matches: Matcher<A>) -> (u64, oneshot::Receiver<A>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply, rx) = oneshot::channel();
        self.lock().push(Waiter { id, matches, reply });
        (id, rx)
    }

    fn cancel(&self, id: u64) {
        self.lock().retain(|w| w.id != id);
    }

    fn deliver(&self, action: &A) {
        let ready = {
            let mut pending = self.lock();
            let (ready, waiting): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *pending).into_iter().partition(|w| (w.matches)(action));
            *pending = waiting;
            ready
        };

        for waiter in ready {
            // The caller may have given up already
            let _ = waiter.reply.send(action.clone());
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Waiter<A>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError, Waiters,
    };
    use std::future::Future;
    use std::pin::Pin;

    type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; the reducer runs under the write lock, so there
    ///    is one writer at a time)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Actions produced by effects are reduced first and handed to waiting
    /// callers second, so a caller that receives its outcome can already read
    /// the state it produced.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        waiters: Arc<Waiters<A>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Sync + Clone + std::fmt::Debug + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                waiters: Arc::new(Waiters::new()),
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects asynchronously
        ///
        /// `send()` returns after starting effect execution, not completion.
        /// Use the returned [`EffectHandle`] to wait for the effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(StoreError::ShutdownInProgress);
            }

            let (handle, tracking) = EffectHandle::new();
            self.send_tracked(action, tracking).await;
            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Registers a reply channel before sending (no lost results), then
        /// returns the first effect-produced action matching `predicate`.
        /// The reply is addressed to this caller alone, so concurrent
        /// requests never crowd each other out.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before a matching action arrived
        /// - [`StoreError::ChannelClosed`]: The reply channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool + Send + Sync + 'static,
        {
            let (id, reply) = self.waiters.register(Box::new(predicate));

            if let Err(error) = self.send(action).await {
                self.waiters.cancel(id);
                return Err(error);
            }

            match tokio::time::timeout(timeout, reply).await {
                Ok(Ok(action)) => Ok(action),
                Ok(Err(_)) => Err(StoreError::ChannelClosed),
                Err(_) => {
                    self.waiters.cancel(id);
                    Err(StoreError::Timeout)
                },
            }
        }

        /// Number of callers still waiting for an outcome
        #[must_use]
        pub fn waiting(&self) -> usize {
            self.waiters.len()
        }

        /// Read current state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Borrow the injected environment
        #[must_use]
        pub const fn environment(&self) -> &E {
            &self.environment
        }

        /// Stop accepting actions and wait for running effects to finish
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running if they do not finish within `timeout`.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.shutdown.store(true, Ordering::SeqCst);
            tracing::info!("Store shutdown initiated");

            let drain = async {
                while self.pending_effects.load(Ordering::SeqCst) > 0 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            };

            if tokio::time::timeout(timeout, drain).await.is_err() {
                let remaining = self.pending_effects.load(Ordering::SeqCst);
                tracing::warn!(remaining, "Store shutdown timed out");
                return Err(StoreError::ShutdownTimeout(remaining));
            }

            tracing::info!("Store shutdown complete");
            Ok(())
        }

        async fn send_tracked(&self, action: A, tracking: EffectTracking) {
            metrics::counter!("store.actions.sent").increment(1);
            tracing::trace!(?action, "Reducing action");

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut *state, action, &self.environment)
            };

            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }
        }

        /// Feed an effect-produced action back in, then answer waiting callers
        async fn feedback(&self, action: A, tracking: EffectTracking) {
            self.send_tracked(action.clone(), tracking).await;
            self.waiters.deliver(&action);
        }

        fn spawn_tracked<F>(&self, tracking: &EffectTracking, task: F)
        where
            F: FnOnce(Self, EffectTracking) -> BoxedTask,
        {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
            let fut = task(self.clone(), tracking.clone());
            let guard = DecrementGuard(tracking.clone());

            tokio::spawn(async move {
                let _guard = guard;
                let _pending_guard = pending_guard;
                fut.await;
            });
        }

        /// Execute an effect with tracking
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, feeds resulting action back if `Some`
        /// - `Delay`: Waits for duration, then feeds the action back
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    self.spawn_tracked(&tracking, move |store, tracking| {
                        Box::pin(async move {
                            if let Some(action) = fut.await {
                                store.feedback(action, tracking).await;
                            }
                        })
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!(?duration, "Executing Effect::Delay");
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    self.spawn_tracked(&tracking, move |store, tracking| {
                        Box::pin(async move {
                            tokio::time::sleep(duration).await;
                            store.feedback(*action, tracking).await;
                        })
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    self.spawn_tracked(&tracking, move |store, _tracking| {
                        Box::pin(async move {
                            for effect in effects {
                                let (mut handle, child) = EffectHandle::new();
                                store.execute_effect(effect, child);
                                handle.wait().await;
                            }
                        })
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                waiters: Arc::clone(&self.waiters),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use busline_core::{SmallVec, delay, effect::Effect, reducer::Reducer, smallvec};

    #[derive(Debug, Clone, Default)]
    struct TestState {
        value: i32,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        IncrementLater,
        Incremented,
        Both,
        InOrder,
        Mark(&'static str),
        FromFuture,
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::IncrementLater => smallvec![delay! {
                    duration: Duration::from_millis(50),
                    action: TestAction::Incremented
                }],
                TestAction::Incremented => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Both => smallvec![Effect::merge(vec![
                    Effect::Delay {
                        duration: Duration::from_millis(5),
                        action: Box::new(TestAction::Incremented),
                    },
                    Effect::Delay {
                        duration: Duration::from_millis(5),
                        action: Box::new(TestAction::Incremented),
                    },
                ])],
                TestAction::InOrder => smallvec![Effect::chain(vec![
                    Effect::Delay {
                        duration: Duration::from_millis(20),
                        action: Box::new(TestAction::Mark("first")),
                    },
                    Effect::Delay {
                        duration: Duration::from_millis(1),
                        action: Box::new(TestAction::Mark("second")),
                    },
                ])],
                TestAction::Mark(label) => {
                    state.log.push(label);
                    smallvec![Effect::None]
                },
                TestAction::FromFuture => {
                    smallvec![Effect::Future(Box::pin(async { Some(TestAction::Incremented) }))]
                },
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState::default(), TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn send_applies_reducer_synchronously() {
        let store = store();
        store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_action_is_applied_after_wait() {
        let store = store();
        let mut handle = store.send(TestAction::IncrementLater).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 0);

        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 1);
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_and_wait_for_sees_applied_state() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TestAction::IncrementLater,
                |a| matches!(a, TestAction::Incremented),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(result, TestAction::Incremented);
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_effects_all_run() {
        let store = store();
        let mut handle = store.send(TestAction::Both).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_effects_keep_order() {
        let store = store();
        let mut handle = store.send(TestAction::InOrder).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.log.clone()).await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn future_effect_feeds_back() {
        let store = store();
        let mut handle = store.send(TestAction::FromFuture).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_new_actions() {
        let store = store();
        let _ = store.send(TestAction::IncrementLater).await.unwrap();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(store.state(|s| s.value).await, 1);
        assert!(matches!(
            store.send(TestAction::Increment).await,
            Err(StoreError::ShutdownInProgress)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn every_concurrent_waiter_gets_its_outcome() {
        let store = store();
        let waiters: Vec<_> = (0..200)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .send_and_wait_for(
                            TestAction::IncrementLater,
                            |a| matches!(a, TestAction::Incremented),
                            Duration::from_secs(1),
                        )
                        .await
                })
            })
            .collect();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(TestAction::Incremented));
        }
        assert_eq!(store.state(|s| s.value).await, 200);
        assert_eq!(store.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_waiter_is_forgotten() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TestAction::Increment,
                |a| matches!(a, TestAction::Incremented),
                Duration::from_millis(10),
            )
            .await;

        assert_eq!(result, Err(StoreError::Timeout));
        assert_eq!(store.waiting(), 0);
    }

    #[tokio::test]
    async fn rejected_send_leaves_no_waiter() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();
        let result = store
            .send_and_wait_for(TestAction::Increment, |_| true, Duration::from_secs(1))
            .await;

        assert_eq!(result, Err(StoreError::ShutdownInProgress));
        assert_eq!(store.waiting(), 0);
    }
}
