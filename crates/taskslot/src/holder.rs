/*
[INPUT]:  Caller operations (FnOnce(CancellationToken) -> Future<anyhow::Result<V>>), optional input, priority
[OUTPUT]: Single-slot task lifecycle with watch-published snapshots and mapped errors
[POS]:    Execution layer - owns at most one in-flight operation per holder
[UPDATE]: When changing supersede/cancel guarantees or completion recording
*/

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{HolderConfig, Priority};
use crate::error::{HolderError, Result};
use crate::mapper::{ErrorMapper, map_failure};
use crate::snapshot::{Ending, Generation, Outcome, TaskSnapshot};
use crate::state::{StateError, TaskEvent, TaskState, TaskStateMachine};

#[derive(Debug)]
struct InFlight {
    generation: Generation,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Terminal report of one generation, applied to the snapshot at most once.
enum Completion<V, E> {
    Succeeded(V),
    Failed(Option<E>),
}

/// Holder of a single cancellable asynchronous operation.
///
/// `start*` and `cancel` take `&mut self`, so bookkeeping of the in-flight
/// handle has exactly one writer. Snapshot fields are only mutated through the
/// `watch::Sender`, by the holder or by the spawned operation of the current
/// generation, and readers always observe a consistent snapshot.
pub struct TaskHolder<V, E> {
    name: Arc<str>,
    priority: Priority,
    mapper: Option<ErrorMapper<E>>,
    runtime: Option<Handle>,
    state_tx: Arc<watch::Sender<TaskSnapshot<V, E>>>,
    generation: Generation,
    /// Handle of the latest generation. Once that operation finishes the
    /// handle is inert and is dropped by the next `start`, `cancel` or drop;
    /// `state` is read from the snapshot and is Idle by then.
    in_flight: Option<InFlight>,
}

/// Builder for [`TaskHolder`].
pub struct TaskHolderBuilder<V, E> {
    config: HolderConfig,
    mapper: Option<ErrorMapper<E>>,
    runtime: Option<Handle>,
    _value: PhantomData<fn() -> V>,
}

impl<V, E> TaskHolderBuilder<V, E> {
    pub fn new() -> Self {
        Self {
            config: HolderConfig::default(),
            mapper: None,
            runtime: None,
            _value: PhantomData,
        }
    }

    pub fn config(mut self, config: HolderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn error_mapper<F>(mut self, map: F) -> Self
    where
        F: Fn(&anyhow::Error) -> Option<E> + Send + Sync + 'static,
    {
        self.mapper = Some(ErrorMapper::new(map));
        self
    }

    /// Spawn operations on this runtime instead of the one entered at `start`.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> TaskHolder<V, E> {
        let (state_tx, _rx) = watch::channel(TaskSnapshot::default());
        TaskHolder {
            name: Arc::from(self.config.name),
            priority: self.config.priority,
            mapper: self.mapper,
            runtime: self.runtime,
            state_tx: Arc::new(state_tx),
            generation: Generation::ZERO,
            in_flight: None,
        }
    }
}

impl<V, E> Default for TaskHolderBuilder<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> TaskHolder<V, E> {
    pub fn builder() -> TaskHolderBuilder<V, E> {
        TaskHolderBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_error_mapper<F>(map: F) -> Self
    where
        F: Fn(&anyhow::Error) -> Option<E> + Send + Sync + 'static,
    {
        Self::builder().error_mapper(map).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Priority used by `start` and `start_with`
    pub fn default_priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state_tx.borrow().state()
    }

    pub fn is_active(&self) -> bool {
        self.state_tx.borrow().is_active()
    }

    /// Generation of the most recent start, `Generation::ZERO` before any.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn ending(&self) -> Option<Ending> {
        self.state_tx.borrow().ending()
    }

    /// Subscribe to snapshot changes.
    ///
    /// The receiver always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot<V, E>> {
        self.state_tx.subscribe()
    }

    /// Cancel the active operation, if any, and return to Idle.
    ///
    /// Value and error are left as they were; the next start clears them.
    pub fn cancel(&mut self) {
        let in_flight = self.in_flight.take();
        let cancelled = self.state_tx.send_if_modified(|snap| {
            if !snap.is_active() {
                return false;
            }
            match advance(snap, TaskEvent::Cancel) {
                Ok(()) => {
                    snap.ending = Some(Ending::Cancelled);
                    true
                }
                Err(_) => false,
            }
        });

        if let Some(in_flight) = in_flight {
            in_flight.shutdown.cancel();
        }

        if cancelled {
            tracing::debug!(
                holder = %self.name,
                generation = %self.generation,
                "operation cancelled"
            );
        }
    }
}

impl<V, E> TaskHolder<V, E>
where
    V: Send + Sync + 'static,
    E: fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    /// Launch `operation` at the holder's default priority.
    ///
    /// Any active operation is cancelled first and the previous value/error is
    /// cleared. Returns as soon as the operation is spawned.
    pub fn start<F, Fut>(&mut self, operation: F) -> Result<Generation>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.launch(self.priority, operation)
    }

    pub fn start_prioritized<F, Fut>(
        &mut self,
        priority: Priority,
        operation: F,
    ) -> Result<Generation>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.launch(priority, operation)
    }

    /// Launch `operation` with `input` handed off to it.
    pub fn start_with<I, F, Fut>(&mut self, input: I, operation: F) -> Result<Generation>
    where
        I: Send + 'static,
        F: FnOnce(I, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.launch(self.priority, move |token| operation(input, token))
    }

    pub fn start_with_prioritized<I, F, Fut>(
        &mut self,
        priority: Priority,
        input: I,
        operation: F,
    ) -> Result<Generation>
    where
        I: Send + 'static,
        F: FnOnce(I, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.launch(priority, move |token| operation(input, token))
    }

    /// Map a raw failure the same way completions of this holder are mapped.
    pub fn handle(&self, failure: anyhow::Error) -> Option<E> {
        map_failure(self.mapper.as_ref(), failure)
    }

    fn launch<F, Fut>(&mut self, priority: Priority, operation: F) -> Result<Generation>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|_| HolderError::NoRuntime)?,
        };

        if let Some(previous) = self.in_flight.take() {
            previous.shutdown.cancel();
            if !previous.handle.is_finished() {
                tracing::debug!(
                    holder = %self.name,
                    superseded = %previous.generation,
                    "superseding active operation"
                );
            }
        }

        let generation = self.generation.next();
        self.generation = generation;
        self.state_tx.send_modify(|snap| {
            // Start is accepted from every state.
            if advance(snap, TaskEvent::Start).is_ok() {
                snap.outcome = Outcome::Empty;
                snap.generation = generation;
                snap.ending = None;
                snap.priority = priority;
            }
        });

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let state_tx = Arc::clone(&self.state_tx);
        let mapper = self.mapper.clone();
        let name = Arc::clone(&self.name);

        let handle = runtime.spawn(async move {
            if priority.defers_first_poll() {
                tracing::trace!(
                    holder = %name,
                    generation = %generation,
                    "deferring background operation"
                );
                tokio::task::yield_now().await;
            }

            // Supervised separately so a panicking operation still ends its generation.
            let mut running = tokio::spawn(operation(token.clone()));
            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    running.abort();
                    None
                }
                joined = &mut running => Some(joined),
            };

            let completion = match joined {
                Some(Ok(Ok(value))) => Completion::Succeeded(value),
                Some(Ok(Err(failure))) => {
                    Completion::Failed(map_failure(mapper.as_ref(), failure))
                }
                Some(Err(join_err)) if join_err.is_panic() => {
                    tracing::warn!(
                        holder = %name,
                        generation = %generation,
                        "operation panicked"
                    );
                    Completion::Failed(None)
                }
                Some(Err(_)) | None => {
                    tracing::debug!(
                        holder = %name,
                        generation = %generation,
                        "operation unwound after cancellation"
                    );
                    return;
                }
            };

            if record_completion(&state_tx, generation, completion) {
                tracing::debug!(holder = %name, generation = %generation, "operation completed");
            } else {
                tracing::debug!(
                    holder = %name,
                    generation = %generation,
                    "discarding stale completion"
                );
            }
        });

        self.in_flight = Some(InFlight {
            generation,
            shutdown,
            handle,
        });

        tracing::debug!(
            holder = %self.name,
            generation = %generation,
            priority = ?priority,
            "operation started"
        );
        Ok(generation)
    }
}

impl<V, E> TaskHolder<V, E>
where
    V: Clone,
    E: Clone,
{
    pub fn snapshot(&self) -> TaskSnapshot<V, E> {
        self.state_tx.borrow().clone()
    }

    pub fn value(&self) -> Option<V> {
        self.state_tx.borrow().value().cloned()
    }

    pub fn error(&self) -> Option<E> {
        self.state_tx.borrow().error().cloned()
    }

    /// Wait until no operation is active and return that snapshot.
    pub async fn settled(&self) -> TaskSnapshot<V, E> {
        let mut rx = self.state_tx.subscribe();
        match rx.wait_for(|snap| !snap.is_active()).await {
            Ok(snap) => (*snap).clone(),
            Err(_) => self.snapshot(),
        }
    }
}

impl<V, E> Default for TaskHolder<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for TaskHolder<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHolder")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("has_mapper", &self.mapper.is_some())
            .finish()
    }
}

impl<V, E> Drop for TaskHolder<V, E> {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn advance<V, E>(
    snap: &mut TaskSnapshot<V, E>,
    event: TaskEvent,
) -> std::result::Result<(), StateError> {
    let mut machine = TaskStateMachine::new(snap.state);
    snap.state = machine.transition(event)?;
    Ok(())
}

/// Apply a completion if it still belongs to the current generation.
///
/// Returns false when the generation was superseded or already cancelled.
fn record_completion<V, E>(
    state_tx: &watch::Sender<TaskSnapshot<V, E>>,
    generation: Generation,
    completion: Completion<V, E>,
) -> bool {
    state_tx.send_if_modified(|snap| {
        if snap.generation != generation {
            return false;
        }
        let (event, outcome, ending) = match completion {
            Completion::Succeeded(value) => (
                TaskEvent::Succeed,
                Outcome::Value(value),
                Ending::Succeeded,
            ),
            Completion::Failed(error) => (
                TaskEvent::Fail,
                error.map_or(Outcome::Empty, Outcome::Error),
                Ending::Failed,
            ),
        };
        if advance(snap, event).is_err() {
            return false;
        }
        snap.outcome = outcome;
        snap.ending = Some(ending);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("load failed: {0}")]
    struct LoadError(String);

    fn active_snapshot(generation: Generation) -> TaskSnapshot<u32, LoadError> {
        TaskSnapshot {
            state: TaskState::Active,
            generation,
            ..TaskSnapshot::default()
        }
    }

    #[test]
    fn test_record_completion_for_current_generation() {
        let generation = Generation::ZERO.next();
        let (tx, _rx) = watch::channel(active_snapshot(generation));

        assert!(record_completion(&tx, generation, Completion::Succeeded(5)));
        let snap = tx.borrow();
        assert_eq!(snap.state(), TaskState::Idle);
        assert_eq!(snap.value(), Some(&5));
        assert_eq!(snap.ending(), Some(Ending::Succeeded));
    }

    #[test]
    fn test_record_completion_rejects_stale_generation() {
        let stale = Generation::ZERO.next();
        let current = stale.next();
        let (tx, _rx) = watch::channel(active_snapshot(current));

        assert!(!record_completion(&tx, stale, Completion::Succeeded(5)));
        let snap = tx.borrow();
        assert!(snap.is_active());
        assert_eq!(snap.generation(), current);
        assert!(snap.outcome().is_empty());
    }

    #[test]
    fn test_record_completion_rejected_after_cancel() {
        let generation = Generation::ZERO.next();
        let mut cancelled = active_snapshot(generation);
        cancelled.state = TaskState::Idle;
        cancelled.ending = Some(Ending::Cancelled);
        let (tx, _rx) = watch::channel(cancelled);

        let error = Some(LoadError("late".to_string()));
        assert!(!record_completion(&tx, generation, Completion::Failed(error)));
        let snap = tx.borrow();
        assert_eq!(snap.error(), None);
        assert_eq!(snap.ending(), Some(Ending::Cancelled));
    }

    #[test]
    fn test_unmappable_failure_records_no_error() {
        let generation = Generation::ZERO.next();
        let (tx, _rx) = watch::channel(active_snapshot(generation));

        assert!(record_completion(&tx, generation, Completion::Failed(None)));
        let snap = tx.borrow();
        assert_eq!(snap.state(), TaskState::Idle);
        assert!(snap.outcome().is_empty());
        assert_eq!(snap.ending(), Some(Ending::Failed));
    }

    #[test]
    fn test_start_without_runtime() {
        let mut holder: TaskHolder<u32, LoadError> = TaskHolder::new();
        let result = holder.start(|_token| async { Ok(1) });
        assert!(matches!(result, Err(HolderError::NoRuntime)));
        assert_eq!(holder.state(), TaskState::Idle);
        assert_eq!(holder.generation(), Generation::ZERO);
    }

    #[test]
    fn test_start_on_configured_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let mut holder: TaskHolder<u32, LoadError> = TaskHolder::builder()
            .name("configured")
            .runtime(runtime.handle().clone())
            .build();

        let generation = holder.start(|_token| async { Ok(9) }).unwrap();
        let snap = runtime.block_on(holder.settled());
        assert_eq!(snap.generation(), generation);
        assert_eq!(snap.value(), Some(&9));
    }

    #[tokio::test]
    async fn test_background_priority_is_recorded() {
        let mut holder: TaskHolder<u32, LoadError> = TaskHolder::builder()
            .priority(Priority::Background)
            .build();
        assert_eq!(holder.default_priority(), Priority::Background);

        holder.start(|_token| async { Ok(3) }).unwrap();
        assert_eq!(holder.snapshot().priority(), Priority::Background);
        assert_eq!(holder.settled().await.value(), Some(&3));

        holder
            .start_prioritized(Priority::Utility, |_token| async { Ok(4) })
            .unwrap();
        let snap = holder.settled().await;
        assert_eq!(snap.priority(), Priority::Utility);
        assert_eq!(snap.value(), Some(&4));
    }

    #[tokio::test]
    async fn test_drop_cancels_in_flight_operation() {
        let (token_tx, token_rx) = oneshot::channel();
        let mut holder: TaskHolder<u32, LoadError> = TaskHolder::new();
        holder
            .start(move |token| async move {
                let _ = token_tx.send(token.clone());
                token.cancelled().await;
                Ok(0)
            })
            .unwrap();

        let token = token_rx.await.unwrap();
        drop(holder);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("dropping the holder should cancel its operation");
    }

    #[tokio::test]
    async fn test_builder_infers_value_type_from_binding() {
        let mut holder: TaskHolder<String, LoadError> = TaskHolder::builder()
            .name("inferred")
            .error_mapper(|failure| Some(LoadError(failure.to_string())))
            .build();
        assert_eq!(holder.name(), "inferred");

        holder
            .start(|_token| async { Err(anyhow::anyhow!("offline")) })
            .unwrap();
        let snap = holder.settled().await;
        assert_eq!(snap.error(), Some(&LoadError("offline".to_string())));
    }

    #[tokio::test]
    async fn test_finished_handle_released_by_next_cancel() {
        let mut holder: TaskHolder<u32, LoadError> = TaskHolder::new();
        holder.start(|_token| async { Ok(1) }).unwrap();
        holder.settled().await;

        assert!(holder.in_flight.is_some());
        assert_eq!(holder.state(), TaskState::Idle);

        holder.cancel();
        assert!(holder.in_flight.is_none());
        assert_eq!(holder.value(), Some(1));
    }

    #[tokio::test]
    async fn test_handle_uses_holder_mapper() {
        let holder: TaskHolder<u32, LoadError> =
            TaskHolder::with_error_mapper(|failure| Some(LoadError(failure.to_string())));
        assert_eq!(
            holder.handle(anyhow::anyhow!("offline")),
            Some(LoadError("offline".to_string()))
        );
    }
}
