//! Fetch orchestration for one logical view ("log of main", "diff of HEAD").
//!
//! A binding runs at most one fetch at a time. Every `reload()` cancels the
//! previous attempt and starts a new generation; outcomes are stamped with
//! the generation that produced them and compared against the live counter
//! when they are delivered, so a superseded attempt can never reach the
//! consumer or the graph.
//!
//! Work happens on spawned tasks, but delivery does not: the owner pumps
//! events with [`AsyncFetchBinding::dispatch_next`] (or `settle`,
//! `dispatch_pending`) on its own context, which is where every consumer
//! callback runs.

use crate::app::sources::{FetchError, FetchSource};
use crate::domain::{
    graph::RevisionGraph,
    vcs::{AccessError, OperationProgress, ProgressEvent, ProgressSink, QueryOutput, RepositoryAccessor},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle callbacks. Exactly one of `on_completed`, `on_failed` or
/// `on_cancelled` follows each `on_started` that is not superseded.
pub trait FetchConsumer<T> {
    fn on_started(&mut self, _generation: u64) {}

    fn on_progress(&mut self, _progress: &OperationProgress) {}

    fn on_completed(&mut self, generation: u64, result: T);

    fn on_failed(&mut self, generation: u64, error: &FetchError);

    fn on_cancelled(&mut self, _generation: u64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    Fetching,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("binding has been disposed")]
    Disposed,
}

/// What happened to an event handed to [`AsyncFetchBinding::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Progress,
    Terminal(Outcome),
    Stale,
}

#[derive(Debug)]
pub struct FetchEvent {
    generation: u64,
    kind: FetchEventKind,
}

#[derive(Debug)]
enum FetchEventKind {
    Progress(OperationProgress),
    Finished(Result<QueryOutput, AccessError>),
}

impl FetchEvent {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

// Every way out of the in-flight slot (supersession, completion, dispose,
// dropping the binding) signals the attempt.
impl Drop for InFlight {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct AsyncFetchBinding<S: FetchSource, C> {
    source: S,
    accessor: Arc<dyn RepositoryAccessor>,
    graph: Arc<RevisionGraph>,
    consumer: C,
    generation: u64,
    state: BindingState,
    last_outcome: Option<Outcome>,
    in_flight: Option<InFlight>,
    finished_tx: mpsc::UnboundedSender<FetchEvent>,
    finished_rx: mpsc::UnboundedReceiver<FetchEvent>,
    progress_tx: mpsc::UnboundedSender<ProgressEvent>,
    progress_rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl<S, C> AsyncFetchBinding<S, C>
where
    S: FetchSource,
    C: FetchConsumer<S::Output>,
{
    pub fn new(
        source: S,
        accessor: Arc<dyn RepositoryAccessor>,
        graph: Arc<RevisionGraph>,
        consumer: C,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        Self {
            source,
            accessor,
            graph,
            consumer,
            generation: 0,
            state: BindingState::Idle,
            last_outcome: None,
            in_flight: None,
            finished_tx,
            finished_rx,
            progress_tx,
            progress_rx,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    pub fn is_fetching(&self) -> bool {
        self.state == BindingState::Fetching
    }

    /// Cancels whatever is in flight and starts a new generation.
    /// Must be called from within a tokio runtime. Returns the new generation.
    pub fn reload(&mut self) -> Result<u64, BindingError> {
        if self.state == BindingState::Disposed {
            tracing::error!("reload() called on a disposed binding");
            return Err(BindingError::Disposed);
        }
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(generation = previous.generation, "superseding in-flight fetch");
        }

        self.generation += 1;
        let generation = self.generation;
        let query = self.source.query();
        tracing::debug!(generation, query = %query.describe(), "starting fetch");

        let token = CancellationToken::new();
        let cancel = token.clone();
        let accessor = self.accessor.clone();
        let progress = ProgressSink::new(generation, self.progress_tx.clone());
        let tx = self.finished_tx.clone();
        tokio::spawn(async move {
            // Run the query on its own task so a panicking accessor still
            // ends the attempt with a terminal event.
            let signal = cancel.clone();
            let mut query_task =
                tokio::spawn(async move { accessor.execute(&query, &progress, signal).await });
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    query_task.abort();
                    Err(AccessError::Cancelled)
                }
                joined = &mut query_task => match joined {
                    Ok(res) => res,
                    Err(err) if err.is_panic() => {
                        tracing::error!(generation, "repository accessor panicked");
                        Err(AccessError::Failed(anyhow::anyhow!("repository accessor panicked")))
                    }
                    Err(err) => Err(AccessError::Failed(anyhow::Error::new(err))),
                },
            };
            let _ = tx.send(FetchEvent {
                generation,
                kind: FetchEventKind::Finished(result),
            });
        });

        self.in_flight = Some(InFlight { generation, token });
        self.state = BindingState::Fetching;
        self.consumer.on_started(generation);
        Ok(generation)
    }

    /// Cancels the in-flight fetch without starting another. The attempt
    /// ends with `on_cancelled` once its task observes the signal.
    pub fn cancel(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            tracing::debug!(generation = in_flight.generation, "cancelling fetch");
            in_flight.token.cancel();
        }
    }

    /// Cancels any in-flight fetch and stops all further callbacks.
    /// Does not wait for the backend to actually stop.
    pub fn dispose(&mut self) {
        if self.state == BindingState::Disposed {
            return;
        }
        tracing::debug!(generation = self.generation, "disposing binding");
        self.in_flight = None;
        self.state = BindingState::Disposed;
        self.finished_rx.close();
        self.progress_rx.close();
    }

    /// Waits for the next event belonging to this binding and delivers it.
    /// Returns `None` once the binding is disposed.
    pub async fn dispatch_next(&mut self) -> Option<Delivery> {
        let event = self.next_event().await?;
        Some(self.deliver(event))
    }

    /// Dispatches until the current fetch has reached a terminal state.
    pub async fn settle(&mut self) -> Option<Outcome> {
        while self.is_fetching() {
            self.dispatch_next().await?;
        }
        self.last_outcome
    }

    /// Delivers everything already queued without waiting.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        if self.state == BindingState::Disposed {
            return delivered;
        }
        while let Ok(progress) = self.progress_rx.try_recv() {
            self.deliver(FetchEvent {
                generation: progress.generation,
                kind: FetchEventKind::Progress(progress.progress),
            });
            delivered += 1;
        }
        while let Ok(event) = self.finished_rx.try_recv() {
            self.deliver(event);
            delivered += 1;
        }
        delivered
    }

    pub async fn next_event(&mut self) -> Option<FetchEvent> {
        if self.state == BindingState::Disposed {
            return None;
        }
        // Progress first so updates sent before completion are not reordered behind it.
        tokio::select! {
            biased;
            Some(p) = self.progress_rx.recv() => Some(FetchEvent {
                generation: p.generation,
                kind: FetchEventKind::Progress(p.progress),
            }),
            event = self.finished_rx.recv() => event,
        }
    }

    /// Applies one event. Anything not belonging to the live generation is
    /// dropped here, at delivery time.
    pub fn deliver(&mut self, event: FetchEvent) -> Delivery {
        // Only a strictly newer generation supersedes.
        let superseded = self.generation > event.generation;
        if superseded || self.state != BindingState::Fetching {
            tracing::trace!(
                generation = event.generation,
                current = self.generation,
                "dropping stale fetch event"
            );
            return Delivery::Stale;
        }

        let generation = event.generation;
        match event.kind {
            FetchEventKind::Progress(progress) => {
                self.consumer.on_progress(&progress);
                Delivery::Progress
            }
            FetchEventKind::Finished(result) => {
                self.in_flight = None;
                let outcome = match result {
                    Ok(output) => match self.source.resolve(output, &self.graph) {
                        Ok(value) => {
                            self.consumer.on_completed(generation, value);
                            Outcome::Completed
                        }
                        Err(err) => {
                            tracing::warn!(generation, error = %err, "could not resolve fetch result");
                            self.consumer.on_failed(generation, &err);
                            Outcome::Failed
                        }
                    },
                    Err(AccessError::Cancelled) => {
                        self.consumer.on_cancelled(generation);
                        Outcome::Cancelled
                    }
                    Err(AccessError::Failed(err)) => {
                        tracing::debug!(generation, error = %err, "fetch failed");
                        self.consumer.on_failed(generation, &FetchError::Query(err));
                        Outcome::Failed
                    }
                    Err(err) => {
                        tracing::debug!(generation, error = %err, "fetch failed");
                        self.consumer
                            .on_failed(generation, &FetchError::Query(anyhow::Error::new(err)));
                        Outcome::Failed
                    }
                };
                self.last_outcome = Some(outcome);
                self.state = BindingState::Idle;
                Delivery::Terminal(outcome)
            }
        }
    }
}

#[cfg(test)]
#[path = "binding_tests.rs"]
mod tests;
