//! The dispatcher and the task it runs on.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dnsconfd_core::{ShutdownMode, TableError, TaskError};
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::context::ScheduledTimer;
use super::transitions::{self, DaemonTable};
use super::{DaemonContext, Event, EventKind, ExitCode, State};
use crate::service_manager::{JobId, JobResult, JobSink};

const CHANNEL_SIZE: usize = 100;

/// A message on the daemon's inbound channel.
#[derive(Debug)]
pub enum Inbound {
    /// An event from outside (the binary, a signal, a test).
    Event(Event),
    /// A timer requested by a handler. Dropped unless the daemon is still in
    /// the state it was armed in.
    Timer { generation: u64, event: Event },
    /// A service manager job finished.
    JobRemoved { job: JobId, result: JobResult },
}

/// The dispatcher. Owns the current state and the [`DaemonContext`].
pub struct Daemon {
    state: State,
    /// Bumped on every change of state; stale timers carry an older value.
    generation: u64,
    context: DaemonContext,
    table: DaemonTable,
    loopback: mpsc::Sender<Inbound>,
    state_tx: watch::Sender<State>,
    strict: bool,
}

impl Daemon {
    /// Validates the transition table and starts the daemon on a new task.
    ///
    /// The daemon starts in [`State::Starting`] and does nothing until it
    /// receives `KICKOFF`.
    ///
    /// # Errors
    ///
    /// Returns the table defect if the transition table is inconsistent.
    pub fn spawn(
        context: DaemonContext,
    ) -> Result<(DaemonHandle, DaemonTask), TableError<State, EventKind>> {
        let table = transitions::daemon_table();
        transitions::validate(&table)?;

        let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
        let (state_tx, state_rx) = watch::channel(State::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(None);

        let daemon = Self::new(context, table, tx.clone(), state_tx);
        let handle = tokio::spawn(daemon.run(rx, shutdown_rx));

        Ok((
            DaemonHandle {
                tx,
                state_rx,
                shutdown_tx: Arc::new(shutdown_tx),
            },
            DaemonTask { handle },
        ))
    }

    pub(crate) fn new(
        mut context: DaemonContext,
        table: DaemonTable,
        loopback: mpsc::Sender<Inbound>,
        state_tx: watch::Sender<State>,
    ) -> Self {
        context.job_sink = Some(JobSink::new(loopback.clone()));
        Self {
            state: State::Starting,
            generation: 0,
            context,
            table,
            loopback,
            state_tx,
            strict: cfg!(debug_assertions),
        }
    }

    async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Inbound>,
        mut shutdown: watch::Receiver<Option<ShutdownMode>>,
    ) -> DaemonContext {
        let mut shutdown_open = true;

        while self.state != State::Stopped {
            tokio::select! {
                changed = shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        // Every handle is gone and nobody can ask for a stop
                        // any more. Timers and job signals keep the inbound
                        // channel open, so stop on our own.
                        shutdown_open = false;
                        tracing::info!(state = %self.state, "All daemon handles dropped, stopping");
                        self.dispatch(EventKind::Stop.into()).await;
                        continue;
                    }
                    let mode = *shutdown.borrow_and_update();
                    match mode {
                        Some(ShutdownMode::Immediate) => {
                            tracing::info!(state = %self.state, "Immediate shutdown requested");
                            return self.context;
                        }
                        Some(ShutdownMode::Graceful) => {
                            tracing::info!(state = %self.state, "Graceful shutdown requested, draining queue");
                            while let Ok(message) = inbound.try_recv() {
                                self.deliver(message).await;
                                if self.state == State::Stopped {
                                    break;
                                }
                            }
                            return self.context;
                        }
                        None => {}
                    }
                }
                message = inbound.recv() => {
                    // `self.loopback` keeps the channel open while the daemon lives.
                    let Some(message) = message else { break };
                    self.deliver(message).await;
                }
            }
        }

        self.context
    }

    pub(crate) async fn deliver(&mut self, message: Inbound) {
        match message {
            Inbound::Event(event) => self.dispatch(event).await,
            Inbound::Timer { generation, event } => {
                if generation == self.generation {
                    self.dispatch(event).await;
                } else {
                    tracing::debug!(
                        event = %event.kind,
                        state = %self.state,
                        "Dropping timer armed in an earlier state"
                    );
                }
            }
            Inbound::JobRemoved { job, result } => match self.context.jobs.resolve(&job) {
                Some((on_success, on_failure)) => {
                    let event = if result.is_success() {
                        on_success
                    } else {
                        on_failure
                    };
                    tracing::debug!(%job, %result, event = %event.kind, "Job finished");
                    self.dispatch(event).await;
                }
                None => {
                    tracing::warn!(%job, %result, "Signal for unknown job, ignoring");
                }
            },
        }
    }

    /// Handles `event` and every follow-up event it causes.
    pub(crate) async fn dispatch(&mut self, event: Event) {
        let mut next = Some(event);
        while let Some(event) = next {
            next = self.step(event).await;
        }
    }

    /// Performs a single transition and returns the handler's follow-up.
    pub(crate) async fn step(&mut self, event: Event) -> Option<Event> {
        let Some(row) = self.table.lookup(self.state, event.kind) else {
            return self.reject(&event);
        };
        let (next, handler) = (row.next(), *row.handler());

        tracing::debug!(
            state = %self.state,
            event = %event.kind,
            next = %next,
            ?handler,
            "Transition"
        );
        let follow_up = handler.run(&mut self.context, event).await;
        self.enter(next);
        follow_up
    }

    fn enter(&mut self, next: State) {
        if next != self.state {
            self.generation += 1;
            self.state = next;
            self.state_tx.send_replace(next);
        }
        for timer in self.context.take_timers() {
            self.arm(timer);
        }
    }

    fn arm(&self, timer: ScheduledTimer) {
        let tx = self.loopback.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::time::sleep(timer.delay).await;
            let _ = tx
                .send(Inbound::Timer {
                    generation,
                    event: timer.event,
                })
                .await;
        });
    }

    /// An event arrived that the table has no row for.
    fn reject(&mut self, event: &Event) -> Option<Event> {
        tracing::error!(
            state = %self.state,
            event = %event.kind,
            "No transition for event in current state"
        );
        assert!(
            !self.strict,
            "no transition for {} in {}",
            event.kind, self.state
        );

        self.context.set_exit_code(ExitCode::InternalFailure);
        if self.table.contains(self.state, EventKind::Stop) {
            Some(EventKind::Stop.into())
        } else {
            self.enter(State::Stopped);
            None
        }
    }
}

/// Handle for interacting with a running daemon.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    tx: mpsc::Sender<Inbound>,
    state_rx: watch::Receiver<State>,
    shutdown_tx: Arc<watch::Sender<Option<ShutdownMode>>>,
}

impl DaemonHandle {
    /// Sends an event to the daemon.
    pub async fn send(&self, event: Event) -> Result<(), SendError<Event>> {
        match self.tx.reserve().await {
            Ok(permit) => {
                permit.send(Inbound::Event(event));
                Ok(())
            }
            Err(_) => Err(SendError(event)),
        }
    }

    /// Attempts to send an event without awaiting capacity.
    pub fn try_send(&self, event: Event) -> Result<(), TrySendError<Event>> {
        match self.tx.try_reserve() {
            Ok(permit) => {
                permit.send(Inbound::Event(event));
                Ok(())
            }
            Err(TrySendError::Full(())) => Err(TrySendError::Full(event)),
            Err(TrySendError::Closed(())) => Err(TrySendError::Closed(event)),
        }
    }

    /// Returns the current state of the daemon.
    #[must_use]
    pub fn current_state(&self) -> State {
        *self.state_rx.borrow()
    }

    /// Waits for the daemon to reach the specified state.
    pub async fn wait_for_state(&self, target: State) -> Result<(), watch::error::RecvError> {
        let mut rx = self.state_rx.clone();
        while *rx.borrow_and_update() != target {
            rx.changed().await?;
        }
        Ok(())
    }

    /// Initiates a graceful shutdown. Processes queued messages before exiting.
    pub fn shutdown_graceful(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Graceful));
    }

    /// Initiates an immediate shutdown. Drops unprocessed messages.
    pub fn shutdown_immediate(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Immediate));
    }
}

/// The daemon's task. Resolves to the final context once the daemon stops.
#[derive(Debug)]
pub struct DaemonTask {
    handle: JoinHandle<DaemonContext>,
}

impl Future for DaemonTask {
    type Output = Result<DaemonContext, TaskError<Infallible>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(context)) => Poll::Ready(Ok(context)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(TaskError::Join(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}
