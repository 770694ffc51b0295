//! Core runtime types for the dnsconfd state machine.
//!
//! Nothing in here knows about DNS. The root crate plugs its own state,
//! event and handler enums into [`TransitionTable`] and [`JobRegistry`].

mod registry;
mod table;

pub use registry::JobRegistry;
pub use table::{TableError, TableShape, TransitionTable};

/// One row of a transition table: the state to move to and the handler to
/// run on the way there.
///
/// The table owns the state change. A handler only picks the follow-up
/// event; whatever it returns, the machine lands in [`Transition::next`].
///
/// # Example
///
/// ```rust
/// # use dnsconfd_core::Transition;
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum State { Idle, Busy }
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Handler { Start }
///
/// let row = Transition::to(State::Busy, Handler::Start);
/// assert_eq!(row.next(), State::Busy);
/// assert_eq!(*row.handler(), Handler::Start);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S, H> {
    next: S,
    handler: H,
}

impl<S: Copy, H> Transition<S, H> {
    /// Creates a row that runs `handler` and then enters `next`.
    #[must_use]
    pub fn to(next: S, handler: H) -> Self {
        Self { next, handler }
    }

    /// The state the machine is in once the handler returns.
    #[must_use]
    pub fn next(&self) -> S {
        self.next
    }

    /// The handler tag for this row.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

/// Shutdown mode for the state machine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Graceful shutdown: The event loop continues to process all messages
    /// currently in the queue before terminating and returning the context.
    Graceful,
    /// Immediate shutdown: The event loop terminates immediately, dropping any
    /// unprocessed messages in the queue, and returns the current context.
    Immediate,
}

/// Error type returned by the state machine background task.
///
/// # Type Parameters
///
/// * `E`: The logical error type of the machine. Machines that cannot fail
///   use [`std::convert::Infallible`].
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// The machine itself returned an error.
    #[error("FSM error: {0}")]
    Fsm(E),
    /// The background task failed due to a panic or external cancellation.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
