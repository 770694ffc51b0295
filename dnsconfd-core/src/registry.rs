//! Correlation of asynchronous jobs with the events their completion raises.

use std::collections::HashMap;
use std::hash::Hash;

/// Maps an outstanding job handle to the `(success, failure)` event pair
/// that should be injected once the job finishes.
///
/// Entries are consumed by [`resolve`](Self::resolve): a handle resolves at
/// most once.
///
/// # Example
///
/// ```rust
/// use dnsconfd_core::JobRegistry;
///
/// let mut jobs = JobRegistry::new();
/// jobs.register(7_u32, "START_OK", "START_FAIL");
///
/// assert_eq!(jobs.resolve(&7), Some(("START_OK", "START_FAIL")));
/// assert_eq!(jobs.resolve(&7), None);
/// ```
#[derive(Debug, Clone)]
pub struct JobRegistry<J, E> {
    pending: HashMap<J, (E, E)>,
}

impl<J: Eq + Hash, E> JobRegistry<J, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Records the events for `job`.
    ///
    /// Returns the pair previously registered for the same handle, if any.
    pub fn register(&mut self, job: J, on_success: E, on_failure: E) -> Option<(E, E)> {
        self.pending.insert(job, (on_success, on_failure))
    }

    /// Removes and returns the event pair for `job`.
    ///
    /// Returns `None` for handles that were never registered or were already
    /// resolved.
    pub fn resolve(&mut self, job: &J) -> Option<(E, E)> {
        self.pending.remove(job)
    }

    #[must_use]
    pub fn contains(&self, job: &J) -> bool {
        self.pending.contains_key(job)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forgets every outstanding job and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

impl<J: Eq + Hash, E> Default for JobRegistry<J, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_consumes_entry() {
        let mut jobs = JobRegistry::new();
        assert!(jobs.register(1_u32, 'a', 'b').is_none());
        assert!(jobs.contains(&1));

        assert_eq!(jobs.resolve(&1), Some(('a', 'b')));
        assert_eq!(jobs.resolve(&1), None);
        assert!(jobs.is_empty());
    }

    #[test]
    fn unknown_handle_is_not_found() {
        let mut jobs: JobRegistry<u32, char> = JobRegistry::default();
        jobs.register(1, 'a', 'b');
        assert_eq!(jobs.resolve(&2), None);
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn register_twice_returns_previous_pair() {
        let mut jobs = JobRegistry::new();
        jobs.register(5_u32, 'a', 'b');
        assert_eq!(jobs.register(5, 'c', 'd'), Some(('a', 'b')));
        assert_eq!(jobs.resolve(&5), Some(('c', 'd')));
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut jobs = JobRegistry::new();
        jobs.register(1_u32, 'a', 'b');
        jobs.register(2, 'c', 'd');
        assert_eq!(jobs.clear(), 2);
        assert!(jobs.resolve(&1).is_none());
    }
}
