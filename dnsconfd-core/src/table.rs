//! Declarative `(state, event) -> (next state, handler)` tables.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};

use crate::Transition;

/// What a table is checked against in [`TransitionTable::validate`].
#[derive(Debug, Clone, Copy)]
pub struct TableShape<'a, S, K> {
    /// State the machine starts in.
    pub initial: S,
    /// State the machine ends in. It must have no outgoing rows.
    pub terminal: S,
    /// Every state of the machine.
    pub states: &'a [S],
    /// States in which the machine may sit idle waiting for a stimulus.
    pub resting: &'a [S],
    /// Events that can be injected from outside at any time.
    pub external: &'a [K],
}

/// Structural defects found while validating a table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError<S, K> {
    /// The same `(state, event)` pair was declared more than once.
    #[error("transition for ({state:?}, {event:?}) declared twice")]
    Duplicate { state: S, event: K },
    /// No path leads from the initial state to this state.
    #[error("state {state:?} is unreachable from the initial state")]
    Unreachable { state: S },
    /// No path leads from this state to the terminal state.
    #[error("terminal state cannot be reached from {state:?}")]
    DeadEnd { state: S },
    /// The terminal state has rows of its own.
    #[error("terminal state {state:?} has outgoing transitions")]
    TerminalNotFinal { state: S },
    /// A resting state would reject an externally injected event.
    #[error("resting state {state:?} has no transition for external event {event:?}")]
    MissingExternal { state: S, event: K },
}

/// Mapping from `(state, event)` to the [`Transition`] taken.
///
/// Built once at startup with [`on`](Self::on) and never changed afterwards.
#[derive(Debug, Clone)]
pub struct TransitionTable<S, K, H> {
    rows: HashMap<(S, K), Transition<S, H>>,
    duplicates: Vec<(S, K)>,
}

impl<S, K, H> TransitionTable<S, K, H>
where
    S: Copy + Eq + Hash + Ord + Debug,
    K: Copy + Eq + Hash + Debug,
{
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Declares that `event` in `state` runs `handler` and enters `next`.
    ///
    /// A second declaration for the same pair is kept out of the table and
    /// reported by [`validate`](Self::validate).
    pub fn on(&mut self, state: S, event: K, next: S, handler: H) -> &mut Self {
        if self.rows.contains_key(&(state, event)) {
            self.duplicates.push((state, event));
        } else {
            self.rows
                .insert((state, event), Transition::to(next, handler));
        }
        self
    }

    /// Looks up the row for `event` arriving in `state`.
    #[must_use]
    pub fn lookup(&self, state: S, event: K) -> Option<&Transition<S, H>> {
        self.rows.get(&(state, event))
    }

    /// Returns `true` if `event` is accepted in `state`.
    #[must_use]
    pub fn contains(&self, state: S, event: K) -> bool {
        self.rows.contains_key(&(state, event))
    }

    /// Iterates over every row as `(state, event, transition)`.
    pub fn rows(&self) -> impl Iterator<Item = (S, K, &Transition<S, H>)> {
        self.rows
            .iter()
            .map(|(&(state, event), transition)| (state, event, transition))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Checks the table against `shape`.
    ///
    /// # Errors
    ///
    /// Returns the first [`TableError`] found. Checks run in this order:
    /// duplicates, terminal finality, reachability from the initial state,
    /// reachability of the terminal state, external event coverage.
    pub fn validate(&self, shape: &TableShape<'_, S, K>) -> Result<(), TableError<S, K>> {
        if let Some(&(state, event)) = self.duplicates.first() {
            return Err(TableError::Duplicate { state, event });
        }

        if self.rows().any(|(state, _, _)| state == shape.terminal) {
            return Err(TableError::TerminalNotFinal {
                state: shape.terminal,
            });
        }

        let mut graph: DiGraphMap<S, ()> = DiGraphMap::new();
        for &state in shape.states {
            graph.add_node(state);
        }
        for (state, _, transition) in self.rows() {
            graph.add_edge(state, transition.next(), ());
        }

        let mut forward = HashSet::new();
        let mut dfs = Dfs::new(&graph, shape.initial);
        while let Some(state) = dfs.next(&graph) {
            forward.insert(state);
        }
        if let Some(&state) = shape.states.iter().find(|s| !forward.contains(s)) {
            return Err(TableError::Unreachable { state });
        }

        let reversed = Reversed(&graph);
        let mut backward = HashSet::new();
        let mut dfs = Dfs::new(reversed, shape.terminal);
        while let Some(state) = dfs.next(reversed) {
            backward.insert(state);
        }
        if let Some(&state) = shape.states.iter().find(|s| !backward.contains(s)) {
            return Err(TableError::DeadEnd { state });
        }

        for &state in shape.resting {
            for &event in shape.external {
                if !self.contains(state, event) {
                    return Err(TableError::MissingExternal { state, event });
                }
            }
        }

        Ok(())
    }
}

impl<S, K, H> Default for TransitionTable<S, K, H>
where
    S: Copy + Eq + Hash + Ord + Debug,
    K: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    enum Light {
        Off,
        Warming,
        On,
        Broken,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Input {
        Press,
        Ready,
        Cut,
    }

    const ALL: &[Light] = &[Light::Off, Light::Warming, Light::On, Light::Broken];

    fn shape() -> TableShape<'static, Light, Input> {
        TableShape {
            initial: Light::Off,
            terminal: Light::Broken,
            states: ALL,
            resting: &[Light::Off, Light::On],
            external: &[Input::Cut],
        }
    }

    fn lamp() -> TransitionTable<Light, Input, &'static str> {
        let mut table = TransitionTable::new();
        table
            .on(Light::Off, Input::Press, Light::Warming, "press")
            .on(Light::Off, Input::Cut, Light::Broken, "cut")
            .on(Light::Warming, Input::Ready, Light::On, "ready")
            .on(Light::On, Input::Press, Light::Off, "press")
            .on(Light::On, Input::Cut, Light::Broken, "cut");
        table
    }

    #[test]
    fn lookup_returns_declared_row() {
        let table = lamp();
        let row = table.lookup(Light::Warming, Input::Ready).unwrap();
        assert_eq!(row.next(), Light::On);
        assert_eq!(*row.handler(), "ready");
        assert!(table.lookup(Light::Warming, Input::Press).is_none());
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn valid_table_passes() {
        assert_eq!(lamp().validate(&shape()), Ok(()));
    }

    #[test]
    fn duplicate_row_is_reported_and_first_wins() {
        let mut table = lamp();
        table.on(Light::Off, Input::Press, Light::On, "shortcut");

        assert_eq!(
            table.lookup(Light::Off, Input::Press).unwrap().next(),
            Light::Warming
        );
        assert_eq!(
            table.validate(&shape()),
            Err(TableError::Duplicate {
                state: Light::Off,
                event: Input::Press
            })
        );
    }

    #[test]
    fn unreachable_state_is_reported() {
        let mut table = TransitionTable::new();
        table
            .on(Light::Off, Input::Cut, Light::Broken, "cut")
            .on(Light::On, Input::Cut, Light::Broken, "cut")
            .on(Light::Warming, Input::Ready, Light::On, "ready");

        assert_eq!(
            table.validate(&shape()),
            Err(TableError::Unreachable {
                state: Light::Warming
            })
        );
    }

    #[test]
    fn dead_end_is_reported() {
        let mut table = TransitionTable::new();
        table
            .on(Light::Off, Input::Press, Light::Warming, "press")
            .on(Light::Off, Input::Cut, Light::Broken, "cut")
            .on(Light::Warming, Input::Ready, Light::On, "ready")
            .on(Light::On, Input::Press, Light::On, "press")
            .on(Light::On, Input::Cut, Light::On, "cut");

        assert_eq!(
            table.validate(&shape()),
            Err(TableError::DeadEnd { state: Light::Warming })
        );
    }

    #[test]
    fn terminal_with_rows_is_reported() {
        let mut table = lamp();
        table.on(Light::Broken, Input::Press, Light::Off, "repair");

        assert_eq!(
            table.validate(&shape()),
            Err(TableError::TerminalNotFinal {
                state: Light::Broken
            })
        );
    }

    #[test]
    fn missing_external_event_is_reported() {
        let mut table = TransitionTable::new();
        table
            .on(Light::Off, Input::Press, Light::Warming, "press")
            .on(Light::Off, Input::Cut, Light::Broken, "cut")
            .on(Light::Warming, Input::Ready, Light::On, "ready")
            .on(Light::On, Input::Press, Light::Broken, "press");

        assert_eq!(
            table.validate(&shape()),
            Err(TableError::MissingExternal {
                state: Light::On,
                event: Input::Cut
            })
        );
    }
}
