use std::fmt;

use crate::server::ServerDescription;

/// Tag of an event; the table is keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Kickoff,
    Success,
    Fail,
    StartOk,
    StartFail,
    TimerUp,
    Timeout,
    ServiceUp,
    Update,
    Stop,
    Reload,
    RestartSuccess,
    RestartFail,
    StopSuccess,
    StopFailure,
}

impl EventKind {
    /// Events that may arrive from outside the daemon at any moment.
    pub const EXTERNAL: [Self; 3] = [Self::Update, Self::Stop, Self::Reload];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kickoff => "KICKOFF",
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::StartOk => "START_OK",
            Self::StartFail => "START_FAIL",
            Self::TimerUp => "TIMER_UP",
            Self::Timeout => "TIMEOUT",
            Self::ServiceUp => "SERVICE_UP",
            Self::Update => "UPDATE",
            Self::Stop => "STOP",
            Self::Reload => "RELOAD",
            Self::RestartSuccess => "RESTART_SUCCESS",
            Self::RestartFail => "RESTART_FAIL",
            Self::StopSuccess => "STOP_SUCCESS",
            Self::StopFailure => "STOP_FAILURE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Payload {
    #[default]
    Empty,
    /// Number of readiness polls already made.
    Attempt(u32),
    /// Complete replacement for the known upstream servers.
    Servers(Vec<ServerDescription>),
}

/// An event delivered to the daemon: a kind plus optional data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub payload: Payload,
}

impl Event {
    #[must_use]
    pub const fn new(kind: EventKind) -> Self {
        Self {
            kind,
            payload: Payload::Empty,
        }
    }

    #[must_use]
    pub const fn with_payload(kind: EventKind, payload: Payload) -> Self {
        Self { kind, payload }
    }

    /// `TIMER_UP` for the poll following `attempt` earlier ones.
    #[must_use]
    pub const fn timer_up(attempt: u32) -> Self {
        Self::with_payload(EventKind::TimerUp, Payload::Attempt(attempt))
    }

    #[must_use]
    pub fn update(servers: Vec<ServerDescription>) -> Self {
        Self::with_payload(EventKind::Update, Payload::Servers(servers))
    }

    #[must_use]
    pub fn attempt(&self) -> Option<u32> {
        match self.payload {
            Payload::Attempt(attempt) => Some(attempt),
            _ => None,
        }
    }

    /// Servers carried by the event, only if there is at least one.
    #[must_use]
    pub fn into_servers(self) -> Option<Vec<ServerDescription>> {
        match self.payload {
            Payload::Servers(servers) if !servers.is_empty() => Some(servers),
            _ => None,
        }
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_wire_tokens() {
        assert_eq!(EventKind::StartOk.to_string(), "START_OK");
        assert_eq!(EventKind::StopFailure.to_string(), "STOP_FAILURE");
    }

    #[test]
    fn empty_server_list_counts_as_absent() {
        assert_eq!(Event::update(Vec::new()).into_servers(), None);
        assert_eq!(Event::new(EventKind::Update).into_servers(), None);

        let server = ServerDescription::new("192.0.2.1".parse().unwrap());
        assert_eq!(
            Event::update(vec![server.clone()]).into_servers(),
            Some(vec![server])
        );
    }

    #[test]
    fn attempt_only_from_attempt_payload() {
        assert_eq!(Event::timer_up(2).attempt(), Some(2));
        assert_eq!(Event::new(EventKind::TimerUp).attempt(), None);
    }
}
