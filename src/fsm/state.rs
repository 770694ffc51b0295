use std::fmt;

/// Every state the daemon can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    Starting,
    ConfiguringDnsManager,
    ConnectingBus,
    SubmittingStartJob,
    WaitingForStartJob,
    Polling,
    SettingUpResolvConf,
    UpdatingDnsManager,
    UpdatingResolvConf,
    Running,
    SubmittingRestartJob,
    WaitingRestartJob,
    RevertingResolvConf,
    SubmittingStopJob,
    WaitingStopJob,
    Stopped,
}

impl State {
    pub const ALL: [Self; 16] = [
        Self::Starting,
        Self::ConfiguringDnsManager,
        Self::ConnectingBus,
        Self::SubmittingStartJob,
        Self::WaitingForStartJob,
        Self::Polling,
        Self::SettingUpResolvConf,
        Self::UpdatingDnsManager,
        Self::UpdatingResolvConf,
        Self::Running,
        Self::SubmittingRestartJob,
        Self::WaitingRestartJob,
        Self::RevertingResolvConf,
        Self::SubmittingStopJob,
        Self::WaitingStopJob,
        Self::Stopped,
    ];

    /// States in which the daemon waits for a timer, a job signal or a
    /// request from outside.
    pub const RESTING: [Self; 6] = [
        Self::Starting,
        Self::WaitingForStartJob,
        Self::Polling,
        Self::Running,
        Self::WaitingRestartJob,
        Self::WaitingStopJob,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::ConfiguringDnsManager => "CONFIGURING_DNS_MANAGER",
            Self::ConnectingBus => "CONNECTING_BUS",
            Self::SubmittingStartJob => "SUBMITTING_START_JOB",
            Self::WaitingForStartJob => "WAITING_FOR_START_JOB",
            Self::Polling => "POLLING",
            Self::SettingUpResolvConf => "SETTING_UP_RESOLV_CONF",
            Self::UpdatingDnsManager => "UPDATING_DNS_MANAGER",
            Self::UpdatingResolvConf => "UPDATING_RESOLV_CONF",
            Self::Running => "RUNNING",
            Self::SubmittingRestartJob => "SUBMITTING_RESTART_JOB",
            Self::WaitingRestartJob => "WAITING_RESTART_JOB",
            Self::RevertingResolvConf => "REVERTING_RESOLV_CONF",
            Self::SubmittingStopJob => "SUBMITTING_STOP_JOB",
            Self::WaitingStopJob => "WAITING_STOP_JOB",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
