use std::fmt;

/// Stages of one resolution cycle, in the order they are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Init,
    LoadConfig,
    DownloadMetadata,
    LoadSack,
    SackReady,
    BuildTransaction,
    ResolveTransaction,
    DownloadPackages,
    TestTransaction,
    Transaction,
    /// Terminal until the cycle is reset
    Failed,
}

impl State {
    /// The state reached by the next forward step, if any.
    pub fn next(&self) -> Option<State> {
        match self {
            State::Init => Some(State::LoadConfig),
            State::LoadConfig => Some(State::DownloadMetadata),
            State::DownloadMetadata => Some(State::LoadSack),
            State::LoadSack => Some(State::SackReady),
            State::SackReady => Some(State::BuildTransaction),
            State::BuildTransaction => Some(State::ResolveTransaction),
            State::ResolveTransaction => Some(State::DownloadPackages),
            State::DownloadPackages => Some(State::TestTransaction),
            State::TestTransaction => Some(State::Transaction),
            State::Transaction | State::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Transaction | State::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Init => "INIT",
            State::LoadConfig => "LOAD_CONFIG",
            State::DownloadMetadata => "DOWNLOAD_METADATA",
            State::LoadSack => "LOAD_SACK",
            State::SackReady => "SACK_READY",
            State::BuildTransaction => "BUILD_TRANSACTION",
            State::ResolveTransaction => "RESOLVE_TRANSACTION",
            State::DownloadPackages => "DOWNLOAD_PACKAGES",
            State::TestTransaction => "TEST_TRANSACTION",
            State::Transaction => "TRANSACTION",
            State::Failed => "FAILED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
