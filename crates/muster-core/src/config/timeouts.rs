//! Centralized timeout and threshold defaults
//!
//! All values can be overridden via configuration.

use std::time::Duration;

/// Default timeout values for the shutdown handshake
pub mod shutdown {
    use super::*;

    /// Wait budget when shutting down a single member (30 seconds)
    pub const MEMBER_SECS: u64 = 30;

    /// Per-member wait budget when shutting down a whole team (20 seconds)
    pub const TEAM_MEMBER_SECS: u64 = 20;

    /// Get the single-member wait budget as Duration
    pub fn member_timeout() -> Duration {
        Duration::from_secs(MEMBER_SECS)
    }

    /// Get the team-wide per-member wait budget as Duration
    pub fn team_member_timeout() -> Duration {
        Duration::from_secs(TEAM_MEMBER_SECS)
    }
}

/// Default timing for process supervision
pub mod supervisor {
    use super::*;

    /// Grace period before the post-spawn liveness re-check (1 second)
    pub const SPAWN_GRACE_MS: u64 = 1000;

    /// Wait between SIGTERM and SIGKILL (200 milliseconds)
    pub const TERMINATE_GRACE_MS: u64 = 200;

    /// Get the spawn grace period as Duration
    pub fn spawn_grace() -> Duration {
        Duration::from_millis(SPAWN_GRACE_MS)
    }

    /// Get the terminate grace period as Duration
    pub fn terminate_grace() -> Duration {
        Duration::from_millis(TERMINATE_GRACE_MS)
    }
}

/// Default mailbox polling cadence
pub mod mailbox {
    use super::*;

    /// Fallback poll interval while waiting on a mailbox (250 milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 250;

    /// Get the poll interval as Duration
    pub fn poll_interval() -> Duration {
        Duration::from_millis(POLL_INTERVAL_MS)
    }
}

/// Default liveness thresholds
pub mod liveness {
    use super::*;

    /// Newest authored entry younger than this means Active (5 minutes)
    pub const ACTIVE_SECS: u64 = 300;

    /// Newest authored entry younger than this means Idle (1 hour)
    pub const IDLE_SECS: u64 = 3600;

    /// Get the active threshold as Duration
    pub fn active_threshold() -> Duration {
        Duration::from_secs(ACTIVE_SECS)
    }

    /// Get the idle threshold as Duration
    pub fn idle_threshold() -> Duration {
        Duration::from_secs(IDLE_SECS)
    }
}
