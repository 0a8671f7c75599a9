//! Quota windows.

use lexflow_core::RateLimitProfile;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// The four fixed quota windows checked on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// 10-second burst window.
    Burst,
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    /// Checked most-restrictive first.
    pub const ALL: [WindowKind; 4] = [
        WindowKind::Burst,
        WindowKind::Minute,
        WindowKind::Hour,
        WindowKind::Day,
    ];

    /// Window length.
    #[must_use]
    pub fn length(self) -> Duration {
        match self {
            WindowKind::Burst => Duration::from_secs(10),
            WindowKind::Minute => Duration::from_secs(60),
            WindowKind::Hour => Duration::from_secs(3600),
            WindowKind::Day => Duration::from_secs(86400),
        }
    }

    /// Counter TTL, slightly past the window so a bucket outlives its
    /// own window boundary.
    #[must_use]
    pub fn ttl(self) -> Duration {
        self.length() + Duration::from_secs(5)
    }

    /// Header / response label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            WindowKind::Burst => "burst",
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
            WindowKind::Day => "day",
        }
    }

    /// The limit this window carries in a credential's profile.
    #[must_use]
    pub fn limit_in(self, profile: &RateLimitProfile) -> i64 {
        let limit = match self {
            WindowKind::Burst => profile.burst_limit,
            WindowKind::Minute => profile.per_minute,
            WindowKind::Hour => profile.per_hour,
            WindowKind::Day => profile.per_day,
        };
        i64::from(limit)
    }

    /// Fixed-window bucket index for a wall-clock instant.
    #[must_use]
    pub fn bucket_index(self, now_ms: i64) -> i64 {
        now_ms / self.length().as_millis() as i64
    }

    /// Milliseconds until the current bucket rolls over.
    #[must_use]
    pub fn ms_until_reset(self, now_ms: i64) -> i64 {
        let window_ms = self.length().as_millis() as i64;
        window_ms - (now_ms % window_ms)
    }
}

impl Display for WindowKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
