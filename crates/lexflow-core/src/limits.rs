//! Per-credential rate-limit profile.

use serde::{Deserialize, Serialize};

/// One request limit per quota window. Carried on every credential and
/// consulted by the limiter on each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitProfile {
    /// Requests per 10-second burst window.
    pub burst_limit: i32,
    pub per_minute: i32,
    pub per_hour: i32,
    pub per_day: i32,
}

impl Default for RateLimitProfile {
    fn default() -> Self {
        Self {
            burst_limit: 100,
            per_minute: 300,
            per_hour: 5000,
            per_day: 50000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_widens_with_the_window() {
        let p = RateLimitProfile::default();
        assert!(p.burst_limit < p.per_minute);
        assert!(p.per_minute < p.per_hour);
        assert!(p.per_hour < p.per_day);
    }
}
