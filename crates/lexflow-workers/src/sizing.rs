//! Memory-bounded worker pool sizing.

/// Effective pool size: the configured size, additionally bounded by how
/// many work items fit in available memory. Always at least one worker.
#[must_use]
pub fn effective_pool_size(
    configured: usize,
    free_memory_mb: Option<u64>,
    per_item_mb: u64,
) -> usize {
    let configured = configured.max(1);
    let Some(free) = free_memory_mb else {
        return configured;
    };
    let memory_bound = (free / per_item_mb.max(1)) as usize;
    configured.min(memory_bound).max(1)
}

/// Available system memory in MB, from `/proc/meminfo`. `None` when the
/// platform does not expose it; the pool then uses the configured size.
#[must_use]
pub fn free_memory_mb() -> Option<u64> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("MemAvailable:") {
            let kib: u64 = value
                .split_whitespace()
                .next()
                .and_then(|token| token.parse().ok())?;
            return Some(kib / 1024);
        }
    }
    None
}

/// Resident set size of this process in MB, from `/proc/self/status`.
#[must_use]
pub fn resident_memory_mb() -> Option<u64> {
    let text = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("VmRSS:") {
            let kib: u64 = value
                .split_whitespace()
                .next()
                .and_then(|token| token.parse().ok())?;
            return Some(kib / 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_size_wins_with_plenty_of_memory() {
        assert_eq!(effective_pool_size(8, Some(16_000), 100), 8);
    }

    #[test]
    fn memory_bound_shrinks_the_pool() {
        assert_eq!(effective_pool_size(8, Some(300), 100), 3);
    }

    #[test]
    fn never_below_one_worker() {
        assert_eq!(effective_pool_size(8, Some(10), 100), 1);
        assert_eq!(effective_pool_size(0, None, 100), 1);
    }

    #[test]
    fn unknown_memory_uses_configured() {
        assert_eq!(effective_pool_size(6, None, 100), 6);
    }
}
