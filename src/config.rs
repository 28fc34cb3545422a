//! Engine-wide configuration.

use std::time::Duration;

/// Page size in bytes. Matches the source driver's `OBJECT_MAX_SIZE`.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Pages per flow. Matches the source driver's `MAX_PAGES`.
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Number of endpoints (minors) the engine manages.
pub const DEFAULT_ENDPOINT_COUNT: usize = 128;

/// Engine-wide tunables.
///
/// Mirrors the shape of a database `Config`: a plain struct with a
/// `Default` impl, overridable by callers before constructing the engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bytes per page (`C` in spec.md).
    pub page_size: usize,

    /// Pages per flow (`MAX_PAGES` in spec.md). Capacity is
    /// `page_size * max_pages`.
    pub max_pages: usize,

    /// Number of endpoints the engine hosts (`N` in spec.md).
    pub endpoint_count: usize,

    /// Number of background threads draining the deferred-write queue.
    ///
    /// Defaults to 1, matching spec.md's "a single cooperative background
    /// executor". Raising this lets different endpoints' deferred writes
    /// drain in parallel; `Scheduler` pins each endpoint to exactly one
    /// worker (`endpoint_id % scheduler_workers`), which is what keeps a
    /// single endpoint's writes FIFO — the flow's mutex only gives mutual
    /// exclusion, not ordering, across workers.
    pub scheduler_workers: usize,

    /// Unit duration a session's integer `timeout` is scaled by when
    /// converted into a real wall-clock deadline.
    pub timeout_unit: Duration,
}

impl Config {
    /// Bytes of capacity per flow: `page_size * max_pages`.
    pub fn flow_capacity(&self) -> usize {
        self.page_size * self.max_pages
    }

    /// Sizes `scheduler_workers` to the host's core count, for deployments
    /// that want deferred writes for different endpoints to drain in
    /// parallel rather than the single-worker default.
    pub fn with_auto_workers(mut self) -> Self {
        self.scheduler_workers = num_cpus::get();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            endpoint_count: DEFAULT_ENDPOINT_COUNT,
            scheduler_workers: 1,
            timeout_unit: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_matches_source_constants() {
        let config = Config::default();
        assert_eq!(config.flow_capacity(), 4096 * 5);
        assert_eq!(config.endpoint_count, 128);
    }

    #[test]
    fn with_auto_workers_matches_host_core_count() {
        let config = Config::default().with_auto_workers();
        assert_eq!(config.scheduler_workers, num_cpus::get());
    }
}
