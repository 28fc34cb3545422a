//! Per-open-handle session state: current priority, current timeout, and a
//! non-owning reference back to the endpoint it was opened against.
//!
//! Grounded on `original_source/src/driver/structs/structs.h`'s
//! `io_sess_info` (`priority`, `timeout`) and the lifecycle shape of
//! `rusty-db`'s `pool/connection/core.rs` connection guard (a handle
//! created on checkout/open, holding a back-reference to shared
//! pool/endpoint state).

use std::sync::Weak;

use crate::endpoint::Endpoint;
use crate::flow::CancelToken;
use crate::priority::Priority;

/// A session is used by a single thread at a time; concurrent calls from
/// the same `Session` are undefined behavior at the application level
/// (spec.md §9, "SetPriority while reserved"). Nothing in this type
/// enforces that — it is a documented caller contract, like the source.
pub struct Session {
    pub(crate) endpoint_id: usize,
    pub(crate) endpoint: Weak<Endpoint>,
    priority: Priority,
    /// Non-negative timeout in the engine's configured time units; `0`
    /// means non-blocking.
    timeout_units: u64,
    pub(crate) cancel: CancelToken,
}

impl Session {
    pub(crate) fn new(endpoint_id: usize, endpoint: Weak<Endpoint>) -> Self {
        Self {
            endpoint_id,
            endpoint,
            priority: Priority::default(),
            timeout_units: 0,
            cancel: CancelToken::new(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn timeout_units(&self) -> u64 {
        self.timeout_units
    }

    pub fn is_blocking(&self) -> bool {
        self.timeout_units > 0
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub(crate) fn set_timeout_units(&mut self, units: u64) {
        self.timeout_units = units;
    }

    /// A handle a caller holds elsewhere can use to simulate delivering an
    /// interrupt signal to this session's next (or current) wait.
    pub fn cancellation(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn endpoint(&self) -> Option<std::sync::Arc<Endpoint>> {
        self.endpoint.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use std::sync::Arc;

    #[test]
    fn defaults_match_spec() {
        let endpoint = Arc::new(Endpoint::new(16, 4));
        let session = Session::new(0, Arc::downgrade(&endpoint));
        assert_eq!(session.priority(), Priority::High);
        assert_eq!(session.timeout_units(), 0);
        assert!(!session.is_blocking());
    }
}
