//! An endpoint (minor number): two priority-segregated flows plus an
//! enable/disable flag.
//!
//! Grounded on `original_source/src/driver/multistream-driver.c`'s
//! `object_state objects[MINORS]` and `enable_disable_array[MINORS]`, and
//! on `rusty-db`'s `pool/connection/partitioning.rs` shape of an array of
//! independently-lockable per-partition state.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::flow::FlowState;
use crate::priority::Priority;

/// One logical device, addressed by a small integer minor number.
pub struct Endpoint {
    flows: [FlowState; 2],
    /// `false` = enabled, `true` = disabled — matching the wire convention
    /// in spec.md §6 (`enabled[i]` where `1 = disabled`, `0 = enabled`).
    disabled: AtomicBool,
}

impl Endpoint {
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            flows: [
                FlowState::new(page_size, max_pages),
                FlowState::new(page_size, max_pages),
            ],
            disabled: AtomicBool::new(false),
        }
    }

    pub fn flow(&self, priority: Priority) -> &FlowState {
        &self.flows[priority.index()]
    }

    /// Read locklessly at open time; spec.md §5 calls this acceptable as
    /// best-effort — a concurrent `set_enabled` may race with an `open`.
    pub fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.disabled.store(!enabled, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_endpoint_is_enabled_with_empty_flows() {
        let endpoint = Endpoint::new(16, 4);
        assert!(endpoint.is_enabled());
        assert_eq!(endpoint.flow(Priority::High).waiters(), 0);
    }

    #[test]
    fn set_enabled_toggles_flag() {
        let endpoint = Endpoint::new(16, 4);
        endpoint.set_enabled(false);
        assert!(!endpoint.is_enabled());
        endpoint.set_enabled(true);
        assert!(endpoint.is_enabled());
    }
}
