//! flowdev — a multi-endpoint, dual-priority paged stream engine.
//!
//! This crate is a userspace simulation of the character-device core
//! described by its specification: per-endpoint high/low priority byte
//! flows backed by paged buffers, a mutex + condvar wait discipline for
//! blocking reads/writes, and a background scheduler draining deferred
//! low-priority writes in FIFO order. Device-node creation, kernel-module
//! packaging, and OS-level character-device registration are out of scope
//! — `Engine` exposes the equivalent `open`/`close`/`read`/`write`/`control`
//! surface directly as a library API.

pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod flow;
pub mod page;
pub mod priority;
pub mod scheduler;
pub mod session;

pub use config::Config;
pub use engine::{ControlCommand, Engine};
pub use error::{FlowError, Result};
pub use priority::Priority;
pub use session::Session;

/// Crate version, surfaced the way `rusty-db` exposes `VERSION` in `lib.rs`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static TEST_LOGGING: once_cell::sync::OnceCell<()> = once_cell::sync::OnceCell::new();

/// Initializes a `tracing` subscriber once per test binary, the way
/// `io::mod`'s `IO_ENGINE` guards a process-wide singleton with
/// `once_cell::sync::OnceCell` — safe to call from every test that wants
/// log output, since only the first call actually installs a subscriber.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    TEST_LOGGING.get_or_init(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
