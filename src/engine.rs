//! The top-level engine: endpoint table, process-wide counters, and the
//! open/close/read/write/control dispatcher.
//!
//! Grounded on `rusty-db`'s `pool/connection_pool.rs`, which is the
//! teacher's top-level type orchestrating a wait-queue, a partitioned
//! array of per-partition state, and a connection-factory/lifecycle —
//! the same three things `Engine` orchestrates here (a wait-queue per
//! flow, the endpoint array, and session open/close).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::{FlowError, Result};
use crate::flow::{Deadline, LockOutcome, WaitOutcome};
use crate::priority::Priority;
use crate::scheduler::Scheduler;
use crate::session::Session;

/// Wire command codes, per spec.md §6 (`structs.h`'s `enum ctl_ops`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCommand {
    SetPriority = 1,
    SetBlocking = 3,
    SetEnabled = 4,
}

impl ControlCommand {
    pub fn from_wire(code: u32) -> Option<Self> {
        match code {
            1 => Some(ControlCommand::SetPriority),
            3 => Some(ControlCommand::SetBlocking),
            4 => Some(ControlCommand::SetEnabled),
            _ => None,
        }
    }
}

/// The per-endpoint stream engine: owns every endpoint and the deferred-
/// write scheduler. Construct one per process (or one per test).
pub struct Engine {
    config: Config,
    endpoints: Vec<Arc<Endpoint>>,
    scheduler: Option<Scheduler>,
}

impl Engine {
    /// Allocates every endpoint up front, each with an empty log and zeroed
    /// counters, matching spec.md §4.7's initialization description.
    pub fn new(config: Config) -> Self {
        info!(
            endpoint_count = config.endpoint_count,
            page_size = config.page_size,
            max_pages = config.max_pages,
            "initializing flow engine"
        );
        let endpoints = (0..config.endpoint_count)
            .map(|_| Arc::new(Endpoint::new(config.page_size, config.max_pages)))
            .collect();
        let scheduler = Some(Scheduler::new(config.scheduler_workers));
        Self {
            config,
            endpoints,
            scheduler,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn endpoint_handle(&self, id: usize) -> Result<&Arc<Endpoint>> {
        self.endpoints.get(id).ok_or(FlowError::NoSuchDevice(id))
    }

    /// `open(endpoint_id) -> session`. Succeeds when `endpoint_id < N` and
    /// the endpoint is enabled. Defaults: priority HIGH, timeout 0.
    pub fn open(&self, endpoint_id: usize) -> Result<Session> {
        let endpoint = self.endpoint_handle(endpoint_id)?;
        if !endpoint.is_enabled() {
            warn!(endpoint_id, "open refused: endpoint disabled");
            return Err(FlowError::Disabled(endpoint_id));
        }
        debug!(endpoint_id, "session opened");
        Ok(Session::new(endpoint_id, Arc::downgrade(endpoint)))
    }

    /// `close(session)` is infallible; dropping the `Session` already
    /// releases its resources, so this just documents the lifecycle step
    /// and logs it. Pending deferred writes for the endpoint are
    /// unaffected, per spec.md §6.
    pub fn close(&self, session: Session) {
        debug!(endpoint_id = session.endpoint_id, "session closed");
    }

    /// `write(session, bytes) -> accepted_count`, per spec.md §4.3.
    pub fn write(&self, session: &Session, bytes: &[u8]) -> Result<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let endpoint = session
            .endpoint()
            .ok_or(FlowError::NoSuchDevice(session.endpoint_id))?;
        let flow = endpoint.flow(session.priority());
        let deadline = Deadline::from_timeout(session_timeout(&self.config, session));

        // Step 1: staging happens outside the lock; `bytes` is already a
        // plain slice here, so "staging" is simply deciding the write's
        // length up front.
        let requested = bytes.len();

        // Step 2/3: acquire (or wait for) the lock.
        let mut guard = match flow.lock_or_wait(deadline, &session.cancel) {
            LockOutcome::Acquired(g) => g,
            LockOutcome::Contended => return Err(FlowError::WouldBlock),
            LockOutcome::TimedOut => return Err(FlowError::NoSpace),
            LockOutcome::Interrupted => return Err(FlowError::Interrupted),
        };

        if guard.free_bytes() == 0 {
            if matches!(deadline, Deadline::NonBlocking) {
                drop(guard);
                flow.wake_one();
                return Err(FlowError::NoSpace);
            }
            match flow.wait_for(guard, deadline, &session.cancel, |inner| {
                inner.free_bytes() > 0
            }) {
                WaitOutcome::TimedOut => {
                    flow.wake_one();
                    return Err(FlowError::NoSpace);
                }
                WaitOutcome::Interrupted => {
                    flow.wake_one();
                    return Err(FlowError::Interrupted);
                }
                WaitOutcome::Signaled => {}
            }
            guard = match flow.lock_or_wait(deadline, &session.cancel) {
                LockOutcome::Acquired(g) => g,
                LockOutcome::Contended => return Err(FlowError::WouldBlock),
                LockOutcome::TimedOut => return Err(FlowError::NoSpace),
                LockOutcome::Interrupted => return Err(FlowError::Interrupted),
            };
        }

        // Step 4: re-check under lock.
        if guard.free_bytes() == 0 {
            drop(guard);
            flow.wake_one();
            return Err(FlowError::NoSpace);
        }

        // Step 5: clamp.
        let n = requested.min(guard.free_bytes());
        let staged = &bytes[..n];

        match session.priority() {
            Priority::High => {
                let appended = guard.log_mut().append(staged);
                drop(guard);
                match appended {
                    Some(appended) => {
                        flow.add_bytes_stored(appended as u64);
                        flow.wake_one();
                        trace!(
                            endpoint_id = session.endpoint_id,
                            appended,
                            "synchronous high-priority write"
                        );
                        Ok(appended)
                    }
                    None => {
                        flow.wake_one();
                        Err(FlowError::OutOfMemory)
                    }
                }
            }
            Priority::Low => {
                guard.reserve(n);
                drop(guard);
                match self
                    .scheduler
                    .as_ref()
                    .expect("scheduler available while engine is running")
                    .submit(session.endpoint_id, endpoint.clone(), staged.to_vec())
                {
                    Ok(()) => {
                        flow.wake_one();
                        trace!(
                            endpoint_id = session.endpoint_id,
                            n,
                            "deferred low-priority write accepted"
                        );
                        Ok(n)
                    }
                    Err(e) => {
                        // Step 7: refund the reservation on enqueue failure.
                        flow.with_lock(|inner| inner.release_reservation(n));
                        flow.wake_one();
                        warn!(endpoint_id = session.endpoint_id, "deferred-write enqueue refused");
                        Err(e)
                    }
                }
            }
        }
    }

    /// `read(session, n) -> bytes`, per spec.md §4.4.
    pub fn read(&self, session: &Session, max_len: usize) -> Result<Vec<u8>> {
        if max_len == 0 {
            return Ok(Vec::new());
        }
        let endpoint = session
            .endpoint()
            .ok_or(FlowError::NoSuchDevice(session.endpoint_id))?;
        let flow = endpoint.flow(session.priority());
        let deadline = Deadline::from_timeout(session_timeout(&self.config, session));

        let mut guard = match flow.lock_or_wait(deadline, &session.cancel) {
            LockOutcome::Acquired(g) => g,
            LockOutcome::Contended => return Err(FlowError::WouldBlock),
            LockOutcome::TimedOut => return Ok(Vec::new()),
            LockOutcome::Interrupted => return Err(FlowError::Interrupted),
        };

        if guard.valid_bytes() == 0 {
            if matches!(deadline, Deadline::NonBlocking) {
                drop(guard);
                flow.wake_one();
                return Ok(Vec::new());
            }
            match flow.wait_for(guard, deadline, &session.cancel, |inner| {
                inner.valid_bytes() > 0
            }) {
                WaitOutcome::TimedOut => {
                    flow.wake_one();
                    return Ok(Vec::new());
                }
                WaitOutcome::Interrupted => {
                    flow.wake_one();
                    return Err(FlowError::Interrupted);
                }
                WaitOutcome::Signaled => {}
            }
            guard = match flow.lock_or_wait(deadline, &session.cancel) {
                LockOutcome::Acquired(g) => g,
                LockOutcome::Contended => return Err(FlowError::WouldBlock),
                LockOutcome::TimedOut => return Ok(Vec::new()),
                LockOutcome::Interrupted => return Err(FlowError::Interrupted),
            };
        }

        // Step 3: re-check under lock — short read, not an error.
        if guard.valid_bytes() == 0 {
            drop(guard);
            flow.wake_one();
            return Ok(Vec::new());
        }

        let n = max_len.min(guard.valid_bytes());
        let mut buf = vec![0u8; n];
        let copied = guard.log_mut().consume(&mut buf);
        buf.truncate(copied);
        drop(guard);
        flow.sub_bytes_stored(copied as u64);
        flow.wake_one();
        trace!(endpoint_id = session.endpoint_id, copied, "read");
        Ok(buf)
    }

    /// `control(session, command, arg) -> ok_or_error`, per spec.md §4.5.
    ///
    /// The lock held across the change is the one for the session's
    /// *previous* priority (only relevant for `SetPriority`); the new
    /// priority takes effect on the session's next operation.
    pub fn control(&self, session: &mut Session, command: ControlCommand, arg: u32) -> Result<()> {
        let endpoint = session
            .endpoint()
            .ok_or(FlowError::NoSuchDevice(session.endpoint_id))?;
        let flow = endpoint.flow(session.priority());

        // Held for the whole command so no write/read on this flow can
        // race with the change, per spec.md §4.5. Note this locks the
        // *previous* priority's flow — a `SetPriority` only takes effect
        // on the session's next operation.
        let result = flow.with_lock(|_inner| match command {
            ControlCommand::SetPriority => {
                let priority = match arg {
                    0 => Priority::Low,
                    1 => Priority::High,
                    _ => return Err(FlowError::InvalidArgument),
                };
                session.set_priority(priority);
                Ok(())
            }
            ControlCommand::SetBlocking => {
                session.set_timeout_units(arg as u64);
                Ok(())
            }
            ControlCommand::SetEnabled => {
                let enabled = match arg {
                    0 => true,
                    1 => false,
                    _ => return Err(FlowError::InvalidArgument),
                };
                endpoint.set_enabled(enabled);
                Ok(())
            }
        });
        flow.wake_one();
        result
    }

    /// Process-wide, read-without-locking counters — spec.md §6
    /// (`bytes_high`/`bytes_low`): bytes currently stored in the flow, not
    /// a cumulative transfer count.
    pub fn bytes_stored(&self, endpoint_id: usize, priority: Priority) -> Result<u64> {
        Ok(self.endpoint_handle(endpoint_id)?.flow(priority).bytes_stored())
    }

    pub fn waiters(&self, endpoint_id: usize, priority: Priority) -> Result<u64> {
        Ok(self.endpoint_handle(endpoint_id)?.flow(priority).waiters())
    }

    pub fn is_enabled(&self, endpoint_id: usize) -> Result<bool> {
        Ok(self.endpoint_handle(endpoint_id)?.is_enabled())
    }

    pub fn set_enabled(&self, endpoint_id: usize, enabled: bool) -> Result<()> {
        self.endpoint_handle(endpoint_id)?.set_enabled(enabled);
        Ok(())
    }

    /// Drains the deferred-write scheduler and frees every endpoint.
    /// Callers must ensure all sessions are closed first — spec.md §4.7
    /// assigns that guarantee to the surrounding framework, not the core.
    pub fn shutdown(mut self) {
        info!("shutting down flow engine");
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
    }
}

fn session_timeout(config: &Config, session: &Session) -> Duration {
    config.timeout_unit * session.timeout_units() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            page_size: 64,
            max_pages: 2,
            endpoint_count: 4,
            scheduler_workers: 1,
            timeout_unit: Duration::from_millis(10),
        }
    }

    #[test]
    fn open_rejects_out_of_range_endpoint() {
        crate::init_test_logging();
        let engine = Engine::new(test_config());
        assert_eq!(engine.open(99).unwrap_err(), FlowError::NoSuchDevice(99));
    }

    #[test]
    fn set_priority_rejects_invalid_argument() {
        let engine = Engine::new(test_config());
        let mut session = engine.open(0).unwrap();
        let err = engine
            .control(&mut session, ControlCommand::SetPriority, 7)
            .unwrap_err();
        assert_eq!(err, FlowError::InvalidArgument);
    }

    #[test]
    fn set_enabled_rejects_invalid_argument() {
        let engine = Engine::new(test_config());
        let mut session = engine.open(0).unwrap();
        let err = engine
            .control(&mut session, ControlCommand::SetEnabled, 2)
            .unwrap_err();
        assert_eq!(err, FlowError::InvalidArgument);
    }

    #[test]
    fn write_clamps_to_available_free_bytes() {
        let engine = Engine::new(test_config());
        let session = engine.open(0).unwrap();
        let capacity = test_config().flow_capacity();
        let n = engine.write(&session, &vec![1u8; capacity + 50]).unwrap();
        assert_eq!(n, capacity);
    }

    #[test]
    fn control_from_wire_rejects_unknown_codes() {
        assert!(ControlCommand::from_wire(42).is_none());
        assert_eq!(ControlCommand::from_wire(1), Some(ControlCommand::SetPriority));
    }
}
