// End-to-end scenarios against `Engine`, covering spec.md §8's concrete
// walk-throughs: round trip, deferred low-priority writes, capacity
// exhaustion and recovery, concurrent high-priority writes, blocking reads,
// and endpoint enable/disable.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flowdev::{Config, ControlCommand, Engine, FlowError, Priority};

fn small_engine(page_size: usize, max_pages: usize, endpoint_count: usize) -> Engine {
    Engine::new(Config {
        page_size,
        max_pages,
        endpoint_count,
        scheduler_workers: 1,
        timeout_unit: Duration::from_millis(10),
    })
}

#[test]
fn open_write_read_round_trip() {
    let engine = small_engine(64, 2, 4);
    let session = engine.open(0).unwrap();

    let written = engine.write(&session, b"hello").unwrap();
    assert_eq!(written, 5);

    let read = engine.read(&session, 10).unwrap();
    assert_eq!(read, b"hello");

    let second = engine.read(&session, 10).unwrap();
    assert!(second.is_empty());

    engine.close(session);
}

#[test]
fn low_priority_write_is_deferred_until_scheduler_drains() {
    let engine = small_engine(64, 2, 4);
    let mut session = engine.open(0).unwrap();
    engine
        .control(&mut session, ControlCommand::SetPriority, 0)
        .unwrap();
    assert_eq!(session.priority(), Priority::Low);

    let written = engine.write(&session, b"abcd").unwrap();
    assert_eq!(written, 4);

    // Scheduler may not have drained the job yet; a non-blocking read can
    // legitimately observe zero bytes here, so only assert the eventual
    // post-drain state.
    let mut read = engine.read(&session, 10).unwrap();
    for _ in 0..200 {
        if !read.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
        read = engine.read(&session, 10).unwrap();
    }
    assert_eq!(read, b"abcd");

    engine.close(session);
}

#[test]
fn capacity_exhaustion_then_recovery() {
    let page_size = 16;
    let max_pages = 2;
    let engine = small_engine(page_size, max_pages, 4);
    let session = engine.open(0).unwrap();
    let capacity = page_size * max_pages;

    let filler = vec![0x42u8; capacity];
    let written = engine.write(&session, &filler).unwrap();
    assert_eq!(written, capacity);

    let err = engine.write(&session, b"x").unwrap_err();
    assert_eq!(err, FlowError::NoSpace);

    let freed = engine.read(&session, page_size).unwrap();
    assert_eq!(freed.len(), page_size);

    let written = engine.write(&session, b"y").unwrap();
    assert_eq!(written, 1);

    engine.close(session);
}

#[test]
fn concurrent_high_priority_writes_do_not_interleave() {
    // Each writer opens its own session on the shared endpoint — a single
    // `Session` is documented as single-thread-at-a-time, so concurrency
    // here comes from two independent opens, the same way two processes
    // would each hold their own fd on the device.
    let engine = Arc::new(small_engine(4096, 5, 4));
    let s1 = engine.open(0).unwrap();
    let s2 = engine.open(0).unwrap();
    let e1 = engine.clone();
    let e2 = engine.clone();

    let payload_a = vec![b'A'; 1000];
    let payload_b = vec![b'B'; 1000];

    let h1 = thread::spawn(move || e1.write(&s1, &payload_a).unwrap());
    let h2 = thread::spawn(move || e2.write(&s2, &payload_b).unwrap());
    assert_eq!(h1.join().unwrap(), 1000);
    assert_eq!(h2.join().unwrap(), 1000);

    let session = engine.open(0).unwrap();
    let bytes = engine.read(&session, 2000).unwrap();
    assert_eq!(bytes.len(), 2000);
    // Each write is contiguous and uninterleaved: exactly two runs of 1000
    // identical bytes, in either order.
    let first_run = &bytes[..1000];
    let second_run = &bytes[1000..];
    assert!(first_run.iter().all(|&b| b == b'A') || first_run.iter().all(|&b| b == b'B'));
    assert!(second_run.iter().all(|&b| b == b'A') || second_run.iter().all(|&b| b == b'B'));
    assert_ne!(first_run[0], second_run[0]);
}

#[test]
fn blocking_reader_is_woken_by_a_concurrent_writer() {
    let engine = Arc::new(small_engine(64, 2, 4));
    let mut reader_session = engine.open(0).unwrap();
    engine
        .control(&mut reader_session, ControlCommand::SetBlocking, 10)
        .unwrap();

    let e1 = engine.clone();
    let reader = thread::spawn(move || e1.read(&reader_session, 10).unwrap());

    thread::sleep(Duration::from_millis(30));
    let writer_session = engine.open(0).unwrap();
    engine.write(&writer_session, b"xyz").unwrap();

    let result = reader.join().unwrap();
    assert_eq!(result, b"xyz");
}

#[test]
fn blocking_reader_times_out_with_no_writer() {
    let engine = small_engine(64, 2, 4);
    let mut session = engine.open(0).unwrap();
    engine
        .control(&mut session, ControlCommand::SetBlocking, 5)
        .unwrap();

    let result = engine.read(&session, 10).unwrap();
    assert!(result.is_empty());
}

#[test]
fn disabled_endpoint_refuses_open_until_re_enabled() {
    let engine = small_engine(64, 2, 8);

    let mut session = engine.open(5).unwrap();
    engine
        .control(&mut session, ControlCommand::SetEnabled, 1)
        .unwrap();
    engine.close(session);

    let err = engine.open(5).unwrap_err();
    assert_eq!(err, FlowError::Disabled(5));

    engine.set_enabled(5, true).unwrap();
    let session = engine.open(5).unwrap();
    engine.close(session);
}

#[test]
fn zero_length_write_and_read_are_no_ops() {
    let engine = small_engine(64, 2, 2);
    let session = engine.open(0).unwrap();

    assert_eq!(engine.write(&session, &[]).unwrap(), 0);
    assert_eq!(engine.read(&session, 0).unwrap().len(), 0);
    assert_eq!(engine.bytes_stored(0, Priority::High).unwrap(), 0);
}

#[test]
fn bytes_stored_is_decremented_on_read_not_accumulated() {
    let engine = small_engine(64, 2, 2);
    let session = engine.open(0).unwrap();

    engine.write(&session, b"hello").unwrap();
    assert_eq!(engine.bytes_stored(0, Priority::High).unwrap(), 5);

    let read = engine.read(&session, 10).unwrap();
    assert_eq!(read, b"hello");
    assert_eq!(engine.bytes_stored(0, Priority::High).unwrap(), 0);
}

#[test]
fn control_is_idempotent() {
    let engine = small_engine(64, 2, 2);
    let mut session = engine.open(0).unwrap();

    engine
        .control(&mut session, ControlCommand::SetPriority, 0)
        .unwrap();
    engine
        .control(&mut session, ControlCommand::SetPriority, 0)
        .unwrap();
    assert_eq!(session.priority(), Priority::Low);

    engine
        .control(&mut session, ControlCommand::SetBlocking, 7)
        .unwrap();
    engine
        .control(&mut session, ControlCommand::SetBlocking, 7)
        .unwrap();
    assert_eq!(session.timeout_units(), 7);
}
