// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// ArduCam Mega Stream Scheduler Tests
//
// TESTING LAYERS:
//
// Layer 1 (Simulator - No hardware required):
//   - test_continuous_backpressure: ticks without buffers start nothing
//   - test_continuous_recycles_buffers: steady state frame loop
//   - test_single_shot_waits_for_buffer: single shot before enqueue
//   - test_start_rules: invalid and repeated starts
//   - test_period_beyond_clock_range: oversized period is refused
//   - test_stop_lets_capture_finish: stop during a capture
//   - test_randomized_interleavings: buffer custody under random traffic
//   - test_drop_with_capture_in_flight: teardown while capturing
//
// Timing sensitive tests are serialized.
//
// RUN:
//   cargo test --test streaming

use arducam_mega::{
    create_camera,
    sim::{SimHandle, SimulatedSensor},
    BufferQueueing, BufferStatus, CaptureConfig, CaptureState, Device, Notify, QueueError, Signal,
    SignalResult, StateError, StreamMode, Streaming, VideoBuffer,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serial_test::serial;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

const WAIT: Duration = Duration::from_secs(5);
const FRAME_LEN: usize = 1500;

fn open() -> (Device, SimHandle, Arc<Signal>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let (sensor, handle) = SimulatedSensor::new();
    handle.set_default_frame_len(FRAME_LEN);
    let signal = Arc::new(Signal::new());
    let device = create_camera()
        .with_config(
            CaptureConfig::default()
                .with_chunk_size(512)
                .with_reset_delay(Duration::ZERO)
                .with_poll_interval(Duration::from_millis(1)),
        )
        .with_signal(signal.clone())
        .open(sensor)
        .expect("open simulated camera");
    (device, handle, signal)
}

#[test]
#[serial]
fn test_continuous_backpressure() {
    let (device, handle, signal) = open();
    let period = Duration::from_millis(33);

    device.start(StreamMode::Continuous(period)).unwrap();
    thread::sleep(period * 4);
    assert_eq!(handle.captures_started(), 0);
    assert_eq!(signal.count(), 0);
    assert_eq!(device.capture_state(), CaptureState::Idle);

    let enqueued = Instant::now();
    device.enqueue(VideoBuffer::new(4096)).unwrap();
    let buf = device.dequeue(WAIT).unwrap();
    assert_eq!(buf.status(), BufferStatus::Filled);
    assert_eq!(buf.bytes_used(), FRAME_LEN);
    // the cycle waits for the next tick instead of starting on enqueue
    assert!(enqueued.elapsed() <= period + Duration::from_secs(1));

    thread::sleep(period * 3);
    assert_eq!(handle.captures_started(), 1);
    assert_eq!(signal.count(), 1);
    device.stop();
}

#[test]
#[serial]
fn test_continuous_recycles_buffers() {
    let (device, handle, signal) = open();
    for _ in 0..3 {
        device.enqueue(VideoBuffer::new(2048)).unwrap();
    }
    device
        .start(StreamMode::Continuous(Duration::from_millis(5)))
        .unwrap();

    let mut last = 0;
    for _ in 0..12 {
        let buf = device.dequeue(WAIT).unwrap();
        assert_eq!(buf.status(), BufferStatus::Filled);
        assert!(buf.sequence() > last, "sequence must increase");
        last = buf.sequence();
        device.enqueue(buf).unwrap();
    }

    device.stop();
    device.flush(false);
    let mut drained = 0;
    while device.dequeue(Duration::ZERO).is_ok() {
        drained += 1;
    }
    assert_eq!(drained, 3);

    // the notifier runs after the buffer is handed back
    thread::sleep(Duration::from_millis(50));
    assert_eq!(signal.count(), handle.captures_started());
}

#[test]
#[serial]
fn test_single_shot_waits_for_buffer() {
    let (device, handle, signal) = open();

    device.start(StreamMode::SingleShot).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(device.stream_mode(), StreamMode::SingleShot);
    assert_eq!(handle.captures_started(), 0);

    device.enqueue(VideoBuffer::new(4096)).unwrap();
    device.enqueue(VideoBuffer::new(4096)).unwrap();
    assert_eq!(device.dequeue(WAIT).unwrap().status(), BufferStatus::Filled);
    assert_eq!(signal.poll(WAIT), Some(SignalResult::Done));

    thread::sleep(Duration::from_millis(30));
    assert_eq!(device.stream_mode(), StreamMode::Stopped);
    assert_eq!(handle.captures_started(), 1);
    assert_eq!(device.snapshot().incoming.len(), 1);
}

#[test]
fn test_start_rules() {
    let (device, _handle, _signal) = open();

    assert_eq!(
        device.start(StreamMode::Stopped),
        Err(StateError::InvalidMode(StreamMode::Stopped))
    );
    assert_eq!(
        device.start(StreamMode::Continuous(Duration::ZERO)),
        Err(StateError::InvalidMode(StreamMode::Continuous(Duration::ZERO)))
    );

    let mode = StreamMode::Continuous(Duration::from_millis(100));
    device.start(mode).unwrap();
    assert_eq!(
        device.start(StreamMode::SingleShot),
        Err(StateError::AlreadyStreaming(mode))
    );
    device.stop();
    device.stop();
    assert_eq!(device.stream_mode(), StreamMode::Stopped);
    device.start(StreamMode::SingleShot).unwrap();
}

#[test]
fn test_period_beyond_clock_range() {
    let (device, _handle, signal) = open();
    let forever = StreamMode::Continuous(Duration::from_secs(u64::MAX));

    assert_eq!(device.start(forever), Err(StateError::InvalidMode(forever)));
    assert_eq!(device.stream_mode(), StreamMode::Stopped);

    // the worker is still alive and serving cycles
    device.reclaim().unwrap();
    device.enqueue(VideoBuffer::new(4096)).unwrap();
    device.start(StreamMode::SingleShot).unwrap();
    let buf = device.dequeue(WAIT).unwrap();
    assert_eq!(buf.status(), BufferStatus::Filled);
    assert_eq!(buf.bytes_used(), FRAME_LEN);
    assert_eq!(signal.poll(WAIT), Some(SignalResult::Done));
}

#[test]
#[serial]
fn test_stop_lets_capture_finish() {
    let (device, handle, signal) = open();
    handle.set_capture_latency(50);

    device.enqueue(VideoBuffer::new(4096)).unwrap();
    device
        .start(StreamMode::Continuous(Duration::from_millis(1)))
        .unwrap();

    let start = Instant::now();
    while device.snapshot().active.is_none() {
        assert!(start.elapsed() < WAIT);
        thread::sleep(Duration::from_millis(1));
    }
    device.stop();

    let buf = device.dequeue(WAIT).unwrap();
    assert_eq!(buf.status(), BufferStatus::Filled);
    assert_eq!(signal.poll(WAIT), Some(SignalResult::Done));
    assert_eq!(device.capture_state(), CaptureState::Idle);
}

#[test]
#[serial]
fn test_randomized_interleavings() {
    const BUFFERS: usize = 6;

    let (device, _handle, _signal) = open();
    let cycles = Arc::new(AtomicUsize::new(0));
    let counter: Arc<dyn Notify> = {
        let cycles = Arc::clone(&cycles);
        Arc::new(move |_: SignalResult| {
            cycles.fetch_add(1, Ordering::SeqCst);
        })
    };
    device.set_signal(Some(counter)).unwrap();

    let mut rng = StdRng::seed_from_u64(0x00a4_dcaf);
    let mut pool: Vec<VideoBuffer> = (0..BUFFERS).map(|_| VideoBuffer::new(2048)).collect();
    let ids: HashSet<u64> = pool.iter().map(VideoBuffer::id).collect();

    device
        .start(StreamMode::Continuous(Duration::from_millis(2)))
        .unwrap();

    for _ in 0..400 {
        match rng.random_range(0..10) {
            0..=3 => {
                if let Some(buf) = pool.pop() {
                    device.enqueue(buf).unwrap();
                }
            }
            4..=6 => match device.dequeue(Duration::ZERO) {
                Ok(buf) => {
                    match buf.status() {
                        BufferStatus::Filled => assert_eq!(buf.bytes_used(), FRAME_LEN),
                        BufferStatus::Aborted => assert_eq!(buf.bytes_used(), 0),
                        status => panic!("unexpected status {:?}", status),
                    }
                    pool.push(buf);
                }
                Err(err) => assert_eq!(err, QueueError::Empty),
            },
            7 => device.flush(rng.random_bool(0.5)),
            _ => {
                let snap = device.snapshot();
                let mut seen = HashSet::new();
                for id in snap
                    .incoming
                    .iter()
                    .chain(snap.active.iter())
                    .chain(snap.outgoing.iter())
                {
                    assert!(seen.insert(*id), "buffer {} held twice", id);
                }
                for buf in &pool {
                    assert!(!seen.contains(&buf.id()), "buffer {} in two places", buf.id());
                }
                assert!(seen.len() + pool.len() <= BUFFERS);
            }
        }

        if rng.random_bool(0.3) {
            thread::sleep(Duration::from_micros(rng.random_range(0..3000)));
        }
    }

    device.stop();
    device.flush(false);
    while pool.len() < BUFFERS {
        pool.push(device.dequeue(WAIT).unwrap());
    }

    let returned: HashSet<u64> = pool.iter().map(VideoBuffer::id).collect();
    assert_eq!(returned, ids);
    assert_eq!(device.snapshot().active, None);
    assert!(cycles.load(Ordering::SeqCst) > 0);
}

#[test]
fn test_drop_with_capture_in_flight() {
    let (device, handle, _signal) = open();
    handle.set_capture_latency(100);
    device.enqueue(VideoBuffer::new(4096)).unwrap();
    device.start(StreamMode::SingleShot).unwrap();

    let start = Instant::now();
    while device.snapshot().active.is_none() {
        assert!(start.elapsed() < WAIT);
        thread::sleep(Duration::from_millis(1));
    }

    let start = Instant::now();
    drop(device);
    assert!(start.elapsed() < WAIT);
}
