// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::metrics::MetricsCollector;
use crate::utils;
use arducam_mega::{
    create_camera, sim::SimulatedSensor, BufferQueueing, BufferStatus, CaptureConfig, Device,
    PixelFormat, QueueError, Signal, StateError, StreamMode, Streaming, VideoBuffer,
};
use clap::Args as ClapArgs;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Sensor model of the simulated module (3mp or 5mp)
    #[arg(short, long, default_value = "5mp")]
    model: String,

    /// Resolution in WxH format
    #[arg(short, long, default_value = "320x240")]
    resolution: String,

    /// Pixel format (jpeg, rgb565, yuv or a FOURCC)
    #[arg(long, default_value = "jpeg")]
    format: String,

    /// JPEG quality (low, medium, high)
    #[arg(long, default_value = "medium")]
    quality: String,

    /// Number of buffers in the pool
    #[arg(short, long, default_value = "4")]
    buffers: usize,

    /// Capacity of each buffer in bytes (default: fits one frame)
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Bytes read per FIFO transaction
    #[arg(long, default_value = "4096")]
    chunk_size: usize,

    /// Frame length produced by the simulated module (default: derived from format)
    #[arg(long)]
    frame_size: Option<usize>,

    /// Status polls before the simulated module reports capture done
    #[arg(long, default_value = "0")]
    latency: u32,

    /// Capture period for continuous streaming (e.g. 33ms); single-shot when omitted
    #[arg(short, long)]
    period: Option<String>,

    /// Number of frames to capture (0=unlimited)
    #[arg(short, long, default_value = "10")]
    frames: u64,

    /// Directory to write captured frames into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print capture metrics on exit
    #[arg(long)]
    metrics: bool,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Capture parameters: {:?}", args);

    let (model, sensor_id) = utils::parse_model(&args.model)?;
    let (width, height) = utils::parse_resolution(&args.resolution)?;
    let format = utils::parse_pixel_format(&args.format)?;
    let quality = utils::parse_quality(&args.quality)?;
    let mode = match &args.period {
        Some(period) => StreamMode::Continuous(utils::parse_period(period)?),
        None => StreamMode::SingleShot,
    };

    if args.buffers == 0 {
        return Err(CliError::InvalidArgs(
            "At least one buffer is required".to_string(),
        ));
    }

    let frame_size = args
        .frame_size
        .unwrap_or_else(|| default_frame_size(format, width, height));
    let buffer_size = args.buffer_size.unwrap_or(frame_size);

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir).map_err(|e| {
            CliError::General(format!("Failed to create {}: {}", dir.display(), e))
        })?;
    }

    let term = utils::install_signal_handler()?;

    let (sensor, handle) = SimulatedSensor::new();
    handle.set_sensor_id(sensor_id);
    handle.set_default_frame_len(frame_size);
    handle.set_capture_latency(args.latency);

    let signal = Arc::new(Signal::new());
    let device = create_camera()
        .with_resolution(width, height)
        .with_format(format)
        .with_quality(quality)
        .with_config(
            CaptureConfig::default()
                .with_chunk_size(args.chunk_size)
                .with_reset_delay(Duration::from_millis(10)),
        )
        .with_signal(signal.clone())
        .open(sensor)?;
    log::info!(
        "Opened {} at {}x{} {} ({} byte frames)",
        model,
        width,
        height,
        format,
        frame_size
    );

    for _ in 0..args.buffers {
        device.enqueue(VideoBuffer::new(buffer_size))?;
    }

    let max_frames = if args.frames == 0 {
        u64::MAX
    } else {
        args.frames
    };
    log::info!(
        "Capturing {} frames, {} (Ctrl+C to stop)...",
        if max_frames == u64::MAX {
            "unlimited".to_string()
        } else {
            max_frames.to_string()
        },
        mode
    );

    let mut metrics = MetricsCollector::new();
    let mut frame_count = 0u64;
    device.start(mode)?;
    let mut waiting = Instant::now();

    while frame_count < max_frames && !term.load(Ordering::Relaxed) {
        let buffer = match device.dequeue(Duration::from_millis(500)) {
            Ok(buffer) => buffer,
            Err(QueueError::Timeout) => continue,
            Err(err) => return Err(err.into()),
        };

        match buffer.status() {
            BufferStatus::Filled => {
                let waited = waiting.elapsed().as_micros() as u64;
                metrics.record_frame(waited, buffer.bytes_used());
                let dropped = metrics.track_sequence(buffer.sequence());
                if dropped > 0 {
                    log::warn!("{} frames lost before frame {}", dropped, buffer.sequence());
                }
                if let Some(dir) = &args.output {
                    write_frame(dir, format, &buffer)?;
                }
                frame_count += 1;
                log::debug!(
                    "Frame {} ({} bytes)",
                    buffer.sequence(),
                    buffer.bytes_used()
                );
            }
            BufferStatus::Error => {
                metrics.record_fault();
                log::warn!("Capture {} faulted, reclaiming", buffer.sequence());
                device.reclaim()?;
            }
            BufferStatus::Aborted | BufferStatus::Queued => metrics.record_aborted(),
        }

        device.enqueue(buffer)?;
        waiting = Instant::now();

        if mode == StreamMode::SingleShot && frame_count < max_frames {
            restart_single_shot(&device, &signal)?;
        }
    }

    if term.load(Ordering::Relaxed) {
        log::info!("Received Ctrl+C, stopping...");
    }

    device.stop();
    device.flush(true);
    log::info!(
        "Captured {} frames ({} capture triggers)",
        frame_count,
        handle.captures_started()
    );

    if json {
        metrics
            .print_json()
            .map_err(|e| CliError::General(format!("Failed to output JSON metrics: {}", e)))?;
    } else if args.metrics {
        metrics.print_text();
    }

    Ok(())
}

/// Frame length the simulated module produces by default
fn default_frame_size(format: PixelFormat, width: u32, height: u32) -> usize {
    let pixels = width as usize * height as usize;
    match format {
        // roughly 1.6 bits per pixel at medium quality
        PixelFormat::Jpeg => (pixels / 5).max(64),
        _ => pixels * format.bytes_per_pixel() as usize,
    }
}

/// Single-shot drops back to `Stopped` right after the cycle is reported;
/// start the next one once it has.
fn restart_single_shot(device: &Device, signal: &Signal) -> Result<(), CliError> {
    signal.poll(Duration::from_secs(1));
    let deadline = Instant::now() + Duration::from_secs(1);

    loop {
        match device.start(StreamMode::SingleShot) {
            Ok(()) => return Ok(()),
            Err(StateError::AlreadyStreaming(_)) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn write_frame(dir: &Path, format: PixelFormat, buffer: &VideoBuffer) -> Result<(), CliError> {
    let path = dir.join(format!(
        "frame_{:05}.{}",
        buffer.sequence(),
        utils::frame_extension(format)
    ));
    fs::write(&path, buffer.data())
        .map_err(|e| CliError::General(format!("Failed to write {}: {}", path.display(), e)))?;
    log::trace!("Wrote {}", path.display());
    Ok(())
}
