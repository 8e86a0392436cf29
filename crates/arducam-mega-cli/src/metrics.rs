// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use serde::Serialize;
use std::time::Instant;

/// Capture metrics collected during a run
#[derive(Debug, Clone, Serialize)]
pub struct CaptureMetrics {
    /// Frames delivered with a complete payload
    pub frames_captured: u64,
    /// Total payload bytes delivered
    pub bytes_captured: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Average throughput in frames per second
    pub throughput_fps: f64,
    /// Average bandwidth in megabits per second
    pub bandwidth_mbps: f64,
    /// Minimum wait for a frame in microseconds
    pub latency_min_us: u64,
    /// Maximum wait for a frame in microseconds
    pub latency_max_us: u64,
    /// Average wait for a frame in microseconds
    pub latency_avg_us: u64,
    /// 50th percentile (median) wait in microseconds
    pub latency_p50_us: u64,
    /// 95th percentile wait in microseconds
    pub latency_p95_us: u64,
    /// 99th percentile wait in microseconds
    pub latency_p99_us: u64,
    /// Capture sequence numbers that never produced a frame
    pub dropped_frames: u64,
    /// Capture cycles that faulted
    pub faults: u64,
    /// Buffers handed back without data by a flush
    pub aborted: u64,
}

/// Collector for per-frame capture statistics
pub struct MetricsCollector {
    start_time: Instant,
    latencies_us: Vec<u64>,
    bytes: u64,
    prev_sequence: Option<u64>,
    dropped_frames: u64,
    faults: u64,
    aborted: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            latencies_us: Vec::new(),
            bytes: 0,
            prev_sequence: None,
            dropped_frames: 0,
            faults: 0,
            aborted: 0,
        }
    }

    /// Record one delivered frame
    pub fn record_frame(&mut self, latency_us: u64, bytes: usize) {
        self.latencies_us.push(latency_us);
        self.bytes += bytes as u64;
    }

    pub fn record_fault(&mut self) {
        self.faults += 1;
    }

    pub fn record_aborted(&mut self) {
        self.aborted += 1;
    }

    /// Track capture sequence numbers to detect frames lost to faults
    /// Returns the number of missing sequence numbers before this one
    pub fn track_sequence(&mut self, sequence: u64) -> u64 {
        let drops = match self.prev_sequence {
            Some(prev) if sequence > prev + 1 => sequence - prev - 1,
            Some(prev) if sequence <= prev => {
                log::warn!("Capture sequence did not advance: {} -> {}", prev, sequence);
                0
            }
            _ => 0,
        };

        self.dropped_frames += drops;
        self.prev_sequence = Some(sequence);
        drops
    }

    /// Finalize and calculate all metrics
    pub fn finalize(&mut self) -> CaptureMetrics {
        let duration = self.start_time.elapsed();
        let duration_ms = duration.as_millis() as u64;
        let duration_secs = duration.as_secs_f64();

        let frames_captured = self.latencies_us.len() as u64;

        let throughput_fps = if duration_secs > 0.0 {
            frames_captured as f64 / duration_secs
        } else {
            0.0
        };

        let bandwidth_mbps = if duration_secs > 0.0 {
            (self.bytes as f64 * 8.0) / (duration_secs * 1_000_000.0)
        } else {
            0.0
        };

        self.latencies_us.sort_unstable();
        let min_us = self.latencies_us.first().copied().unwrap_or(0);
        let max_us = self.latencies_us.last().copied().unwrap_or(0);
        let avg_us = if frames_captured > 0 {
            self.latencies_us.iter().sum::<u64>() / frames_captured
        } else {
            0
        };

        CaptureMetrics {
            frames_captured,
            bytes_captured: self.bytes,
            duration_ms,
            throughput_fps,
            bandwidth_mbps,
            latency_min_us: min_us,
            latency_max_us: max_us,
            latency_avg_us: avg_us,
            latency_p50_us: self.percentile(50.0),
            latency_p95_us: self.percentile(95.0),
            latency_p99_us: self.percentile(99.0),
            dropped_frames: self.dropped_frames,
            faults: self.faults,
            aborted: self.aborted,
        }
    }

    /// Calculate percentile from sorted latency data
    /// Assumes self.latencies_us is already sorted
    fn percentile(&self, p: f64) -> u64 {
        if self.latencies_us.is_empty() {
            return 0;
        }

        let len = self.latencies_us.len();
        let idx = ((p / 100.0) * (len - 1) as f64).round() as usize;
        self.latencies_us[idx.min(len - 1)]
    }

    /// Print metrics in human-readable format
    pub fn print_text(&mut self) {
        let metrics = self.finalize();
        println!("\n=== Capture Metrics ===");
        println!("Frames captured:   {}", metrics.frames_captured);
        println!(
            "Bytes captured:    {} ({:.2} MB)",
            metrics.bytes_captured,
            metrics.bytes_captured as f64 / 1_048_576.0
        );
        println!(
            "Duration:          {:.2} s",
            metrics.duration_ms as f64 / 1000.0
        );
        println!("Throughput:        {:.2} fps", metrics.throughput_fps);
        println!("Bandwidth:         {:.2} Mbps", metrics.bandwidth_mbps);

        if metrics.frames_captured > 0 {
            println!("\nFrame Wait (us):");
            println!("  Min:    {}", metrics.latency_min_us);
            println!("  Max:    {}", metrics.latency_max_us);
            println!("  Avg:    {}", metrics.latency_avg_us);
            println!("  P50:    {}", metrics.latency_p50_us);
            println!("  P95:    {}", metrics.latency_p95_us);
            println!("  P99:    {}", metrics.latency_p99_us);
        }

        if metrics.dropped_frames > 0 || metrics.faults > 0 {
            println!("\nDropped frames:    {}", metrics.dropped_frames);
            println!("Faults:            {}", metrics.faults);
        }
        if metrics.aborted > 0 {
            println!("Aborted buffers:   {}", metrics.aborted);
        }
    }

    /// Print metrics in JSON format
    pub fn print_json(&mut self) -> Result<(), serde_json::Error> {
        let metrics = self.finalize();
        let json = serde_json::to_string_pretty(&metrics)?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_calculation() {
        let mut collector = MetricsCollector::new();

        // 0, 10, 20, ..., 100 (11 values)
        for i in 0..=10 {
            collector.record_frame(i * 10, 0);
        }

        let metrics = collector.finalize();
        assert_eq!(metrics.latency_p50_us, 50);
        assert_eq!(metrics.latency_p95_us, 100);
        assert_eq!(metrics.latency_min_us, 0);
        assert_eq!(metrics.latency_max_us, 100);
        assert_eq!(metrics.latency_avg_us, 50);
    }

    #[test]
    fn test_sequence_gaps() {
        let mut collector = MetricsCollector::new();

        collector.track_sequence(1);
        collector.track_sequence(2);
        // sequence 3 and 4 faulted
        assert_eq!(collector.track_sequence(5), 2);
        assert_eq!(collector.track_sequence(6), 0);
        assert_eq!(collector.dropped_frames, 2);
    }

    #[test]
    fn test_faults_and_aborts() {
        let mut collector = MetricsCollector::new();
        collector.record_fault();
        collector.record_aborted();
        collector.record_aborted();
        collector.record_frame(10, 3000);

        let metrics = collector.finalize();
        assert_eq!(metrics.faults, 1);
        assert_eq!(metrics.aborted, 2);
        assert_eq!(metrics.frames_captured, 1);
        assert_eq!(metrics.bytes_captured, 3000);
    }

    #[test]
    fn test_empty_metrics() {
        let mut collector = MetricsCollector::new();
        let metrics = collector.finalize();

        assert_eq!(metrics.frames_captured, 0);
        assert_eq!(metrics.bytes_captured, 0);
        assert_eq!(metrics.latency_min_us, 0);
        assert_eq!(metrics.latency_max_us, 0);
    }
}
