//! Frame timing and link counters

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frame timing statistics
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Average frame time in milliseconds
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Median frame time
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    /// Number of samples in the statistics
    pub sample_count: usize,
}

/// Counters kept by the frame link thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Packets fully written to the transport
    pub frames_sent: u64,
    /// Frames skipped because a write was still in flight
    pub frames_dropped: u64,
    pub send_errors: u64,
    pub bytes_sent: u64,
    /// Sequence number of the last frame handed to the link thread
    pub last_seq: Option<u16>,
}

impl LinkStats {
    /// Status line, e.g. `link: sent 120 seq 119 drop 3`
    pub fn status_line(&self) -> String {
        let mut line = format!("link: sent {}", self.frames_sent);
        if let Some(seq) = self.last_seq {
            line.push_str(&format!(" seq {seq}"));
        }
        line.push_str(&format!(" drop {}", self.frames_dropped));
        if self.send_errors > 0 {
            line.push_str(&format!(" err {}", self.send_errors));
        }
        line
    }
}

/// Rolling CPU timing of the tick loop
pub struct FrameProfiler {
    frame_times: VecDeque<Duration>,
    /// Maximum samples to keep (5 seconds at 60fps)
    max_samples: usize,
    last_frame_start: Option<Instant>,
    frame_starts: VecDeque<Instant>,
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProfiler {
    pub fn new() -> Self {
        Self::with_capacity(300)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        let max_samples = max_samples.max(2);
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples,
            last_frame_start: None,
            frame_starts: VecDeque::with_capacity(max_samples),
        }
    }

    /// Mark the beginning of a frame
    pub fn begin_frame(&mut self) {
        self.record(Instant::now());
    }

    fn record(&mut self, now: Instant) {
        if let Some(start) = self.last_frame_start {
            self.frame_times.push_back(now.saturating_duration_since(start));
            if self.frame_times.len() > self.max_samples {
                self.frame_times.pop_front();
            }
        }
        self.last_frame_start = Some(now);

        self.frame_starts.push_back(now);
        if self.frame_starts.len() > self.max_samples {
            self.frame_starts.pop_front();
        }
    }

    pub fn stats(&self) -> FrameStats {
        if self.frame_times.is_empty() {
            return FrameStats::default();
        }

        let mut times: Vec<f64> = self.frame_times.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        times.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = times.iter().sum();
        FrameStats {
            avg_ms: sum / times.len() as f64,
            min_ms: times.first().copied().unwrap_or(0.0),
            max_ms: times.last().copied().unwrap_or(0.0),
            p50_ms: percentile(&times, 0.50),
            p95_ms: percentile(&times, 0.95),
            p99_ms: percentile(&times, 0.99),
            sample_count: times.len(),
        }
    }

    /// Frames per second over the sample window
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frame_starts.front(), self.frame_starts.back()) else {
            return 0.0;
        };
        let duration = last.saturating_duration_since(*first).as_secs_f64();
        if self.frame_starts.len() < 2 || duration <= 0.0 {
            return 0.0;
        }
        (self.frame_starts.len() - 1) as f64 / duration
    }

    pub fn last_frame_time_ms(&self) -> f64 {
        self.frame_times.back().map(|d| d.as_secs_f64() * 1000.0).unwrap_or(0.0)
    }
}

/// Percentile from a sorted slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx]
}
