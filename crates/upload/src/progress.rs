//! Progress reporting for upload sessions.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Events emitted by a session while it runs.
///
/// Delivery is best-effort: a full or dropped receiver never stalls the
/// upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A block worker began uploading.
    BlockStarted { block: usize, size: u64 },
    /// One chunk was acknowledged by the server.
    ChunkUploaded {
        block: usize,
        chunk: usize,
        bytes: u64,
        /// Cumulative acknowledged bytes across all blocks.
        bytes_sent: u64,
        total: u64,
    },
    /// A block's final context was recorded.
    BlockCompleted { block: usize },
    /// The assembled object was accepted.
    Completed { total: u64, blocks: usize },
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct Sample {
    bytes: u64,
    at: Instant,
}

/// Sliding-window throughput estimate over acknowledged bytes.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<Sample>,
    window: Duration,
    max_samples: usize,
}

impl SpeedCalculator {
    /// Creates a calculator; defaults: 5 s window, 100 retained samples.
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                window: window.unwrap_or(Duration::from_secs(5)),
                max_samples: max_samples.unwrap_or(100),
            }),
        }
    }

    /// Records `bytes` acknowledged at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap();
        let now = Instant::now();
        s.samples.push(Sample { bytes, at: now });

        let cutoff = now - s.window;
        s.samples.retain(|sample| sample.at >= cutoff);
        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Average bytes/second inside the window; 0.0 with fewer than two
    /// samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap();
        if s.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = s.samples[s.samples.len() - 1]
            .at
            .duration_since(s.samples[0].at);
        if elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining` more bytes, if speed is known.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    pub fn reset(&self) {
        self.inner.lock().unwrap().samples.clear();
    }
}
