// Transport clock - the single time authority
//
// The audio callback advances the sample counter; everything else only reads it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of "now" in transport seconds
pub trait Clock {
    fn now(&self) -> f64;
}

/// Shared, monotonic transport clock driven by the audio device
#[derive(Clone, Debug)]
pub struct TransportClock {
    /// Frames rendered since the stream started (incremented by audio callback)
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl TransportClock {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Current sample position (readable from any thread)
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance by one rendered block (called from audio callback only)
    #[inline]
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Release);
    }

    /// Convert a sample count to transport seconds
    #[inline]
    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl Clock for TransportClock {
    fn now(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }
}

/// Wall-clock fallback when no audio device is driving a `TransportClock`
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}
