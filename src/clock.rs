//! Constructor-injected time source.
//!
//! Replaces the module-level monkeypatching the Python original used to
//! fake out `time.sleep` in tests (see spec.md §9) with an explicit trait
//! that production code takes a `Arc<dyn Clock>` for.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;

    /// Monotonic milliseconds since some arbitrary epoch, used for latency
    /// measurement. Real clocks use `Instant`; fake clocks can make this
    /// deterministic for tests that assert on `latency_ms`.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl Clock for RealClock {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }

    fn now_ms(&self) -> u64 {
        static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        let start = *START.get_or_init(std::time::Instant::now);
        start.elapsed().as_millis() as u64
    }
}

/// Deterministic clock for tests: `sleep` returns immediately but records
/// the requested durations, and `now_ms` advances by a fixed step on every
/// call so latency assertions stay stable across runs.
#[derive(Default)]
pub struct FakeClock {
    sleeps: std::sync::Mutex<Vec<Duration>>,
    tick_ms: AtomicU64,
    step_ms: u64,
}

impl FakeClock {
    pub fn new(step_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            sleeps: std::sync::Mutex::new(Vec::new()),
            tick_ms: AtomicU64::new(0),
            step_ms,
        })
    }

    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for FakeClock {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.sleeps.lock().unwrap().push(duration);
        Box::pin(async {})
    }

    fn now_ms(&self) -> u64 {
        self.tick_ms.fetch_add(self.step_ms, Ordering::SeqCst)
    }
}
