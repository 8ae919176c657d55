//! Process-wide rate limiter (spec.md §4.7), acquired once per provider
//! attempt (including retries).
//!
//! Capacity = `rpm`; refill rate = capacity / 60 per second. `acquire()`
//! blocks cooperatively (via the injected [`Clock`], never a busy spin)
//! until at least one token is available. `rpm <= 0` disables the bucket
//! entirely (§8 boundary behavior).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::clock::Clock;

struct State {
    tokens: f64,
    last_refill_ms: u64,
}

pub struct TokenBucket {
    capacity: f64,
    refill_per_ms: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    enabled: bool,
}

impl TokenBucket {
    pub fn new(rpm: u32, clock: Arc<dyn Clock>) -> Self {
        let capacity = rpm as f64;
        Self {
            capacity,
            refill_per_ms: capacity / 60.0 / 1000.0,
            enabled: rpm > 0,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill_ms: clock.now_ms(),
            }),
            clock,
        }
    }

    /// Blocks until one token is available; no-op when disabled.
    pub async fn acquire(&self) {
        if !self.enabled {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = self.clock.now_ms();
                let elapsed = now.saturating_sub(state.last_refill_ms) as f64;
                state.tokens = (state.tokens + elapsed * self.refill_per_ms).min(self.capacity);
                state.last_refill_ms = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    let wait_ms = (deficit / self.refill_per_ms).ceil().max(1.0) as u64;
                    Some(Duration::from_millis(wait_ms))
                }
            };

            match wait {
                None => return,
                Some(delay) => self.clock.sleep(delay).await,
            }
        }
    }
}
