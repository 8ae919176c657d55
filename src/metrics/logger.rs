//! Event Logger: sink for structured records, composable the way the
//! teacher's observability layer fans a single event out to multiple
//! collectors (in-memory, on-disk) without letting one sink's failure
//! swallow another's.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use super::events::Event;

/// Sink for `provider_call` / `run_metric` events (§4.9).
pub trait EventLogger: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Records every event it receives, in order. Used by tests to assert on
/// the exact sequence of emitted events.
#[derive(Default)]
pub struct MemoryLogger {
    events: Mutex<Vec<Event>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventLogger for MemoryLogger {
    fn emit(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Appends one JSON object per line to a file, UTF-8, append-only.
///
/// Each `emit` call opens in append mode and writes a single line; there is
/// no shared in-process lock beyond serializing writes through the mutex,
/// matching §4.9's "no shared-state locking beyond append-atomicity".
pub struct JsonlLogger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventLogger for JsonlLogger {
    fn emit(&self, event: &Event) {
        let _guard = self.write_lock.lock().unwrap();
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to serialize metrics event");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            warn!(path = %self.path.display(), error = %err, "failed to append metrics event");
        }
    }
}

/// Fans one event out to every sink; a sink's failure (logged, not
/// propagated) never inhibits the others.
#[derive(Default)]
pub struct CompositeLogger {
    sinks: Vec<Box<dyn EventLogger>>,
}

impl CompositeLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Box<dyn EventLogger>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventLogger for CompositeLogger {
    fn emit(&self, event: &Event) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
