//! Output sinks for device updates
//!
//! Updates are queued and handed over in batches according to a
//! [`FlushPolicy`]. A batch stays queued until it has been written, so a
//! failed flush is retried on the next opportunity and nothing is lost
//! (a retried batch may be written twice).

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::devices::DeviceUpdate;
use crate::simulation::clock::WallClock;
use crate::simulation::FlushError;
use crate::types::{QueueCriterion, ScenarioConfig};

/// Receives device updates on behalf of the fleet backend
pub trait OutputSink: Send + fmt::Debug {
    /// Queue an update
    fn post(&mut self, update: DeviceUpdate);

    /// Write the queue if the flush policy says so; returns how many updates
    /// were written
    fn flush_if_ready(&mut self) -> Result<usize, FlushError>;

    /// Write the whole queue
    fn flush_now(&mut self) -> Result<usize, FlushError>;

    /// The run has caught up with real time
    fn enter_interactive(&mut self) -> Result<(), FlushError>;

    /// The run is over; derived backend state should be recomputed
    fn recalc_historical(&mut self) -> Result<(), FlushError>;

    /// Updates waiting to be written
    fn queued(&self) -> usize;

    /// Updates written so far
    fn posted_count(&self) -> usize;
}

/// When queued updates are written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushPolicy {
    /// Criterion
    pub criterion: QueueCriterion,
    /// Threshold: an update count or a number of wall-clock seconds
    pub limit: f64,
}

impl FlushPolicy {
    /// Flush after every update
    pub fn interactive() -> Self {
        Self { criterion: QueueCriterion::Interactive, limit: 1.0 }
    }

    /// Policy from the `queue_criterion` and `queue_limit` options
    pub fn from_config(config: &ScenarioConfig) -> Self {
        Self { criterion: config.queue_criterion, limit: config.queue_limit }
    }

    /// Whether `queued` updates, the last flush `since_flush` seconds ago,
    /// should be written now
    pub fn is_ready(&self, queued: usize, since_flush: f64) -> bool {
        if queued == 0 {
            return false;
        }
        match self.criterion {
            QueueCriterion::Interactive => true,
            QueueCriterion::Messages => queued as f64 >= self.limit,
            QueueCriterion::Time => since_flush >= self.limit,
        }
    }
}

/// Writes each update as one JSON object per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    policy: FlushPolicy,
    queue: Vec<DeviceUpdate>,
    wall: Arc<dyn WallClock>,
    last_flush: f64,
    posted: usize,
    interactive: bool,
    recalcs: usize,
}

impl<W: Write + Send> fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("policy", &self.policy)
            .field("queued", &self.queue.len())
            .field("posted", &self.posted)
            .field("interactive", &self.interactive)
            .finish()
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Create a sink writing to `writer`
    pub fn new(writer: W, policy: FlushPolicy, wall: Arc<dyn WallClock>) -> Self {
        let last_flush = wall.now();
        Self {
            writer,
            policy,
            queue: Vec::new(),
            wall,
            last_flush,
            posted: 0,
            interactive: false,
            recalcs: 0,
        }
    }

    /// Current flush policy
    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Whether the sink has switched to interactive flushing
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Number of recalculation requests received
    pub fn recalc_count(&self) -> usize {
        self.recalcs
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_batch(&mut self) -> Result<usize, FlushError> {
        if self.queue.is_empty() {
            return Ok(0);
        }
        let mut buffer = Vec::with_capacity(self.queue.len() * 128);
        for update in &self.queue {
            serde_json::to_writer(&mut buffer, update)?;
            buffer.push(b'\n');
        }
        self.writer.write_all(&buffer)?;
        self.writer.flush()?;

        let written = self.queue.len();
        self.queue.clear();
        self.posted += written;
        self.last_flush = self.wall.now();
        debug!(written, total = self.posted, "Flushed device updates");
        Ok(written)
    }
}

impl<W: Write + Send> OutputSink for JsonLinesSink<W> {
    fn post(&mut self, update: DeviceUpdate) {
        self.queue.push(update);
    }

    fn flush_if_ready(&mut self) -> Result<usize, FlushError> {
        let since = self.wall.now() - self.last_flush;
        if self.policy.is_ready(self.queue.len(), since) {
            self.write_batch()
        } else {
            Ok(0)
        }
    }

    fn flush_now(&mut self) -> Result<usize, FlushError> {
        self.write_batch()
    }

    fn enter_interactive(&mut self) -> Result<(), FlushError> {
        if !self.interactive {
            self.interactive = true;
            self.policy = FlushPolicy::interactive();
            info!("Output switched to interactive flushing");
        }
        self.write_batch().map(|_| ())
    }

    fn recalc_historical(&mut self) -> Result<(), FlushError> {
        self.recalcs += 1;
        info!(posted = self.posted, "Historical recalculation requested");
        Ok(())
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }

    fn posted_count(&self) -> usize {
        self.posted
    }
}

/// Keeps every written update in memory
///
/// Clones share the same storage, so a caller can keep one clone to inspect
/// what a run produced.
#[derive(Debug, Clone)]
pub struct CollectingSink {
    written: Arc<Mutex<Vec<DeviceUpdate>>>,
    queue: Vec<DeviceUpdate>,
    policy: FlushPolicy,
    interactive: Arc<AtomicBool>,
}

impl CollectingSink {
    /// Create a sink flushing according to `policy`
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            queue: Vec::new(),
            policy,
            interactive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Updates written so far, oldest first
    pub fn updates(&self) -> Vec<DeviceUpdate> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether the run has switched to interactive mode
    pub fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::Acquire)
    }

    fn write_batch(&mut self) -> usize {
        let count = self.queue.len();
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(&mut self.queue);
        count
    }
}

impl OutputSink for CollectingSink {
    fn post(&mut self, update: DeviceUpdate) {
        self.queue.push(update);
    }

    fn flush_if_ready(&mut self) -> Result<usize, FlushError> {
        // No wall clock here; the time criterion flushes on every check
        if self.policy.is_ready(self.queue.len(), f64::INFINITY) {
            Ok(self.write_batch())
        } else {
            Ok(0)
        }
    }

    fn flush_now(&mut self) -> Result<usize, FlushError> {
        Ok(self.write_batch())
    }

    fn enter_interactive(&mut self) -> Result<(), FlushError> {
        self.interactive.store(true, Ordering::Release);
        self.policy = FlushPolicy::interactive();
        self.write_batch();
        Ok(())
    }

    fn recalc_historical(&mut self) -> Result<(), FlushError> {
        Ok(())
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }

    fn posted_count(&self) -> usize {
        self.written.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Open the sink named by the `output` option: a file, or stdout
pub fn open_sink(config: &ScenarioConfig, wall: Arc<dyn WallClock>) -> io::Result<Box<dyn OutputSink>> {
    let policy = FlushPolicy::from_config(config);
    match &config.output {
        Some(path) => {
            let file = File::create(path)?;
            info!(path = %path, criterion = %policy.criterion, "Writing device updates to file");
            Ok(Box::new(JsonLinesSink::new(BufWriter::new(file), policy, wall)))
        }
        None => Ok(Box::new(JsonLinesSink::new(io::stdout(), policy, wall))),
    }
}
