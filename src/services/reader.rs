//! Background acquisition loop.
//!
//! One worker thread repeatedly picks a registered device, reads one record
//! from the device interface, decodes it and stores it. A duplicate value
//! means the source has been fully replayed and ends the run.

use crate::db::error::StoreError;
use crate::db::store::ValueStore;
use crate::sensor::device::RecordSource;
use crate::sensor::record::{DecodeError, Record};
use crate::services::seed;
use core::fmt;
use log::{debug, error, info, warn};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_PROGRESS_EVERY: NonZeroU32 = NonZeroU32::new(100).unwrap();

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    /// Pause between iterations.
    pub interval: Duration,
    /// Emit a progress line every this many iterations.
    pub progress_every: NonZeroU32,
    pub seed_demo_devices: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        ReaderSettings {
            interval: DEFAULT_INTERVAL,
            progress_every: DEFAULT_PROGRESS_EVERY,
            seed_demo_devices: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Stopped,
    Running,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// `stop()` was called.
    Cancelled,
    /// A record was already stored; the source has nothing new.
    Exhausted,
    /// The worker thread panicked. Only reachable in unwinding builds; the
    /// release profile aborts the process on panic.
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub exit: Exit,
}

#[derive(Debug)]
pub enum ReaderError {
    AlreadyRunning,
    Spawn(io::Error),
}

impl Display for ReaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::AlreadyRunning => write!(f, "reader is already running"),
            ReaderError::Spawn(e) => write!(f, "spawning reader thread failed: {}", e),
        }
    }
}

impl Error for ReaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReaderError::Spawn(e) => Some(e),
            ReaderError::AlreadyRunning => None,
        }
    }
}

enum Worker {
    Idle,
    Active {
        cancel: Sender<()>,
        handle: JoinHandle<RunSummary>,
    },
}

pub struct Reader {
    store: Arc<ValueStore>,
    source: Arc<dyn RecordSource>,
    settings: ReaderSettings,
    worker: Worker,
}

impl Reader {
    pub fn new(store: Arc<ValueStore>, source: Arc<dyn RecordSource>, settings: ReaderSettings) -> Self {
        Reader {
            store,
            source,
            settings,
            worker: Worker::Idle,
        }
    }

    /// `Running` only while the worker thread is alive.
    pub fn state(&self) -> ReaderState {
        match &self.worker {
            Worker::Active { handle, .. } if !handle.is_finished() => ReaderState::Running,
            _ => ReaderState::Stopped,
        }
    }

    /// Seed demo devices (if enabled) and spawn the worker. Returns immediately.
    pub fn start(&mut self) -> Result<(), ReaderError> {
        if self.state() == ReaderState::Running {
            return Err(ReaderError::AlreadyRunning);
        }
        // reap a worker that ended on its own
        if let Some(previous) = self.join_worker(false) {
            debug!("Reader: previous run ended with {:?}", previous.exit);
        }

        if self.settings.seed_demo_devices {
            seed::register_demo_devices(&self.store);
        }

        let (cancel, cancelled) = mpsc::channel();
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let settings = self.settings.clone();
        let handle = thread::Builder::new()
            .name("rdp-reader".to_string())
            .spawn(move || run_loop(&store, source.as_ref(), &settings, &cancelled))
            .map_err(ReaderError::Spawn)?;

        info!(
            "Reader started (source={}, interval={}ms)",
            self.source.describe(),
            self.settings.interval.as_millis()
        );
        self.worker = Worker::Active { cancel, handle };
        Ok(())
    }

    /// Ask the worker to exit after its current iteration and wait for it.
    /// Returns `None` when no worker was started.
    pub fn stop(&mut self) -> Option<RunSummary> {
        self.join_worker(true)
    }

    /// Wait for the worker to end by itself, without signalling it.
    pub fn wait(&mut self) -> Option<RunSummary> {
        self.join_worker(false)
    }

    fn join_worker(&mut self, signal: bool) -> Option<RunSummary> {
        let Worker::Active { cancel, handle } = std::mem::replace(&mut self.worker, Worker::Idle) else {
            return None;
        };
        if signal {
            // the worker may already be gone
            let _ = cancel.send(());
        }
        let summary = handle.join().unwrap_or_else(|_| {
            error!("Reader thread panicked");
            RunSummary {
                iterations: 0,
                inserted: 0,
                skipped: 0,
                exit: Exit::Panicked,
            }
        });
        // dropping the sender earlier would read as a cancel
        drop(cancel);
        Some(summary)
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Inserted,
    Skipped,
    Exhausted,
}

fn run_loop(store: &ValueStore, source: &dyn RecordSource, settings: &ReaderSettings, cancelled: &Receiver<()>) -> RunSummary {
    let mut rng = rand::rng();
    let mut summary = RunSummary {
        iterations: 0,
        inserted: 0,
        skipped: 0,
        exit: Exit::Cancelled,
    };
    let mut since_progress: u32 = 0;

    loop {
        match cancelled.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        summary.iterations += 1;
        match ingest_one(store, source, &mut rng) {
            Step::Inserted => summary.inserted += 1,
            Step::Skipped => summary.skipped += 1,
            Step::Exhausted => {
                info!("Reader: all values read");
                summary.exit = Exit::Exhausted;
                break;
            }
        }

        since_progress += 1;
        if since_progress == settings.progress_every.get() {
            info!(
                "Reader: {} iterations ({} values stored, {} skipped this run)",
                summary.iterations, summary.inserted, summary.skipped
            );
            since_progress = 0;
        }

        match cancelled.recv_timeout(settings.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(
        "Reader stopped ({:?}): iterations={}, inserted={}, skipped={}",
        summary.exit, summary.iterations, summary.inserted, summary.skipped
    );
    summary
}

fn pick_device<R: Rng + ?Sized>(device_ids: &[i32], rng: &mut R) -> Option<i32> {
    device_ids.choose(rng).copied()
}

fn ingest_one<R: Rng + ?Sized>(store: &ValueStore, source: &dyn RecordSource, rng: &mut R) -> Step {
    let device_ids = match store.list_device_ids() {
        Ok(ids) => ids,
        Err(e) => {
            error!("Reader: fetching device ids failed: {}", e);
            return Step::Skipped;
        }
    };
    let Some(device_id) = pick_device(&device_ids, rng) else {
        warn!("Reader: no devices registered; retrying");
        return Step::Skipped;
    };

    let bytes = match source.read_record() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Reader: reading {} failed: {}", source.describe(), e);
            return Step::Skipped;
        }
    };
    let record = match Record::from_slice(&bytes) {
        Ok(record) => record,
        Err(DecodeError::EndOfStream) => {
            debug!("Reader: {} returned no data", source.describe());
            return Step::Skipped;
        }
        Err(e) => {
            warn!("Reader: dropping malformed record: {}", e);
            return Step::Skipped;
        }
    };
    debug!(
        "Read one time: {} type: {} and value: {} (device {})",
        record.time, record.type_id, record.value, device_id
    );

    match store.insert_value(
        record.stored_time(),
        i64::from(record.type_id),
        f64::from(record.value),
        Some(device_id),
    ) {
        Ok(_) => Step::Inserted,
        Err(StoreError::ConstraintViolation(_)) => Step::Exhausted,
        Err(e) => {
            error!("Reader: storing record failed: {}", e);
            Step::Skipped
        }
    }
}
