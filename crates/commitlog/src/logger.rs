//! Commit logger orchestration.
//!
//! The logger owns the active segment writer behind the writer lock and
//! schedules two background tasks on a shared timer period: rotation of the
//! active segment, and combine-and-condense over the sealed ones. The two
//! never contend: appenders only touch the active segment, maintenance only
//! reads sealed segments and writes `.tmp` siblings.
//!
//! Shutdown acquires the maintenance lock and then the writer lock before
//! signaling the tasks, so no task is mid-run when `shutdown` returns and
//! the on-disk state is frozen from the caller's point of view.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

use crate::config::{CommitLogConfig, COMBINING_SLACK};
use crate::error::Result;
use crate::maintenance::{Combiner, Condensor};
use crate::segment::directory::SegmentDirectory;
use crate::segment::writer::SegmentWriter;
use crate::Record;

/// Durable, append-only commit log for one HNSW index.
///
/// Appends are totally ordered by the writer lock and that order is
/// preserved on disk. Append-path errors are returned to the caller
/// unchanged; maintenance-path errors are logged and retried on the next
/// timer tick.
pub struct CommitLogger {
    inner: Arc<LoggerInner>,
    tasks: Mutex<Vec<MaintenanceTask>>,
}

struct LoggerInner {
    index: String,
    dir: SegmentDirectory,
    config: CommitLogConfig,
    writer: Mutex<SegmentWriter>,
    maintenance: Mutex<()>,
    cancelled: AtomicBool,
}

struct MaintenanceTask {
    cancel: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl CommitLogger {
    /// Open (or create) the commit log described by `config`.
    ///
    /// Resumes the newest non-tmp segment for appending, or creates a fresh
    /// one named after the current time. With a zero maintenance interval no
    /// background tasks are spawned at all and the logger is a plain
    /// appender.
    pub fn open(config: CommitLogConfig) -> Result<Self> {
        config.validate()?;

        let dir = SegmentDirectory::create(&config.root_path, &config.index_name)?;
        let writer = match dir.current()? {
            Some(existing) => SegmentWriter::open(dir.path(), existing.name())?,
            None => SegmentWriter::create(dir.path(), unix_now())?,
        };
        info!(
            target: "vektor::commitlog",
            index = %config.index_name,
            segment = %writer.name(),
            "commit log opened"
        );

        let inner = Arc::new(LoggerInner {
            index: config.index_name.clone(),
            dir,
            writer: Mutex::new(writer),
            maintenance: Mutex::new(()),
            cancelled: AtomicBool::new(false),
            config,
        });

        let logger = CommitLogger {
            inner,
            tasks: Mutex::new(Vec::new()),
        };

        if logger.inner.config.maintenance_interval.is_zero() {
            info!(
                target: "vektor::commitlog",
                index = %logger.inner.index,
                "maintenance interval is zero, background maintenance disabled"
            );
        } else {
            let mut tasks = logger.tasks.lock();
            tasks.push(spawn_task("vektor-rotate", logger.inner.clone(), |inner| {
                inner.rotate_if_needed()
            }));
            tasks.push(spawn_task("vektor-maintain", logger.inner.clone(), |inner| {
                inner.combine_and_condense()
            }));
        }

        Ok(logger)
    }

    /// Log a node joining the graph.
    pub fn add_node(&self, id: u64, level: u16) -> Result<()> {
        self.append(Record::AddNode { id, level })
    }

    /// Log an entry point change.
    pub fn set_entry_point_with_max_layer(&self, id: u64, level: u16) -> Result<()> {
        self.append(Record::SetEntryPointMaxLevel { id, level })
    }

    /// Log a single link appended at one level.
    pub fn add_link_at_level(&self, id: u64, level: u16, target: u64) -> Result<()> {
        self.append(Record::AddLinkAtLevel { id, level, target })
    }

    /// Log a batch of links appended at one level.
    pub fn add_links_at_level(&self, id: u64, level: u16, targets: Vec<u64>) -> Result<()> {
        self.append(Record::AddLinksAtLevel { id, level, targets })
    }

    /// Log a wholesale replacement of one level's link list.
    pub fn replace_links_at_level(&self, id: u64, level: u16, targets: Vec<u64>) -> Result<()> {
        self.append(Record::ReplaceLinksAtLevel { id, level, targets })
    }

    /// Log a clear of every link list on a node.
    pub fn clear_links(&self, id: u64) -> Result<()> {
        self.append(Record::ClearLinks { id })
    }

    /// Log a clear of one level's link list.
    pub fn clear_links_at_level(&self, id: u64, level: u16) -> Result<()> {
        self.append(Record::ClearLinksAtLevel { id, level })
    }

    /// Log a tombstone.
    pub fn add_tombstone(&self, id: u64) -> Result<()> {
        self.append(Record::AddTombstone { id })
    }

    /// Log a tombstone removal.
    pub fn remove_tombstone(&self, id: u64) -> Result<()> {
        self.append(Record::RemoveTombstone { id })
    }

    /// Log a physical node deletion.
    pub fn delete_node(&self, id: u64) -> Result<()> {
        self.append(Record::DeleteNode { id })
    }

    /// Log a wipe of the whole index.
    pub fn reset(&self) -> Result<()> {
        self.append(Record::ResetIndex)
    }

    fn append(&self, record: Record) -> Result<()> {
        let mut writer = self.inner.writer.lock();
        writer.append(&record)
    }

    /// Force buffered bytes to the OS.
    pub fn flush(&self) -> Result<()> {
        self.inner.writer.lock().flush()
    }

    /// Stop background maintenance and freeze the on-disk state.
    ///
    /// Holds both the maintenance lock and the writer lock while signaling
    /// the timer tasks, so an in-flight maintenance run has completed by the
    /// time the locks were acquired and no new run can start. After this
    /// returns, no file in the segment directory changes. Idempotent;
    /// further appends are undefined.
    pub fn shutdown(&self) {
        let maintenance_guard = self.inner.maintenance.lock();
        let mut writer = self.inner.writer.lock();

        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = writer.flush() {
            error!(
                target: "vektor::commitlog",
                index = %self.inner.index,
                error = %e,
                "flush during shutdown failed"
            );
        }

        let tasks: Vec<MaintenanceTask> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            let _ = task.cancel.send(());
        }
        drop(writer);
        drop(maintenance_guard);

        for task in tasks {
            let _ = task.handle.join();
        }

        info!(
            target: "vektor::commitlog",
            index = %self.inner.index,
            "commit log shut down"
        );
    }

    /// Shut down and unlink the entire segment directory.
    pub fn destroy(self) -> Result<()> {
        self.shutdown();
        {
            let mut writer = self.inner.writer.lock();
            writer.sync()?;
        }
        self.inner.dir.remove_all()?;
        info!(
            target: "vektor::commitlog",
            index = %self.inner.index,
            "commit log destroyed"
        );
        Ok(())
    }
}

impl Drop for CommitLogger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LoggerInner {
    /// Rotate the active segment once it exceeds the size threshold.
    ///
    /// The replacement is created before the old writer is closed, so a
    /// failure leaves the current segment intact. The new timestamp is
    /// forced past the old one: two rotations inside one wall-clock second
    /// must still produce distinct, ordered basenames.
    fn rotate_if_needed(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if self.cancelled.load(Ordering::Acquire) {
            return Ok(());
        }

        let size = writer.size();
        if size <= self.config.max_size_individual {
            return Ok(());
        }

        let next_timestamp = unix_now().max(writer.timestamp() + 1);
        let replacement = SegmentWriter::create(self.dir.path(), next_timestamp)?;
        let sealed = std::mem::replace(&mut *writer, replacement);
        let sealed_name = sealed.name().to_string();
        sealed.close()?;

        info!(
            target: "vektor::commitlog",
            index = %self.index,
            old_segment = %sealed_name,
            old_size = size,
            new_segment = %writer.name(),
            "active segment over threshold, rotated"
        );
        Ok(())
    }

    /// One combine pass, then one condense pass, under the maintenance lock.
    ///
    /// Failures of either pass are logged here and retried on the next
    /// tick; a failed condensation leaves its source segment intact.
    fn combine_and_condense(&self) -> Result<()> {
        let _guard = self.maintenance.lock();
        if self.cancelled.load(Ordering::Acquire) {
            return Ok(());
        }

        let threshold = (self.config.max_size_combining as f64 * COMBINING_SLACK) as u64;
        if let Err(e) = Combiner::new(self.dir.clone(), threshold).combine_once() {
            error!(
                target: "vektor::combine",
                index = %self.index,
                error = %e,
                "commit log combining failed"
            );
        }

        if let Err(e) = self.condense_oldest() {
            error!(
                target: "vektor::condense",
                index = %self.index,
                error = %e,
                "commit log condensing failed"
            );
        }
        Ok(())
    }

    /// Condense the oldest sealed segment that is not yet condensed.
    ///
    /// The newest segment is the active one and is never a candidate.
    fn condense_oldest(&self) -> Result<()> {
        let segments = self.dir.list_oldest_first()?;
        if segments.len() <= 1 {
            return Ok(());
        }

        let candidates = &segments[..segments.len() - 1];
        for candidate in candidates {
            if candidate.is_condensed() {
                continue;
            }
            return Condensor::new(self.dir.clone()).condense(candidate);
        }
        Ok(())
    }
}

fn spawn_task(
    name: &str,
    inner: Arc<LoggerInner>,
    tick: impl Fn(&LoggerInner) -> Result<()> + Send + 'static,
) -> MaintenanceTask {
    let (cancel, signal) = mpsc::channel::<()>();
    let interval = inner.config.maintenance_interval;

    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || loop {
            match signal.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if inner.cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    if let Err(e) = tick(&inner) {
                        error!(
                            target: "vektor::commitlog",
                            index = %inner.index,
                            error = %e,
                            "commit log maintenance failed"
                        );
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        })
        .expect("failed to spawn commit log maintenance thread");

    MaintenanceTask { cancel, handle }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
