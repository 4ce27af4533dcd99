//! Background column saving with a configurable thread pool.
//!
//! Snapshots are captured on the calling thread (short, per-slot shared
//! locks), then encoded and written to disk by worker threads, so section
//! locks never span file I/O. Completed saves are delivered via a bounded
//! channel; submissions for a column already in flight can be cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};
use dashmap::DashMap;
use strata_config::StorageConfig;
use strata_voxel::{SectionColumn, SectionSnapshot};

use crate::error::PersistError;
use crate::store::{ColumnStore, snapshot_slots};

/// A column save queued for a worker thread.
#[derive(Debug)]
pub struct SaveTask {
    /// Column grid X coordinate.
    pub x: i32,
    /// Column grid Z coordinate.
    pub z: i32,
    /// One captured snapshot per section slot.
    pub slots: Vec<Option<SectionSnapshot>>,
}

/// Outcome of one background save.
pub struct SaveOutcome {
    /// Column grid X coordinate.
    pub x: i32,
    /// Column grid Z coordinate.
    pub z: i32,
    /// Whether the file write succeeded.
    pub result: Result<(), PersistError>,
    /// Encode-and-write time in microseconds (for profiling).
    pub write_time_us: u64,
}

/// Internal wrapper that carries the task and its cancellation flag.
struct QueuedSave {
    task: SaveTask,
    cancelled: Arc<AtomicBool>,
}

/// Manages asynchronous column saves across a thread pool.
pub struct ColumnSaveWorker {
    task_sender: Sender<QueuedSave>,
    result_receiver: Receiver<SaveOutcome>,
    /// Cancellation flag per in-flight column, keyed by `(x, z)`.
    active_saves: Arc<DashMap<(i32, i32), Arc<AtomicBool>>>,
    /// Current number of in-flight saves.
    in_flight: Arc<AtomicU64>,
}

impl ColumnSaveWorker {
    /// Creates a worker pool writing through `store`.
    ///
    /// # Arguments
    /// - `thread_count`: number of writer threads.
    /// - `max_concurrent`: maximum in-flight saves; excess submissions are
    ///   rejected.
    /// - `result_capacity`: bounded channel capacity for completed saves.
    pub fn new(
        store: Arc<ColumnStore>,
        thread_count: usize,
        max_concurrent: usize,
        result_capacity: usize,
    ) -> Self {
        let (task_sender, task_receiver) = bounded::<QueuedSave>(max_concurrent * 2);
        let (result_sender, result_receiver) = bounded::<SaveOutcome>(result_capacity);
        let in_flight = Arc::new(AtomicU64::new(0));

        for _ in 0..thread_count {
            let receiver = task_receiver.clone();
            let sender = result_sender.clone();
            let store = Arc::clone(&store);
            let in_flight = Arc::clone(&in_flight);

            std::thread::Builder::new()
                .name("column-save-worker".into())
                .spawn(move || {
                    while let Ok(queued) = receiver.recv() {
                        if queued.cancelled.load(Ordering::Relaxed) {
                            in_flight.fetch_sub(1, Ordering::Relaxed);
                            continue;
                        }

                        let start = std::time::Instant::now();
                        let result =
                            store.save_snapshots(queued.task.x, queued.task.z, &queued.task.slots);
                        let elapsed = start.elapsed().as_micros() as u64;

                        let _ = sender.send(SaveOutcome {
                            x: queued.task.x,
                            z: queued.task.z,
                            result,
                            write_time_us: elapsed,
                        });

                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })
                .expect("failed to spawn column save worker thread");
        }

        Self {
            task_sender,
            result_receiver,
            active_saves: Arc::new(DashMap::new()),
            in_flight,
        }
    }

    /// Creates a pool with a thread count based on available CPU cores.
    pub fn with_defaults(store: Arc<ColumnStore>) -> Self {
        let cpus = num_cpus::get().max(2);
        let threads = (cpus - 1).clamp(1, 4);
        Self::new(store, threads, 64, 128)
    }

    /// Creates a pool sized from the storage config.
    ///
    /// A `save_threads` of 0 derives the thread count from CPU cores.
    pub fn from_config(store: Arc<ColumnStore>, config: &StorageConfig) -> Self {
        if config.save_threads == 0 {
            Self::with_defaults(store)
        } else {
            Self::new(store, config.save_threads, 64, 128)
        }
    }

    /// Snapshots `column` and queues it for saving.
    ///
    /// Returns `Err(task)` if the queue is full; the caller may retry later
    /// or fall back to a synchronous save.
    pub fn submit(&self, x: i32, z: i32, column: &SectionColumn) -> Result<(), SaveTask> {
        let task = SaveTask {
            x,
            z,
            slots: snapshot_slots(column),
        };
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active_saves.insert((x, z), Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        self.task_sender
            .try_send(QueuedSave { task, cancelled })
            .map_err(|e| {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                let task = e.into_inner().task;
                self.active_saves.remove(&(task.x, task.z));
                task
            })
    }

    /// Cancels a queued save for the given column.
    ///
    /// A save that already started or completed is unaffected.
    pub fn cancel(&self, x: i32, z: i32) {
        if let Some((_, cancelled)) = self.active_saves.remove(&(x, z)) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Drains all completed saves from the result channel.
    pub fn drain_results(&self) -> Vec<SaveOutcome> {
        let mut results = Vec::new();
        while let Ok(outcome) = self.result_receiver.try_recv() {
            self.active_saves.remove(&(outcome.x, outcome.z));
            results.push(outcome);
        }
        results
    }

    /// Number of saves currently in flight (queued or executing).
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Returns `true` if a save for the given column is currently pending.
    pub fn is_pending(&self, x: i32, z: i32) -> bool {
        self.active_saves.contains_key(&(x, z))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use strata_voxel::{BlockState, PaletteConfig, StateRegistry};

    fn test_registry() -> Arc<StateRegistry> {
        let registry = Arc::new(StateRegistry::new(BlockState::new("air")));
        for i in 0..300 {
            registry.id_of(&BlockState::new(format!("block_{i}")));
        }
        registry
    }

    fn drain_until(worker: &ColumnSaveWorker, expected: usize) -> Vec<SaveOutcome> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut outcomes = Vec::new();
        while outcomes.len() < expected {
            assert!(Instant::now() < deadline, "saves did not complete in time");
            outcomes.extend(worker.drain_results());
            std::thread::sleep(Duration::from_millis(5));
        }
        outcomes
    }

    #[test]
    fn test_background_saves_complete_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ColumnStore::new(dir.path()));
        let worker = ColumnSaveWorker::new(Arc::clone(&store), 2, 16, 32);
        let registry = test_registry();

        let mut columns = Vec::new();
        for i in 0..6i32 {
            let column = SectionColumn::new(4, Arc::clone(&registry), PaletteConfig::default());
            column.set_state(
                (i as usize) % 4,
                3,
                3,
                3,
                &BlockState::new(format!("block_{i}")),
            );
            worker.submit(i, -i, &column).unwrap();
            columns.push(column);
        }

        let outcomes = drain_until(&worker, 6);
        assert_eq!(outcomes.len(), 6);
        for outcome in &outcomes {
            assert!(outcome.result.is_ok());
            assert!(!worker.is_pending(outcome.x, outcome.z));
        }
        assert_eq!(worker.in_flight_count(), 0);

        for (i, column) in columns.iter().enumerate() {
            let i = i as i32;
            let loaded = store
                .load_column(i, -i, Arc::clone(&registry), PaletteConfig::default())
                .unwrap();
            assert_eq!(
                loaded.state_at((i as usize) % 4, 3, 3, 3),
                column.state_at((i as usize) % 4, 3, 3, 3)
            );
        }
    }

    #[test]
    fn test_mutating_after_submit_does_not_affect_saved_file() {
        // The snapshot is captured at submit time; later writes to the live
        // column must not leak into the file being written.
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ColumnStore::new(dir.path()));
        let worker = ColumnSaveWorker::new(Arc::clone(&store), 1, 4, 8);
        let registry = test_registry();

        let column = SectionColumn::new(2, Arc::clone(&registry), PaletteConfig::default());
        column.set_state(0, 1, 1, 1, &BlockState::new("block_1"));
        worker.submit(0, 0, &column).unwrap();
        column.set_state(0, 1, 1, 1, &BlockState::new("block_2"));

        drain_until(&worker, 1);
        let loaded = store
            .load_column(0, 0, Arc::clone(&registry), PaletteConfig::default())
            .unwrap();
        assert_eq!(loaded.state_at(0, 1, 1, 1).name(), "block_1");
    }
}
