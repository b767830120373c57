//! Background writers for the disk tier.
//!
//! The request path only enqueues; SQLite writes run on the blocking pool from a
//! fixed number of writer tasks. The queue is bounded and a full queue drops the
//! write.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::DiskCounters;
use super::store::DiskStore;

struct WriteJob {
    key: String,
    bytes: Vec<u8>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<WriteJob>>>;

pub(crate) struct WriterPool {
    sender: Mutex<Option<mpsc::Sender<WriteJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<DiskCounters>,
}

impl WriterPool {
    /// Spawn `workers` writer tasks. Must be called inside a Tokio runtime.
    pub(crate) fn start(
        store: Arc<DiskStore>,
        counters: Arc<DiskCounters>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<WriteJob>(capacity.max(1));
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|_| tokio::spawn(run_worker(store.clone(), receiver.clone(), counters.clone())))
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            counters,
        }
    }

    /// Queue a write. Never blocks; drops the write when the queue is full or closed.
    pub(crate) fn submit(&self, key: String, bytes: Vec<u8>) {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.counters.dropped_writes.incr();
            tracing::warn!(query = %key, "Disk cache is closed, dropping write");
            return;
        };

        match sender.try_send(WriteJob { key, bytes }) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                self.counters.dropped_writes.incr();
                tracing::warn!(query = %job.key, "Disk cache write queue is full, dropping write");
            }
            Err(TrySendError::Closed(job)) => {
                self.counters.dropped_writes.incr();
                tracing::warn!(query = %job.key, "Disk cache writers are gone, dropping write");
            }
        }
    }

    /// Stop accepting writes and wait until the queued ones are stored.
    ///
    /// Returns the number of writer tasks that panicked.
    pub(crate) async fn close(&self) -> usize {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());

        let mut panicked = 0;
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "Disk cache writer task failed");
                panicked += 1;
            }
        }
        panicked
    }
}

async fn run_worker(store: Arc<DiskStore>, receiver: SharedReceiver, counters: Arc<DiskCounters>) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(WriteJob { key, bytes }) = job else {
            break;
        };

        let writer = store.clone();
        let written = tokio::task::spawn_blocking(move || writer.put(&key, &bytes)).await;

        match written {
            Ok(Ok(())) => counters.writes.incr(),
            Ok(Err(err)) => {
                counters.write_failures.incr();
                tracing::warn!(error = %err, "Disk cache write failed");
            }
            Err(err) => {
                counters.write_failures.incr();
                tracing::warn!(error = %err, "Disk cache write task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> Arc<DiskStore> {
        Arc::new(
            DiskStore::open_at(&dir.path().join("writes.db"), Duration::from_secs(60), 2)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_full_queue_drops_writes() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let counters = Arc::new(DiskCounters::default());
        let pool = WriterPool::start(store.clone(), counters.clone(), 1, 1);

        // The current-thread runtime does not run the writer until we yield.
        pool.submit("Condition?code=a".into(), vec![0]);
        pool.submit("Condition?code=b".into(), vec![0]);
        pool.submit("Condition?code=c".into(), vec![0]);
        assert_eq!(counters.dropped_writes.get(), 2);

        assert_eq!(pool.close().await, 0);
        assert_eq!(counters.writes.get(), 1);
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_queued_writes() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let counters = Arc::new(DiskCounters::default());
        let pool = WriterPool::start(store.clone(), counters.clone(), 3, 8);

        for code in ["a", "b", "c", "d"] {
            pool.submit(format!("Condition?code={code}"), vec![0]);
        }
        assert_eq!(pool.close().await, 0);

        assert_eq!(counters.writes.get(), 4);
        assert_eq!(counters.dropped_writes.get(), 0);
        assert_eq!(store.entry_count().unwrap(), 4);

        pool.submit("Condition?code=e".into(), vec![0]);
        assert_eq!(counters.dropped_writes.get(), 1);
    }
}
