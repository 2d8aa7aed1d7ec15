//! Live resolution cells.
//!
//! A [`LiveFile`] is the receiving end of a `tokio::sync::watch` channel
//! carrying the current resolution of one path. Mounts share one driver task
//! per path through a [`PathTable`]; the task runs while at least one
//! `LiveFile` for that path is alive and is aborted with the last one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::location::Resolution;

/// Channel value: `None` until the first resolution has been produced.
pub(crate) type Cell = Option<Resolution>;

/// A push-updating view of one path's resolution.
///
/// Clones share the same underlying stream. The stream is torn down when
/// the last clone is dropped, so a later `resolve_file` for the same path
/// starts fresh.
#[derive(Debug, Clone)]
pub struct LiveFile {
    rx: watch::Receiver<Cell>,
    _stream: Option<Arc<PathStream>>,
}

impl LiveFile {
    /// A cell whose value is known up front and never changes.
    pub fn fixed(value: Resolution) -> Self {
        let (_, rx) = watch::channel(Some(value));
        Self { rx, _stream: None }
    }

    fn shared(stream: Arc<PathStream>) -> Self {
        Self {
            rx: stream.rx.clone(),
            _stream: Some(stream),
        }
    }

    /// The latest value, or `None` if nothing has been produced yet.
    pub fn current(&self) -> Option<Resolution> {
        self.rx.borrow().clone()
    }

    /// Wait for the first value.
    ///
    /// A source that ends without producing anything counts as absent.
    pub async fn resolved(&mut self) -> Resolution {
        self.wait_for(|_| true).await.flatten()
    }

    /// Wait for the next published value.
    ///
    /// Returns `None` once the source has ended; the last value stays
    /// available through [`current`](Self::current).
    pub async fn changed(&mut self) -> Option<Resolution> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Wait until the value satisfies `pred`, checking the current value first.
    ///
    /// Returns `None` if the source ends before that happens.
    pub async fn wait_for(
        &mut self,
        mut pred: impl FnMut(&Resolution) -> bool,
    ) -> Option<Resolution> {
        let value = self
            .rx
            .wait_for(|cell| cell.as_ref().is_some_and(&mut pred))
            .await
            .ok()?;
        value.clone()
    }

    pub(crate) fn receiver_mut(&mut self) -> &mut watch::Receiver<Cell> {
        &mut self.rx
    }
}

/// Publish a resolution, skipping the send when nothing changed.
pub(crate) fn publish(tx: &watch::Sender<Cell>, value: Resolution) {
    tx.send_if_modified(|cell| {
        if cell.as_ref() == Some(&value) {
            false
        } else {
            *cell = Some(value);
            true
        }
    });
}

type Rows = Mutex<HashMap<String, Slot>>;

#[derive(Debug)]
struct Slot {
    id: u64,
    stream: Weak<PathStream>,
}

/// One path's shared driver.
#[derive(Debug)]
pub(crate) struct PathStream {
    id: u64,
    key: String,
    rx: watch::Receiver<Cell>,
    task: AbortHandle,
    rows: Weak<Rows>,
}

impl Drop for PathStream {
    fn drop(&mut self) {
        self.task.abort();

        let Some(rows) = self.rows.upgrade() else {
            return;
        };
        let mut rows = rows.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer stream may already own the row
        if rows.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            rows.remove(&self.key);
        }
        tracing::trace!(path = %self.key, "path stream closed");
    }
}

/// Per-mount table of live path streams.
#[derive(Debug, Default)]
pub(crate) struct PathTable {
    rows: Arc<Rows>,
    next_id: AtomicU64,
}

impl PathTable {
    /// Join the stream for `key`, starting it with `start` if none is live.
    ///
    /// `start` receives the sending half and returns the driver future,
    /// which is spawned onto the current runtime.
    pub(crate) fn subscribe<F, Fut>(&self, key: String, start: F) -> LiveFile
    where
        F: FnOnce(watch::Sender<Cell>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(stream) = rows.get(&key).and_then(|slot| slot.stream.upgrade()) {
            return LiveFile::shared(stream);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(start(tx)).abort_handle();

        let stream = Arc::new(PathStream {
            id,
            key: key.clone(),
            rx,
            task,
            rows: Arc::downgrade(&self.rows),
        });
        rows.insert(
            key,
            Slot {
                id,
                stream: Arc::downgrade(&stream),
            },
        );
        LiveFile::shared(stream)
    }

    /// Number of paths with a live stream.
    pub(crate) fn len(&self) -> usize {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.values().filter(|slot| slot.stream.strong_count() > 0).count()
    }
}
