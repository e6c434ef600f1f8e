//! Background row differ.
//!
//! A producer thread walks two row trees side by side and streams the
//! differences through a bounded channel. Both trees are sorted by row key,
//! so the walk is a single merge pass and diffs come out in ascending key
//! order. Rows whose blob ids match are skipped without being read.

use std::cmp::Ordering as KeyOrdering;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use git2::{Repository, TreeEntry, TreeIter};
use tracing::{debug, warn};

use super::row_diff::RowDiff;
use crate::storage::{BlobId, StorageError, StorageResult};
use crate::table::{read_row, RowData, RowKey, TaggedRow};

/// default number of in-flight diffs
pub const DEFAULT_DIFF_BUFFER: usize = 1024;

type DiffItem = StorageResult<RowDiff>;

/// Streams the differences between two row sets.
///
/// `close` (also run on drop) stops the producer and joins it.
pub struct AsyncDiffer {
    rx: Option<Receiver<DiffItem>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    done: bool,
}

impl AsyncDiffer {
    /// Start diffing `rows` (newer) against `parent_rows` (older).
    ///
    /// The producer opens its own handle on the repository at `repo_path`.
    pub fn start(
        repo_path: impl AsRef<Path>,
        rows: RowData,
        parent_rows: RowData,
        buffer: usize,
    ) -> StorageResult<Self> {
        let (tx, rx) = sync_channel(buffer.max(1));
        let stop = Arc::new(AtomicBool::new(false));

        let path = repo_path.as_ref().to_path_buf();
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("histdb-differ".into())
            .spawn(move || producer(path, rows, parent_rows, tx, thread_stop))?;

        Ok(Self {
            rx: Some(rx),
            stop,
            handle: Some(handle),
            done: false,
        })
    }

    /// Wait up to `timeout` for diffs and return at most `max` of them.
    ///
    /// An empty result either means the wait timed out or the stream ended;
    /// check [`is_done`](Self::is_done). A read error in the producer is
    /// returned here and ends the stream.
    pub fn get_diffs(&mut self, max: usize, timeout: Duration) -> StorageResult<Vec<RowDiff>> {
        let mut diffs = Vec::new();
        if max == 0 {
            return Ok(diffs);
        }
        let Some(rx) = self.rx.as_ref() else {
            self.done = true;
            return Ok(diffs);
        };

        match rx.recv_timeout(timeout) {
            Ok(Ok(diff)) => diffs.push(diff),
            Ok(Err(e)) => {
                self.done = true;
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => return Ok(diffs),
            Err(RecvTimeoutError::Disconnected) => {
                self.done = true;
                return Ok(diffs);
            }
        }

        while diffs.len() < max {
            match rx.try_recv() {
                Ok(Ok(diff)) => diffs.push(diff),
                Ok(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.done = true;
                    break;
                }
            }
        }

        Ok(diffs)
    }

    /// Whether the stream has ended and every diff has been handed out.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Stop the producer and wait for it. Safe to call more than once.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // dropping the receiver unblocks a producer waiting on a full channel
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("diff producer panicked");
            }
        }
        self.done = true;
    }
}

impl Drop for AsyncDiffer {
    fn drop(&mut self) {
        self.close();
    }
}

fn producer(
    path: PathBuf,
    rows: RowData,
    parent_rows: RowData,
    tx: SyncSender<DiffItem>,
    stop: Arc<AtomicBool>,
) {
    match walk(&path, rows, parent_rows, &tx, &stop) {
        Ok(sent) => debug!(sent, "diff producer finished"),
        Err(e) => {
            // the consumer may already be gone
            let _ = tx.send(Err(e));
        }
    }
}

/// merge-join the two row trees; returns the number of diffs sent
fn walk(
    path: &Path,
    rows: RowData,
    parent_rows: RowData,
    tx: &SyncSender<DiffItem>,
    stop: &AtomicBool,
) -> StorageResult<usize> {
    let repo = Repository::open(path)?;
    let new_tree = repo.find_tree(rows.tree_id().raw())?;
    let old_tree = repo.find_tree(parent_rows.tree_id().raw())?;

    let mut new_iter: Peekable<TreeIter<'_>> = new_tree.iter().peekable();
    let mut old_iter: Peekable<TreeIter<'_>> = old_tree.iter().peekable();
    let mut sent = 0;

    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(sent);
        }

        let order = match (new_iter.peek(), old_iter.peek()) {
            (None, None) => return Ok(sent),
            (Some(_), None) => KeyOrdering::Less,
            (None, Some(_)) => KeyOrdering::Greater,
            (Some(n), Some(o)) => n.name_bytes().cmp(o.name_bytes()),
        };

        let diff = match order {
            KeyOrdering::Less => match new_iter.next() {
                Some(entry) => {
                    let (key, new) = read_entry(&repo, &entry)?;
                    RowDiff::Added { key, new }
                }
                None => return Ok(sent),
            },
            KeyOrdering::Greater => match old_iter.next() {
                Some(entry) => {
                    let (key, old) = read_entry(&repo, &entry)?;
                    RowDiff::Removed { key, old }
                }
                None => return Ok(sent),
            },
            KeyOrdering::Equal => {
                let (Some(n), Some(o)) = (new_iter.next(), old_iter.next()) else {
                    return Ok(sent);
                };
                if n.id() == o.id() {
                    continue;
                }
                let (key, new) = read_entry(&repo, &n)?;
                let (_, old) = read_entry(&repo, &o)?;
                RowDiff::Modified { key, old, new }
            }
        };

        if tx.send(Ok(diff)).is_err() {
            // consumer closed the stream
            return Ok(sent);
        }
        sent += 1;
    }
}

fn read_entry(repo: &Repository, entry: &TreeEntry<'_>) -> StorageResult<(RowKey, TaggedRow)> {
    let name = entry.name().ok_or_else(|| StorageError::CorruptedData {
        path: "rows".into(),
        reason: "row entry name is not valid UTF-8".to_string(),
    })?;
    let key = RowKey::from_hex(name)?;
    let row = read_row(repo, &key, BlobId::new(entry.id()))?;
    Ok((key, row))
}
