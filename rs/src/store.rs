//! Core ResultStore implementation

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::record::ResultRecord;

/// In-memory view of the persisted log, guarded by one mutex so appends
/// never interleave
struct StoreInner {
    keys: HashSet<String>,
    records: Vec<ResultRecord>,
}

/// The durable result store
///
/// Source of truth is the append-only JSONL log; the JSON array file is a
/// compacted view rebuilt atomically from it.
pub struct ResultStore {
    array_path: PathBuf,
    log_path: PathBuf,
    /// Exclusive advisory lock, held for the lifetime of the store
    _lock: fs::File,
    inner: Mutex<StoreInner>,
}

impl ResultStore {
    /// Open or create a store for the given array file path
    ///
    /// Fails with [`StoreError::Corrupt`] if existing data does not parse,
    /// and [`StoreError::Locked`] if another process owns the store.
    pub fn open(array_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let array_path = array_path.as_ref().to_path_buf();
        let log_path = array_path.with_extension("jsonl");
        debug!(?array_path, ?log_path, "Opening result store");

        if let Some(parent) = array_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let lock_path = lock_path_for(&array_path);
        let lock = fs::OpenOptions::new().create(true).write(true).open(&lock_path)?;
        lock.try_lock_exclusive().map_err(|_| StoreError::Locked {
            path: array_path.clone(),
        })?;

        let records = if log_path.exists() {
            let (records, repaired) = load_log(&log_path)?;
            if repaired {
                // Clear the torn tail so the next append starts on a
                // fresh line.
                rewrite_log(&log_path, &records)?;
            }
            records
        } else if array_path.exists() && fs::metadata(&array_path)?.len() > 0 {
            // Store written by an earlier run before the log existed; the
            // array file must itself be a valid container.
            let records = load_array(&array_path)?;
            rewrite_log(&log_path, &records)?;
            info!(count = records.len(), "Imported existing array file into log");
            records
        } else {
            Vec::new()
        };

        let mut keys = HashSet::with_capacity(records.len());
        for record in &records {
            if !keys.insert(record.key.clone()) {
                return Err(StoreError::Corrupt {
                    path: log_path,
                    detail: format!("duplicate key in store: {}", record.key),
                });
            }
        }

        // Startup compaction: bring the array view in sync with the log so
        // it is a valid (possibly empty) container before any work starts.
        write_array_atomic(&array_path, &records)?;

        info!(count = records.len(), path = %array_path.display(), "Result store opened");

        Ok(Self {
            array_path,
            log_path,
            _lock: lock,
            inner: Mutex::new(StoreInner { keys, records }),
        })
    }

    /// Append a completed result
    ///
    /// The line is flushed and fsynced before this returns: once the caller
    /// sees `Ok`, the result survives process termination.
    pub async fn append(&self, record: ResultRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        if inner.keys.contains(&record.key) {
            return Err(StoreError::DuplicateKey {
                key: record.key.clone(),
            });
        }

        let line = serde_json::to_string(&record)? + "\n";

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;

        debug!(key = %record.key, worker_id = record.worker_id, "Result appended");

        inner.keys.insert(record.key.clone());
        inner.records.push(record);
        Ok(())
    }

    /// Keys of all persisted results (read-only scan for resume)
    pub async fn keys(&self) -> HashSet<String> {
        self.inner.lock().await.keys.clone()
    }

    /// Check whether a key is already persisted
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.lock().await.keys.contains(key)
    }

    /// Number of persisted results
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Whether the store holds no results
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of all persisted records, in append order
    pub async fn records(&self) -> Vec<ResultRecord> {
        self.inner.lock().await.records.clone()
    }

    /// Rebuild the JSON array file from the log
    ///
    /// The array is written to a temp file in the same directory and
    /// renamed into place, so a reader never sees a half-written container.
    pub async fn export(&self) -> Result<(), StoreError> {
        let inner = self.inner.lock().await;
        write_array_atomic(&self.array_path, &inner.records)?;
        debug!(count = inner.records.len(), path = %self.array_path.display(), "Array exported");
        Ok(())
    }

    /// Path of the array file
    pub fn array_path(&self) -> &Path {
        &self.array_path
    }

    /// Path of the append-only log
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

fn lock_path_for(array_path: &Path) -> PathBuf {
    let mut name = array_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Parse the JSONL log strictly
///
/// A final line without its trailing newline is the one legal artifact of
/// a mid-append kill: that append never returned success. If the line
/// still parses the record is kept and only the terminator is missing; if
/// it does not parse it is dropped with a warning. Any parse failure on an
/// earlier line is corruption.
///
/// Returns the committed records plus whether the log needs a rewrite to
/// clear the newline-less tail.
fn load_log(log_path: &Path) -> Result<(Vec<ResultRecord>, bool), StoreError> {
    let content = fs::read_to_string(log_path)?;
    let complete = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();

    let mut records = Vec::with_capacity(lines.len());
    let mut repaired = false;
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ResultRecord>(line) {
            Ok(record) => {
                if i == lines.len() - 1 && !complete {
                    // The record is whole but its terminator never hit
                    // disk; without a rewrite the next append would
                    // concatenate onto this line.
                    warn!(line = i + 1, "Restoring missing terminator on final log line");
                    repaired = true;
                }
                records.push(record);
            }
            Err(_) if i == lines.len() - 1 && !complete => {
                warn!(line = i + 1, "Dropping truncated final log line (interrupted append)");
                repaired = true;
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    path: log_path.to_path_buf(),
                    detail: format!("line {}: {}", i + 1, e),
                });
            }
        }
    }
    Ok((records, repaired))
}

fn load_array(array_path: &Path) -> Result<Vec<ResultRecord>, StoreError> {
    let content = fs::read_to_string(array_path)?;
    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: array_path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn rewrite_log(log_path: &Path, records: &[ResultRecord]) -> Result<(), StoreError> {
    let mut content = String::new();
    for record in records {
        content.push_str(&serde_json::to_string(record)?);
        content.push('\n');
    }
    fs::write(log_path, content)?;
    Ok(())
}

fn write_array_atomic(array_path: &Path, records: &[ResultRecord]) -> Result<(), StoreError> {
    let dir = match array_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, records)?;
    tmp.as_file().sync_all()?;
    tmp.persist(array_path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn record(key: &str, value: &str) -> ResultRecord {
        ResultRecord::new(key, value, 0, "e0")
    }

    #[tokio::test]
    async fn test_open_initializes_empty_container() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");

        let store = ResultStore::open(&path).unwrap();
        assert!(store.is_empty().await);

        // Array file exists and parses as an empty array
        let content = fs::read_to_string(&path).unwrap();
        let parsed: Vec<ResultRecord> = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");

        {
            let store = ResultStore::open(&path).unwrap();
            store.append(record("a", "X")).await.unwrap();
            store.append(record("b", "Y")).await.unwrap();
        }

        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.len().await, 2);
        let keys = store.keys().await;
        assert!(keys.contains("a"));
        assert!(keys.contains("b"));
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let temp = tempdir().unwrap();
        let store = ResultStore::open(temp.path().join("results.json")).unwrap();

        store.append(record("a", "X")).await.unwrap();
        let err = store.append(record("a", "again")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_log_parseable_after_every_append() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");
        let store = ResultStore::open(&path).unwrap();

        for i in 0..5 {
            store.append(record(&format!("t{}", i), "out")).await.unwrap();
            // The log must parse after each individual append, as if the
            // process were killed right here.
            let (loaded, repaired) = load_log(&path.with_extension("jsonl")).unwrap();
            assert_eq!(loaded.len(), i + 1);
            assert!(!repaired);
        }
    }

    #[tokio::test]
    async fn test_truncated_final_line_is_dropped() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");

        {
            let store = ResultStore::open(&path).unwrap();
            store.append(record("a", "X")).await.unwrap();
        }

        // Simulate a kill mid-write: partial record, no trailing newline
        let log = path.with_extension("jsonl");
        let mut file = fs::OpenOptions::new().append(true).open(&log).unwrap();
        write!(file, "{{\"key\":\"b\",\"val").unwrap();
        drop(file);

        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.contains("a").await);

        // The torn tail was cleared on open, so a new append lands on its
        // own line and the next open sees both records.
        store.append(record("b", "Y")).await.unwrap();
        drop(store);

        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.contains("b").await);
    }

    #[tokio::test]
    async fn test_newline_less_final_line_keeps_record_and_repairs_log() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");

        {
            let store = ResultStore::open(&path).unwrap();
            store.append(record("a", "X")).await.unwrap();
        }

        // Simulate a kill that persisted the whole record but not its
        // trailing newline
        let log = path.with_extension("jsonl");
        let content = fs::read_to_string(&log).unwrap();
        fs::write(&log, content.trim_end_matches('\n')).unwrap();

        // The record itself committed, so it must survive the reopen
        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.contains("a").await);

        // The terminator was restored, so the next append starts on its
        // own line instead of concatenating onto the old tail
        store.append(record("b", "Y")).await.unwrap();
        drop(store);

        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.contains("a").await);
        assert!(store.contains("b").await);
    }

    #[tokio::test]
    async fn test_corrupt_interior_line_fails_fast() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");

        {
            let store = ResultStore::open(&path).unwrap();
            store.append(record("a", "X")).await.unwrap();
        }

        // Corrupt the committed line, then add a valid one after it
        let log = path.with_extension("jsonl");
        let valid = serde_json::to_string(&record("b", "Y")).unwrap();
        fs::write(&log, format!("not json\n{}\n", valid)).unwrap();

        assert!(matches!(ResultStore::open(&path), Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_array_without_log_fails_fast() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");
        fs::write(&path, "{not an array").unwrap();

        assert!(matches!(ResultStore::open(&path), Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_import_from_array_only_store() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");

        let records = vec![record("a", "X"), record("b", "Y")];
        fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.contains("a").await);
        assert!(store.log_path().exists());
    }

    #[tokio::test]
    async fn test_export_writes_valid_array() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");
        let store = ResultStore::open(&path).unwrap();

        store.append(record("a", "X")).await.unwrap();
        store.append(record("b", "Y")).await.unwrap();
        store.export().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Vec<ResultRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].key, "a");
        assert_eq!(parsed[1].key, "b");
    }

    #[test]
    fn test_second_open_is_locked_out() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("results.json");

        let _store = ResultStore::open(&path).unwrap();
        assert!(matches!(ResultStore::open(&path), Err(StoreError::Locked { .. })));
    }
}
