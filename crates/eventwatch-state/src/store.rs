//! StateStore — redb-backed status history.
//!
//! Append-only: rows are inserted, read, and bulk-deleted, never updated.
//! Each row lives in its own write transaction, so readers see either the
//! whole row or nothing.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use eventwatch_core::{StatusCategory, StatusRecord};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const KEY_SEP: char = '\0';
const STATUS_SEQ: &str = "status";

/// The status operations a reconciliation pass performs.
pub trait StatusStore: Send + Sync {
    fn get_latest(&self, function: &str) -> StateResult<Option<StatusRecord>>;

    fn append_status(&self, record: &StatusRecord) -> StateResult<()>;

    fn delete_not_in(&self, keep: &HashSet<String>) -> StateResult<u64>;
}

/// Thread-safe status store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "status store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory status store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(STATUS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Append a new status row for a function.
    ///
    /// Names containing NUL are rejected; NUL separates key components.
    pub fn append_status(&self, record: &StatusRecord) -> StateResult<()> {
        if record.function.contains(KEY_SEP) {
            return Err(StateError::InvalidName(record.function.clone()));
        }
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let key;
        {
            let mut seqs = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
            let seq = seqs
                .get(STATUS_SEQ)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            seqs.insert(STATUS_SEQ, seq).map_err(map_err!(Write))?;

            key = row_key(&record.function, &record.timestamp, seq);
            let mut table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(function = %record.function, status = %record.status, "status appended");
        Ok(())
    }

    /// Convenience wrapper around [`append_status`](Self::append_status).
    pub fn append(
        &self,
        function: &str,
        status: StatusCategory,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> StateResult<()> {
        self.append_status(&StatusRecord {
            function: function.to_string(),
            status,
            message: message.to_string(),
            timestamp,
        })
    }

    /// Latest row for a function, or `None` if it has never been recorded.
    pub fn get_latest(&self, function: &str) -> StateResult<Option<StatusRecord>> {
        let (lo, hi) = prefix_bounds(function);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        let mut range = table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?;
        match range.next_back() {
            Some(entry) => {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let record: StatusRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Latest row for every recorded function, sorted by function name.
    pub fn get_all_latest(&self) -> StateResult<Vec<StatusRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        let mut results: Vec<StatusRecord> = Vec::new();
        // Keys sort by function first, then timestamp; the last row seen
        // for each function wins.
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: StatusRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            match results.last_mut() {
                Some(last) if last.function == record.function => *last = record,
                _ => results.push(record),
            }
        }
        Ok(results)
    }

    /// Full history for one function, oldest first.
    pub fn history(&self, function: &str) -> StateResult<Vec<StatusRecord>> {
        let (lo, hi) = prefix_bounds(function);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: StatusRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Delete every row whose function is not in `keep`. Returns the number
    /// of rows removed.
    pub fn delete_not_in(&self, keep: &HashSet<String>) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count;
        {
            let mut table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            let stale: Vec<String> = {
                let mut keys = Vec::new();
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (key, _) = entry.map_err(map_err!(Read))?;
                    let key = key.value();
                    if !keep.contains(function_of(key)) {
                        keys.push(key.to_string());
                    }
                }
                keys
            };
            count = stale.len() as u64;
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(removed = count, kept = keep.len(), "stale status rows deleted");
        Ok(count)
    }

    /// Total number of rows across all functions.
    pub fn record_count(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }
}

impl StatusStore for StateStore {
    fn get_latest(&self, function: &str) -> StateResult<Option<StatusRecord>> {
        StateStore::get_latest(self, function)
    }

    fn append_status(&self, record: &StatusRecord) -> StateResult<()> {
        StateStore::append_status(self, record)
    }

    fn delete_not_in(&self, keep: &HashSet<String>) -> StateResult<u64> {
        StateStore::delete_not_in(self, keep)
    }
}

fn row_key(function: &str, timestamp: &DateTime<Utc>, seq: u64) -> String {
    // Flipping the sign bit keeps i64 order under unsigned comparison.
    let millis = (timestamp.timestamp_millis() as u64) ^ (1 << 63);
    format!("{function}{KEY_SEP}{millis:020}{KEY_SEP}{seq:020}")
}

/// Half-open key range covering all rows of one function.
fn prefix_bounds(function: &str) -> (String, String) {
    (format!("{function}\u{0}"), format!("{function}\u{1}"))
}

fn function_of(key: &str) -> &str {
    key.split_once(KEY_SEP).map(|(name, _)| name).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(function: &str, status: StatusCategory, secs: i64) -> StatusRecord {
        StatusRecord {
            function: function.to_string(),
            status,
            message: format!("{function} is {status}"),
            timestamp: at(secs),
        }
    }

    fn keep(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn latest_of_empty_store_is_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_latest("f1").unwrap().is_none());
        assert!(store.get_all_latest().unwrap().is_empty());
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn append_and_get_latest() {
        let store = StateStore::open_in_memory().unwrap();
        let rec = record("f1", StatusCategory::Deployed, 0);

        store.append_status(&rec).unwrap();

        assert_eq!(store.get_latest("f1").unwrap(), Some(rec));
    }

    #[test]
    fn latest_is_max_timestamp_not_insertion_order() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_status(&record("f1", StatusCategory::Paused, 20)).unwrap();
        store.append_status(&record("f1", StatusCategory::Deployed, 10)).unwrap();

        let latest = store.get_latest("f1").unwrap().unwrap();
        assert_eq!(latest.status, StatusCategory::Paused);
        assert_eq!(latest.timestamp, at(20));
    }

    #[test]
    fn same_timestamp_prefers_later_append() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_status(&record("f1", StatusCategory::Deploying, 5)).unwrap();
        store.append_status(&record("f1", StatusCategory::Deployed, 5)).unwrap();

        let latest = store.get_latest("f1").unwrap().unwrap();
        assert_eq!(latest.status, StatusCategory::Deployed);
    }

    #[test]
    fn names_sharing_a_prefix_do_not_collide() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_status(&record("f1", StatusCategory::Deployed, 0)).unwrap();
        store.append_status(&record("f10", StatusCategory::Paused, 10)).unwrap();

        assert_eq!(store.get_latest("f1").unwrap().unwrap().status, StatusCategory::Deployed);
        assert_eq!(store.get_latest("f10").unwrap().unwrap().status, StatusCategory::Paused);
        assert_eq!(store.history("f1").unwrap().len(), 1);
    }

    #[test]
    fn all_latest_one_row_per_function_sorted() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_status(&record("zeta", StatusCategory::Deployed, 0)).unwrap();
        store.append_status(&record("alpha", StatusCategory::Deployed, 0)).unwrap();
        store.append_status(&record("alpha", StatusCategory::Error, 30)).unwrap();
        store.append_status(&record("mid", StatusCategory::Undeployed, 0)).unwrap();

        let all = store.get_all_latest().unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.function.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(all[0].status, StatusCategory::Error);
    }

    #[test]
    fn history_is_oldest_first() {
        let store = StateStore::open_in_memory().unwrap();
        for (i, status) in [
            StatusCategory::Deploying,
            StatusCategory::Deployed,
            StatusCategory::Paused,
        ]
        .into_iter()
        .enumerate()
        {
            store.append_status(&record("f1", status, i as i64)).unwrap();
        }

        let history = store.history("f1").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].status, StatusCategory::Deploying);
        assert_eq!(history[2].status, StatusCategory::Paused);
    }

    #[test]
    fn delete_not_in_removes_only_absent_functions() {
        let store = StateStore::open_in_memory().unwrap();
        for secs in 0..3 {
            store.append_status(&record("f1", StatusCategory::Deployed, secs)).unwrap();
            store.append_status(&record("f2", StatusCategory::Paused, secs)).unwrap();
            store.append_status(&record("f3", StatusCategory::Deployed, secs)).unwrap();
        }

        let removed = store.delete_not_in(&keep(&["f1", "f2"])).unwrap();

        assert_eq!(removed, 3);
        assert!(store.get_latest("f3").unwrap().is_none());
        assert_eq!(store.history("f1").unwrap().len(), 3);
        assert_eq!(store.history("f2").unwrap().len(), 3);
        assert_eq!(store.record_count().unwrap(), 6);
    }

    #[test]
    fn delete_not_in_on_empty_store_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.delete_not_in(&keep(&["f1"])).unwrap(), 0);
        assert_eq!(store.delete_not_in(&HashSet::new()).unwrap(), 0);
    }

    #[test]
    fn delete_not_in_with_empty_set_clears_everything() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_status(&record("f1", StatusCategory::Deployed, 0)).unwrap();
        store.append_status(&record("f2", StatusCategory::Deployed, 0)).unwrap();

        assert_eq!(store.delete_not_in(&HashSet::new()).unwrap(), 2);
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn nul_in_function_name_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_status(&record("f1", StatusCategory::Deployed, 0)).unwrap();

        let err = store
            .append_status(&record("f1\0x", StatusCategory::Paused, 10))
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidName(_)));

        // The rejected row neither shadows f1 nor survives a prune of f1.
        assert_eq!(store.record_count().unwrap(), 1);
        assert_eq!(store.delete_not_in(&keep(&["f1"])).unwrap(), 0);
        assert_eq!(store.get_latest("f1").unwrap().unwrap().status, StatusCategory::Deployed);
    }

    #[test]
    fn pre_epoch_timestamps_keep_their_order() {
        let store = StateStore::open_in_memory().unwrap();
        let old = |secs: i64, status| StatusRecord {
            function: "f1".to_string(),
            status,
            message: String::new(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        };
        store.append_status(&old(-100, StatusCategory::Deployed)).unwrap();
        store.append_status(&old(-200, StatusCategory::Paused)).unwrap();

        let latest = store.get_latest("f1").unwrap().unwrap();
        assert_eq!(latest.status, StatusCategory::Deployed);

        store.append_status(&old(50, StatusCategory::Error)).unwrap();
        let history: Vec<StatusCategory> =
            store.history("f1").unwrap().into_iter().map(|r| r.status).collect();
        assert_eq!(
            history,
            vec![StatusCategory::Paused, StatusCategory::Deployed, StatusCategory::Error]
        );
    }

    #[test]
    fn append_wrapper_builds_record() {
        let store = StateStore::open_in_memory().unwrap();
        let ts = at(0) + Duration::milliseconds(250);
        store
            .append("f1", StatusCategory::Undeploying, "going away", ts)
            .unwrap();

        let latest = store.get_latest("f1").unwrap().unwrap();
        assert_eq!(latest.message, "going away");
        assert_eq!(latest.timestamp, ts);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("status.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.append_status(&record("f1", StatusCategory::Deployed, 0)).unwrap();
            store.append_status(&record("f1", StatusCategory::Paused, 10)).unwrap();
        }

        // Sequence numbers keep increasing across reopen.
        let store = StateStore::open(&db_path).unwrap();
        store.append_status(&record("f1", StatusCategory::Error, 10)).unwrap();

        let latest = store.get_latest("f1").unwrap().unwrap();
        assert_eq!(latest.status, StatusCategory::Error);
        assert_eq!(store.history("f1").unwrap().len(), 3);
    }
}
