//! In-memory record backend.
//!
//! Rows live in process memory and are lost on restart. Transactions take an
//! exclusive lock on the whole table, so they are trivially serializable.
//! Writes are applied in place and reverted from an undo log on rollback.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::repository::{RecordRepository, RecordTransaction, RepositoryError, RepositoryResult};
use super::types::{ListQuery, Record, RecordPatch};

#[derive(Debug, Default)]
struct MemoryTable {
    /// Rows keyed by insertion sequence, which is also the scan order
    rows: BTreeMap<u64, Record>,
    /// id -> insertion sequence
    index: HashMap<String, u64>,
    next_seq: u64,
}

impl MemoryTable {
    fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).and_then(|seq| self.rows.get(seq))
    }
}

enum Undo {
    Inserted(String),
    Updated(u64, Record),
    Deleted(u64, Record),
}

/// In-memory record backend.
#[derive(Clone, Default)]
pub struct MemoryRecordBackend {
    table: Arc<Mutex<MemoryTable>>,
}

impl MemoryRecordBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live rows
    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordRepository for MemoryRecordBackend {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> RepositoryResult<Box<dyn RecordTransaction>> {
        let guard = self.table.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            table: guard,
            undo: Vec::new(),
            finished: false,
        }))
    }

    async fn list(&self, query: &ListQuery) -> RepositoryResult<Vec<Record>> {
        let table = self.table.lock().await;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit()).unwrap_or(usize::MAX);

        Ok(table
            .rows
            .values()
            .filter(|record| query.matches(record))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

/// Exclusive transaction over the in-memory table.
pub struct MemoryTransaction {
    table: OwnedMutexGuard<MemoryTable>,
    undo: Vec<Undo>,
    finished: bool,
}

impl MemoryTransaction {
    fn revert(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Inserted(id) => {
                    if let Some(seq) = self.table.index.remove(&id) {
                        self.table.rows.remove(&seq);
                    }
                }
                Undo::Updated(seq, previous) => {
                    self.table.rows.insert(seq, previous);
                }
                Undo::Deleted(seq, previous) => {
                    self.table.index.insert(previous.id.clone(), seq);
                    self.table.rows.insert(seq, previous);
                }
            }
        }
    }
}

#[async_trait]
impl RecordTransaction for MemoryTransaction {
    async fn insert(&mut self, record: &Record) -> RepositoryResult<()> {
        if self.table.index.contains_key(&record.id) {
            return Err(RepositoryError::Duplicate(record.id.clone()));
        }

        let seq = self.table.next_seq;
        self.table.next_seq += 1;
        self.table.index.insert(record.id.clone(), seq);
        self.table.rows.insert(seq, record.clone());
        self.undo.push(Undo::Inserted(record.id.clone()));
        Ok(())
    }

    async fn find(&mut self, id: &str) -> RepositoryResult<Option<Record>> {
        Ok(self.table.get(id).cloned())
    }

    async fn update(
        &mut self,
        id: &str,
        patch: &RecordPatch,
        now: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let Some(seq) = self.table.index.get(id).copied() else {
            return Ok(0);
        };
        let Some(row) = self.table.rows.get_mut(&seq) else {
            return Ok(0);
        };

        let previous = row.clone();
        if row.apply(patch, now) {
            self.undo.push(Undo::Updated(seq, previous));
        }
        Ok(1)
    }

    async fn delete(&mut self, id: &str) -> RepositoryResult<u64> {
        let Some(seq) = self.table.index.remove(id) else {
            return Ok(0);
        };
        match self.table.rows.remove(&seq) {
            Some(previous) => {
                self.undo.push(Undo::Deleted(seq, previous));
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn commit(mut self: Box<Self>) -> RepositoryResult<()> {
        self.undo.clear();
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> RepositoryResult<()> {
        self.revert();
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.revert();
        }
    }
}
