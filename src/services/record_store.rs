//! Record store for media sharing records
//!
//! Wraps the SQL repository with the store contract: typed errors for
//! duplicate and missing ids, an event on every successful write, and
//! per-id serialization of writes.

use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::keyed_lock::KeyedLocks;
use crate::db::{Database, MediaSharingRepository, RecordQuery};
use crate::error::{MediaSharingError, Result};
use crate::events::{EventBus, MediaSharingEvent};
use crate::models::{MediaSharingRecord, MEDIA_SHARING_RECORD_TYPE};

/// Exclusive write access to one record id, held until dropped
pub struct RecordLock {
    id: String,
    _guard: OwnedMutexGuard<()>,
}

impl RecordLock {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Persistent store for [`MediaSharingRecord`]s
pub struct MediaSharingRecordStore {
    db: Arc<Database>,
    events: EventBus,
    locks: KeyedLocks,
}

impl MediaSharingRecordStore {
    pub fn new(db: Arc<Database>, events: EventBus) -> Self {
        Self {
            db,
            events,
            locks: KeyedLocks::new(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Wait for exclusive write access to `id`.
    ///
    /// `create`, `update` and `delete_by_id` take this lock themselves; callers
    /// that must read, do other work and then write hold it across all of it
    /// and write through [`MediaSharingRecordStore::update_locked`].
    pub async fn lock_record(&self, id: &str) -> RecordLock {
        RecordLock {
            id: id.to_string(),
            _guard: self.locks.lock(id).await,
        }
    }

    /// Persist a new record and emit `RecordAdded`
    pub async fn create(&self, record: &MediaSharingRecord) -> Result<()> {
        let _lock = self.lock_record(&record.id).await;

        if !MediaSharingRepository::insert(&self.db, record)? {
            return Err(MediaSharingError::DuplicateId(record.id.clone()));
        }

        debug!(record_id = %record.id, state = %record.state, "Stored media sharing record");
        self.events.emit(MediaSharingEvent::RecordAdded {
            record_type: MEDIA_SHARING_RECORD_TYPE,
            record: record.clone(),
        });
        Ok(())
    }

    /// Overwrite an existing record and emit `RecordUpdated`
    pub async fn update(&self, record: &MediaSharingRecord) -> Result<()> {
        let lock = self.lock_record(&record.id).await;
        self.update_locked(&lock, record)
    }

    /// Overwrite an existing record while already holding its lock
    pub fn update_locked(&self, lock: &RecordLock, record: &MediaSharingRecord) -> Result<()> {
        if lock.id != record.id {
            return Err(MediaSharingError::Internal(format!(
                "Lock for {} used to update {}",
                lock.id, record.id
            )));
        }

        let previous = MediaSharingRepository::get_by_id(&self.db, &record.id)?
            .ok_or_else(|| MediaSharingError::NotFound(record.id.clone()))?;

        if !MediaSharingRepository::update(&self.db, record)? {
            return Err(MediaSharingError::NotFound(record.id.clone()));
        }

        debug!(
            record_id = %record.id,
            from = %previous.state,
            to = %record.state,
            "Updated media sharing record"
        );
        self.events.emit(MediaSharingEvent::RecordUpdated {
            record_type: MEDIA_SHARING_RECORD_TYPE,
            record: record.clone(),
            previous_state: previous.state,
        });
        Ok(())
    }

    /// Look up a record; `None` if absent
    pub fn find_by_id(&self, id: &str) -> Result<Option<MediaSharingRecord>> {
        Ok(MediaSharingRepository::get_by_id(&self.db, id)?)
    }

    /// Look up a record, failing with `NotFound` if absent
    pub fn get_by_id(&self, id: &str) -> Result<MediaSharingRecord> {
        self.find_by_id(id)?
            .ok_or_else(|| MediaSharingError::NotFound(id.to_string()))
    }

    pub fn find_by_connection_and_thread(
        &self,
        connection_id: &str,
        thread_id: &str,
    ) -> Result<Option<MediaSharingRecord>> {
        Ok(MediaSharingRepository::get_by_connection_and_thread(
            &self.db,
            connection_id,
            thread_id,
        )?)
    }

    pub fn find_by_query(&self, query: &RecordQuery) -> Result<Vec<MediaSharingRecord>> {
        Ok(MediaSharingRepository::query(&self.db, query)?)
    }

    pub fn get_all(&self) -> Result<Vec<MediaSharingRecord>> {
        Ok(MediaSharingRepository::get_all(&self.db)?)
    }

    /// Remove a record and emit `RecordDeleted`
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        let _lock = self.lock_record(id).await;
        let record = self.get_by_id(id)?;

        if !MediaSharingRepository::delete(&self.db, id)? {
            return Err(MediaSharingError::NotFound(id.to_string()));
        }

        debug!(record_id = %id, "Deleted media sharing record");
        self.events.emit(MediaSharingEvent::RecordDeleted {
            record_type: MEDIA_SHARING_RECORD_TYPE,
            record,
        });
        Ok(())
    }
}
