use crate::types::{CallRecord, MessageRecord};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("call {0} is already recorded")]
    DuplicateCall(String),
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether trying the same write again later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// In-place edit applied to an existing call record by `EventStore::upsert_call`.
pub type CallUpdate = dyn for<'a> Fn(&'a mut CallRecord) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated,
    Inserted,
    Skipped,
}

/// Home of every message and call record. Listing returns owned snapshots in insertion order.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_message(&self, message: MessageRecord) -> Result<(), StoreError>;

    /// Records a call we just placed. Fails if the id is already known.
    async fn append_call(&self, call: CallRecord) -> Result<(), StoreError>;

    async fn find_call(&self, id: &str) -> Result<Option<CallRecord>, StoreError>;

    /// Applies `update` to the call with `id` if present, otherwise inserts `insert` if given.
    /// Lookup and write happen atomically with respect to other store calls.
    async fn upsert_call(
        &self,
        id: &str,
        update: &CallUpdate,
        insert: Option<CallRecord>,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn list_messages(&self) -> Result<Vec<MessageRecord>, StoreError>;

    async fn list_calls(&self) -> Result<Vec<CallRecord>, StoreError>;
}

#[derive(Default)]
struct Collections {
    messages: Vec<MessageRecord>,
    calls: Vec<CallRecord>,
    // call id => position in `calls`
    call_index: HashMap<String, usize>,
}

impl Collections {
    fn push_call(&mut self, call: CallRecord) {
        self.call_index.insert(call.id.clone(), self.calls.len());
        self.calls.push(call);
    }
}

/// Process-lifetime store. Nothing is evicted and nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_message(&self, message: MessageRecord) -> Result<(), StoreError> {
        self.lock()?.messages.push(message);
        Ok(())
    }

    async fn append_call(&self, call: CallRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.call_index.contains_key(&call.id) {
            return Err(StoreError::DuplicateCall(call.id));
        }
        inner.push_call(call);
        Ok(())
    }

    async fn find_call(&self, id: &str) -> Result<Option<CallRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.call_index.get(id).map(|&idx| inner.calls[idx].clone()))
    }

    async fn upsert_call(
        &self,
        id: &str,
        update: &CallUpdate,
        insert: Option<CallRecord>,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.lock()?;
        let existing = inner.call_index.get(id).copied();
        if let Some(idx) = existing {
            update(&mut inner.calls[idx]);
            return Ok(UpsertOutcome::Updated);
        }
        match insert {
            Some(call) => {
                debug_assert_eq!(call.id, id);
                inner.push_call(call);
                Ok(UpsertOutcome::Inserted)
            }
            None => Ok(UpsertOutcome::Skipped),
        }
    }

    async fn list_messages(&self) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self.lock()?.messages.clone())
    }

    async fn list_calls(&self) -> Result<Vec<CallRecord>, StoreError> {
        Ok(self.lock()?.calls.clone())
    }
}
