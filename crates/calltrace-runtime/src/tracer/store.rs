//! Pending records keyed by frame identity

use super::record::CallRecord;
use crate::vm::FrameId;
use std::collections::HashMap;

/// Records of frames between their call and return events
///
/// Holds at most one entry per active frame, so its size follows the live
/// call depth.
#[derive(Debug, Default)]
pub struct FrameStore {
    records: HashMap<FrameId, CallRecord>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, replacing any stale entry for the same frame
    pub fn insert(&mut self, id: FrameId, record: CallRecord) -> Option<CallRecord> {
        self.records.insert(id, record)
    }

    pub fn get(&self, id: FrameId) -> Option<&CallRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut CallRecord> {
        self.records.get_mut(&id)
    }

    pub fn remove(&mut self, id: FrameId) -> Option<CallRecord> {
        self.records.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
