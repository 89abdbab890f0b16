//! Per-group serialization

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use kringle_core::GroupId;

/// One mutex per group. Operations on different groups never contend.
#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: Mutex<HashMap<GroupId, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        GroupLocks::default()
    }

    /// The lock for `group`; hold its guard for the whole operation
    pub fn get(&self, group: GroupId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(group).or_default())
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
