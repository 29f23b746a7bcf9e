use std::collections::HashMap;
use std::sync::Arc;

use vkr_protocol::ObjectId;

use crate::memory::ResourceTable;
use crate::object_table::ObjectTable;
use crate::queue::{Queue, RetiredSync};

/// Everything guarded by the context lock.
#[derive(Default)]
pub struct ContextState {
    pub objects: ObjectTable,
    pub resources: ResourceTable,
    /// Queues with syncs not yet reported, by guest queue id.
    pub busy_queues: HashMap<ObjectId, Arc<Queue>>,
    /// Syncs of destroyed queues, reported on the next retirement.
    pub signaled_syncs: Vec<RetiredSync>,
}
