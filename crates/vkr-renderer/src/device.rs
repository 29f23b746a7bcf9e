//! Logical devices, their fence pools and their teardown.

use std::collections::HashSet;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use parking_lot::Mutex;
use tracing::{info, warn};
use vkr_driver::{Driver, HostHandle};
use vkr_protocol::{ObjectId, ObjectType};

use crate::error::Fatal;
use crate::object::{Object, ObjectKind};
use crate::queue::{destroy_sync_fences, Queue, RetiredSync, Waiters};
use crate::state::ContextState;

/// Order in which a device's children are destroyed. Objects that reference
/// other objects go first.
pub const TEARDOWN_ORDER: [ObjectType; 21] = [
    ObjectType::Framebuffer,
    ObjectType::ImageView,
    ObjectType::BufferView,
    ObjectType::RenderPass,
    ObjectType::Pipeline,
    ObjectType::PipelineLayout,
    ObjectType::PipelineCache,
    ObjectType::DescriptorPool,
    ObjectType::DescriptorSetLayout,
    ObjectType::DescriptorUpdateTemplate,
    ObjectType::ShaderModule,
    ObjectType::CommandPool,
    ObjectType::Fence,
    ObjectType::Semaphore,
    ObjectType::Event,
    ObjectType::QueryPool,
    ObjectType::Sampler,
    ObjectType::SamplerYcbcrConversion,
    ObjectType::Image,
    ObjectType::Buffer,
    ObjectType::DeviceMemory,
];

/// Free fences of one device, reused across fence submissions.
pub struct SyncPool {
    device: vk::Device,
    free: Mutex<Vec<vk::Fence>>,
}

impl SyncPool {
    pub fn new(device: vk::Device) -> Self {
        Self {
            device,
            free: Mutex::new(Vec::new()),
        }
    }

    /// A reset fence from the pool, or a new one.
    pub fn acquire(&self, driver: &dyn Driver) -> VkResult<vk::Fence> {
        let recycled = self.free.lock().pop();
        match recycled {
            Some(fence) => {
                if let Err(err) = driver.reset_fences(self.device, &[fence]) {
                    driver.destroy_object(self.device, HostHandle::Fence(fence));
                    return Err(err);
                }
                Ok(fence)
            }
            None => driver.create_fence(self.device),
        }
    }

    pub fn release(&self, fence: vk::Fence) {
        self.free.lock().push(fence);
    }

    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }

    /// Destroy every pooled fence.
    pub fn drain(&self, driver: &dyn Driver) {
        let fences = std::mem::take(&mut *self.free.lock());
        for fence in fences {
            driver.destroy_object(self.device, HostHandle::Fence(fence));
        }
    }
}

pub struct Device {
    pub handle: vk::Device,
    pub physical_device: ObjectId,
    /// Directly owned objects. Pool children are tracked by their pool.
    pub children: HashSet<ObjectId>,
    pub queues: Vec<Arc<Queue>>,
    pub sync_pool: Arc<SyncPool>,
    /// Handle types memory on this device can be exported as.
    pub external_memory_types: vk::ExternalMemoryHandleTypeFlags,
}

impl Device {
    pub fn queue(&self, family: u32, index: u32) -> Option<&Arc<Queue>> {
        self.queues
            .iter()
            .find(|queue| queue.family == family && queue.index == index)
    }
}

/// Remove `id` from the table and release its host object. Pool children go
/// with their pool without driver calls.
pub(crate) fn release_object(
    driver: &dyn Driver,
    state: &mut ContextState,
    device: vk::Device,
    id: ObjectId,
) -> Option<Object> {
    let object = state.objects.remove(id).ok()?;
    if let Some(children) = object.pool_children() {
        for child in children {
            let _ = state.objects.remove(*child);
        }
    }
    match &object.kind {
        ObjectKind::DeviceMemory(memory) => {
            state.resources.unlink(id);
            driver.free_memory(device, memory.handle);
        }
        _ => driver.destroy_object(device, object.host_handle()),
    }
    Some(object)
}

/// Tear down device `id` and everything it owns.
pub(crate) fn destroy_device(
    driver: &dyn Driver,
    waiters: &Waiters,
    state: &mut ContextState,
    id: ObjectId,
) -> Result<(), Fatal> {
    let handle = state.objects.device(id)?.handle;
    waiters.idle_device(handle);

    // ── Children ────────────────────────────────────────────
    let children = std::mem::take(&mut state.objects.device_mut(id)?.children);
    let mut removed = 0usize;
    for ty in TEARDOWN_ORDER {
        let of_type: Vec<ObjectId> = children
            .iter()
            .copied()
            .filter(|child| {
                state
                    .objects
                    .get(*child)
                    .is_some_and(|object| object.object_type() == ty)
            })
            .collect();
        for child in of_type {
            if let Some(object) = release_object(driver, state, handle, child) {
                removed += 1 + object.pool_children().map_or(0, |c| c.len());
            }
        }
    }

    // ── Queues ──────────────────────────────────────────────
    let object = state.objects.remove(id)?;
    let ObjectKind::Device(device) = object.kind else {
        return Err(Fatal::UnknownId(id));
    };
    for queue in &device.queues {
        let outstanding = queue.shutdown();
        destroy_sync_fences(driver, handle, &outstanding);
        for sync in outstanding {
            if waiters.is_async() {
                waiters
                    .transport()
                    .fence_retired(waiters.ctx_id(), sync.queue_id, sync.fence_cookie);
            } else {
                state.signaled_syncs.push(RetiredSync {
                    queue_id: sync.queue_id,
                    fence_cookie: sync.fence_cookie,
                });
            }
        }
        if let Some(queue_id) = queue.guest_id() {
            state.busy_queues.remove(&queue_id);
            let _ = state.objects.remove(queue_id);
        }
    }

    device.sync_pool.drain(driver);
    driver.destroy_device(handle);
    if let Ok(physical_device) = state.objects.physical_device_mut(device.physical_device) {
        physical_device.devices.retain(|d| *d != id);
    }

    info!(id, children = removed, queues = device.queues.len(), "device destroyed");
    Ok(())
}

/// Thread the new object onto its device's child list.
pub(crate) fn track_child(state: &mut ContextState, device: ObjectId, id: ObjectId) {
    match state.objects.device_mut(device) {
        Ok(device) => {
            device.children.insert(id);
        }
        Err(err) => warn!(id, "cannot track child: {}", err),
    }
}
