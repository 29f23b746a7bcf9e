//! Object records held by the object table.

use std::collections::HashSet;
use std::sync::Arc;

use ash::vk;
use vkr_driver::{ExternalHandleType, HostHandle};
use vkr_protocol::{ObjectId, ObjectType, ResourceId};

use crate::device::Device;
use crate::physical_device::PhysicalDevice;
use crate::queue::Queue;

pub struct Instance {
    pub handle: vk::Instance,
    /// API version the guest asked for; 0 means 1.0.
    pub api_version: u32,
    /// Host enumeration, cached on first use.
    pub host_physical_devices: Option<Vec<vk::PhysicalDevice>>,
    /// Guest ids of enumerated physical devices, in host order.
    pub physical_devices: Vec<ObjectId>,
}

/// A command or descriptor pool and the objects allocated from it.
pub struct Pool<H> {
    pub handle: H,
    pub children: HashSet<ObjectId>,
}

impl<H> Pool<H> {
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            children: HashSet::new(),
        }
    }
}

pub struct DeviceMemory {
    pub handle: vk::DeviceMemory,
    /// Host handle of the owning device.
    pub device: vk::Device,
    pub size: u64,
    pub memory_type_index: u32,
    pub property_flags: vk::MemoryPropertyFlags,
    /// Handle types this allocation can be exported as.
    pub valid_handle_types: vk::ExternalMemoryHandleTypeFlags,
    pub exported: Option<(ResourceId, ExternalHandleType)>,
}

impl DeviceMemory {
    pub fn is_host_visible(&self) -> bool {
        self.property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

pub enum ObjectKind {
    Instance(Instance),
    PhysicalDevice(PhysicalDevice),
    Device(Device),
    Queue(Arc<Queue>),
    DeviceMemory(DeviceMemory),
    CommandPool(Pool<vk::CommandPool>),
    DescriptorPool(Pool<vk::DescriptorPool>),
    CommandBuffer {
        handle: vk::CommandBuffer,
        pool: ObjectId,
    },
    DescriptorSet {
        handle: vk::DescriptorSet,
        pool: ObjectId,
    },
    /// Every other device child. Nothing to track beyond the handle.
    Plain(HostHandle),
}

pub struct Object {
    pub id: ObjectId,
    /// Owning device for device and pool children.
    pub device: Option<ObjectId>,
    pub kind: ObjectKind,
}

impl Object {
    pub fn new(id: ObjectId, kind: ObjectKind) -> Self {
        Self {
            id,
            device: None,
            kind,
        }
    }

    pub fn owned_by(id: ObjectId, device: ObjectId, kind: ObjectKind) -> Self {
        Self {
            id,
            device: Some(device),
            kind,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match &self.kind {
            ObjectKind::Instance(_) => ObjectType::Instance,
            ObjectKind::PhysicalDevice(_) => ObjectType::PhysicalDevice,
            ObjectKind::Device(_) => ObjectType::Device,
            ObjectKind::Queue(_) => ObjectType::Queue,
            ObjectKind::DeviceMemory(_) => ObjectType::DeviceMemory,
            ObjectKind::CommandPool(_) => ObjectType::CommandPool,
            ObjectKind::DescriptorPool(_) => ObjectType::DescriptorPool,
            ObjectKind::CommandBuffer { .. } => ObjectType::CommandBuffer,
            ObjectKind::DescriptorSet { .. } => ObjectType::DescriptorSet,
            ObjectKind::Plain(handle) => handle.object_type(),
        }
    }

    pub fn host_handle(&self) -> HostHandle {
        match &self.kind {
            ObjectKind::Instance(instance) => HostHandle::Instance(instance.handle),
            ObjectKind::PhysicalDevice(pd) => HostHandle::PhysicalDevice(pd.handle),
            ObjectKind::Device(device) => HostHandle::Device(device.handle),
            ObjectKind::Queue(queue) => HostHandle::Queue(queue.handle),
            ObjectKind::DeviceMemory(memory) => HostHandle::DeviceMemory(memory.handle),
            ObjectKind::CommandPool(pool) => HostHandle::CommandPool(pool.handle),
            ObjectKind::DescriptorPool(pool) => HostHandle::DescriptorPool(pool.handle),
            ObjectKind::CommandBuffer { handle, .. } => HostHandle::CommandBuffer(*handle),
            ObjectKind::DescriptorSet { handle, .. } => HostHandle::DescriptorSet(*handle),
            ObjectKind::Plain(handle) => *handle,
        }
    }

    /// Objects allocated from this one, for pools.
    pub fn pool_children(&self) -> Option<&HashSet<ObjectId>> {
        match &self.kind {
            ObjectKind::CommandPool(pool) => Some(&pool.children),
            ObjectKind::DescriptorPool(pool) => Some(&pool.children),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("type", &self.object_type())
            .field("device", &self.device)
            .field("handle", &self.host_handle().as_raw())
            .finish()
    }
}
