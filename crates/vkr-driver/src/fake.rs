//! In-memory [`Driver`] for tests.
//!
//! Handles are plain counters. Fences only signal when a test says so (or
//! immediately with [`FakeDriver::set_auto_signal`]), and any entry point can
//! be made to fail once with [`FakeDriver::queue_result`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use vkr_protocol::commands::{
    ComputePipelineCreateInfo, CreateInfo, CreateInstanceArgs, DeviceQueueCreateInfo, SubmitInfo,
    UpdateDescriptorSetsArgs,
};
use vkr_protocol::types::{
    ExtensionProperties, MemoryHeap, MemoryProperties, MemoryRequirements, MemoryType,
    PhysicalDeviceProperties, QueueFamilyProperties,
};
use vkr_protocol::{ObjectType, RecordedCommand};

use crate::driver::{Driver, FenceWaiter, MemoryAllocation};
use crate::external::ExternalHandleType;
use crate::handle::{HandleMap, HostHandle};

/// Allocations above this fail with `ERROR_OUT_OF_DEVICE_MEMORY`.
pub const MAX_ALLOCATION_SIZE: u64 = 256 << 20;

/// What the single fake physical device reports.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub properties: PhysicalDeviceProperties,
    pub queue_families: Vec<QueueFamilyProperties>,
    pub memory_properties: MemoryProperties,
    pub extensions: Vec<ExtensionProperties>,
}

impl PhysicalDeviceInfo {
    pub fn add_extension(&mut self, name: &str, spec_version: u32) {
        self.extensions.push(ExtensionProperties::new(name, spec_version));
    }

    pub fn remove_extension(&mut self, name: &str) {
        self.extensions.retain(|ext| ext.extension_name != name);
    }
}

impl Default for PhysicalDeviceInfo {
    fn default() -> Self {
        let host_visible = (vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT)
            .as_raw();
        Self {
            properties: PhysicalDeviceProperties {
                api_version: vk::make_api_version(0, 1, 3, 250),
                driver_version: 1,
                vendor_id: 0x1af4,
                device_id: 0x1050,
                device_type: vk::PhysicalDeviceType::INTEGRATED_GPU.as_raw(),
                device_name: "vkr fake device".to_string(),
                pipeline_cache_uuid: [0; 16],
            },
            queue_families: vec![QueueFamilyProperties {
                queue_flags: (vk::QueueFlags::GRAPHICS
                    | vk::QueueFlags::COMPUTE
                    | vk::QueueFlags::TRANSFER)
                    .as_raw(),
                queue_count: 2,
                timestamp_valid_bits: 64,
                min_image_transfer_granularity: [1, 1, 1],
            }],
            memory_properties: MemoryProperties {
                memory_types: vec![
                    MemoryType {
                        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL.as_raw(),
                        heap_index: 0,
                    },
                    MemoryType {
                        property_flags: host_visible,
                        heap_index: 1,
                    },
                    MemoryType {
                        property_flags: host_visible
                            | vk::MemoryPropertyFlags::HOST_CACHED.as_raw(),
                        heap_index: 1,
                    },
                ],
                memory_heaps: vec![
                    MemoryHeap {
                        size: 1 << 30,
                        flags: vk::MemoryHeapFlags::DEVICE_LOCAL.as_raw(),
                    },
                    MemoryHeap {
                        size: 1 << 30,
                        flags: 0,
                    },
                ],
            },
            extensions: vec![
                ExtensionProperties::new("VK_KHR_external_memory", 1),
                ExtensionProperties::new("VK_KHR_external_memory_fd", 1),
                ExtensionProperties::new("VK_EXT_external_memory_dma_buf", 1),
                ExtensionProperties::new("VK_KHR_maintenance1", 5),
                ExtensionProperties::new("VK_FAKE_vendor_extension", 1),
            ],
        }
    }
}

/// One `allocate_memory` call as the driver saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub size: u64,
    pub memory_type_index: u32,
    pub export_handle_types: vk::ExternalMemoryHandleTypeFlags,
    pub imported: Option<ExternalHandleType>,
}

struct FakeMemory {
    /// Backing store, only for host-visible types.
    bytes: Option<Vec<u8>>,
}

#[derive(Default)]
struct FakeState {
    next_handle: u64,
    calls: Vec<String>,
    result_queue: HashMap<String, VecDeque<vk::Result>>,

    // ── Live objects ────────────────────────────────────────
    live: HashMap<u64, ObjectType>,
    instances: HashMap<vk::Instance, vk::PhysicalDevice>,
    /// device -> (family, index) -> queue
    device_queues: HashMap<vk::Device, HashMap<(u32, u32), vk::Queue>>,
    queue_devices: HashMap<vk::Queue, vk::Device>,
    pool_children: HashMap<u64, HashSet<u64>>,
    buffer_sizes: HashMap<vk::Buffer, u64>,
    image_extents: HashMap<vk::Image, [u32; 3]>,
    memories: HashMap<vk::DeviceMemory, FakeMemory>,
    allocations: Vec<AllocationRecord>,
    device_extensions: Vec<Vec<String>>,

    // ── Synchronization ─────────────────────────────────────
    fences: HashMap<vk::Fence, bool>,
    events: HashMap<vk::Event, bool>,
    /// Fences submitted and not yet signaled, in submission order.
    submissions: VecDeque<(vk::Queue, vk::Fence)>,
    auto_signal: bool,
}

impl FakeState {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        0x1000 + self.next_handle
    }

    fn track(&mut self, ty: ObjectType) -> u64 {
        let raw = self.mint();
        self.live.insert(raw, ty);
        raw
    }

    fn next_result(&mut self, entry_point: &str) -> VkResult<()> {
        self.calls.push(entry_point.to_string());
        match self
            .result_queue
            .get_mut(entry_point)
            .and_then(|queue| queue.pop_front())
        {
            Some(result) if result != vk::Result::SUCCESS => Err(result),
            _ => Ok(()),
        }
    }

    fn check_device(&self, device: vk::Device) -> VkResult<()> {
        if self.live.get(&device.as_raw()) == Some(&ObjectType::Device) {
            Ok(())
        } else {
            Err(vk::Result::ERROR_DEVICE_LOST)
        }
    }

    fn release(&mut self, raw: u64) {
        self.live.remove(&raw);
        if let Some(children) = self.pool_children.remove(&raw) {
            for child in children {
                self.live.remove(&child);
            }
        }
    }

    fn signal(&mut self, fence: vk::Fence) {
        if let Some(signaled) = self.fences.get_mut(&fence) {
            *signaled = true;
        }
    }
}

pub struct FakeDriver {
    info: PhysicalDeviceInfo,
    state: Mutex<FakeState>,
    fence_signaled: Condvar,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::with_info(PhysicalDeviceInfo::default())
    }

    pub fn with_info(info: PhysicalDeviceInfo) -> Self {
        Self {
            info,
            state: Mutex::new(FakeState::default()),
            fence_signaled: Condvar::new(),
        }
    }

    /// Make the next call of `entry_point` (e.g. `"vkQueueSubmit"`) return
    /// `result`. Results queue up per entry point.
    pub fn queue_result(&self, entry_point: &str, result: vk::Result) {
        self.state
            .lock()
            .result_queue
            .entry(entry_point.to_string())
            .or_default()
            .push_back(result);
    }

    /// Entry points called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, entry_point: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| *call == entry_point)
            .count()
    }

    pub fn live_count(&self, ty: ObjectType) -> usize {
        self.state.lock().live.values().filter(|t| **t == ty).count()
    }

    /// Every handle not yet destroyed, including pool children.
    pub fn live_total(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn allocations(&self) -> Vec<AllocationRecord> {
        self.state.lock().allocations.clone()
    }

    /// Enabled extension lists of every created device, in creation order.
    pub fn device_extensions(&self) -> Vec<Vec<String>> {
        self.state.lock().device_extensions.clone()
    }

    /// Signal submitted fences as soon as they are submitted.
    pub fn set_auto_signal(&self, auto_signal: bool) {
        self.state.lock().auto_signal = auto_signal;
    }

    /// Fences submitted and not yet signaled.
    pub fn pending_submissions(&self) -> usize {
        self.state.lock().submissions.len()
    }

    /// Signal the `count` oldest outstanding submissions.
    pub fn signal_submissions(&self, count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            let Some((_, fence)) = state.submissions.pop_front() else {
                break;
            };
            state.signal(fence);
        }
        self.fence_signaled.notify_all();
    }

    pub fn signal_all(&self) {
        let pending = self.pending_submissions();
        self.signal_submissions(pending);
    }

    /// Contents of a host-visible memory, by host handle.
    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.state
            .lock()
            .memories
            .get(&memory)
            .and_then(|m| m.bytes.clone())
    }

    fn is_host_visible(&self, memory_type_index: u32) -> bool {
        self.info
            .memory_properties
            .memory_type(memory_type_index)
            .map(|ty| {
                vk::MemoryPropertyFlags::from_raw(ty.property_flags)
                    .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
            })
            .unwrap_or(false)
    }

    fn all_memory_types(&self) -> u32 {
        let count = self.info.memory_properties.memory_types.len() as u32;
        if count >= 32 {
            u32::MAX
        } else {
            (1 << count) - 1
        }
    }
}

fn create_entry_point(ty: ObjectType) -> String {
    match ty {
        ObjectType::DeviceMemory => "vkAllocateMemory".to_string(),
        other => format!("vkCreate{other:?}"),
    }
}

fn destroy_entry_point(ty: ObjectType) -> String {
    match ty {
        ObjectType::DeviceMemory => "vkFreeMemory".to_string(),
        other => format!("vkDestroy{other:?}"),
    }
}

impl Driver for FakeDriver {
    fn create_instance(&self, _args: &CreateInstanceArgs, _validation: bool) -> VkResult<vk::Instance> {
        let mut state = self.state.lock();
        state.next_result("vkCreateInstance")?;
        let instance = vk::Instance::from_raw(state.track(ObjectType::Instance));
        let physical_device = vk::PhysicalDevice::from_raw(state.mint());
        state.instances.insert(instance, physical_device);
        Ok(instance)
    }

    fn destroy_instance(&self, instance: vk::Instance) {
        let mut state = self.state.lock();
        state.calls.push("vkDestroyInstance".to_string());
        state.instances.remove(&instance);
        state.release(instance.as_raw());
    }

    fn enumerate_physical_devices(&self, instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>> {
        let mut state = self.state.lock();
        state.next_result("vkEnumeratePhysicalDevices")?;
        state
            .instances
            .get(&instance)
            .map(|pd| vec![*pd])
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn physical_device_properties(&self, _physical_device: vk::PhysicalDevice) -> VkResult<PhysicalDeviceProperties> {
        self.state.lock().next_result("vkGetPhysicalDeviceProperties")?;
        Ok(self.info.properties.clone())
    }

    fn queue_family_properties(&self, _physical_device: vk::PhysicalDevice) -> VkResult<Vec<QueueFamilyProperties>> {
        self.state
            .lock()
            .next_result("vkGetPhysicalDeviceQueueFamilyProperties")?;
        Ok(self.info.queue_families.clone())
    }

    fn memory_properties(&self, _physical_device: vk::PhysicalDevice) -> VkResult<MemoryProperties> {
        self.state
            .lock()
            .next_result("vkGetPhysicalDeviceMemoryProperties")?;
        Ok(self.info.memory_properties.clone())
    }

    fn enumerate_device_extensions(&self, _physical_device: vk::PhysicalDevice) -> VkResult<Vec<ExtensionProperties>> {
        self.state
            .lock()
            .next_result("vkEnumerateDeviceExtensionProperties")?;
        Ok(self.info.extensions.clone())
    }

    fn create_device(
        &self,
        _physical_device: vk::PhysicalDevice,
        queue_create_infos: &[DeviceQueueCreateInfo],
        extensions: &[String],
    ) -> VkResult<vk::Device> {
        let mut state = self.state.lock();
        state.next_result("vkCreateDevice")?;

        for info in queue_create_infos {
            let family = self
                .info
                .queue_families
                .get(info.queue_family_index as usize)
                .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
            if info.queue_priorities.len() as u32 > family.queue_count {
                return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
            }
        }
        for name in extensions {
            if !self.info.extensions.iter().any(|e| &e.extension_name == name) {
                return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
            }
        }

        let device = vk::Device::from_raw(state.track(ObjectType::Device));
        let mut queues = HashMap::new();
        for info in queue_create_infos {
            for index in 0..info.queue_priorities.len() as u32 {
                let queue = vk::Queue::from_raw(state.mint());
                queues.insert((info.queue_family_index, index), queue);
                state.queue_devices.insert(queue, device);
            }
        }
        state.device_queues.insert(device, queues);
        state.device_extensions.push(extensions.to_vec());
        Ok(device)
    }

    fn destroy_device(&self, device: vk::Device) {
        let mut state = self.state.lock();
        state.calls.push("vkDestroyDevice".to_string());
        if let Some(queues) = state.device_queues.remove(&device) {
            for queue in queues.values() {
                state.queue_devices.remove(queue);
            }
        }
        state.release(device.as_raw());
    }

    fn get_device_queue(&self, device: vk::Device, family: u32, index: u32, _flags: u32) -> VkResult<vk::Queue> {
        let mut state = self.state.lock();
        state.next_result("vkGetDeviceQueue")?;
        state
            .device_queues
            .get(&device)
            .and_then(|queues| queues.get(&(family, index)))
            .copied()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn queue_submit(
        &self,
        device: vk::Device,
        queue: vk::Queue,
        _submits: &[SubmitInfo],
        _handles: &HandleMap,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkQueueSubmit")?;
        state.check_device(device)?;
        if state.queue_devices.get(&queue) != Some(&device) {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        if fence != vk::Fence::null() {
            if state.auto_signal {
                state.signal(fence);
                self.fence_signaled.notify_all();
            } else {
                state.submissions.push_back((queue, fence));
            }
        }
        Ok(())
    }

    fn allocate_memory(&self, device: vk::Device, allocation: MemoryAllocation) -> VkResult<vk::DeviceMemory> {
        let mut state = self.state.lock();
        state.next_result("vkAllocateMemory")?;
        state.check_device(device)?;
        if self
            .info
            .memory_properties
            .memory_type(allocation.memory_type_index)
            .is_none()
        {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        if allocation.size == 0 || allocation.size > MAX_ALLOCATION_SIZE {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }

        let memory = vk::DeviceMemory::from_raw(state.track(ObjectType::DeviceMemory));
        let bytes = self
            .is_host_visible(allocation.memory_type_index)
            .then(|| vec![0; allocation.size as usize]);
        state.memories.insert(
            memory,
            FakeMemory { bytes },
        );
        state.allocations.push(AllocationRecord {
            size: allocation.size,
            memory_type_index: allocation.memory_type_index,
            export_handle_types: allocation.export_handle_types,
            imported: allocation.import.as_ref().map(|(ty, _)| *ty),
        });
        // An imported fd is consumed on success.
        drop(allocation.import);
        Ok(memory)
    }

    fn free_memory(&self, _device: vk::Device, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        state.calls.push("vkFreeMemory".to_string());
        state.memories.remove(&memory);
        state.release(memory.as_raw());
    }

    fn get_memory_fd(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        _handle_type: ExternalHandleType,
    ) -> VkResult<OwnedFd> {
        let mut state = self.state.lock();
        state.next_result("vkGetMemoryFdKHR")?;
        state.check_device(device)?;
        if !state.memories.contains_key(&memory) {
            return Err(vk::Result::ERROR_INVALID_EXTERNAL_HANDLE);
        }
        File::open("/dev/null")
            .map(OwnedFd::from)
            .map_err(|_| vk::Result::ERROR_TOO_MANY_OBJECTS)
    }

    fn read_memory(&self, device: vk::Device, memory: vk::DeviceMemory, offset: u64, dst: &mut [u8]) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkMapMemory")?;
        state.check_device(device)?;
        let bytes = state
            .memories
            .get(&memory)
            .and_then(|m| m.bytes.as_ref())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let start = offset as usize;
        let src = start
            .checked_add(dst.len())
            .and_then(|end| bytes.get(start..end))
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn write_memory(&self, device: vk::Device, memory: vk::DeviceMemory, offset: u64, src: &[u8]) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkMapMemory")?;
        state.check_device(device)?;
        let bytes = state
            .memories
            .get_mut(&memory)
            .and_then(|m| m.bytes.as_mut())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let start = offset as usize;
        let dst = start
            .checked_add(src.len())
            .and_then(|end| bytes.get_mut(start..end))
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn bind_buffer_memory(&self, device: vk::Device, _buffer: vk::Buffer, memory: vk::DeviceMemory, _offset: u64) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkBindBufferMemory")?;
        state.check_device(device)?;
        if !state.memories.contains_key(&memory) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        Ok(())
    }

    fn bind_image_memory(&self, device: vk::Device, _image: vk::Image, memory: vk::DeviceMemory, _offset: u64) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkBindImageMemory")?;
        state.check_device(device)?;
        if !state.memories.contains_key(&memory) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        Ok(())
    }

    fn buffer_memory_requirements(&self, device: vk::Device, buffer: vk::Buffer) -> VkResult<MemoryRequirements> {
        let mut state = self.state.lock();
        state.next_result("vkGetBufferMemoryRequirements")?;
        state.check_device(device)?;
        let size = state.buffer_sizes.get(&buffer).copied().unwrap_or(0);
        Ok(MemoryRequirements {
            size: size.next_multiple_of(256),
            alignment: 256,
            memory_type_bits: self.all_memory_types(),
        })
    }

    fn image_memory_requirements(&self, device: vk::Device, image: vk::Image) -> VkResult<MemoryRequirements> {
        let mut state = self.state.lock();
        state.next_result("vkGetImageMemoryRequirements")?;
        state.check_device(device)?;
        let [w, h, d] = state.image_extents.get(&image).copied().unwrap_or([0; 3]);
        let size = u64::from(w) * u64::from(h) * u64::from(d) * 4;
        Ok(MemoryRequirements {
            size: size.next_multiple_of(4096),
            alignment: 4096,
            memory_type_bits: self.all_memory_types(),
        })
    }

    fn create_object(&self, device: vk::Device, info: &CreateInfo, _handles: &HandleMap) -> VkResult<HostHandle> {
        let ty = info.object_type();
        let mut state = self.state.lock();
        state.next_result(&create_entry_point(ty))?;
        state.check_device(device)?;

        let handle = HostHandle::from_raw(ty, state.track(ty));
        match (info, handle) {
            (CreateInfo::Buffer(ci), HostHandle::Buffer(buffer)) => {
                state.buffer_sizes.insert(buffer, ci.size);
            }
            (CreateInfo::Image(ci), HostHandle::Image(image)) => {
                state.image_extents.insert(image, ci.extent);
            }
            (CreateInfo::Fence(ci), HostHandle::Fence(fence)) => {
                let signaled = vk::FenceCreateFlags::from_raw(ci.flags)
                    .contains(vk::FenceCreateFlags::SIGNALED);
                state.fences.insert(fence, signaled);
            }
            (CreateInfo::Event(_), HostHandle::Event(event)) => {
                state.events.insert(event, false);
            }
            (CreateInfo::CommandPool(_), _) | (CreateInfo::DescriptorPool(_), _) => {
                state.pool_children.insert(handle.as_raw(), HashSet::new());
            }
            _ => {}
        }
        trace!(?ty, raw = handle.as_raw(), "fake object created");
        Ok(handle)
    }

    fn destroy_object(&self, _device: vk::Device, handle: HostHandle) {
        let ty = handle.object_type();
        let mut state = self.state.lock();
        state.calls.push(destroy_entry_point(ty));
        match handle {
            HostHandle::Buffer(buffer) => {
                state.buffer_sizes.remove(&buffer);
            }
            HostHandle::Image(image) => {
                state.image_extents.remove(&image);
            }
            HostHandle::Fence(fence) => {
                state.fences.remove(&fence);
                state.submissions.retain(|(_, f)| *f != fence);
            }
            HostHandle::Event(event) => {
                state.events.remove(&event);
            }
            HostHandle::DeviceMemory(memory) => {
                state.memories.remove(&memory);
            }
            _ => {}
        }
        state.release(handle.as_raw());
    }

    fn create_compute_pipelines(
        &self,
        device: vk::Device,
        _cache: vk::PipelineCache,
        create_infos: &[ComputePipelineCreateInfo],
        _handles: &HandleMap,
    ) -> VkResult<Vec<vk::Pipeline>> {
        let mut state = self.state.lock();
        state.next_result("vkCreateComputePipelines")?;
        state.check_device(device)?;
        Ok(create_infos
            .iter()
            .map(|_| vk::Pipeline::from_raw(state.track(ObjectType::Pipeline)))
            .collect())
    }

    fn allocate_command_buffers(
        &self,
        device: vk::Device,
        pool: vk::CommandPool,
        _level: i32,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        state.next_result("vkAllocateCommandBuffers")?;
        state.check_device(device)?;
        let raws: Vec<u64> = (0..count).map(|_| state.track(ObjectType::CommandBuffer)).collect();
        state
            .pool_children
            .entry(pool.as_raw())
            .or_default()
            .extend(raws.iter().copied());
        Ok(raws.into_iter().map(vk::CommandBuffer::from_raw).collect())
    }

    fn free_command_buffers(&self, _device: vk::Device, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        state.calls.push("vkFreeCommandBuffers".to_string());
        for cb in command_buffers {
            state.live.remove(&cb.as_raw());
            if let Some(children) = state.pool_children.get_mut(&pool.as_raw()) {
                children.remove(&cb.as_raw());
            }
        }
    }

    fn reset_command_pool(&self, device: vk::Device, _pool: vk::CommandPool, _flags: u32) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkResetCommandPool")?;
        state.check_device(device)
    }

    fn begin_command_buffer(&self, device: vk::Device, _command_buffer: vk::CommandBuffer, _flags: u32) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkBeginCommandBuffer")?;
        state.check_device(device)
    }

    fn end_command_buffer(&self, device: vk::Device, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkEndCommandBuffer")?;
        state.check_device(device)
    }

    fn reset_command_buffer(&self, device: vk::Device, _command_buffer: vk::CommandBuffer, _flags: u32) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkResetCommandBuffer")?;
        state.check_device(device)
    }

    fn record(&self, _device: vk::Device, _command_buffer: vk::CommandBuffer, op: &RecordedCommand, _handles: &HandleMap) {
        self.state.lock().calls.push(format!("vk{}", op.opcode()));
    }

    fn allocate_descriptor_sets(
        &self,
        device: vk::Device,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut state = self.state.lock();
        state.next_result("vkAllocateDescriptorSets")?;
        state.check_device(device)?;
        let raws: Vec<u64> = layouts
            .iter()
            .map(|_| state.track(ObjectType::DescriptorSet))
            .collect();
        state
            .pool_children
            .entry(pool.as_raw())
            .or_default()
            .extend(raws.iter().copied());
        Ok(raws.into_iter().map(vk::DescriptorSet::from_raw).collect())
    }

    fn free_descriptor_sets(&self, device: vk::Device, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkFreeDescriptorSets")?;
        state.check_device(device)?;
        for set in sets {
            state.live.remove(&set.as_raw());
            if let Some(children) = state.pool_children.get_mut(&pool.as_raw()) {
                children.remove(&set.as_raw());
            }
        }
        Ok(())
    }

    fn reset_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool, _flags: u32) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkResetDescriptorPool")?;
        state.check_device(device)?;
        let children: Vec<u64> = state
            .pool_children
            .get_mut(&pool.as_raw())
            .map(|children| children.drain().collect())
            .unwrap_or_default();
        for child in children {
            state.live.remove(&child);
        }
        Ok(())
    }

    fn update_descriptor_sets(&self, _device: vk::Device, _args: &UpdateDescriptorSetsArgs, _handles: &HandleMap) {
        self.state.lock().calls.push("vkUpdateDescriptorSets".to_string());
    }

    fn create_fence(&self, device: vk::Device) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        state.next_result("vkCreateFence")?;
        state.check_device(device)?;
        let fence = vk::Fence::from_raw(state.track(ObjectType::Fence));
        state.fences.insert(fence, false);
        Ok(fence)
    }

    fn reset_fences(&self, device: vk::Device, fences: &[vk::Fence]) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkResetFences")?;
        state.check_device(device)?;
        for fence in fences {
            if let Some(signaled) = state.fences.get_mut(fence) {
                *signaled = false;
            }
        }
        Ok(())
    }

    fn get_fence_status(&self, device: vk::Device, fence: vk::Fence) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.next_result("vkGetFenceStatus")?;
        state.check_device(device)?;
        state
            .fences
            .get(&fence)
            .copied()
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }

    fn get_event_status(&self, device: vk::Device, event: vk::Event) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.next_result("vkGetEventStatus")?;
        state.check_device(device)?;
        state
            .events
            .get(&event)
            .copied()
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }

    fn set_event(&self, device: vk::Device, event: vk::Event) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkSetEvent")?;
        state.check_device(device)?;
        state.events.insert(event, true);
        Ok(())
    }

    fn reset_event(&self, device: vk::Device, event: vk::Event) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkResetEvent")?;
        state.check_device(device)?;
        state.events.insert(event, false);
        Ok(())
    }
}

impl FenceWaiter for FakeDriver {
    fn wait_for_fence(&self, device: vk::Device, fence: vk::Fence, timeout: Duration) -> VkResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.check_device(device)?;
        loop {
            match state.fences.get(&fence) {
                Some(true) => return Ok(true),
                Some(false) => {}
                None => return Err(vk::Result::ERROR_DEVICE_LOST),
            }
            if self.fence_signaled.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.fences.get(&fence) == Some(&true));
            }
        }
    }

    fn device_wait_idle(&self, device: vk::Device) -> VkResult<()> {
        let mut state = self.state.lock();
        state.next_result("vkDeviceWaitIdle")?;
        state.check_device(device)?;
        let mut remaining = VecDeque::new();
        while let Some((queue, fence)) = state.submissions.pop_front() {
            if state.queue_devices.get(&queue) == Some(&device) {
                state.signal(fence);
            } else {
                remaining.push_back((queue, fence));
            }
        }
        state.submissions = remaining;
        self.fence_signaled.notify_all();
        Ok(())
    }
}
