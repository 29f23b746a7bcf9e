//! The host driver boundary.
//!
//! Handlers only ever hold a [`Driver`], which has no blocking entry points.
//! Waiting for host completion lives on [`FenceWaiter`], which is only handed
//! to queue waiter threads and device teardown.

use std::os::fd::OwnedFd;
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use vkr_protocol::commands::{
    ComputePipelineCreateInfo, CreateInfo, CreateInstanceArgs, DeviceQueueCreateInfo, SubmitInfo,
    UpdateDescriptorSetsArgs,
};
use vkr_protocol::types::{
    ExtensionProperties, MemoryProperties, MemoryRequirements, PhysicalDeviceProperties,
    QueueFamilyProperties,
};
use vkr_protocol::RecordedCommand;

use crate::external::ExternalHandleType;
use crate::handle::{HandleMap, HostHandle};

/// A device memory allocation request.
#[derive(Debug)]
pub struct MemoryAllocation {
    pub size: u64,
    pub memory_type_index: u32,
    /// Handle types the allocation must be exportable as.
    pub export_handle_types: vk::ExternalMemoryHandleTypeFlags,
    /// Import instead of allocating. The driver owns the fd on success.
    pub import: Option<(ExternalHandleType, OwnedFd)>,
}

/// Non-blocking host driver entry points.
///
/// Calls that the underlying API defines as returning nothing also return
/// nothing here; implementations log and drop any failure.
pub trait Driver: Send + Sync {
    // ── Instance ────────────────────────────────────────────
    fn create_instance(&self, args: &CreateInstanceArgs, validation: bool) -> VkResult<vk::Instance>;
    fn destroy_instance(&self, instance: vk::Instance);
    fn enumerate_physical_devices(&self, instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>>;

    // ── Physical Device Queries ─────────────────────────────
    fn physical_device_properties(&self, physical_device: vk::PhysicalDevice) -> VkResult<PhysicalDeviceProperties>;
    fn queue_family_properties(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<QueueFamilyProperties>>;
    fn memory_properties(&self, physical_device: vk::PhysicalDevice) -> VkResult<MemoryProperties>;
    fn enumerate_device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<ExtensionProperties>>;

    // ── Logical Device ──────────────────────────────────────
    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_create_infos: &[DeviceQueueCreateInfo],
        extensions: &[String],
    ) -> VkResult<vk::Device>;
    fn destroy_device(&self, device: vk::Device);
    fn get_device_queue(&self, device: vk::Device, family: u32, index: u32, flags: u32) -> VkResult<vk::Queue>;

    // ── Queue ───────────────────────────────────────────────
    /// `submits` may be empty, which only signals `fence`.
    fn queue_submit(
        &self,
        device: vk::Device,
        queue: vk::Queue,
        submits: &[SubmitInfo],
        handles: &HandleMap,
        fence: vk::Fence,
    ) -> VkResult<()>;

    // ── Memory ──────────────────────────────────────────────
    fn allocate_memory(&self, device: vk::Device, allocation: MemoryAllocation) -> VkResult<vk::DeviceMemory>;
    fn free_memory(&self, device: vk::Device, memory: vk::DeviceMemory);
    fn get_memory_fd(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        handle_type: ExternalHandleType,
    ) -> VkResult<OwnedFd>;
    fn read_memory(&self, device: vk::Device, memory: vk::DeviceMemory, offset: u64, dst: &mut [u8]) -> VkResult<()>;
    fn write_memory(&self, device: vk::Device, memory: vk::DeviceMemory, offset: u64, src: &[u8]) -> VkResult<()>;
    fn bind_buffer_memory(&self, device: vk::Device, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: u64) -> VkResult<()>;
    fn bind_image_memory(&self, device: vk::Device, image: vk::Image, memory: vk::DeviceMemory, offset: u64) -> VkResult<()>;
    fn buffer_memory_requirements(&self, device: vk::Device, buffer: vk::Buffer) -> VkResult<MemoryRequirements>;
    fn image_memory_requirements(&self, device: vk::Device, image: vk::Image) -> VkResult<MemoryRequirements>;

    // ── Generic objects ─────────────────────────────────────
    fn create_object(&self, device: vk::Device, info: &CreateInfo, handles: &HandleMap) -> VkResult<HostHandle>;
    /// Destroys any device-owned handle. Pool children are ignored; they are
    /// released with their pool.
    fn destroy_object(&self, device: vk::Device, handle: HostHandle);
    /// On failure no pipeline is left alive.
    fn create_compute_pipelines(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
        create_infos: &[ComputePipelineCreateInfo],
        handles: &HandleMap,
    ) -> VkResult<Vec<vk::Pipeline>>;

    // ── Command pools and buffers ───────────────────────────
    fn allocate_command_buffers(
        &self,
        device: vk::Device,
        pool: vk::CommandPool,
        level: i32,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, device: vk::Device, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]);
    fn reset_command_pool(&self, device: vk::Device, pool: vk::CommandPool, flags: u32) -> VkResult<()>;
    fn begin_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer, flags: u32) -> VkResult<()>;
    fn end_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    fn reset_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer, flags: u32) -> VkResult<()>;
    fn record(&self, device: vk::Device, command_buffer: vk::CommandBuffer, op: &RecordedCommand, handles: &HandleMap);

    // ── Descriptors ─────────────────────────────────────────
    fn allocate_descriptor_sets(
        &self,
        device: vk::Device,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>>;
    fn free_descriptor_sets(&self, device: vk::Device, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()>;
    fn reset_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool, flags: u32) -> VkResult<()>;
    fn update_descriptor_sets(&self, device: vk::Device, args: &UpdateDescriptorSetsArgs, handles: &HandleMap);

    // ── Synchronization ─────────────────────────────────────
    fn create_fence(&self, device: vk::Device) -> VkResult<vk::Fence>;
    fn reset_fences(&self, device: vk::Device, fences: &[vk::Fence]) -> VkResult<()>;
    /// `Ok(true)` once signaled, `Ok(false)` while not ready.
    fn get_fence_status(&self, device: vk::Device, fence: vk::Fence) -> VkResult<bool>;
    fn get_event_status(&self, device: vk::Device, event: vk::Event) -> VkResult<bool>;
    fn set_event(&self, device: vk::Device, event: vk::Event) -> VkResult<()>;
    fn reset_event(&self, device: vk::Device, event: vk::Event) -> VkResult<()>;
}

/// Blocking waits on host completion.
pub trait FenceWaiter: Send + Sync {
    /// `Ok(false)` when `timeout` elapsed first.
    fn wait_for_fence(&self, device: vk::Device, fence: vk::Fence, timeout: Duration) -> VkResult<bool>;
    fn device_wait_idle(&self, device: vk::Device) -> VkResult<()>;
}
