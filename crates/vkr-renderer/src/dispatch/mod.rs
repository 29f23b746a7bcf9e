//! Command dispatch.
//!
//! One match arm per command record, each forwarding to a handler in the
//! submodules. Handlers are the only code that resolves guest ids, calls the
//! driver, or changes the object table. They get a [`Driver`], which has no
//! blocking entry points.

mod command;
mod descriptor;
mod device;
mod instance;
mod memory;
mod object;
mod sync;

use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, trace};
use vkr_core::RendererConfig;
use vkr_driver::Driver;
use vkr_protocol::{Command, ObjectId, OpcodeDisposition, Reply};

use crate::error::Fatal;
use crate::queue::Waiters;
use crate::state::ContextState;

pub(crate) use instance::destroy_instance;

pub struct Dispatcher<'a> {
    pub(crate) ctx_id: u32,
    pub(crate) config: &'a RendererConfig,
    pub(crate) driver: &'a dyn Driver,
    pub(crate) waiters: &'a Waiters,
    pub(crate) state: &'a mut ContextState,
}

impl Dispatcher<'_> {
    pub fn dispatch(&mut self, command: Command) -> Result<Reply, Fatal> {
        let opcode = command.opcode();
        match opcode.disposition() {
            OpcodeDisposition::Implemented => {}
            OpcodeDisposition::Ignored => {
                trace!(ctx_id = self.ctx_id, %opcode, "ignored command");
                return Ok(Reply::None);
            }
            OpcodeDisposition::Unsupported => return Err(Fatal::Unsupported(opcode)),
        }
        if self.config.debug.log_commands {
            debug!(ctx_id = self.ctx_id, %opcode, "dispatch");
        }

        match command {
            // ── Instance ────────────────────────────────────────
            Command::CreateInstance(args) => self.create_instance(args),
            Command::DestroyInstance(args) => self.destroy_instance(args),
            Command::EnumeratePhysicalDevices(args) => self.enumerate_physical_devices(args),

            // ── Physical Device Queries ─────────────────────────
            Command::GetPhysicalDeviceProperties(args) => self.physical_device_properties(args),
            Command::GetPhysicalDeviceQueueFamilyProperties(args) => {
                self.queue_family_properties(args)
            }
            Command::GetPhysicalDeviceMemoryProperties(args) => self.memory_properties(args),
            Command::EnumerateDeviceExtensionProperties(args) => self.device_extensions(args),

            // ── Device and queues ───────────────────────────────
            Command::CreateDevice(args) => self.create_device(args),
            Command::DestroyDevice(args) => self.destroy_device(args),
            Command::GetDeviceQueue(args) => self.get_device_queue(args),
            Command::DeviceWaitIdle(_) | Command::QueueWaitIdle(_) => {
                Err(Fatal::BlockingWait(opcode))
            }
            Command::QueueSubmit(args) => self.queue_submit(args),

            // ── Memory ──────────────────────────────────────────
            Command::AllocateMemory(args) => self.allocate_memory(args),
            Command::BindBufferMemory(args) => self.bind_buffer_memory(args),
            Command::BindImageMemory(args) => self.bind_image_memory(args),
            Command::GetBufferMemoryRequirements(args) => self.buffer_memory_requirements(args),
            Command::GetImageMemoryRequirements(args) => self.image_memory_requirements(args),

            // ── Generic objects ─────────────────────────────────
            Command::CreateObject(args) => self.create_object(args),
            Command::DestroyObject(args) => self.destroy_object(args),
            Command::CreateComputePipelines(args) => self.create_compute_pipelines(args),

            // ── Command pools and buffers ───────────────────────
            Command::ResetCommandPool(args) => self.reset_command_pool(args),
            Command::AllocateCommandBuffers(args) => self.allocate_command_buffers(args),
            Command::FreeCommandBuffers(args) => self.free_command_buffers(args),
            Command::BeginCommandBuffer(args) => self.begin_command_buffer(args),
            Command::EndCommandBuffer(args) => self.end_command_buffer(args),
            Command::ResetCommandBuffer(args) => self.reset_command_buffer(args),
            Command::Record { command_buffer, op } => self.record(command_buffer, op),

            // ── Descriptors ─────────────────────────────────────
            Command::ResetDescriptorPool(args) => self.reset_descriptor_pool(args),
            Command::AllocateDescriptorSets(args) => self.allocate_descriptor_sets(args),
            Command::FreeDescriptorSets(args) => self.free_descriptor_sets(args),
            Command::UpdateDescriptorSets(args) => self.update_descriptor_sets(args),

            // ── Synchronization ─────────────────────────────────
            Command::ResetFences(args) => self.reset_fences(args),
            Command::GetFenceStatus(args) => self.get_fence_status(args),
            Command::WaitForFences(args) => self.wait_for_fences(args),
            Command::GetEventStatus(args) => self.get_event_status(args),
            Command::SetEvent(args) => self.set_event(args),
            Command::ResetEvent(args) => self.reset_event(args),

            Command::SetDebugUtilsObjectName(_) => Ok(Reply::None),
            Command::Unsupported { opcode } => Err(Fatal::Unsupported(opcode)),
        }
    }

    fn device_handle(&self, device: ObjectId) -> Result<vk::Device, Fatal> {
        Ok(self.state.objects.device(device)?.handle)
    }
}

fn success() -> Reply {
    Reply::Result(vk::Result::SUCCESS.as_raw())
}

fn failure(err: vk::Result) -> Reply {
    Reply::Result(err.as_raw())
}

fn result_reply(result: VkResult<()>) -> Reply {
    match result {
        Ok(()) => success(),
        Err(err) => failure(err),
    }
}
