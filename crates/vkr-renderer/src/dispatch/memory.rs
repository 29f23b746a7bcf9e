use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, warn};
use vkr_driver::MemoryAllocation;
use vkr_protocol::commands::{AllocateMemoryArgs, BindMemoryArgs, DeviceObjectArgs};
use vkr_protocol::types::MemoryRequirements;
use vkr_protocol::{ObjectType, Opcode, Reply};

use super::{failure, result_reply, success, Dispatcher};
use crate::device::track_child;
use crate::error::Fatal;
use crate::memory::{self, negotiate_handle_types};
use crate::object::{DeviceMemory, Object, ObjectKind};

impl Dispatcher<'_> {
    pub(super) fn allocate_memory(&mut self, args: AllocateMemoryArgs) -> Result<Reply, Fatal> {
        self.state.objects.validate_new_id(args.memory)?;
        let device = self.state.objects.device(args.device)?;
        let handle = device.handle;
        let supported = device.external_memory_types;
        let property_flags = self
            .state
            .objects
            .physical_device(device.physical_device)?
            .memory_type_flags(args.memory_type_index)
            .ok_or(Fatal::InvalidArgument("memory type index out of range"))?;

        let import = if args.import_resource_id != 0 {
            match memory::import(self.driver, self.state, args.import_resource_id) {
                Ok(import) => Some(import),
                Err(err) => {
                    warn!(
                        ctx_id = self.ctx_id,
                        resource_id = args.import_resource_id,
                        "memory import failed: {}",
                        err
                    );
                    return Ok(failure(vk::Result::ERROR_INVALID_EXTERNAL_HANDLE));
                }
            }
        } else {
            None
        };
        let valid_handle_types = if import.is_some() {
            vk::ExternalMemoryHandleTypeFlags::empty()
        } else {
            negotiate_handle_types(
                vk::ExternalMemoryHandleTypeFlags::from_raw(args.export_handle_types),
                supported,
                self.config.memory.auto_export,
            )
        };

        let allocation = MemoryAllocation {
            size: args.allocation_size,
            memory_type_index: args.memory_type_index,
            export_handle_types: valid_handle_types,
            import,
        };
        let memory = match self.driver.allocate_memory(handle, allocation) {
            Ok(memory) => memory,
            Err(err) => return Ok(failure(err)),
        };

        self.state.objects.insert(Object::owned_by(
            args.memory,
            args.device,
            ObjectKind::DeviceMemory(DeviceMemory {
                handle: memory,
                device: handle,
                size: args.allocation_size,
                memory_type_index: args.memory_type_index,
                property_flags,
                valid_handle_types,
                exported: None,
            }),
        ))?;
        track_child(self.state, args.device, args.memory);
        debug!(
            ctx_id = self.ctx_id,
            id = args.memory,
            size = args.allocation_size,
            imported = args.import_resource_id != 0,
            "device memory allocated"
        );
        Ok(success())
    }

    pub(super) fn bind_buffer_memory(&mut self, args: BindMemoryArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let objects = &self.state.objects;
        let buffer = objects.owned_handle(args.object, ObjectType::Buffer, args.device)?;
        let memory = objects.owned_handle(args.memory, ObjectType::DeviceMemory, args.device)?;
        Ok(result_reply(self.driver.bind_buffer_memory(
            device,
            buffer.buffer().unwrap_or_default(),
            memory.device_memory().unwrap_or_default(),
            args.offset,
        )))
    }

    pub(super) fn bind_image_memory(&mut self, args: BindMemoryArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let objects = &self.state.objects;
        let image = objects.owned_handle(args.object, ObjectType::Image, args.device)?;
        let memory = objects.owned_handle(args.memory, ObjectType::DeviceMemory, args.device)?;
        Ok(result_reply(self.driver.bind_image_memory(
            device,
            image.image().unwrap_or_default(),
            memory.device_memory().unwrap_or_default(),
            args.offset,
        )))
    }

    pub(super) fn buffer_memory_requirements(&mut self, args: DeviceObjectArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let buffer = self
            .state
            .objects
            .owned_handle(args.object, ObjectType::Buffer, args.device)?
            .buffer()
            .unwrap_or_default();
        let requirements = self.driver.buffer_memory_requirements(device, buffer);
        Ok(self.requirements_reply(Opcode::GetBufferMemoryRequirements, requirements))
    }

    pub(super) fn image_memory_requirements(&mut self, args: DeviceObjectArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let image = self
            .state
            .objects
            .owned_handle(args.object, ObjectType::Image, args.device)?
            .image()
            .unwrap_or_default();
        let requirements = self.driver.image_memory_requirements(device, image);
        Ok(self.requirements_reply(Opcode::GetImageMemoryRequirements, requirements))
    }

    /// The query has no result code, so a failure reports zeroed
    /// requirements.
    fn requirements_reply(&self, opcode: Opcode, requirements: VkResult<MemoryRequirements>) -> Reply {
        match requirements {
            Ok(requirements) => Reply::MemoryRequirements(requirements),
            Err(err) => {
                warn!(ctx_id = self.ctx_id, %opcode, "driver call failed: {:?}", err);
                Reply::MemoryRequirements(MemoryRequirements::default())
            }
        }
    }
}
