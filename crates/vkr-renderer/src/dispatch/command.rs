use ash::vk;
use tracing::debug;
use vkr_driver::HandleMap;
use vkr_protocol::commands::{
    AllocateCommandBuffersArgs, CommandBufferArgs, FreePoolObjectsArgs, ResetPoolArgs,
};
use vkr_protocol::{ObjectId, ObjectType, RecordedCommand, Reply};

use super::{failure, result_reply, success, Dispatcher};
use crate::error::Fatal;
use crate::object::{Object, ObjectKind};
use crate::object_table::ObjectTable;

/// Resolve the objects a recorded command refers to.
fn resolve_recorded(
    objects: &ObjectTable,
    handles: &mut HandleMap,
    op: &RecordedCommand,
    device: ObjectId,
) -> Result<(), Fatal> {
    match op {
        RecordedCommand::BindPipeline(cmd) => {
            objects.resolve(handles, cmd.pipeline, ObjectType::Pipeline, device)
        }
        RecordedCommand::BindDescriptorSets(cmd) => {
            objects.resolve(handles, cmd.layout, ObjectType::PipelineLayout, device)?;
            objects.resolve_all(handles, &cmd.descriptor_sets, ObjectType::DescriptorSet, device)
        }
        RecordedCommand::Dispatch(_) => Ok(()),
        RecordedCommand::CopyBuffer(cmd) => {
            objects.resolve(handles, cmd.src_buffer, ObjectType::Buffer, device)?;
            objects.resolve(handles, cmd.dst_buffer, ObjectType::Buffer, device)
        }
        RecordedCommand::FillBuffer(cmd) => {
            objects.resolve(handles, cmd.buffer, ObjectType::Buffer, device)
        }
        RecordedCommand::PipelineBarrier(cmd) => {
            for barrier in &cmd.buffer_memory_barriers {
                objects.resolve(handles, barrier.buffer, ObjectType::Buffer, device)?;
            }
            for barrier in &cmd.image_memory_barriers {
                objects.resolve(handles, barrier.image, ObjectType::Image, device)?;
            }
            Ok(())
        }
        RecordedCommand::SetEvent(cmd) | RecordedCommand::ResetEvent(cmd) => {
            objects.resolve(handles, cmd.event, ObjectType::Event, device)
        }
    }
}

impl Dispatcher<'_> {
    fn command_pool_handle(&self, pool: ObjectId, device: ObjectId) -> Result<vk::CommandPool, Fatal> {
        let handle = self
            .state
            .objects
            .owned_handle(pool, ObjectType::CommandPool, device)?;
        Ok(handle.command_pool().unwrap_or_default())
    }

    /// Host handles of a command buffer and its device.
    fn command_buffer_handles(&self, id: ObjectId) -> Result<(vk::Device, vk::CommandBuffer), Fatal> {
        let (command_buffer, device) = self.state.objects.command_buffer(id)?;
        Ok((self.device_handle(device)?, command_buffer))
    }

    pub(super) fn reset_command_pool(&mut self, args: ResetPoolArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let pool = self.command_pool_handle(args.pool, args.device)?;
        Ok(result_reply(self.driver.reset_command_pool(device, pool, args.flags)))
    }

    pub(super) fn allocate_command_buffers(&mut self, args: AllocateCommandBuffersArgs) -> Result<Reply, Fatal> {
        self.state.objects.validate_new_ids(&args.command_buffers)?;
        let device = self.device_handle(args.device)?;
        let pool = self.command_pool_handle(args.command_pool, args.device)?;

        let command_buffers = match self.driver.allocate_command_buffers(
            device,
            pool,
            args.level,
            args.command_buffers.len() as u32,
        ) {
            Ok(command_buffers) => command_buffers,
            Err(err) => return Ok(failure(err)),
        };
        for (id, handle) in args.command_buffers.iter().zip(command_buffers) {
            self.state.objects.insert(Object::owned_by(
                *id,
                args.device,
                ObjectKind::CommandBuffer {
                    handle,
                    pool: args.command_pool,
                },
            ))?;
            self.state
                .objects
                .command_pool_mut(args.command_pool)?
                .children
                .insert(*id);
        }
        debug!(
            ctx_id = self.ctx_id,
            pool = args.command_pool,
            count = args.command_buffers.len(),
            "command buffers allocated"
        );
        Ok(success())
    }

    pub(super) fn free_command_buffers(&mut self, args: FreePoolObjectsArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let pool = self.command_pool_handle(args.pool, args.device)?;
        let ids: Vec<ObjectId> = args.objects.iter().copied().filter(|id| *id != 0).collect();

        let mut handles = Vec::with_capacity(ids.len());
        for id in &ids {
            let object = self.state.objects.lookup(*id, ObjectType::CommandBuffer)?;
            match object.kind {
                ObjectKind::CommandBuffer { handle, pool: owner } if owner == args.pool => {
                    handles.push(handle)
                }
                _ => {
                    return Err(Fatal::WrongOwner {
                        id: *id,
                        owner: args.pool,
                    })
                }
            }
        }

        self.driver.free_command_buffers(device, pool, &handles);
        let children = &mut self.state.objects.command_pool_mut(args.pool)?.children;
        for id in &ids {
            children.remove(id);
        }
        for id in ids {
            self.state.objects.remove(id)?;
        }
        Ok(Reply::None)
    }

    pub(super) fn begin_command_buffer(&mut self, args: CommandBufferArgs) -> Result<Reply, Fatal> {
        let (device, command_buffer) = self.command_buffer_handles(args.command_buffer)?;
        Ok(result_reply(
            self.driver
                .begin_command_buffer(device, command_buffer, args.flags),
        ))
    }

    pub(super) fn end_command_buffer(&mut self, args: CommandBufferArgs) -> Result<Reply, Fatal> {
        let (device, command_buffer) = self.command_buffer_handles(args.command_buffer)?;
        Ok(result_reply(self.driver.end_command_buffer(device, command_buffer)))
    }

    pub(super) fn reset_command_buffer(&mut self, args: CommandBufferArgs) -> Result<Reply, Fatal> {
        let (device, command_buffer) = self.command_buffer_handles(args.command_buffer)?;
        Ok(result_reply(
            self.driver
                .reset_command_buffer(device, command_buffer, args.flags),
        ))
    }

    pub(super) fn record(&mut self, command_buffer: ObjectId, op: RecordedCommand) -> Result<Reply, Fatal> {
        let (handle, device_id) = self.state.objects.command_buffer(command_buffer)?;
        let device = self.device_handle(device_id)?;
        let mut handles = HandleMap::new();
        resolve_recorded(&self.state.objects, &mut handles, &op, device_id)?;
        self.driver.record(device, handle, &op, &handles);
        Ok(Reply::None)
    }
}
