use std::collections::HashSet;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};
use vkr_driver::HandleMap;
use vkr_protocol::commands::{CreateDeviceArgs, DeviceArgs, GetDeviceQueueArgs, QueueSubmitArgs};
use vkr_protocol::{ObjectType, Reply};

use super::{failure, result_reply, success, Dispatcher};
use crate::device::{Device, SyncPool};
use crate::error::Fatal;
use crate::object::{Object, ObjectKind};
use crate::queue::Queue;

impl Dispatcher<'_> {
    pub(super) fn create_device(&mut self, args: CreateDeviceArgs) -> Result<Reply, Fatal> {
        self.state.objects.validate_new_id(args.device)?;
        let physical_device = self.state.objects.physical_device(args.physical_device)?;

        if let Some(missing) = args
            .enabled_extensions
            .iter()
            .find(|name| !physical_device.supports_extension(name))
        {
            info!(ctx_id = self.ctx_id, extension = %missing, "device extension not available");
            return Ok(failure(vk::Result::ERROR_EXTENSION_NOT_PRESENT));
        }
        let mut extensions = args.enabled_extensions.clone();
        for name in &physical_device.external_memory_extensions {
            if !extensions.contains(name) {
                extensions.push(name.clone());
            }
        }
        let pd_handle = physical_device.handle;
        let external_memory_types = physical_device.external_memory_types;

        let handle = match self
            .driver
            .create_device(pd_handle, &args.queue_create_infos, &extensions)
        {
            Ok(handle) => handle,
            Err(err) => return Ok(failure(err)),
        };

        // From here on a failure must not leak the host device.
        let sync_pool = Arc::new(SyncPool::new(handle));
        let mut queues = Vec::new();
        for info in &args.queue_create_infos {
            for index in 0..info.queue_priorities.len() as u32 {
                match self
                    .driver
                    .get_device_queue(handle, info.queue_family_index, index, info.flags)
                {
                    Ok(queue) => queues.push(Arc::new(Queue::new(
                        queue,
                        args.device,
                        handle,
                        info.queue_family_index,
                        index,
                        info.flags,
                        Arc::clone(&sync_pool),
                    ))),
                    Err(err) => {
                        self.driver.destroy_device(handle);
                        return Ok(failure(err));
                    }
                }
            }
        }
        for queue in &queues {
            if let Err(err) = self.waiters.start(queue) {
                error!(ctx_id = self.ctx_id, "failed to spawn queue waiter: {}", err);
                for queue in &queues {
                    queue.shutdown();
                }
                self.driver.destroy_device(handle);
                return Ok(failure(vk::Result::ERROR_INITIALIZATION_FAILED));
            }
        }

        let queue_count = queues.len();
        self.state.objects.insert(Object::new(
            args.device,
            ObjectKind::Device(Device {
                handle,
                physical_device: args.physical_device,
                children: HashSet::new(),
                queues,
                sync_pool,
                external_memory_types,
            }),
        ))?;
        self.state
            .objects
            .physical_device_mut(args.physical_device)?
            .devices
            .push(args.device);

        info!(
            ctx_id = self.ctx_id,
            id = args.device,
            queues = queue_count,
            extensions = extensions.len(),
            "device created"
        );
        Ok(success())
    }

    pub(super) fn destroy_device(&mut self, args: DeviceArgs) -> Result<Reply, Fatal> {
        crate::device::destroy_device(self.driver, self.waiters, self.state, args.device)?;
        Ok(Reply::None)
    }

    /// Adopts the queue under the guest's id the first time it is fetched.
    pub(super) fn get_device_queue(&mut self, args: GetDeviceQueueArgs) -> Result<Reply, Fatal> {
        let device = self.state.objects.device(args.device)?;
        let queue = device
            .queue(args.queue_family_index, args.queue_index)
            .filter(|queue| queue.flags == args.flags)
            .cloned()
            .ok_or(Fatal::InvalidArgument("no queue with that family, index and flags"))?;

        match queue.guest_id() {
            Some(id) if id == args.queue => Ok(Reply::None),
            Some(_) => Err(Fatal::InvalidArgument("queue already fetched under another id")),
            None => {
                self.state.objects.validate_new_id(args.queue)?;
                queue.adopt(args.queue);
                self.state.objects.insert(Object::owned_by(
                    args.queue,
                    args.device,
                    ObjectKind::Queue(queue),
                ))?;
                Ok(Reply::None)
            }
        }
    }

    pub(super) fn queue_submit(&mut self, args: QueueSubmitArgs) -> Result<Reply, Fatal> {
        let queue = Arc::clone(self.state.objects.queue(args.queue)?);
        let mut handles = HandleMap::new();
        let objects = &self.state.objects;
        for submit in &args.submits {
            objects.resolve_all(&mut handles, &submit.wait_semaphores, ObjectType::Semaphore, queue.device)?;
            objects.resolve_all(&mut handles, &submit.command_buffers, ObjectType::CommandBuffer, queue.device)?;
            objects.resolve_all(&mut handles, &submit.signal_semaphores, ObjectType::Semaphore, queue.device)?;
            if submit.wait_dst_stage_masks.len() != submit.wait_semaphores.len() {
                return Err(Fatal::InvalidArgument("wait stage mask count mismatch"));
            }
        }
        objects.resolve_optional(&mut handles, args.fence, ObjectType::Fence, queue.device)?;
        let fence = args
            .fence
            .map(|id| handles.fence(id))
            .unwrap_or_else(vk::Fence::null);

        Ok(result_reply(self.driver.queue_submit(
            queue.host_device,
            queue.handle,
            &args.submits,
            &handles,
            fence,
        )))
    }
}
