use ash::vk;
use tracing::debug;
use vkr_driver::HandleMap;
use vkr_protocol::commands::{
    AllocateDescriptorSetsArgs, FreePoolObjectsArgs, ResetPoolArgs, UpdateDescriptorSetsArgs,
};
use vkr_protocol::{ObjectId, ObjectType, Reply};

use super::{failure, result_reply, success, Dispatcher};
use crate::error::Fatal;
use crate::object::{Object, ObjectKind};

impl Dispatcher<'_> {
    fn descriptor_pool_handle(&self, pool: ObjectId, device: ObjectId) -> Result<vk::DescriptorPool, Fatal> {
        let handle = self
            .state
            .objects
            .owned_handle(pool, ObjectType::DescriptorPool, device)?;
        Ok(handle.descriptor_pool().unwrap_or_default())
    }

    /// Resetting frees every set allocated from the pool.
    pub(super) fn reset_descriptor_pool(&mut self, args: ResetPoolArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let pool = self.descriptor_pool_handle(args.pool, args.device)?;
        if let Err(err) = self.driver.reset_descriptor_pool(device, pool, args.flags) {
            return Ok(failure(err));
        }

        let sets = std::mem::take(&mut self.state.objects.descriptor_pool_mut(args.pool)?.children);
        for id in sets {
            let _ = self.state.objects.remove(id);
        }
        Ok(success())
    }

    pub(super) fn allocate_descriptor_sets(&mut self, args: AllocateDescriptorSetsArgs) -> Result<Reply, Fatal> {
        if args.set_layouts.len() != args.descriptor_sets.len() {
            return Err(Fatal::InvalidArgument("descriptor set count mismatch"));
        }
        self.state.objects.validate_new_ids(&args.descriptor_sets)?;
        let device = self.device_handle(args.device)?;
        let pool = self.descriptor_pool_handle(args.descriptor_pool, args.device)?;

        let mut handles = HandleMap::new();
        self.state.objects.resolve_all(
            &mut handles,
            &args.set_layouts,
            ObjectType::DescriptorSetLayout,
            args.device,
        )?;
        let layouts: Vec<vk::DescriptorSetLayout> = args
            .set_layouts
            .iter()
            .map(|id| handles.descriptor_set_layout(*id))
            .collect();

        let sets = match self.driver.allocate_descriptor_sets(device, pool, &layouts) {
            Ok(sets) => sets,
            Err(err) => return Ok(failure(err)),
        };
        for (id, handle) in args.descriptor_sets.iter().zip(sets) {
            self.state.objects.insert(Object::owned_by(
                *id,
                args.device,
                ObjectKind::DescriptorSet {
                    handle,
                    pool: args.descriptor_pool,
                },
            ))?;
            self.state
                .objects
                .descriptor_pool_mut(args.descriptor_pool)?
                .children
                .insert(*id);
        }
        debug!(
            ctx_id = self.ctx_id,
            pool = args.descriptor_pool,
            count = args.descriptor_sets.len(),
            "descriptor sets allocated"
        );
        Ok(success())
    }

    pub(super) fn free_descriptor_sets(&mut self, args: FreePoolObjectsArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let pool = self.descriptor_pool_handle(args.pool, args.device)?;
        let ids: Vec<ObjectId> = args.objects.iter().copied().filter(|id| *id != 0).collect();

        let mut sets = Vec::with_capacity(ids.len());
        for id in &ids {
            let object = self.state.objects.lookup(*id, ObjectType::DescriptorSet)?;
            match object.kind {
                ObjectKind::DescriptorSet { handle, pool: owner } if owner == args.pool => sets.push(handle),
                _ => {
                    return Err(Fatal::WrongOwner {
                        id: *id,
                        owner: args.pool,
                    })
                }
            }
        }

        let result = self.driver.free_descriptor_sets(device, pool, &sets);
        let children = &mut self.state.objects.descriptor_pool_mut(args.pool)?.children;
        for id in &ids {
            children.remove(id);
        }
        for id in ids {
            self.state.objects.remove(id)?;
        }
        Ok(result_reply(result))
    }

    pub(super) fn update_descriptor_sets(&mut self, args: UpdateDescriptorSetsArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let objects = &self.state.objects;
        let mut handles = HandleMap::new();
        for write in &args.writes {
            objects.resolve(&mut handles, write.dst_set, ObjectType::DescriptorSet, args.device)?;
            for info in &write.image_infos {
                objects.resolve_optional(&mut handles, info.sampler, ObjectType::Sampler, args.device)?;
                objects.resolve_optional(&mut handles, info.image_view, ObjectType::ImageView, args.device)?;
            }
            for info in &write.buffer_infos {
                objects.resolve_optional(&mut handles, info.buffer, ObjectType::Buffer, args.device)?;
            }
            objects.resolve_all(&mut handles, &write.texel_buffer_views, ObjectType::BufferView, args.device)?;
        }
        for copy in &args.copies {
            objects.resolve(&mut handles, copy.src_set, ObjectType::DescriptorSet, args.device)?;
            objects.resolve(&mut handles, copy.dst_set, ObjectType::DescriptorSet, args.device)?;
        }

        self.driver.update_descriptor_sets(device, &args, &handles);
        Ok(Reply::None)
    }
}
