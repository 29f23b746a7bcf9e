use tracing::debug;
use vkr_driver::{HandleMap, HostHandle};
use vkr_protocol::commands::{CreateComputePipelinesArgs, CreateInfo, CreateObjectArgs, DestroyObjectArgs};
use vkr_protocol::{ObjectId, ObjectType, Reply};

use super::{failure, success, Dispatcher};
use crate::device::{release_object, track_child};
use crate::error::Fatal;
use crate::object::{Object, ObjectKind, Pool};
use crate::object_table::ObjectTable;

/// Resolve every object a create info refers to.
fn resolve_create_info(
    objects: &ObjectTable,
    handles: &mut HandleMap,
    info: &CreateInfo,
    device: ObjectId,
) -> Result<(), Fatal> {
    match info {
        CreateInfo::BufferView(ci) => objects.resolve(handles, ci.buffer, ObjectType::Buffer, device),
        CreateInfo::ImageView(ci) => {
            objects.resolve(handles, ci.image, ObjectType::Image, device)?;
            objects.resolve_optional(handles, ci.ycbcr_conversion, ObjectType::SamplerYcbcrConversion, device)
        }
        CreateInfo::Sampler(ci) => {
            objects.resolve_optional(handles, ci.ycbcr_conversion, ObjectType::SamplerYcbcrConversion, device)
        }
        CreateInfo::DescriptorSetLayout(ci) => ci
            .bindings
            .iter()
            .try_for_each(|b| objects.resolve_all(handles, &b.immutable_samplers, ObjectType::Sampler, device)),
        CreateInfo::DescriptorUpdateTemplate(ci) => {
            objects.resolve_optional(handles, ci.descriptor_set_layout, ObjectType::DescriptorSetLayout, device)?;
            objects.resolve_optional(handles, ci.pipeline_layout, ObjectType::PipelineLayout, device)
        }
        CreateInfo::PipelineLayout(ci) => {
            objects.resolve_all(handles, &ci.set_layouts, ObjectType::DescriptorSetLayout, device)
        }
        CreateInfo::Framebuffer(ci) => {
            objects.resolve(handles, ci.render_pass, ObjectType::RenderPass, device)?;
            objects.resolve_all(handles, &ci.attachments, ObjectType::ImageView, device)
        }
        CreateInfo::Buffer(_)
        | CreateInfo::Image(_)
        | CreateInfo::SamplerYcbcrConversion(_)
        | CreateInfo::ShaderModule(_)
        | CreateInfo::Fence(_)
        | CreateInfo::Semaphore(_)
        | CreateInfo::Event(_)
        | CreateInfo::QueryPool(_)
        | CreateInfo::CommandPool(_)
        | CreateInfo::DescriptorPool(_)
        | CreateInfo::PipelineCache(_)
        | CreateInfo::RenderPass(_) => Ok(()),
    }
}

fn kind_for(handle: HostHandle) -> ObjectKind {
    match handle {
        HostHandle::CommandPool(pool) => ObjectKind::CommandPool(Pool::new(pool)),
        HostHandle::DescriptorPool(pool) => ObjectKind::DescriptorPool(Pool::new(pool)),
        other => ObjectKind::Plain(other),
    }
}

impl Dispatcher<'_> {
    pub(super) fn create_object(&mut self, args: CreateObjectArgs) -> Result<Reply, Fatal> {
        self.state.objects.validate_new_id(args.object)?;
        let device = self.device_handle(args.device)?;
        let mut handles = HandleMap::new();
        resolve_create_info(&self.state.objects, &mut handles, &args.info, args.device)?;

        let handle = match self.driver.create_object(device, &args.info, &handles) {
            Ok(handle) => handle,
            Err(err) => return Ok(failure(err)),
        };
        self.state
            .objects
            .insert(Object::owned_by(args.object, args.device, kind_for(handle)))?;
        track_child(self.state, args.device, args.object);
        debug!(
            ctx_id = self.ctx_id,
            id = args.object,
            ty = ?args.info.object_type(),
            "object created"
        );
        Ok(success())
    }

    /// A missing object id is a no-op, as for the API call.
    pub(super) fn destroy_object(&mut self, args: DestroyObjectArgs) -> Result<Reply, Fatal> {
        let Some(id) = args.object else {
            return Ok(Reply::None);
        };
        let device = self.device_handle(args.device)?;
        self.state
            .objects
            .owned_handle(id, args.object_type(), args.device)?;

        self.state.objects.device_mut(args.device)?.children.remove(&id);
        release_object(self.driver, self.state, device, id);
        debug!(ctx_id = self.ctx_id, id, ty = ?args.object_type(), "object destroyed");
        Ok(Reply::None)
    }

    pub(super) fn create_compute_pipelines(&mut self, args: CreateComputePipelinesArgs) -> Result<Reply, Fatal> {
        if args.pipelines.len() != args.create_infos.len() {
            return Err(Fatal::InvalidArgument("pipeline id count mismatch"));
        }
        self.state.objects.validate_new_ids(&args.pipelines)?;
        let device = self.device_handle(args.device)?;

        let mut handles = HandleMap::new();
        let objects = &self.state.objects;
        objects.resolve_optional(&mut handles, args.pipeline_cache, ObjectType::PipelineCache, args.device)?;
        for info in &args.create_infos {
            objects.resolve(&mut handles, info.stage.module, ObjectType::ShaderModule, args.device)?;
            objects.resolve(&mut handles, info.layout, ObjectType::PipelineLayout, args.device)?;
        }
        let cache = args
            .pipeline_cache
            .map(|id| handles.pipeline_cache(id))
            .unwrap_or_default();

        let pipelines = match self
            .driver
            .create_compute_pipelines(device, cache, &args.create_infos, &handles)
        {
            Ok(pipelines) => pipelines,
            Err(err) => return Ok(failure(err)),
        };
        for (id, pipeline) in args.pipelines.iter().zip(pipelines) {
            self.state.objects.insert(Object::owned_by(
                *id,
                args.device,
                ObjectKind::Plain(HostHandle::Pipeline(pipeline)),
            ))?;
            track_child(self.state, args.device, *id);
        }
        debug!(ctx_id = self.ctx_id, count = args.pipelines.len(), "compute pipelines created");
        Ok(success())
    }
}
