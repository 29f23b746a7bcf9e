//! Host handles behind guest object ids.

use std::collections::HashMap;

use ash::vk::{self, Handle};
use vkr_protocol::{ObjectId, ObjectType};

macro_rules! host_handles {
    ($($variant:ident($vk:ty) => $getter:ident,)*) => {
        /// A host driver handle tagged with its object kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum HostHandle {
            $($variant($vk),)*
        }

        impl HostHandle {
            pub fn object_type(&self) -> ObjectType {
                match self {
                    $(Self::$variant(_) => ObjectType::$variant,)*
                }
            }

            pub fn as_raw(&self) -> u64 {
                match self {
                    $(Self::$variant(h) => h.as_raw(),)*
                }
            }

            /// Rebuild a handle from its kind and raw value.
            pub fn from_raw(ty: ObjectType, raw: u64) -> Self {
                match ty {
                    $(ObjectType::$variant => Self::$variant(<$vk>::from_raw(raw)),)*
                }
            }

            $(
                pub fn $getter(&self) -> Option<$vk> {
                    match self {
                        Self::$variant(h) => Some(*h),
                        _ => None,
                    }
                }
            )*
        }

        impl HandleMap {
            $(
                /// Resolved handle, or null if the id was not resolved.
                pub fn $getter(&self, id: ObjectId) -> $vk {
                    self.get(id).and_then(|h| h.$getter()).unwrap_or_else(<$vk>::null)
                }
            )*
        }
    };
}

host_handles! {
    Instance(vk::Instance) => instance,
    PhysicalDevice(vk::PhysicalDevice) => physical_device,
    Device(vk::Device) => device,
    Queue(vk::Queue) => queue,
    DeviceMemory(vk::DeviceMemory) => device_memory,
    Buffer(vk::Buffer) => buffer,
    BufferView(vk::BufferView) => buffer_view,
    Image(vk::Image) => image,
    ImageView(vk::ImageView) => image_view,
    Sampler(vk::Sampler) => sampler,
    SamplerYcbcrConversion(vk::SamplerYcbcrConversion) => sampler_ycbcr_conversion,
    ShaderModule(vk::ShaderModule) => shader_module,
    Fence(vk::Fence) => fence,
    Semaphore(vk::Semaphore) => semaphore,
    Event(vk::Event) => event,
    QueryPool(vk::QueryPool) => query_pool,
    CommandPool(vk::CommandPool) => command_pool,
    CommandBuffer(vk::CommandBuffer) => command_buffer,
    DescriptorPool(vk::DescriptorPool) => descriptor_pool,
    DescriptorSet(vk::DescriptorSet) => descriptor_set,
    DescriptorSetLayout(vk::DescriptorSetLayout) => descriptor_set_layout,
    DescriptorUpdateTemplate(vk::DescriptorUpdateTemplate) => descriptor_update_template,
    PipelineLayout(vk::PipelineLayout) => pipeline_layout,
    PipelineCache(vk::PipelineCache) => pipeline_cache,
    Pipeline(vk::Pipeline) => pipeline,
    RenderPass(vk::RenderPass) => render_pass,
    Framebuffer(vk::Framebuffer) => framebuffer,
}

/// Guest ids referenced by one call, already resolved and type-checked by
/// the caller.
#[derive(Debug, Default, Clone)]
pub struct HandleMap {
    handles: HashMap<ObjectId, HostHandle>,
}

impl HandleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ObjectId, handle: HostHandle) {
        self.handles.insert(id, handle);
    }

    pub fn get(&self, id: ObjectId) -> Option<HostHandle> {
        self.handles.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip_keeps_kind() {
        let handle = HostHandle::from_raw(ObjectType::Buffer, 0x42);
        assert_eq!(handle.object_type(), ObjectType::Buffer);
        assert_eq!(handle.as_raw(), 0x42);
        assert_eq!(handle.buffer(), Some(vk::Buffer::from_raw(0x42)));
        assert_eq!(handle.image(), None);
    }

    #[test]
    fn unresolved_ids_map_to_null() {
        let mut map = HandleMap::new();
        map.insert(7, HostHandle::Sampler(vk::Sampler::from_raw(9)));
        assert_eq!(map.sampler(7), vk::Sampler::from_raw(9));
        assert_eq!(map.sampler(8), vk::Sampler::null());
        assert_eq!(map.image_view(7), vk::ImageView::null());
    }
}
