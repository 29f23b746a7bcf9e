//! Physical devices as advertised to guests.

use ash::prelude::VkResult;
use ash::vk;
use tracing::debug;
use vkr_core::RendererConfig;
use vkr_driver::Driver;
use vkr_protocol::types::{
    ExtensionProperties, MemoryProperties, PhysicalDeviceProperties, QueueFamilyProperties,
};
use vkr_protocol::ObjectId;

/// Device extensions a guest may see, with the highest spec version this
/// renderer understands.
pub const RECOGNIZED_DEVICE_EXTENSIONS: &[(&str, u32)] = &[
    ("VK_KHR_8bit_storage", 1),
    ("VK_KHR_16bit_storage", 1),
    ("VK_KHR_bind_memory2", 1),
    ("VK_KHR_buffer_device_address", 1),
    ("VK_KHR_dedicated_allocation", 3),
    ("VK_KHR_descriptor_update_template", 1),
    ("VK_KHR_driver_properties", 1),
    ("VK_KHR_external_fence", 1),
    ("VK_KHR_external_fence_fd", 1),
    ("VK_KHR_external_memory", 1),
    ("VK_KHR_external_memory_fd", 1),
    ("VK_KHR_external_semaphore", 1),
    ("VK_KHR_external_semaphore_fd", 1),
    ("VK_KHR_get_memory_requirements2", 1),
    ("VK_KHR_maintenance1", 2),
    ("VK_KHR_maintenance2", 1),
    ("VK_KHR_maintenance3", 1),
    ("VK_KHR_sampler_ycbcr_conversion", 14),
    ("VK_KHR_shader_float16_int8", 1),
    ("VK_KHR_storage_buffer_storage_class", 1),
    ("VK_KHR_synchronization2", 1),
    ("VK_KHR_timeline_semaphore", 2),
    ("VK_KHR_variable_pointers", 1),
    ("VK_EXT_external_memory_dma_buf", 1),
    ("VK_EXT_image_drm_format_modifier", 2),
    ("VK_EXT_queue_family_foreign", 1),
];

const EXTERNAL_MEMORY: &str = "VK_KHR_external_memory";
const EXTERNAL_MEMORY_FD: &str = "VK_KHR_external_memory_fd";
const EXTERNAL_MEMORY_DMA_BUF: &str = "VK_EXT_external_memory_dma_buf";

fn recognized_spec_version(name: &str) -> Option<u32> {
    RECOGNIZED_DEVICE_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, version)| *version)
}

/// Keep recognized, non-denied extensions, clamping their spec versions.
pub fn filter_extensions(advertised: &[ExtensionProperties], deny: &[String]) -> Vec<ExtensionProperties> {
    advertised
        .iter()
        .filter(|ext| !deny.iter().any(|denied| *denied == ext.extension_name))
        .filter_map(|ext| {
            let max = recognized_spec_version(&ext.extension_name)?;
            Some(ExtensionProperties::new(
                &ext.extension_name,
                ext.spec_version.min(max),
            ))
        })
        .collect()
}

/// Cap `version` at `ceiling`, ignoring patch levels.
pub fn clamp_api_version(version: u32, ceiling: u32) -> u32 {
    let strip_patch = |v: u32| v & !0xFFF;
    if strip_patch(version) > strip_patch(ceiling) {
        strip_patch(ceiling)
    } else {
        version
    }
}

pub struct PhysicalDevice {
    pub handle: vk::PhysicalDevice,
    pub instance: ObjectId,
    /// Driver properties with the API version clamped.
    pub properties: PhysicalDeviceProperties,
    pub queue_families: Vec<QueueFamilyProperties>,
    pub memory_properties: MemoryProperties,
    /// What guests are told the device supports.
    pub extensions: Vec<ExtensionProperties>,
    /// Handle types device memory can be exported as.
    pub external_memory_types: vk::ExternalMemoryHandleTypeFlags,
    /// Host extensions enabled on every device to make export work.
    pub external_memory_extensions: Vec<String>,
    /// Devices created against this physical device.
    pub devices: Vec<ObjectId>,
}

impl PhysicalDevice {
    pub fn query(
        driver: &dyn Driver,
        handle: vk::PhysicalDevice,
        instance: ObjectId,
        instance_api_version: u32,
        config: &RendererConfig,
    ) -> VkResult<Self> {
        let mut properties = driver.physical_device_properties(handle)?;
        let queue_families = driver.queue_family_properties(handle)?;
        let memory_properties = driver.memory_properties(handle)?;
        let host_extensions = driver.enumerate_device_extensions(handle)?;

        let mut ceiling = config
            .max_api_version()
            .unwrap_or(vk::API_VERSION_1_3);
        let instance_api_version = if instance_api_version == 0 {
            vk::API_VERSION_1_0
        } else {
            instance_api_version
        };
        ceiling = clamp_api_version(ceiling, instance_api_version);
        properties.api_version = clamp_api_version(properties.api_version, ceiling);

        let has = |name: &str| host_extensions.iter().any(|e| e.extension_name == name);
        let mut external_memory_types = vk::ExternalMemoryHandleTypeFlags::empty();
        let mut external_memory_extensions = Vec::new();
        if has(EXTERNAL_MEMORY) && has(EXTERNAL_MEMORY_FD) {
            external_memory_types |= vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD;
            external_memory_extensions.push(EXTERNAL_MEMORY.to_string());
            external_memory_extensions.push(EXTERNAL_MEMORY_FD.to_string());
            if has(EXTERNAL_MEMORY_DMA_BUF) {
                external_memory_types |= vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT;
                external_memory_extensions.push(EXTERNAL_MEMORY_DMA_BUF.to_string());
            }
        }

        let extensions = filter_extensions(&host_extensions, &config.extensions.deny);
        debug!(
            device = %properties.device_name,
            api_version = properties.api_version,
            extensions = extensions.len(),
            "physical device queried"
        );

        Ok(Self {
            handle,
            instance,
            properties,
            queue_families,
            memory_properties,
            extensions,
            external_memory_types,
            external_memory_extensions,
            devices: Vec::new(),
        })
    }

    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext.extension_name == name)
    }

    pub fn memory_type_flags(&self, index: u32) -> Option<vk::MemoryPropertyFlags> {
        self.memory_properties
            .memory_type(index)
            .map(|ty| vk::MemoryPropertyFlags::from_raw(ty.property_flags))
    }
}
