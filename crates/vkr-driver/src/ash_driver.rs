//! [`Driver`] backed by the system Vulkan loader through `ash`.

use std::ffi::{c_char, CString};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use vkr_protocol::commands::{
    ComputePipelineCreateInfo, CreateInfo, CreateInstanceArgs, DeviceQueueCreateInfo,
    ImageSubresourceRange, SubmitInfo, UpdateDescriptorSetsArgs,
};
use vkr_protocol::types::{
    ExtensionProperties, MemoryHeap, MemoryProperties, MemoryRequirements, MemoryType,
    PhysicalDeviceProperties, QueueFamilyProperties,
};
use vkr_protocol::RecordedCommand;

use crate::driver::{Driver, FenceWaiter, MemoryAllocation};
use crate::error::DriverError;
use crate::external::ExternalHandleType;
use crate::handle::{HandleMap, HostHandle};

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

struct DeviceFns {
    device: ash::Device,
    external_memory_fd: ash::khr::external_memory_fd::Device,
}

/// Host driver calls through `ash`.
pub struct AshDriver {
    /// The ash Entry (loaded once)
    entry: ash::Entry,

    // ── Dispatch tables ─────────────────────────────────────
    instances: DashMap<vk::Instance, Arc<ash::Instance>>,
    /// physical device -> owning instance
    physical_devices: DashMap<vk::PhysicalDevice, vk::Instance>,
    devices: DashMap<vk::Device, Arc<DeviceFns>>,
}

impl AshDriver {
    /// Load the system Vulkan loader.
    pub fn load() -> Result<Self, DriverError> {
        // SAFETY: loading the loader runs its initializers; we trust the
        // system's libvulkan.
        let entry = unsafe { ash::Entry::load()? };
        info!("Vulkan entry loaded successfully");
        Ok(Self::with_entry(entry))
    }

    /// Load a specific Vulkan library, e.g. a software ICD loader.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        // SAFETY: as in `load`; the caller picked the library.
        let entry = unsafe { ash::Entry::load_from(path)? };
        info!(path = %path.display(), "Vulkan entry loaded successfully");
        Ok(Self::with_entry(entry))
    }

    pub fn with_entry(entry: ash::Entry) -> Self {
        Self {
            entry,
            instances: DashMap::new(),
            physical_devices: DashMap::new(),
            devices: DashMap::new(),
        }
    }

    fn instance(&self, instance: vk::Instance) -> VkResult<Arc<ash::Instance>> {
        self.instances
            .get(&instance)
            .map(|i| Arc::clone(i.value()))
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn instance_for(&self, physical_device: vk::PhysicalDevice) -> VkResult<Arc<ash::Instance>> {
        let instance = self
            .physical_devices
            .get(&physical_device)
            .map(|e| *e.value())
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        self.instance(instance)
    }

    fn device(&self, device: vk::Device) -> VkResult<Arc<DeviceFns>> {
        self.devices
            .get(&device)
            .map(|d| Arc::clone(d.value()))
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }

    /// Device lookup for calls without a result; failures are logged.
    fn device_or_warn(&self, device: vk::Device, call: &str) -> Option<Arc<DeviceFns>> {
        match self.device(device) {
            Ok(dev) => Some(dev),
            Err(_) => {
                warn!(call, ?device, "unknown device, call dropped");
                None
            }
        }
    }
}

fn subresource_range(range: &ImageSubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::from_raw(range.aspect_mask),
        base_mip_level: range.base_mip_level,
        level_count: range.level_count,
        base_array_layer: range.base_array_layer,
        layer_count: range.layer_count,
    }
}

fn component_mapping(c: &[i32; 4]) -> vk::ComponentMapping {
    vk::ComponentMapping {
        r: vk::ComponentSwizzle::from_raw(c[0]),
        g: vk::ComponentSwizzle::from_raw(c[1]),
        b: vk::ComponentSwizzle::from_raw(c[2]),
        a: vk::ComponentSwizzle::from_raw(c[3]),
    }
}

fn to_cstrings(names: &[String]) -> Vec<CString> {
    names
        .iter()
        .filter_map(|name| CString::new(name.as_str()).ok())
        .collect()
}

impl Driver for AshDriver {
    // ── Instance ────────────────────────────────────────────

    fn create_instance(&self, args: &CreateInstanceArgs, validation: bool) -> VkResult<vk::Instance> {
        let app_name = CString::new(args.application_name.as_str()).unwrap_or_default();
        let engine_name = CString::new(args.engine_name.as_str()).unwrap_or_default();
        let extensions = to_cstrings(&args.enabled_extensions);
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .engine_name(engine_name.as_c_str())
            .api_version(if args.api_version == 0 {
                vk::make_api_version(0, 1, 3, 0)
            } else {
                args.api_version
            });
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { self.entry.create_instance(&create_info, None)? };
        let raw = instance.handle();
        self.instances.insert(raw, Arc::new(instance));
        info!(?raw, validation, "created Vulkan instance");
        Ok(raw)
    }

    fn destroy_instance(&self, instance: vk::Instance) {
        if let Some((_, wrapper)) = self.instances.remove(&instance) {
            self.physical_devices.retain(|_, owner| *owner != instance);
            unsafe { wrapper.destroy_instance(None) };
            debug!(?instance, "destroyed Vulkan instance");
        }
    }

    fn enumerate_physical_devices(&self, instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>> {
        let wrapper = self.instance(instance)?;
        let physical_devices = unsafe { wrapper.enumerate_physical_devices()? };
        for pd in &physical_devices {
            self.physical_devices.insert(*pd, instance);
        }
        debug!("enumerated {} physical devices", physical_devices.len());
        Ok(physical_devices)
    }

    // ── Physical Device Queries ─────────────────────────────

    fn physical_device_properties(&self, physical_device: vk::PhysicalDevice) -> VkResult<PhysicalDeviceProperties> {
        let wrapper = self.instance_for(physical_device)?;
        let props = unsafe { wrapper.get_physical_device_properties(physical_device) };
        let device_name = props
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(PhysicalDeviceProperties {
            api_version: props.api_version,
            driver_version: props.driver_version,
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            device_type: props.device_type.as_raw(),
            device_name,
            pipeline_cache_uuid: props.pipeline_cache_uuid,
        })
    }

    fn queue_family_properties(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<QueueFamilyProperties>> {
        let wrapper = self.instance_for(physical_device)?;
        let families = unsafe { wrapper.get_physical_device_queue_family_properties(physical_device) };
        Ok(families
            .iter()
            .map(|f| QueueFamilyProperties {
                queue_flags: f.queue_flags.as_raw(),
                queue_count: f.queue_count,
                timestamp_valid_bits: f.timestamp_valid_bits,
                min_image_transfer_granularity: [
                    f.min_image_transfer_granularity.width,
                    f.min_image_transfer_granularity.height,
                    f.min_image_transfer_granularity.depth,
                ],
            })
            .collect())
    }

    fn memory_properties(&self, physical_device: vk::PhysicalDevice) -> VkResult<MemoryProperties> {
        let wrapper = self.instance_for(physical_device)?;
        let mem_props = unsafe { wrapper.get_physical_device_memory_properties(physical_device) };

        let memory_types = (0..mem_props.memory_type_count as usize)
            .map(|i| MemoryType {
                property_flags: mem_props.memory_types[i].property_flags.as_raw(),
                heap_index: mem_props.memory_types[i].heap_index,
            })
            .collect();
        let memory_heaps = (0..mem_props.memory_heap_count as usize)
            .map(|i| MemoryHeap {
                size: mem_props.memory_heaps[i].size,
                flags: mem_props.memory_heaps[i].flags.as_raw(),
            })
            .collect();

        Ok(MemoryProperties {
            memory_types,
            memory_heaps,
        })
    }

    fn enumerate_device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<ExtensionProperties>> {
        let wrapper = self.instance_for(physical_device)?;
        let extensions = unsafe { wrapper.enumerate_device_extension_properties(physical_device)? };
        Ok(extensions
            .iter()
            .filter_map(|ext| {
                let name = ext.extension_name_as_c_str().ok()?.to_str().ok()?;
                Some(ExtensionProperties::new(name, ext.spec_version))
            })
            .collect())
    }

    // ── Logical Device ──────────────────────────────────────

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_create_infos: &[DeviceQueueCreateInfo],
        extensions: &[String],
    ) -> VkResult<vk::Device> {
        let wrapper = self.instance_for(physical_device)?;

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_create_infos
            .iter()
            .map(|q| {
                vk::DeviceQueueCreateInfo::default()
                    .flags(vk::DeviceQueueCreateFlags::from_raw(q.flags))
                    .queue_family_index(q.queue_family_index)
                    .queue_priorities(&q.queue_priorities)
            })
            .collect();
        let extensions = to_cstrings(extensions);
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);

        let device = unsafe { wrapper.create_device(physical_device, &create_info, None)? };
        let raw = device.handle();
        let external_memory_fd = ash::khr::external_memory_fd::Device::new(&wrapper, &device);
        self.devices.insert(
            raw,
            Arc::new(DeviceFns {
                device,
                external_memory_fd,
            }),
        );
        info!(?raw, "created Vulkan device");
        Ok(raw)
    }

    fn destroy_device(&self, device: vk::Device) {
        if let Some((_, fns)) = self.devices.remove(&device) {
            unsafe { fns.device.destroy_device(None) };
            debug!(?device, "destroyed Vulkan device");
        }
    }

    fn get_device_queue(&self, device: vk::Device, family: u32, index: u32, flags: u32) -> VkResult<vk::Queue> {
        let dev = self.device(device)?;
        let queue = if flags == 0 {
            unsafe { dev.device.get_device_queue(family, index) }
        } else {
            let info = vk::DeviceQueueInfo2::default()
                .flags(vk::DeviceQueueCreateFlags::from_raw(flags))
                .queue_family_index(family)
                .queue_index(index);
            unsafe { dev.device.get_device_queue2(&info) }
        };
        Ok(queue)
    }

    // ── Queue ───────────────────────────────────────────────

    fn queue_submit(
        &self,
        device: vk::Device,
        queue: vk::Queue,
        submits: &[SubmitInfo],
        handles: &HandleMap,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let dev = self.device(device)?;

        struct Batch {
            wait_semaphores: Vec<vk::Semaphore>,
            wait_stages: Vec<vk::PipelineStageFlags>,
            command_buffers: Vec<vk::CommandBuffer>,
            signal_semaphores: Vec<vk::Semaphore>,
        }
        let batches: Vec<Batch> = submits
            .iter()
            .map(|s| Batch {
                wait_semaphores: s.wait_semaphores.iter().map(|id| handles.semaphore(*id)).collect(),
                wait_stages: s
                    .wait_dst_stage_masks
                    .iter()
                    .map(|m| vk::PipelineStageFlags::from_raw(*m))
                    .collect(),
                command_buffers: s.command_buffers.iter().map(|id| handles.command_buffer(*id)).collect(),
                signal_semaphores: s.signal_semaphores.iter().map(|id| handles.semaphore(*id)).collect(),
            })
            .collect();
        let submit_infos: Vec<vk::SubmitInfo> = batches
            .iter()
            .map(|b| {
                vk::SubmitInfo::default()
                    .wait_semaphores(&b.wait_semaphores)
                    .wait_dst_stage_mask(&b.wait_stages)
                    .command_buffers(&b.command_buffers)
                    .signal_semaphores(&b.signal_semaphores)
            })
            .collect();

        unsafe { dev.device.queue_submit(queue, &submit_infos, fence) }
    }

    // ── Memory ──────────────────────────────────────────────

    fn allocate_memory(&self, device: vk::Device, allocation: MemoryAllocation) -> VkResult<vk::DeviceMemory> {
        let dev = self.device(device)?;
        let MemoryAllocation {
            size,
            memory_type_index,
            export_handle_types,
            import,
        } = allocation;

        let mut export_info = vk::ExportMemoryAllocateInfo::default().handle_types(export_handle_types);
        let mut import_info = import.as_ref().map(|(ty, fd)| {
            vk::ImportMemoryFdInfoKHR::default()
                .handle_type(ty.to_vk())
                .fd(fd.as_raw_fd())
        });

        let mut info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        if !export_handle_types.is_empty() {
            info = info.push_next(&mut export_info);
        }
        if let Some(import_info) = import_info.as_mut() {
            info = info.push_next(import_info);
        }

        let memory = unsafe { dev.device.allocate_memory(&info, None)? };
        if let Some((_, fd)) = import {
            // A successful import transfers fd ownership to the driver.
            let _ = fd.into_raw_fd();
        }
        Ok(memory)
    }

    fn free_memory(&self, device: vk::Device, memory: vk::DeviceMemory) {
        if let Some(dev) = self.device_or_warn(device, "vkFreeMemory") {
            unsafe { dev.device.free_memory(memory, None) };
        }
    }

    fn get_memory_fd(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        handle_type: ExternalHandleType,
    ) -> VkResult<OwnedFd> {
        let dev = self.device(device)?;
        let info = vk::MemoryGetFdInfoKHR::default()
            .memory(memory)
            .handle_type(handle_type.to_vk());
        let fd = unsafe { dev.external_memory_fd.get_memory_fd(&info)? };
        // SAFETY: the driver hands us a fresh fd we now own.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    fn read_memory(&self, device: vk::Device, memory: vk::DeviceMemory, offset: u64, dst: &mut [u8]) -> VkResult<()> {
        let dev = self.device(device)?;
        let range = vk::MappedMemoryRange::default()
            .memory(memory)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe {
            let ptr = dev
                .device
                .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
                as *const u8;
            let result = dev.device.invalidate_mapped_memory_ranges(&[range]);
            if result.is_ok() {
                std::ptr::copy_nonoverlapping(ptr.add(offset as usize), dst.as_mut_ptr(), dst.len());
            }
            dev.device.unmap_memory(memory);
            result
        }
    }

    fn write_memory(&self, device: vk::Device, memory: vk::DeviceMemory, offset: u64, src: &[u8]) -> VkResult<()> {
        let dev = self.device(device)?;
        let range = vk::MappedMemoryRange::default()
            .memory(memory)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe {
            let ptr = dev
                .device
                .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
                as *mut u8;
            std::ptr::copy_nonoverlapping(src.as_ptr(), ptr.add(offset as usize), src.len());
            let result = dev.device.flush_mapped_memory_ranges(&[range]);
            dev.device.unmap_memory(memory);
            result
        }
    }

    fn bind_buffer_memory(&self, device: vk::Device, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: u64) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.bind_buffer_memory(buffer, memory, offset) }
    }

    fn bind_image_memory(&self, device: vk::Device, image: vk::Image, memory: vk::DeviceMemory, offset: u64) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.bind_image_memory(image, memory, offset) }
    }

    fn buffer_memory_requirements(&self, device: vk::Device, buffer: vk::Buffer) -> VkResult<MemoryRequirements> {
        let dev = self.device(device)?;
        let reqs = unsafe { dev.device.get_buffer_memory_requirements(buffer) };
        Ok(MemoryRequirements {
            size: reqs.size,
            alignment: reqs.alignment,
            memory_type_bits: reqs.memory_type_bits,
        })
    }

    fn image_memory_requirements(&self, device: vk::Device, image: vk::Image) -> VkResult<MemoryRequirements> {
        let dev = self.device(device)?;
        let reqs = unsafe { dev.device.get_image_memory_requirements(image) };
        Ok(MemoryRequirements {
            size: reqs.size,
            alignment: reqs.alignment,
            memory_type_bits: reqs.memory_type_bits,
        })
    }

    // ── Generic objects ─────────────────────────────────────

    fn create_object(&self, device: vk::Device, info: &CreateInfo, handles: &HandleMap) -> VkResult<HostHandle> {
        let dev = self.device(device)?;
        let d = &dev.device;

        let handle = match info {
            CreateInfo::Buffer(ci) => {
                let create_info = vk::BufferCreateInfo::default()
                    .flags(vk::BufferCreateFlags::from_raw(ci.flags))
                    .size(ci.size)
                    .usage(vk::BufferUsageFlags::from_raw(ci.usage))
                    .sharing_mode(vk::SharingMode::from_raw(ci.sharing_mode))
                    .queue_family_indices(&ci.queue_family_indices);
                HostHandle::Buffer(unsafe { d.create_buffer(&create_info, None)? })
            }

            CreateInfo::BufferView(ci) => {
                let create_info = vk::BufferViewCreateInfo::default()
                    .buffer(handles.buffer(ci.buffer))
                    .format(vk::Format::from_raw(ci.format))
                    .offset(ci.offset)
                    .range(ci.range);
                HostHandle::BufferView(unsafe { d.create_buffer_view(&create_info, None)? })
            }

            CreateInfo::Image(ci) => {
                let create_info = vk::ImageCreateInfo::default()
                    .flags(vk::ImageCreateFlags::from_raw(ci.flags))
                    .image_type(vk::ImageType::from_raw(ci.image_type))
                    .format(vk::Format::from_raw(ci.format))
                    .extent(vk::Extent3D {
                        width: ci.extent[0],
                        height: ci.extent[1],
                        depth: ci.extent[2],
                    })
                    .mip_levels(ci.mip_levels)
                    .array_layers(ci.array_layers)
                    .samples(vk::SampleCountFlags::from_raw(ci.samples))
                    .tiling(vk::ImageTiling::from_raw(ci.tiling))
                    .usage(vk::ImageUsageFlags::from_raw(ci.usage))
                    .sharing_mode(vk::SharingMode::from_raw(ci.sharing_mode))
                    .queue_family_indices(&ci.queue_family_indices)
                    .initial_layout(vk::ImageLayout::from_raw(ci.initial_layout));
                HostHandle::Image(unsafe { d.create_image(&create_info, None)? })
            }

            CreateInfo::ImageView(ci) => {
                let mut ycbcr = ci
                    .ycbcr_conversion
                    .map(|id| vk::SamplerYcbcrConversionInfo::default().conversion(handles.sampler_ycbcr_conversion(id)));
                let mut create_info = vk::ImageViewCreateInfo::default()
                    .flags(vk::ImageViewCreateFlags::from_raw(ci.flags))
                    .image(handles.image(ci.image))
                    .view_type(vk::ImageViewType::from_raw(ci.view_type))
                    .format(vk::Format::from_raw(ci.format))
                    .components(component_mapping(&ci.components))
                    .subresource_range(subresource_range(&ci.subresource_range));
                if let Some(ycbcr) = ycbcr.as_mut() {
                    create_info = create_info.push_next(ycbcr);
                }
                HostHandle::ImageView(unsafe { d.create_image_view(&create_info, None)? })
            }

            CreateInfo::Sampler(ci) => {
                let mut ycbcr = ci
                    .ycbcr_conversion
                    .map(|id| vk::SamplerYcbcrConversionInfo::default().conversion(handles.sampler_ycbcr_conversion(id)));
                let mut create_info = vk::SamplerCreateInfo::default()
                    .mag_filter(vk::Filter::from_raw(ci.mag_filter))
                    .min_filter(vk::Filter::from_raw(ci.min_filter))
                    .mipmap_mode(vk::SamplerMipmapMode::from_raw(ci.mipmap_mode))
                    .address_mode_u(vk::SamplerAddressMode::from_raw(ci.address_modes[0]))
                    .address_mode_v(vk::SamplerAddressMode::from_raw(ci.address_modes[1]))
                    .address_mode_w(vk::SamplerAddressMode::from_raw(ci.address_modes[2]))
                    .mip_lod_bias(ci.mip_lod_bias)
                    .anisotropy_enable(ci.anisotropy_enable)
                    .max_anisotropy(ci.max_anisotropy)
                    .compare_enable(ci.compare_enable)
                    .compare_op(vk::CompareOp::from_raw(ci.compare_op))
                    .min_lod(ci.min_lod)
                    .max_lod(ci.max_lod)
                    .border_color(vk::BorderColor::from_raw(ci.border_color))
                    .unnormalized_coordinates(ci.unnormalized_coordinates);
                if let Some(ycbcr) = ycbcr.as_mut() {
                    create_info = create_info.push_next(ycbcr);
                }
                HostHandle::Sampler(unsafe { d.create_sampler(&create_info, None)? })
            }

            CreateInfo::SamplerYcbcrConversion(ci) => {
                let create_info = vk::SamplerYcbcrConversionCreateInfo::default()
                    .format(vk::Format::from_raw(ci.format))
                    .ycbcr_model(vk::SamplerYcbcrModelConversion::from_raw(ci.ycbcr_model))
                    .ycbcr_range(vk::SamplerYcbcrRange::from_raw(ci.ycbcr_range))
                    .components(component_mapping(&ci.components))
                    .x_chroma_offset(vk::ChromaLocation::from_raw(ci.x_chroma_offset))
                    .y_chroma_offset(vk::ChromaLocation::from_raw(ci.y_chroma_offset))
                    .chroma_filter(vk::Filter::from_raw(ci.chroma_filter))
                    .force_explicit_reconstruction(ci.force_explicit_reconstruction);
                HostHandle::SamplerYcbcrConversion(unsafe {
                    d.create_sampler_ycbcr_conversion(&create_info, None)?
                })
            }

            CreateInfo::ShaderModule(ci) => {
                let create_info = vk::ShaderModuleCreateInfo::default().code(&ci.code);
                HostHandle::ShaderModule(unsafe { d.create_shader_module(&create_info, None)? })
            }

            CreateInfo::Fence(ci) => {
                let create_info =
                    vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::from_raw(ci.flags));
                HostHandle::Fence(unsafe { d.create_fence(&create_info, None)? })
            }

            CreateInfo::Semaphore(ci) => {
                let create_info = vk::SemaphoreCreateInfo::default()
                    .flags(vk::SemaphoreCreateFlags::from_raw(ci.flags));
                HostHandle::Semaphore(unsafe { d.create_semaphore(&create_info, None)? })
            }

            CreateInfo::Event(ci) => {
                let create_info =
                    vk::EventCreateInfo::default().flags(vk::EventCreateFlags::from_raw(ci.flags));
                HostHandle::Event(unsafe { d.create_event(&create_info, None)? })
            }

            CreateInfo::QueryPool(ci) => {
                let create_info = vk::QueryPoolCreateInfo::default()
                    .query_type(vk::QueryType::from_raw(ci.query_type))
                    .query_count(ci.query_count)
                    .pipeline_statistics(vk::QueryPipelineStatisticFlags::from_raw(
                        ci.pipeline_statistics,
                    ));
                HostHandle::QueryPool(unsafe { d.create_query_pool(&create_info, None)? })
            }

            CreateInfo::CommandPool(ci) => {
                let create_info = vk::CommandPoolCreateInfo::default()
                    .flags(vk::CommandPoolCreateFlags::from_raw(ci.flags))
                    .queue_family_index(ci.queue_family_index);
                HostHandle::CommandPool(unsafe { d.create_command_pool(&create_info, None)? })
            }

            CreateInfo::DescriptorSetLayout(ci) => {
                let immutable_samplers: Vec<Vec<vk::Sampler>> = ci
                    .bindings
                    .iter()
                    .map(|b| b.immutable_samplers.iter().map(|id| handles.sampler(*id)).collect())
                    .collect();
                let bindings: Vec<vk::DescriptorSetLayoutBinding> = ci
                    .bindings
                    .iter()
                    .zip(&immutable_samplers)
                    .map(|(b, samplers)| {
                        let binding = vk::DescriptorSetLayoutBinding::default()
                            .binding(b.binding)
                            .descriptor_type(vk::DescriptorType::from_raw(b.descriptor_type))
                            .descriptor_count(b.descriptor_count)
                            .stage_flags(vk::ShaderStageFlags::from_raw(b.stage_flags));
                        if samplers.is_empty() {
                            binding
                        } else {
                            binding.immutable_samplers(samplers)
                        }
                    })
                    .collect();
                let create_info = vk::DescriptorSetLayoutCreateInfo::default()
                    .flags(vk::DescriptorSetLayoutCreateFlags::from_raw(ci.flags))
                    .bindings(&bindings);
                HostHandle::DescriptorSetLayout(unsafe {
                    d.create_descriptor_set_layout(&create_info, None)?
                })
            }

            CreateInfo::DescriptorPool(ci) => {
                let pool_sizes: Vec<vk::DescriptorPoolSize> = ci
                    .pool_sizes
                    .iter()
                    .map(|s| vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::from_raw(s.descriptor_type),
                        descriptor_count: s.descriptor_count,
                    })
                    .collect();
                let create_info = vk::DescriptorPoolCreateInfo::default()
                    .flags(vk::DescriptorPoolCreateFlags::from_raw(ci.flags))
                    .max_sets(ci.max_sets)
                    .pool_sizes(&pool_sizes);
                HostHandle::DescriptorPool(unsafe { d.create_descriptor_pool(&create_info, None)? })
            }

            CreateInfo::DescriptorUpdateTemplate(ci) => {
                let entries: Vec<vk::DescriptorUpdateTemplateEntry> = ci
                    .entries
                    .iter()
                    .map(|e| vk::DescriptorUpdateTemplateEntry {
                        dst_binding: e.dst_binding,
                        dst_array_element: e.dst_array_element,
                        descriptor_count: e.descriptor_count,
                        descriptor_type: vk::DescriptorType::from_raw(e.descriptor_type),
                        offset: e.offset as usize,
                        stride: e.stride as usize,
                    })
                    .collect();
                let mut create_info = vk::DescriptorUpdateTemplateCreateInfo::default()
                    .descriptor_update_entries(&entries)
                    .template_type(vk::DescriptorUpdateTemplateType::from_raw(ci.template_type))
                    .pipeline_bind_point(vk::PipelineBindPoint::from_raw(ci.pipeline_bind_point))
                    .set(ci.set);
                if let Some(layout) = ci.descriptor_set_layout {
                    create_info = create_info.descriptor_set_layout(handles.descriptor_set_layout(layout));
                }
                if let Some(layout) = ci.pipeline_layout {
                    create_info = create_info.pipeline_layout(handles.pipeline_layout(layout));
                }
                HostHandle::DescriptorUpdateTemplate(unsafe {
                    d.create_descriptor_update_template(&create_info, None)?
                })
            }

            CreateInfo::PipelineLayout(ci) => {
                let set_layouts: Vec<vk::DescriptorSetLayout> = ci
                    .set_layouts
                    .iter()
                    .map(|id| handles.descriptor_set_layout(*id))
                    .collect();
                let push_constant_ranges: Vec<vk::PushConstantRange> = ci
                    .push_constant_ranges
                    .iter()
                    .map(|r| vk::PushConstantRange {
                        stage_flags: vk::ShaderStageFlags::from_raw(r.stage_flags),
                        offset: r.offset,
                        size: r.size,
                    })
                    .collect();
                let create_info = vk::PipelineLayoutCreateInfo::default()
                    .set_layouts(&set_layouts)
                    .push_constant_ranges(&push_constant_ranges);
                HostHandle::PipelineLayout(unsafe { d.create_pipeline_layout(&create_info, None)? })
            }

            CreateInfo::PipelineCache(ci) => {
                let create_info = vk::PipelineCacheCreateInfo::default()
                    .flags(vk::PipelineCacheCreateFlags::from_raw(ci.flags))
                    .initial_data(&ci.initial_data);
                HostHandle::PipelineCache(unsafe { d.create_pipeline_cache(&create_info, None)? })
            }

            CreateInfo::RenderPass(ci) => {
                let attachments: Vec<vk::AttachmentDescription> = ci
                    .attachments
                    .iter()
                    .map(|a| {
                        vk::AttachmentDescription::default()
                            .flags(vk::AttachmentDescriptionFlags::from_raw(a.flags))
                            .format(vk::Format::from_raw(a.format))
                            .samples(vk::SampleCountFlags::from_raw(a.samples))
                            .load_op(vk::AttachmentLoadOp::from_raw(a.load_op))
                            .store_op(vk::AttachmentStoreOp::from_raw(a.store_op))
                            .stencil_load_op(vk::AttachmentLoadOp::from_raw(a.stencil_load_op))
                            .stencil_store_op(vk::AttachmentStoreOp::from_raw(a.stencil_store_op))
                            .initial_layout(vk::ImageLayout::from_raw(a.initial_layout))
                            .final_layout(vk::ImageLayout::from_raw(a.final_layout))
                    })
                    .collect();

                let to_refs = |refs: &[vkr_protocol::commands::AttachmentReference]| -> Vec<vk::AttachmentReference> {
                    refs.iter()
                        .map(|r| vk::AttachmentReference {
                            attachment: r.attachment,
                            layout: vk::ImageLayout::from_raw(r.layout),
                        })
                        .collect()
                };
                let input_refs: Vec<_> = ci.subpasses.iter().map(|s| to_refs(&s.input_attachments)).collect();
                let color_refs: Vec<_> = ci.subpasses.iter().map(|s| to_refs(&s.color_attachments)).collect();
                let depth_refs: Vec<_> = ci
                    .subpasses
                    .iter()
                    .map(|s| to_refs(&s.depth_stencil_attachment))
                    .collect();

                let subpasses: Vec<vk::SubpassDescription> = ci
                    .subpasses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let subpass = vk::SubpassDescription::default()
                            .pipeline_bind_point(vk::PipelineBindPoint::from_raw(s.pipeline_bind_point))
                            .input_attachments(&input_refs[i])
                            .color_attachments(&color_refs[i])
                            .preserve_attachments(&s.preserve_attachments);
                        match depth_refs[i].first() {
                            Some(depth) => subpass.depth_stencil_attachment(depth),
                            None => subpass,
                        }
                    })
                    .collect();

                let dependencies: Vec<vk::SubpassDependency> = ci
                    .dependencies
                    .iter()
                    .map(|dep| vk::SubpassDependency {
                        src_subpass: dep.src_subpass,
                        dst_subpass: dep.dst_subpass,
                        src_stage_mask: vk::PipelineStageFlags::from_raw(dep.src_stage_mask),
                        dst_stage_mask: vk::PipelineStageFlags::from_raw(dep.dst_stage_mask),
                        src_access_mask: vk::AccessFlags::from_raw(dep.src_access_mask),
                        dst_access_mask: vk::AccessFlags::from_raw(dep.dst_access_mask),
                        dependency_flags: vk::DependencyFlags::from_raw(dep.dependency_flags),
                    })
                    .collect();

                let create_info = vk::RenderPassCreateInfo::default()
                    .attachments(&attachments)
                    .subpasses(&subpasses)
                    .dependencies(&dependencies);
                HostHandle::RenderPass(unsafe { d.create_render_pass(&create_info, None)? })
            }

            CreateInfo::Framebuffer(ci) => {
                let attachments: Vec<vk::ImageView> =
                    ci.attachments.iter().map(|id| handles.image_view(*id)).collect();
                let create_info = vk::FramebufferCreateInfo::default()
                    .render_pass(handles.render_pass(ci.render_pass))
                    .attachments(&attachments)
                    .width(ci.width)
                    .height(ci.height)
                    .layers(ci.layers);
                HostHandle::Framebuffer(unsafe { d.create_framebuffer(&create_info, None)? })
            }
        };

        Ok(handle)
    }

    fn destroy_object(&self, device: vk::Device, handle: HostHandle) {
        let Some(dev) = self.device_or_warn(device, "destroy_object") else {
            return;
        };
        let d = &dev.device;
        unsafe {
            match handle {
                HostHandle::DeviceMemory(h) => d.free_memory(h, None),
                HostHandle::Buffer(h) => d.destroy_buffer(h, None),
                HostHandle::BufferView(h) => d.destroy_buffer_view(h, None),
                HostHandle::Image(h) => d.destroy_image(h, None),
                HostHandle::ImageView(h) => d.destroy_image_view(h, None),
                HostHandle::Sampler(h) => d.destroy_sampler(h, None),
                HostHandle::SamplerYcbcrConversion(h) => d.destroy_sampler_ycbcr_conversion(h, None),
                HostHandle::ShaderModule(h) => d.destroy_shader_module(h, None),
                HostHandle::Fence(h) => d.destroy_fence(h, None),
                HostHandle::Semaphore(h) => d.destroy_semaphore(h, None),
                HostHandle::Event(h) => d.destroy_event(h, None),
                HostHandle::QueryPool(h) => d.destroy_query_pool(h, None),
                HostHandle::CommandPool(h) => d.destroy_command_pool(h, None),
                HostHandle::DescriptorPool(h) => d.destroy_descriptor_pool(h, None),
                HostHandle::DescriptorSetLayout(h) => d.destroy_descriptor_set_layout(h, None),
                HostHandle::DescriptorUpdateTemplate(h) => d.destroy_descriptor_update_template(h, None),
                HostHandle::PipelineLayout(h) => d.destroy_pipeline_layout(h, None),
                HostHandle::PipelineCache(h) => d.destroy_pipeline_cache(h, None),
                HostHandle::Pipeline(h) => d.destroy_pipeline(h, None),
                HostHandle::RenderPass(h) => d.destroy_render_pass(h, None),
                HostHandle::Framebuffer(h) => d.destroy_framebuffer(h, None),
                HostHandle::Instance(_)
                | HostHandle::PhysicalDevice(_)
                | HostHandle::Device(_)
                | HostHandle::Queue(_)
                | HostHandle::CommandBuffer(_)
                | HostHandle::DescriptorSet(_) => {
                    debug!(kind = ?handle.object_type(), "not a device-destroyable handle");
                }
            }
        }
    }

    fn create_compute_pipelines(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
        create_infos: &[ComputePipelineCreateInfo],
        handles: &HandleMap,
    ) -> VkResult<Vec<vk::Pipeline>> {
        let dev = self.device(device)?;

        let entry_points: Vec<CString> = create_infos
            .iter()
            .map(|ci| CString::new(ci.stage.entry_point.as_str()).unwrap_or_default())
            .collect();

        let vk_create_infos: Vec<vk::ComputePipelineCreateInfo> = create_infos
            .iter()
            .zip(&entry_points)
            .map(|(ci, entry_point)| {
                let stage = vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::from_raw(ci.stage.stage))
                    .module(handles.shader_module(ci.stage.module))
                    .name(entry_point.as_c_str());

                vk::ComputePipelineCreateInfo::default()
                    .stage(stage)
                    .layout(handles.pipeline_layout(ci.layout))
                    .flags(vk::PipelineCreateFlags::from_raw(ci.flags))
            })
            .collect();

        match unsafe { dev.device.create_compute_pipelines(cache, &vk_create_infos, None) } {
            Ok(pipelines) => Ok(pipelines),
            Err((partial, err)) => {
                for pipeline in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    unsafe { dev.device.destroy_pipeline(pipeline, None) };
                }
                Err(err)
            }
        }
    }

    // ── Command pools and buffers ───────────────────────────

    fn allocate_command_buffers(
        &self,
        device: vk::Device,
        pool: vk::CommandPool,
        level: i32,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let dev = self.device(device)?;
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::from_raw(level))
            .command_buffer_count(count);
        unsafe { dev.device.allocate_command_buffers(&info) }
    }

    fn free_command_buffers(&self, device: vk::Device, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        if let Some(dev) = self.device_or_warn(device, "vkFreeCommandBuffers") {
            unsafe { dev.device.free_command_buffers(pool, command_buffers) };
        }
    }

    fn reset_command_pool(&self, device: vk::Device, pool: vk::CommandPool, flags: u32) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe {
            dev.device
                .reset_command_pool(pool, vk::CommandPoolResetFlags::from_raw(flags))
        }
    }

    fn begin_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer, flags: u32) -> VkResult<()> {
        let dev = self.device(device)?;
        let info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::from_raw(flags));
        unsafe { dev.device.begin_command_buffer(command_buffer, &info) }
    }

    fn end_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.end_command_buffer(command_buffer) }
    }

    fn reset_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer, flags: u32) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe {
            dev.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::from_raw(flags))
        }
    }

    fn record(&self, device: vk::Device, command_buffer: vk::CommandBuffer, op: &RecordedCommand, handles: &HandleMap) {
        let Some(dev) = self.device_or_warn(device, "record") else {
            return;
        };
        let d = &dev.device;
        let cb = command_buffer;

        match op {
            RecordedCommand::BindPipeline(args) => unsafe {
                d.cmd_bind_pipeline(
                    cb,
                    vk::PipelineBindPoint::from_raw(args.pipeline_bind_point),
                    handles.pipeline(args.pipeline),
                );
            },
            RecordedCommand::BindDescriptorSets(args) => {
                let sets: Vec<vk::DescriptorSet> = args
                    .descriptor_sets
                    .iter()
                    .map(|id| handles.descriptor_set(*id))
                    .collect();
                unsafe {
                    d.cmd_bind_descriptor_sets(
                        cb,
                        vk::PipelineBindPoint::from_raw(args.pipeline_bind_point),
                        handles.pipeline_layout(args.layout),
                        args.first_set,
                        &sets,
                        &args.dynamic_offsets,
                    );
                }
            }
            RecordedCommand::Dispatch(args) => unsafe {
                d.cmd_dispatch(cb, args.group_count[0], args.group_count[1], args.group_count[2]);
            },
            RecordedCommand::CopyBuffer(args) => {
                let regions: Vec<vk::BufferCopy> = args
                    .regions
                    .iter()
                    .map(|r| vk::BufferCopy {
                        src_offset: r.src_offset,
                        dst_offset: r.dst_offset,
                        size: r.size,
                    })
                    .collect();
                unsafe {
                    d.cmd_copy_buffer(
                        cb,
                        handles.buffer(args.src_buffer),
                        handles.buffer(args.dst_buffer),
                        &regions,
                    );
                }
            }
            RecordedCommand::FillBuffer(args) => unsafe {
                d.cmd_fill_buffer(cb, handles.buffer(args.buffer), args.offset, args.size, args.data);
            },
            RecordedCommand::PipelineBarrier(args) => {
                let memory_barriers: Vec<vk::MemoryBarrier> = args
                    .memory_barriers
                    .iter()
                    .map(|b| {
                        vk::MemoryBarrier::default()
                            .src_access_mask(vk::AccessFlags::from_raw(b.src_access_mask))
                            .dst_access_mask(vk::AccessFlags::from_raw(b.dst_access_mask))
                    })
                    .collect();
                let buffer_barriers: Vec<vk::BufferMemoryBarrier> = args
                    .buffer_memory_barriers
                    .iter()
                    .map(|b| {
                        vk::BufferMemoryBarrier::default()
                            .src_access_mask(vk::AccessFlags::from_raw(b.src_access_mask))
                            .dst_access_mask(vk::AccessFlags::from_raw(b.dst_access_mask))
                            .src_queue_family_index(b.src_queue_family_index)
                            .dst_queue_family_index(b.dst_queue_family_index)
                            .buffer(handles.buffer(b.buffer))
                            .offset(b.offset)
                            .size(b.size)
                    })
                    .collect();
                let image_barriers: Vec<vk::ImageMemoryBarrier> = args
                    .image_memory_barriers
                    .iter()
                    .map(|b| {
                        vk::ImageMemoryBarrier::default()
                            .src_access_mask(vk::AccessFlags::from_raw(b.src_access_mask))
                            .dst_access_mask(vk::AccessFlags::from_raw(b.dst_access_mask))
                            .old_layout(vk::ImageLayout::from_raw(b.old_layout))
                            .new_layout(vk::ImageLayout::from_raw(b.new_layout))
                            .src_queue_family_index(b.src_queue_family_index)
                            .dst_queue_family_index(b.dst_queue_family_index)
                            .image(handles.image(b.image))
                            .subresource_range(subresource_range(&b.subresource_range))
                    })
                    .collect();
                unsafe {
                    d.cmd_pipeline_barrier(
                        cb,
                        vk::PipelineStageFlags::from_raw(args.src_stage_mask),
                        vk::PipelineStageFlags::from_raw(args.dst_stage_mask),
                        vk::DependencyFlags::from_raw(args.dependency_flags),
                        &memory_barriers,
                        &buffer_barriers,
                        &image_barriers,
                    );
                }
            }
            RecordedCommand::SetEvent(args) => unsafe {
                d.cmd_set_event(
                    cb,
                    handles.event(args.event),
                    vk::PipelineStageFlags::from_raw(args.stage_mask),
                );
            },
            RecordedCommand::ResetEvent(args) => unsafe {
                d.cmd_reset_event(
                    cb,
                    handles.event(args.event),
                    vk::PipelineStageFlags::from_raw(args.stage_mask),
                );
            },
        }
    }

    // ── Descriptors ─────────────────────────────────────────

    fn allocate_descriptor_sets(
        &self,
        device: vk::Device,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let dev = self.device(device)?;
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(layouts);
        unsafe { dev.device.allocate_descriptor_sets(&info) }
    }

    fn free_descriptor_sets(&self, device: vk::Device, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.free_descriptor_sets(pool, sets) }
    }

    fn reset_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool, flags: u32) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe {
            dev.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::from_raw(flags))
        }
    }

    fn update_descriptor_sets(&self, device: vk::Device, args: &UpdateDescriptorSetsArgs, handles: &HandleMap) {
        let Some(dev) = self.device_or_warn(device, "vkUpdateDescriptorSets") else {
            return;
        };

        struct WriteData {
            images: Vec<vk::DescriptorImageInfo>,
            buffers: Vec<vk::DescriptorBufferInfo>,
            texel_views: Vec<vk::BufferView>,
        }
        let data: Vec<WriteData> = args
            .writes
            .iter()
            .map(|w| WriteData {
                images: w
                    .image_infos
                    .iter()
                    .map(|i| vk::DescriptorImageInfo {
                        sampler: i.sampler.map(|id| handles.sampler(id)).unwrap_or_default(),
                        image_view: i.image_view.map(|id| handles.image_view(id)).unwrap_or_default(),
                        image_layout: vk::ImageLayout::from_raw(i.image_layout),
                    })
                    .collect(),
                buffers: w
                    .buffer_infos
                    .iter()
                    .map(|b| vk::DescriptorBufferInfo {
                        buffer: b.buffer.map(|id| handles.buffer(id)).unwrap_or_default(),
                        offset: b.offset,
                        range: b.range,
                    })
                    .collect(),
                texel_views: w.texel_buffer_views.iter().map(|id| handles.buffer_view(*id)).collect(),
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = args
            .writes
            .iter()
            .zip(&data)
            .map(|(w, data)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(handles.descriptor_set(w.dst_set))
                    .dst_binding(w.dst_binding)
                    .dst_array_element(w.dst_array_element)
                    .descriptor_type(vk::DescriptorType::from_raw(w.descriptor_type));
                if !data.images.is_empty() {
                    write.image_info(&data.images)
                } else if !data.buffers.is_empty() {
                    write.buffer_info(&data.buffers)
                } else {
                    write.texel_buffer_view(&data.texel_views)
                }
            })
            .collect();

        let copies: Vec<vk::CopyDescriptorSet> = args
            .copies
            .iter()
            .map(|c| {
                vk::CopyDescriptorSet::default()
                    .src_set(handles.descriptor_set(c.src_set))
                    .src_binding(c.src_binding)
                    .src_array_element(c.src_array_element)
                    .dst_set(handles.descriptor_set(c.dst_set))
                    .dst_binding(c.dst_binding)
                    .dst_array_element(c.dst_array_element)
                    .descriptor_count(c.descriptor_count)
            })
            .collect();

        unsafe { dev.device.update_descriptor_sets(&writes, &copies) };
    }

    // ── Synchronization ─────────────────────────────────────

    fn create_fence(&self, device: vk::Device) -> VkResult<vk::Fence> {
        let dev = self.device(device)?;
        unsafe { dev.device.create_fence(&vk::FenceCreateInfo::default(), None) }
    }

    fn reset_fences(&self, device: vk::Device, fences: &[vk::Fence]) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.reset_fences(fences) }
    }

    fn get_fence_status(&self, device: vk::Device, fence: vk::Fence) -> VkResult<bool> {
        let dev = self.device(device)?;
        unsafe { dev.device.get_fence_status(fence) }
    }

    fn get_event_status(&self, device: vk::Device, event: vk::Event) -> VkResult<bool> {
        let dev = self.device(device)?;
        unsafe { dev.device.get_event_status(event) }
    }

    fn set_event(&self, device: vk::Device, event: vk::Event) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.set_event(event) }
    }

    fn reset_event(&self, device: vk::Device, event: vk::Event) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.reset_event(event) }
    }
}

impl FenceWaiter for AshDriver {
    fn wait_for_fence(&self, device: vk::Device, fence: vk::Fence, timeout: Duration) -> VkResult<bool> {
        let dev = self.device(device)?;
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe { dev.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn device_wait_idle(&self, device: vk::Device) -> VkResult<()> {
        let dev = self.device(device)?;
        unsafe { dev.device.device_wait_idle() }
    }
}
