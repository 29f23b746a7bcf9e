//! Typed command records and their opcode-driven payload codec.
//!
//! Object ids are carried raw; resolving them against the object table is
//! the dispatcher's job.

use crate::error::DecodeError;
use crate::object::{ObjectId, ObjectType};
use crate::opcode::{CommandFlags, Opcode};
use crate::wire::{Wire, WireReader, WireWriter};

// ============================================================================
// Nested records
// ============================================================================

crate::wire_struct! {
    pub struct DeviceQueueCreateInfo {
        pub flags: u32,
        pub queue_family_index: u32,
        pub queue_priorities: Vec<f32>,
    }

    pub struct SubmitInfo {
        pub wait_semaphores: Vec<ObjectId>,
        pub wait_dst_stage_masks: Vec<u32>,
        pub command_buffers: Vec<ObjectId>,
        pub signal_semaphores: Vec<ObjectId>,
    }

    pub struct ImageSubresourceRange {
        pub aspect_mask: u32,
        pub base_mip_level: u32,
        pub level_count: u32,
        pub base_array_layer: u32,
        pub layer_count: u32,
    }

    pub struct DescriptorSetLayoutBinding {
        pub binding: u32,
        pub descriptor_type: i32,
        pub descriptor_count: u32,
        pub stage_flags: u32,
        pub immutable_samplers: Vec<ObjectId>,
    }

    pub struct DescriptorPoolSize {
        pub descriptor_type: i32,
        pub descriptor_count: u32,
    }

    pub struct DescriptorUpdateTemplateEntry {
        pub dst_binding: u32,
        pub dst_array_element: u32,
        pub descriptor_count: u32,
        pub descriptor_type: i32,
        pub offset: u64,
        pub stride: u64,
    }

    pub struct PushConstantRange {
        pub stage_flags: u32,
        pub offset: u32,
        pub size: u32,
    }

    pub struct AttachmentDescription {
        pub flags: u32,
        pub format: i32,
        pub samples: u32,
        pub load_op: i32,
        pub store_op: i32,
        pub stencil_load_op: i32,
        pub stencil_store_op: i32,
        pub initial_layout: i32,
        pub final_layout: i32,
    }

    pub struct AttachmentReference {
        pub attachment: u32,
        pub layout: i32,
    }

    pub struct SubpassDescription {
        pub pipeline_bind_point: i32,
        pub input_attachments: Vec<AttachmentReference>,
        pub color_attachments: Vec<AttachmentReference>,
        /// Zero or one entry.
        pub depth_stencil_attachment: Vec<AttachmentReference>,
        pub preserve_attachments: Vec<u32>,
    }

    pub struct SubpassDependency {
        pub src_subpass: u32,
        pub dst_subpass: u32,
        pub src_stage_mask: u32,
        pub dst_stage_mask: u32,
        pub src_access_mask: u32,
        pub dst_access_mask: u32,
        pub dependency_flags: u32,
    }

    pub struct PipelineShaderStage {
        pub stage: u32,
        pub module: ObjectId,
        pub entry_point: String,
    }

    pub struct ComputePipelineCreateInfo {
        pub flags: u32,
        pub stage: PipelineShaderStage,
        pub layout: ObjectId,
    }

    pub struct DescriptorImageInfo {
        pub sampler: Option<ObjectId>,
        pub image_view: Option<ObjectId>,
        pub image_layout: i32,
    }

    pub struct DescriptorBufferInfo {
        pub buffer: Option<ObjectId>,
        pub offset: u64,
        pub range: u64,
    }

    pub struct WriteDescriptorSet {
        pub dst_set: ObjectId,
        pub dst_binding: u32,
        pub dst_array_element: u32,
        pub descriptor_type: i32,
        pub image_infos: Vec<DescriptorImageInfo>,
        pub buffer_infos: Vec<DescriptorBufferInfo>,
        pub texel_buffer_views: Vec<ObjectId>,
    }

    pub struct CopyDescriptorSet {
        pub src_set: ObjectId,
        pub src_binding: u32,
        pub src_array_element: u32,
        pub dst_set: ObjectId,
        pub dst_binding: u32,
        pub dst_array_element: u32,
        pub descriptor_count: u32,
    }

    pub struct BufferCopy {
        pub src_offset: u64,
        pub dst_offset: u64,
        pub size: u64,
    }

    pub struct MemoryBarrier {
        pub src_access_mask: u32,
        pub dst_access_mask: u32,
    }

    pub struct BufferMemoryBarrier {
        pub src_access_mask: u32,
        pub dst_access_mask: u32,
        pub src_queue_family_index: u32,
        pub dst_queue_family_index: u32,
        pub buffer: ObjectId,
        pub offset: u64,
        pub size: u64,
    }

    pub struct ImageMemoryBarrier {
        pub src_access_mask: u32,
        pub dst_access_mask: u32,
        pub old_layout: i32,
        pub new_layout: i32,
        pub src_queue_family_index: u32,
        pub dst_queue_family_index: u32,
        pub image: ObjectId,
        pub subresource_range: ImageSubresourceRange,
    }
}

// ============================================================================
// Create infos for the generic Create* opcodes
// ============================================================================

crate::wire_struct! {
    pub struct BufferCreateInfo {
        pub flags: u32,
        pub size: u64,
        pub usage: u32,
        pub sharing_mode: i32,
        pub queue_family_indices: Vec<u32>,
    }

    pub struct BufferViewCreateInfo {
        pub buffer: ObjectId,
        pub format: i32,
        pub offset: u64,
        pub range: u64,
    }

    pub struct ImageCreateInfo {
        pub flags: u32,
        pub image_type: i32,
        pub format: i32,
        pub extent: [u32; 3],
        pub mip_levels: u32,
        pub array_layers: u32,
        pub samples: u32,
        pub tiling: i32,
        pub usage: u32,
        pub sharing_mode: i32,
        pub queue_family_indices: Vec<u32>,
        pub initial_layout: i32,
    }

    pub struct ImageViewCreateInfo {
        pub flags: u32,
        pub image: ObjectId,
        pub view_type: i32,
        pub format: i32,
        pub components: [i32; 4],
        pub subresource_range: ImageSubresourceRange,
        pub ycbcr_conversion: Option<ObjectId>,
    }

    pub struct SamplerCreateInfo {
        pub mag_filter: i32,
        pub min_filter: i32,
        pub mipmap_mode: i32,
        pub address_modes: [i32; 3],
        pub mip_lod_bias: f32,
        pub anisotropy_enable: bool,
        pub max_anisotropy: f32,
        pub compare_enable: bool,
        pub compare_op: i32,
        pub min_lod: f32,
        pub max_lod: f32,
        pub border_color: i32,
        pub unnormalized_coordinates: bool,
        pub ycbcr_conversion: Option<ObjectId>,
    }

    pub struct SamplerYcbcrConversionCreateInfo {
        pub format: i32,
        pub ycbcr_model: i32,
        pub ycbcr_range: i32,
        pub components: [i32; 4],
        pub x_chroma_offset: i32,
        pub y_chroma_offset: i32,
        pub chroma_filter: i32,
        pub force_explicit_reconstruction: bool,
    }

    pub struct ShaderModuleCreateInfo {
        pub code: Vec<u32>,
    }

    /// Fences, semaphores and events only carry a flags word.
    pub struct SyncObjectCreateInfo {
        pub flags: u32,
    }

    pub struct QueryPoolCreateInfo {
        pub query_type: i32,
        pub query_count: u32,
        pub pipeline_statistics: u32,
    }

    pub struct CommandPoolCreateInfo {
        pub flags: u32,
        pub queue_family_index: u32,
    }

    pub struct DescriptorSetLayoutCreateInfo {
        pub flags: u32,
        pub bindings: Vec<DescriptorSetLayoutBinding>,
    }

    pub struct DescriptorPoolCreateInfo {
        pub flags: u32,
        pub max_sets: u32,
        pub pool_sizes: Vec<DescriptorPoolSize>,
    }

    pub struct DescriptorUpdateTemplateCreateInfo {
        pub entries: Vec<DescriptorUpdateTemplateEntry>,
        pub template_type: i32,
        pub descriptor_set_layout: Option<ObjectId>,
        pub pipeline_bind_point: i32,
        pub pipeline_layout: Option<ObjectId>,
        pub set: u32,
    }

    pub struct PipelineLayoutCreateInfo {
        pub set_layouts: Vec<ObjectId>,
        pub push_constant_ranges: Vec<PushConstantRange>,
    }

    pub struct PipelineCacheCreateInfo {
        pub flags: u32,
        pub initial_data: Vec<u8>,
    }

    pub struct RenderPassCreateInfo {
        pub attachments: Vec<AttachmentDescription>,
        pub subpasses: Vec<SubpassDescription>,
        pub dependencies: Vec<SubpassDependency>,
    }

    pub struct FramebufferCreateInfo {
        pub render_pass: ObjectId,
        pub attachments: Vec<ObjectId>,
        pub width: u32,
        pub height: u32,
        pub layers: u32,
    }
}

/// Payload of a generic `Create*` call, selected by its opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateInfo {
    Buffer(BufferCreateInfo),
    BufferView(BufferViewCreateInfo),
    Image(ImageCreateInfo),
    ImageView(ImageViewCreateInfo),
    Sampler(SamplerCreateInfo),
    SamplerYcbcrConversion(SamplerYcbcrConversionCreateInfo),
    ShaderModule(ShaderModuleCreateInfo),
    Fence(SyncObjectCreateInfo),
    Semaphore(SyncObjectCreateInfo),
    Event(SyncObjectCreateInfo),
    QueryPool(QueryPoolCreateInfo),
    CommandPool(CommandPoolCreateInfo),
    DescriptorSetLayout(DescriptorSetLayoutCreateInfo),
    DescriptorPool(DescriptorPoolCreateInfo),
    DescriptorUpdateTemplate(DescriptorUpdateTemplateCreateInfo),
    PipelineLayout(PipelineLayoutCreateInfo),
    PipelineCache(PipelineCacheCreateInfo),
    RenderPass(RenderPassCreateInfo),
    Framebuffer(FramebufferCreateInfo),
}

impl CreateInfo {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Buffer(_) => ObjectType::Buffer,
            Self::BufferView(_) => ObjectType::BufferView,
            Self::Image(_) => ObjectType::Image,
            Self::ImageView(_) => ObjectType::ImageView,
            Self::Sampler(_) => ObjectType::Sampler,
            Self::SamplerYcbcrConversion(_) => ObjectType::SamplerYcbcrConversion,
            Self::ShaderModule(_) => ObjectType::ShaderModule,
            Self::Fence(_) => ObjectType::Fence,
            Self::Semaphore(_) => ObjectType::Semaphore,
            Self::Event(_) => ObjectType::Event,
            Self::QueryPool(_) => ObjectType::QueryPool,
            Self::CommandPool(_) => ObjectType::CommandPool,
            Self::DescriptorSetLayout(_) => ObjectType::DescriptorSetLayout,
            Self::DescriptorPool(_) => ObjectType::DescriptorPool,
            Self::DescriptorUpdateTemplate(_) => ObjectType::DescriptorUpdateTemplate,
            Self::PipelineLayout(_) => ObjectType::PipelineLayout,
            Self::PipelineCache(_) => ObjectType::PipelineCache,
            Self::RenderPass(_) => ObjectType::RenderPass,
            Self::Framebuffer(_) => ObjectType::Framebuffer,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Buffer(_) => Opcode::CreateBuffer,
            Self::BufferView(_) => Opcode::CreateBufferView,
            Self::Image(_) => Opcode::CreateImage,
            Self::ImageView(_) => Opcode::CreateImageView,
            Self::Sampler(_) => Opcode::CreateSampler,
            Self::SamplerYcbcrConversion(_) => Opcode::CreateSamplerYcbcrConversion,
            Self::ShaderModule(_) => Opcode::CreateShaderModule,
            Self::Fence(_) => Opcode::CreateFence,
            Self::Semaphore(_) => Opcode::CreateSemaphore,
            Self::Event(_) => Opcode::CreateEvent,
            Self::QueryPool(_) => Opcode::CreateQueryPool,
            Self::CommandPool(_) => Opcode::CreateCommandPool,
            Self::DescriptorSetLayout(_) => Opcode::CreateDescriptorSetLayout,
            Self::DescriptorPool(_) => Opcode::CreateDescriptorPool,
            Self::DescriptorUpdateTemplate(_) => Opcode::CreateDescriptorUpdateTemplate,
            Self::PipelineLayout(_) => Opcode::CreatePipelineLayout,
            Self::PipelineCache(_) => Opcode::CreatePipelineCache,
            Self::RenderPass(_) => Opcode::CreateRenderPass,
            Self::Framebuffer(_) => Opcode::CreateFramebuffer,
        }
    }

    fn decode(ty: ObjectType, r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(match ty {
            ObjectType::Buffer => Self::Buffer(Wire::decode(r)?),
            ObjectType::BufferView => Self::BufferView(Wire::decode(r)?),
            ObjectType::Image => Self::Image(Wire::decode(r)?),
            ObjectType::ImageView => Self::ImageView(Wire::decode(r)?),
            ObjectType::Sampler => Self::Sampler(Wire::decode(r)?),
            ObjectType::SamplerYcbcrConversion => Self::SamplerYcbcrConversion(Wire::decode(r)?),
            ObjectType::ShaderModule => Self::ShaderModule(Wire::decode(r)?),
            ObjectType::Fence => Self::Fence(Wire::decode(r)?),
            ObjectType::Semaphore => Self::Semaphore(Wire::decode(r)?),
            ObjectType::Event => Self::Event(Wire::decode(r)?),
            ObjectType::QueryPool => Self::QueryPool(Wire::decode(r)?),
            ObjectType::CommandPool => Self::CommandPool(Wire::decode(r)?),
            ObjectType::DescriptorSetLayout => Self::DescriptorSetLayout(Wire::decode(r)?),
            ObjectType::DescriptorPool => Self::DescriptorPool(Wire::decode(r)?),
            ObjectType::DescriptorUpdateTemplate => {
                Self::DescriptorUpdateTemplate(Wire::decode(r)?)
            }
            ObjectType::PipelineLayout => Self::PipelineLayout(Wire::decode(r)?),
            ObjectType::PipelineCache => Self::PipelineCache(Wire::decode(r)?),
            ObjectType::RenderPass => Self::RenderPass(Wire::decode(r)?),
            ObjectType::Framebuffer => Self::Framebuffer(Wire::decode(r)?),
            other => {
                return Err(DecodeError::InvalidValue {
                    field: "create_info",
                    value: u64::from(other.as_raw()),
                })
            }
        })
    }

    fn encode(&self, w: &mut WireWriter) {
        match self {
            Self::Buffer(info) => info.encode(w),
            Self::BufferView(info) => info.encode(w),
            Self::Image(info) => info.encode(w),
            Self::ImageView(info) => info.encode(w),
            Self::Sampler(info) => info.encode(w),
            Self::SamplerYcbcrConversion(info) => info.encode(w),
            Self::ShaderModule(info) => info.encode(w),
            Self::Fence(info) | Self::Semaphore(info) | Self::Event(info) => info.encode(w),
            Self::QueryPool(info) => info.encode(w),
            Self::CommandPool(info) => info.encode(w),
            Self::DescriptorSetLayout(info) => info.encode(w),
            Self::DescriptorPool(info) => info.encode(w),
            Self::DescriptorUpdateTemplate(info) => info.encode(w),
            Self::PipelineLayout(info) => info.encode(w),
            Self::PipelineCache(info) => info.encode(w),
            Self::RenderPass(info) => info.encode(w),
            Self::Framebuffer(info) => info.encode(w),
        }
    }
}

// ============================================================================
// Command payloads
// ============================================================================

crate::wire_struct! {
    pub struct CreateInstanceArgs {
        pub instance: ObjectId,
        pub api_version: u32,
        pub application_name: String,
        pub engine_name: String,
        pub enabled_extensions: Vec<String>,
    }

    pub struct InstanceArgs {
        pub instance: ObjectId,
    }

    /// An empty id list asks for the device count only.
    pub struct EnumeratePhysicalDevicesArgs {
        pub instance: ObjectId,
        pub physical_devices: Vec<ObjectId>,
    }

    pub struct PhysicalDeviceArgs {
        pub physical_device: ObjectId,
    }

    pub struct CreateDeviceArgs {
        pub physical_device: ObjectId,
        pub device: ObjectId,
        pub queue_create_infos: Vec<DeviceQueueCreateInfo>,
        pub enabled_extensions: Vec<String>,
    }

    pub struct DeviceArgs {
        pub device: ObjectId,
    }

    pub struct GetDeviceQueueArgs {
        pub device: ObjectId,
        pub flags: u32,
        pub queue_family_index: u32,
        pub queue_index: u32,
        pub queue: ObjectId,
    }

    pub struct QueueSubmitArgs {
        pub queue: ObjectId,
        pub submits: Vec<SubmitInfo>,
        pub fence: Option<ObjectId>,
    }

    pub struct QueueArgs {
        pub queue: ObjectId,
    }

    /// `import_resource_id` of zero allocates fresh memory.
    pub struct AllocateMemoryArgs {
        pub device: ObjectId,
        pub memory: ObjectId,
        pub allocation_size: u64,
        pub memory_type_index: u32,
        pub export_handle_types: u32,
        pub import_resource_id: u32,
    }

    pub struct BindMemoryArgs {
        pub device: ObjectId,
        pub object: ObjectId,
        pub memory: ObjectId,
        pub offset: u64,
    }

    pub struct DeviceObjectArgs {
        pub device: ObjectId,
        pub object: ObjectId,
    }

    pub struct CreateComputePipelinesArgs {
        pub device: ObjectId,
        pub pipeline_cache: Option<ObjectId>,
        pub create_infos: Vec<ComputePipelineCreateInfo>,
        pub pipelines: Vec<ObjectId>,
    }

    pub struct ResetPoolArgs {
        pub device: ObjectId,
        pub pool: ObjectId,
        pub flags: u32,
    }

    pub struct AllocateCommandBuffersArgs {
        pub device: ObjectId,
        pub command_pool: ObjectId,
        pub level: i32,
        pub command_buffers: Vec<ObjectId>,
    }

    /// Zero ids in `objects` are skipped.
    pub struct FreePoolObjectsArgs {
        pub device: ObjectId,
        pub pool: ObjectId,
        pub objects: Vec<ObjectId>,
    }

    pub struct CommandBufferArgs {
        pub command_buffer: ObjectId,
        pub flags: u32,
    }

    pub struct AllocateDescriptorSetsArgs {
        pub device: ObjectId,
        pub descriptor_pool: ObjectId,
        pub set_layouts: Vec<ObjectId>,
        pub descriptor_sets: Vec<ObjectId>,
    }

    pub struct UpdateDescriptorSetsArgs {
        pub device: ObjectId,
        pub writes: Vec<WriteDescriptorSet>,
        pub copies: Vec<CopyDescriptorSet>,
    }

    pub struct FencesArgs {
        pub device: ObjectId,
        pub fences: Vec<ObjectId>,
    }

    pub struct WaitForFencesArgs {
        pub device: ObjectId,
        pub fences: Vec<ObjectId>,
        pub wait_all: bool,
        pub timeout: u64,
    }

    pub struct SetDebugUtilsObjectNameArgs {
        pub device: ObjectId,
        pub object_type: ObjectType,
        pub object: ObjectId,
        pub name: String,
    }
}

crate::wire_struct! {
    pub struct CmdBindPipeline {
        pub pipeline_bind_point: i32,
        pub pipeline: ObjectId,
    }

    pub struct CmdBindDescriptorSets {
        pub pipeline_bind_point: i32,
        pub layout: ObjectId,
        pub first_set: u32,
        pub descriptor_sets: Vec<ObjectId>,
        pub dynamic_offsets: Vec<u32>,
    }

    pub struct CmdDispatch {
        pub group_count: [u32; 3],
    }

    pub struct CmdCopyBuffer {
        pub src_buffer: ObjectId,
        pub dst_buffer: ObjectId,
        pub regions: Vec<BufferCopy>,
    }

    pub struct CmdFillBuffer {
        pub buffer: ObjectId,
        pub offset: u64,
        pub size: u64,
        pub data: u32,
    }

    pub struct CmdPipelineBarrier {
        pub src_stage_mask: u32,
        pub dst_stage_mask: u32,
        pub dependency_flags: u32,
        pub memory_barriers: Vec<MemoryBarrier>,
        pub buffer_memory_barriers: Vec<BufferMemoryBarrier>,
        pub image_memory_barriers: Vec<ImageMemoryBarrier>,
    }

    pub struct CmdEvent {
        pub event: ObjectId,
        pub stage_mask: u32,
    }
}

/// `Cmd*` calls recorded into a command buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BindPipeline(CmdBindPipeline),
    BindDescriptorSets(CmdBindDescriptorSets),
    Dispatch(CmdDispatch),
    CopyBuffer(CmdCopyBuffer),
    FillBuffer(CmdFillBuffer),
    PipelineBarrier(CmdPipelineBarrier),
    SetEvent(CmdEvent),
    ResetEvent(CmdEvent),
}

impl RecordedCommand {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::BindPipeline(_) => Opcode::CmdBindPipeline,
            Self::BindDescriptorSets(_) => Opcode::CmdBindDescriptorSets,
            Self::Dispatch(_) => Opcode::CmdDispatch,
            Self::CopyBuffer(_) => Opcode::CmdCopyBuffer,
            Self::FillBuffer(_) => Opcode::CmdFillBuffer,
            Self::PipelineBarrier(_) => Opcode::CmdPipelineBarrier,
            Self::SetEvent(_) => Opcode::CmdSetEvent,
            Self::ResetEvent(_) => Opcode::CmdResetEvent,
        }
    }

    fn encode(&self, w: &mut WireWriter) {
        match self {
            Self::BindPipeline(args) => args.encode(w),
            Self::BindDescriptorSets(args) => args.encode(w),
            Self::Dispatch(args) => args.encode(w),
            Self::CopyBuffer(args) => args.encode(w),
            Self::FillBuffer(args) => args.encode(w),
            Self::PipelineBarrier(args) => args.encode(w),
            Self::SetEvent(args) | Self::ResetEvent(args) => args.encode(w),
        }
    }
}

/// Generic `Create*` call. The created kind follows from `info`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateObjectArgs {
    pub device: ObjectId,
    pub object: ObjectId,
    pub info: CreateInfo,
}

/// Generic `Destroy*`/`FreeMemory` call. A missing object is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyObjectArgs {
    opcode: Opcode,
    object_type: ObjectType,
    pub device: ObjectId,
    pub object: Option<ObjectId>,
}

impl DestroyObjectArgs {
    /// `None` when `object_type` has no generic destroy call.
    pub fn new(object_type: ObjectType, device: ObjectId, object: Option<ObjectId>) -> Option<Self> {
        Some(Self {
            opcode: Opcode::destroy_opcode_for(object_type)?,
            object_type,
            device,
            object,
        })
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }
}

// ============================================================================
// Command
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── Instance ────────────────────────────────────────────
    CreateInstance(CreateInstanceArgs),
    DestroyInstance(InstanceArgs),
    EnumeratePhysicalDevices(EnumeratePhysicalDevicesArgs),

    // ── Physical Device Queries ─────────────────────────────
    GetPhysicalDeviceProperties(PhysicalDeviceArgs),
    GetPhysicalDeviceQueueFamilyProperties(PhysicalDeviceArgs),
    GetPhysicalDeviceMemoryProperties(PhysicalDeviceArgs),
    EnumerateDeviceExtensionProperties(PhysicalDeviceArgs),

    // ── Logical Device ──────────────────────────────────────
    CreateDevice(CreateDeviceArgs),
    DestroyDevice(DeviceArgs),
    GetDeviceQueue(GetDeviceQueueArgs),
    DeviceWaitIdle(DeviceArgs),

    // ── Queue ───────────────────────────────────────────────
    QueueSubmit(QueueSubmitArgs),
    QueueWaitIdle(QueueArgs),

    // ── Memory ──────────────────────────────────────────────
    AllocateMemory(AllocateMemoryArgs),
    BindBufferMemory(BindMemoryArgs),
    BindImageMemory(BindMemoryArgs),
    GetBufferMemoryRequirements(DeviceObjectArgs),
    GetImageMemoryRequirements(DeviceObjectArgs),

    // ── Generic objects ─────────────────────────────────────
    CreateObject(CreateObjectArgs),
    DestroyObject(DestroyObjectArgs),
    CreateComputePipelines(CreateComputePipelinesArgs),

    // ── Command pools and buffers ───────────────────────────
    ResetCommandPool(ResetPoolArgs),
    AllocateCommandBuffers(AllocateCommandBuffersArgs),
    FreeCommandBuffers(FreePoolObjectsArgs),
    BeginCommandBuffer(CommandBufferArgs),
    EndCommandBuffer(CommandBufferArgs),
    ResetCommandBuffer(CommandBufferArgs),
    Record {
        command_buffer: ObjectId,
        op: RecordedCommand,
    },

    // ── Descriptors ─────────────────────────────────────────
    ResetDescriptorPool(ResetPoolArgs),
    AllocateDescriptorSets(AllocateDescriptorSetsArgs),
    FreeDescriptorSets(FreePoolObjectsArgs),
    UpdateDescriptorSets(UpdateDescriptorSetsArgs),

    // ── Synchronization ─────────────────────────────────────
    ResetFences(FencesArgs),
    GetFenceStatus(DeviceObjectArgs),
    WaitForFences(WaitForFencesArgs),
    GetEventStatus(DeviceObjectArgs),
    SetEvent(DeviceObjectArgs),
    ResetEvent(DeviceObjectArgs),

    // ── Debug ───────────────────────────────────────────────
    SetDebugUtilsObjectName(SetDebugUtilsObjectNameArgs),

    /// Recognized opcode this renderer does not serve. Its payload is not
    /// decoded.
    Unsupported { opcode: Opcode },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::CreateInstance(_) => Opcode::CreateInstance,
            Self::DestroyInstance(_) => Opcode::DestroyInstance,
            Self::EnumeratePhysicalDevices(_) => Opcode::EnumeratePhysicalDevices,
            Self::GetPhysicalDeviceProperties(_) => Opcode::GetPhysicalDeviceProperties,
            Self::GetPhysicalDeviceQueueFamilyProperties(_) => {
                Opcode::GetPhysicalDeviceQueueFamilyProperties
            }
            Self::GetPhysicalDeviceMemoryProperties(_) => Opcode::GetPhysicalDeviceMemoryProperties,
            Self::EnumerateDeviceExtensionProperties(_) => {
                Opcode::EnumerateDeviceExtensionProperties
            }
            Self::CreateDevice(_) => Opcode::CreateDevice,
            Self::DestroyDevice(_) => Opcode::DestroyDevice,
            Self::GetDeviceQueue(_) => Opcode::GetDeviceQueue,
            Self::DeviceWaitIdle(_) => Opcode::DeviceWaitIdle,
            Self::QueueSubmit(_) => Opcode::QueueSubmit,
            Self::QueueWaitIdle(_) => Opcode::QueueWaitIdle,
            Self::AllocateMemory(_) => Opcode::AllocateMemory,
            Self::BindBufferMemory(_) => Opcode::BindBufferMemory,
            Self::BindImageMemory(_) => Opcode::BindImageMemory,
            Self::GetBufferMemoryRequirements(_) => Opcode::GetBufferMemoryRequirements,
            Self::GetImageMemoryRequirements(_) => Opcode::GetImageMemoryRequirements,
            Self::CreateObject(args) => args.info.opcode(),
            Self::DestroyObject(args) => args.opcode,
            Self::CreateComputePipelines(_) => Opcode::CreateComputePipelines,
            Self::ResetCommandPool(_) => Opcode::ResetCommandPool,
            Self::AllocateCommandBuffers(_) => Opcode::AllocateCommandBuffers,
            Self::FreeCommandBuffers(_) => Opcode::FreeCommandBuffers,
            Self::BeginCommandBuffer(_) => Opcode::BeginCommandBuffer,
            Self::EndCommandBuffer(_) => Opcode::EndCommandBuffer,
            Self::ResetCommandBuffer(_) => Opcode::ResetCommandBuffer,
            Self::Record { op, .. } => op.opcode(),
            Self::ResetDescriptorPool(_) => Opcode::ResetDescriptorPool,
            Self::AllocateDescriptorSets(_) => Opcode::AllocateDescriptorSets,
            Self::FreeDescriptorSets(_) => Opcode::FreeDescriptorSets,
            Self::UpdateDescriptorSets(_) => Opcode::UpdateDescriptorSets,
            Self::ResetFences(_) => Opcode::ResetFences,
            Self::GetFenceStatus(_) => Opcode::GetFenceStatus,
            Self::WaitForFences(_) => Opcode::WaitForFences,
            Self::GetEventStatus(_) => Opcode::GetEventStatus,
            Self::SetEvent(_) => Opcode::SetEvent,
            Self::ResetEvent(_) => Opcode::ResetEvent,
            Self::SetDebugUtilsObjectName(_) => Opcode::SetDebugUtilsObjectName,
            Self::Unsupported { opcode } => *opcode,
        }
    }

    /// Decode the payload that follows a command header.
    pub fn decode(opcode: Opcode, r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        if let Some(ty) = opcode.created_object_type() {
            return Ok(Self::CreateObject(CreateObjectArgs {
                device: r.read_id()?,
                object: r.read_id()?,
                info: CreateInfo::decode(ty, r)?,
            }));
        }
        if let Some(object_type) = opcode.destroyed_object_type() {
            return Ok(Self::DestroyObject(DestroyObjectArgs {
                opcode,
                object_type,
                device: r.read_id()?,
                object: r.read_optional_id()?,
            }));
        }

        Ok(match opcode {
            Opcode::CreateInstance => Self::CreateInstance(Wire::decode(r)?),
            Opcode::DestroyInstance => Self::DestroyInstance(Wire::decode(r)?),
            Opcode::EnumeratePhysicalDevices => Self::EnumeratePhysicalDevices(Wire::decode(r)?),
            Opcode::GetPhysicalDeviceProperties => {
                Self::GetPhysicalDeviceProperties(Wire::decode(r)?)
            }
            Opcode::GetPhysicalDeviceQueueFamilyProperties => {
                Self::GetPhysicalDeviceQueueFamilyProperties(Wire::decode(r)?)
            }
            Opcode::GetPhysicalDeviceMemoryProperties => {
                Self::GetPhysicalDeviceMemoryProperties(Wire::decode(r)?)
            }
            Opcode::EnumerateDeviceExtensionProperties => {
                Self::EnumerateDeviceExtensionProperties(Wire::decode(r)?)
            }
            Opcode::CreateDevice => Self::CreateDevice(Wire::decode(r)?),
            Opcode::DestroyDevice => Self::DestroyDevice(Wire::decode(r)?),
            Opcode::GetDeviceQueue => Self::GetDeviceQueue(Wire::decode(r)?),
            Opcode::DeviceWaitIdle => Self::DeviceWaitIdle(Wire::decode(r)?),
            Opcode::QueueSubmit => Self::QueueSubmit(Wire::decode(r)?),
            Opcode::QueueWaitIdle => Self::QueueWaitIdle(Wire::decode(r)?),
            Opcode::AllocateMemory => Self::AllocateMemory(Wire::decode(r)?),
            Opcode::BindBufferMemory => Self::BindBufferMemory(Wire::decode(r)?),
            Opcode::BindImageMemory => Self::BindImageMemory(Wire::decode(r)?),
            Opcode::GetBufferMemoryRequirements => {
                Self::GetBufferMemoryRequirements(Wire::decode(r)?)
            }
            Opcode::GetImageMemoryRequirements => {
                Self::GetImageMemoryRequirements(Wire::decode(r)?)
            }
            Opcode::CreateComputePipelines => Self::CreateComputePipelines(Wire::decode(r)?),
            Opcode::ResetCommandPool => Self::ResetCommandPool(Wire::decode(r)?),
            Opcode::AllocateCommandBuffers => Self::AllocateCommandBuffers(Wire::decode(r)?),
            Opcode::FreeCommandBuffers => Self::FreeCommandBuffers(Wire::decode(r)?),
            Opcode::BeginCommandBuffer => Self::BeginCommandBuffer(Wire::decode(r)?),
            Opcode::EndCommandBuffer => Self::EndCommandBuffer(Wire::decode(r)?),
            Opcode::ResetCommandBuffer => Self::ResetCommandBuffer(Wire::decode(r)?),
            Opcode::CmdBindPipeline
            | Opcode::CmdBindDescriptorSets
            | Opcode::CmdDispatch
            | Opcode::CmdCopyBuffer
            | Opcode::CmdFillBuffer
            | Opcode::CmdPipelineBarrier
            | Opcode::CmdSetEvent
            | Opcode::CmdResetEvent => {
                let command_buffer = r.read_id()?;
                let op = match opcode {
                    Opcode::CmdBindPipeline => RecordedCommand::BindPipeline(Wire::decode(r)?),
                    Opcode::CmdBindDescriptorSets => {
                        RecordedCommand::BindDescriptorSets(Wire::decode(r)?)
                    }
                    Opcode::CmdDispatch => RecordedCommand::Dispatch(Wire::decode(r)?),
                    Opcode::CmdCopyBuffer => RecordedCommand::CopyBuffer(Wire::decode(r)?),
                    Opcode::CmdFillBuffer => RecordedCommand::FillBuffer(Wire::decode(r)?),
                    Opcode::CmdPipelineBarrier => {
                        RecordedCommand::PipelineBarrier(Wire::decode(r)?)
                    }
                    Opcode::CmdSetEvent => RecordedCommand::SetEvent(Wire::decode(r)?),
                    _ => RecordedCommand::ResetEvent(Wire::decode(r)?),
                };
                Self::Record { command_buffer, op }
            }
            Opcode::ResetDescriptorPool => Self::ResetDescriptorPool(Wire::decode(r)?),
            Opcode::AllocateDescriptorSets => Self::AllocateDescriptorSets(Wire::decode(r)?),
            Opcode::FreeDescriptorSets => Self::FreeDescriptorSets(Wire::decode(r)?),
            Opcode::UpdateDescriptorSets => Self::UpdateDescriptorSets(Wire::decode(r)?),
            Opcode::ResetFences => Self::ResetFences(Wire::decode(r)?),
            Opcode::GetFenceStatus => Self::GetFenceStatus(Wire::decode(r)?),
            Opcode::WaitForFences => Self::WaitForFences(Wire::decode(r)?),
            Opcode::GetEventStatus => Self::GetEventStatus(Wire::decode(r)?),
            Opcode::SetEvent => Self::SetEvent(Wire::decode(r)?),
            Opcode::ResetEvent => Self::ResetEvent(Wire::decode(r)?),
            Opcode::SetDebugUtilsObjectName => Self::SetDebugUtilsObjectName(Wire::decode(r)?),
            Opcode::CreateGraphicsPipelines | Opcode::CreateSwapchain => {
                r.skip_rest();
                Self::Unsupported { opcode }
            }
            // Generic create/destroy opcodes were handled above.
            other => {
                return Err(DecodeError::InvalidValue {
                    field: "opcode",
                    value: u64::from(other.as_raw()),
                })
            }
        })
    }

    /// Encode the payload only; the header is written by the encoder.
    pub fn encode(&self, w: &mut WireWriter) {
        match self {
            Self::CreateInstance(args) => args.encode(w),
            Self::DestroyInstance(args) => args.encode(w),
            Self::EnumeratePhysicalDevices(args) => args.encode(w),
            Self::GetPhysicalDeviceProperties(args)
            | Self::GetPhysicalDeviceQueueFamilyProperties(args)
            | Self::GetPhysicalDeviceMemoryProperties(args)
            | Self::EnumerateDeviceExtensionProperties(args) => args.encode(w),
            Self::CreateDevice(args) => args.encode(w),
            Self::DestroyDevice(args) | Self::DeviceWaitIdle(args) => args.encode(w),
            Self::GetDeviceQueue(args) => args.encode(w),
            Self::QueueSubmit(args) => args.encode(w),
            Self::QueueWaitIdle(args) => args.encode(w),
            Self::AllocateMemory(args) => args.encode(w),
            Self::BindBufferMemory(args) | Self::BindImageMemory(args) => args.encode(w),
            Self::GetBufferMemoryRequirements(args)
            | Self::GetImageMemoryRequirements(args)
            | Self::GetFenceStatus(args)
            | Self::GetEventStatus(args)
            | Self::SetEvent(args)
            | Self::ResetEvent(args) => args.encode(w),
            Self::CreateObject(args) => {
                w.write_id(args.device);
                w.write_id(args.object);
                args.info.encode(w);
            }
            Self::DestroyObject(args) => {
                w.write_id(args.device);
                w.write_optional_id(args.object);
            }
            Self::CreateComputePipelines(args) => args.encode(w),
            Self::ResetCommandPool(args) | Self::ResetDescriptorPool(args) => args.encode(w),
            Self::AllocateCommandBuffers(args) => args.encode(w),
            Self::FreeCommandBuffers(args) | Self::FreeDescriptorSets(args) => args.encode(w),
            Self::BeginCommandBuffer(args)
            | Self::EndCommandBuffer(args)
            | Self::ResetCommandBuffer(args) => args.encode(w),
            Self::Record { command_buffer, op } => {
                w.write_id(*command_buffer);
                op.encode(w);
            }
            Self::AllocateDescriptorSets(args) => args.encode(w),
            Self::UpdateDescriptorSets(args) => args.encode(w),
            Self::ResetFences(args) => args.encode(w),
            Self::WaitForFences(args) => args.encode(w),
            Self::SetDebugUtilsObjectName(args) => args.encode(w),
            Self::Unsupported { .. } => {}
        }
    }
}

/// A command together with the flags from its header.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCommand {
    pub flags: CommandFlags,
    pub command: Command,
}

impl DecodedCommand {
    pub fn wants_reply(&self) -> bool {
        self.flags.contains(CommandFlags::GENERATE_REPLY)
    }
}
