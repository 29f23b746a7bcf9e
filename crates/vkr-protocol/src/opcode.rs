use std::fmt;

use crate::object::ObjectType;

/// Size of the `{opcode, flags}` header preceding every command payload.
pub const COMMAND_HEADER_LEN: usize = 8;

bitflags::bitflags! {
    /// Per-command flags word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        /// Encode the call's reply into the submission's reply stream.
        const GENERATE_REPLY = 0b0000_0001;
    }
}

/// How the dispatcher treats a recognized opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeDisposition {
    Implemented,
    /// Decoded and dropped; the call has no side effects callers depend on.
    Ignored,
    /// Recognized but not served. Callers would observe the missing side
    /// effects, so the submission is aborted.
    Unsupported,
}

macro_rules! opcodes {
    ($($name:ident = $value:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            pub fn from_raw(value: u32) -> Option<Self> {
                Some(match value {
                    $($value => Self::$name,)*
                    _ => return None,
                })
            }
        }
    };
}

opcodes! {
    // Instance and physical device
    CreateInstance = 0x0001,
    DestroyInstance = 0x0002,
    EnumeratePhysicalDevices = 0x0003,
    GetPhysicalDeviceProperties = 0x0004,
    GetPhysicalDeviceQueueFamilyProperties = 0x0005,
    GetPhysicalDeviceMemoryProperties = 0x0006,
    EnumerateDeviceExtensionProperties = 0x0007,

    // Device
    CreateDevice = 0x0010,
    DestroyDevice = 0x0011,
    GetDeviceQueue = 0x0012,
    DeviceWaitIdle = 0x0013,

    // Queue
    QueueSubmit = 0x0020,
    QueueWaitIdle = 0x0021,

    // Memory
    AllocateMemory = 0x0030,
    FreeMemory = 0x0031,
    BindBufferMemory = 0x0032,
    BindImageMemory = 0x0033,
    GetBufferMemoryRequirements = 0x0034,
    GetImageMemoryRequirements = 0x0035,

    // Buffers, images, views, samplers
    CreateBuffer = 0x0040,
    DestroyBuffer = 0x0041,
    CreateBufferView = 0x0042,
    DestroyBufferView = 0x0043,
    CreateImage = 0x0044,
    DestroyImage = 0x0045,
    CreateImageView = 0x0046,
    DestroyImageView = 0x0047,
    CreateSampler = 0x0048,
    DestroySampler = 0x0049,
    CreateSamplerYcbcrConversion = 0x004A,
    DestroySamplerYcbcrConversion = 0x004B,

    // Synchronization and queries
    CreateFence = 0x0050,
    DestroyFence = 0x0051,
    ResetFences = 0x0052,
    GetFenceStatus = 0x0053,
    WaitForFences = 0x0054,
    CreateSemaphore = 0x0055,
    DestroySemaphore = 0x0056,
    CreateEvent = 0x0057,
    DestroyEvent = 0x0058,
    GetEventStatus = 0x0059,
    SetEvent = 0x005A,
    ResetEvent = 0x005B,
    CreateQueryPool = 0x005C,
    DestroyQueryPool = 0x005D,

    // Shaders, pipelines, render passes
    CreateShaderModule = 0x0060,
    DestroyShaderModule = 0x0061,
    CreatePipelineLayout = 0x0062,
    DestroyPipelineLayout = 0x0063,
    CreatePipelineCache = 0x0064,
    DestroyPipelineCache = 0x0065,
    CreateComputePipelines = 0x0066,
    CreateGraphicsPipelines = 0x0067,
    DestroyPipeline = 0x0068,
    CreateRenderPass = 0x0069,
    DestroyRenderPass = 0x006A,
    CreateFramebuffer = 0x006B,
    DestroyFramebuffer = 0x006C,

    // Descriptors
    CreateDescriptorSetLayout = 0x0070,
    DestroyDescriptorSetLayout = 0x0071,
    CreateDescriptorPool = 0x0072,
    DestroyDescriptorPool = 0x0073,
    ResetDescriptorPool = 0x0074,
    AllocateDescriptorSets = 0x0075,
    FreeDescriptorSets = 0x0076,
    UpdateDescriptorSets = 0x0077,
    CreateDescriptorUpdateTemplate = 0x0078,
    DestroyDescriptorUpdateTemplate = 0x0079,

    // Command pools and buffers
    CreateCommandPool = 0x0080,
    DestroyCommandPool = 0x0081,
    ResetCommandPool = 0x0082,
    AllocateCommandBuffers = 0x0083,
    FreeCommandBuffers = 0x0084,
    BeginCommandBuffer = 0x0085,
    EndCommandBuffer = 0x0086,
    ResetCommandBuffer = 0x0087,

    // Command recording
    CmdBindPipeline = 0x0090,
    CmdBindDescriptorSets = 0x0091,
    CmdDispatch = 0x0092,
    CmdCopyBuffer = 0x0093,
    CmdFillBuffer = 0x0094,
    CmdPipelineBarrier = 0x0095,
    CmdSetEvent = 0x0096,
    CmdResetEvent = 0x0097,

    // Debug and window-system calls
    SetDebugUtilsObjectName = 0x00F0,
    CreateSwapchain = 0x00F1,
}

impl Opcode {
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn disposition(self) -> OpcodeDisposition {
        match self {
            Self::SetDebugUtilsObjectName => OpcodeDisposition::Ignored,
            Self::CreateGraphicsPipelines | Self::CreateSwapchain => {
                OpcodeDisposition::Unsupported
            }
            _ => OpcodeDisposition::Implemented,
        }
    }

    /// Object kind produced by a generic `Create*` opcode.
    pub fn created_object_type(self) -> Option<ObjectType> {
        Some(match self {
            Self::CreateBuffer => ObjectType::Buffer,
            Self::CreateBufferView => ObjectType::BufferView,
            Self::CreateImage => ObjectType::Image,
            Self::CreateImageView => ObjectType::ImageView,
            Self::CreateSampler => ObjectType::Sampler,
            Self::CreateSamplerYcbcrConversion => ObjectType::SamplerYcbcrConversion,
            Self::CreateFence => ObjectType::Fence,
            Self::CreateSemaphore => ObjectType::Semaphore,
            Self::CreateEvent => ObjectType::Event,
            Self::CreateQueryPool => ObjectType::QueryPool,
            Self::CreateShaderModule => ObjectType::ShaderModule,
            Self::CreatePipelineLayout => ObjectType::PipelineLayout,
            Self::CreatePipelineCache => ObjectType::PipelineCache,
            Self::CreateRenderPass => ObjectType::RenderPass,
            Self::CreateFramebuffer => ObjectType::Framebuffer,
            Self::CreateDescriptorSetLayout => ObjectType::DescriptorSetLayout,
            Self::CreateDescriptorPool => ObjectType::DescriptorPool,
            Self::CreateDescriptorUpdateTemplate => ObjectType::DescriptorUpdateTemplate,
            Self::CreateCommandPool => ObjectType::CommandPool,
            _ => return None,
        })
    }

    /// Object kind released by a generic `Destroy*`/`Free*` opcode.
    pub fn destroyed_object_type(self) -> Option<ObjectType> {
        Some(match self {
            Self::FreeMemory => ObjectType::DeviceMemory,
            Self::DestroyBuffer => ObjectType::Buffer,
            Self::DestroyBufferView => ObjectType::BufferView,
            Self::DestroyImage => ObjectType::Image,
            Self::DestroyImageView => ObjectType::ImageView,
            Self::DestroySampler => ObjectType::Sampler,
            Self::DestroySamplerYcbcrConversion => ObjectType::SamplerYcbcrConversion,
            Self::DestroyFence => ObjectType::Fence,
            Self::DestroySemaphore => ObjectType::Semaphore,
            Self::DestroyEvent => ObjectType::Event,
            Self::DestroyQueryPool => ObjectType::QueryPool,
            Self::DestroyShaderModule => ObjectType::ShaderModule,
            Self::DestroyPipelineLayout => ObjectType::PipelineLayout,
            Self::DestroyPipelineCache => ObjectType::PipelineCache,
            Self::DestroyPipeline => ObjectType::Pipeline,
            Self::DestroyRenderPass => ObjectType::RenderPass,
            Self::DestroyFramebuffer => ObjectType::Framebuffer,
            Self::DestroyDescriptorSetLayout => ObjectType::DescriptorSetLayout,
            Self::DestroyDescriptorPool => ObjectType::DescriptorPool,
            Self::DestroyDescriptorUpdateTemplate => ObjectType::DescriptorUpdateTemplate,
            Self::DestroyCommandPool => ObjectType::CommandPool,
            _ => return None,
        })
    }

    pub fn create_opcode_for(ty: ObjectType) -> Option<Self> {
        CREATE_OPCODES
            .iter()
            .copied()
            .find(|op| op.created_object_type() == Some(ty))
    }

    pub fn destroy_opcode_for(ty: ObjectType) -> Option<Self> {
        DESTROY_OPCODES
            .iter()
            .copied()
            .find(|op| op.destroyed_object_type() == Some(ty))
    }
}

const CREATE_OPCODES: [Opcode; 19] = [
    Opcode::CreateBuffer,
    Opcode::CreateBufferView,
    Opcode::CreateImage,
    Opcode::CreateImageView,
    Opcode::CreateSampler,
    Opcode::CreateSamplerYcbcrConversion,
    Opcode::CreateFence,
    Opcode::CreateSemaphore,
    Opcode::CreateEvent,
    Opcode::CreateQueryPool,
    Opcode::CreateShaderModule,
    Opcode::CreatePipelineLayout,
    Opcode::CreatePipelineCache,
    Opcode::CreateRenderPass,
    Opcode::CreateFramebuffer,
    Opcode::CreateDescriptorSetLayout,
    Opcode::CreateDescriptorPool,
    Opcode::CreateDescriptorUpdateTemplate,
    Opcode::CreateCommandPool,
];

const DESTROY_OPCODES: [Opcode; 21] = [
    Opcode::FreeMemory,
    Opcode::DestroyBuffer,
    Opcode::DestroyBufferView,
    Opcode::DestroyImage,
    Opcode::DestroyImageView,
    Opcode::DestroySampler,
    Opcode::DestroySamplerYcbcrConversion,
    Opcode::DestroyFence,
    Opcode::DestroySemaphore,
    Opcode::DestroyEvent,
    Opcode::DestroyQueryPool,
    Opcode::DestroyShaderModule,
    Opcode::DestroyPipelineLayout,
    Opcode::DestroyPipelineCache,
    Opcode::DestroyPipeline,
    Opcode::DestroyRenderPass,
    Opcode::DestroyFramebuffer,
    Opcode::DestroyDescriptorSetLayout,
    Opcode::DestroyDescriptorPool,
    Opcode::DestroyDescriptorUpdateTemplate,
    Opcode::DestroyCommandPool,
];

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
