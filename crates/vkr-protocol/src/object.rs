/// Guest-chosen object identifier. Zero is never a valid id.
pub type ObjectId = u64;

/// Guest-visible resource (blob) identifier assigned by the host transport.
pub type ResourceId = u32;

/// Every object kind the renderer tracks in its object table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum ObjectType {
    Instance = 1,
    PhysicalDevice = 2,
    Device = 3,
    Queue = 4,
    DeviceMemory = 5,
    Buffer = 6,
    BufferView = 7,
    Image = 8,
    ImageView = 9,
    Sampler = 10,
    SamplerYcbcrConversion = 11,
    ShaderModule = 12,
    Fence = 13,
    Semaphore = 14,
    Event = 15,
    QueryPool = 16,
    CommandPool = 17,
    CommandBuffer = 18,
    DescriptorPool = 19,
    DescriptorSet = 20,
    DescriptorSetLayout = 21,
    DescriptorUpdateTemplate = 22,
    PipelineLayout = 23,
    PipelineCache = 24,
    Pipeline = 25,
    RenderPass = 26,
    Framebuffer = 27,
}

impl ObjectType {
    pub const ALL: [ObjectType; 27] = [
        Self::Instance,
        Self::PhysicalDevice,
        Self::Device,
        Self::Queue,
        Self::DeviceMemory,
        Self::Buffer,
        Self::BufferView,
        Self::Image,
        Self::ImageView,
        Self::Sampler,
        Self::SamplerYcbcrConversion,
        Self::ShaderModule,
        Self::Fence,
        Self::Semaphore,
        Self::Event,
        Self::QueryPool,
        Self::CommandPool,
        Self::CommandBuffer,
        Self::DescriptorPool,
        Self::DescriptorSet,
        Self::DescriptorSetLayout,
        Self::DescriptorUpdateTemplate,
        Self::PipelineLayout,
        Self::PipelineCache,
        Self::Pipeline,
        Self::RenderPass,
        Self::Framebuffer,
    ];

    pub fn from_raw(value: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|ty| *ty as u32 == value)
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Objects threaded onto their device's child list. Command buffers and
    /// descriptor sets belong to their pool instead.
    pub fn is_device_child(self) -> bool {
        !matches!(
            self,
            Self::Instance
                | Self::PhysicalDevice
                | Self::Device
                | Self::Queue
                | Self::CommandBuffer
                | Self::DescriptorSet
        )
    }

    /// Objects freed implicitly when their pool is destroyed or reset.
    pub fn is_pool_child(self) -> bool {
        matches!(self, Self::CommandBuffer | Self::DescriptorSet)
    }
}
