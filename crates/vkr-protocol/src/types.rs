//! Plain data records shared by replies and the host-driver boundary.

crate::wire_struct! {
    #[derive(Eq)]
    pub struct PhysicalDeviceProperties {
        pub api_version: u32,
        pub driver_version: u32,
        pub vendor_id: u32,
        pub device_id: u32,
        pub device_type: i32,
        pub device_name: String,
        pub pipeline_cache_uuid: [u8; 16],
    }

    #[derive(Copy, Eq)]
    pub struct QueueFamilyProperties {
        pub queue_flags: u32,
        pub queue_count: u32,
        pub timestamp_valid_bits: u32,
        pub min_image_transfer_granularity: [u32; 3],
    }

    #[derive(Copy, Eq)]
    pub struct MemoryType {
        pub property_flags: u32,
        pub heap_index: u32,
    }

    #[derive(Copy, Eq)]
    pub struct MemoryHeap {
        pub size: u64,
        pub flags: u32,
    }

    #[derive(Default, Eq)]
    pub struct MemoryProperties {
        pub memory_types: Vec<MemoryType>,
        pub memory_heaps: Vec<MemoryHeap>,
    }

    #[derive(Eq)]
    pub struct ExtensionProperties {
        pub extension_name: String,
        pub spec_version: u32,
    }

    #[derive(Copy, Default, Eq)]
    pub struct MemoryRequirements {
        pub size: u64,
        pub alignment: u64,
        pub memory_type_bits: u32,
    }
}

impl MemoryProperties {
    pub fn memory_type(&self, index: u32) -> Option<&MemoryType> {
        self.memory_types.get(index as usize)
    }
}

impl ExtensionProperties {
    pub fn new(extension_name: &str, spec_version: u32) -> Self {
        Self {
            extension_name: extension_name.to_string(),
            spec_version,
        }
    }
}
