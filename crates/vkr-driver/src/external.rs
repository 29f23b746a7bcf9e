use ash::vk;

/// External memory handle types this renderer can export or import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalHandleType {
    OpaqueFd,
    DmaBuf,
}

impl ExternalHandleType {
    /// Export preference, best first.
    pub const PREFERENCE: [ExternalHandleType; 2] = [Self::DmaBuf, Self::OpaqueFd];

    pub fn to_vk(self) -> vk::ExternalMemoryHandleTypeFlags {
        match self {
            Self::OpaqueFd => vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD,
            Self::DmaBuf => vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT,
        }
    }

    /// Most preferred type contained in `flags`.
    pub fn best_of(flags: vk::ExternalMemoryHandleTypeFlags) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|ty| flags.contains(ty.to_vk()))
    }
}
