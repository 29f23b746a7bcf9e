use ash::vk;
use vkr_core::CoreError;
use vkr_driver::DriverError;
use vkr_protocol::{DecodeError, ObjectId, ObjectType, Opcode, ResourceId};

/// Errors that abort the rest of a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fatal {
    #[error("malformed command stream: {0}")]
    Decode(#[from] DecodeError),

    #[error("object id 0 is not a valid new id")]
    InvalidId,

    #[error("object id {0} is already in use")]
    DuplicateId(ObjectId),

    #[error("unknown object id {0}")]
    UnknownId(ObjectId),

    #[error("object {id} is a {actual:?}, expected {expected:?}")]
    TypeMismatch {
        id: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("object {id} does not belong to {owner}")]
    WrongOwner { id: ObjectId, owner: ObjectId },

    #[error("{0} would block the dispatch thread")]
    BlockingWait(Opcode),

    #[error("{0} is not supported")]
    Unsupported(Opcode),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Errors returned by the public context and renderer API.
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("submission failed: {0}")]
    SubmissionFailed(#[from] Fatal),

    #[error("unknown context {0}")]
    UnknownContext(u32),

    #[error("context {0} already exists")]
    DuplicateContext(u32),

    #[error("unknown queue id {0}")]
    UnknownQueue(u64),

    #[error("unknown device memory {0}")]
    UnknownMemory(ObjectId),

    #[error("device memory {0} is already exported")]
    AlreadyExported(ObjectId),

    #[error("device memory {0} has no exportable handle type")]
    NoCompatibleHandleType(ObjectId),

    #[error("device memory {0} is not host visible")]
    NotMappable(ObjectId),

    #[error("blob size {size} exceeds the {allocation_size} byte allocation")]
    BlobTooLarge { size: u64, allocation_size: u64 },

    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),

    #[error("resource {0} has no backing memory")]
    NoBackingMemory(ResourceId),

    #[error("transfer of {len} bytes at offset {offset} is out of bounds")]
    TransferOutOfBounds { offset: u64, len: u64 },

    #[error("out of memory")]
    OutOfMemory,

    #[error("driver error: {0}")]
    Driver(vk::Result),

    #[error(transparent)]
    Load(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] CoreError),
}

impl From<vk::Result> for RendererError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                Self::OutOfMemory
            }
            other => Self::Driver(other),
        }
    }
}
