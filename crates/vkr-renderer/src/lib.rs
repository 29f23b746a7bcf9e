//! Host side of a Vulkan command virtualization protocol.
//!
//! A [`Renderer`] owns one [`Context`] per guest. Each context decodes guest
//! command buffers, resolves guest object ids through its object table and
//! replays the calls on the host driver. Fence completion is reported back
//! through a [`HostTransport`].

mod device;
mod dispatch;
mod object_table;
mod state;

pub mod context;
pub mod error;
pub mod memory;
pub mod object;
pub mod physical_device;
pub mod queue;
pub mod renderer;
pub mod transport;

pub use context::{Context, CPU_TIMELINE};
pub use device::{Device, SyncPool};
pub use error::{Fatal, RendererError};
pub use memory::{BlobFdType, BlobFlags, ContextBlob, MapInfo};
pub use object_table::ObjectTable;
pub use queue::FenceFlags;
pub use renderer::Renderer;
pub use transport::HostTransport;
