//! Host driver boundary: the handle sum type, the non-blocking [`Driver`]
//! trait handed to command handlers, the blocking [`FenceWaiter`] trait, and
//! the `ash`-backed implementation.

pub mod ash_driver;
pub mod driver;
pub mod error;
pub mod external;
#[cfg(feature = "fake")]
pub mod fake;
pub mod handle;

pub use ash_driver::AshDriver;
pub use driver::{Driver, FenceWaiter, MemoryAllocation};
pub use error::DriverError;
pub use external::ExternalHandleType;
pub use handle::{HandleMap, HostHandle};
