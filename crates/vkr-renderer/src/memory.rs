//! Blob resources backed by device memory.
//!
//! The transport names resources by [`ResourceId`]. Device memory becomes
//! visible to it by being exported as a blob, and a resource may later be
//! imported back into a new allocation.

use std::collections::HashMap;
use std::io::{IoSlice, IoSliceMut};
use std::os::fd::OwnedFd;

use ash::vk;
use tracing::debug;
use vkr_driver::{Driver, ExternalHandleType};
use vkr_protocol::{ObjectId, ObjectType, ResourceId};

use crate::error::RendererError;
use crate::object::DeviceMemory;
use crate::state::ContextState;

bitflags::bitflags! {
    /// Requested properties of an exported blob.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlobFlags: u32 {
        const MAPPABLE = 0b0001;
        /// The fd leaves this device, so only a dma-buf will do.
        const CROSS_DEVICE = 0b0100;
    }
}

/// Kind of fd handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobFdType {
    DmaBuf,
    OpaqueFd,
}

impl From<ExternalHandleType> for BlobFdType {
    fn from(ty: ExternalHandleType) -> Self {
        match ty {
            ExternalHandleType::DmaBuf => Self::DmaBuf,
            ExternalHandleType::OpaqueFd => Self::OpaqueFd,
        }
    }
}

/// How the guest should map the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapInfo {
    Cached,
    WriteCombined,
    /// Not host visible.
    None,
}

impl MapInfo {
    fn for_memory(memory: &DeviceMemory) -> Self {
        if !memory.is_host_visible() {
            Self::None
        } else if memory
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_CACHED)
        {
            Self::Cached
        } else {
            Self::WriteCombined
        }
    }
}

#[derive(Debug)]
pub struct ContextBlob {
    pub fd: OwnedFd,
    pub fd_type: BlobFdType,
    pub map_info: MapInfo,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceAttachment {
    /// Device memory backing the resource, in link order.
    pub memories: Vec<ObjectId>,
}

#[derive(Debug, Default)]
pub struct ResourceTable {
    attachments: HashMap<ResourceId, ResourceAttachment>,
}

impl ResourceTable {
    pub fn get(&self, id: ResourceId) -> Option<&ResourceAttachment> {
        self.attachments.get(&id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.attachments.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Link `memory` to resource `id` if it is attached.
    pub fn link(&mut self, id: ResourceId, memory: ObjectId) {
        if let Some(attachment) = self.attachments.get_mut(&id) {
            if !attachment.memories.contains(&memory) {
                attachment.memories.push(memory);
            }
        }
    }

    /// Forget `memory` everywhere.
    pub fn unlink(&mut self, memory: ObjectId) {
        for attachment in self.attachments.values_mut() {
            attachment.memories.retain(|m| *m != memory);
        }
    }
}

/// Handle types a new allocation is made exportable as.
///
/// Only types the device supports are kept. With `auto_export` an
/// allocation that asked for nothing gets the best supported type.
pub fn negotiate_handle_types(
    requested: vk::ExternalMemoryHandleTypeFlags,
    supported: vk::ExternalMemoryHandleTypeFlags,
    auto_export: bool,
) -> vk::ExternalMemoryHandleTypeFlags {
    let valid = requested & supported;
    if requested.is_empty() && auto_export {
        return ExternalHandleType::best_of(supported)
            .map(ExternalHandleType::to_vk)
            .unwrap_or(valid);
    }
    valid
}

// ── Resource operations ─────────────────────────────────

pub(crate) fn attach(state: &mut ContextState, resource_id: ResourceId) {
    let exported: Vec<ObjectId> = state
        .objects
        .ids_of_type(ObjectType::DeviceMemory)
        .into_iter()
        .filter(|id| {
            state
                .objects
                .memory(*id)
                .is_ok_and(|m| matches!(m.exported, Some((res, _)) if res == resource_id))
        })
        .collect();

    state
        .resources
        .attachments
        .entry(resource_id)
        .or_default();
    for memory in exported {
        state.resources.link(resource_id, memory);
    }
    debug!(resource_id, "resource attached");
}

pub(crate) fn detach(state: &mut ContextState, resource_id: ResourceId) -> Result<(), RendererError> {
    if state.resources.attachments.remove(&resource_id).is_none() {
        return Err(RendererError::ResourceNotFound(resource_id));
    }
    debug!(resource_id, "resource detached");
    Ok(())
}

pub(crate) fn export(
    driver: &dyn Driver,
    state: &mut ContextState,
    resource_id: ResourceId,
    memory_id: ObjectId,
    size: u64,
    flags: BlobFlags,
) -> Result<ContextBlob, RendererError> {
    let memory = state
        .objects
        .memory_mut(memory_id)
        .map_err(|_| RendererError::UnknownMemory(memory_id))?;

    if memory.exported.is_some() {
        return Err(RendererError::AlreadyExported(memory_id));
    }
    if flags.contains(BlobFlags::MAPPABLE) && !memory.is_host_visible() {
        return Err(RendererError::NotMappable(memory_id));
    }
    if size > memory.size {
        return Err(RendererError::BlobTooLarge {
            size,
            allocation_size: memory.size,
        });
    }
    let exportable = if flags.contains(BlobFlags::CROSS_DEVICE) {
        memory.valid_handle_types & vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT
    } else {
        memory.valid_handle_types
    };
    let handle_type = ExternalHandleType::best_of(exportable)
        .ok_or(RendererError::NoCompatibleHandleType(memory_id))?;

    let fd = driver.get_memory_fd(memory.device, memory.handle, handle_type)?;
    memory.exported = Some((resource_id, handle_type));
    let map_info = MapInfo::for_memory(memory);

    state.resources.link(resource_id, memory_id);
    debug!(resource_id, memory_id, ?handle_type, "device memory exported");
    Ok(ContextBlob {
        fd,
        fd_type: handle_type.into(),
        map_info,
    })
}

/// A fresh fd for the memory backing `resource_id`.
pub(crate) fn import(
    driver: &dyn Driver,
    state: &ContextState,
    resource_id: ResourceId,
) -> Result<(ExternalHandleType, OwnedFd), RendererError> {
    let attachment = state
        .resources
        .get(resource_id)
        .ok_or(RendererError::ResourceNotFound(resource_id))?;
    let (memory, handle_type) = attachment
        .memories
        .iter()
        .filter_map(|id| state.objects.memory(*id).ok())
        .find_map(|memory| memory.exported.map(|(_, ty)| (memory, ty)))
        .ok_or(RendererError::NoBackingMemory(resource_id))?;
    let fd = driver.get_memory_fd(memory.device, memory.handle, handle_type)?;
    Ok((handle_type, fd))
}

fn backing_memory<'a>(
    state: &'a ContextState,
    resource_id: ResourceId,
) -> Result<&'a DeviceMemory, RendererError> {
    let attachment = state
        .resources
        .get(resource_id)
        .ok_or(RendererError::ResourceNotFound(resource_id))?;
    attachment
        .memories
        .iter()
        .filter_map(|id| state.objects.memory(*id).ok())
        .find(|memory| memory.is_host_visible())
        .ok_or(RendererError::NoBackingMemory(resource_id))
}

fn check_bounds(memory: &DeviceMemory, offset: u64, len: u64) -> Result<(), RendererError> {
    match offset.checked_add(len) {
        Some(end) if end <= memory.size => Ok(()),
        _ => Err(RendererError::TransferOutOfBounds { offset, len }),
    }
}

/// Copy guest data into the resource.
pub(crate) fn transfer_to_host(
    driver: &dyn Driver,
    state: &ContextState,
    resource_id: ResourceId,
    offset: u64,
    iovecs: &[IoSlice<'_>],
) -> Result<(), RendererError> {
    let memory = backing_memory(state, resource_id)?;
    let len: u64 = iovecs.iter().map(|iov| iov.len() as u64).sum();
    check_bounds(memory, offset, len)?;

    let mut at = offset;
    for iov in iovecs {
        driver.write_memory(memory.device, memory.handle, at, iov)?;
        at += iov.len() as u64;
    }
    Ok(())
}

/// Copy resource contents out to the guest.
pub(crate) fn transfer_from_host(
    driver: &dyn Driver,
    state: &ContextState,
    resource_id: ResourceId,
    offset: u64,
    iovecs: &mut [IoSliceMut<'_>],
) -> Result<(), RendererError> {
    let memory = backing_memory(state, resource_id)?;
    let len: u64 = iovecs.iter().map(|iov| iov.len() as u64).sum();
    check_bounds(memory, offset, len)?;

    let mut at = offset;
    for iov in iovecs.iter_mut() {
        driver.read_memory(memory.device, memory.handle, at, iov)?;
        at += iov.len() as u64;
    }
    Ok(())
}
