//! Device memory export, resource attachment, transfer and import tests.
//!
//! Run with: cargo test -p vkr-renderer --test memory_test

mod common;

use std::io::{IoSlice, IoSliceMut};

use ash::vk;
use common::*;
use vkr_core::RendererConfig;
use vkr_driver::fake::{FakeDriver, PhysicalDeviceInfo};
use vkr_driver::ExternalHandleType;
use vkr_protocol::commands::AllocateMemoryArgs;
use vkr_protocol::{Command, ObjectType};
use vkr_renderer::{BlobFdType, BlobFlags, Context, Fatal, MapInfo, RendererError};

const MEMORY: u64 = 40;
const OTHER_MEMORY: u64 = 41;
const IMPORTED: u64 = 50;
const RESOURCE: u32 = 100;
const OTHER_RESOURCE: u32 = 101;
const SIZE: u64 = 4096;

fn exportable() -> u32 {
    (vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD | vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT).as_raw()
}

fn allocate_exportable(ctx: &Context, memory: u64, memory_type: u32) {
    submit_ok(ctx, &[allocate_memory(memory, SIZE, memory_type, exportable())]);
}

fn import_memory(memory: u64, resource_id: u32) -> Command {
    Command::AllocateMemory(AllocateMemoryArgs {
        device: DEVICE,
        memory,
        allocation_size: SIZE,
        memory_type_index: HOST_VISIBLE_TYPE,
        export_handle_types: 0,
        import_resource_id: resource_id,
    })
}

/// Host-visible memory exported as `RESOURCE` and attached.
fn attached_memory(ctx: &Context) {
    allocate_exportable(ctx, MEMORY, HOST_VISIBLE_TYPE);
    ctx.export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::MAPPABLE).expect("export");
    ctx.attach_resource(RESOURCE);
}

// ── Export ──────────────────────────────────────────────────

#[test]
fn test_export_prefers_dma_buf() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    allocate_exportable(&h.ctx, MEMORY, HOST_VISIBLE_TYPE);

    let blob = h
        .ctx
        .export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::MAPPABLE)
        .expect("export");
    assert_eq!(blob.fd_type, BlobFdType::DmaBuf);
    assert_eq!(blob.map_info, MapInfo::WriteCombined);
    assert_eq!(h.driver.call_count("vkGetMemoryFdKHR"), 1);

    let allocation = &h.driver.allocations()[0];
    assert_eq!(allocation.export_handle_types.as_raw(), exportable());
    assert_eq!(allocation.imported, None);
}

#[test]
fn test_export_succeeds_at_most_once() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    allocate_exportable(&h.ctx, MEMORY, HOST_VISIBLE_TYPE);
    h.ctx.export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::MAPPABLE).expect("export");

    for flags in [BlobFlags::MAPPABLE, BlobFlags::CROSS_DEVICE, BlobFlags::empty()] {
        match h.ctx.export_blob(OTHER_RESOURCE, MEMORY, SIZE, flags) {
            Err(RendererError::AlreadyExported(id)) => assert_eq!(id, MEMORY),
            other => panic!("expected AlreadyExported, got {:?}", other),
        }
    }
    assert_eq!(h.driver.call_count("vkGetMemoryFdKHR"), 1);
}

#[test]
fn test_opaque_fd_without_dma_buf_support() {
    let mut info = PhysicalDeviceInfo::default();
    info.remove_extension("VK_EXT_external_memory_dma_buf");
    let h = harness_with_driver(RendererConfig::default(), FakeDriver::with_info(info));
    setup_device(&h.ctx, 1);
    allocate_exportable(&h.ctx, MEMORY, HOST_CACHED_TYPE);

    let blob = h
        .ctx
        .export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::MAPPABLE)
        .expect("export");
    assert_eq!(blob.fd_type, BlobFdType::OpaqueFd);
    assert_eq!(blob.map_info, MapInfo::Cached);
    assert_eq!(
        h.driver.allocations()[0].export_handle_types,
        vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD
    );
}

#[test]
fn test_cross_device_export_gets_dma_buf() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    allocate_exportable(&h.ctx, MEMORY, HOST_VISIBLE_TYPE);

    let blob = h
        .ctx
        .export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::MAPPABLE | BlobFlags::CROSS_DEVICE)
        .expect("export");
    assert_eq!(blob.fd_type, BlobFdType::DmaBuf);
}

#[test]
fn test_cross_device_export_requires_dma_buf() {
    let mut info = PhysicalDeviceInfo::default();
    info.remove_extension("VK_EXT_external_memory_dma_buf");
    let h = harness_with_driver(RendererConfig::default(), FakeDriver::with_info(info));
    setup_device(&h.ctx, 1);
    allocate_exportable(&h.ctx, MEMORY, HOST_VISIBLE_TYPE);

    match h.ctx.export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::CROSS_DEVICE) {
        Err(RendererError::NoCompatibleHandleType(id)) => assert_eq!(id, MEMORY),
        other => panic!("expected NoCompatibleHandleType, got {:?}", other),
    }
    assert_eq!(h.driver.call_count("vkGetMemoryFdKHR"), 0);

    // A local export of the same memory still works.
    let blob = h
        .ctx
        .export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::empty())
        .expect("export");
    assert_eq!(blob.fd_type, BlobFdType::OpaqueFd);
}

#[test]
fn test_cross_device_export_of_opaque_only_memory() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    let opaque = vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD.as_raw();
    submit_ok(&h.ctx, &[allocate_memory(MEMORY, SIZE, HOST_VISIBLE_TYPE, opaque)]);

    match h.ctx.export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::CROSS_DEVICE) {
        Err(RendererError::NoCompatibleHandleType(id)) => assert_eq!(id, MEMORY),
        other => panic!("expected NoCompatibleHandleType, got {:?}", other),
    }
}

#[test]
fn test_mappable_export_needs_host_visible_memory() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    allocate_exportable(&h.ctx, MEMORY, DEVICE_LOCAL_TYPE);

    match h.ctx.export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::MAPPABLE) {
        Err(RendererError::NotMappable(id)) => assert_eq!(id, MEMORY),
        other => panic!("expected NotMappable, got {:?}", other),
    }

    // The failed attempt did not use up the export.
    let blob = h
        .ctx
        .export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::empty())
        .expect("export");
    assert_eq!(blob.map_info, MapInfo::None);
}

#[test]
fn test_blob_larger_than_allocation_rejected() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    allocate_exportable(&h.ctx, MEMORY, HOST_VISIBLE_TYPE);

    match h.ctx.export_blob(RESOURCE, MEMORY, SIZE * 2, BlobFlags::empty()) {
        Err(RendererError::BlobTooLarge { size, allocation_size }) => {
            assert_eq!(size, SIZE * 2);
            assert_eq!(allocation_size, SIZE);
        }
        other => panic!("expected BlobTooLarge, got {:?}", other),
    }
    h.ctx.export_blob(RESOURCE, MEMORY, SIZE / 2, BlobFlags::empty()).expect("smaller blob");
}

#[test]
fn test_export_of_unknown_memory() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    for id in [999, DEVICE] {
        match h.ctx.export_blob(RESOURCE, id, SIZE, BlobFlags::empty()) {
            Err(RendererError::UnknownMemory(unknown)) => assert_eq!(unknown, id),
            other => panic!("expected UnknownMemory, got {:?}", other),
        }
    }
}

#[test]
fn test_memory_without_export_types_is_not_exportable() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[allocate_memory(MEMORY, SIZE, HOST_VISIBLE_TYPE, 0)]);

    match h.ctx.export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::empty()) {
        Err(RendererError::NoCompatibleHandleType(id)) => assert_eq!(id, MEMORY),
        other => panic!("expected NoCompatibleHandleType, got {:?}", other),
    }
}

#[test]
fn test_auto_export_makes_every_allocation_exportable() {
    let mut config = RendererConfig::default();
    config.memory.auto_export = true;
    let h = harness(config);
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[allocate_memory(MEMORY, SIZE, HOST_VISIBLE_TYPE, 0)]);

    assert_eq!(
        h.driver.allocations()[0].export_handle_types,
        vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT
    );
    let blob = h
        .ctx
        .export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::empty())
        .expect("export");
    assert_eq!(blob.fd_type, BlobFdType::DmaBuf);
}

#[test]
fn test_allocation_failures() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    let result = submit_result(
        &h.ctx,
        allocate_memory(MEMORY, vkr_driver::fake::MAX_ALLOCATION_SIZE + 1, HOST_VISIBLE_TYPE, 0),
    );
    assert_eq!(result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    assert!(!h.ctx.contains_object(MEMORY));

    match submit(&h.ctx, &[allocate_memory(MEMORY, SIZE, 9, 0)]) {
        Err(RendererError::SubmissionFailed(Fatal::InvalidArgument(_))) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
    assert!(!h.ctx.contains_object(MEMORY));
}

// ── Resource attachments ────────────────────────────────────

#[test]
fn test_attach_links_previously_exported_memory() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    attached_memory(&h.ctx);
    assert_eq!(h.ctx.attachment_memories(RESOURCE), Some(vec![MEMORY]));

    // Exported after the attachment exists.
    allocate_exportable(&h.ctx, OTHER_MEMORY, HOST_VISIBLE_TYPE);
    h.ctx.attach_resource(OTHER_RESOURCE);
    assert_eq!(h.ctx.attachment_memories(OTHER_RESOURCE), Some(vec![]));
    h.ctx
        .export_blob(OTHER_RESOURCE, OTHER_MEMORY, SIZE, BlobFlags::empty())
        .expect("export");
    assert_eq!(h.ctx.attachment_memories(OTHER_RESOURCE), Some(vec![OTHER_MEMORY]));
}

#[test]
fn test_detach_forgets_resource() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    attached_memory(&h.ctx);

    h.ctx.detach_resource(RESOURCE).expect("detach");
    assert_eq!(h.ctx.attachment_memories(RESOURCE), None);
    assert!(h.ctx.contains_object(MEMORY));
    match h.ctx.detach_resource(RESOURCE) {
        Err(RendererError::ResourceNotFound(id)) => assert_eq!(id, RESOURCE),
        other => panic!("expected ResourceNotFound, got {:?}", other),
    }
}

#[test]
fn test_freeing_memory_unlinks_it() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    attached_memory(&h.ctx);

    submit(&h.ctx, &[destroy_object(ObjectType::DeviceMemory, MEMORY)]).expect("free memory");
    assert_eq!(h.ctx.attachment_memories(RESOURCE), Some(vec![]));
    assert_eq!(h.driver.call_count("vkFreeMemory"), 1);

    match h.ctx.transfer_to_host(RESOURCE, 0, &[IoSlice::new(b"data")]) {
        Err(RendererError::NoBackingMemory(id)) => assert_eq!(id, RESOURCE),
        other => panic!("expected NoBackingMemory, got {:?}", other),
    }
}

// ── Transfers ───────────────────────────────────────────────

#[test]
fn test_transfer_round_trip() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    attached_memory(&h.ctx);

    h.ctx
        .transfer_to_host(RESOURCE, 16, &[IoSlice::new(b"hello"), IoSlice::new(b" world")])
        .expect("write");

    let mut head = [0u8; 3];
    let mut tail = [0u8; 8];
    h.ctx
        .transfer_from_host(RESOURCE, 16, &mut [IoSliceMut::new(&mut head), IoSliceMut::new(&mut tail)])
        .expect("read");
    assert_eq!(&head, b"hel");
    assert_eq!(&tail, b"lo world");

    let mut before = [0xffu8; 4];
    h.ctx
        .transfer_from_host(RESOURCE, 12, &mut [IoSliceMut::new(&mut before)])
        .expect("read");
    assert_eq!(before, [0; 4]);
}

#[test]
fn test_transfer_bounds_checked() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    attached_memory(&h.ctx);
    let writes_before = h.driver.call_count("vkMapMemory");

    match h.ctx.transfer_to_host(RESOURCE, SIZE - 4, &[IoSlice::new(b"12345678")]) {
        Err(RendererError::TransferOutOfBounds { offset, len }) => {
            assert_eq!(offset, SIZE - 4);
            assert_eq!(len, 8);
        }
        other => panic!("expected TransferOutOfBounds, got {:?}", other),
    }
    let mut buf = [0u8; 1];
    match h
        .ctx
        .transfer_from_host(RESOURCE, u64::MAX, &mut [IoSliceMut::new(&mut buf)])
    {
        Err(RendererError::TransferOutOfBounds { offset, .. }) => assert_eq!(offset, u64::MAX),
        other => panic!("expected TransferOutOfBounds, got {:?}", other),
    }
    assert_eq!(h.driver.call_count("vkMapMemory"), writes_before);

    // Exactly up to the end is fine.
    h.ctx
        .transfer_to_host(RESOURCE, SIZE - 4, &[IoSlice::new(b"1234")])
        .expect("write at end");
}

#[test]
fn test_transfer_needs_attached_host_visible_memory() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    match h.ctx.transfer_to_host(RESOURCE, 0, &[IoSlice::new(b"x")]) {
        Err(RendererError::ResourceNotFound(id)) => assert_eq!(id, RESOURCE),
        other => panic!("expected ResourceNotFound, got {:?}", other),
    }

    allocate_exportable(&h.ctx, MEMORY, DEVICE_LOCAL_TYPE);
    h.ctx.export_blob(RESOURCE, MEMORY, SIZE, BlobFlags::empty()).expect("export");
    h.ctx.attach_resource(RESOURCE);
    match h.ctx.transfer_to_host(RESOURCE, 0, &[IoSlice::new(b"x")]) {
        Err(RendererError::NoBackingMemory(id)) => assert_eq!(id, RESOURCE),
        other => panic!("expected NoBackingMemory, got {:?}", other),
    }
}

// ── Import ──────────────────────────────────────────────────

#[test]
fn test_import_resource_into_new_allocation() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    attached_memory(&h.ctx);

    let (handle_type, _fd) = h.ctx.import_resource(RESOURCE).expect("import fd");
    assert_eq!(handle_type, ExternalHandleType::DmaBuf);

    submit_ok(&h.ctx, &[import_memory(IMPORTED, RESOURCE)]);
    assert_eq!(h.ctx.object_type(IMPORTED), Some(ObjectType::DeviceMemory));
    let allocation = h.driver.allocations().last().cloned().expect("allocation");
    assert_eq!(allocation.imported, Some(ExternalHandleType::DmaBuf));
    assert!(allocation.export_handle_types.is_empty());

    // Imported memory is not exported again.
    match h.ctx.export_blob(OTHER_RESOURCE, IMPORTED, SIZE, BlobFlags::empty()) {
        Err(RendererError::NoCompatibleHandleType(id)) => assert_eq!(id, IMPORTED),
        other => panic!("expected NoCompatibleHandleType, got {:?}", other),
    }
}

#[test]
fn test_import_of_unknown_resource_fails_allocation() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    let result = submit_result(&h.ctx, import_memory(IMPORTED, 555));
    assert_eq!(result, vk::Result::ERROR_INVALID_EXTERNAL_HANDLE);
    assert!(!h.ctx.contains_object(IMPORTED));
    assert!(h.driver.allocations().is_empty());

    match h.ctx.import_resource(555) {
        Err(RendererError::ResourceNotFound(id)) => assert_eq!(id, 555),
        other => panic!("expected ResourceNotFound, got {:?}", other),
    }
}
