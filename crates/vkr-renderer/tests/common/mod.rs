//! Shared setup for renderer integration tests: a fake driver, a transport
//! that records retirements, and helpers that build command streams.

#![allow(dead_code)]

use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use vkr_core::RendererConfig;
use vkr_driver::fake::FakeDriver;
use vkr_protocol::commands::*;
use vkr_protocol::{decode_replies, Command, CommandEncoder, ObjectId, ObjectType, Opcode, Reply};
use vkr_renderer::{Context, HostTransport, Renderer, RendererError};

pub const CTX_ID: u32 = 7;

pub const INSTANCE: ObjectId = 1;
pub const PHYSICAL_DEVICE: ObjectId = 2;
pub const DEVICE: ObjectId = 3;
pub const QUEUE: ObjectId = 4;
pub const SECOND_QUEUE: ObjectId = 5;

pub const DEVICE_LOCAL_TYPE: u32 = 0;
pub const HOST_VISIBLE_TYPE: u32 = 1;
pub const HOST_CACHED_TYPE: u32 = 2;

/// Records every `fence_retired` callback.
#[derive(Default)]
pub struct RecordingTransport {
    retired: Mutex<Vec<(u32, u64, u64)>>,
}

impl RecordingTransport {
    /// `(queue_id, cookie)` pairs in report order.
    pub fn retired(&self) -> Vec<(u64, u64)> {
        self.retired
            .lock()
            .iter()
            .map(|(_, queue_id, cookie)| (*queue_id, *cookie))
            .collect()
    }

    pub fn cookies(&self) -> Vec<u64> {
        self.retired.lock().iter().map(|(_, _, cookie)| *cookie).collect()
    }

    pub fn context_ids(&self) -> Vec<u32> {
        self.retired.lock().iter().map(|(ctx_id, _, _)| *ctx_id).collect()
    }
}

impl HostTransport for RecordingTransport {
    fn fence_retired(&self, ctx_id: u32, queue_id: u64, fence_cookie: u64) {
        self.retired.lock().push((ctx_id, queue_id, fence_cookie));
    }
}

pub struct Harness {
    pub driver: Arc<FakeDriver>,
    pub transport: Arc<RecordingTransport>,
    pub renderer: Renderer,
    pub ctx: Arc<Context>,
}

pub fn harness(config: RendererConfig) -> Harness {
    harness_with_driver(config, FakeDriver::new())
}

pub fn harness_with_driver(config: RendererConfig, driver: FakeDriver) -> Harness {
    vkr_common::logging::try_init_test_logging();
    let driver = Arc::new(driver);
    let transport = Arc::new(RecordingTransport::default());
    let renderer = Renderer::new(
        config,
        Arc::clone(&driver),
        Arc::clone(&transport) as Arc<dyn HostTransport>,
    )
    .expect("renderer");
    let ctx = renderer.create_context(CTX_ID).expect("context");
    Harness {
        driver,
        transport,
        renderer,
        ctx,
    }
}

pub fn threaded_config() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.sync.thread_sync = true;
    config.sync.waiter_timeout_ms = 10;
    config
}

// ── Stream helpers ──────────────────────────────────────────

/// Submit `commands`, each asking for a reply, and decode the replies.
pub fn submit(ctx: &Context, commands: &[Command]) -> Result<Vec<(Opcode, Reply)>, RendererError> {
    let mut enc = CommandEncoder::new();
    for command in commands {
        enc.push_with_reply(command);
    }
    let bytes = ctx.submit_cmd(&enc.finish())?;
    Ok(decode_replies(&bytes).expect("reply stream"))
}

/// Submit and require every call with a result code to succeed.
pub fn submit_ok(ctx: &Context, commands: &[Command]) -> Vec<(Opcode, Reply)> {
    let replies = submit(ctx, commands).expect("submission");
    for (opcode, reply) in &replies {
        if let Some(result) = reply.result() {
            assert_eq!(
                result,
                vk::Result::SUCCESS.as_raw(),
                "{} failed with {:?}",
                opcode,
                vk::Result::from_raw(result)
            );
        }
    }
    replies
}

/// Result code of a single-command submission.
pub fn submit_result(ctx: &Context, command: Command) -> vk::Result {
    let replies = submit(ctx, &[command]).expect("submission");
    match replies.as_slice() {
        [(_, reply)] => vk::Result::from_raw(reply.result().expect("result reply")),
        other => panic!("expected one reply, got {:?}", other),
    }
}

// ── Command builders ────────────────────────────────────────

pub fn create_instance(id: ObjectId, api_version: u32) -> Command {
    Command::CreateInstance(CreateInstanceArgs {
        instance: id,
        api_version,
        application_name: "vkr-renderer-test".to_string(),
        engine_name: String::new(),
        enabled_extensions: Vec::new(),
    })
}

pub fn enumerate_physical_devices(instance: ObjectId, ids: Vec<ObjectId>) -> Command {
    Command::EnumeratePhysicalDevices(EnumeratePhysicalDevicesArgs {
        instance,
        physical_devices: ids,
    })
}

pub fn create_device(device: ObjectId, queue_count: usize, extensions: &[&str]) -> Command {
    Command::CreateDevice(CreateDeviceArgs {
        physical_device: PHYSICAL_DEVICE,
        device,
        queue_create_infos: vec![DeviceQueueCreateInfo {
            flags: 0,
            queue_family_index: 0,
            queue_priorities: vec![1.0; queue_count],
        }],
        enabled_extensions: extensions.iter().map(|name| name.to_string()).collect(),
    })
}

pub fn get_device_queue(device: ObjectId, index: u32, queue: ObjectId) -> Command {
    Command::GetDeviceQueue(GetDeviceQueueArgs {
        device,
        flags: 0,
        queue_family_index: 0,
        queue_index: index,
        queue,
    })
}

pub fn create_object(object: ObjectId, info: CreateInfo) -> Command {
    Command::CreateObject(CreateObjectArgs {
        device: DEVICE,
        object,
        info,
    })
}

pub fn destroy_object(ty: ObjectType, object: ObjectId) -> Command {
    Command::DestroyObject(DestroyObjectArgs::new(ty, DEVICE, Some(object)).expect("destroyable"))
}

pub fn buffer_info(size: u64) -> CreateInfo {
    CreateInfo::Buffer(BufferCreateInfo {
        flags: 0,
        size,
        usage: vk::BufferUsageFlags::STORAGE_BUFFER.as_raw(),
        sharing_mode: vk::SharingMode::EXCLUSIVE.as_raw(),
        queue_family_indices: Vec::new(),
    })
}

pub fn command_pool_info() -> CreateInfo {
    CreateInfo::CommandPool(CommandPoolCreateInfo {
        flags: 0,
        queue_family_index: 0,
    })
}

pub fn descriptor_pool_info(max_sets: u32) -> CreateInfo {
    CreateInfo::DescriptorPool(DescriptorPoolCreateInfo {
        flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET.as_raw(),
        max_sets,
        pool_sizes: vec![DescriptorPoolSize {
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER.as_raw(),
            descriptor_count: max_sets,
        }],
    })
}

pub fn set_layout_info() -> CreateInfo {
    CreateInfo::DescriptorSetLayout(DescriptorSetLayoutCreateInfo {
        flags: 0,
        bindings: vec![DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER.as_raw(),
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::COMPUTE.as_raw(),
            immutable_samplers: Vec::new(),
        }],
    })
}

pub fn fence_info() -> CreateInfo {
    CreateInfo::Fence(SyncObjectCreateInfo { flags: 0 })
}

pub fn event_info() -> CreateInfo {
    CreateInfo::Event(SyncObjectCreateInfo { flags: 0 })
}

pub fn allocate_memory(memory: ObjectId, size: u64, memory_type_index: u32, export_handle_types: u32) -> Command {
    Command::AllocateMemory(AllocateMemoryArgs {
        device: DEVICE,
        memory,
        allocation_size: size,
        memory_type_index,
        export_handle_types,
        import_resource_id: 0,
    })
}

pub fn allocate_command_buffers(pool: ObjectId, ids: Vec<ObjectId>) -> Command {
    Command::AllocateCommandBuffers(AllocateCommandBuffersArgs {
        device: DEVICE,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY.as_raw(),
        command_buffers: ids,
    })
}

// ── Canned setup ────────────────────────────────────────────

/// Instance, physical device, device with `queue_count` queues, and every
/// queue fetched as `QUEUE`, `SECOND_QUEUE`.
pub fn setup_device(ctx: &Context, queue_count: usize) {
    let mut commands = vec![
        create_instance(INSTANCE, vk::API_VERSION_1_3),
        enumerate_physical_devices(INSTANCE, vec![PHYSICAL_DEVICE]),
        create_device(DEVICE, queue_count, &[]),
    ];
    for (index, queue) in [QUEUE, SECOND_QUEUE].into_iter().take(queue_count).enumerate() {
        commands.push(get_device_queue(DEVICE, index as u32, queue));
    }
    submit_ok(ctx, &commands);
}
