//! Integration test: command dispatch through a context
//!
//! Drives `Context::submit_cmd` with encoder-built streams against the fake
//! driver and checks replies, object table contents and driver calls.
//!
//! Run with: cargo test -p vkr-renderer --test dispatch_test

mod common;

use ash::vk;
use common::*;
use vkr_core::RendererConfig;
use vkr_driver::fake::{FakeDriver, PhysicalDeviceInfo};
use vkr_protocol::commands::*;
use vkr_protocol::types::MemoryRequirements;
use vkr_protocol::{Command, CommandEncoder, ObjectType, Opcode, RecordedCommand, Reply};
use vkr_renderer::{Fatal, RendererError};

#[test]
fn test_objects_replay_into_table() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    submit_ok(
        &h.ctx,
        &[
            create_object(10, buffer_info(1000)),
            allocate_memory(11, 4096, HOST_VISIBLE_TYPE, 0),
            Command::BindBufferMemory(BindMemoryArgs {
                device: DEVICE,
                object: 10,
                memory: 11,
                offset: 0,
            }),
        ],
    );
    assert_eq!(h.ctx.object_type(10), Some(ObjectType::Buffer));
    assert_eq!(h.ctx.object_type(11), Some(ObjectType::DeviceMemory));
    assert_eq!(h.ctx.object_type(QUEUE), Some(ObjectType::Queue));
    assert_eq!(h.driver.live_count(ObjectType::Buffer), 1);
    assert_eq!(h.driver.call_count("vkBindBufferMemory"), 1);

    let replies = submit_ok(
        &h.ctx,
        &[Command::GetBufferMemoryRequirements(DeviceObjectArgs {
            device: DEVICE,
            object: 10,
        })],
    );
    match &replies[..] {
        [(Opcode::GetBufferMemoryRequirements, Reply::MemoryRequirements(req))] => {
            assert_eq!(req.size, 1024);
            assert_eq!(req.alignment, 256);
        }
        other => panic!("expected MemoryRequirements, got {:?}", other),
    }

    submit_ok(&h.ctx, &[destroy_object(ObjectType::Buffer, 10)]);
    assert!(!h.ctx.contains_object(10));
    assert_eq!(h.driver.live_count(ObjectType::Buffer), 0);
}

#[test]
fn test_requirements_failure_reports_zeroed_requirements() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[create_object(10, buffer_info(64))]);

    h.driver
        .queue_result("vkGetBufferMemoryRequirements", vk::Result::ERROR_OUT_OF_HOST_MEMORY);
    let replies = submit_ok(
        &h.ctx,
        &[Command::GetBufferMemoryRequirements(DeviceObjectArgs {
            device: DEVICE,
            object: 10,
        })],
    );
    assert_eq!(replies[0].1, Reply::MemoryRequirements(MemoryRequirements::default()));
}

#[test]
fn test_driver_failure_is_returned_as_result() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    h.driver
        .queue_result("vkCreateBuffer", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    let result = submit_result(&h.ctx, create_object(10, buffer_info(64)));
    assert_eq!(result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    assert!(!h.ctx.contains_object(10));

    // The id is still free for a retry.
    assert_eq!(submit_result(&h.ctx, create_object(10, buffer_info(64))), vk::Result::SUCCESS);
}

#[test]
fn test_void_calls_reply_none() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[create_object(20, command_pool_info()), allocate_command_buffers(20, vec![21])]);

    let replies = submit_ok(
        &h.ctx,
        &[
            Command::Record {
                command_buffer: 21,
                op: RecordedCommand::Dispatch(CmdDispatch {
                    group_count: [4, 1, 1],
                }),
            },
            Command::FreeCommandBuffers(FreePoolObjectsArgs {
                device: DEVICE,
                pool: 20,
                objects: vec![21, 0],
            }),
        ],
    );
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|(_, reply)| *reply == Reply::None));
    assert_eq!(h.driver.call_count("vkCmdDispatch"), 1);
    assert!(!h.ctx.contains_object(21));
}

#[test]
fn test_duplicate_id_is_fatal() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[create_object(10, buffer_info(64))]);

    match submit(&h.ctx, &[create_object(10, buffer_info(64))]) {
        Err(RendererError::SubmissionFailed(Fatal::DuplicateId(10))) => {}
        other => panic!("expected DuplicateId, got {:?}", other),
    }
    match submit(&h.ctx, &[create_object(0, buffer_info(64))]) {
        Err(RendererError::SubmissionFailed(Fatal::InvalidId)) => {}
        other => panic!("expected InvalidId, got {:?}", other),
    }
}

#[test]
fn test_wrong_kind_is_fatal() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[create_object(10, buffer_info(64))]);

    let bind = Command::BindImageMemory(BindMemoryArgs {
        device: DEVICE,
        object: 10,
        memory: 11,
        offset: 0,
    });
    match submit(&h.ctx, &[bind]) {
        Err(RendererError::SubmissionFailed(Fatal::TypeMismatch { id, expected, actual })) => {
            assert_eq!(id, 10);
            assert_eq!(expected, ObjectType::Image);
            assert_eq!(actual, ObjectType::Buffer);
        }
        other => panic!("expected TypeMismatch, got {:?}", other),
    }
}

#[test]
fn test_fatal_error_abandons_rest_of_buffer() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    let result = submit(
        &h.ctx,
        &[
            create_object(10, buffer_info(64)),
            create_object(11, buffer_info(64)),
            create_object(11, buffer_info(64)),
            create_object(12, buffer_info(64)),
        ],
    );
    match result {
        Err(RendererError::SubmissionFailed(Fatal::DuplicateId(11))) => {}
        other => panic!("expected DuplicateId, got {:?}", other),
    }
    // Earlier commands stay applied; later ones never ran.
    assert!(h.ctx.contains_object(10));
    assert!(h.ctx.contains_object(11));
    assert!(!h.ctx.contains_object(12));
    assert_eq!(h.driver.live_count(ObjectType::Buffer), 2);
}

#[test]
fn test_context_usable_after_fatal() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    match submit(&h.ctx, &[destroy_object(ObjectType::Buffer, 99)]) {
        Err(RendererError::SubmissionFailed(Fatal::UnknownId(99))) => {}
        other => panic!("expected UnknownId, got {:?}", other),
    }
    submit_ok(&h.ctx, &[create_object(10, buffer_info(64))]);
    assert!(h.ctx.contains_object(10));
}

#[test]
fn test_truncated_stream_is_fatal() {
    let h = harness(RendererConfig::default());
    let mut enc = CommandEncoder::new();
    enc.push_with_reply(&create_instance(INSTANCE, 0));
    let mut bytes = enc.finish();
    bytes.truncate(bytes.len() - 4);

    match h.ctx.submit_cmd(&bytes) {
        Err(RendererError::SubmissionFailed(Fatal::Decode(_))) => {}
        other => panic!("expected Decode, got {:?}", other),
    }
    assert_eq!(h.ctx.object_count(), 0);
}

#[test]
fn test_empty_stream_is_not_an_error() {
    let h = harness(RendererConfig::default());
    let replies = h.ctx.submit_cmd(&[]).expect("empty submission");
    assert!(replies.is_empty());
    let replies = h.ctx.submit_cmd(&[1, 2, 3]).expect("short tail");
    assert!(replies.is_empty());
}

#[test]
fn test_blocking_waits_are_fatal() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[create_object(30, fence_info())]);

    let wait = Command::WaitForFences(WaitForFencesArgs {
        device: DEVICE,
        fences: vec![30],
        wait_all: true,
        timeout: 1_000_000,
    });
    match submit(&h.ctx, &[wait]) {
        Err(RendererError::SubmissionFailed(Fatal::BlockingWait(Opcode::WaitForFences))) => {}
        other => panic!("expected BlockingWait, got {:?}", other),
    }
    match submit(&h.ctx, &[Command::DeviceWaitIdle(DeviceArgs { device: DEVICE })]) {
        Err(RendererError::SubmissionFailed(Fatal::BlockingWait(Opcode::DeviceWaitIdle))) => {}
        other => panic!("expected BlockingWait, got {:?}", other),
    }
    match submit(&h.ctx, &[Command::QueueWaitIdle(QueueArgs { queue: QUEUE })]) {
        Err(RendererError::SubmissionFailed(Fatal::BlockingWait(Opcode::QueueWaitIdle))) => {}
        other => panic!("expected BlockingWait, got {:?}", other),
    }
    assert_eq!(h.driver.call_count("vkDeviceWaitIdle"), 0);
}

#[test]
fn test_zero_timeout_wait_polls() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[create_object(30, fence_info()), create_object(31, fence_info())]);

    let poll = |wait_all| {
        Command::WaitForFences(WaitForFencesArgs {
            device: DEVICE,
            fences: vec![30, 31],
            wait_all,
            timeout: 0,
        })
    };
    assert_eq!(submit_result(&h.ctx, poll(true)), vk::Result::TIMEOUT);

    let submit_fence = Command::QueueSubmit(QueueSubmitArgs {
        queue: QUEUE,
        submits: Vec::new(),
        fence: Some(30),
    });
    assert_eq!(submit_result(&h.ctx, submit_fence), vk::Result::SUCCESS);
    h.driver.signal_all();

    assert_eq!(submit_result(&h.ctx, poll(false)), vk::Result::SUCCESS);
    assert_eq!(submit_result(&h.ctx, poll(true)), vk::Result::TIMEOUT);

    let status = Command::GetFenceStatus(DeviceObjectArgs {
        device: DEVICE,
        object: 30,
    });
    assert_eq!(submit_result(&h.ctx, status.clone()), vk::Result::SUCCESS);
    let reset = Command::ResetFences(FencesArgs {
        device: DEVICE,
        fences: vec![30],
    });
    assert_eq!(submit_result(&h.ctx, reset), vk::Result::SUCCESS);
    assert_eq!(submit_result(&h.ctx, status), vk::Result::NOT_READY);
}

#[test]
fn test_event_status_follows_set_and_reset() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(&h.ctx, &[create_object(40, event_info())]);

    let args = DeviceObjectArgs {
        device: DEVICE,
        object: 40,
    };
    assert_eq!(submit_result(&h.ctx, Command::GetEventStatus(args.clone())), vk::Result::EVENT_RESET);
    assert_eq!(submit_result(&h.ctx, Command::SetEvent(args.clone())), vk::Result::SUCCESS);
    assert_eq!(submit_result(&h.ctx, Command::GetEventStatus(args.clone())), vk::Result::EVENT_SET);
    assert_eq!(submit_result(&h.ctx, Command::ResetEvent(args.clone())), vk::Result::SUCCESS);
    assert_eq!(submit_result(&h.ctx, Command::GetEventStatus(args)), vk::Result::EVENT_RESET);
}

#[test]
fn test_queue_submit_resolves_command_buffers() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    submit_ok(
        &h.ctx,
        &[
            create_object(20, command_pool_info()),
            allocate_command_buffers(20, vec![21]),
            Command::BeginCommandBuffer(CommandBufferArgs {
                command_buffer: 21,
                flags: 0,
            }),
            Command::EndCommandBuffer(CommandBufferArgs {
                command_buffer: 21,
                flags: 0,
            }),
            Command::QueueSubmit(QueueSubmitArgs {
                queue: QUEUE,
                submits: vec![SubmitInfo {
                    wait_semaphores: Vec::new(),
                    wait_dst_stage_masks: Vec::new(),
                    command_buffers: vec![21],
                    signal_semaphores: Vec::new(),
                }],
                fence: None,
            }),
        ],
    );
    assert_eq!(h.driver.call_count("vkQueueSubmit"), 1);

    let bad = Command::QueueSubmit(QueueSubmitArgs {
        queue: QUEUE,
        submits: vec![SubmitInfo {
            wait_semaphores: Vec::new(),
            wait_dst_stage_masks: Vec::new(),
            command_buffers: vec![20],
            signal_semaphores: Vec::new(),
        }],
        fence: None,
    });
    match submit(&h.ctx, &[bad]) {
        Err(RendererError::SubmissionFailed(Fatal::TypeMismatch { id: 20, .. })) => {}
        other => panic!("expected TypeMismatch, got {:?}", other),
    }
}

#[test]
fn test_ignored_opcode_is_a_no_op() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    let replies = submit_ok(
        &h.ctx,
        &[Command::SetDebugUtilsObjectName(SetDebugUtilsObjectNameArgs {
            device: DEVICE,
            object_type: ObjectType::Device,
            object: DEVICE,
            name: "main device".to_string(),
        })],
    );
    assert_eq!(replies, vec![(Opcode::SetDebugUtilsObjectName, Reply::None)]);
}

// ── Physical devices and extensions ─────────────────────────

#[test]
fn test_enumeration_count_then_ids() {
    let h = harness(RendererConfig::default());
    submit_ok(&h.ctx, &[create_instance(INSTANCE, vk::API_VERSION_1_1)]);

    let replies = submit_ok(&h.ctx, &[enumerate_physical_devices(INSTANCE, Vec::new())]);
    match &replies[..] {
        [(_, Reply::PhysicalDeviceCount { count, .. })] => assert_eq!(*count, 1),
        other => panic!("expected PhysicalDeviceCount, got {:?}", other),
    }
    assert!(!h.ctx.contains_object(PHYSICAL_DEVICE));

    submit_ok(&h.ctx, &[enumerate_physical_devices(INSTANCE, vec![PHYSICAL_DEVICE])]);
    // Repeating the same ids is fine; changing them is not.
    submit_ok(&h.ctx, &[enumerate_physical_devices(INSTANCE, vec![PHYSICAL_DEVICE])]);
    match submit(&h.ctx, &[enumerate_physical_devices(INSTANCE, vec![9])]) {
        Err(RendererError::SubmissionFailed(Fatal::InvalidArgument(_))) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
    assert_eq!(h.driver.call_count("vkEnumeratePhysicalDevices"), 1);

    let replies = submit_ok(
        &h.ctx,
        &[Command::GetPhysicalDeviceProperties(PhysicalDeviceArgs {
            physical_device: PHYSICAL_DEVICE,
        })],
    );
    match &replies[..] {
        [(_, Reply::PhysicalDeviceProperties(props))] => {
            assert_eq!(props.api_version, vk::API_VERSION_1_1);
            assert_eq!(props.device_name, "vkr fake device");
        }
        other => panic!("expected PhysicalDeviceProperties, got {:?}", other),
    }
}

#[test]
fn test_extensions_filtered_and_clamped() {
    let h = harness(RendererConfig::default());
    submit_ok(
        &h.ctx,
        &[
            create_instance(INSTANCE, vk::API_VERSION_1_3),
            enumerate_physical_devices(INSTANCE, vec![PHYSICAL_DEVICE]),
        ],
    );

    let replies = submit_ok(
        &h.ctx,
        &[Command::EnumerateDeviceExtensionProperties(PhysicalDeviceArgs {
            physical_device: PHYSICAL_DEVICE,
        })],
    );
    let extensions = match &replies[..] {
        [(_, Reply::ExtensionProperties { extensions, .. })] => extensions.clone(),
        other => panic!("expected ExtensionProperties, got {:?}", other),
    };
    let names: Vec<&str> = extensions.iter().map(|e| e.extension_name.as_str()).collect();
    assert!(!names.contains(&"VK_FAKE_vendor_extension"));
    assert!(names.contains(&"VK_KHR_external_memory_fd"));
    let maintenance1 = extensions
        .iter()
        .find(|e| e.extension_name == "VK_KHR_maintenance1")
        .expect("maintenance1 advertised");
    assert_eq!(maintenance1.spec_version, 2);

    // Unadvertised extensions are refused before reaching the driver.
    let result = submit_result(&h.ctx, create_device(DEVICE, 1, &["VK_FAKE_vendor_extension"]));
    assert_eq!(result, vk::Result::ERROR_EXTENSION_NOT_PRESENT);
    assert_eq!(h.driver.call_count("vkCreateDevice"), 0);
    assert!(!h.ctx.contains_object(DEVICE));

    // Accepted devices get the export extensions appended.
    assert_eq!(
        submit_result(&h.ctx, create_device(DEVICE, 1, &["VK_KHR_maintenance1"])),
        vk::Result::SUCCESS
    );
    let enabled = h.driver.device_extensions();
    assert_eq!(
        enabled[0],
        vec![
            "VK_KHR_maintenance1".to_string(),
            "VK_KHR_external_memory".to_string(),
            "VK_KHR_external_memory_fd".to_string(),
            "VK_EXT_external_memory_dma_buf".to_string(),
        ]
    );
}

#[test]
fn test_denied_extension_hidden() {
    let mut config = RendererConfig::default();
    config.extensions.deny = vec!["VK_KHR_maintenance1".to_string()];
    let h = harness(config);
    submit_ok(
        &h.ctx,
        &[
            create_instance(INSTANCE, vk::API_VERSION_1_3),
            enumerate_physical_devices(INSTANCE, vec![PHYSICAL_DEVICE]),
        ],
    );
    let result = submit_result(&h.ctx, create_device(DEVICE, 1, &["VK_KHR_maintenance1"]));
    assert_eq!(result, vk::Result::ERROR_EXTENSION_NOT_PRESENT);
}

#[test]
fn test_device_without_export_support() {
    let mut info = PhysicalDeviceInfo::default();
    info.remove_extension("VK_KHR_external_memory_fd");
    let h = harness_with_driver(RendererConfig::default(), FakeDriver::with_info(info));
    setup_device(&h.ctx, 1);

    assert_eq!(h.driver.device_extensions()[0], Vec::<String>::new());
}

#[test]
fn test_queue_adoption() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 2);

    // Fetching again under the same id is a no-op.
    submit_ok(&h.ctx, &[get_device_queue(DEVICE, 0, QUEUE)]);
    match submit(&h.ctx, &[get_device_queue(DEVICE, 0, 50)]) {
        Err(RendererError::SubmissionFailed(Fatal::InvalidArgument(_))) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
    match submit(&h.ctx, &[get_device_queue(DEVICE, 5, 51)]) {
        Err(RendererError::SubmissionFailed(Fatal::InvalidArgument(_))) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
    assert_eq!(h.ctx.object_type(SECOND_QUEUE), Some(ObjectType::Queue));
}
