//! Fence submission and retirement tests, in polling, threaded and async
//! callback modes.
//!
//! Run with: cargo test -p vkr-renderer --test sync_test

mod common;

use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use common::*;
use vkr_core::RendererConfig;
use vkr_protocol::commands::DeviceArgs;
use vkr_protocol::Command;
use vkr_renderer::{FenceFlags, RendererError, CPU_TIMELINE};

const WAIT: Duration = Duration::from_secs(5);

fn wait_for_retirements(transport: &RecordingTransport, count: usize) -> Vec<(u64, u64)> {
    let deadline = Instant::now() + WAIT;
    loop {
        let retired = transport.retired();
        if retired.len() >= count || Instant::now() >= deadline {
            return retired;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

// ── Polling mode ────────────────────────────────────────────

#[test]
fn test_polling_retires_signaled_prefix_in_order() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    for cookie in [1, 2, 3] {
        h.ctx.submit_fence(FenceFlags::empty(), QUEUE, cookie).expect("submit fence");
    }
    assert_eq!(h.driver.pending_submissions(), 3);

    h.driver.signal_submissions(2);
    h.ctx.retire_fences();
    assert_eq!(h.transport.retired(), vec![(QUEUE, 1), (QUEUE, 2)]);
    assert_eq!(h.ctx.queue_sync_counts(QUEUE), Some((1, 0)));
    assert_eq!(h.ctx.busy_queue_count(), 1);

    // Nothing new: nothing reported.
    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1, 2]);

    h.driver.signal_all();
    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1, 2, 3]);
    assert_eq!(h.ctx.queue_sync_counts(QUEUE), Some((0, 0)));
    assert_eq!(h.ctx.busy_queue_count(), 0);
    assert!(h.transport.context_ids().iter().all(|id| *id == CTX_ID));
}

#[test]
fn test_queues_retire_independently() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 2);
    h.ctx.submit_fence(FenceFlags::empty(), SECOND_QUEUE, 20).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 10).expect("submit fence");
    assert_eq!(h.ctx.busy_queue_count(), 2);

    // Only the oldest submission, the one on the second queue, completes.
    h.driver.signal_submissions(1);
    h.ctx.retire_fences();
    assert_eq!(h.transport.retired(), vec![(SECOND_QUEUE, 20)]);
    assert_eq!(h.ctx.queue_sync_counts(QUEUE), Some((1, 0)));
    assert_eq!(h.ctx.busy_queue_count(), 1);
}

#[test]
fn test_mergeable_fence_dropped_behind_newer_one() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 2).expect("submit fence");

    h.driver.signal_all();
    h.ctx.retire_fences();

    assert_eq!(h.transport.cookies(), vec![2]);
    // The merged fence still went back to the pool.
    assert_eq!(h.ctx.free_fence_count(DEVICE), Some(2));
}

#[test]
fn test_non_mergeable_fences_always_reported() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 2).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 3).expect("submit fence");

    h.driver.signal_all();
    h.ctx.retire_fences();

    assert_eq!(h.transport.cookies(), vec![1, 3]);
}

#[test]
fn test_mergeable_fence_alone_is_reported() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 1).expect("submit fence");
    h.driver.signal_all();
    h.ctx.retire_fences();

    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 2).expect("submit fence");
    h.driver.signal_all();
    h.ctx.retire_fences();

    assert_eq!(h.transport.cookies(), vec![1, 2]);
}

#[test]
fn test_fences_recycled_through_pool() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 2).expect("submit fence");
    h.driver.signal_all();
    h.ctx.retire_fences();
    assert_eq!(h.ctx.free_fence_count(DEVICE), Some(2));
    assert_eq!(h.driver.call_count("vkCreateFence"), 2);

    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 3).expect("submit fence");
    assert_eq!(h.ctx.free_fence_count(DEVICE), Some(1));
    assert_eq!(h.driver.call_count("vkCreateFence"), 2);
    assert_eq!(h.driver.call_count("vkResetFences"), 1);

    // A reused fence starts unsignaled.
    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1, 2]);
    h.driver.signal_all();
    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1, 2, 3]);
}

#[test]
fn test_cpu_timeline_retires_immediately() {
    let h = harness(RendererConfig::default());
    h.ctx.submit_fence(FenceFlags::empty(), CPU_TIMELINE, 42).expect("cpu fence");

    assert_eq!(h.transport.retired(), vec![(CPU_TIMELINE, 42)]);
    assert_eq!(h.driver.call_count("vkQueueSubmit"), 0);
    assert_eq!(h.ctx.busy_queue_count(), 0);
}

#[test]
fn test_unknown_queue_rejected() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);

    match h.ctx.submit_fence(FenceFlags::empty(), 99, 1) {
        Err(RendererError::UnknownQueue(id)) => assert_eq!(id, 99),
        other => panic!("expected UnknownQueue, got {:?}", other),
    }
    // An id of another kind is no queue either.
    match h.ctx.submit_fence(FenceFlags::empty(), DEVICE, 1) {
        Err(RendererError::UnknownQueue(id)) => assert_eq!(id, DEVICE),
        other => panic!("expected UnknownQueue, got {:?}", other),
    }
    assert_eq!(h.driver.call_count("vkQueueSubmit"), 0);
}

#[test]
fn test_device_lost_submission_still_retires() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.driver.queue_result("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST);

    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 7).expect("lost submission is tracked");
    assert_eq!(h.driver.pending_submissions(), 0);

    h.ctx.retire_fences();
    assert_eq!(h.transport.retired(), vec![(QUEUE, 7)]);
    assert_eq!(h.ctx.busy_queue_count(), 0);
}

#[test]
fn test_device_lost_does_not_block_later_fences() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.driver.queue_result("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST);
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 2).expect("submit fence");

    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1]);

    h.driver.signal_all();
    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1, 2]);
}

#[test]
fn test_failed_submission_releases_fence() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.driver.queue_result("vkQueueSubmit", vk::Result::ERROR_OUT_OF_HOST_MEMORY);

    match h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1) {
        Err(RendererError::OutOfMemory) => {}
        other => panic!("expected OutOfMemory, got {:?}", other),
    }
    assert_eq!(h.ctx.free_fence_count(DEVICE), Some(1));
    assert_eq!(h.ctx.queue_sync_counts(QUEUE), Some((0, 0)));
    assert_eq!(h.ctx.busy_queue_count(), 0);

    h.ctx.retire_fences();
    assert!(h.transport.retired().is_empty());
}

#[test]
fn test_destroyed_queue_reports_outstanding_fences() {
    let h = harness(RendererConfig::default());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 2).expect("submit fence");

    submit(&h.ctx, &[Command::DestroyDevice(DeviceArgs { device: DEVICE })]).expect("destroy device");
    assert_eq!(h.ctx.busy_queue_count(), 0);
    assert!(h.transport.retired().is_empty());

    h.ctx.retire_fences();
    assert_eq!(h.transport.retired(), vec![(QUEUE, 1), (QUEUE, 2)]);
    assert_eq!(h.driver.live_count(vkr_protocol::ObjectType::Fence), 0);
}

// ── Threaded mode ───────────────────────────────────────────

#[test]
fn test_threaded_waiter_rings_retire_signal() {
    let h = harness(threaded_config());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1).expect("submit fence");

    h.driver.signal_all();
    h.ctx.retire_signal().recv_timeout(WAIT).expect("retire signal");
    // Signaled syncs wait for the dispatch thread to report them.
    assert!(h.transport.retired().is_empty());

    h.ctx.retire_fences();
    assert_eq!(h.transport.retired(), vec![(QUEUE, 1)]);
    assert_eq!(h.ctx.busy_queue_count(), 0);
}

#[test]
fn test_threaded_waiter_keeps_unsignaled_fences_pending() {
    let h = harness(threaded_config());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 2).expect("submit fence");

    h.driver.signal_submissions(1);
    h.ctx.retire_signal().recv_timeout(WAIT).expect("retire signal");
    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1]);
    assert_eq!(h.ctx.queue_sync_counts(QUEUE), Some((1, 0)));

    h.driver.signal_all();
    h.ctx.retire_signal().recv_timeout(WAIT).expect("retire signal");
    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![1, 2]);
}

#[test]
fn test_threaded_mergeable_fence_dropped_behind_newer_one() {
    let h = harness(threaded_config());
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::MERGEABLE, QUEUE, 2).expect("submit fence");

    h.driver.signal_all();
    let deadline = Instant::now() + WAIT;
    while h.ctx.queue_sync_counts(QUEUE) != Some((0, 2)) {
        assert!(Instant::now() < deadline, "waiter never signaled both syncs");
        thread::sleep(Duration::from_millis(1));
    }

    h.ctx.retire_fences();
    assert_eq!(h.transport.cookies(), vec![2]);
    assert_eq!(h.ctx.free_fence_count(DEVICE), Some(2));
    assert_eq!(h.ctx.busy_queue_count(), 0);
}

#[test]
fn test_threaded_idle_queue_holds_no_syncs() {
    const ROUNDS: u64 = 2000;
    let h = harness(threaded_config());
    setup_device(&h.ctx, 1);
    h.driver.set_auto_signal(true);

    for cookie in 1..=ROUNDS {
        h.ctx.submit_fence(FenceFlags::empty(), QUEUE, cookie).expect("submit fence");
        h.ctx.retire_fences();
        // Once the queue leaves the busy set nothing may be left behind in
        // it, since no later retirement pass would look there.
        if h.ctx.busy_queue_count() == 0 {
            assert_eq!(h.ctx.queue_sync_counts(QUEUE), Some((0, 0)), "stranded sync at cookie {}", cookie);
        }
    }

    let deadline = Instant::now() + WAIT;
    while h.transport.cookies().len() < ROUNDS as usize {
        assert!(Instant::now() < deadline, "only {} of {} fences retired", h.transport.cookies().len(), ROUNDS);
        let _ = h.ctx.retire_signal().recv_timeout(Duration::from_millis(10));
        h.ctx.retire_fences();
    }
    assert_eq!(h.transport.cookies(), (1..=ROUNDS).collect::<Vec<_>>());
    assert_eq!(h.ctx.busy_queue_count(), 0);
}

#[test]
fn test_async_callback_reports_from_waiter_thread() {
    let mut config = threaded_config();
    config.sync.async_fence_callback = true;
    let h = harness(config);
    setup_device(&h.ctx, 1);
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 1).expect("submit fence");
    h.ctx.submit_fence(FenceFlags::empty(), QUEUE, 2).expect("submit fence");

    h.driver.signal_all();
    let retired = wait_for_retirements(&h.transport, 2);
    assert_eq!(retired, vec![(QUEUE, 1), (QUEUE, 2)]);
    assert!(h.ctx.retire_signal().is_empty());
}

#[test]
fn test_async_callback_requires_threads() {
    vkr_common::logging::try_init_test_logging();
    let mut config = RendererConfig::default();
    config.sync.async_fence_callback = true;
    let driver = std::sync::Arc::new(vkr_driver::fake::FakeDriver::new());
    let transport = std::sync::Arc::new(RecordingTransport::default());

    match vkr_renderer::Renderer::new(config, driver, transport) {
        Err(RendererError::Config(_)) => {}
        Err(other) => panic!("expected Config, got {:?}", other),
        Ok(_) => panic!("expected Config, got a renderer"),
    }
}
