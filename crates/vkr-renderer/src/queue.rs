//! Queues and the fences submitted on them.
//!
//! A [`QueueSync`] moves between the device's [`SyncPool`], the queue's
//! `pending` list and its `signaled` list. In polling mode the dispatch
//! thread moves syncs from `pending` itself; in threaded mode each queue has
//! a waiter thread that does it and rings the context's retire notifier.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use ash::vk;
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};
use vkr_driver::{Driver, FenceWaiter, HostHandle};
use vkr_protocol::ObjectId;

use crate::device::SyncPool;
use crate::transport::HostTransport;

bitflags::bitflags! {
    /// Flags passed with `Context::submit_fence`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FenceFlags: u32 {
        /// May be dropped silently when a later fence on the same queue
        /// retires in the same pass.
        const MERGEABLE = 0b0000_0001;
    }
}

/// One host fence plus the guest's correlation data.
#[derive(Debug)]
pub struct QueueSync {
    pub fence: vk::Fence,
    pub flags: FenceFlags,
    pub queue_id: u64,
    pub fence_cookie: u64,
    /// Submission hit `ERROR_DEVICE_LOST`; the fence will never signal.
    pub device_lost: bool,
}

/// Correlation data of a sync whose fence is already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetiredSync {
    pub queue_id: u64,
    pub fence_cookie: u64,
}

#[derive(Default)]
struct QueueSyncs {
    pending: VecDeque<QueueSync>,
    signaled: Vec<QueueSync>,
    join: bool,
}

pub struct Queue {
    pub handle: vk::Queue,
    /// Owning device id.
    pub device: ObjectId,
    pub host_device: vk::Device,
    pub family: u32,
    pub index: u32,
    pub flags: u32,
    guest_id: OnceLock<ObjectId>,
    sync_pool: Arc<SyncPool>,
    syncs: Mutex<QueueSyncs>,
    cond: Condvar,
    waiter: Mutex<Option<JoinHandle<()>>>,
}

impl Queue {
    pub fn new(
        handle: vk::Queue,
        device: ObjectId,
        host_device: vk::Device,
        family: u32,
        index: u32,
        flags: u32,
        sync_pool: Arc<SyncPool>,
    ) -> Self {
        Self {
            handle,
            device,
            host_device,
            family,
            index,
            flags,
            guest_id: OnceLock::new(),
            sync_pool,
            syncs: Mutex::new(QueueSyncs::default()),
            cond: Condvar::new(),
            waiter: Mutex::new(None),
        }
    }

    pub fn guest_id(&self) -> Option<ObjectId> {
        self.guest_id.get().copied()
    }

    /// Bind the queue to the guest id it is first fetched under. Returns
    /// false if it already has a different id.
    pub fn adopt(&self, id: ObjectId) -> bool {
        *self.guest_id.get_or_init(|| id) == id
    }

    pub fn sync_pool(&self) -> &Arc<SyncPool> {
        &self.sync_pool
    }

    /// Queue a submitted sync and wake the waiter.
    pub fn push_pending(&self, sync: QueueSync) {
        trace!(queue_id = sync.queue_id, cookie = sync.fence_cookie, "sync pending");
        self.syncs.lock().pending.push_back(sync);
        self.cond.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.syncs.lock().pending.len()
    }

    pub fn signaled_len(&self) -> usize {
        self.syncs.lock().signaled.len()
    }

    /// No sync is waiting to be reported.
    pub fn is_idle(&self) -> bool {
        let syncs = self.syncs.lock();
        syncs.pending.is_empty() && syncs.signaled.is_empty()
    }

    /// Syncs found signaled since the last call, oldest first.
    ///
    /// Without a waiter thread the pending list is polled here, stopping at
    /// the first fence that is not yet signaled.
    pub fn take_signaled(&self, driver: &dyn Driver) -> Vec<QueueSync> {
        let mut syncs = self.syncs.lock();
        let mut batch = std::mem::take(&mut syncs.signaled);
        if self.waiter.lock().is_some() {
            return batch;
        }

        while let Some(front) = syncs.pending.front_mut() {
            if !front.device_lost {
                match driver.get_fence_status(self.host_device, front.fence) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        warn!(queue_id = front.queue_id, "fence status failed: {:?}", err);
                        front.device_lost = true;
                    }
                }
            }
            if let Some(sync) = syncs.pending.pop_front() {
                batch.push(sync);
            }
        }
        batch
    }

    /// Stop the waiter thread and hand back every outstanding sync.
    pub fn shutdown(&self) -> Vec<QueueSync> {
        self.syncs.lock().join = true;
        self.cond.notify_all();
        if let Some(handle) = self.waiter.lock().take() {
            if handle.join().is_err() {
                warn!(family = self.family, index = self.index, "queue waiter thread panicked");
            }
        }

        let mut syncs = self.syncs.lock();
        let mut outstanding = std::mem::take(&mut syncs.signaled);
        outstanding.extend(syncs.pending.drain(..));
        outstanding
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("device", &self.device)
            .field("family", &self.family)
            .field("index", &self.index)
            .field("guest_id", &self.guest_id())
            .finish()
    }
}

// ── Reporting ───────────────────────────────────────────

/// Report one retirement batch for a queue, oldest first.
///
/// A mergeable sync is dropped silently unless it is the newest in the
/// batch. Every fence goes back to the pool.
pub fn report_batch(batch: Vec<QueueSync>, pool: &SyncPool, transport: &dyn HostTransport, ctx_id: u32) {
    let last = batch.len().saturating_sub(1);
    for (i, sync) in batch.into_iter().enumerate() {
        if i == last || !sync.flags.contains(FenceFlags::MERGEABLE) {
            debug!(ctx_id, queue_id = sync.queue_id, cookie = sync.fence_cookie, "fence retired");
            transport.fence_retired(ctx_id, sync.queue_id, sync.fence_cookie);
        } else {
            trace!(ctx_id, queue_id = sync.queue_id, cookie = sync.fence_cookie, "fence merged");
        }
        pool.release(sync.fence);
    }
}

// ── Waiter threads ──────────────────────────────────────

/// How fence completion is observed for one context.
pub struct Waiters {
    fence_waiter: Arc<dyn FenceWaiter>,
    threaded: bool,
    async_callback: bool,
    timeout: Duration,
    notify: Sender<()>,
    ctx_id: u32,
    transport: Arc<dyn HostTransport>,
}

impl Waiters {
    pub fn new(
        fence_waiter: Arc<dyn FenceWaiter>,
        sync: &vkr_core::config::SyncConfig,
        notify: Sender<()>,
        ctx_id: u32,
        transport: Arc<dyn HostTransport>,
    ) -> Self {
        Self {
            fence_waiter,
            threaded: sync.thread_sync,
            async_callback: sync.async_fence_callback,
            timeout: sync.waiter_timeout(),
            notify,
            ctx_id,
            transport,
        }
    }

    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    pub fn is_async(&self) -> bool {
        self.async_callback
    }

    pub fn ctx_id(&self) -> u32 {
        self.ctx_id
    }

    pub fn transport(&self) -> &dyn HostTransport {
        self.transport.as_ref()
    }

    /// Spawn the waiter thread for `queue`. A no-op in polling mode.
    pub fn start(&self, queue: &Arc<Queue>) -> std::io::Result<()> {
        if !self.threaded {
            return Ok(());
        }
        let worker = WaiterThread {
            queue: Arc::clone(queue),
            fence_waiter: Arc::clone(&self.fence_waiter),
            async_callback: self.async_callback,
            timeout: self.timeout,
            notify: self.notify.clone(),
            ctx_id: self.ctx_id,
            transport: Arc::clone(&self.transport),
        };
        let handle = std::thread::Builder::new()
            .name(format!("vkr-queue-{}-{}.{}", self.ctx_id, queue.family, queue.index))
            .spawn(move || worker.run())?;
        *queue.waiter.lock() = Some(handle);
        Ok(())
    }

    /// Wait for the device to finish all work. Failure is logged; teardown
    /// goes on regardless.
    pub fn idle_device(&self, device: vk::Device) {
        if let Err(err) = self.fence_waiter.device_wait_idle(device) {
            warn!(ctx_id = self.ctx_id, "device wait idle failed: {:?}", err);
        }
    }
}

struct WaiterThread {
    queue: Arc<Queue>,
    fence_waiter: Arc<dyn FenceWaiter>,
    async_callback: bool,
    timeout: Duration,
    notify: Sender<()>,
    ctx_id: u32,
    transport: Arc<dyn HostTransport>,
}

impl WaiterThread {
    fn run(self) {
        debug!(ctx_id = self.ctx_id, family = self.queue.family, index = self.queue.index, "queue waiter started");
        while let Some((fence, device_lost)) = self.next_pending() {
            if !device_lost && !self.wait(fence) {
                continue;
            }

            if self.async_callback {
                let Some(sync) = self.queue.syncs.lock().pending.pop_front() else {
                    continue;
                };
                debug!(ctx_id = self.ctx_id, queue_id = sync.queue_id, cookie = sync.fence_cookie, "fence retired");
                self.transport
                    .fence_retired(self.ctx_id, sync.queue_id, sync.fence_cookie);
                self.queue.sync_pool.release(sync.fence);
            } else {
                // The sync must never be outside both lists while the queue
                // lock is free, or retirement would see an idle queue.
                {
                    let mut syncs = self.queue.syncs.lock();
                    let Some(sync) = syncs.pending.pop_front() else {
                        continue;
                    };
                    syncs.signaled.push(sync);
                }
                // A full channel already means "something to retire".
                let _ = self.notify.try_send(());
            }
        }
        debug!(ctx_id = self.ctx_id, family = self.queue.family, index = self.queue.index, "queue waiter stopped");
    }

    /// Block until there is a pending sync or the queue shuts down.
    fn next_pending(&self) -> Option<(vk::Fence, bool)> {
        let mut syncs = self.queue.syncs.lock();
        loop {
            if syncs.join {
                return None;
            }
            if let Some(front) = syncs.pending.front() {
                return Some((front.fence, front.device_lost));
            }
            self.queue.cond.wait(&mut syncs);
        }
    }

    /// True once `fence` is done, either signaled or lost.
    fn wait(&self, fence: vk::Fence) -> bool {
        match self
            .fence_waiter
            .wait_for_fence(self.queue.host_device, fence, self.timeout)
        {
            Ok(signaled) => signaled,
            Err(err) => {
                warn!(ctx_id = self.ctx_id, "fence wait failed: {:?}", err);
                if let Some(front) = self.queue.syncs.lock().pending.front_mut() {
                    front.device_lost = true;
                }
                true
            }
        }
    }
}

/// Destroy the fences of syncs whose queue is gone.
pub(crate) fn destroy_sync_fences(driver: &dyn Driver, device: vk::Device, syncs: &[QueueSync]) {
    for sync in syncs {
        driver.destroy_object(device, HostHandle::Fence(sync.fence));
    }
}
