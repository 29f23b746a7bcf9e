//! One guest context: its object table, queues and resource attachments.
//!
//! Every entry point takes the context lock for its whole duration, so a
//! context processes one submission at a time. Queue waiter threads only
//! touch their own queue.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::OwnedFd;
use std::sync::Arc;

use ash::vk;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};
use vkr_core::RendererConfig;
use vkr_driver::{Driver, ExternalHandleType, FenceWaiter, HandleMap};
use vkr_protocol::wire::WireWriter;
use vkr_protocol::{Decoder, ObjectId, ObjectType, ResourceId};

use crate::dispatch::{destroy_instance, Dispatcher};
use crate::error::{Fatal, RendererError};
use crate::memory::{self, BlobFlags, ContextBlob};
use crate::queue::{report_batch, FenceFlags, QueueSync, Waiters};
use crate::state::ContextState;
use crate::transport::HostTransport;

/// Guest queue id of the CPU timeline. Fences on it retire at once.
pub const CPU_TIMELINE: u64 = 0;

pub struct Context {
    id: u32,
    config: Arc<RendererConfig>,
    driver: Arc<dyn Driver>,
    waiters: Waiters,
    state: Mutex<ContextState>,
    retire_rx: Receiver<()>,
}

impl Context {
    pub fn new(
        id: u32,
        config: Arc<RendererConfig>,
        driver: Arc<dyn Driver>,
        fence_waiter: Arc<dyn FenceWaiter>,
        transport: Arc<dyn HostTransport>,
    ) -> Self {
        let (retire_tx, retire_rx) = bounded(1);
        let waiters = Waiters::new(fence_waiter, &config.sync, retire_tx, id, transport);
        info!(
            ctx_id = id,
            thread_sync = config.sync.thread_sync,
            async_fence_callback = config.sync.async_fence_callback,
            "context created"
        );
        Self {
            id,
            config,
            driver,
            waiters,
            state: Mutex::new(ContextState::default()),
            retire_rx,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    // ── Command stream ──────────────────────────────────────

    /// Decode and dispatch every command in `buf`.
    ///
    /// Returns the reply records of commands that asked for one. A fatal
    /// error abandons the rest of the buffer; effects of commands already
    /// dispatched stay in place.
    pub fn submit_cmd(&self, buf: &[u8]) -> Result<Vec<u8>, RendererError> {
        let mut state = self.state.lock();
        let mut dispatcher = Dispatcher {
            ctx_id: self.id,
            config: &self.config,
            driver: self.driver.as_ref(),
            waiters: &self.waiters,
            state: &mut *state,
        };

        let mut decoder = Decoder::new(buf);
        let mut replies = WireWriter::new();
        let mut dispatched = 0usize;
        while let Some(decoded) = decoder.decode_command() {
            let wants_reply = decoded.wants_reply();
            let opcode = decoded.command.opcode();
            match dispatcher.dispatch(decoded.command) {
                Ok(reply) => {
                    if wants_reply {
                        reply.encode(opcode, &mut replies);
                    }
                }
                Err(fatal) => {
                    error!(ctx_id = self.id, %opcode, dispatched, "submission aborted: {}", fatal);
                    return Err(fatal.into());
                }
            }
            dispatched += 1;
        }

        if let Some(err) = decoder.error() {
            error!(
                ctx_id = self.id,
                offset = decoder.position(),
                dispatched,
                "submission aborted: {}",
                err
            );
            return Err(Fatal::Decode(err.clone()).into());
        }
        trace!(ctx_id = self.id, dispatched, len = buf.len(), "submission complete");
        Ok(replies.into_bytes())
    }

    // ── Fences ──────────────────────────────────────────────

    /// Track completion of all work submitted so far on `queue_id`.
    pub fn submit_fence(&self, flags: FenceFlags, queue_id: u64, fence_cookie: u64) -> Result<(), RendererError> {
        if queue_id == CPU_TIMELINE {
            debug!(ctx_id = self.id, cookie = fence_cookie, "cpu timeline fence retired");
            self.waiters
                .transport()
                .fence_retired(self.id, queue_id, fence_cookie);
            return Ok(());
        }

        let mut state = self.state.lock();
        let queue = state
            .objects
            .queue(queue_id)
            .map(Arc::clone)
            .map_err(|_| RendererError::UnknownQueue(queue_id))?;
        let pool = queue.sync_pool();
        let fence = pool.acquire(self.driver.as_ref())?;

        let submitted = self.driver.queue_submit(
            queue.host_device,
            queue.handle,
            &[],
            &HandleMap::new(),
            fence,
        );
        let device_lost = match submitted {
            Ok(()) => false,
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                warn!(ctx_id = self.id, queue_id, cookie = fence_cookie, "device lost on fence submission");
                true
            }
            Err(err) => {
                pool.release(fence);
                return Err(err.into());
            }
        };

        queue.push_pending(QueueSync {
            fence,
            flags,
            queue_id,
            fence_cookie,
            device_lost,
        });
        state.busy_queues.insert(queue_id, queue);
        Ok(())
    }

    /// Report every fence found complete since the last call.
    pub fn retire_fences(&self) {
        let mut state = self.state.lock();
        let transport = self.waiters.transport();

        for sync in std::mem::take(&mut state.signaled_syncs) {
            debug!(ctx_id = self.id, queue_id = sync.queue_id, cookie = sync.fence_cookie, "fence retired");
            transport.fence_retired(self.id, sync.queue_id, sync.fence_cookie);
        }

        let driver = self.driver.as_ref();
        state.busy_queues.retain(|_, queue| {
            let batch = queue.take_signaled(driver);
            if !batch.is_empty() {
                report_batch(batch, queue.sync_pool(), transport, self.id);
            }
            !queue.is_idle()
        });
    }

    /// Rung by queue waiter threads when a fence signals. Only meaningful in
    /// threaded mode without async callbacks.
    pub fn retire_signal(&self) -> &Receiver<()> {
        &self.retire_rx
    }

    // ── Resources ───────────────────────────────────────────

    pub fn export_blob(
        &self,
        resource_id: ResourceId,
        memory_id: ObjectId,
        size: u64,
        flags: BlobFlags,
    ) -> Result<ContextBlob, RendererError> {
        let mut state = self.state.lock();
        memory::export(self.driver.as_ref(), &mut state, resource_id, memory_id, size, flags)
    }

    pub fn import_resource(&self, resource_id: ResourceId) -> Result<(ExternalHandleType, OwnedFd), RendererError> {
        let state = self.state.lock();
        memory::import(self.driver.as_ref(), &state, resource_id)
    }

    pub fn attach_resource(&self, resource_id: ResourceId) {
        memory::attach(&mut self.state.lock(), resource_id);
    }

    pub fn detach_resource(&self, resource_id: ResourceId) -> Result<(), RendererError> {
        memory::detach(&mut self.state.lock(), resource_id)
    }

    pub fn transfer_to_host(
        &self,
        resource_id: ResourceId,
        offset: u64,
        iovecs: &[IoSlice<'_>],
    ) -> Result<(), RendererError> {
        let state = self.state.lock();
        memory::transfer_to_host(self.driver.as_ref(), &state, resource_id, offset, iovecs)
    }

    pub fn transfer_from_host(
        &self,
        resource_id: ResourceId,
        offset: u64,
        iovecs: &mut [IoSliceMut<'_>],
    ) -> Result<(), RendererError> {
        let state = self.state.lock();
        memory::transfer_from_host(self.driver.as_ref(), &state, resource_id, offset, iovecs)
    }

    // ── Introspection ───────────────────────────────────────

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.state.lock().objects.contains(id)
    }

    pub fn object_type(&self, id: ObjectId) -> Option<ObjectType> {
        self.state
            .lock()
            .objects
            .get(id)
            .map(|object| object.object_type())
    }

    /// Pending and signaled-but-unreported syncs on a queue.
    pub fn queue_sync_counts(&self, queue_id: ObjectId) -> Option<(usize, usize)> {
        let state = self.state.lock();
        let queue = state.objects.queue(queue_id).ok()?;
        Some((queue.pending_len(), queue.signaled_len()))
    }

    /// Free fences in the pool of a device.
    pub fn free_fence_count(&self, device_id: ObjectId) -> Option<usize> {
        let state = self.state.lock();
        let device = state.objects.device(device_id).ok()?;
        Some(device.sync_pool.len())
    }

    pub fn busy_queue_count(&self) -> usize {
        self.state.lock().busy_queues.len()
    }

    pub fn attachment_memories(&self, resource_id: ResourceId) -> Option<Vec<ObjectId>> {
        let state = self.state.lock();
        state
            .resources
            .get(resource_id)
            .map(|attachment| attachment.memories.clone())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for instance in state.objects.ids_of_type(ObjectType::Instance) {
            if let Err(err) = destroy_instance(self.driver.as_ref(), &self.waiters, state, instance) {
                warn!(ctx_id = self.id, id = instance, "instance teardown failed: {}", err);
            }
        }
        info!(ctx_id = self.id, leaked = state.objects.len(), "context destroyed");
    }
}
