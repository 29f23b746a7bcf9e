//! Process-wide registry of guest contexts.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};
use vkr_core::RendererConfig;
use vkr_driver::{AshDriver, Driver, FenceWaiter};

use crate::context::Context;
use crate::error::RendererError;
use crate::queue::FenceFlags;
use crate::transport::HostTransport;

pub struct Renderer {
    config: Arc<RendererConfig>,
    driver: Arc<dyn Driver>,
    fence_waiter: Arc<dyn FenceWaiter>,
    transport: Arc<dyn HostTransport>,
    contexts: DashMap<u32, Arc<Context>>,
}

impl Renderer {
    /// Build a renderer over `driver`. The configuration is validated once
    /// here and shared by every context.
    pub fn new<D>(config: RendererConfig, driver: Arc<D>, transport: Arc<dyn HostTransport>) -> Result<Self, RendererError>
    where
        D: Driver + FenceWaiter + 'static,
    {
        config.validate()?;
        info!(
            max_api_version = %config.max_api_version,
            thread_sync = config.sync.thread_sync,
            "renderer initialized"
        );
        Ok(Self {
            config: Arc::new(config),
            driver: Arc::clone(&driver) as Arc<dyn Driver>,
            fence_waiter: driver as Arc<dyn FenceWaiter>,
            transport,
            contexts: DashMap::new(),
        })
    }

    /// Renderer over the system Vulkan loader.
    pub fn with_ash(config: RendererConfig, transport: Arc<dyn HostTransport>) -> Result<Self, RendererError> {
        let driver = Arc::new(AshDriver::load()?);
        Self::new(config, driver, transport)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn create_context(&self, ctx_id: u32) -> Result<Arc<Context>, RendererError> {
        match self.contexts.entry(ctx_id) {
            Entry::Occupied(_) => Err(RendererError::DuplicateContext(ctx_id)),
            Entry::Vacant(slot) => {
                let context = Arc::new(Context::new(
                    ctx_id,
                    Arc::clone(&self.config),
                    Arc::clone(&self.driver),
                    Arc::clone(&self.fence_waiter),
                    Arc::clone(&self.transport),
                ));
                slot.insert(Arc::clone(&context));
                Ok(context)
            }
        }
    }

    /// Unregister a context. Its objects are torn down once the last
    /// reference is dropped.
    pub fn destroy_context(&self, ctx_id: u32) -> Result<(), RendererError> {
        match self.contexts.remove(&ctx_id) {
            Some((_, context)) => {
                if Arc::strong_count(&context) > 1 {
                    warn!(ctx_id, "context destroyed while still referenced");
                }
                Ok(())
            }
            None => Err(RendererError::UnknownContext(ctx_id)),
        }
    }

    pub fn context(&self, ctx_id: u32) -> Result<Arc<Context>, RendererError> {
        self.contexts
            .get(&ctx_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RendererError::UnknownContext(ctx_id))
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    // ── Per-context shortcuts ───────────────────────────────

    pub fn submit_cmd(&self, ctx_id: u32, buf: &[u8]) -> Result<Vec<u8>, RendererError> {
        self.context(ctx_id)?.submit_cmd(buf)
    }

    pub fn submit_fence(
        &self,
        ctx_id: u32,
        flags: FenceFlags,
        queue_id: u64,
        fence_cookie: u64,
    ) -> Result<(), RendererError> {
        self.context(ctx_id)?.submit_fence(flags, queue_id, fence_cookie)
    }

    pub fn retire_fences(&self, ctx_id: u32) -> Result<(), RendererError> {
        self.context(ctx_id)?.retire_fences();
        Ok(())
    }
}
