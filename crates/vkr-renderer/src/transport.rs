//! Callbacks into the embedding host's resource transport.

/// Implemented by the host transport layer.
pub trait HostTransport: Send + Sync {
    /// A fence submitted with `Context::submit_fence` has completed.
    ///
    /// May be called from a queue waiter thread when asynchronous fence
    /// callbacks are enabled.
    fn fence_retired(&self, ctx_id: u32, queue_id: u64, fence_cookie: u64);
}
