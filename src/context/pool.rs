use crate::context::ContextPayload;
use crate::http::Request;
use crate::router::Route;
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Recycles [`ContextPayload`] allocations between requests.
///
/// Payloads leave the pool inside a [`PooledContext`] owned by the request
/// and come back when that guard drops, so a payload cannot be handed to a
/// new request while any stage of the old one still holds it.
pub struct ContextPool {
    free: Mutex<Vec<ContextPayload>>,
    capacity: usize,
}

impl ContextPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Attaches a payload for `route` and `path` to `req`.
    pub fn attach(self: &Arc<Self>, mut req: Request, route: Arc<Route>, path: &str) -> Request {
        let context = self.acquire(Some(route), path);
        req.attach(context);
        req
    }

    pub(crate) fn acquire(self: &Arc<Self>, route: Option<Arc<Route>>, path: &str) -> PooledContext {
        let mut payload = self.free.lock().pop().unwrap_or_default();
        payload.fill(route, path);
        PooledContext {
            payload,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut payload: ContextPayload) {
        payload.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(payload);
        }
    }

    /// Number of payloads waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.idle())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A payload on loan from a [`ContextPool`].
pub struct PooledContext {
    payload: ContextPayload,
    pool: Arc<ContextPool>,
}

impl Deref for PooledContext {
    type Target = ContextPayload;

    fn deref(&self) -> &ContextPayload {
        &self.payload
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut ContextPayload {
        &mut self.payload
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.payload));
    }
}

impl fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.payload, f)
    }
}
