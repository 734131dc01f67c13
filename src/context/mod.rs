//! Request-scoped context.
//!
//! Every dispatched request carries exactly one [`ContextPayload`] holding
//! the matched route, the literal request path and an opaque value store.
//! The payload is owned by the request, so it is never visible to another
//! in-flight request.

mod pool;
mod values;

pub use pool::{ContextPool, PooledContext};
pub use values::Values;

use crate::http::Request;
use crate::router::Route;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ContextPayload {
    route: Option<Arc<Route>>,
    path: String,
    values: Values,
}

impl ContextPayload {
    /// The matched route; `None` when the request fell through to the
    /// not-found or method-not-allowed responder.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// URI parameters, recomputed from the route pattern and stored path.
    pub fn params(&self) -> HashMap<String, String> {
        self.route
            .as_ref()
            .and_then(|route| route.params(&self.path))
            .unwrap_or_default()
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.params().remove(name)
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values.insert(value)
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values.get()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.values.get_mut()
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.values.remove()
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub(crate) fn fill(&mut self, route: Option<Arc<Route>>, path: &str) {
        self.route = route;
        self.path.push_str(path);
    }

    pub(crate) fn reset(&mut self) {
        self.route = None;
        self.path.clear();
        self.values.clear();
    }
}

/// Returns the context the dispatcher attached to `req`.
///
/// # Panics
///
/// Panics if called on a request that is not being dispatched. That is a
/// programming error, not a runtime condition.
pub fn context(req: &Request) -> &ContextPayload {
    match req.try_context() {
        Some(ctx) => ctx,
        None => panic!("no context attached: request is not inside an active dispatch"),
    }
}

/// Mutable form of [`context`].
///
/// # Panics
///
/// Same contract as [`context`].
pub fn context_mut(req: &mut Request) -> &mut ContextPayload {
    match req.try_context_mut() {
        Some(ctx) => ctx,
        None => panic!("no context attached: request is not inside an active dispatch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    #[should_panic(expected = "no context attached")]
    fn context_outside_dispatch_panics() {
        let req = Request::new(Method::GET, "/");
        let _ = context(&req);
    }

    #[test]
    fn reset_clears_every_field() {
        let mut payload = ContextPayload::default();
        payload.path.push_str("/a/b");
        payload.insert("value");
        payload.reset();
        assert!(payload.route().is_none());
        assert_eq!(payload.path(), "");
        assert!(payload.values().is_empty());
    }
}
