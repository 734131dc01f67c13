//! The dispatch entrypoint.
//!
//! [`Application`] owns the frozen [`Registry`] and the context pool. Every
//! request the transport accepts goes through [`Application::dispatch`],
//! which always produces a response: routing misses, handler errors and
//! handler panics are all rendered here and never propagate further.
//!
//! # Examples
//!
//! ```rust
//! use switchyard::{context, Application, Response, Router};
//!
//! let mut router = Router::new();
//! router.get("/users/:id([0-9]+)", |req| async move {
//!     let id = context(&req).param("id").unwrap_or_default();
//!     Ok(Response::text(format!("user {id}")))
//! });
//! let app = Application::new(router);
//! ```

use crate::context::ContextPool;
use crate::error::ServerError;
use crate::handler::HttpResponse;
use crate::http::{Method, Request, Response};
use crate::router::{Registry, Router};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

type ErrorHandler = Arc<dyn Fn(ServerError) -> Response + Send + Sync>;

pub struct Application {
    registry: Registry,
    pool: Arc<ContextPool>,
    on_error: Option<ErrorHandler>,
}

impl Application {
    /// Freezes `router`. No routes can be added afterwards.
    pub fn new(router: Router) -> Self {
        let registry = router.build();
        tracing::debug!(routes = registry.len(), "routing table built");
        Self {
            registry,
            pool: Arc::new(ContextPool::default()),
            on_error: None,
        }
    }

    /// Bounds how many idle context payloads are kept for reuse.
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool = Arc::new(ContextPool::new(capacity));
        self
    }

    /// Replaces the default JSON error rendering.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(ServerError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.pool
    }

    /// Routes `req` and runs the matched chain.
    pub async fn dispatch(&self, req: Request) -> Response {
        let head = req.method == Method::HEAD;
        let result = match AssertUnwindSafe(self.route(req)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = if let Some(msg) = panic.downcast_ref::<&str>() {
                    msg.to_string()
                } else if let Some(msg) = panic.downcast_ref::<String>() {
                    msg.clone()
                } else {
                    "Unknown panic".to_string()
                };
                tracing::error!(panic = %message, "handler panicked");
                Err(ServerError::PanicError(message))
            }
        };
        let mut response = match result {
            Ok(response) => response,
            Err(err) => self.handle_error(err),
        };
        if head && !response.body.is_empty() {
            let length = response.body.len();
            response
                .headers
                .retain(|name, _| !name.eq_ignore_ascii_case("content-length"));
            response.header("Content-Length", length.to_string());
            response.body.clear();
        }
        response
    }

    async fn route(&self, mut req: Request) -> HttpResponse {
        let route = self.registry.resolve(req.method, &req.path).or_else(|| {
            // HEAD is served by the GET route when none is registered.
            (req.method == Method::HEAD)
                .then(|| self.registry.resolve(Method::GET, &req.path))
                .flatten()
        });
        let context = self.pool.acquire(route.clone(), &req.path);
        req.attach(context);
        match route {
            Some(route) => route.handle(req).await,
            None => self.registry.fallback().handle(req).await,
        }
    }

    fn handle_error(&self, error: ServerError) -> Response {
        if error.status_code() >= 500 {
            tracing::error!(error = %error, "request failed");
        }
        match &self.on_error {
            Some(handler) => handler(error),
            None => Response::error(error),
        }
    }
}
