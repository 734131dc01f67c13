mod access_log;

pub use access_log::AccessLog;

use crate::handler::{Handler, HttpResponse};
use crate::http::Request;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// The remainder of a chain, as seen from one middleware.
///
/// Cloning is an `Arc` bump; a composed chain holds no per-request state.
#[derive(Clone)]
pub struct Next {
    handler: Arc<dyn Handler>,
}

impl Next {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub(crate) fn from_handler(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }

    pub async fn handle(&self, req: Request) -> HttpResponse {
        self.handler.handle(req).await
    }
}

pub type MiddlewareResult = BoxFuture<'static, HttpResponse>;

/// A stage wrapped around the rest of the chain.
///
/// Returning without calling [`Next::handle`] short-circuits: later
/// middleware and the handler never run.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> MiddlewareResult;
}

pub struct FnMiddleware<F>(F);

/// Adapts an async closure into a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    FnMiddleware(f)
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> MiddlewareResult {
        Box::pin((self.0)(req, next))
    }
}

/// Folds `middlewares` around `handler`, first element outermost.
pub(crate) fn compose(middlewares: &[Arc<dyn Middleware>], handler: Arc<dyn Handler>) -> Next {
    middlewares
        .iter()
        .rev()
        .fold(Next::from_handler(handler), |next, middleware| {
            let middleware = Arc::clone(middleware);
            Next::new(move |req: Request| middleware.call(req, next.clone()))
        })
}
