use crate::error::ServerResult;
use crate::http::Request;
use crate::http::Response;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub type HttpResponse = ServerResult<Response>;

/// Terminal stage of a route. Implemented for every
/// `Fn(Request) -> impl Future<Output = HttpResponse>`.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: Request) -> BoxFuture<'static, HttpResponse>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn handle(&self, req: Request) -> BoxFuture<'static, HttpResponse> {
        Box::pin((self)(req))
    }
}

/// Erases a handler closure into a shareable trait object.
pub fn handler<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    Arc::new(f)
}
