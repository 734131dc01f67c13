use crate::http::Request;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use std::time::Instant;

/// Emits one `tracing` event per request with method, path, status and
/// latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLog;

impl Middleware for AccessLog {
    fn call(&self, req: Request, next: Next) -> MiddlewareResult {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method;
            let path = req.path.clone();
            let res = next.handle(req).await;
            let status = match &res {
                Ok(res) => res.status,
                Err(err) => err.status_code(),
            };
            tracing::info!(
                method = %method,
                path = %path,
                status,
                latency_us = start.elapsed().as_micros() as u64,
                "request"
            );
            res
        })
    }
}
