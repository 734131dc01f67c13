mod pattern;
mod registry;

pub use pattern::Pattern;
pub use registry::{Registry, RouteMatch};

use crate::error::RouteError;
use crate::handler::{Handler, HttpResponse};
use crate::http::{Method, Request};
use crate::middleware::{compose, Middleware, Next};
use registry::RouteTable;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A registered route: method, pattern and its composed chain.
///
/// Immutable once built; owned by the [`Registry`] and shared with request
/// contexts through `Arc`.
pub struct Route {
    method: Method,
    pattern: Pattern,
    chain: Next,
}

impl Route {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Parameters captured from `path`, or `None` if it does not match.
    pub fn params(&self, path: &str) -> Option<HashMap<String, String>> {
        self.pattern.params(path)
    }

    pub(crate) async fn handle(&self, req: Request) -> HttpResponse {
        self.chain.handle(req).await
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

struct RouteEntry {
    method: Method,
    pattern: Pattern,
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

/// Route registration.
///
/// Routes are matched per method in registration order; when patterns
/// overlap, register the specific ones (`/users/active`) before the
/// catch-alls (`/users/:id`).
#[derive(Default)]
pub struct Router {
    middlewares: Vec<Arc<dyn Middleware>>,
    entries: Vec<RouteEntry>,
    not_found: Option<Arc<dyn Handler>>,
}

macro_rules! method_routes {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Registers a `", stringify!($method), "` route.")]
            ///
            /// # Panics
            ///
            /// Panics if the pattern is malformed or already registered for
            /// this method. Use [`Router::try_route`] to handle the error.
            pub fn $name<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
            where
                F: Fn(Request) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HttpResponse> + Send + 'static,
            {
                self.route(Method::$method, pattern, handler)
            }
        )*
    };
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    method_routes! {
        get => GET,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        head => HEAD,
        connect => CONNECT,
        options => OPTIONS,
        trace => TRACE,
    }

    /// # Panics
    ///
    /// Panics on a malformed or duplicate pattern.
    pub fn route<F, Fut>(&mut self, method: Method, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.route_with(method, pattern, Vec::new(), handler)
    }

    /// Registers a route with its own middleware, run inside the
    /// router-wide middleware.
    ///
    /// # Panics
    ///
    /// Panics on a malformed or duplicate pattern.
    pub fn route_with<F, Fut>(
        &mut self,
        method: Method,
        pattern: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        if let Err(err) = self.try_route(method, pattern, middlewares, handler) {
            panic!("invalid route registration: {err}");
        }
        self
    }

    pub fn try_route<F, Fut>(
        &mut self,
        method: Method,
        pattern: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: F,
    ) -> Result<&mut Self, RouteError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        let pattern = Pattern::parse(pattern)?;
        self.push(RouteEntry {
            method,
            pattern,
            middlewares,
            handler: Arc::new(handler),
        })?;
        Ok(self)
    }

    /// Adds middleware applied to every route of this router, including
    /// routes registered earlier and the not-found responder.
    pub fn middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Responder for requests no route accepts under any method.
    pub fn not_found<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Grafts `router`'s routes under `prefix`. Its middleware stays scoped
    /// to its own routes.
    ///
    /// Only the root router answers unmatched requests, so a mounted router
    /// must not set [`Router::not_found`].
    ///
    /// # Panics
    ///
    /// Panics if the prefix is malformed, a grafted route collides or the
    /// mounted router has a not-found responder.
    pub fn mount(&mut self, prefix: &str, router: Router) -> &mut Self {
        if let Err(err) = self.try_mount(prefix, router) {
            panic!("invalid mount: {err}");
        }
        self
    }

    pub fn try_mount(&mut self, prefix: &str, router: Router) -> Result<&mut Self, RouteError> {
        let prefix = Pattern::parse(prefix)?;
        if router.not_found.is_some() {
            return Err(RouteError::MountedNotFound {
                prefix: prefix.as_str().to_string(),
            });
        }
        let prefix = match prefix.as_str() {
            "/" => "",
            other => other,
        };
        for entry in router.entries {
            let joined = match entry.pattern.as_str() {
                "/" if !prefix.is_empty() => prefix.to_string(),
                path => format!("{prefix}{path}"),
            };
            let mut middlewares = router.middlewares.clone();
            middlewares.extend(entry.middlewares);
            self.push(RouteEntry {
                method: entry.method,
                pattern: Pattern::parse(&joined)?,
                middlewares,
                handler: entry.handler,
            })?;
        }
        Ok(self)
    }

    fn push(&mut self, entry: RouteEntry) -> Result<(), RouteError> {
        let duplicate = self
            .entries
            .iter()
            .any(|e| e.method == entry.method && e.pattern.as_str() == entry.pattern.as_str());
        if duplicate {
            return Err(RouteError::Duplicate {
                method: entry.method,
                pattern: entry.pattern.as_str().to_string(),
            });
        }
        tracing::debug!(method = %entry.method, pattern = %entry.pattern, "route registered");
        self.entries.push(entry);
        Ok(())
    }

    /// Freezes the routes, composing each chain once.
    pub fn build(self) -> Registry {
        let mut table = RouteTable::default();
        for entry in self.entries {
            let mut stages = self.middlewares.clone();
            stages.extend(entry.middlewares);
            table.push(Arc::new(Route {
                method: entry.method,
                pattern: entry.pattern,
                chain: compose(&stages, entry.handler),
            }));
        }
        Registry::new(table, &self.middlewares, self.not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;

    fn ok(_req: Request) -> futures::future::Ready<HttpResponse> {
        futures::future::ready(Ok(Response::default()))
    }

    #[test]
    fn duplicate_method_and_pattern_is_rejected() {
        let mut router = Router::new();
        router.get("/users/:id", ok);
        let err = router
            .try_route(Method::GET, "/users/:id/", Vec::new(), ok)
            .err()
            .unwrap();
        assert_eq!(
            err,
            RouteError::Duplicate {
                method: Method::GET,
                pattern: "/users/:id".into()
            }
        );
        assert!(router.try_route(Method::POST, "/users/:id", Vec::new(), ok).is_ok());
    }

    #[test]
    #[should_panic(expected = "invalid route registration")]
    fn malformed_pattern_is_fatal() {
        Router::new().get("/users/:id([0-9]+", ok);
    }

    #[test]
    fn mount_prefixes_patterns() {
        let mut api = Router::new();
        api.get("/", ok).get("/status", ok).get("/users/:id", ok);

        let mut router = Router::new();
        router.mount("/api/", api);
        let registry = router.build();

        let patterns: Vec<&str> = registry.routes().map(|r| r.pattern().as_str()).collect();
        assert_eq!(patterns, vec!["/api", "/api/status", "/api/users/:id"]);
    }

    #[test]
    fn mount_collisions_are_reported() {
        let mut child = Router::new();
        child.get("/status", ok);
        let mut router = Router::new();
        router.get("/api/status", ok);
        assert!(matches!(
            router.try_mount("/api", child),
            Err(RouteError::Duplicate { .. })
        ));
    }

    #[test]
    fn mounted_not_found_is_rejected() {
        let mut child = Router::new();
        child.get("/status", ok).not_found(ok);
        let mut router = Router::new();
        assert_eq!(
            router.try_mount("/api", child).err(),
            Some(RouteError::MountedNotFound {
                prefix: "/api".into()
            })
        );
        assert_eq!(router.build().len(), 0);
    }
}
