use crate::error::ServerError;
use crate::handler::Handler;
use crate::http::{Method, Request};
use crate::middleware::{compose, Middleware, Next};
use crate::router::pattern::normalize;
use crate::router::Route;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of looking up a method and path.
#[derive(Debug)]
pub enum RouteMatch {
    Found {
        route: Arc<Route>,
        params: HashMap<String, String>,
    },
    /// The path matches, but only under these methods.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

#[derive(Default)]
pub(crate) struct RouteTable {
    by_method: HashMap<Method, Vec<Arc<Route>>>,
    ordered: Vec<Arc<Route>>,
}

impl RouteTable {
    pub(crate) fn push(&mut self, route: Arc<Route>) {
        self.by_method
            .entry(route.method())
            .or_default()
            .push(Arc::clone(&route));
        self.ordered.push(route);
    }

    /// First route for `method`, in registration order, whose pattern
    /// accepts `path`.
    fn resolve(&self, method: Method, path: &str) -> Option<&Arc<Route>> {
        self.by_method
            .get(&method)?
            .iter()
            .find(|route| route.pattern().is_match(path))
    }

    fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = self
            .by_method
            .iter()
            .filter(|(_, routes)| routes.iter().any(|route| route.pattern().is_match(path)))
            .map(|(method, _)| *method)
            .collect();
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort();
        allowed
    }
}

/// Frozen routing table plus the precomposed fallback chain.
///
/// Read-only once built, so lookups need no locking.
pub struct Registry {
    table: Arc<RouteTable>,
    fallback: Next,
}

impl Registry {
    pub(crate) fn new(
        table: RouteTable,
        global: &[Arc<dyn Middleware>],
        not_found: Option<Arc<dyn Handler>>,
    ) -> Self {
        let table = Arc::new(table);
        let lookup = Arc::clone(&table);
        let fallback_handler: Arc<dyn Handler> = Arc::new(move |req: Request| {
            let allowed = lookup.allowed_methods(normalize(&req.path));
            let not_found = not_found.clone();
            async move {
                if !allowed.is_empty() {
                    return Err(ServerError::MethodNotAllowed(allowed));
                }
                match not_found {
                    Some(handler) => handler.handle(req).await,
                    None => Err(ServerError::NotFound),
                }
            }
        });
        Self {
            table,
            fallback: compose(global, fallback_handler),
        }
    }

    pub fn find(&self, method: Method, path: &str) -> RouteMatch {
        let path = normalize(path);
        if let Some(route) = self.table.resolve(method, path) {
            let params = route.params(path).unwrap_or_default();
            return RouteMatch::Found {
                route: Arc::clone(route),
                params,
            };
        }
        let allowed = self.table.allowed_methods(path);
        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed { allowed }
        }
    }

    /// Like [`Registry::find`] without building the parameter map.
    pub fn resolve(&self, method: Method, path: &str) -> Option<Arc<Route>> {
        self.table.resolve(method, normalize(path)).cloned()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.table.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.table.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.ordered.is_empty()
    }

    /// Chain run for requests no route accepts.
    pub(crate) fn fallback(&self) -> &Next {
        &self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;
    use crate::router::Router;

    fn ok() -> impl Fn(Request) -> futures::future::Ready<crate::handler::HttpResponse> + Send + Sync + Clone {
        |_req| futures::future::ready(Ok(Response::default()))
    }

    #[test]
    fn find_reports_params_of_first_match() {
        let mut router = Router::new();
        router.get("/users/:id", ok()).get("/users/:id/posts/:post", ok());
        let registry = router.build();

        match registry.find(Method::GET, "/users/9/posts/3/") {
            RouteMatch::Found { route, params } => {
                assert_eq!(route.pattern().as_str(), "/users/:id/posts/:post");
                assert_eq!(params["id"], "9");
                assert_eq!(params["post"], "3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_method_yields_method_not_allowed() {
        let mut router = Router::new();
        router.get("/items", ok()).post("/items", ok()).delete("/items/:id", ok());
        let registry = router.build();

        match registry.find(Method::PUT, "/items") {
            RouteMatch::MethodNotAllowed { allowed } => {
                assert_eq!(allowed, vec![Method::GET, Method::POST, Method::HEAD]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(registry.find(Method::GET, "/nothing"), RouteMatch::NotFound));
    }

    #[test]
    fn registration_order_decides_overlaps() {
        let mut router = Router::new();
        router.get("/users/active", ok()).get("/users/:id", ok());
        let registry = router.build();
        let route = registry.resolve(Method::GET, "/users/active").unwrap();
        assert_eq!(route.pattern().as_str(), "/users/active");

        let mut router = Router::new();
        router.get("/users/:id", ok()).get("/users/active", ok());
        let registry = router.build();
        let route = registry.resolve(Method::GET, "/users/active").unwrap();
        assert_eq!(route.pattern().as_str(), "/users/:id");
    }
}
