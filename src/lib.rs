//! # Switchyard
//!
//! An HTTP request router: regex-parameterized path matching, a
//! request-scoped context threaded through middleware, and plain/TLS
//! listeners with bounded graceful shutdown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchyard::{context, middleware::AccessLog, ok_json, Application, Config, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!     router.middleware(AccessLog);
//!     router.get("/users/:id([0-9]+)", |req| async move {
//!         let id = context(&req).param("id");
//!         ok_json!({ "id": id })
//!     });
//!
//!     let server = Arc::new(Server::new(Application::new(router), Config::default()));
//!     server.start().await.unwrap();
//! }
//! ```
//!
//! ## Patterns
//!
//! | segment          | matches                                  |
//! |------------------|------------------------------------------|
//! | `users`          | the literal segment                      |
//! | `:id`            | any non-empty segment                    |
//! | `:id([0-9]+)`    | a segment matching the whole regex       |
//! | `:rest*`         | one or more trailing segments (last only)|
//!
//! Routes are tried per method in registration order; the first match wins.

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod server;
pub extern crate serde_json;

pub use app::Application;
pub use config::Config;
pub use context::{context, context_mut, ContextPayload};
pub use error::{ConfigError, LifecycleError, RouteError, ServerError, ServerResult};
pub use handler::HttpResponse;
pub use http::{response_status, Method, ObservableResponseWriter, Request, Response};
pub use router::{Route, Router};
pub use server::{ListenerKind, ListenerStatus, Server};

// Reexport serde_json
pub use serde_json::{json, Value};
