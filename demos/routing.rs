//! Routing demo for switchyard
//!
//! Shows constrained parameters, wildcards, grouped routes with their own
//! middleware, per-request context values and graceful shutdown on Ctrl-C.
//!
//! Run with `cargo run --example routing`, optionally passing a TOML config
//! path as the first argument.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchyard::logging::{self, LogFormat};
use switchyard::middleware::{from_fn, AccessLog, Next};
use switchyard::{
    context, context_mut, ok_json, Application, Config, Request, Response, Router, Server,
    ServerError,
};

#[derive(Serialize, Deserialize)]
struct User {
    name: String,
    role: String,
}

/// Set by the API key check and read by handlers.
struct Caller(String);

#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path).expect("Failed to load config"),
        None => Config::default(),
    };

    let mut api = Router::new();
    api.middleware(from_fn(|mut req: Request, next: Next| async move {
        let key = req
            .get_header("x-api-key")
            .ok_or_else(|| ServerError::Unauthorized("missing x-api-key".to_string()))?
            .to_string();
        context_mut(&mut req).insert(Caller(key));
        next.handle(req).await
    }));
    api.get("/whoami", |req| async move {
        let caller = context(&req).get::<Caller>().map(|c| c.0.clone());
        ok_json!({ "caller": caller })
    });

    let mut router = Router::new();
    router.middleware(AccessLog);

    router.get("/", |_req| async { Ok(Response::text("Welcome to switchyard!")) });

    // Specific routes first: the first registered match wins.
    router.get("/users/me", |_req| async { Ok(Response::text("current user")) });
    router.get("/users/:id([0-9]+)", |req| async move {
        let id = context(&req).param("id").unwrap_or_default();
        Ok(Response::text(format!("User ID: {id}")))
    });

    router.post("/users", |req| async move {
        match req.body.json::<User>() {
            Some(user) => Response::created(&user),
            None => Err(ServerError::BadRequest("Invalid JSON body".to_string())),
        }
    });

    router.get("/static/:file*", |req| async move {
        let file = context(&req).param("file").unwrap_or_default();
        Ok(Response::text(format!("would serve {file}")))
    });

    router.mount("/api", api);

    let server = Arc::new(
        Server::new(Application::new(router), config)
            .with_logger(logging::subscriber(LogFormat::Pretty, "info")),
    );

    let running = Arc::clone(&server);
    let http = tokio::spawn(async move { running.start().await });

    tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl-C");
    if let Err(err) = server.shutdown().await {
        eprintln!("shutdown: {err}");
    }
    if let Ok(Err(err)) = http.await {
        eprintln!("listener: {err}");
    }
}
