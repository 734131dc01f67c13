//! Listener lifecycle.
//!
//! A [`Server`] owns up to two listeners, plain HTTP and HTTPS, both
//! feeding the same [`Application`]. Each has its own state machine:
//!
//! ```text
//! Idle -> Starting -> Running -> ShuttingDown -> Stopped
//!            |                                    ^
//!            +------------ startup failure -------+
//! ```
//!
//! `start`/`start_tls` run the accept loop and only return once the
//! listener stops. Share the server through an `Arc` and call
//! `shutdown`/`shutdown_tls` from another task.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchyard::{Application, Config, Response, Router, Server};
//!
//! # async fn run() -> Result<(), switchyard::LifecycleError> {
//! let mut router = Router::new();
//! router.get("/health", |_req| async { Ok(Response::text("ok")) });
//!
//! let server = Arc::new(Server::new(Application::new(router), Config::default()));
//! let running = Arc::clone(&server);
//! let handle = tokio::spawn(async move { running.start().await });
//!
//! tokio::signal::ctrl_c().await.ok();
//! server.shutdown().await?;
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```

mod connection;
mod listener;
mod tls;

use crate::app::Application;
use crate::config::Config;
use crate::error::LifecycleError;
use connection::Limits;
use listener::{Lease, ListenerSlot};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Http,
    Https,
}

impl ListenerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ListenerKind::Http => "HTTP",
            ListenerKind::Https => "HTTPS",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStatus {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

pub struct Server {
    app: Arc<Application>,
    config: Config,
    http: ListenerSlot,
    https: ListenerSlot,
    logger: Dispatch,
}

impl Server {
    /// Logs go to whatever subscriber is current when the server is built;
    /// use [`Server::with_logger`] to pick one explicitly.
    pub fn new(app: Application, config: Config) -> Self {
        Self {
            app: Arc::new(app),
            config,
            http: ListenerSlot::new(ListenerKind::Http),
            https: ListenerSlot::new(ListenerKind::Https),
            logger: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self, kind: ListenerKind) -> ListenerStatus {
        self.slot(kind).status()
    }

    /// Bound address of a running listener. Useful with port 0.
    pub fn local_addr(&self, kind: ListenerKind) -> Option<SocketAddr> {
        self.slot(kind).local_addr()
    }

    /// Serves plain HTTP on `host:port` until [`Server::shutdown`].
    ///
    /// A listening socket that stops accepting connections drains what is
    /// in flight and returns [`LifecycleError::Accept`].
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.run(ListenerKind::Http).await
    }

    /// Serves HTTPS on `host:https_port` until [`Server::shutdown_tls`].
    ///
    /// Fails without binding when the certificate or key is not configured.
    pub async fn start_tls(&self) -> Result<(), LifecycleError> {
        self.run(ListenerKind::Https).await
    }

    /// Stops the HTTP listener, waiting up to `shutdown_timeout` for
    /// in-flight requests. A listener that is not running is left alone.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        self.stop(ListenerKind::Http).await
    }

    pub async fn shutdown_tls(&self) -> Result<(), LifecycleError> {
        self.stop(ListenerKind::Https).await
    }

    fn slot(&self, kind: ListenerKind) -> &ListenerSlot {
        match kind {
            ListenerKind::Http => &self.http,
            ListenerKind::Https => &self.https,
        }
    }

    async fn run(&self, kind: ListenerKind) -> Result<(), LifecycleError> {
        let logger = self.logger.clone();
        async {
            let slot = self.slot(kind);
            let lease = slot.begin()?;
            let result = self.serve(kind, slot, lease).await;
            if let Err(err) = &result {
                slot.stopped();
                tracing::error!(listener = %kind, error = %err, "listener failed");
            }
            result
        }
        .with_subscriber(logger)
        .await
    }

    async fn stop(&self, kind: ListenerKind) -> Result<(), LifecycleError> {
        let result = self
            .slot(kind)
            .shutdown()
            .with_subscriber(self.logger.clone())
            .await;
        if let Err(err) = &result {
            tracing::dispatcher::with_default(&self.logger, || {
                tracing::error!(listener = %kind, error = %err, "shutdown did not complete cleanly");
            });
        }
        result
    }

    async fn serve(
        &self,
        kind: ListenerKind,
        slot: &ListenerSlot,
        lease: Lease,
    ) -> Result<(), LifecycleError> {
        let Lease { mut stop, done } = lease;
        let acceptor = match kind {
            ListenerKind::Http => None,
            ListenerKind::Https => Some(tls::acceptor(&self.config)?),
        };
        let addr = self.config.address(kind);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| LifecycleError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| LifecycleError::Bind { addr, source })?;
        slot.running(local_addr);
        tracing::info!(listener = %kind, address = %local_addr, "listening");

        let limits = Limits {
            read_timeout: self.config.read_timeout,
            write_timeout: self.config.write_timeout,
            max_body_bytes: self.config.max_body_bytes,
        };
        let mut connections = JoinSet::new();
        let mut failure = None;
        loop {
            tokio::select! {
                _ = &mut stop => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let app = Arc::clone(&self.app);
                        let acceptor = acceptor.clone();
                        connections.spawn(
                            handle_connection(app, stream, peer, acceptor, limits)
                                .with_subscriber(self.logger.clone()),
                        );
                    }
                    Err(err) if is_transient(&err) => {
                        tracing::warn!(listener = %kind, error = %err, "accept failed; retrying");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(source) => {
                        failure = Some(LifecycleError::Accept {
                            addr: local_addr,
                            source,
                        });
                        break;
                    }
                },
            }
            while connections.try_join_next().is_some() {}
        }
        drop(listener);
        tracing::info!(
            listener = %kind,
            in_flight = connections.len(),
            "stopped accepting; draining connections"
        );

        let outcome = drain(connections, self.config.shutdown_timeout).await;
        slot.stopped();
        match &outcome {
            Ok(()) => tracing::info!(listener = %kind, "listener stopped"),
            Err(err) => tracing::warn!(listener = %kind, error = %err, "forced listener stop"),
        }
        let _ = done.send(outcome);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Accept errors tied to a single connection attempt, or to momentary
/// descriptor exhaustion. Anything else means the listening socket is broken.
fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }
    // EMFILE and ENFILE.
    cfg!(unix) && matches!(err.raw_os_error(), Some(23) | Some(24))
}

async fn handle_connection(
    app: Arc<Application>,
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    limits: Limits,
) {
    let result = match acceptor {
        Some(acceptor) => {
            match tokio::time::timeout(limits.read_timeout, acceptor.accept(stream)).await {
                Ok(Ok(stream)) => connection::serve(&app, stream, peer, limits).await,
                Ok(Err(err)) => {
                    tracing::debug!(peer = %peer, error = %err, "TLS handshake failed");
                    Ok(())
                }
                Err(_) => {
                    tracing::debug!(peer = %peer, "TLS handshake timed out");
                    Ok(())
                }
            }
        }
        None => connection::serve(&app, stream, peer, limits).await,
    };
    if let Err(err) = result {
        tracing::debug!(peer = %peer, error = %err, "connection error");
    }
}

/// Waits for in-flight connections, aborting whatever is left after `grace`.
async fn drain(mut connections: JoinSet<()>, grace: Duration) -> Result<(), LifecycleError> {
    let finished = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    match finished {
        Ok(()) => Ok(()),
        Err(_) => {
            let abandoned = connections.len();
            connections.abort_all();
            Err(LifecycleError::ShutdownTimeout {
                timeout: grace,
                abandoned,
            })
        }
    }
}
