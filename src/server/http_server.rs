//! HTTP server implementation.
//!
//! Each accepted connection carries exactly one request:
//!
//! ```text
//! head → parse → body (size-capped) → payload → route checks → dispatch
//!      → (await deferred) → encode → write → close
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::failure::{ClassifiedError, ErrorReporter, OperationalFailure, RequestFailure};
use crate::logger::{Channel, Severity};
use crate::parser::{parse_request, HttpRequest, Method};
use crate::plugin::Payload;
use crate::router::{Dispatch, Router};
use crate::server::body::RequestBuffer;
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::response::{HttpResponse, StatusCode};

const FAVICON_PATH: &str = "/favicon.ico";

/// Everything a connection task needs to answer a request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub reporter: Arc<ErrorReporter>,
    pub max_body_size: usize,
}

/// Who sent a request.
///
/// Only written to the request log. Handlers receive params and payload and
/// never see it.
#[derive(Debug, Serialize)]
struct ClientInfo {
    remote_address: Option<String>,
    host: Option<String>,
    origin: Option<String>,
    user_agent: Option<String>,
}

impl ClientInfo {
    fn new(peer: Option<SocketAddr>, request: &HttpRequest) -> Self {
        Self {
            remote_address: peer.map(|addr| addr.to_string()),
            host: request.get_header("Host").cloned(),
            origin: request.get_header("Origin").cloned(),
            user_agent: request.get_header("User-Agent").cloned(),
        }
    }
}

/// An HTTP server.
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server answering from a fully registered `router`.
    pub fn new(config: ServerConfig, router: Arc<Router>, reporter: Arc<ErrorReporter>) -> Self {
        let state = AppState {
            router,
            reporter,
            max_body_size: config.max_body_size,
        };
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Log the registered endpoints.
    fn display_server_info(&self) {
        info!("Registered endpoints:");
        for route in self.state.router.routes() {
            info!(
                "  {method} {pattern} -> {plugin}.{callback}",
                method = route.method(),
                pattern = route.pattern(),
                plugin = route.plugin(),
                callback = route.callback()
            );
        }
    }

    /// Set up the TCP listener.
    async fn setup_listener(&self) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        info!("Server listening on http://{addr}", addr = self.config.addr);
        Ok(listener)
    }

    /// Set up a Ctrl+C handler for graceful shutdown.
    fn setup_ctrl_c_handler(shutdown_tx: mpsc::Sender<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        })
    }

    /// Handle a new connection.
    fn handle_new_connection(
        mut socket: TcpStream,
        addr: SocketAddr,
        semaphore: &Arc<Semaphore>,
        state: &AppState,
        read_buffer_size: usize,
        tasks: &mut JoinSet<()>,
    ) {
        // Try to acquire a permit from the semaphore
        let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
            warn!("Connection limit reached, rejecting connection from {addr}");
            tasks.spawn(async move {
                let response = HttpResponse::text(
                    StatusCode::ServiceUnavailable,
                    "Server is at capacity, please try again later",
                );
                let _ = socket.write_all(&response.with_cors().to_bytes()).await;
            });
            return;
        };

        let state = state.clone();
        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            if let Err(e) = Self::handle_connection(&mut socket, Some(addr), &state, read_buffer_size).await {
                error!("Error handling connection from {addr}: {e}");
            }
        });
    }

    /// Handle connection errors.
    async fn handle_connection_error(e: std::io::Error) -> bool {
        error!("Error accepting connection: {e}");

        // If there's a critical error, signal to break the loop
        if e.kind() == std::io::ErrorKind::BrokenPipe {
            error!("Critical error accepting connection, shutting down");
            return true;
        }

        // For other errors, wait a bit before retrying
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        false
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        // Wait for all tasks to complete (with timeout)
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout elapsed, aborting {len} connections", len = tasks.len());
            tasks.shutdown().await;
        }

        info!("Server shutdown complete");
    }

    /// Bind the configured address and serve until Ctrl+C.
    pub async fn start(&self) -> Result<(), Error> {
        self.display_server_info();

        let listener = self.setup_listener().await?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let ctrl_c = Self::setup_ctrl_c_handler(shutdown_tx);

        self.run(listener, shutdown_rx).await;
        ctrl_c.abort();

        Ok(())
    }

    /// Accept connections on `listener` until a shutdown signal arrives or
    /// every sender is dropped, then drain active connections.
    pub async fn run(&self, listener: TcpListener, mut shutdown_rx: mpsc::Receiver<()>) {
        // Create a semaphore to limit concurrent connections
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        // Use JoinSet to keep track of all spawned tasks
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                // Check for shutdown signal
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server...");
                    break;
                }

                // Reap finished connections
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        error!("Connection task failed: {e}");
                    }
                }

                // Accept new connections
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            Self::handle_new_connection(
                                socket,
                                addr,
                                &semaphore,
                                &self.state,
                                self.config.read_buffer_size,
                                &mut tasks,
                            );
                        }
                        Err(e) => {
                            if Self::handle_connection_error(e).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;
    }

    /// Serve the single request carried by `socket`.
    ///
    /// Failures the caller can fix are answered with their own status and
    /// logged on the requests channel; operational failures are reported and
    /// answered with a bare 500. Only I/O errors come back as `Err`.
    pub async fn handle_connection<S>(
        socket: &mut S,
        peer: Option<SocketAddr>,
        state: &AppState,
        read_buffer_size: usize,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buffer = RequestBuffer::new(read_buffer_size);

        let head = match buffer.read_head(socket).await {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(()), // Connection closed
            Err(e) => return Self::reject(socket, state, None, e).await,
        };

        let request = match parse_request(&head) {
            Ok(request) => request,
            Err(e) => return Self::reject(socket, state, None, e.into()).await,
        };
        let client = ClientInfo::new(peer, &request);

        // Past the limit nothing more is read; the connection is dropped after the answer
        let body = match buffer.read_body(socket, &request, state.max_body_size).await {
            Ok(body) => body,
            Err(e) => return Self::reject(socket, state, Some(&client), e).await,
        };

        let payload = Payload::from_body(&body);
        let logger = state.router.logger();
        logger.log(
            Channel::Requests,
            Severity::Info,
            format!("{} {}", request.method, request.target),
            Some(&json!({ "client": client, "payload": payload.to_value() })),
        );

        let response = match Self::respond(state, &request, payload.clone()).await {
            Ok(value) => HttpResponse::from_value(&value).unwrap_or_else(|e| {
                state
                    .reporter
                    .report(&OperationalFailure::with_cause("Unable to encode handler result", e));
                HttpResponse::internal_error()
            }),
            Err(ClassifiedError::Request(failure)) => {
                Self::log_request_failure(state, Some(&client), &failure, Some(payload.to_value()));
                HttpResponse::failure(&failure)
            }
            Err(ClassifiedError::Operational(failure)) => {
                state.reporter.report(&failure);
                HttpResponse::internal_error()
            }
        };

        // HEAD answers keep the headers, Content-Length included, and drop the body
        let response = if request.method == Method::HEAD {
            response.without_body()
        } else {
            response
        };

        Self::write_response(socket, response).await
    }

    // Route checks and dispatch, in the order the lifecycle requires.
    async fn respond(state: &AppState, request: &HttpRequest, payload: Payload) -> Result<Value, ClassifiedError> {
        let router = &state.router;

        if request.path == FAVICON_PATH {
            return Ok(Value::Null);
        }
        if !router.exists(&request.path) {
            return Err(RequestFailure::unknown_route().into());
        }
        // Methods the router cannot bind to are answered like any other unserved method
        let Some(method) = request
            .method
            .known()
            .filter(|method| router.resolve(*method, &request.path).is_some())
        else {
            return Err(RequestFailure::method_not_supported(&request.method).into());
        };

        match router.dispatch(method, &request.path, request.query.clone(), payload)? {
            Dispatch::Immediate(value) => Ok(value),
            Dispatch::Deferred(future) => Ok(future.await?),
        }
    }

    // Answer a request that could not be read or parsed.
    async fn reject<S>(
        socket: &mut S,
        state: &AppState,
        client: Option<&ClientInfo>,
        error: Error,
    ) -> Result<(), Error>
    where
        S: AsyncWrite + Unpin,
    {
        let failure = match error {
            Error::IoError(_) => return Err(error),
            Error::PayloadTooLarge(limit) => RequestFailure::payload_too_large(limit),
            other => RequestFailure::new(StatusCode::BadRequest, format!("Error parsing request: {other}")),
        };

        Self::log_request_failure(state, client, &failure, None);
        Self::write_response(socket, HttpResponse::failure(&failure)).await
    }

    fn log_request_failure(
        state: &AppState,
        client: Option<&ClientInfo>,
        failure: &RequestFailure,
        payload: Option<Value>,
    ) {
        state.router.logger().log(
            Channel::Requests,
            Severity::Warn,
            format!("{} {}", failure.status(), failure.message()),
            Some(&json!({ "client": client, "payload": payload })),
        );
    }

    async fn write_response<S>(socket: &mut S, response: HttpResponse) -> Result<(), Error>
    where
        S: AsyncWrite + Unpin,
    {
        socket.write_all(&response.with_cors().to_bytes()).await?;
        socket.flush().await?;
        Ok(())
    }
}
