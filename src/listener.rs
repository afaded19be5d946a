//! Transport bridge, cancellation and graceful shutdown.
//!
//! A [`Listener`] owns the frozen [`Router`] and runs in one of two modes:
//!
//! - **serve**: binds `host:port` and runs a hyper HTTP/1.1 + HTTP/2 accept
//!   loop, one tokio task per connection.
//! - **custom**: hands the [`Handler`] and a [`Shutdown`] signal to a
//!   user-supplied function that wires them to any transport it likes.
//!
//! [`Listener::kill`] raises the shutdown signal in either mode. In serve
//! mode that means:
//! 1. `listener.accept()` stops immediately, so no new connections are made.
//! 2. Every in-flight connection task runs to completion.
//! 3. [`Listener::listen`] returns.
//!
//! With [`ListenOptions::handle_signals`] set, SIGTERM and Ctrl-C have the
//! same effect as `kill`.
//!
//! Request bodies are buffered up to [`ListenOptions::max_body`] bytes before
//! a context is built; anything longer is answered with `413` and never
//! reaches the router.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ListenOptions;
use crate::context::Context;
use crate::error::Error;
use crate::handler::{Handler, recover};
use crate::pipeline::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// A cancellation signal shared by a listener and its transport.
///
/// Advisory: it tells the transport to stop taking new requests. In-flight
/// pipelines are never aborted by it.
#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    /// Resolves once [`Listener::kill`] has been called (or the listener dropped).
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

type ListenFn = Arc<dyn Fn(Handler, Shutdown) -> BoxFuture<Result<(), Error>> + Send + Sync>;

enum Mode {
    Serve(ListenOptions),
    Custom(ListenFn),
}

/// Bridges a transport to a [`Router`].
pub struct Listener {
    handler: Handler,
    mode: Mode,
    kill: watch::Sender<bool>,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl Listener {
    /// Serves `router` over TCP on `options.addr()`.
    ///
    /// ```rust,no_run
    /// use sluice::{ListenOptions, Listener, Method, RouteOptions, Router};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sluice::Error> {
    ///     let mut router = Router::new();
    ///     router.register("/", Method::Get, RouteOptions::new())?.respond(|_| "ok");
    ///
    ///     Listener::serve(router, ListenOptions::from_env()?).listen().await
    /// }
    /// ```
    pub fn serve(router: Router, options: ListenOptions) -> Self {
        Self::with_mode(router, Mode::Serve(options))
    }

    /// Lets `listen` drive the transport. It receives the request handler and
    /// the shutdown signal it must honour.
    pub fn custom<F, Fut>(router: Router, listen: F) -> Self
    where
        F: Fn(Handler, Shutdown) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let listen: ListenFn = Arc::new(move |handler: Handler, shutdown: Shutdown| -> BoxFuture<Result<(), Error>> {
            Box::pin(listen(handler, shutdown))
        });
        Self::with_mode(router, Mode::Custom(listen))
    }

    fn with_mode(router: Router, mode: Mode) -> Self {
        let (kill, _) = watch::channel(false);
        let (bound, _) = watch::channel(None);
        Self { handler: Handler::new(Arc::new(router)), mode, kill, bound }
    }

    pub fn handler(&self) -> Handler {
        self.handler.clone()
    }

    pub fn shutdown(&self) -> Shutdown {
        Shutdown(self.kill.subscribe())
    }

    /// The socket address serve mode bound to, which tells callers the real
    /// port when [`ListenOptions::port`] is `0`.
    ///
    /// Waits until [`listen`](Listener::listen) has bound. Never resolves in
    /// custom mode.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut bound = self.bound.subscribe();
        bound.wait_for(Option::is_some).await.ok().and_then(|addr| *addr)
    }

    /// Runs the configured mode until it finishes or is cancelled.
    pub async fn listen(&self) -> Result<(), Error> {
        match &self.mode {
            Mode::Serve(options) => serve(self.handler(), options, self.shutdown(), &self.bound).await,
            Mode::Custom(listen) => listen(self.handler(), self.shutdown()).await,
        }
    }

    /// Signals the active mode to stop accepting requests. Idempotent.
    pub fn kill(&self) {
        if !self.kill.send_replace(true) {
            info!("kill requested");
        }
    }

    /// Runs one request through the router without a transport.
    ///
    /// Resolves as soon as the context terminates, with the response as it
    /// stood at that moment, even if the terminating step never returns.
    /// Otherwise resolves when dispatch finishes. Errors map exactly as in
    /// [`Handler::call`].
    pub async fn fake_call(&self, request: Request) -> Response {
        let (ctx, mut terminated) = Context::observed(request);
        let dispatch = self.handler.router().dispatch(ctx);
        tokio::pin!(dispatch);

        tokio::select! {
            biased;

            Ok(frozen) = &mut terminated => frozen,
            result = &mut dispatch => match terminated.try_recv() {
                // Terminated and finished within the same poll.
                Ok(frozen) => frozen,
                Err(_) => recover(result),
            },
        }
    }
}

// ── Serve mode ────────────────────────────────────────────────────────────────

async fn serve(
    handler: Handler,
    options: &ListenOptions,
    mut shutdown: Shutdown,
    bound: &watch::Sender<Option<SocketAddr>>,
) -> Result<(), Error> {
    let listener = TcpListener::bind(options.addr()).await?;
    let addr = listener.local_addr()?;
    bound.send_replace(Some(addr));

    info!(%addr, routes = handler.router().len(), "sluice listening");

    let mut tasks = JoinSet::new();

    let handle_signals = options.handle_signals;
    let max_body = options.max_body;
    let stop = async move {
        tokio::select! {
            () = shutdown.cancelled() => {}
            () = os_signal(), if handle_signals => {}
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            // Check shutdown first so a kill stops accepting even if more
            // connections are queued.
            biased;

            () = &mut stop => {
                info!(in_flight = tasks.len(), "shutdown requested, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let handler = handler.clone();
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let handler = handler.clone();
                        async move { Ok::<_, Infallible>(respond(&handler, req, max_body).await) }
                    });

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(%peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("sluice stopped");
    Ok(())
}

async fn respond(handler: &Handler, req: hyper::Request<Incoming>, max_body: usize) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, max_body).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(path = parts.uri.path(), limit = max_body, "request body too large");
            return Response::status(StatusCode::PAYLOAD_TOO_LARGE).into_http();
        }
        Err(e) => {
            warn!(path = parts.uri.path(), "failed to read request body: {e}");
            return Response::status(StatusCode::BAD_REQUEST).into_http();
        }
    };
    handler.call(Request::from_parts(parts, body)).await.into_http()
}

/// Resolves on SIGTERM (Unix) or Ctrl-C.
///
/// A signal that cannot be installed is logged and never fires.
async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
