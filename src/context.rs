//! Per-request context and its termination state machine.
//!
//! A [`Context`] is created once per request by [`Context::new`] and owned by
//! exactly one pipeline execution. It carries:
//!
//! ```text
//! Context<S>
//! ├── request   Arc<Request>    fixed for the whole request
//! ├── response  Response        starts as 404 "Not found."
//! ├── seal      Seal            empty ──terminate()──▶ frozen response (shared)
//! └── state     S               typed, grows step by step
//! ```
//!
//! Steps that add data do so by changing the state type:
//!
//! ```rust
//! use sluice::{Context, Request};
//!
//! struct User { id: u64 }
//!
//! let ctx = Context::new(Request::new("GET", "/me"));
//! let ctx: Context<((), User)> = ctx.extend(User { id: 7 });
//! assert_eq!(ctx.state().1.id, 7);
//! ```
//!
//! Every evolution consumes the previous context and keeps its request,
//! response and termination cell. The cell is shared by every context derived
//! from the same [`Context::new`] call, and the pipeline checks that cell, not
//! the phase of whatever context a step hands back. A step that terminates and
//! then returns a freshly built context still halts the pipeline with the
//! frozen response; the fresh context is discarded.

use std::sync::{Arc, OnceLock};

use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Lifecycle of a single request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Running,
    /// Final. No further steps run and the response can no longer change.
    Terminated,
}

/// Per-request termination cell: empty while running, then the response as
/// it stood when the request terminated.
#[derive(Clone, Debug, Default)]
pub(crate) struct Seal(Arc<OnceLock<Response>>);

impl Seal {
    pub(crate) fn frozen(&self) -> Option<&Response> {
        self.0.get()
    }

    /// Whether `ctx` belongs to the request this seal was taken from.
    pub(crate) fn owns<S>(&self, ctx: &Context<S>) -> bool {
        Arc::ptr_eq(&self.0, &ctx.seal.0)
    }
}

/// Mutable per-request state threaded through a pipeline.
pub struct Context<S = ()> {
    request: Arc<Request>,
    response: Response,
    seal: Seal,
    state: S,
    on_terminate: Option<oneshot::Sender<Response>>,
}

impl Context<()> {
    /// Builds the context for one inbound request: default 404 response,
    /// [`Phase::Running`], empty state.
    pub fn new(request: Request) -> Self {
        Self {
            request: Arc::new(request),
            response: Response::not_found(),
            seal: Seal::default(),
            state: (),
            on_terminate: None,
        }
    }

    /// Like [`new`](Context::new), plus a receiver that yields the response
    /// as it stood when [`terminate`](Context::terminate) first ran.
    pub(crate) fn observed(request: Request) -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let mut ctx = Self::new(request);
        ctx.on_terminate = Some(tx);
        (ctx, rx)
    }
}

impl<S> Context<S> {
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn phase(&self) -> Phase {
        if self.is_terminated() { Phase::Terminated } else { Phase::Running }
    }

    pub fn is_terminated(&self) -> bool {
        self.seal.frozen().is_some()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Replaces the current response.
    ///
    /// Returns `false` and leaves the response untouched once the context
    /// has terminated.
    pub fn set_response(&mut self, response: impl IntoResponse) -> bool {
        if self.is_terminated() {
            warn!(path = self.request.path(), "response write after termination ignored");
            return false;
        }
        self.response = response.into_response();
        true
    }

    /// Ends the pipeline after the current step. Repeated calls are no-ops.
    pub fn terminate(&mut self) {
        if self.seal.0.set(self.response.clone()).is_err() {
            return;
        }
        trace!(path = self.request.path(), status = %self.response.status_code(), "context terminated");
        if let Some(tx) = self.on_terminate.take() {
            // The observer may already be gone; nothing to report then.
            let _ = tx.send(self.response.clone());
        }
    }

    /// Sets the response and terminates in one go.
    pub fn end(&mut self, response: impl IntoResponse) {
        self.set_response(response);
        self.terminate();
    }

    /// Evolves the state, keeping request, response and phase.
    pub fn map_state<T>(self, f: impl FnOnce(S) -> T) -> Context<T> {
        Context {
            request: self.request,
            response: self.response,
            seal: self.seal,
            state: f(self.state),
            on_terminate: self.on_terminate,
        }
    }

    /// Replaces the state entirely.
    pub fn with_state<T>(self, state: T) -> Context<T> {
        self.map_state(|_| state)
    }

    /// Adds a field to the state.
    pub fn extend<T>(self, value: T) -> Context<(S, T)> {
        self.map_state(|state| (state, value))
    }

    pub(crate) fn seal(&self) -> Seal {
        self.seal.clone()
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}
