//! Ordered step pipelines and their type erasure.
//!
//! # How a pipeline is stored
//!
//! A [`Pipeline<S>`] is not a `Vec` of steps. Each composition call wraps the
//! previous chain in a new closure, so the context type can change from one
//! step to the next and the compiler checks every hand-off:
//!
//! ```text
//! Pipeline::new()                     Context<()>  ─▶ Context<()>
//!     .step(load_user)                Context<()>  ─▶ Context<User>
//!     .respond(render)                Context<User> ─▶ Context<User>
//! ```
//!
//! Running the chain for one request:
//!
//! ```text
//! chain(ctx)
//!   ├─ run previous chain ─▶ Halted(res)?  ──▶ pass Halted(res) through
//!   ├─ run this step      ─▶ Err(e)?        ──▶ propagate, uncaught
//!   ├─ request sealed?    ─▶ yes: Halted(frozen response)
//!   └─ same request?      ─▶ yes: Continue(ctx)
//!                            no:  Err(ForeignContext)
//! ```
//!
//! The seal is read from the context the step *received*, so a step cannot
//! undo termination by returning a context built with [`Context::new`].
//!
//! Each step wraps the previous chain's future in its own, so polling a
//! pipeline descends one future per step and stack use grows linearly with
//! pipeline length. Routes with a few hundred steps are fine; a generated
//! pipeline with tens of thousands of steps should run on a thread with a
//! larger stack.
//!
//! The router needs to hold pipelines with *different* state types in one
//! map, so it stores them as `Arc<dyn ErasedPipeline>`: one vtable call per
//! request, one `Arc` clone per derived route.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::context::Context;
use crate::error::Error;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets tokio move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A boxed step that keeps the context's shape. See [`RouteOptions`](crate::RouteOptions).
pub type Step<S = ()> =
    Arc<dyn Fn(Context<S>) -> BoxFuture<Result<Context<S>, Error>> + Send + Sync + 'static>;

/// Boxes an async step function into a [`Step`].
pub fn step_fn<S, F, Fut>(f: F) -> Step<S>
where
    S: 'static,
    F: Fn(Context<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Context<S>, Error>> + Send + 'static,
{
    Arc::new(move |ctx: Context<S>| -> BoxFuture<Result<Context<S>, Error>> { Box::pin(f(ctx)) })
}

/// Where the chain stands after a step.
enum Flow<S> {
    Continue(Context<S>),
    /// The context terminated; the response is final.
    Halted(Response),
}

type Chain<S> = Arc<dyn Fn(Context) -> BoxFuture<Result<Flow<S>, Error>> + Send + Sync + 'static>;

/// An ordered sequence of steps ending in a `Context<S>`.
///
/// Pipelines are values: every composition method returns a new pipeline and
/// leaves `self` as it was. Cloning is one `Arc` increment.
pub struct Pipeline<S = ()> {
    chain: Chain<S>,
    len: usize,
}

impl Pipeline<()> {
    pub fn new() -> Self {
        Self {
            chain: Arc::new(|ctx: Context| -> BoxFuture<Result<Flow<()>, Error>> {
                Box::pin(async move { Ok(Flow::Continue(ctx)) })
            }),
            len: 0,
        }
    }
}

impl Default for Pipeline<()> {
    fn default() -> Self { Self::new() }
}

impl<S> Clone for Pipeline<S> {
    fn clone(&self) -> Self {
        Self { chain: Arc::clone(&self.chain), len: self.len }
    }
}

impl<S: Send + 'static> Pipeline<S> {
    /// Number of steps, inherited ones included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends an async step that takes the context and hands back its
    /// successor, possibly with a different state type.
    ///
    /// ```rust
    /// use sluice::{Context, Pipeline};
    ///
    /// struct Session(String);
    ///
    /// let pipeline = Pipeline::new().step(|ctx: Context| async move {
    ///     let token = ctx.request().header("cookie").unwrap_or("anon").to_owned();
    ///     Ok(ctx.with_state(Session(token)))
    /// });
    /// ```
    pub fn step<T, F, Fut>(self, f: F) -> Pipeline<T>
    where
        T: Send + 'static,
        F: Fn(Context<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Context<T>, Error>> + Send + 'static,
    {
        let prev = self.chain;
        let f = Arc::new(f);
        let index = self.len;

        let chain: Chain<T> = Arc::new(move |ctx: Context| -> BoxFuture<Result<Flow<T>, Error>> {
            let head = prev(ctx);
            let f = Arc::clone(&f);
            Box::pin(async move {
                let ctx = match head.await? {
                    Flow::Continue(ctx) => ctx,
                    Flow::Halted(res) => return Ok(Flow::Halted(res)),
                };
                let seal = ctx.seal();
                let ctx = f(ctx).await?;
                if let Some(frozen) = seal.frozen() {
                    trace!(step = index, "pipeline halted");
                    return Ok(Flow::Halted(frozen.clone()));
                }
                if !seal.owns(&ctx) {
                    warn!(step = index, "step returned a foreign context");
                    return Err(Error::ForeignContext);
                }
                Ok(Flow::Continue(ctx))
            })
        });

        Pipeline { chain, len: self.len + 1 }
    }

    /// Appends a synchronous step that works on the context in place.
    pub fn tap<F>(self, f: F) -> Pipeline<S>
    where
        F: Fn(&mut Context<S>) + Send + Sync + 'static,
    {
        self.step(move |mut ctx| {
            f(&mut ctx);
            std::future::ready(Ok(ctx))
        })
    }

    /// Appends a step that stores a freshly computed response.
    ///
    /// Does not terminate: a later step may still replace the response.
    pub fn respond<F, R>(self, f: F) -> Pipeline<S>
    where
        F: Fn(&Context<S>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.tap(move |ctx| {
            let response = f(ctx).into_response();
            ctx.set_response(response);
        })
    }

    /// Appends boxed same-shape steps in order.
    pub fn with_steps(self, steps: impl IntoIterator<Item = Step<S>>) -> Pipeline<S> {
        steps
            .into_iter()
            .fold(self, |pipeline, step| pipeline.step(move |ctx| step(ctx)))
    }

    /// Runs every step against `ctx` and yields the final response.
    ///
    /// Step errors come back unchanged.
    pub fn execute(&self, ctx: Context) -> BoxFuture<Result<Response, Error>> {
        let run = (self.chain)(ctx);
        Box::pin(async move {
            Ok(match run.await? {
                Flow::Continue(ctx) => ctx.into_response(),
                Flow::Halted(res) => res,
            })
        })
    }
}

// ── Type erasure ──────────────────────────────────────────────────────────────

/// A pipeline with its state type hidden, as stored by the router.
pub(crate) trait ErasedPipeline: Send + Sync {
    fn execute(&self, ctx: Context) -> BoxFuture<Result<Response, Error>>;
    fn len(&self) -> usize;
}

pub(crate) type BoxedPipeline = Arc<dyn ErasedPipeline + 'static>;

impl<S: Send + 'static> ErasedPipeline for Pipeline<S> {
    fn execute(&self, ctx: Context) -> BoxFuture<Result<Response, Error>> {
        Pipeline::execute(self, ctx)
    }

    fn len(&self) -> usize {
        self.len
    }
}
