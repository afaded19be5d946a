//! Exact-match request router.
//!
//! One hash map keyed on `(Method, path)`. No parameters, no wildcards: the
//! path a request carries (minus query and fragment) either names a route or
//! it does not.
//!
//! Registration takes `&mut Router`; serving takes the router by value. Once
//! a [`Listener`](crate::Listener) owns it, the table is read-only.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::error::Error;
use crate::method::Method;
use crate::pipeline::{BoxedPipeline, Pipeline, Step, step_fn};
use crate::request::route_path;
use crate::response::{IntoResponse, Response};

/// The `(method, path)` pair a pipeline is registered under.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RouteKey {
    pub method: Method,
    pub path: String,
}

/// Steps to seed a route with.
pub struct RouteOptions<S = ()> {
    pub steps: Vec<Step<S>>,
}

impl<S: 'static> RouteOptions<S> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends an async, same-shape step.
    pub fn step<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Context<S>, Error>> + Send + 'static,
    {
        self.steps.push(step_fn(f));
        self
    }
}

impl<S: 'static> Default for RouteOptions<S> {
    fn default() -> Self { Self::new() }
}

/// The application router.
///
/// ```rust
/// use sluice::{Method, Response, RouteOptions, Router};
///
/// let mut router = Router::new();
/// router
///     .register("/", Method::Get, RouteOptions::new())?
///     .respond(|_| Response::text("ok"));
/// assert!(router.contains(Method::Get, "/"));
/// # Ok::<(), sluice::Error>(())
/// ```
pub struct Router {
    routes: HashMap<RouteKey, BoxedPipeline>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers a pipeline seeded with `options.steps` under `(method, path)`.
    ///
    /// An existing route with the same key is replaced. The returned
    /// [`Branch`] keeps extending this route.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRoute`] if `path` does not start with `/`.
    pub fn register(
        &mut self,
        path: &str,
        method: Method,
        options: RouteOptions,
    ) -> Result<Branch<'_>, Error> {
        let pipeline = Pipeline::new().with_steps(options.steps);
        self.branch(method, path.to_owned(), pipeline)
    }

    fn branch<S: Send + 'static>(
        &mut self,
        method: Method,
        path: String,
        pipeline: Pipeline<S>,
    ) -> Result<Branch<'_, S>, Error> {
        if !path.starts_with('/') {
            return Err(Error::InvalidRoute(path));
        }
        let key = RouteKey { method, path };
        self.insert(&key, pipeline.clone());
        Ok(Branch { router: self, key, pipeline })
    }

    fn insert<S: Send + 'static>(&mut self, key: &RouteKey, pipeline: Pipeline<S>) {
        debug!(method = %key.method, path = %key.path, steps = pipeline.len(), "route registered");
        self.routes.insert(key.clone(), Arc::new(pipeline));
    }

    /// Routes `ctx` to its pipeline and runs it.
    ///
    /// With no matching route the context's current response, the default
    /// 404, comes back and no step runs. Step errors are returned untouched.
    pub async fn dispatch(&self, ctx: Context) -> Result<Response, Error> {
        match self.lookup(ctx.request().method(), ctx.request().url()) {
            Some(pipeline) => pipeline.execute(ctx).await,
            None => {
                debug!(method = ctx.request().method(), path = ctx.request().path(), "no route");
                Ok(ctx.into_response())
            }
        }
    }

    fn lookup(&self, method: &str, url: &str) -> Option<BoxedPipeline> {
        let key = RouteKey {
            method: Method::from_request(method)?,
            path: route_path(url).to_owned(),
        };
        self.routes.get(&key).map(Arc::clone)
    }

    pub fn contains(&self, method: Method, path: &str) -> bool {
        self.routes.contains_key(&RouteKey { method, path: path.to_owned() })
    }

    /// Number of steps registered for a route, if it exists.
    pub fn steps(&self, method: Method, path: &str) -> Option<usize> {
        self.routes
            .get(&RouteKey { method, path: path.to_owned() })
            .map(|pipeline| pipeline.len())
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteKey> {
        self.routes.keys()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

// ── Branch ────────────────────────────────────────────────────────────────────

/// A registered route that can still grow.
///
/// Every extension re-registers the route with the longer pipeline.
/// [`route`](Branch::route) derives a sibling route that starts with this
/// branch's steps.
///
/// ```rust
/// use sluice::{Context, Method, Response, RouteOptions, Router};
///
/// let mut router = Router::new();
/// let mut api = router
///     .register("/api", Method::Get, RouteOptions::new())?
///     .tap(|ctx: &mut Context| { ctx.set_response("api root"); });
///
/// api.route("/users", Method::Get, RouteOptions::new())?
///     .respond(|_| Response::json(r#"[]"#));
/// # Ok::<(), sluice::Error>(())
/// ```
pub struct Branch<'r, S = ()> {
    router: &'r mut Router,
    key: RouteKey,
    pipeline: Pipeline<S>,
}

impl<'r, S: Send + 'static> Branch<'r, S> {
    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    /// The pipeline currently registered for this branch.
    pub fn pipeline(&self) -> &Pipeline<S> {
        &self.pipeline
    }

    /// See [`Pipeline::step`].
    pub fn step<T, F, Fut>(self, f: F) -> Branch<'r, T>
    where
        T: Send + 'static,
        F: Fn(Context<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Context<T>, Error>> + Send + 'static,
    {
        self.extend(|pipeline| pipeline.step(f))
    }

    /// See [`Pipeline::tap`].
    pub fn tap<F>(self, f: F) -> Branch<'r, S>
    where
        F: Fn(&mut Context<S>) + Send + Sync + 'static,
    {
        self.extend(|pipeline| pipeline.tap(f))
    }

    /// See [`Pipeline::respond`].
    pub fn respond<F, R>(self, f: F) -> Branch<'r, S>
    where
        F: Fn(&Context<S>) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.extend(|pipeline| pipeline.respond(f))
    }

    /// Registers `method` on `self.path + suffix` with this branch's steps
    /// followed by `options.steps`. This branch is left unchanged.
    pub fn route(
        &mut self,
        suffix: &str,
        method: Method,
        options: RouteOptions<S>,
    ) -> Result<Branch<'_, S>, Error> {
        let path = format!("{}{suffix}", self.key.path);
        let pipeline = self.pipeline.clone().with_steps(options.steps);
        self.router.branch(method, path, pipeline)
    }

    fn extend<T: Send + 'static>(self, f: impl FnOnce(Pipeline<S>) -> Pipeline<T>) -> Branch<'r, T> {
        let Branch { router, key, pipeline } = self;
        let pipeline = f(pipeline);
        router.insert(&key, pipeline.clone());
        Branch { router, key, pipeline }
    }
}
