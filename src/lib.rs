//! # sluice
//!
//! A minimal HTTP routing and step-pipeline engine.
//!
//! ## The contract
//!
//! A request is matched on its exact `(method, path)`. The matching route's
//! steps then run one after another against a per-request [`Context`]. Any
//! step may read or evolve the context, replace the response, or terminate
//! the pipeline. Whatever response the context holds at the end goes back to
//! the client.
//!
//! Sockets, TLS and connection scheduling belong to the transport. sluice
//! ships one (a hyper accept loop), but any transport can drive a [`Handler`].
//!
//! - Exact routing: no parameters, no wildcards, no regex.
//! - Typed context: each step declares what it adds, checked at compile time.
//! - Early termination: once a context terminates, no later step runs.
//! - One catch boundary: step errors travel untouched to the [`Listener`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sluice::{Context, Error, ListenOptions, Listener, Method, Response, RouteOptions, Router};
//! use http::StatusCode;
//!
//! struct User { name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut router = Router::new();
//!
//!     router
//!         .register("/me", Method::Get, RouteOptions::new())?
//!         .step(authenticate)
//!         .respond(|ctx| Response::text(format!("hello, {}", ctx.state().name)));
//!
//!     Listener::serve(router, ListenOptions::default()).listen().await
//! }
//!
//! async fn authenticate(ctx: Context) -> Result<Context<User>, Error> {
//!     match ctx.request().header("x-user") {
//!         Some(name) => {
//!             let name = name.to_owned();
//!             Ok(ctx.with_state(User { name }))
//!         }
//!         None => Err(Error::respond(StatusCode::UNAUTHORIZED)),
//!     }
//! }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod listener;
mod method;
mod pipeline;
mod request;
mod response;
mod router;

pub use config::{DEFAULT_MAX_BODY, ListenOptions};
pub use context::{Context, Phase};
pub use error::{BoxError, Error};
pub use handler::Handler;
pub use listener::{Listener, Shutdown};
pub use method::Method;
pub use pipeline::{BoxFuture, Pipeline, Step, step_fn};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Branch, RouteKey, RouteOptions, Router};
