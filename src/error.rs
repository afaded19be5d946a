//! Unified error type.

use thiserror::Error;

use crate::response::{IntoResponse, Response};

/// Boxed error accepted from step code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by sluice's fallible operations.
///
/// Route misconfiguration surfaces at registration time. Errors raised by
/// steps travel through the pipeline and the router untouched; only the
/// [`Listener`](crate::Listener) turns them into responses.
#[derive(Debug, Error)]
pub enum Error {
    /// A route path did not start with `/`.
    #[error("invalid route `{0}`: path must start with `/`")]
    InvalidRoute(String),

    /// Listener configuration could not be used.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Binding or accepting in the built-in listen mode failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A step short-circuited with a complete response.
    ///
    /// The listener returns the carried response as-is.
    #[error("responded early with status {}", .0.status_code())]
    Respond(Box<Response>),

    /// A step returned a context built for a different request instead of
    /// evolving the one it was given.
    #[error("step returned a context that belongs to another request")]
    ForeignContext,

    /// Any other step failure. Rendered as a `500` whose body is this text.
    #[error("{0}")]
    Step(BoxError),
}

impl Error {
    /// Short-circuits the request with `response`.
    ///
    /// ```rust
    /// use sluice::{Context, Error};
    /// use http::StatusCode;
    ///
    /// async fn require_token(ctx: Context) -> Result<Context, Error> {
    ///     if ctx.request().header("authorization").is_none() {
    ///         return Err(Error::respond(StatusCode::FORBIDDEN));
    ///     }
    ///     Ok(ctx)
    /// }
    /// ```
    pub fn respond(response: impl IntoResponse) -> Self {
        Self::Respond(Box::new(response.into_response()))
    }

    /// Wraps an arbitrary step failure.
    pub fn step(err: impl Into<BoxError>) -> Self {
        Self::Step(err.into())
    }
}
