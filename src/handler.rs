//! The transport-facing request callback.

use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// `request -> response`, the one callback a transport needs.
///
/// Cloning shares the same frozen router. `call` never fails: step errors are
/// turned into responses here and nowhere else.
#[derive(Clone)]
pub struct Handler {
    router: Arc<Router>,
}

impl Handler {
    pub(crate) fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    /// Builds a fresh context for `request`, dispatches it and renders the
    /// outcome.
    pub async fn call(&self, request: Request) -> Response {
        let ctx = Context::new(request);
        recover(self.router.dispatch(ctx).await)
    }

    pub(crate) fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

/// Maps a dispatch outcome onto the wire.
///
/// [`Error::Respond`] carries its own response and counts as success.
/// Anything else becomes a `500` with the error text as body.
pub(crate) fn recover(result: Result<Response, Error>) -> Response {
    match result {
        Ok(response) => response,
        Err(Error::Respond(response)) => *response,
        Err(e) => {
            error!(error = %e, "unhandled step error");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text(e.to_string())
        }
    }
}
