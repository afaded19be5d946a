//! Minimal sluice example — a typed auth step, a derived route and an early exit.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8000/
//!   curl http://localhost:8000/api -H 'x-user: alice'
//!   curl -X POST http://localhost:8000/api/echo -H 'x-user: alice' -d 'hi'
//!   curl http://localhost:8000/api                      # 401
//!   curl http://localhost:8000/api/maintenance -H 'x-user: alice'

use http::StatusCode;
use sluice::{Context, Error, ListenOptions, Listener, Method, Response, RouteOptions, Router};

struct User {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let mut router = Router::new();

    router
        .register("/", Method::Get, RouteOptions::new())?
        .respond(|_| "ok");

    // Every route derived from `/api` runs `authenticate` first.
    let mut api = router
        .register("/api", Method::Get, RouteOptions::new())?
        .step(authenticate);

    api.route("/echo", Method::Post, RouteOptions::new())?
        .respond(|ctx| {
            let body = String::from_utf8_lossy(ctx.request().body()).into_owned();
            Response::text(format!("{} says {body}", ctx.state().name))
        });

    api.route("/maintenance", Method::Get, RouteOptions::new())?
        .tap(|ctx| ctx.end(Response::builder().status(StatusCode::SERVICE_UNAVAILABLE).text("back soon")))
        .respond(|_| "unreachable");

    api.respond(|ctx| Response::text(format!("hello, {}", ctx.state().name)));

    Listener::serve(router, ListenOptions::from_env()?).listen().await
}

// Moves the caller's name into the typed state, or short-circuits with 401.
async fn authenticate(ctx: Context) -> Result<Context<User>, Error> {
    let Some(name) = ctx.request().header("x-user").map(str::to_owned) else {
        return Err(Error::respond(StatusCode::UNAUTHORIZED));
    };
    Ok(ctx.with_state(User { name }))
}
