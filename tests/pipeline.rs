//! End-to-end routing and pipeline behaviour through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use http::StatusCode;
use sluice::{Context, Error, Listener, Method, Request, Response, RouteOptions, Router, step_fn};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn logger(log: &Log, name: &'static str) -> impl Fn(&mut Context) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_| log.lock().unwrap().push(name)
}

fn listener(router: Router) -> Listener {
    Listener::custom(router, |_, mut shutdown| async move {
        shutdown.cancelled().await;
        Ok(())
    })
}

async fn call(listener: &Listener, method: &str, url: &str) -> Response {
    listener.handler().call(Request::new(method, url)).await
}

/// GET "/" with one `respond` step answers "ok" with the default 200.
#[tokio::test]
async fn test_respond_ok() {
    let mut router = Router::new();
    router
        .register("/", Method::Get, RouteOptions::new())
        .unwrap()
        .respond(|_| Response::text("ok"));

    let res = call(&listener(router), "GET", "/").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), "ok");
}

/// A step that terminates freezes the response; the next step never runs.
#[tokio::test]
async fn test_termination_freezes_response() {
    let log = Log::default();
    let mut router = Router::new();
    router
        .register("/a", Method::Get, RouteOptions::new())
        .unwrap()
        .step(|ctx: Context| async move { Ok(ctx.with_state("alice")) })
        .tap(|ctx| {
            let name = *ctx.state();
            ctx.set_response(format!("hello {name}"));
            ctx.terminate();
        })
        .tap({
            let log = Arc::clone(&log);
            move |ctx| {
                log.lock().unwrap().push("second");
                ctx.set_response("unreachable");
            }
        });

    let res = call(&listener(router), "GET", "/a").await;
    assert_eq!(res.body(), "hello alice");
    assert!(log.lock().unwrap().is_empty());
}

/// POST to an unknown path gets the default 404.
#[tokio::test]
async fn test_missing_route() {
    let mut router = Router::new();
    router.register("/missing", Method::Get, RouteOptions::new()).unwrap();

    let res = call(&listener(router), "POST", "/missing").await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), "Not found.");
}

/// A ResponseError carrying a 403 comes back verbatim.
#[tokio::test]
async fn test_response_error_passthrough() {
    let forbidden = Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header("www-authenticate", "Bearer")
        .text("forbidden");
    let expected = forbidden.clone();

    let mut router = Router::new();
    router
        .register("/admin", Method::Get, RouteOptions::new())
        .unwrap()
        .step(move |_ctx: Context| {
            let forbidden = forbidden.clone();
            async move { Err::<Context, _>(Error::respond(forbidden)) }
        });

    assert_eq!(call(&listener(router), "GET", "/admin").await, expected);
}

/// Any other step error becomes a 500 whose body is the error text.
#[tokio::test]
async fn test_plain_error_is_500() {
    let mut router = Router::new();
    router
        .register("/boom", Method::Patch, RouteOptions::new())
        .unwrap()
        .step(|_ctx: Context| async { Err::<Context, _>(Error::step("boom")) });

    let res = call(&listener(router), "PATCH", "/boom").await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body(), "boom");
}

/// Steps run in registration order, seeded steps first, across many requests.
#[tokio::test]
async fn test_registration_order_with_query() {
    let log = Log::default();
    let seeded = {
        let log = Arc::clone(&log);
        step_fn(move |ctx: Context| {
            log.lock().unwrap().push("seeded");
            async move { Ok(ctx) }
        })
    };

    let mut router = Router::new();
    router
        .register("/orders", Method::Post, RouteOptions { steps: vec![seeded] })
        .unwrap()
        .tap(logger(&log, "first"))
        .tap(logger(&log, "second"));

    let listener = listener(router);
    call(&listener, "post", "/orders?draft=true#summary").await;
    call(&listener, "POST", "/orders").await;

    assert_eq!(
        *log.lock().unwrap(),
        ["seeded", "first", "second", "seeded", "first", "second"]
    );
}

/// Unregistered keys never touch a step, whatever the method.
#[tokio::test]
async fn test_unregistered_runs_no_step() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut router = Router::new();
    for method in [Method::Get, Method::Put] {
        let hits = Arc::clone(&hits);
        router
            .register("/only", method, RouteOptions::new())
            .unwrap()
            .tap(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
    }

    let listener = listener(router);
    for (method, url) in [("DELETE", "/only"), ("GET", "/only/"), ("GET", "/other"), ("FETCH", "/only")] {
        assert_eq!(call(&listener, method, url).await, Response::not_found());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    call(&listener, "PUT", "/only").await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Re-registering a key drops the earlier pipeline entirely.
#[tokio::test]
async fn test_overwrite_uses_only_second_pipeline() {
    let log = Log::default();
    let mut router = Router::new();
    router
        .register("/dup", Method::Get, RouteOptions::new())
        .unwrap()
        .tap(logger(&log, "old"));
    router
        .register("/dup", Method::Get, RouteOptions::new())
        .unwrap()
        .tap(logger(&log, "new"))
        .respond(|_| "second");

    let res = call(&listener(router), "GET", "/dup").await;
    assert_eq!(res.body(), "second");
    assert_eq!(*log.lock().unwrap(), ["new"]);
}

/// A derived route runs all of its parent's steps before its own, and
/// inherits the parent's typed state.
#[tokio::test]
async fn test_derived_route_composition() {
    let log = Log::default();
    let mut router = Router::new();

    let mut users = router
        .register("/users", Method::Get, RouteOptions::new())
        .unwrap()
        .tap(logger(&log, "auth"))
        .step(|ctx: Context| async move { Ok(ctx.with_state(42_u64)) });

    users
        .route("/me", Method::Get, RouteOptions::new().step(|ctx: Context<u64>| async move {
            Ok(ctx.map_state(|id| id + 1))
        }))
        .unwrap()
        .respond(|ctx| format!("user {}", ctx.state()));

    users
        .route("/bad", Method::Get, RouteOptions::new())
        .unwrap()
        .tap(|ctx| ctx.end(StatusCode::BAD_REQUEST))
        .respond(|_| "unreachable");

    let listener = listener(router);

    let res = call(&listener, "GET", "/users/me").await;
    assert_eq!(res.body(), "user 43");

    let res = call(&listener, "GET", "/users/bad").await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    // The parent route itself only has its own two steps.
    let res = call(&listener, "GET", "/users").await;
    assert_eq!(res, Response::not_found());
    assert_eq!(*log.lock().unwrap(), ["auth", "auth", "auth"]);
}

/// Registration rejects paths without a leading `/`.
#[test]
fn test_invalid_paths_are_rejected() {
    let mut router = Router::new();
    assert!(matches!(
        router.register("", Method::Get, RouteOptions::new()),
        Err(Error::InvalidRoute(_))
    ));
    assert!(router.register("/", Method::Get, RouteOptions::new()).is_ok());
    assert_eq!(router.len(), 1);
}

/// Terminating twice is harmless and the first response sticks.
#[tokio::test]
async fn test_double_termination() {
    let mut router = Router::new();
    router
        .register("/twice", Method::Get, RouteOptions::new())
        .unwrap()
        .tap(|ctx| {
            ctx.end("once");
            ctx.end("twice");
            ctx.terminate();
        });

    let listener = listener(router);
    assert_eq!(call(&listener, "GET", "/twice").await.body(), "once");
    assert_eq!(listener.fake_call(Request::new("GET", "/twice")).await.body(), "once");
}

/// Concurrent requests get independent contexts.
#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let mut router = Router::new();
    router
        .register("/echo", Method::Post, RouteOptions::new())
        .unwrap()
        .step(|ctx: Context| async move {
            tokio::task::yield_now().await;
            let body = ctx.request().body().clone();
            Ok(ctx.with_state(body))
        })
        .respond(|ctx| Response::text(String::from_utf8_lossy(ctx.state()).into_owned()));

    let handler = listener(router).handler();
    let calls = (0..16).map(|i| {
        let handler = handler.clone();
        tokio::spawn(async move {
            let res = handler.call(Request::new("POST", "/echo").with_body(i.to_string())).await;
            (i, res)
        })
    });

    for call in calls.collect::<Vec<_>>() {
        let (i, res) = call.await.unwrap();
        assert_eq!(res.body(), i.to_string().as_str());
    }
}
