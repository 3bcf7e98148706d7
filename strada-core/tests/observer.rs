use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strada_core::{Context, ObserverState, RequestObserver, ResponseInfo, Router};

fn send(router: &Router, uri: &str) -> Response<Bytes> {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Bytes::new())
        .unwrap();
    router.respond(req)
}

/// Records `(pattern, status, bytes)` per completed request; requests to
/// `/excluded` are marked observability-excluded.
#[derive(Default)]
struct Recording {
    started: AtomicUsize,
    completed: Mutex<Vec<(String, u16, u64)>>,
}

impl RequestObserver for Recording {
    fn on_request_start(&self, ctx: &mut Context) -> Option<ObserverState> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let path = ctx.request().map(|r| r.uri().path().to_string())?;
        if path == "/excluded" {
            return None;
        }
        Some(Box::new(path))
    }

    fn on_request_end(
        &self,
        _ctx: &Context,
        _state: ObserverState,
        info: ResponseInfo,
        pattern: &str,
    ) {
        self.completed.lock().unwrap().push((
            pattern.to_string(),
            info.status.as_u16(),
            info.bytes_written,
        ));
    }
}

fn observed_router() -> (Router, Arc<Recording>) {
    let observer = Arc::new(Recording::default());
    let router = Router::new();
    router.with_observer(observer.clone());
    router.get("/users/:id", |ctx| {
        ctx.string(StatusCode::OK, "user").unwrap();
    });
    router.get("/excluded", |ctx| {
        ctx.string(StatusCode::OK, "quiet").unwrap();
    });
    (router, observer)
}

#[test]
fn end_hook_receives_the_matched_pattern_not_the_raw_path() {
    let (router, observer) = observed_router();
    send(&router, "/users/42");

    let completed = observer.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    let (pattern, status, bytes) = &completed[0];
    assert_eq!(pattern, "/users/:id");
    assert_eq!(*status, 200);
    assert_eq!(*bytes, 4);
}

#[test]
fn excluded_requests_skip_the_end_hook_but_still_start() {
    let (router, observer) = observed_router();
    send(&router, "/excluded");

    assert_eq!(observer.started.load(Ordering::SeqCst), 1);
    assert!(observer.completed.lock().unwrap().is_empty());
}

#[test]
fn end_hook_runs_after_a_middleware_abort() {
    let observer = Arc::new(Recording::default());
    let router = Router::new();
    router.with_observer(observer.clone());
    router.use_middleware(|ctx| {
        ctx.abort_with_status(StatusCode::FORBIDDEN).unwrap();
    });
    router.get("/blocked", |ctx| {
        ctx.string(StatusCode::OK, "never").unwrap();
    });

    let response = send(&router, "/blocked");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let completed = observer.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].1, 403);
}

#[test]
fn unmatched_requests_report_an_empty_pattern() {
    let (router, observer) = observed_router();
    send(&router, "/nope");

    let completed = observer.completed.lock().unwrap();
    assert_eq!(completed[0].0, "");
    assert_eq!(completed[0].1, 404);
}

/// Panics in hooks must not corrupt the pipeline.
struct Panicking;

impl RequestObserver for Panicking {
    fn on_request_start(&self, _ctx: &mut Context) -> Option<ObserverState> {
        panic!("start hook exploded");
    }

    fn on_request_end(
        &self,
        _ctx: &Context,
        _state: ObserverState,
        _info: ResponseInfo,
        _pattern: &str,
    ) {
        panic!("end hook exploded");
    }
}

#[test]
fn hook_panics_are_suppressed() {
    let router = Router::new();
    router.with_observer(Arc::new(Panicking));
    router.get("/ping", |ctx| {
        ctx.string(StatusCode::OK, "pong").unwrap();
    });

    let response = send(&router, "/ping");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"pong");
}
