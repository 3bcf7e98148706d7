use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use std::sync::{Arc, Mutex};
use strada_core::{MountOptions, Router};

fn send(router: &Router, method: Method, uri: &str) -> Response<Bytes> {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::new())
        .unwrap();
    router.respond(req)
}

fn body(response: &Response<Bytes>) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

#[test]
fn group_prefix_and_middleware_apply() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let router = Router::new();
    let o = order.clone();
    let api = router.group("/api").use_middleware(move |ctx| {
        o.lock().unwrap().push("api-mw");
        ctx.next();
    });
    let o = order.clone();
    api.get("/users", move |ctx| {
        o.lock().unwrap().push("handler");
        ctx.string(StatusCode::OK, "users").unwrap();
    });

    let response = send(&router, Method::GET, "/api/users");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*order.lock().unwrap(), vec!["api-mw", "handler"]);
}

#[test]
fn nested_groups_accumulate_prefix_and_middleware() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let router = Router::new();
    let o = order.clone();
    let api = router.group("/api").use_middleware(move |ctx| {
        o.lock().unwrap().push("api");
        ctx.next();
    });
    let admin = api.group("/admin");
    let o = order.clone();
    admin.get("/stats", move |ctx| {
        o.lock().unwrap().push("stats");
        ctx.string(StatusCode::OK, "stats").unwrap();
    });

    let response = send(&router, Method::GET, "/api/admin/stats");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*order.lock().unwrap(), vec!["api", "stats"]);
}

#[test]
fn mount_inherits_global_and_adds_extra_middleware() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let sub = Router::new();
    let o = order.clone();
    sub.get("/list", move |ctx| {
        o.lock().unwrap().push("handler");
        ctx.string(StatusCode::OK, "list").unwrap();
    });

    let router = Router::new();
    let o = order.clone();
    router.use_middleware(move |ctx| {
        o.lock().unwrap().push("m1");
        ctx.next();
    });
    let o = order.clone();
    router.mount(
        "/admin",
        sub,
        MountOptions::new().middleware(move |ctx| {
            o.lock().unwrap().push("m2");
            ctx.next();
        }),
    );

    let response = send(&router, Method::GET, "/admin/list");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*order.lock().unwrap(), vec!["m1", "m2", "handler"]);
}

#[test]
fn mount_can_opt_out_of_global_middleware() {
    let hits = Arc::new(Mutex::new(Vec::new()));

    let sub = Router::new();
    sub.get("/list", |ctx| {
        ctx.string(StatusCode::OK, "list").unwrap();
    });

    let router = Router::new();
    let h = hits.clone();
    router.use_middleware(move |ctx| {
        h.lock().unwrap().push("global");
        ctx.next();
    });
    router.mount(
        "/internal",
        sub,
        MountOptions::new().inherit_middleware(false),
    );

    let response = send(&router, Method::GET, "/internal/list");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(hits.lock().unwrap().is_empty());
}

#[test]
fn mount_preserves_subrouter_global_middleware() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let sub = Router::new();
    let o = order.clone();
    sub.use_middleware(move |ctx| {
        o.lock().unwrap().push("sub-global");
        ctx.next();
    });
    let o = order.clone();
    sub.get("/list", move |ctx| {
        o.lock().unwrap().push("handler");
        ctx.string(StatusCode::OK, "list").unwrap();
    });

    let router = Router::new();
    router.mount("/admin", sub, MountOptions::new());

    send(&router, Method::GET, "/admin/list");
    assert_eq!(*order.lock().unwrap(), vec!["sub-global", "handler"]);
}

#[test]
fn mount_name_prefix_feeds_reverse_routing() {
    let sub = Router::new();
    sub.get("/users/:id", |_| {}).name("users.show");

    let router = Router::new();
    router.mount(
        "/admin",
        sub,
        MountOptions::new().name_prefix("admin."),
    );
    router.freeze();

    let url = router.url_for("admin.users.show", &[("id", "7")]).unwrap();
    assert_eq!(url, "/admin/users/7");
}

#[test]
fn mount_subtree_not_found_handler() {
    let sub = Router::new();
    sub.get("/list", |ctx| {
        ctx.string(StatusCode::OK, "list").unwrap();
    });

    let router = Router::new();
    router.mount(
        "/admin",
        sub,
        MountOptions::new().not_found(|ctx| {
            ctx.string(StatusCode::NOT_FOUND, "admin missing").unwrap();
        }),
    );

    assert_eq!(body(&send(&router, Method::GET, "/admin/list")), "list");

    let response = send(&router, Method::GET, "/admin/unknown");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(&response), "admin missing");

    // Outside the subtree the router-level default applies.
    let response = send(&router, Method::GET, "/elsewhere");
    assert_eq!(body(&response), r#"{"error":"not found"}"#);
}

#[test]
fn url_for_builds_and_merges_query() {
    let router = Router::new();
    router.get("/users/:id/posts/:post", |_| {}).name("post.show");
    router.freeze();

    let url = router
        .url_for("post.show", &[("id", "42"), ("post", "7"), ("tab", "comments")])
        .unwrap();
    assert_eq!(url, "/users/42/posts/7?tab=comments");

    let err = router.url_for("post.show", &[("id", "42")]).unwrap_err();
    assert_eq!(err.to_string(), "route post.show requires parameter :post");

    let err = router.url_for("unknown", &[]).unwrap_err();
    assert_eq!(err.to_string(), "no route named unknown");
}

#[test]
fn url_for_before_freeze_is_an_error() {
    let router = Router::new();
    router.get("/users/:id", |_| {}).name("users.show");
    let err = router.url_for("users.show", &[("id", "1")]).unwrap_err();
    assert!(err.to_string().contains("freeze"));
}

#[test]
fn versioned_group_routes_land_in_the_version_tree() {
    let router = Router::new();
    router.with_version_config(
        strada_core::VersionConfig::new()
            .header("X-API-Version")
            .default_version("v1"),
    );
    let v2 = router.version("v2");
    let api = v2.group("/api");
    api.get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v2 api users").unwrap();
    });

    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/users")
        .header("x-api-version", "v2")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(body(&router.respond(req)), "v2 api users");

    // Without the header the default (v1) tree has no such route.
    assert_eq!(
        send(&router, Method::GET, "/api/users").status(),
        StatusCode::NOT_FOUND
    );
}
