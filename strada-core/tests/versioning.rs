use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Method, Request, Response, StatusCode};
use std::sync::{Arc, Mutex};
use strada_core::version::{VersionEvent, VersionObserver};
use strada_core::{Router, VersionConfig};

fn get(router: &Router, uri: &str, headers: &[(&str, &str)]) -> Response<Bytes> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    router.respond(builder.body(Bytes::new()).unwrap())
}

fn body(response: &Response<Bytes>) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

/// Captures detection outcomes for assertions.
#[derive(Default)]
struct Recording {
    events: Mutex<Vec<String>>,
}

impl VersionObserver for Recording {
    fn on_event(&self, event: VersionEvent<'_>) {
        let line = match event {
            VersionEvent::Detected { version, source } => format!("detected:{version}:{source}"),
            VersionEvent::Missing => "missing".to_string(),
            VersionEvent::Invalid { attempted } => format!("invalid:{attempted}"),
        };
        self.events.lock().unwrap().push(line);
    }
}

fn versioned_router() -> (Router, Arc<Recording>) {
    let observer = Arc::new(Recording::default());
    let router = Router::new();
    router.with_version_config(
        VersionConfig::new()
            .header("X-API-Version")
            .valid_versions(["v1", "v2"])
            .default_version("v1"),
    );
    router.with_version_observer(observer.clone());
    router.version("v1").get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v1 users").unwrap();
    });
    router.version("v2").get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v2 users").unwrap();
    });
    (router, observer)
}

#[test]
fn header_selects_the_version_tree() {
    let (router, _) = versioned_router();
    let response = get(&router, "/users", &[("x-api-version", "v2")]);
    assert_eq!(body(&response), "v2 users");
}

#[test]
fn missing_header_applies_the_default() {
    let (router, _) = versioned_router();
    let response = get(&router, "/users", &[]);
    assert_eq!(body(&response), "v1 users");
}

#[test]
fn invalid_version_falls_back_and_emits_event() {
    let (router, observer) = versioned_router();
    let response = get(&router, "/users", &[("x-api-version", "v99")]);
    assert_eq!(body(&response), "v1 users");
    assert!(observer
        .events
        .lock()
        .unwrap()
        .contains(&"invalid:v99".to_string()));
}

#[test]
fn main_tree_wins_regardless_of_version_header() {
    let (router, _) = versioned_router();
    router.get("/health", |ctx| {
        ctx.string(StatusCode::OK, "healthy").unwrap();
    });

    let response = get(&router, "/health", &[("x-api-version", "v2")]);
    assert_eq!(body(&response), "healthy");
}

#[test]
fn resolved_version_is_visible_to_the_handler() {
    let router = Router::new();
    router.with_version_config(
        VersionConfig::new()
            .header("X-API-Version")
            .default_version("v1"),
    );
    router.version("v2").get("/whoami", |ctx| {
        let version = ctx.version().to_string();
        ctx.string(StatusCode::OK, &version).unwrap();
    });

    let response = get(&router, "/whoami", &[("x-api-version", "v2")]);
    assert_eq!(body(&response), "v2");
}

#[test]
fn deprecation_headers_on_versioned_match() {
    let router = Router::new();
    router.with_version_config(
        VersionConfig::new()
            .header("X-API-Version")
            .valid_versions(["v1", "v2"])
            .default_version("v1"),
    );
    let sunset: DateTime<Utc> = DateTime::parse_from_rfc3339("2026-06-30T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let v1 = router.version("v1");
    v1.deprecated()
        .sunset(sunset)
        .migration_url("https://api.example.com/migrate-to-v2");
    v1.get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v1 users").unwrap();
    });
    router.version("v2").get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v2 users").unwrap();
    });

    let response = get(&router, "/users", &[("x-api-version", "v1")]);
    assert_eq!(response.headers().get("deprecation").unwrap(), "true");
    assert_eq!(
        response.headers().get("sunset").unwrap(),
        "Tue, 30 Jun 2026 00:00:00 GMT"
    );
    assert_eq!(
        response.headers().get("link").unwrap(),
        "<https://api.example.com/migrate-to-v2>; rel=\"deprecation\""
    );

    // The non-deprecated version stays header-free.
    let response = get(&router, "/users", &[("x-api-version", "v2")]);
    assert!(response.headers().get("deprecation").is_none());
}

#[test]
fn path_template_strips_the_prefix_before_routing() {
    let router = Router::new();
    router.with_version_config(
        VersionConfig::new()
            .path_template("/{version}/")
            .valid_versions(["v1", "v2"])
            .default_version("v1"),
    );
    router.version("v2").get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v2 users").unwrap();
    });
    router.version("v1").get("/", |ctx| {
        ctx.string(StatusCode::OK, "v1 root").unwrap();
    });

    let response = get(&router, "/v2/users", &[]);
    assert_eq!(body(&response), "v2 users");

    // `/v1` and `/v1/` are equivalent for the root match.
    assert_eq!(body(&get(&router, "/v1", &[])), "v1 root");
    assert_eq!(body(&get(&router, "/v1/", &[])), "v1 root");
}

#[test]
fn query_detection_routes_to_the_version() {
    let router = Router::new();
    router.with_version_config(
        VersionConfig::new()
            .query_param("api_version")
            .default_version("v1"),
    );
    router.version("v1").get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v1 users").unwrap();
    });
    router.version("v2").get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v2 users").unwrap();
    });

    assert_eq!(body(&get(&router, "/users?api_version=v2", &[])), "v2 users");
    assert_eq!(body(&get(&router, "/users", &[])), "v1 users");
}

#[test]
fn accept_template_detection_routes_to_the_version() {
    let router = Router::new();
    router.with_version_config(
        VersionConfig::new()
            .accept_template("application/vnd.example.{version}+json")
            .default_version("v1"),
    );
    router.version("v2").get("/users", |ctx| {
        ctx.string(StatusCode::OK, "v2 users").unwrap();
    });

    let response = get(
        &router,
        "/users",
        &[("accept", "application/vnd.example.v2+json")],
    );
    assert_eq!(body(&response), "v2 users");
}

#[test]
fn versioned_miss_yields_404_not_a_main_route() {
    let (router, _) = versioned_router();
    let response = get(&router, "/unknown", &[("x-api-version", "v2")]);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
