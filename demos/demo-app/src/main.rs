use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use strada::prelude::*;
use strada::{ObserverState, ResponseInfo, WILDCARD_PARAM};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Logs one line per request through the observability hooks, excluding
/// the health endpoint.
struct AccessLog;

impl RequestObserver for AccessLog {
    fn on_request_start(&self, ctx: &mut Context) -> Option<ObserverState> {
        let path = ctx.request().map(|r| r.uri().path()).unwrap_or("");
        if path == "/health" {
            return None;
        }
        Some(Box::new(Instant::now()))
    }

    fn on_request_end(
        &self,
        _ctx: &Context,
        state: ObserverState,
        info: ResponseInfo,
        pattern: &str,
    ) {
        if let Ok(start) = state.downcast::<Instant>() {
            tracing::info!(
                pattern,
                status = info.status.as_u16(),
                bytes = info.bytes_written,
                elapsed_us = start.elapsed().as_micros() as u64,
                "request"
            );
        }
    }
}

fn build_router() -> Router {
    let router = Router::new();
    router.with_observer(Arc::new(AccessLog));

    router.get("/health", |ctx| {
        ctx.json(StatusCode::OK, &json!({ "status": "up" })).ok();
    });

    router.get("/static/*", |ctx| {
        let asset = ctx.param(WILDCARD_PARAM).to_string();
        ctx.string(StatusCode::OK, &format!("asset: {asset}")).ok();
    });

    let api = router.group("/api").use_middleware(|ctx| {
        ctx.set_header(
            http::header::HeaderName::from_static("x-served-by"),
            http::header::HeaderValue::from_static("strada-demo"),
        )
        .ok();
        ctx.next();
    });
    api.get("/users/:id", |ctx| {
        let id = ctx.param("id").to_string();
        ctx.json(StatusCode::OK, &json!({ "id": id, "name": format!("user-{id}") }))
            .ok();
    })
    .where_int("id")
    .name("users.show");

    // Versioned surface: v1 is deprecated in favour of v2.
    router.with_version_config(
        VersionConfig::new()
            .header("X-API-Version")
            .valid_versions(["v1", "v2"])
            .default_version("v1"),
    );
    let v1 = router.version("v1");
    v1.deprecated()
        .sunset(Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap())
        .migration_url("https://example.com/docs/migrate-to-v2");
    v1.get("/greeting", |ctx| {
        ctx.json(StatusCode::OK, &json!({ "greeting": "hello from v1" }))
            .ok();
    });
    router.version("v2").get("/greeting", |ctx| {
        ctx.json(StatusCode::OK, &json!({ "greeting": "hello from v2" }))
            .ok();
    });

    router
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let router = build_router();
    router.warmup(32, 8, 2);
    for route in router.routes() {
        tracing::info!(method = %route.method, pattern = %route.pattern, version = ?route.version, "route");
    }
    let router = Arc::new(router);

    let addr = "127.0.0.1:3000";
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "demo app listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let router = Arc::clone(&router);
                async move {
                    let (parts, body) = req.into_parts();
                    let bytes = body.collect().await?.to_bytes();
                    let response = router.respond(Request::from_parts(parts, bytes));
                    Ok::<_, hyper::Error>(response.map(Full::<Bytes>::new))
                }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(%err, "connection error");
            }
        });
    }
}
