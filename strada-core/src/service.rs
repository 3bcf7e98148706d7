use crate::router::Router;
use bytes::Bytes;
use http::{Request, Response};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tower::Service;

/// `tower::Service` adapter over a (shared) router.
///
/// Matching is synchronous and non-blocking, so the future is always
/// immediately ready; the adapter exists so the router plugs into any
/// tower-compatible server and into `ServiceExt::oneshot`-driven tests.
/// The first call freezes the router if nothing else has.
#[derive(Clone)]
pub struct RouterService {
    router: Arc<Router>,
}

impl RouterService {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

impl Router {
    /// Wrap the router for serving; freezes on the first dispatched
    /// request.
    pub fn into_service(self) -> RouterService {
        RouterService::new(Arc::new(self))
    }
}

impl Service<Request<Bytes>> for RouterService {
    type Response = Response<Bytes>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Bytes>) -> Self::Future {
        ready(Ok(self.router.respond(req)))
    }
}
