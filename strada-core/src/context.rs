use crate::error::ContextError;
use crate::params::Params;
use crate::response::ResponseWriter;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Request, StatusCode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A unit of the handler chain. Middleware and terminal handlers share this
/// type; middleware calls [`Context::next`] to proceed, a terminal handler
/// simply returns.
pub type Handler = Arc<dyn Fn(&mut Context) + Send + Sync + 'static>;

/// An ordered chain of middleware ending in a terminal handler.
pub type HandlerChain = Arc<[Handler]>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Size class a context belongs to, assigned by the pool.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SizeClass {
    /// Up to 4 parameters.
    Small,
    /// Up to 8 parameters.
    Medium,
    /// More than 8 parameters (spill map in use).
    Large,
}

/// Per-request context, loaned out by the pool for the duration of one
/// dispatch.
///
/// Carries the request, the buffered response writer, extracted parameters,
/// the matched pattern and resolved version, and the chain cursor that
/// drives the cooperative middleware model.
///
/// # Release semantics
///
/// [`release`](Self::release) seals the context: heap references (request,
/// parameters, routing path) are cleared, subsequent writes fail with
/// [`ContextError::Released`], reads return zero values, and a second
/// `release` is a no-op. The dispatcher flushes the already-written response
/// and returns the context to its pool afterwards, so a handler may release
/// early and hand off remaining work to a background task without racing
/// the pool.
pub struct Context {
    pub(crate) request: Option<Request<Bytes>>,
    pub(crate) response: ResponseWriter,
    pub(crate) params: Params,
    /// The path the matcher ran against (version prefix already stripped).
    /// Parameter spans index into this buffer; its capacity is retained
    /// across pool reuse.
    route_path: String,
    matched_pattern: Option<Arc<str>>,
    version: Option<Arc<str>>,
    chain: Option<HandlerChain>,
    cursor: usize,
    aborted: bool,
    released: bool,
    final_params: usize,
    cancel: CancellationToken,
    pub(crate) class: SizeClass,
}

impl Context {
    pub(crate) fn new(class: SizeClass) -> Self {
        Self {
            request: None,
            response: ResponseWriter::new(),
            params: Params::new(),
            route_path: String::new(),
            matched_pattern: None,
            version: None,
            chain: None,
            cursor: 0,
            aborted: false,
            released: false,
            final_params: 0,
            cancel: CancellationToken::new(),
            class,
        }
    }

    // ── Dispatcher-side plumbing ────────────────────────────────────────

    pub(crate) fn bind(&mut self, request: Request<Bytes>, cancel: CancellationToken) {
        self.request = Some(request);
        self.cancel = cancel;
    }

    /// Copy the routing path into the retained buffer. Called after version
    /// stripping, before the tree walk.
    pub(crate) fn set_route_path(&mut self, path: &str) {
        self.route_path.clear();
        self.route_path.push_str(path);
    }

    /// Derive the routing path from the bound request: skip the stripped
    /// version prefix and trim surrounding slashes, so `/v1` routes like
    /// `/v1/` and `//users` like `/users`.
    pub(crate) fn prepare_route_path(&mut self, strip: usize) {
        self.route_path.clear();
        if let Some(req) = self.request.as_ref() {
            let path = req.uri().path();
            let path = path.get(strip..).unwrap_or("");
            self.route_path.push_str(path.trim_matches('/'));
        }
    }

    /// Split borrow for the matcher: the routing path and the parameter
    /// carrier the walk records spans into.
    pub(crate) fn match_parts(&mut self) -> (&str, &mut Params) {
        (&self.route_path, &mut self.params)
    }

    pub(crate) fn set_version(&mut self, version: Option<Arc<str>>) {
        self.version = version;
    }

    /// Install the resolved chain and start the cooperative walk at its
    /// first handler.
    pub(crate) fn run_chain(&mut self, chain: HandlerChain, pattern: Arc<str>) {
        self.matched_pattern = Some(pattern);
        self.chain = Some(chain);
        self.cursor = 0;
        self.next();
    }

    pub(crate) fn take_response(&mut self) -> http::Response<Bytes> {
        self.response.take_response()
    }

    /// Full reset on return to the pool. Unlike `release`, this also clears
    /// the response writer and re-arms the context for reuse.
    pub(crate) fn recycle(&mut self) {
        self.release();
        self.response.reset();
        self.chain = None;
        self.cursor = 0;
        self.aborted = false;
        self.released = false;
        self.final_params = 0;
        self.cancel = CancellationToken::new();
    }

    pub(crate) fn final_param_count(&self) -> usize {
        self.final_params.max(self.params.count())
    }

    // ── Request side ────────────────────────────────────────────────────

    /// The in-flight request, or `None` after release.
    pub fn request(&self) -> Option<&Request<Bytes>> {
        self.request.as_ref()
    }

    /// The path the route was matched against (version prefix stripped).
    /// Empty after release.
    pub fn path(&self) -> &str {
        &self.route_path
    }

    /// A request header as a string, or `None` when absent or non-UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .as_ref()
            .and_then(|r| r.headers().get(name))
            .and_then(|v| v.to_str().ok())
    }

    /// The value of a path parameter, or the empty string when the pattern
    /// did not capture it.
    pub fn param(&self, name: &str) -> &str {
        self.params
            .get(name)
            .map(|span| span.slice(&self.route_path))
            .unwrap_or("")
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The registered pattern that matched (e.g. `/users/:id`), or the
    /// empty string when unmatched or released.
    pub fn matched_pattern(&self) -> &str {
        self.matched_pattern.as_deref().unwrap_or("")
    }

    /// The resolved API version, or the empty string for a main-tree match.
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }

    /// Cancellation signal tied to the underlying transport. Cloning the
    /// token is cheap; handlers observe client disconnects cooperatively.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ── Response side ───────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ContextError> {
        self.ensure_writable()?;
        self.response.set_status(status);
        Ok(())
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), ContextError> {
        self.ensure_writable()?;
        self.response.headers_mut().insert(name, value);
        Ok(())
    }

    /// Append raw bytes to the response body.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, ContextError> {
        self.ensure_writable()?;
        Ok(self.response.write(data))
    }

    /// Write a plain-text response with the given status.
    pub fn string(&mut self, status: StatusCode, body: &str) -> Result<(), ContextError> {
        self.ensure_writable()?;
        self.response.set_status(status);
        self.response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        self.response.write(body.as_bytes());
        Ok(())
    }

    /// Write a JSON response with the given status.
    pub fn json<T: serde::Serialize>(
        &mut self,
        status: StatusCode,
        body: &T,
    ) -> Result<(), ContextError> {
        self.ensure_writable()?;
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.response.set_status(status);
                self.response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.response.write(&bytes);
            }
            Err(err) => {
                tracing::warn!(%err, "response serialization failed");
                self.response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                self.response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.response.write(br#"{"error":"serialization failed"}"#);
            }
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), ContextError> {
        if self.released {
            Err(ContextError::Released)
        } else {
            Ok(())
        }
    }

    // ── Chain control ───────────────────────────────────────────────────

    /// Run the next handler in the chain. A middleware that returns without
    /// calling `next` terminates the chain at itself.
    pub fn next(&mut self) {
        if self.aborted || self.released {
            return;
        }
        let Some(chain) = self.chain.clone() else {
            return;
        };
        if self.cursor < chain.len() {
            let idx = self.cursor;
            self.cursor += 1;
            (chain[idx])(self);
        }
    }

    /// Prevent any remaining handlers from running. The observability end
    /// hook still fires for non-excluded requests.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Abort and set the response status in one step.
    pub fn abort_with_status(&mut self, status: StatusCode) -> Result<(), ContextError> {
        self.set_status(status)?;
        self.abort();
        Ok(())
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    // ── Release ─────────────────────────────────────────────────────────

    /// Seal the context: clear heap references and forbid further writes.
    /// Idempotent; the second call is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.final_params = self.params.count();
        self.released = true;
        self.request = None;
        self.params.reset();
        self.route_path.clear();
        self.matched_pattern = None;
        self.version = None;
        self.chain = None;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamSpan;

    fn request() -> Request<Bytes> {
        Request::builder()
            .method(http::Method::GET)
            .uri("/users/42")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn param_resolves_span_against_route_path() {
        let mut ctx = Context::new(SizeClass::Small);
        ctx.bind(request(), CancellationToken::new());
        ctx.set_route_path("users/42");
        ctx.params.set(Arc::from("id"), ParamSpan::new(6, 8));

        assert_eq!(ctx.param("id"), "42");
        assert_eq!(ctx.param("missing"), "");
    }

    #[test]
    fn release_clears_state_and_fails_writes() {
        let mut ctx = Context::new(SizeClass::Small);
        ctx.bind(request(), CancellationToken::new());
        ctx.set_route_path("users/42");
        ctx.params.set(Arc::from("id"), ParamSpan::new(6, 8));
        ctx.write(b"partial").unwrap();

        ctx.release();

        assert!(ctx.request().is_none());
        assert_eq!(ctx.params().count(), 0);
        assert_eq!(ctx.path(), "");
        assert_eq!(ctx.param("id"), "");
        assert_eq!(ctx.write(b"more"), Err(ContextError::Released));
        assert_eq!(
            ctx.set_status(StatusCode::ACCEPTED),
            Err(ContextError::Released)
        );

        // Second release is a no-op.
        ctx.release();
        assert!(ctx.is_released());
    }

    #[test]
    fn release_preserves_final_param_count() {
        let mut ctx = Context::new(SizeClass::Small);
        ctx.set_route_path("a/b/c/d/e/f");
        for i in 0..6 {
            ctx.params
                .set(Arc::from(format!("p{i}")), ParamSpan::new(i, i + 1));
        }
        ctx.release();
        assert_eq!(ctx.final_param_count(), 6);
    }

    #[test]
    fn chain_stops_when_middleware_omits_next() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let reached = Arc::new(AtomicUsize::new(0));

        let r1 = reached.clone();
        let r2 = reached.clone();
        let chain: HandlerChain = Arc::from(vec![
            handler(move |_ctx: &mut Context| {
                r1.fetch_add(1, Ordering::SeqCst);
                // no next(): terminates here
            }),
            handler(move |_ctx: &mut Context| {
                r2.fetch_add(1, Ordering::SeqCst);
            }),
        ]);

        let mut ctx = Context::new(SizeClass::Small);
        ctx.run_chain(chain, Arc::from("/test"));
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chain_proceeds_through_next_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        let o2 = order.clone();
        let o3 = order.clone();
        let chain: HandlerChain = Arc::from(vec![
            handler(move |ctx: &mut Context| {
                o1.lock().unwrap().push("m1-before");
                ctx.next();
                o1.lock().unwrap().push("m1-after");
            }),
            handler(move |ctx: &mut Context| {
                o2.lock().unwrap().push("m2-before");
                ctx.next();
                o2.lock().unwrap().push("m2-after");
            }),
            handler(move |_ctx: &mut Context| {
                o3.lock().unwrap().push("handler");
            }),
        ]);

        let mut ctx = Context::new(SizeClass::Small);
        ctx.run_chain(chain, Arc::from("/test"));
        assert_eq!(
            *order.lock().unwrap(),
            vec!["m1-before", "m2-before", "handler", "m2-after", "m1-after"]
        );
    }

    #[test]
    fn abort_prevents_downstream_handlers() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let handler_ran = Arc::new(AtomicBool::new(false));

        let flag = handler_ran.clone();
        let chain: HandlerChain = Arc::from(vec![
            handler(|ctx: &mut Context| {
                ctx.abort_with_status(StatusCode::UNAUTHORIZED).unwrap();
                ctx.next();
            }),
            handler(move |_ctx: &mut Context| {
                flag.store(true, Ordering::SeqCst);
            }),
        ]);

        let mut ctx = Context::new(SizeClass::Small);
        ctx.run_chain(chain, Arc::from("/test"));
        assert!(!handler_ran.load(Ordering::SeqCst));
        assert_eq!(ctx.status(), StatusCode::UNAUTHORIZED);
    }
}
