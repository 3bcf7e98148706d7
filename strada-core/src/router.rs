use crate::constraint::Constraint;
use crate::context::{Context, Handler, HandlerChain, SizeClass};
use crate::error::{RegistrationError, UrlBuildError};
use crate::observe::RequestObserver;
use crate::params::Params;
use crate::pool::ContextPool;
use crate::response::ResponseInfo;
use crate::reverse::ReversePattern;
use crate::static_table::{StaticTable, DEFAULT_BLOOM_BITS};
use crate::tree::{normalize, InsertError, RadixNode, RouteEntry};
use crate::version::{
    TracingVersionObserver, VersionConfig, VersionLifecycle, VersionObserver,
};
use arc_swap::ArcSwap;
use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Probe order for the `Allow` header on a 405. `OPTIONS` responses are
/// never auto-generated; an `OPTIONS` route must be registered explicitly.
pub(crate) const METHOD_ORDER: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// A route accumulated during the registration phase, before the trees are
/// built.
pub(crate) struct PendingRoute {
    pub(crate) method: Method,
    pub(crate) pattern: String,
    pub(crate) version: Option<String>,
    pub(crate) middleware: Vec<Handler>,
    pub(crate) terminal: Handler,
    pub(crate) constraints: Vec<(Arc<str>, Constraint)>,
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) tags: Vec<String>,
    /// Set for mounted routes that opted out of the parent's global
    /// middleware.
    pub(crate) skip_global: bool,
}

/// Mutable registration state, serialized behind one mutex and drained at
/// freeze.
pub(crate) struct Registration {
    pub(crate) pending: Vec<PendingRoute>,
    pub(crate) global_middleware: Vec<Handler>,
    pub(crate) version_config: Option<VersionConfig>,
    pub(crate) version_meta: HashMap<Box<str>, VersionLifecycle>,
    pub(crate) not_found: Option<Handler>,
    pub(crate) observer: Option<Arc<dyn RequestObserver>>,
    pub(crate) version_observer: Arc<dyn VersionObserver>,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            global_middleware: Vec::new(),
            version_config: None,
            version_meta: HashMap::new(),
            not_found: None,
            observer: None,
            version_observer: Arc::new(TracingVersionObserver),
        }
    }
}

/// The per-method radix trees of one routing scope (main or one version),
/// paired with their compiled static side-table.
pub(crate) struct TreeTable {
    trees: HashMap<Method, RadixNode>,
    statics: StaticTable,
}

impl TreeTable {
    fn empty() -> Self {
        Self {
            trees: HashMap::new(),
            statics: StaticTable::build(
                std::iter::empty::<(&Method, &Arc<RouteEntry>)>(),
                DEFAULT_BLOOM_BITS,
            ),
        }
    }

    /// Match a request: compiled static table first, radix walk second.
    fn lookup(&self, method: &Method, path: &str, params: &mut Params) -> Option<&Arc<RouteEntry>> {
        if let Some(entry) = self.statics.get(method, path) {
            return Some(entry);
        }
        self.trees.get(method)?.lookup(path, params)
    }

    /// Whether any route for `method` matches `path`; used for the 405
    /// probe, captures discarded.
    fn would_match(&self, method: &Method, path: &str) -> bool {
        let mut scratch = Params::new();
        self.lookup(method, path, &mut scratch).is_some()
    }

    /// Walk every method tree and compile the parameter-free terminals
    /// into the static side-table.
    fn compile_statics(&mut self) {
        let mut pairs: Vec<(Method, Arc<RouteEntry>)> = Vec::new();
        for (method, root) in &self.trees {
            root.for_each_entry(&mut |entry| pairs.push((method.clone(), Arc::clone(entry))));
        }
        self.statics = StaticTable::build(pairs.iter().map(|(m, e)| (m, e)), DEFAULT_BLOOM_BITS);
    }
}

/// Entry of the named-route index, finalized at freeze.
struct NamedRoute {
    reverse: ReversePattern,
}

/// Introspection record for one registered route, including its metadata.
#[derive(Clone, Debug)]
pub struct RouteSummary {
    pub method: Method,
    pub pattern: String,
    pub version: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// The immutable snapshot the read path works against. Built once at
/// freeze and published with a single atomic store; every request performs
/// exactly one atomic load to pin it.
pub(crate) struct RouterTables {
    main: TreeTable,
    versions: HashMap<Box<str>, TreeTable>,
    version_meta: HashMap<Box<str>, VersionLifecycle>,
    version_config: Option<VersionConfig>,
    names: HashMap<Box<str>, NamedRoute>,
    summaries: Vec<RouteSummary>,
    not_found: Option<HandlerChain>,
    observer: Option<Arc<dyn RequestObserver>>,
    version_observer: Arc<dyn VersionObserver>,
}

impl RouterTables {
    fn empty() -> Self {
        Self {
            main: TreeTable::empty(),
            versions: HashMap::new(),
            version_meta: HashMap::new(),
            version_config: None,
            names: HashMap::new(),
            summaries: Vec::new(),
            not_found: None,
            observer: None,
            version_observer: Arc::new(TracingVersionObserver),
        }
    }
}

/// A high-throughput HTTP request router.
///
/// The router has two phases. During *registration* (single-threaded),
/// routes, groups, mounts, versions, and hooks are accumulated in a pending
/// queue. The first of [`freeze`](Self::freeze), [`warmup`](Self::warmup),
/// or the first dispatched request irrevocably *freezes* the router: the
/// queue drains into per-method radix trees, the compiled static tables are
/// built, reverse patterns finalize, and the whole snapshot is published
/// with one atomic pointer swap. From then on the read path is lock-free —
/// one atomic load per request — and registration fails fast.
///
/// # Example
///
/// ```ignore
/// let router = Router::new();
/// router.get("/users/new", |ctx| {
///     ctx.string(StatusCode::OK, "form").ok();
/// });
/// router
///     .get("/users/:id", |ctx| {
///         let id = ctx.param("id").to_string();
///         ctx.string(StatusCode::OK, &id).ok();
///     })
///     .where_int("id")
///     .name("users.show");
/// router.freeze();
/// ```
pub struct Router {
    /// Published snapshot; must stay the first field so the hot-path load
    /// sits at offset zero of the router.
    tables: ArcSwap<RouterTables>,
    frozen: AtomicBool,
    freeze_once: Once,
    reg: Mutex<Registration>,
    pool: ContextPool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            tables: ArcSwap::from_pointee(RouterTables::empty()),
            frozen: AtomicBool::new(false),
            freeze_once: Once::new(),
            reg: Mutex::new(Registration::default()),
            pool: ContextPool::new(),
        }
    }

    // ── Registration plumbing (shared with the registrar types) ─────────

    /// Push a validated pending route; returns its queue index for the
    /// `Route` handle.
    pub(crate) fn push_pending(&self, route: PendingRoute) -> Result<usize, RegistrationError> {
        if self.is_frozen() {
            return Err(RegistrationError::Frozen);
        }
        if let Err(reason) = crate::tree::validate_pattern(&route.pattern) {
            return Err(RegistrationError::InvalidPattern {
                pattern: route.pattern.clone(),
                reason,
            });
        }
        let mut reg = self.reg.lock().unwrap();
        reg.pending.push(route);
        Ok(reg.pending.len() - 1)
    }

    pub(crate) fn with_pending<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut PendingRoute) -> R,
    ) -> R {
        self.assert_registering();
        let mut reg = self.reg.lock().unwrap();
        f(&mut reg.pending[index])
    }

    pub(crate) fn with_registration<R>(&self, f: impl FnOnce(&mut Registration) -> R) -> R {
        f(&mut self.reg.lock().unwrap())
    }

    pub(crate) fn assert_registering(&self) {
        if self.is_frozen() {
            panic!("{}", RegistrationError::Frozen);
        }
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Append a middleware applied to every route (registered before or
    /// after this call) at freeze time.
    pub fn use_middleware<F>(&self, middleware: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.assert_registering();
        self.with_registration(|reg| reg.global_middleware.push(Arc::new(middleware)));
    }

    /// Enable the versioning overlay with the given detection
    /// configuration.
    pub fn with_version_config(&self, config: VersionConfig) {
        self.assert_registering();
        self.with_registration(|reg| reg.version_config = Some(config));
    }

    /// Replace the default (tracing-backed) version-detection observer.
    pub fn with_version_observer(&self, observer: Arc<dyn VersionObserver>) {
        self.assert_registering();
        self.with_registration(|reg| reg.version_observer = observer);
    }

    /// Install the per-request observability hooks.
    pub fn with_observer(&self, observer: Arc<dyn RequestObserver>) {
        self.assert_registering();
        self.with_registration(|reg| reg.observer = Some(observer));
    }

    /// Install the handler invoked when no route matches.
    pub fn no_route<F>(&self, handler: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.assert_registering();
        self.with_registration(|reg| reg.not_found = Some(Arc::new(handler)));
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Freeze the router, panicking on a registration error.
    pub fn freeze(&self) {
        if let Err(err) = self.try_freeze() {
            panic!("{err}");
        }
    }

    /// Freeze the router: drain the pending queue into the trees, compile
    /// the static tables, finalize reverse patterns, and publish the
    /// snapshot. Idempotent — later calls (and concurrent racers) observe
    /// the identical published pointer.
    pub fn try_freeze(&self) -> Result<(), RegistrationError> {
        let mut result = Ok(());
        self.freeze_once.call_once(|| {
            result = self.build_and_publish();
            self.frozen.store(true, Ordering::Release);
        });
        result
    }

    /// Freeze and pre-populate the context pool classes.
    pub fn warmup(&self, small: usize, medium: usize, large: usize) {
        self.freeze();
        self.pool.warm_up(small, medium, large);
    }

    fn build_and_publish(&self) -> Result<(), RegistrationError> {
        let reg = std::mem::take(&mut *self.reg.lock().unwrap());
        let config = reg.version_config;

        let mut main = TreeTable::empty();
        let mut versions: HashMap<Box<str>, TreeTable> = HashMap::new();
        let mut names: HashMap<Box<str>, NamedRoute> = HashMap::new();
        let mut summaries = Vec::with_capacity(reg.pending.len());

        for route in reg.pending {
            if let (Some(version), Some(config)) = (route.version.as_deref(), config.as_ref()) {
                if !config.is_known(version) {
                    return Err(RegistrationError::UnknownVersion {
                        version: version.to_string(),
                    });
                }
            }

            let mut chain: Vec<Handler> = Vec::with_capacity(
                route.middleware.len() + reg.global_middleware.len() + 1,
            );
            if !route.skip_global {
                chain.extend(reg.global_middleware.iter().cloned());
            }
            chain.extend(route.middleware);
            chain.push(route.terminal);

            let entry = Arc::new(RouteEntry {
                pattern: Arc::from(route.pattern.as_str()),
                chain: Arc::from(chain),
                constraints: route.constraints,
            });

            let table = match route.version.as_deref() {
                None => &mut main,
                Some(version) => versions
                    .entry(Box::from(version))
                    .or_insert_with(TreeTable::empty),
            };
            table
                .trees
                .entry(route.method.clone())
                .or_insert_with(RadixNode::new)
                .insert(entry)
                .map_err(|err| match err {
                    InsertError::Duplicate => RegistrationError::DuplicateRoute {
                        method: route.method.clone(),
                        pattern: route.pattern.clone(),
                    },
                    InsertError::ParamConflict {
                        existing,
                        conflicting,
                    } => RegistrationError::ParamNameConflict {
                        pattern: route.pattern.clone(),
                        existing,
                        conflicting,
                    },
                })?;

            if let Some(name) = route.name.as_deref() {
                let replaced = names.insert(
                    Box::from(name),
                    NamedRoute {
                        reverse: ReversePattern::parse(&route.pattern),
                    },
                );
                if replaced.is_some() {
                    warn!(name, pattern = %route.pattern, "route name re-registered; last registration wins");
                }
            }

            summaries.push(RouteSummary {
                method: route.method,
                pattern: route.pattern,
                version: route.version,
                name: route.name,
                description: route.description,
                tags: route.tags,
            });
        }

        main.compile_statics();
        for table in versions.values_mut() {
            table.compile_statics();
        }

        if config.is_none() && !versions.is_empty() {
            warn!(
                "versioned routes registered without version detection; configure with_version_config or they stay unreachable"
            );
        }

        info!(
            routes = summaries.len(),
            versions = versions.len(),
            static_routes = main.statics.len(),
            "router frozen"
        );

        self.tables.store(Arc::new(RouterTables {
            main,
            versions,
            version_meta: reg.version_meta,
            version_config: config,
            names,
            summaries,
            not_found: reg.not_found.map(|h| Arc::from(vec![h])),
            observer: reg.observer,
            version_observer: reg.version_observer,
        }));
        Ok(())
    }

    // ── Introspection and reverse routing ───────────────────────────────

    /// Post-freeze snapshot of every registered route.
    pub fn routes(&self) -> Vec<RouteSummary> {
        self.tables.load().summaries.clone()
    }

    /// Build the URL of a named route from its parameters. Parameters the
    /// pattern does not consume become query-string pairs.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, UrlBuildError> {
        self.url_for_with_query(name, params, &[])
    }

    /// [`url_for`](Self::url_for) with explicit query pairs, emitted before
    /// any leftover parameters.
    pub fn url_for_with_query(
        &self,
        name: &str,
        params: &[(&str, &str)],
        query: &[(&str, &str)],
    ) -> Result<String, UrlBuildError> {
        if !self.is_frozen() {
            return Err(UrlBuildError::NotFrozen);
        }
        let tables = self.tables.load();
        let named = tables
            .names
            .get(name)
            .ok_or_else(|| UrlBuildError::UnknownRoute {
                name: name.to_string(),
            })?;
        named.reverse.build(name, params, query)
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    /// Dispatch one request through the frozen router and produce its
    /// response. Freezes the router on first use.
    ///
    /// The matching inner loop takes no lock beyond the one atomic load
    /// that pins the tree snapshot, and allocates nothing for routes with
    /// at most eight parameters.
    pub fn respond(&self, req: Request<Bytes>) -> Response<Bytes> {
        if !self.is_frozen() {
            self.freeze();
        }
        let tables = self.tables.load();

        let method = req.method().clone();
        let cancel = req
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();

        let mut ctx = self.pool.acquire(SizeClass::Small);
        ctx.bind(req, cancel);

        // Hook start runs for every request; a `None` state marks it
        // observability-excluded, but any context enrichment sticks.
        let state = tables.observer.as_ref().and_then(|observer| {
            match catch_unwind(AssertUnwindSafe(|| observer.on_request_start(&mut ctx))) {
                Ok(state) => state,
                Err(_) => {
                    warn!("request observer panicked in on_request_start");
                    None
                }
            }
        });

        let (version, strip) = match tables.version_config.as_ref() {
            Some(config) => {
                let detection = config.detect(
                    ctx.request().expect("request bound"),
                    &*tables.version_observer,
                );
                (detection.version, detection.strip)
            }
            None => (None, 0),
        };
        ctx.prepare_route_path(strip);
        ctx.set_version(version.clone());

        // Main tree first: non-versioned routes win regardless of any
        // detected version, keeping /health and friends reachable.
        let (path, params) = ctx.match_parts();
        let mut versioned_match = false;
        let mut matched = tables.main.lookup(&method, path, params).cloned();
        if matched.is_none() {
            if let Some(table) = version.as_deref().and_then(|v| tables.versions.get(v)) {
                matched = table.lookup(&method, path, params).cloned();
                versioned_match = matched.is_some();
            }
        }

        let matched_pattern: Arc<str> = match matched {
            Some(entry) => {
                if versioned_match {
                    if let Some(lifecycle) =
                        version.as_deref().and_then(|v| tables.version_meta.get(v))
                    {
                        if !lifecycle.is_empty() {
                            lifecycle.apply(ctx.response.headers_mut());
                        }
                    }
                }
                let pattern = Arc::clone(&entry.pattern);
                ctx.run_chain(Arc::clone(&entry.chain), Arc::clone(&pattern));
                pattern
            }
            None => {
                self.respond_unmatched(&tables, &method, &mut ctx, version.as_deref());
                Arc::from("")
            }
        };

        if let Some(state) = state {
            if let Some(observer) = tables.observer.as_ref() {
                let info: ResponseInfo = ctx.response.info();
                let result = catch_unwind(AssertUnwindSafe(|| {
                    observer.on_request_end(&ctx, state, info, &matched_pattern)
                }));
                if result.is_err() {
                    warn!("request observer panicked in on_request_end");
                }
            }
        }

        let response = ctx.take_response();
        self.pool.release(ctx);
        response
    }

    /// 405 when the path exists under another method, otherwise the
    /// configured NotFound handler (or the default 404).
    fn respond_unmatched(
        &self,
        tables: &RouterTables,
        method: &Method,
        ctx: &mut Context,
        version: Option<&str>,
    ) {
        let allowed: Vec<&Method> = {
            let path = ctx.path();
            METHOD_ORDER
                .iter()
                .filter(|m| *m != method)
                .filter(|m| {
                    tables.main.would_match(m, path)
                        || version
                            .and_then(|v| tables.versions.get(v))
                            .is_some_and(|table| table.would_match(m, path))
                })
                .collect()
        };

        if !allowed.is_empty() {
            let allow = allowed
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                ctx.response.headers_mut().insert(ALLOW, value);
            }
            ctx.response.set_status(StatusCode::METHOD_NOT_ALLOWED);
            ctx.response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            ctx.response.write(br#"{"error":"method not allowed"}"#);
            return;
        }

        match tables.not_found.as_ref() {
            Some(chain) => {
                ctx.response.set_status(StatusCode::NOT_FOUND);
                ctx.run_chain(Arc::clone(chain), Arc::from(""));
            }
            None => {
                ctx.response.set_status(StatusCode::NOT_FOUND);
                ctx.response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                ctx.response.write(br#"{"error":"not found"}"#);
            }
        }
    }
}

/// Canonical form of a registered pattern: leading slash, no trailing
/// slash, root spelled `/`.
pub(crate) fn canonical_pattern(pattern: &str) -> String {
    let normalized = normalize(pattern);
    if normalized.is_empty() {
        "/".to_string()
    } else {
        format!("/{normalized}")
    }
}

/// Join a group/mount prefix with a pattern, producing a canonical pattern.
pub(crate) fn join_patterns(prefix: &str, pattern: &str) -> String {
    let prefix = normalize(prefix);
    let pattern = normalize(pattern);
    match (prefix.is_empty(), pattern.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{pattern}"),
        (false, true) => format!("/{prefix}"),
        (false, false) => format!("/{prefix}/{pattern}"),
    }
}
