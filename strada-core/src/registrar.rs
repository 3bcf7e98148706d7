use crate::constraint::Constraint;
use crate::context::{Context, Handler};
use crate::error::RegistrationError;
use crate::router::{canonical_pattern, join_patterns, PendingRoute, Router, METHOD_ORDER};
use crate::version::VersionLifecycle;
use chrono::{DateTime, Utc};
use http::Method;
use std::sync::Arc;

// ── Verb registrars ─────────────────────────────────────────────────────

impl Router {
    /// Register a route for an explicit method, panicking on registrar
    /// misuse (bad pattern, frozen router).
    pub fn handle<F>(&self, method: Method, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.try_handle(method, pattern, handler)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Non-panicking counterpart of [`handle`](Self::handle).
    pub fn try_handle<F>(
        &self,
        method: Method,
        pattern: &str,
        handler: F,
    ) -> Result<Route<'_>, RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.register(method, pattern, None, Vec::new(), Arc::new(handler), false)
    }

    pub(crate) fn register(
        &self,
        method: Method,
        pattern: &str,
        version: Option<String>,
        middleware: Vec<Handler>,
        terminal: Handler,
        skip_global: bool,
    ) -> Result<Route<'_>, RegistrationError> {
        let index = self.push_pending(PendingRoute {
            method,
            pattern: canonical_pattern(pattern),
            version,
            middleware,
            terminal,
            constraints: Vec::new(),
            name: None,
            description: None,
            tags: Vec::new(),
            skip_global,
        })?;
        Ok(Route {
            router: self,
            index,
        })
    }

    pub fn get<F>(&self, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::GET, pattern, handler)
    }

    pub fn post<F>(&self, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::POST, pattern, handler)
    }

    pub fn put<F>(&self, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::PUT, pattern, handler)
    }

    pub fn delete<F>(&self, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::DELETE, pattern, handler)
    }

    pub fn patch<F>(&self, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::PATCH, pattern, handler)
    }

    pub fn options<F>(&self, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::OPTIONS, pattern, handler)
    }

    pub fn head<F>(&self, pattern: &str, handler: F) -> Route<'_>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::HEAD, pattern, handler)
    }

    /// Register the same handler under every supported method.
    pub fn any<F>(&self, pattern: &str, handler: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        for method in METHOD_ORDER {
            self.register(
                method,
                pattern,
                None,
                Vec::new(),
                Arc::clone(&handler),
                false,
            )
            .unwrap_or_else(|err| panic!("{err}"));
        }
    }

    /// Open a registration group: a purely syntactic prefix plus shared
    /// middleware, deferring to this router's registrar.
    pub fn group(&self, prefix: &str) -> Group<'_> {
        self.assert_registering();
        Group {
            router: self,
            prefix: canonical_pattern(prefix),
            middleware: Vec::new(),
            version: None,
        }
    }

    /// Open a versioned registration scope. Routes registered through it
    /// land in the version's parallel trees, which the dispatcher consults
    /// only after a main-tree miss.
    pub fn version(&self, name: &str) -> VersionScope<'_> {
        self.assert_registering();
        VersionScope {
            router: self,
            version: name.to_string(),
        }
    }

    /// Re-register a subrouter's pending routes under a prefix.
    ///
    /// The subrouter must still be in its registration phase; its pending
    /// queue is drained, so the subrouter is left empty. Options control
    /// global-middleware inheritance, a route-name prefix, extra middleware,
    /// and a custom 404 fallback for the mounted subtree.
    pub fn mount(&self, prefix: &str, sub: Router, options: MountOptions) {
        self.assert_registering();
        if sub.is_frozen() {
            panic!("cannot mount a frozen router: mounts snapshot pending routes");
        }
        let sub_reg = sub.with_registration(std::mem::take);
        let prefix = canonical_pattern(prefix);

        for route in sub_reg.pending {
            let mut middleware =
                Vec::with_capacity(options.middleware.len() + sub_reg.global_middleware.len() + route.middleware.len());
            middleware.extend(options.middleware.iter().cloned());
            middleware.extend(sub_reg.global_middleware.iter().cloned());
            middleware.extend(route.middleware);

            let name = route.name.map(|name| match options.name_prefix.as_deref() {
                Some(name_prefix) => format!("{name_prefix}{name}"),
                None => name,
            });

            self.push_pending(PendingRoute {
                method: route.method,
                pattern: join_patterns(&prefix, &route.pattern),
                version: route.version,
                middleware,
                terminal: route.terminal,
                constraints: route.constraints,
                name,
                description: route.description,
                tags: route.tags,
                skip_global: route.skip_global || !options.inherit_middleware,
            })
            .unwrap_or_else(|err| panic!("{err}"));
        }

        if let Some(not_found) = options.not_found {
            // Subtree fallback: a wildcard below the prefix catches what
            // the mounted routes do not.
            for method in METHOD_ORDER {
                self.register(
                    method,
                    &join_patterns(&prefix, "*"),
                    None,
                    Vec::new(),
                    Arc::clone(&not_found),
                    !options.inherit_middleware,
                )
                .unwrap_or_else(|err| panic!("{err}"));
            }
        }
    }
}

// ── Route handle ────────────────────────────────────────────────────────

/// Handle to a pending route, returned by the verb registrars for chaining
/// names, metadata, per-route middleware, and constraints.
#[derive(Clone, Copy)]
pub struct Route<'r> {
    router: &'r Router,
    index: usize,
}

impl Route<'_> {
    /// Name the route for reverse routing.
    pub fn name(self, name: &str) -> Self {
        self.router
            .with_pending(self.index, |route| route.name = Some(name.to_string()));
        self
    }

    pub fn description(self, description: &str) -> Self {
        self.router.with_pending(self.index, |route| {
            route.description = Some(description.to_string())
        });
        self
    }

    pub fn tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.router.with_pending(self.index, |route| {
            route.tags = tags.into_iter().map(Into::into).collect()
        });
        self
    }

    /// Prepend a middleware that runs for this route only, after any group
    /// and global middleware.
    pub fn middleware<F>(self, middleware: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.router
            .with_pending(self.index, |route| route.middleware.push(Arc::new(middleware)));
        self
    }

    fn constrain(self, param: &str, constraint: Constraint) -> Self {
        self.router.with_pending(self.index, |route| {
            route.constraints.push((Arc::from(param), constraint))
        });
        self
    }

    /// Constrain a parameter with an anchored regex.
    ///
    /// # Panics
    ///
    /// Panics when the pattern does not compile; use
    /// [`try_where_regex`](Self::try_where_regex) to handle that case.
    pub fn where_regex(self, param: &str, pattern: &str) -> Self {
        self.try_where_regex(param, pattern)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_where_regex(self, param: &str, pattern: &str) -> Result<Self, RegistrationError> {
        let constraint =
            Constraint::regex(pattern).map_err(|err| RegistrationError::InvalidConstraintPattern {
                param: param.to_string(),
                detail: err.to_string(),
            })?;
        Ok(self.constrain(param, constraint))
    }

    pub fn where_int(self, param: &str) -> Self {
        self.constrain(param, Constraint::Int)
    }

    pub fn where_float(self, param: &str) -> Self {
        self.constrain(param, Constraint::Float)
    }

    pub fn where_uuid(self, param: &str) -> Self {
        self.constrain(param, Constraint::Uuid)
    }

    pub fn where_alpha(self, param: &str) -> Self {
        self.constrain(param, Constraint::Alpha)
    }

    pub fn where_alpha_numeric(self, param: &str) -> Self {
        self.constrain(param, Constraint::AlphaNumeric)
    }

    /// Constrain a parameter to a fixed, case-sensitive value set.
    pub fn where_in<I, S>(self, param: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        self.constrain(param, Constraint::one_of(values))
    }

    pub fn where_date(self, param: &str) -> Self {
        self.constrain(param, Constraint::Date)
    }

    pub fn where_date_time(self, param: &str) -> Self {
        self.constrain(param, Constraint::DateTime)
    }
}

// ── Groups ──────────────────────────────────────────────────────────────

/// A registration group: prefix plus middleware, aggregated syntactically
/// and handed to the underlying registrar at each verb call.
pub struct Group<'r> {
    router: &'r Router,
    prefix: String,
    middleware: Vec<Handler>,
    version: Option<String>,
}

impl<'r> Group<'r> {
    /// Append a middleware shared by every route registered through this
    /// group (and its nested groups).
    pub fn use_middleware<F>(mut self, middleware: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Open a nested group; prefix and middleware accumulate.
    pub fn group(&self, prefix: &str) -> Group<'r> {
        Group {
            router: self.router,
            prefix: join_patterns(&self.prefix, prefix),
            middleware: self.middleware.clone(),
            version: self.version.clone(),
        }
    }

    fn handle<F>(&self, method: Method, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.router
            .register(
                method,
                &join_patterns(&self.prefix, pattern),
                self.version.clone(),
                self.middleware.clone(),
                Arc::new(handler),
                false,
            )
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn get<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::GET, pattern, handler)
    }

    pub fn post<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::POST, pattern, handler)
    }

    pub fn put<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::PUT, pattern, handler)
    }

    pub fn delete<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::DELETE, pattern, handler)
    }

    pub fn patch<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::PATCH, pattern, handler)
    }
}

// ── Version scopes ──────────────────────────────────────────────────────

/// Registrar for one API version's parallel trees, with the version's
/// lifecycle metadata setters.
pub struct VersionScope<'r> {
    router: &'r Router,
    version: String,
}

impl<'r> VersionScope<'r> {
    fn handle<F>(&self, method: Method, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.router
            .register(
                method,
                pattern,
                Some(self.version.clone()),
                Vec::new(),
                Arc::new(handler),
                false,
            )
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn get<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::GET, pattern, handler)
    }

    pub fn post<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::POST, pattern, handler)
    }

    pub fn put<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::PUT, pattern, handler)
    }

    pub fn delete<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::DELETE, pattern, handler)
    }

    pub fn patch<F>(&self, pattern: &str, handler: F) -> Route<'r>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(Method::PATCH, pattern, handler)
    }

    /// Open a group scoped to this version.
    pub fn group(&self, prefix: &str) -> Group<'r> {
        Group {
            router: self.router,
            prefix: canonical_pattern(prefix),
            middleware: Vec::new(),
            version: Some(self.version.clone()),
        }
    }

    fn with_lifecycle(&self, f: impl FnOnce(&mut VersionLifecycle)) -> &Self {
        self.router.with_registration(|reg| {
            f(reg
                .version_meta
                .entry(Box::from(self.version.as_str()))
                .or_default())
        });
        self
    }

    /// Mark the version deprecated; matches against it carry
    /// `Deprecation: true`.
    pub fn deprecated(&self) -> &Self {
        self.with_lifecycle(|lifecycle| lifecycle.deprecated = true)
    }

    /// Announce the retirement date, emitted as an RFC-1123 `Sunset`
    /// header.
    pub fn sunset(&self, date: DateTime<Utc>) -> &Self {
        self.with_lifecycle(|lifecycle| lifecycle.sunset = Some(date))
    }

    /// Link clients to migration documentation via a
    /// `Link: <url>; rel="deprecation"` header.
    pub fn migration_url(&self, url: &str) -> &Self {
        self.with_lifecycle(|lifecycle| lifecycle.migration_url = Some(url.to_string()))
    }
}

// ── Mount options ───────────────────────────────────────────────────────

/// Options for [`Router::mount`].
pub struct MountOptions {
    inherit_middleware: bool,
    name_prefix: Option<String>,
    not_found: Option<Handler>,
    middleware: Vec<Handler>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            inherit_middleware: true,
            name_prefix: None,
            not_found: None,
            middleware: Vec::new(),
        }
    }
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether mounted routes run the parent's global middleware
    /// (default: they do).
    pub fn inherit_middleware(mut self, inherit: bool) -> Self {
        self.inherit_middleware = inherit;
        self
    }

    /// Prefix prepended to the names of mounted routes.
    pub fn name_prefix(mut self, prefix: &str) -> Self {
        self.name_prefix = Some(prefix.to_string());
        self
    }

    /// Custom 404 fallback for the mounted subtree, installed as a
    /// wildcard below the mount prefix.
    pub fn not_found<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Extra middleware applied to every mounted route, after inherited
    /// global middleware and before the subrouter's own.
    pub fn middleware<F>(mut self, middleware: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }
}
