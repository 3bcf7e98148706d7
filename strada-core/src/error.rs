use http::Method;

/// Fatal misuse of the registrar, surfaced before the router starts serving.
///
/// The panicking registrar methods (`get`, `post`, `freeze`, ...) report
/// these by panicking with the `Display` message; the `try_*` counterparts
/// return them instead.
pub enum RegistrationError {
    /// The same `(method, pattern)` pair was registered twice on one tree.
    DuplicateRoute { method: Method, pattern: String },
    /// A second parameter name was registered at a position that already
    /// has one (e.g. `/users/:id` then `/users/:slug`).
    ParamNameConflict {
        pattern: String,
        existing: String,
        conflicting: String,
    },
    /// The pattern violates the segment syntax (bad parameter name, interior
    /// wildcard, stray `:`).
    InvalidPattern { pattern: String, reason: String },
    /// A `where_regex` pattern failed to compile.
    InvalidConstraintPattern { param: String, detail: String },
    /// A versioned registration names a version outside the configured
    /// validity set.
    UnknownVersion { version: String },
    /// Registration was attempted after the router froze.
    Frozen,
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::DuplicateRoute { method, pattern } => {
                write!(f, "duplicate route: {method} {pattern}")
            }
            RegistrationError::ParamNameConflict {
                pattern,
                existing,
                conflicting,
            } => write!(
                f,
                "conflicting parameter name in {pattern}: position already holds :{existing}, cannot register :{conflicting}"
            ),
            RegistrationError::InvalidPattern { pattern, reason } => {
                write!(f, "invalid route pattern {pattern}: {reason}")
            }
            RegistrationError::InvalidConstraintPattern { param, detail } => {
                write!(f, "invalid constraint pattern for :{param}: {detail}")
            }
            RegistrationError::UnknownVersion { version } => {
                write!(f, "unknown version {version}: not in the configured validity set")
            }
            RegistrationError::Frozen => {
                write!(f, "router is frozen: routes must be registered before serving starts")
            }
        }
    }
}

impl std::fmt::Debug for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for RegistrationError {}

/// Error returned by context write operations after `release()`.
///
/// Reads on a released context return zero values instead; only writes
/// surface this error.
#[derive(PartialEq, Eq)]
pub enum ContextError {
    Released,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::Released => write!(f, "context released"),
        }
    }
}

impl std::fmt::Debug for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for ContextError {}

/// Error returned by the reverse URL builder.
pub enum UrlBuildError {
    /// No route was registered under this name.
    UnknownRoute { name: String },
    /// The pattern requires a parameter the caller did not supply.
    MissingParam { name: String, param: String },
    /// Reverse patterns are finalized at freeze; building before that is
    /// a caller bug.
    NotFrozen,
}

impl std::fmt::Display for UrlBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlBuildError::UnknownRoute { name } => write!(f, "no route named {name}"),
            UrlBuildError::MissingParam { name, param } => {
                write!(f, "route {name} requires parameter :{param}")
            }
            UrlBuildError::NotFrozen => {
                write!(f, "reverse URLs are available after the router freezes")
            }
        }
    }
}

impl std::fmt::Debug for UrlBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for UrlBuildError {}
