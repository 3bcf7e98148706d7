pub mod constraint;
pub mod context;
pub mod error;
pub mod observe;
pub mod params;
pub mod pool;
pub mod prelude;
pub mod registrar;
pub mod response;
mod reverse;
pub mod router;
pub mod service;
mod static_table;
mod tree;
pub mod version;

pub use constraint::Constraint;
pub use context::{handler, Context, Handler, HandlerChain, SizeClass};
pub use error::{ContextError, RegistrationError, UrlBuildError};
pub use observe::{
    LabelInterner, ObserverState, RequestObserver, DEFAULT_LABEL_CAP, OVERFLOW_LABEL,
};
pub use params::{ParamSpan, Params, INLINE_PARAMS};
pub use pool::ContextPool;
pub use registrar::{Group, MountOptions, Route, VersionScope};
pub use response::{ResponseInfo, ResponseWriter};
pub use router::{RouteSummary, Router};
pub use service::RouterService;
pub use tree::WILDCARD_PARAM;
pub use version::{
    TracingVersionObserver, VersionConfig, VersionEvent, VersionLifecycle, VersionObserver,
    VersionSource,
};
