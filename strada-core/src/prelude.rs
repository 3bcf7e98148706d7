//! Single-import surface for applications built on the router.

pub use crate::constraint::Constraint;
pub use crate::context::{handler, Context};
pub use crate::error::{ContextError, RegistrationError, UrlBuildError};
pub use crate::observe::RequestObserver;
pub use crate::registrar::MountOptions;
pub use crate::router::Router;
pub use crate::service::RouterService;
pub use crate::version::{VersionConfig, VersionEvent, VersionObserver, VersionSource};

pub use http::{Method, StatusCode};
