use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{HeaderValue, ACCEPT};
use http::{HeaderMap, Request};
use std::collections::HashSet;
use std::sync::Arc;

/// Where a request's API version was found.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VersionSource {
    Path,
    Header,
    Accept,
    Query,
    Custom,
    Default,
}

impl std::fmt::Display for VersionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VersionSource::Path => "path",
            VersionSource::Header => "header",
            VersionSource::Accept => "accept",
            VersionSource::Query => "query",
            VersionSource::Custom => "custom",
            VersionSource::Default => "default",
        };
        f.write_str(name)
    }
}

/// One detection outcome, emitted per request when versioning is enabled.
#[derive(Debug)]
pub enum VersionEvent<'a> {
    Detected {
        version: &'a str,
        source: VersionSource,
    },
    Missing,
    Invalid {
        attempted: &'a str,
    },
}

/// Observer for version-detection outcomes.
pub trait VersionObserver: Send + Sync {
    fn on_event(&self, event: VersionEvent<'_>);
}

/// Default observer: reports outcomes as `tracing` debug events.
#[derive(Default)]
pub struct TracingVersionObserver;

impl VersionObserver for TracingVersionObserver {
    fn on_event(&self, event: VersionEvent<'_>) {
        match event {
            VersionEvent::Detected { version, source } => {
                tracing::debug!(version, %source, "api version detected")
            }
            VersionEvent::Missing => tracing::debug!("no api version detected"),
            VersionEvent::Invalid { attempted } => {
                tracing::debug!(attempted, "invalid api version")
            }
        }
    }
}

/// Caller-supplied extractor, lowest-precedence detection source before the
/// default.
pub type CustomExtractor = Arc<dyn Fn(&Request<Bytes>) -> Option<String> + Send + Sync>;

/// A `{version}` template split into its literal surroundings.
#[derive(Clone)]
pub(crate) struct Template {
    prefix: String,
    suffix: String,
}

impl Template {
    fn parse(template: &str) -> Result<Self, String> {
        let Some(at) = template.find("{version}") else {
            return Err(format!("template {template:?} has no {{version}} placeholder"));
        };
        let suffix = &template[at + "{version}".len()..];
        if suffix.contains("{version}") {
            return Err(format!(
                "template {template:?} has more than one {{version}} placeholder"
            ));
        }
        Ok(Self {
            prefix: template[..at].to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Match at the start of a request path. Returns the version token and
    /// the number of bytes (prefix + token) to strip before routing.
    fn match_path<'p>(&self, path: &'p str) -> Option<(&'p str, usize)> {
        let rest = path.strip_prefix(&self.prefix)?;
        let token_len = rest.find('/').unwrap_or(rest.len());
        if token_len == 0 {
            return None;
        }
        let token = &rest[..token_len];
        let after = &rest[token_len..];
        // `/v1` is equivalent to `/v1/` for the root match: an exhausted
        // path satisfies any suffix.
        if !after.is_empty() && !self.suffix.is_empty() && !after.starts_with(&self.suffix) {
            return None;
        }
        Some((token, self.prefix.len() + token_len))
    }

    /// Match one Accept media range against the template.
    fn match_media<'m>(&self, media: &'m str) -> Option<&'m str> {
        let rest = media.strip_prefix(self.prefix.as_str())?;
        let middle = rest.strip_suffix(self.suffix.as_str())?;
        (!middle.is_empty()).then_some(middle)
    }
}

/// Detection configuration: any subset of the five sources plus an optional
/// validity set and default.
///
/// Precedence is fixed: path > header > accept > query > custom > default.
/// The first source yielding a non-empty value inside the validity set
/// wins.
#[derive(Clone, Default)]
pub struct VersionConfig {
    pub(crate) path_template: Option<Template>,
    pub(crate) header: Option<String>,
    pub(crate) accept_template: Option<Template>,
    pub(crate) query_param: Option<String>,
    pub(crate) custom: Option<CustomExtractor>,
    pub(crate) valid: Option<HashSet<Box<str>>>,
    pub(crate) default: Option<Arc<str>>,
}

impl VersionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect from a path prefix, e.g. `/v{version}/` or `/api/{version}/`.
    /// The matched prefix and version token are stripped before routing.
    ///
    /// # Panics
    ///
    /// Panics when the template has no (or more than one) `{version}`
    /// placeholder.
    pub fn path_template(mut self, template: &str) -> Self {
        self.path_template =
            Some(Template::parse(template).unwrap_or_else(|err| panic!("path template: {err}")));
        self
    }

    /// Detect from a request header, matched case-insensitively.
    pub fn header(mut self, name: &str) -> Self {
        self.header = Some(name.to_ascii_lowercase());
        self
    }

    /// Detect from Accept media ranges, e.g.
    /// `application/vnd.api.{version}+json`.
    ///
    /// # Panics
    ///
    /// Panics when the template has no (or more than one) `{version}`
    /// placeholder.
    pub fn accept_template(mut self, template: &str) -> Self {
        self.accept_template =
            Some(Template::parse(template).unwrap_or_else(|err| panic!("accept template: {err}")));
        self
    }

    /// Detect from a query-string key.
    pub fn query_param(mut self, name: &str) -> Self {
        self.query_param = Some(name.to_string());
        self
    }

    /// Detect with a caller-supplied extractor.
    pub fn custom_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request<Bytes>) -> Option<String> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(f));
        self
    }

    /// Restrict detection to this set; values outside it are reported as
    /// invalid and fall through to the default.
    pub fn valid_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        self.valid = Some(versions.into_iter().map(Into::into).collect());
        self
    }

    /// Version applied when nothing is detected or the detected value is
    /// invalid.
    pub fn default_version(mut self, version: &str) -> Self {
        self.default = Some(Arc::from(version));
        self
    }

    pub(crate) fn is_known(&self, version: &str) -> bool {
        self.valid
            .as_ref()
            .map_or(true, |set| set.contains(version))
    }

    /// Run the detection pipeline. Emits exactly one observer event.
    pub(crate) fn detect(
        &self,
        req: &Request<Bytes>,
        observer: &dyn VersionObserver,
    ) -> Detection {
        let mut invalid: Option<String> = None;

        for (source, candidate) in self.candidates(req) {
            let Some((value, strip)) = candidate else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            if self.is_known(&value) {
                observer.on_event(VersionEvent::Detected {
                    version: &value,
                    source,
                });
                return Detection {
                    version: Some(Arc::from(value.as_str())),
                    source,
                    strip,
                };
            }
            invalid.get_or_insert(value);
        }

        match invalid {
            Some(attempted) => observer.on_event(VersionEvent::Invalid {
                attempted: &attempted,
            }),
            None => observer.on_event(VersionEvent::Missing),
        }

        Detection {
            version: self.default.clone(),
            source: VersionSource::Default,
            strip: 0,
        }
    }

    /// Candidate values in precedence order. Each candidate carries the
    /// path bytes to strip (non-zero only for the path source).
    fn candidates<'r>(
        &'r self,
        req: &'r Request<Bytes>,
    ) -> impl Iterator<Item = (VersionSource, Option<(String, usize)>)> + 'r {
        let path = req.uri().path();
        [
            (
                VersionSource::Path,
                self.path_template
                    .as_ref()
                    .and_then(|t| t.match_path(path))
                    .map(|(v, strip)| (v.to_string(), strip)),
            ),
            (
                VersionSource::Header,
                self.header.as_ref().and_then(|name| {
                    req.headers()
                        .get(name.as_str())
                        .and_then(|v| v.to_str().ok())
                        .map(|v| (v.trim().to_string(), 0))
                }),
            ),
            (
                VersionSource::Accept,
                self.accept_template.as_ref().and_then(|t| {
                    let accept = req.headers().get(ACCEPT)?.to_str().ok()?;
                    accept.split(',').find_map(|range| {
                        let media = range.split(';').next().unwrap_or("").trim();
                        t.match_media(media).map(|v| (v.to_string(), 0))
                    })
                }),
            ),
            (
                VersionSource::Query,
                self.query_param.as_ref().and_then(|key| {
                    let query = req.uri().query()?;
                    form_urlencoded::parse(query.as_bytes())
                        .find(|(k, _)| k == key.as_str())
                        .map(|(_, v)| (v.into_owned(), 0))
                }),
            ),
            (
                VersionSource::Custom,
                self.custom
                    .as_ref()
                    .and_then(|f| f(req))
                    .map(|v| (v, 0)),
            ),
        ]
        .into_iter()
    }
}

/// Outcome of the detection pipeline.
pub(crate) struct Detection {
    pub(crate) version: Option<Arc<str>>,
    #[allow(dead_code)]
    pub(crate) source: VersionSource,
    /// Bytes of the raw path consumed by a path-template match; stripped
    /// before tree lookup.
    pub(crate) strip: usize,
}

/// Deprecation metadata attached to a version; emitted as response headers
/// on every match against that version's tree.
#[derive(Clone, Default)]
pub struct VersionLifecycle {
    pub(crate) deprecated: bool,
    pub(crate) sunset: Option<DateTime<Utc>>,
    pub(crate) migration_url: Option<String>,
}

impl VersionLifecycle {
    pub(crate) fn is_empty(&self) -> bool {
        !self.deprecated && self.sunset.is_none() && self.migration_url.is_none()
    }

    /// Write `Deprecation` / `Sunset` / `Link` headers.
    pub(crate) fn apply(&self, headers: &mut HeaderMap) {
        if self.deprecated {
            headers.insert("deprecation", HeaderValue::from_static("true"));
        }
        if let Some(sunset) = self.sunset {
            let value = sunset.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert("sunset", value);
            }
        }
        if let Some(url) = self.migration_url.as_deref() {
            if let Ok(value) = HeaderValue::from_str(&format!("<{url}>; rel=\"deprecation\"")) {
                headers.insert("link", value);
            }
        }
    }
}
