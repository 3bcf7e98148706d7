use crate::error::UrlBuildError;
use crate::tree::normalize;

enum RevSeg {
    Literal(Box<str>),
    Param(Box<str>),
    Wildcard(Box<str>),
}

/// A route pattern parsed for URL building, finalized for every named route
/// at freeze.
pub(crate) struct ReversePattern {
    segments: Vec<RevSeg>,
}

impl ReversePattern {
    pub(crate) fn parse(pattern: &str) -> Self {
        let normalized = normalize(pattern);
        let segments = if normalized.is_empty() {
            Vec::new()
        } else {
            normalized
                .split('/')
                .map(|segment| {
                    if let Some(name) = segment.strip_prefix(':') {
                        RevSeg::Param(Box::from(name))
                    } else if let Some(name) = segment.strip_prefix('*') {
                        let name = if name.is_empty() {
                            crate::tree::WILDCARD_PARAM
                        } else {
                            name
                        };
                        RevSeg::Wildcard(Box::from(name))
                    } else {
                        RevSeg::Literal(Box::from(segment))
                    }
                })
                .collect()
        };
        Self { segments }
    }

    /// Build a URL by substituting `params` into the pattern. Parameters
    /// the pattern does not consume are merged into the query string after
    /// the explicit `query` pairs.
    pub(crate) fn build(
        &self,
        route_name: &str,
        params: &[(&str, &str)],
        query: &[(&str, &str)],
    ) -> Result<String, UrlBuildError> {
        let lookup = |name: &str| params.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);

        let mut url = String::new();
        let mut used: Vec<&str> = Vec::new();
        for segment in &self.segments {
            url.push('/');
            match segment {
                RevSeg::Literal(lit) => url.push_str(lit),
                RevSeg::Param(name) | RevSeg::Wildcard(name) => {
                    let value = lookup(name).ok_or_else(|| UrlBuildError::MissingParam {
                        name: route_name.to_string(),
                        param: name.to_string(),
                    })?;
                    url.push_str(value);
                    used.push(name);
                }
            }
        }
        if url.is_empty() {
            url.push('/');
        }

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for (key, value) in query {
            serializer.append_pair(key, value);
            any = true;
        }
        for (key, value) in params {
            if !used.contains(key) {
                serializer.append_pair(key, value);
                any = true;
            }
        }
        if any {
            url.push('?');
            url.push_str(&serializer.finish());
        }

        Ok(url)
    }
}
