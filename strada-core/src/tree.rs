use crate::constraint::Constraint;
use crate::context::HandlerChain;
use crate::params::{ParamSpan, Params};
use std::collections::HashMap;
use std::sync::Arc;

/// Capture name used for a bare `*` wildcard segment. A named wildcard
/// (`*rest`) captures under the caller-chosen name instead.
pub const WILDCARD_PARAM: &str = "path";

/// A registered route as the match path sees it: the canonical pattern, the
/// resolved handler chain, and the parameter constraints evaluated at the
/// terminal.
///
/// Entries are shared (`Arc`) between the radix tree and the compiled
/// static table, so a static-table hit returns the identical chain the tree
/// would.
pub(crate) struct RouteEntry {
    pub(crate) pattern: Arc<str>,
    pub(crate) chain: HandlerChain,
    pub(crate) constraints: Vec<(Arc<str>, Constraint)>,
}

impl RouteEntry {
    /// A pattern is static when it captures nothing: no parameter, no
    /// wildcard. Only static patterns enter the compiled side-table.
    pub(crate) fn is_static(&self) -> bool {
        !self.pattern.contains(':') && !self.pattern.contains('*')
    }
}

/// Tree-internal insertion failure; the registrar enriches it with the
/// method and pattern for the user-facing error.
#[derive(Debug)]
pub(crate) enum InsertError {
    Duplicate,
    ParamConflict { existing: String, conflicting: String },
}

/// Strip the leading/trailing slashes a pattern or request path carries.
pub(crate) fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Validate pattern syntax eagerly, before the route enters the pending
/// queue: parameter names must be `[A-Za-z_][A-Za-z0-9_]*`, `:`/`*` only
/// introduce segments, and a wildcard must be the final segment.
pub(crate) fn validate_pattern(pattern: &str) -> Result<(), String> {
    let normalized = normalize(pattern);
    if normalized.is_empty() {
        return Ok(());
    }
    let segments: Vec<&str> = normalized.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if let Some(name) = segment.strip_prefix(':') {
            if !valid_param_name(name) {
                return Err(format!("invalid parameter name {name:?}"));
            }
        } else if let Some(name) = segment.strip_prefix('*') {
            if i != segments.len() - 1 {
                return Err("wildcard must be the final segment".into());
            }
            if !name.is_empty() && !valid_param_name(name) {
                return Err(format!("invalid wildcard name {name:?}"));
            }
        } else if segment.contains(':') || segment.contains('*') {
            return Err(format!(
                "{segment:?}: ':' and '*' may only introduce a segment"
            ));
        } else if segment.is_empty() {
            return Err("empty segment".into());
        }
    }
    Ok(())
}

fn valid_param_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

struct ParamEdge {
    name: Arc<str>,
    node: RadixNode,
}

struct WildcardEdge {
    name: Arc<str>,
    entry: Arc<RouteEntry>,
}

/// One node of the per-method radix tree.
///
/// Static children are keyed by segment; additionally, the root holds every
/// parameter-free pattern under its full normalized path, preserving O(1)
/// exact-match lookup from the root. A node has at most one parameter child
/// and at most one (terminal) wildcard child.
#[derive(Default)]
pub(crate) struct RadixNode {
    entry: Option<Arc<RouteEntry>>,
    statics: HashMap<Box<str>, RadixNode>,
    param: Option<Box<ParamEdge>>,
    wildcard: Option<WildcardEdge>,
}

impl RadixNode {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a route at registration time. `self` must be the tree root.
    pub(crate) fn insert(&mut self, entry: Arc<RouteEntry>) -> Result<(), InsertError> {
        let pattern = entry.pattern.clone();
        let normalized = normalize(&pattern);

        if normalized.is_empty() {
            return Self::install(&mut self.entry, entry);
        }

        // Parameter-free patterns live under the root keyed by the whole
        // path, so an exact request hits in one map probe.
        if entry.is_static() {
            let node = self
                .statics
                .entry(Box::from(normalized))
                .or_insert_with(RadixNode::new);
            return Self::install(&mut node.entry, entry);
        }

        let mut node = self;
        let segments: Vec<&str> = normalized.split('/').collect();
        for segment in &segments {
            if let Some(name) = segment.strip_prefix(':') {
                if let Some(edge) = node.param.as_deref() {
                    if &*edge.name != name {
                        return Err(InsertError::ParamConflict {
                            existing: edge.name.to_string(),
                            conflicting: name.to_string(),
                        });
                    }
                }
                node = &mut node
                    .param
                    .get_or_insert_with(|| {
                        Box::new(ParamEdge {
                            name: Arc::from(name),
                            node: RadixNode::new(),
                        })
                    })
                    .node;
            } else if let Some(name) = segment.strip_prefix('*') {
                let name = if name.is_empty() { WILDCARD_PARAM } else { name };
                if node.wildcard.is_some() {
                    return Err(InsertError::Duplicate);
                }
                node.wildcard = Some(WildcardEdge {
                    name: Arc::from(name),
                    entry,
                });
                return Ok(());
            } else {
                node = node
                    .statics
                    .entry(Box::from(*segment))
                    .or_insert_with(RadixNode::new);
            }
        }
        Self::install(&mut node.entry, entry)
    }

    fn install(slot: &mut Option<Arc<RouteEntry>>, entry: Arc<RouteEntry>) -> Result<(), InsertError> {
        if slot.is_some() {
            return Err(InsertError::Duplicate);
        }
        *slot = Some(entry);
        Ok(())
    }

    /// Match a normalized path (no surrounding slashes), recording captures
    /// into `params`. Constraint failure is a non-match: the walk backtracks
    /// and tries the remaining alternatives at each position.
    pub(crate) fn lookup<'n>(
        &'n self,
        path: &str,
        params: &mut Params,
    ) -> Option<&'n Arc<RouteEntry>> {
        if path.is_empty() {
            return self
                .entry
                .as_ref()
                .filter(|entry| constraints_hold(entry, path, params));
        }

        // Root fast path: a parameter-free pattern matches in one probe.
        if let Some(node) = self.statics.get(path) {
            if let Some(entry) = node.entry.as_ref() {
                if constraints_hold(entry, path, params) {
                    return Some(entry);
                }
            }
        }

        self.lookup_at(path, 0, params)
    }

    fn lookup_at<'n>(
        &'n self,
        path: &str,
        start: usize,
        params: &mut Params,
    ) -> Option<&'n Arc<RouteEntry>> {
        let end = path[start..]
            .find('/')
            .map(|i| start + i)
            .unwrap_or(path.len());
        let segment = &path[start..end];
        let last = end == path.len();

        // (a) exact static child; static wins on an exact segment match.
        if let Some(child) = self.statics.get(segment) {
            if last {
                if let Some(entry) = child.entry.as_ref() {
                    if constraints_hold(entry, path, params) {
                        return Some(entry);
                    }
                }
            } else if let Some(entry) = child.lookup_at(path, end + 1, params) {
                return Some(entry);
            }
        }

        // (b) parameter child: capture speculatively, unwind on backtrack.
        if !segment.is_empty() {
            if let Some(edge) = self.param.as_deref() {
                params.set(edge.name.clone(), ParamSpan::new(start, end));
                if last {
                    if let Some(entry) = edge.node.entry.as_ref() {
                        if constraints_hold(entry, path, params) {
                            return Some(entry);
                        }
                    }
                } else if let Some(entry) = edge.node.lookup_at(path, end + 1, params) {
                    return Some(entry);
                }
                params.remove(&edge.name);
            }
        }

        // (c) wildcard: consume the remainder.
        if let Some(edge) = self.wildcard.as_ref() {
            params.set(edge.name.clone(), ParamSpan::new(start, path.len()));
            if constraints_hold(&edge.entry, path, params) {
                return Some(&edge.entry);
            }
            params.remove(&edge.name);
        }

        None
    }

    /// Visit every terminal entry in the tree, in no particular order.
    pub(crate) fn for_each_entry(&self, f: &mut impl FnMut(&Arc<RouteEntry>)) {
        if let Some(entry) = self.entry.as_ref() {
            f(entry);
        }
        for child in self.statics.values() {
            child.for_each_entry(f);
        }
        if let Some(edge) = self.param.as_deref() {
            edge.node.for_each_entry(f);
        }
        if let Some(edge) = self.wildcard.as_ref() {
            f(&edge.entry);
        }
    }
}

fn constraints_hold(entry: &RouteEntry, path: &str, params: &Params) -> bool {
    entry.constraints.iter().all(|(name, constraint)| {
        params
            .get(name)
            .map(|span| constraint.matches(span.slice(path)))
            .unwrap_or(false)
    })
}
