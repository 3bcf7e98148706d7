use crate::context::Context;
use crate::response::ResponseInfo;
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Opaque per-request state threaded from `on_request_start` to
/// `on_request_end`.
pub type ObserverState = Box<dyn Any + Send>;

/// Per-request observability hooks.
///
/// `on_request_start` runs before dispatch for every request; returning
/// `None` marks the request observability-excluded. Any context enrichment
/// the hook performs applies unconditionally, so trace-context propagation
/// works even for excluded requests. `on_request_end` runs after the chain
/// completes — including after a middleware abort — if and only if a state
/// was returned, and receives the matched route pattern rather than the raw
/// path so metric label cardinality stays bounded.
///
/// The response writer tracks status and byte count natively, so the
/// response-info capability needs no wrapping layer: the dispatcher
/// extracts a [`ResponseInfo`] snapshot for non-excluded requests.
///
/// Panics raised by either hook are caught and suppressed; they cannot
/// corrupt the request pipeline.
pub trait RequestObserver: Send + Sync {
    fn on_request_start(&self, ctx: &mut Context) -> Option<ObserverState>;

    fn on_request_end(
        &self,
        ctx: &Context,
        state: ObserverState,
        info: ResponseInfo,
        pattern: &str,
    );
}

/// Default cap on distinct interned labels.
pub const DEFAULT_LABEL_CAP: usize = 1000;

/// Sentinel label returned once the cap is reached.
pub const OVERFLOW_LABEL: &str = "<overflow>";

/// Bounded label set for metric implementations built on the hook surface.
///
/// Handler-provided names are unbounded input; without a cap a hostile or
/// buggy client could mint labels until the metrics backend exhausts
/// memory. Once the cap is reached, unseen labels collapse into
/// [`OVERFLOW_LABEL`] and a single warning is emitted.
pub struct LabelInterner {
    cap: usize,
    labels: Mutex<HashSet<Arc<str>>>,
    warned: AtomicBool,
}

impl Default for LabelInterner {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LABEL_CAP)
    }
}

impl LabelInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            cap,
            labels: Mutex::new(HashSet::new()),
            warned: AtomicBool::new(false),
        }
    }

    /// Intern a label, sharing one allocation per distinct value. Returns
    /// the overflow sentinel for labels beyond the cap.
    pub fn intern(&self, label: &str) -> Arc<str> {
        let mut labels = self.labels.lock().unwrap();
        if let Some(existing) = labels.get(label) {
            return Arc::clone(existing);
        }
        if labels.len() >= self.cap {
            if !self.warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    cap = self.cap,
                    label,
                    "label cardinality cap reached; further labels collapse to the overflow sentinel"
                );
            }
            return Arc::from(OVERFLOW_LABEL);
        }
        let interned: Arc<str> = Arc::from(label);
        labels.insert(Arc::clone(&interned));
        interned
    }

    pub fn len(&self) -> usize {
        self.labels.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_shares_one_allocation_per_label() {
        let interner = LabelInterner::new();
        let a = interner.intern("/users/:id");
        let b = interner.intern("/users/:id");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn cap_collapses_new_labels_to_overflow() {
        let interner = LabelInterner::with_capacity(2);
        interner.intern("/a");
        interner.intern("/b");
        let c = interner.intern("/c");
        assert_eq!(&*c, OVERFLOW_LABEL);
        assert_eq!(interner.len(), 2);

        // Labels seen before the cap keep resolving normally.
        assert_eq!(&*interner.intern("/a"), "/a");
    }
}
