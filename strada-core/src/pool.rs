use crate::context::{Context, SizeClass};
use crate::params::INLINE_PARAMS;
use std::sync::Mutex;

/// Upper parameter count of the `small` class.
const SMALL_MAX_PARAMS: usize = 4;
/// Upper parameter count of the `medium` class; beyond this the carrier has
/// spilled to its map and the context is classed `large`.
const MEDIUM_MAX_PARAMS: usize = INLINE_PARAMS;

/// Size-classed pools of request contexts.
///
/// Each class is a LIFO free-list behind its own mutex, so concurrent
/// dispatchers acquire and release without contending on a single lock for
/// long. Dispatch always acquires from the `small` class (the carrier
/// migrates to the spill map on overflow); on release the context returns
/// to the class matching its final parameter count, so a route that
/// overflowed once seeds the `large` list for its successors.
pub struct ContextPool {
    small: Mutex<Vec<Box<Context>>>,
    medium: Mutex<Vec<Box<Context>>>,
    large: Mutex<Vec<Box<Context>>>,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPool {
    pub fn new() -> Self {
        Self {
            small: Mutex::new(Vec::new()),
            medium: Mutex::new(Vec::new()),
            large: Mutex::new(Vec::new()),
        }
    }

    /// Pre-allocate contexts per class so the first requests after freeze
    /// do not pay construction cost.
    pub fn warm_up(&self, small: usize, medium: usize, large: usize) {
        self.small
            .lock()
            .unwrap()
            .extend((0..small).map(|_| Box::new(Context::new(SizeClass::Small))));
        self.medium
            .lock()
            .unwrap()
            .extend((0..medium).map(|_| Box::new(Context::new(SizeClass::Medium))));
        self.large
            .lock()
            .unwrap()
            .extend((0..large).map(|_| Box::new(Context::new(SizeClass::Large))));
    }

    /// Take a context from the given class, constructing one when the
    /// free-list is empty.
    pub(crate) fn acquire(&self, class: SizeClass) -> Box<Context> {
        let mut ctx = match self.list(class).lock().unwrap().pop() {
            Some(ctx) => ctx,
            None => Box::new(Context::new(class)),
        };
        ctx.class = class;
        ctx
    }

    /// Recycle a context and push it onto the free-list matching its final
    /// parameter count.
    pub(crate) fn release(&self, mut ctx: Box<Context>) {
        let count = ctx.final_param_count();
        ctx.recycle();
        let class = Self::classify(count);
        ctx.class = class;
        self.list(class).lock().unwrap().push(ctx);
    }

    pub(crate) fn classify(param_count: usize) -> SizeClass {
        if param_count <= SMALL_MAX_PARAMS {
            SizeClass::Small
        } else if param_count <= MEDIUM_MAX_PARAMS {
            SizeClass::Medium
        } else {
            SizeClass::Large
        }
    }

    fn list(&self, class: SizeClass) -> &Mutex<Vec<Box<Context>>> {
        match class {
            SizeClass::Small => &self.small,
            SizeClass::Medium => &self.medium,
            SizeClass::Large => &self.large,
        }
    }

    #[cfg(test)]
    fn len(&self, class: SizeClass) -> usize {
        self.list(class).lock().unwrap().len()
    }
}
