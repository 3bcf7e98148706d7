use std::collections::HashMap;
use std::sync::Arc;

/// Inline capacity of the carrier. Matching a route with at most this many
/// parameters touches no heap.
pub const INLINE_PARAMS: usize = 8;

/// Byte range of a parameter value inside the routing path.
///
/// The carrier stores spans rather than owned strings so the match path
/// performs no allocation; the context resolves a span against the path it
/// owns.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct ParamSpan {
    pub start: u32,
    pub end: u32,
}

impl ParamSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    /// Resolve the span against the path it was extracted from.
    pub fn slice<'p>(&self, path: &'p str) -> &'p str {
        &path[self.start as usize..self.end as usize]
    }
}

/// Extracted path parameters: two parallel inline arrays with a lazily
/// allocated spill map for routes with more than [`INLINE_PARAMS`] captures.
///
/// Lookups scan the inline slots linearly before consulting the map; for
/// eight entries the scan stays in one cache line of names.
pub struct Params {
    names: [Option<Arc<str>>; INLINE_PARAMS],
    spans: [ParamSpan; INLINE_PARAMS],
    len: usize,
    spill: Option<HashMap<Arc<str>, ParamSpan>>,
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

impl Params {
    pub fn new() -> Self {
        Self {
            names: Default::default(),
            spans: [ParamSpan::default(); INLINE_PARAMS],
            len: 0,
            spill: None,
        }
    }

    /// Record a parameter. An existing entry with the same name is
    /// overwritten; the ninth distinct name allocates the spill map.
    pub fn set(&mut self, name: Arc<str>, span: ParamSpan) {
        for i in 0..self.len {
            if self.names[i].as_deref() == Some(&*name) {
                self.spans[i] = span;
                return;
            }
        }
        if let Some(spill) = self.spill.as_mut() {
            if spill.contains_key(&name) {
                spill.insert(name, span);
                return;
            }
        }
        if self.len < INLINE_PARAMS {
            self.names[self.len] = Some(name);
            self.spans[self.len] = span;
            self.len += 1;
        } else {
            self.spill
                .get_or_insert_with(HashMap::new)
                .insert(name, span);
        }
    }

    /// Look up a parameter span by name. Absent names yield `None`; the
    /// context layer turns that into the empty-string sentinel.
    pub fn get(&self, name: &str) -> Option<ParamSpan> {
        for i in 0..self.len {
            if self.names[i].as_deref() == Some(name) {
                return Some(self.spans[i]);
            }
        }
        self.spill.as_ref().and_then(|m| m.get(name).copied())
    }

    /// Total number of recorded parameters, inline and spilled.
    pub fn count(&self) -> usize {
        self.len + self.spill.as_ref().map_or(0, |m| m.len())
    }

    /// Remove a parameter by name. Used by the matcher to unwind a
    /// speculative capture when backtracking out of a parameter branch.
    pub(crate) fn remove(&mut self, name: &str) {
        for i in 0..self.len {
            if self.names[i].as_deref() == Some(name) {
                for j in i..self.len - 1 {
                    self.names[j] = self.names[j + 1].take();
                    self.spans[j] = self.spans[j + 1];
                }
                self.names[self.len - 1] = None;
                self.len -= 1;
                return;
            }
        }
        if let Some(spill) = self.spill.as_mut() {
            spill.remove(name);
        }
    }

    /// Clear the carrier: zero the counter and drop the spill map.
    pub fn reset(&mut self) {
        for slot in self.names.iter_mut().take(self.len) {
            *slot = None;
        }
        self.len = 0;
        self.spill = None;
    }

    /// Iterate recorded `(name, span)` pairs, inline slots first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamSpan)> {
        let inline = self.names[..self.len]
            .iter()
            .zip(self.spans[..self.len].iter())
            .map(|(n, s)| (n.as_deref().unwrap_or(""), *s));
        let spilled = self
            .spill
            .iter()
            .flat_map(|m| m.iter().map(|(n, s)| (&**n, *s)));
        inline.chain(spilled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn set_get_within_inline_capacity() {
        let mut params = Params::new();
        params.set(name("id"), ParamSpan::new(7, 9));
        params.set(name("slug"), ParamSpan::new(10, 14));

        assert_eq!(params.get("id"), Some(ParamSpan::new(7, 9)));
        assert_eq!(params.get("slug"), Some(ParamSpan::new(10, 14)));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.count(), 2);
        assert!(params.spill.is_none());
    }

    #[test]
    fn ninth_insert_spills_to_map() {
        let mut params = Params::new();
        for i in 0..INLINE_PARAMS {
            params.set(name(&format!("p{i}")), ParamSpan::new(i, i + 1));
        }
        assert!(params.spill.is_none());

        params.set(name("overflow"), ParamSpan::new(99, 100));
        assert!(params.spill.is_some());
        assert_eq!(params.count(), INLINE_PARAMS + 1);
        assert_eq!(params.get("overflow"), Some(ParamSpan::new(99, 100)));
        assert_eq!(params.get("p0"), Some(ParamSpan::new(0, 1)));
    }

    #[test]
    fn same_name_overwrites_in_place() {
        let mut params = Params::new();
        params.set(name("id"), ParamSpan::new(0, 2));
        params.set(name("id"), ParamSpan::new(3, 5));
        assert_eq!(params.count(), 1);
        assert_eq!(params.get("id"), Some(ParamSpan::new(3, 5)));
    }

    #[test]
    fn reset_zeroes_counter_and_drops_spill() {
        let mut params = Params::new();
        for i in 0..INLINE_PARAMS + 2 {
            params.set(name(&format!("p{i}")), ParamSpan::new(i, i + 1));
        }
        params.reset();
        assert_eq!(params.count(), 0);
        assert!(params.spill.is_none());
        assert_eq!(params.get("p0"), None);
    }

    #[test]
    fn remove_unwinds_a_capture() {
        let mut params = Params::new();
        params.set(name("a"), ParamSpan::new(0, 1));
        params.set(name("b"), ParamSpan::new(2, 3));
        params.remove("a");
        assert_eq!(params.count(), 1);
        assert_eq!(params.get("a"), None);
        assert_eq!(params.get("b"), Some(ParamSpan::new(2, 3)));
    }

    #[test]
    fn span_slices_the_original_path() {
        let path = "users/42/posts";
        let span = ParamSpan::new(6, 8);
        assert_eq!(span.slice(path), "42");
    }
}
