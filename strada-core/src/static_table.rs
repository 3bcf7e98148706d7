use crate::tree::{normalize, RouteEntry};
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// Default Bloom filter width in bits.
pub(crate) const DEFAULT_BLOOM_BITS: usize = 1024;

/// Below this entry count the filter costs more than the map probe it
/// guards; lookups go straight to the map.
pub(crate) const BLOOM_MIN_ENTRIES: usize = 10;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Seeds deriving the three Bloom hash functions from FNV-1a.
const BLOOM_SEEDS: [u64; 3] = [
    0x9e37_79b9_7f4a_7c15,
    0xc2b2_ae3d_27d4_eb4f,
    0x1656_67b1_9e37_79f9,
];

fn fnv1a(seed: u64, method: &Method, path: &str) -> u64 {
    let mut hash = FNV_OFFSET ^ seed;
    for &b in method.as_str().as_bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for &b in path.as_bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// 64-bit FNV-1a fingerprint of `(method, canonical path)`.
pub(crate) fn fingerprint(method: &Method, path: &str) -> u64 {
    fnv1a(0, method, path)
}

struct Bloom {
    bits: Box<[u64]>,
    nbits: u64,
}

impl Bloom {
    fn new(nbits: usize) -> Self {
        let nbits = nbits.max(64);
        Self {
            bits: vec![0u64; nbits.div_ceil(64)].into_boxed_slice(),
            nbits: nbits as u64,
        }
    }

    fn insert(&mut self, method: &Method, path: &str) {
        for seed in BLOOM_SEEDS {
            let bit = fnv1a(seed, method, path) % self.nbits;
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// `false` means definitely absent; `true` means the map must decide.
    fn may_contain(&self, method: &Method, path: &str) -> bool {
        BLOOM_SEEDS.iter().all(|&seed| {
            let bit = fnv1a(seed, method, path) % self.nbits;
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }
}

/// Compiled side-table over the frozen route set: every parameter-free
/// pattern keyed by its `(method, path)` fingerprint, guarded by a Bloom
/// filter that rejects most dynamic paths without touching the map.
///
/// Built once at freeze and never mutated afterwards.
pub(crate) struct StaticTable {
    entries: HashMap<u64, Arc<RouteEntry>>,
    bloom: Option<Bloom>,
}

impl StaticTable {
    /// Compile the table from every `(method, entry)` terminal of the
    /// method trees. Non-static entries are skipped here so callers can
    /// feed the full walk.
    pub(crate) fn build<'a, I>(routes: I, bloom_bits: usize) -> Self
    where
        I: IntoIterator<Item = (&'a Method, &'a Arc<RouteEntry>)>,
    {
        let static_routes: Vec<(&Method, &Arc<RouteEntry>)> = routes
            .into_iter()
            .filter(|(_, entry)| entry.is_static())
            .collect();

        let mut entries = HashMap::with_capacity(static_routes.len());
        let mut bloom = (static_routes.len() >= BLOOM_MIN_ENTRIES).then(|| Bloom::new(bloom_bits));

        for (method, entry) in static_routes {
            let path = normalize(&entry.pattern);
            entries.insert(fingerprint(method, path), Arc::clone(entry));
            if let Some(bloom) = bloom.as_mut() {
                bloom.insert(method, path);
            }
        }

        Self { entries, bloom }
    }

    /// Probe for a static route. `path` must be the normalized routing
    /// path (no surrounding slashes).
    pub(crate) fn get(&self, method: &Method, path: &str) -> Option<&Arc<RouteEntry>> {
        if let Some(bloom) = self.bloom.as_ref() {
            if !bloom.may_contain(method, path) {
                return None;
            }
        }
        self.entries.get(&fingerprint(method, path))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn has_bloom(&self) -> bool {
        self.bloom.is_some()
    }
}
