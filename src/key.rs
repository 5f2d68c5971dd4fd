use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a cacheable GPU resource.
///
/// Two sources carrying the same key are treated as the same logical image by the
/// [`ResourceCache`](crate::ResourceCache) and the [`ProxyProvider`](crate::ProxyProvider).
/// The default key is empty and never matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueKey(u64);

impl UniqueKey {
    /// The empty key.
    pub const EMPTY: Self = Self(0);

    /// Allocates a new key, distinct from every other key made in this process.
    pub fn new() -> Self {
        static NEXT_KEY: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns true if this key does not identify anything.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Gets the raw id, 0 for the empty key.
    pub fn id(&self) -> u64 {
        self.0
    }
}
