use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::{Texture, UniqueKey};

/// Caches [`Texture`]s by [`UniqueKey`].
///
/// Entries are kept in least recently used order. Whenever the total memory of the cached
/// textures exceeds the cache limit, the oldest textures that nothing else references are
/// evicted.
pub struct ResourceCache {
    inner: Mutex<Inner>,
}

struct Inner {
    textures: IndexMap<UniqueKey, Arc<Texture>>,
    memory_usage: usize,
    cache_limit: usize,
}

impl ResourceCache {
    /// Creates an empty cache.
    ///
    /// This should be done whenever the wgpu state is reinitialized.
    pub fn new(cache_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                textures: IndexMap::new(),
                memory_usage: 0,
                cache_limit,
            }),
        }
    }

    /// Looks up the texture registered under `key`, marking it as recently used.
    pub fn find_unique_resource(&self, key: UniqueKey) -> Option<Arc<Texture>> {
        if key.is_empty() {
            return None;
        }
        let mut inner = self.inner.lock();
        let index = inner.textures.get_index_of(&key)?;
        let last = inner.textures.len() - 1;
        inner.textures.move_index(index, last);
        log::debug!("found cached texture for {key:?}");
        inner.textures.get_index(last).map(|(_, texture)| texture.clone())
    }

    /// Returns true if a texture is registered under `key`, without touching its recency.
    pub fn has_unique_resource(&self, key: UniqueKey) -> bool {
        !key.is_empty() && self.inner.lock().textures.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().textures.is_empty()
    }

    /// Total memory of the cached textures, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.inner.lock().memory_usage
    }

    pub fn cache_limit(&self) -> usize {
        self.inner.lock().cache_limit
    }

    /// Changes the cache limit, evicting textures if the cache is now over it.
    pub fn set_cache_limit(&self, cache_limit: usize) {
        let mut inner = self.inner.lock();
        inner.cache_limit = cache_limit;
        inner.purge_until(cache_limit);
    }

    /// Evicts unreferenced textures, oldest first, until the cache fits its limit.
    pub fn purge_to_limit(&self) -> usize {
        let mut inner = self.inner.lock();
        let limit = inner.cache_limit;
        inner.purge_until(limit)
    }

    /// Evicts every texture nothing outside the cache references.
    pub fn purge_unreferenced(&self) -> usize {
        self.inner.lock().purge_until(0)
    }

    pub(crate) fn change_unique_key(&self, texture: &Arc<Texture>, old: UniqueKey, new: UniqueKey) {
        let displaced = {
            let mut inner = self.inner.lock();
            if !old.is_empty() {
                inner.remove_if_same(old, texture);
            }
            let displaced = inner.textures.shift_remove(&new);
            if let Some(displaced) = &displaced {
                inner.memory_usage -= displaced.memory_usage();
            }
            inner.memory_usage += texture.memory_usage();
            inner.textures.insert(new, texture.clone());
            log::debug!("registered texture under {new:?}");

            let limit = inner.cache_limit;
            inner.purge_until(limit);
            displaced
        };
        if let Some(displaced) = displaced {
            if !Arc::ptr_eq(&displaced, texture) {
                displaced.clear_unique_key_if(new);
            }
        }
    }

    pub(crate) fn remove(&self, key: UniqueKey, texture: &Arc<Texture>) {
        self.inner.lock().remove_if_same(key, texture);
    }
}

impl Inner {
    fn remove_if_same(&mut self, key: UniqueKey, texture: &Arc<Texture>) {
        if !self
            .textures
            .get(&key)
            .is_some_and(|cached| Arc::ptr_eq(cached, texture))
        {
            return;
        }
        if let Some(removed) = self.textures.shift_remove(&key) {
            self.memory_usage -= removed.memory_usage();
        }
    }

    fn purge_until(&mut self, limit: usize) -> usize {
        if self.memory_usage <= limit {
            return 0;
        }
        let mut evicted = 0;
        let mut index = 0;
        while self.memory_usage > limit && index < self.textures.len() {
            let unreferenced = self
                .textures
                .get_index(index)
                .is_some_and(|(_, texture)| Arc::strong_count(texture) == 1);
            if !unreferenced {
                index += 1;
                continue;
            }
            if let Some((key, texture)) = self.textures.shift_remove_index(index) {
                log::trace!("evicted texture {key:?}");
                self.memory_usage -= texture.memory_usage();
                evicted += 1;
            }
        }
        evicted
    }
}
