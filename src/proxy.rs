use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::decode::DecodePool;
use crate::device::Device;
use crate::{Error, ImageBuffer, ImageGenerator, ResourceCache, Texture, UniqueKey};

type ProxyTask = Box<dyn FnOnce() -> Result<Arc<Texture>, Error> + Send>;

enum ProxyState {
    Pending(ProxyTask),
    Instantiated(Arc<Texture>),
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
struct KeyBinding {
    key: UniqueKey,
    update_texture_key: bool,
}

/// Stands in for a texture that may not have been allocated yet.
///
/// The texture is produced the first time [`TextureProxy::instantiate`] is called.
pub struct TextureProxy {
    size: glam::UVec2,
    mipmapped: bool,
    binding: Mutex<KeyBinding>,
    state: Mutex<ProxyState>,
    provider: Weak<ProxyProvider>,
}

impl TextureProxy {
    fn new(
        provider: Weak<ProxyProvider>,
        size: glam::UVec2,
        mipmapped: bool,
        state: ProxyState,
    ) -> Arc<Self> {
        Arc::new(Self {
            size,
            mipmapped,
            binding: Mutex::new(KeyBinding::default()),
            state: Mutex::new(state),
            provider,
        })
    }

    pub fn size(&self) -> glam::UVec2 {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }

    pub fn is_mipmapped(&self) -> bool {
        self.mipmapped
    }

    pub fn is_instantiated(&self) -> bool {
        matches!(*self.state.lock(), ProxyState::Instantiated(_))
    }

    /// Produces the backing texture if that has not happened yet.
    ///
    /// Returns false if the texture could not be produced. A proxy that failed once stays failed
    /// and gives up its key, so the next request for that key makes a new proxy.
    pub fn instantiate(&self) -> bool {
        let texture = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, ProxyState::Failed) {
                ProxyState::Instantiated(texture) => {
                    *state = ProxyState::Instantiated(texture);
                    return true;
                }
                ProxyState::Failed => return false,
                ProxyState::Pending(task) => match task() {
                    Ok(texture) => {
                        *state = ProxyState::Instantiated(texture.clone());
                        Some(texture)
                    }
                    Err(err) => {
                        log::warn!("failed to instantiate texture proxy: {err}");
                        None
                    }
                },
            }
        };
        let Some(texture) = texture else {
            self.unregister();
            return false;
        };

        let binding = *self.binding.lock();
        if binding.update_texture_key && !binding.key.is_empty() {
            texture.assign_unique_key(binding.key);
        }
        true
    }

    /// Gets the backing texture, if instantiated.
    pub fn get_texture(&self) -> Option<Arc<Texture>> {
        match &*self.state.lock() {
            ProxyState::Instantiated(texture) => Some(texture.clone()),
            _ => None,
        }
    }

    pub fn unique_key(&self) -> UniqueKey {
        self.binding.lock().key
    }

    /// Registers this proxy in its provider under `key`.
    ///
    /// If `update_texture_key` is set, the backing texture receives the key as well: right away if
    /// the proxy is instantiated, otherwise as soon as it is. Assigning the empty key is the same
    /// as [`TextureProxy::remove_unique_key`].
    pub fn assign_unique_key(self: &Arc<Self>, key: UniqueKey, update_texture_key: bool) {
        if key.is_empty() {
            self.remove_unique_key();
            return;
        }
        let old = std::mem::replace(
            &mut *self.binding.lock(),
            KeyBinding {
                key,
                update_texture_key,
            },
        );
        if let Some(provider) = self.provider.upgrade() {
            provider.change_proxy_key(self, old.key, key);
        }
        if update_texture_key {
            if let Some(texture) = self.get_texture() {
                texture.assign_unique_key(key);
            }
        }
    }

    fn unregister(&self) {
        let old = std::mem::take(&mut *self.binding.lock());
        if old.key.is_empty() {
            return;
        }
        if let Some(provider) = self.provider.upgrade() {
            provider.remove_if_same(old.key, self);
        }
    }

    /// Drops this proxy's key and its provider registration.
    ///
    /// The backing texture keeps whatever key it already has.
    pub fn remove_unique_key(self: &Arc<Self>) {
        self.unregister();
    }
}

/// Registry of [`TextureProxy`]s by [`UniqueKey`] for one context.
pub struct ProxyProvider {
    weak_this: Weak<ProxyProvider>,
    device: Arc<dyn Device>,
    resource_cache: Weak<ResourceCache>,
    proxies: Mutex<HashMap<UniqueKey, Arc<TextureProxy>>>,
    decode_pool: DecodePool,
}

impl ProxyProvider {
    pub(crate) fn new(device: Arc<dyn Device>, resource_cache: &Arc<ResourceCache>) -> Arc<Self> {
        Arc::new_cyclic(|weak_this| Self {
            weak_this: weak_this.clone(),
            device,
            resource_cache: Arc::downgrade(resource_cache),
            proxies: Mutex::new(HashMap::new()),
            decode_pool: DecodePool::new(),
        })
    }

    pub fn find_proxy_by_unique_key(&self, key: UniqueKey) -> Option<Arc<TextureProxy>> {
        if key.is_empty() {
            return None;
        }
        let proxy = self.proxies.lock().get(&key).cloned();
        if proxy.is_some() {
            log::debug!("found texture proxy for {key:?}");
        }
        proxy
    }

    /// Creates a proxy that uploads `buffer` when instantiated.
    ///
    /// Returns [`None`] if the buffer is too large for the device.
    pub fn create_texture_proxy_from_buffer(
        &self,
        buffer: Arc<ImageBuffer>,
        mipmapped: bool,
    ) -> Option<Arc<TextureProxy>> {
        let size = buffer.size();
        if !self.fits_device(size) {
            return None;
        }
        let device = self.device.clone();
        let resource_cache = self.resource_cache.clone();
        let task: ProxyTask = Box::new(move || {
            Texture::upload(device.as_ref(), &resource_cache, &buffer, mipmapped)
        });
        Some(TextureProxy::new(
            self.weak_this.clone(),
            size,
            mipmapped,
            ProxyState::Pending(task),
        ))
    }

    /// Creates a proxy that decodes `generator` and uploads the result when instantiated.
    ///
    /// Unless `disable_async_task` is set, generators that support it are queued right away on the
    /// provider's decoder threads; instantiation then waits for the result.
    pub fn create_texture_proxy_from_generator(
        &self,
        generator: Arc<dyn ImageGenerator>,
        mipmapped: bool,
        disable_async_task: bool,
    ) -> Option<Arc<TextureProxy>> {
        let size = glam::UVec2::new(generator.width(), generator.height());
        if size.x == 0 || size.y == 0 || !self.fits_device(size) {
            return None;
        }
        let device = self.device.clone();
        let resource_cache = self.resource_cache.clone();
        let task: ProxyTask = if !disable_async_task && generator.async_support() {
            let decoding = self.decode_pool.submit(generator);
            Box::new(move || {
                let buffer = decoding.wait()?;
                Texture::upload(device.as_ref(), &resource_cache, &buffer, mipmapped)
            })
        } else {
            Box::new(move || {
                let buffer = generator.make_buffer()?;
                Texture::upload(device.as_ref(), &resource_cache, &buffer, mipmapped)
            })
        };
        Some(TextureProxy::new(
            self.weak_this.clone(),
            size,
            mipmapped,
            ProxyState::Pending(task),
        ))
    }

    /// Creates an already instantiated proxy for an existing texture.
    pub fn wrap_texture(&self, texture: Arc<Texture>) -> Arc<TextureProxy> {
        TextureProxy::new(
            self.weak_this.clone(),
            texture.size(),
            texture.has_mipmaps(),
            ProxyState::Instantiated(texture),
        )
    }

    /// Unregisters the proxy under `key`, returning it.
    pub fn remove_proxy(&self, key: UniqueKey) -> Option<Arc<TextureProxy>> {
        let proxy = self.proxies.lock().remove(&key)?;
        proxy.binding.lock().key = UniqueKey::EMPTY;
        Some(proxy)
    }

    /// Unregisters every proxy nothing outside the provider references.
    pub fn purge_unreferenced(&self) -> usize {
        let mut proxies = self.proxies.lock();
        let before = proxies.len();
        proxies.retain(|_, proxy| Arc::strong_count(proxy) > 1);
        before - proxies.len()
    }

    pub fn len(&self) -> usize {
        self.proxies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.lock().is_empty()
    }

    /// Number of background decoder threads this provider runs.
    pub fn decode_thread_count(&self) -> usize {
        self.decode_pool.thread_count()
    }

    fn fits_device(&self, size: glam::UVec2) -> bool {
        let max = self.device.max_texture_dimension();
        if size.x > max || size.y > max {
            log::debug!("texture proxy of {size} exceeds device limit {max}");
            return false;
        }
        true
    }

    fn change_proxy_key(&self, proxy: &Arc<TextureProxy>, old: UniqueKey, new: UniqueKey) {
        let displaced = {
            let mut proxies = self.proxies.lock();
            if !old.is_empty()
                && proxies
                    .get(&old)
                    .is_some_and(|registered| Arc::ptr_eq(registered, proxy))
            {
                proxies.remove(&old);
            }
            proxies.insert(new, proxy.clone())
        };
        log::debug!("registered texture proxy under {new:?}");
        if let Some(displaced) = displaced {
            if !Arc::ptr_eq(&displaced, proxy) {
                let mut binding = displaced.binding.lock();
                if binding.key == new {
                    *binding = KeyBinding::default();
                }
            }
        }
    }

    fn remove_if_same(&self, key: UniqueKey, proxy: &TextureProxy) {
        let mut proxies = self.proxies.lock();
        if proxies
            .get(&key)
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), proxy))
        {
            proxies.remove(&key);
        }
    }
}
