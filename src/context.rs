use std::sync::Arc;

use crate::device::{Device, HeadlessDevice};
use crate::{ProxyProvider, ResourceCache};

/// Configures a [`Context`].
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    /// Memory budget of the resource cache, in bytes.
    pub cache_limit: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            cache_limit: 256 * 1024 * 1024,
        }
    }
}

/// Encapsulates a device together with the texture cache and proxy registry built on it.
///
/// Image sources share textures only within one context.
pub struct Context {
    device: Arc<dyn Device>,
    resource_cache: Arc<ResourceCache>,
    proxy_provider: Arc<ProxyProvider>,
}

impl Context {
    /// Creates a new context.
    pub fn new(device: impl Device + 'static, options: ContextOptions) -> Self {
        Self::with_device(Arc::new(device), options)
    }

    /// Creates a new context on a shared device.
    pub fn with_device(device: Arc<dyn Device>, options: ContextOptions) -> Self {
        let resource_cache = Arc::new(ResourceCache::new(options.cache_limit));
        let proxy_provider = ProxyProvider::new(device.clone(), &resource_cache);
        Self {
            device,
            resource_cache,
            proxy_provider,
        }
    }

    /// Creates a context on a [`HeadlessDevice`] with default options.
    pub fn headless() -> Self {
        Self::new(HeadlessDevice::new(), ContextOptions::default())
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn resource_cache(&self) -> &Arc<ResourceCache> {
        &self.resource_cache
    }

    pub fn proxy_provider(&self) -> &Arc<ProxyProvider> {
        &self.proxy_provider
    }

    /// Releases proxies nothing references anymore, then trims the cache to its limit.
    pub fn purge_resources(&self) {
        let proxies = self.proxy_provider.purge_unreferenced();
        let textures = self.resource_cache.purge_to_limit();
        log::debug!("purged {proxies} proxies and {textures} textures");
    }
}
