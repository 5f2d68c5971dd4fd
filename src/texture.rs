use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::device::{Device, RawTexture};
use crate::{Context, Error, ImageBuffer, ResourceCache, UniqueKey};

/// A GPU-resident texture.
///
/// Textures may carry a [`UniqueKey`]. While they do, the [`ResourceCache`] of the context that
/// made them can find them by that key.
pub struct Texture {
    raw: RawTexture,
    size: glam::UVec2,
    format: wgpu::TextureFormat,
    mip_level_count: u32,
    unique_key: Mutex<UniqueKey>,
    cache: Weak<ResourceCache>,
}

impl Texture {
    /// Uploads a buffer through the context's device.
    pub fn from_buffer(
        context: &Context,
        buffer: &ImageBuffer,
        mipmapped: bool,
    ) -> Result<Arc<Self>, Error> {
        Self::upload(
            context.device().as_ref(),
            &Arc::downgrade(context.resource_cache()),
            buffer,
            mipmapped,
        )
    }

    /// Adopts a texture that was created directly with wgpu.
    pub fn wrap(context: &Context, texture: wgpu::Texture) -> Arc<Self> {
        Arc::new(Self {
            size: glam::UVec2::new(texture.width(), texture.height()),
            format: texture.format(),
            mip_level_count: texture.mip_level_count(),
            raw: RawTexture::Wgpu(texture),
            unique_key: Mutex::new(UniqueKey::EMPTY),
            cache: Arc::downgrade(context.resource_cache()),
        })
    }

    pub(crate) fn upload(
        device: &dyn Device,
        cache: &Weak<ResourceCache>,
        buffer: &ImageBuffer,
        mipmapped: bool,
    ) -> Result<Arc<Self>, Error> {
        let raw = device.create_texture(buffer, mipmapped)?;
        let mip_level_count = if mipmapped {
            crate::buffer::mip_level_count(buffer.size())
        } else {
            1
        };
        Ok(Arc::new(Self {
            raw,
            size: buffer.size(),
            format: buffer.format(),
            mip_level_count,
            unique_key: Mutex::new(UniqueKey::EMPTY),
            cache: cache.clone(),
        }))
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

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    pub fn has_mipmaps(&self) -> bool {
        self.mip_level_count > 1
    }

    pub fn is_alpha_only(&self) -> bool {
        self.format == wgpu::TextureFormat::R8Unorm
    }

    pub fn raw(&self) -> &RawTexture {
        &self.raw
    }

    /// Gets the wgpu texture.
    ///
    /// Returns [`None`] for headless textures.
    pub fn wgpu_texture(&self) -> Option<&wgpu::Texture> {
        match &self.raw {
            RawTexture::Wgpu(texture) => Some(texture),
            RawTexture::Headless => None,
        }
    }

    /// Approximate GPU memory held by this texture, in bytes.
    pub fn memory_usage(&self) -> usize {
        let bytes_per_pixel = self.format.block_copy_size(None).unwrap_or(4) as usize;
        let base = self.size.x as usize * self.size.y as usize * bytes_per_pixel;
        if self.has_mipmaps() {
            base * 4 / 3
        } else {
            base
        }
    }

    pub fn unique_key(&self) -> UniqueKey {
        *self.unique_key.lock()
    }

    /// Gives this texture a key and registers it in its resource cache under that key.
    ///
    /// Any other texture registered under the same key loses it. Assigning the empty key is the
    /// same as [`Texture::remove_unique_key`].
    pub fn assign_unique_key(self: &Arc<Self>, key: UniqueKey) {
        if key.is_empty() {
            self.remove_unique_key();
            return;
        }
        let old = std::mem::replace(&mut *self.unique_key.lock(), key);
        if old == key {
            return;
        }
        if let Some(cache) = self.cache.upgrade() {
            cache.change_unique_key(self, old, key);
        }
    }

    /// Drops this texture's key and its resource cache registration.
    pub fn remove_unique_key(self: &Arc<Self>) {
        let old = std::mem::replace(&mut *self.unique_key.lock(), UniqueKey::EMPTY);
        if old.is_empty() {
            return;
        }
        if let Some(cache) = self.cache.upgrade() {
            cache.remove(old, self);
        }
    }

    pub(crate) fn clear_unique_key_if(&self, key: UniqueKey) {
        let mut unique_key = self.unique_key.lock();
        if *unique_key == key {
            *unique_key = UniqueKey::EMPTY;
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("mip_level_count", &self.mip_level_count)
            .field("unique_key", &self.unique_key())
            .finish()
    }
}
