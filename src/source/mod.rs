//! Image sources: the backing data of an image and its path onto the GPU.
//!
//! An [`ImageSource`] is one of three kinds:
//!
//! - encoded, backed by an [`ImageGenerator`] and decoded on demand;
//! - buffered, backed by decoded pixels in memory;
//! - texture backed, wrapping a texture that already lives on the GPU.
//!
//! All three share one caching contract: a source's [`UniqueKey`] names its texture in the
//! [`ProxyProvider`](crate::ProxyProvider) and the [`ResourceCache`](crate::ResourceCache) of a
//! [`Context`], so sources with the same key never produce more than one texture per context.

use std::sync::{Arc, Weak};

use crate::{Context, ImageBuffer, ImageGenerator, SurfaceFlags, Texture, TextureProxy, UniqueKey};

mod buffer;
mod encoded;
mod texture;

use buffer::BufferSource;
use encoded::EncodedSource;
use texture::TextureSource;

/// Behaviour that differs between the kinds of source.
trait SourceImpl {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn is_alpha_only(&self) -> bool;

    fn has_mipmaps(&self) -> bool;

    fn is_lazy_generated(&self) -> bool {
        false
    }

    fn is_texture_backed(&self) -> bool {
        false
    }

    fn on_make_texture_proxy(
        &self,
        context: &Context,
        flags: SurfaceFlags,
    ) -> Option<Arc<TextureProxy>>;

    fn on_make_decoded(
        &self,
        _key: UniqueKey,
        _context: Option<&Context>,
    ) -> Option<Arc<ImageSource>> {
        None
    }

    fn on_make_mipmapped(&self) -> Option<Arc<ImageSource>>;
}

enum SourceKind {
    Encoded(EncodedSource),
    Buffer(BufferSource),
    Texture(TextureSource),
}

/// The backing store of an image.
///
/// Sources are only ever handed out as `Arc<ImageSource>`. Each one keeps a weak reference to
/// its own allocation, so operations that leave the source unchanged can return it as a shared
/// handle without the source owning itself.
pub struct ImageSource {
    unique_key: UniqueKey,
    weak_this: Weak<ImageSource>,
    kind: SourceKind,
}

impl ImageSource {
    fn new(unique_key: UniqueKey, kind: SourceKind) -> Arc<Self> {
        Arc::new_cyclic(|weak_this| Self {
            unique_key,
            weak_this: weak_this.clone(),
            kind,
        })
    }

    /// Creates a source that decodes `generator` on demand.
    ///
    /// Returns [`None`] if there is no generator.
    pub fn make_from_generator(
        unique_key: UniqueKey,
        generator: Option<Arc<dyn ImageGenerator>>,
    ) -> Option<Arc<Self>> {
        let generator = generator?;
        Some(Self::new(
            unique_key,
            SourceKind::Encoded(EncodedSource::new(generator, false)),
        ))
    }

    /// Creates a source backed by decoded pixels.
    ///
    /// Returns [`None`] if there is no buffer.
    pub fn make_from_buffer(
        unique_key: UniqueKey,
        buffer: Option<Arc<ImageBuffer>>,
    ) -> Option<Arc<Self>> {
        let buffer = buffer?;
        Some(Self::new(
            unique_key,
            SourceKind::Buffer(BufferSource::new(buffer, false)),
        ))
    }

    /// Creates a source wrapping a GPU texture.
    ///
    /// The texture takes on `unique_key` as well, so the texture and the source share identity
    /// from here on. Returns [`None`] if there is no texture.
    pub fn make_from_texture(
        unique_key: UniqueKey,
        texture: Option<Arc<Texture>>,
    ) -> Option<Arc<Self>> {
        let texture = texture?;
        texture.assign_unique_key(unique_key);
        Some(Self::new(
            unique_key,
            SourceKind::Texture(TextureSource::new(texture)),
        ))
    }

    fn imp(&self) -> &dyn SourceImpl {
        match &self.kind {
            SourceKind::Encoded(source) => source,
            SourceKind::Buffer(source) => source,
            SourceKind::Texture(source) => source,
        }
    }

    /// Gets a shared handle to this source.
    pub fn shared(&self) -> Arc<Self> {
        self.weak_this
            .upgrade()
            .expect("image sources only exist inside an Arc")
    }

    /// Gets the weak reference this source holds to itself.
    pub fn weak_this(&self) -> Weak<Self> {
        self.weak_this.clone()
    }

    pub fn unique_key(&self) -> UniqueKey {
        self.unique_key
    }

    pub fn width(&self) -> u32 {
        self.imp().width()
    }

    pub fn height(&self) -> u32 {
        self.imp().height()
    }

    pub fn size(&self) -> glam::UVec2 {
        glam::UVec2::new(self.width(), self.height())
    }

    pub fn is_alpha_only(&self) -> bool {
        self.imp().is_alpha_only()
    }

    pub fn has_mipmaps(&self) -> bool {
        self.imp().has_mipmaps()
    }

    /// Returns true if pixels still have to be decoded before upload.
    pub fn is_lazy_generated(&self) -> bool {
        self.imp().is_lazy_generated()
    }

    pub fn is_texture_backed(&self) -> bool {
        self.imp().is_texture_backed()
    }

    /// Gets the wrapped texture of a texture backed source.
    pub fn texture(&self) -> Option<&Arc<Texture>> {
        match &self.kind {
            SourceKind::Texture(source) => Some(source.texture()),
            _ => None,
        }
    }

    /// Produces a texture backed source for this image, reusing the texture cached under this
    /// source's key if there is one.
    ///
    /// Anything that has to be decoded or uploaded is done before this returns.
    pub fn make_texture_source(&self, context: &Context) -> Option<Arc<Self>> {
        if let Some(texture) = context
            .resource_cache()
            .find_unique_resource(self.unique_key)
        {
            return Self::make_from_texture(self.unique_key, Some(texture));
        }
        let proxy = self.lock_texture_proxy(Some(context), SurfaceFlags::DISABLE_ASYNC_TASK)?;
        if !proxy.is_instantiated() {
            proxy.instantiate();
        }
        Self::make_from_texture(self.unique_key, proxy.get_texture())
    }

    /// Gets a proxy for this image's texture without forcing it to be allocated.
    ///
    /// A proxy already registered under this source's key is returned as is. Otherwise a new
    /// proxy is made and registered. The new proxy writes the key onto its texture unless
    /// `flags` contains [`SurfaceFlags::DISABLE_CACHE`] or this source is texture backed.
    ///
    /// Returns [`None`] without a context, or if no proxy could be made.
    pub fn lock_texture_proxy(
        &self,
        context: Option<&Context>,
        flags: SurfaceFlags,
    ) -> Option<Arc<TextureProxy>> {
        let context = context?;
        let provider = context.proxy_provider();
        if let Some(proxy) = provider.find_proxy_by_unique_key(self.unique_key) {
            return Some(proxy);
        }
        let proxy = self.imp().on_make_texture_proxy(context, flags)?;
        let update_texture_key =
            !flags.contains(SurfaceFlags::DISABLE_CACHE) && !self.is_texture_backed();
        proxy.assign_unique_key(self.unique_key, update_texture_key);
        Some(proxy)
    }

    /// Gets a source whose pixels are already decoded.
    ///
    /// Sources that are not lazily generated return themselves. If decoding fails, or the context
    /// already has a texture for this image, the source is returned unchanged as well.
    pub fn make_decoded(&self, context: Option<&Context>) -> Arc<Self> {
        if !self.is_lazy_generated() {
            return self.shared();
        }
        self.imp()
            .on_make_decoded(self.unique_key, context)
            .unwrap_or_else(|| self.shared())
    }

    /// Gets a source that uploads with a full mip chain.
    ///
    /// Sources that already have mipmaps, or cannot gain them, return themselves.
    pub fn make_mipmapped(&self) -> Arc<Self> {
        if self.has_mipmaps() {
            return self.shared();
        }
        self.imp()
            .on_make_mipmapped()
            .unwrap_or_else(|| self.shared())
    }
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            SourceKind::Encoded(_) => "Encoded",
            SourceKind::Buffer(_) => "Buffer",
            SourceKind::Texture(_) => "Texture",
        };
        f.debug_struct("ImageSource")
            .field("kind", &kind)
            .field("unique_key", &self.unique_key)
            .field("size", &self.size())
            .field("mipmaps", &self.has_mipmaps())
            .finish()
    }
}
