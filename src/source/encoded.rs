use std::sync::Arc;

use super::{BufferSource, ImageSource, SourceImpl, SourceKind};
use crate::{Context, ImageGenerator, SurfaceFlags, TextureProxy, UniqueKey};

/// Lazily decoded source.
pub(super) struct EncodedSource {
    generator: Arc<dyn ImageGenerator>,
    mipmapped: bool,
}

impl EncodedSource {
    pub(super) fn new(generator: Arc<dyn ImageGenerator>, mipmapped: bool) -> Self {
        Self {
            generator,
            mipmapped,
        }
    }
}

impl SourceImpl for EncodedSource {
    fn width(&self) -> u32 {
        self.generator.width()
    }

    fn height(&self) -> u32 {
        self.generator.height()
    }

    fn is_alpha_only(&self) -> bool {
        self.generator.is_alpha_only()
    }

    fn has_mipmaps(&self) -> bool {
        self.mipmapped
    }

    fn is_lazy_generated(&self) -> bool {
        true
    }

    fn on_make_texture_proxy(
        &self,
        context: &Context,
        flags: SurfaceFlags,
    ) -> Option<Arc<TextureProxy>> {
        context.proxy_provider().create_texture_proxy_from_generator(
            self.generator.clone(),
            self.mipmapped,
            flags.contains(SurfaceFlags::DISABLE_ASYNC_TASK),
        )
    }

    fn on_make_decoded(
        &self,
        key: UniqueKey,
        context: Option<&Context>,
    ) -> Option<Arc<ImageSource>> {
        // Already on the GPU, a decoded copy would go unused.
        if let Some(context) = context {
            if context.proxy_provider().find_proxy_by_unique_key(key).is_some()
                || context.resource_cache().has_unique_resource(key)
            {
                return None;
            }
        }
        let buffer = self.generator.make_buffer().ok()?;
        Some(ImageSource::new(
            key,
            SourceKind::Buffer(BufferSource::new(Arc::new(buffer), self.mipmapped)),
        ))
    }

    fn on_make_mipmapped(&self) -> Option<Arc<ImageSource>> {
        Some(ImageSource::new(
            UniqueKey::new(),
            SourceKind::Encoded(Self::new(self.generator.clone(), true)),
        ))
    }
}
