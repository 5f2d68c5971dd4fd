use std::sync::Arc;

use super::{ImageSource, SourceImpl, SourceKind};
use crate::{Context, ImageBuffer, SurfaceFlags, TextureProxy, UniqueKey};

/// Source backed by decoded pixels.
pub(super) struct BufferSource {
    buffer: Arc<ImageBuffer>,
    mipmapped: bool,
}

impl BufferSource {
    pub(super) fn new(buffer: Arc<ImageBuffer>, mipmapped: bool) -> Self {
        Self { buffer, mipmapped }
    }
}

impl SourceImpl for BufferSource {
    fn width(&self) -> u32 {
        self.buffer.width()
    }

    fn height(&self) -> u32 {
        self.buffer.height()
    }

    fn is_alpha_only(&self) -> bool {
        self.buffer.is_alpha_only()
    }

    fn has_mipmaps(&self) -> bool {
        self.mipmapped
    }

    fn on_make_texture_proxy(
        &self,
        context: &Context,
        _flags: SurfaceFlags,
    ) -> Option<Arc<TextureProxy>> {
        context
            .proxy_provider()
            .create_texture_proxy_from_buffer(self.buffer.clone(), self.mipmapped)
    }

    fn on_make_mipmapped(&self) -> Option<Arc<ImageSource>> {
        Some(ImageSource::new(
            UniqueKey::new(),
            SourceKind::Buffer(Self::new(self.buffer.clone(), true)),
        ))
    }
}
