use std::sync::Arc;

use super::{ImageSource, SourceImpl};
use crate::{Context, SurfaceFlags, Texture, TextureProxy};

/// Source wrapping a texture that is already on the GPU.
pub(super) struct TextureSource {
    texture: Arc<Texture>,
}

impl TextureSource {
    pub(super) fn new(texture: Arc<Texture>) -> Self {
        Self { texture }
    }

    pub(super) fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }
}

impl SourceImpl for TextureSource {
    fn width(&self) -> u32 {
        self.texture.width()
    }

    fn height(&self) -> u32 {
        self.texture.height()
    }

    fn is_alpha_only(&self) -> bool {
        self.texture.is_alpha_only()
    }

    fn has_mipmaps(&self) -> bool {
        self.texture.has_mipmaps()
    }

    fn is_texture_backed(&self) -> bool {
        true
    }

    fn on_make_texture_proxy(
        &self,
        context: &Context,
        _flags: SurfaceFlags,
    ) -> Option<Arc<TextureProxy>> {
        Some(context.proxy_provider().wrap_texture(self.texture.clone()))
    }

    // Mip levels cannot be added to a texture that is already allocated.
    fn on_make_mipmapped(&self) -> Option<Arc<ImageSource>> {
        None
    }
}
