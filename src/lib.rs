//! texsource turns images into wgpu textures lazily, and only once per context.
//!
//! Wrap your image data in an [`ImageSource`]: encoded bytes behind an [`ImageGenerator`],
//! decoded pixels in an [`ImageBuffer`], or a [`Texture`] that is already on the GPU. Ask the
//! source for a [`TextureProxy`] or a texture backed source when you need one. Sources that
//! share a [`UniqueKey`] share a single texture within a [`Context`].

mod buffer;
mod cache;
mod context;
mod decode;
mod device;
mod flags;
mod generator;
mod key;
mod proxy;
mod source;
mod texture;

pub use buffer::{mip_level_count, HasTextureFormat, ImageBuffer, Rgba};
pub use cache::ResourceCache;
pub use context::{Context, ContextOptions};
pub use device::{Device, HeadlessDevice, RawTexture, WgpuDevice};
pub use flags::SurfaceFlags;
#[cfg(feature = "decode")]
pub use generator::EncodedGenerator;
pub use generator::ImageGenerator;
pub use key::UniqueKey;
pub use proxy::{ProxyProvider, TextureProxy};
pub use source::ImageSource;
pub use texture::Texture;

/// Errors that can occur.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Image data could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The image format was not recognized.
    #[error("unsupported image format")]
    UnsupportedFormat,

    /// The image has no pixels.
    #[error("image is empty")]
    EmptyImage,

    /// Pixel data does not match the image dimensions.
    #[error("expected {expected} pixels, got {actual}")]
    PixelCountMismatch { expected: usize, actual: usize },

    /// The texture exceeds the device's size limit.
    #[error("texture of {width}x{height} exceeds the maximum dimension of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    /// The device can no longer allocate textures.
    #[error("device lost")]
    DeviceLost,

    /// Image data could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "decode")]
impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Decode(err.to_string())
    }
}
