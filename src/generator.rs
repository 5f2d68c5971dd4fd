use crate::{Error, ImageBuffer};

/// Produces decoded pixels on demand.
///
/// Generators back lazily decoded image sources: nothing is decoded until a texture or a
/// decoded copy is actually requested.
pub trait ImageGenerator: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Whether the decoded pixels carry only an alpha channel.
    fn is_alpha_only(&self) -> bool {
        false
    }

    /// Whether decoding may run on a background thread.
    fn async_support(&self) -> bool {
        true
    }

    /// Decodes the image.
    fn make_buffer(&self) -> Result<ImageBuffer, Error>;
}

/// Decodes encoded image bytes (PNG) with the `image` crate.
///
/// Only the header is read up front; pixel data is decoded by [`ImageGenerator::make_buffer`].
/// Decoded pixels are always RGBA.
#[cfg(feature = "decode")]
pub struct EncodedGenerator {
    data: std::sync::Arc<[u8]>,
    width: u32,
    height: u32,
}

#[cfg(feature = "decode")]
impl EncodedGenerator {
    /// Creates a generator from encoded bytes.
    ///
    /// Fails if the format cannot be recognized or the header cannot be read.
    pub fn new(data: impl Into<std::sync::Arc<[u8]>>) -> Result<Self, Error> {
        use image::ImageDecoder;

        let data = data.into();
        let reader = image::ImageReader::new(std::io::Cursor::new(&data[..])).with_guessed_format()?;
        if reader.format().is_none() {
            return Err(Error::UnsupportedFormat);
        }
        let (width, height) = reader.into_decoder()?.dimensions();
        Ok(Self {
            data,
            width,
            height,
        })
    }
}

#[cfg(feature = "decode")]
impl ImageGenerator for EncodedGenerator {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn is_alpha_only(&self) -> bool {
        false
    }

    fn make_buffer(&self) -> Result<ImageBuffer, Error> {
        let rgba = image::load_from_memory(&self.data)?.into_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = bytemuck::cast_slice::<u8, crate::Rgba>(rgba.as_raw()).to_vec();
        ImageBuffer::from_rgba(pixels, width, height)
    }
}
