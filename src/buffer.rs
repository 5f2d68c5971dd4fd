use imgref::{ImgRef, ImgVec};

use crate::Error;

/// 8-bit RGBA pixel.
pub type Rgba = rgb::Rgba<u8>;

/// Pixel types that map directly onto a wgpu texture format.
pub trait HasTextureFormat {
    fn texture_format() -> wgpu::TextureFormat;
}

impl HasTextureFormat for Rgba {
    fn texture_format() -> wgpu::TextureFormat {
        wgpu::TextureFormat::Rgba8UnormSrgb
    }
}

impl HasTextureFormat for u8 {
    fn texture_format() -> wgpu::TextureFormat {
        wgpu::TextureFormat::R8Unorm
    }
}

/// Decoded pixels held in memory, ready for upload.
#[derive(Clone, Debug)]
pub enum ImageBuffer {
    Rgba(ImgVec<Rgba>),
    Alpha(ImgVec<u8>),
}

impl ImageBuffer {
    /// Creates an RGBA buffer.
    ///
    /// Fails if the image is empty or `pixels` does not hold exactly `width * height` pixels.
    pub fn from_rgba(pixels: Vec<Rgba>, width: u32, height: u32) -> Result<Self, Error> {
        check_dimensions(pixels.len(), width, height)?;
        Ok(Self::Rgba(ImgVec::new(pixels, width as usize, height as usize)))
    }

    /// Creates a single channel (alpha only) buffer.
    pub fn from_alpha(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self, Error> {
        check_dimensions(pixels.len(), width, height)?;
        Ok(Self::Alpha(ImgVec::new(pixels, width as usize, height as usize)))
    }

    pub fn width(&self) -> u32 {
        match self {
            Self::Rgba(img) => img.width() as u32,
            Self::Alpha(img) => img.width() as u32,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Rgba(img) => img.height() as u32,
            Self::Alpha(img) => img.height() as u32,
        }
    }

    pub fn size(&self) -> glam::UVec2 {
        glam::UVec2::new(self.width(), self.height())
    }

    pub fn is_alpha_only(&self) -> bool {
        matches!(self, Self::Alpha(_))
    }

    /// The texture format this buffer uploads as.
    pub fn format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba(_) => Rgba::texture_format(),
            Self::Alpha(_) => u8::texture_format(),
        }
    }

    /// Gets the pixels as tightly packed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Rgba(img) => bytemuck::cast_slice(img.buf().as_slice()),
            Self::Alpha(img) => img.buf().as_slice(),
        }
    }

    /// Builds the full mip chain, starting with a copy of this buffer as level 0.
    ///
    /// Each level halves the previous one with a 2x2 box filter, clamping at odd edges.
    pub fn mip_chain(&self) -> Vec<ImageBuffer> {
        let levels = mip_level_count(self.size());
        let mut chain = Vec::with_capacity(levels as usize);
        chain.push(self.clone());
        for _ in 1..levels {
            let next = match chain.last() {
                Some(Self::Rgba(img)) => Self::Rgba(downsample(img.as_ref(), average_rgba)),
                Some(Self::Alpha(img)) => Self::Alpha(downsample(img.as_ref(), average_alpha)),
                None => break,
            };
            chain.push(next);
        }
        chain
    }
}

/// Number of mip levels for a full chain down to 1x1.
pub fn mip_level_count(size: glam::UVec2) -> u32 {
    let largest = size.max_element().max(1);
    u32::BITS - largest.leading_zeros()
}

fn check_dimensions(len: usize, width: u32, height: u32) -> Result<(), Error> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage);
    }
    let expected = width as usize * height as usize;
    if len != expected {
        return Err(Error::PixelCountMismatch {
            expected,
            actual: len,
        });
    }
    Ok(())
}

fn downsample<P: Copy>(src: ImgRef<P>, average: impl Fn([P; 4]) -> P) -> ImgVec<P> {
    let width = (src.width() / 2).max(1);
    let height = (src.height() / 2).max(1);
    let max_x = src.width() - 1;
    let max_y = src.height() - 1;

    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        let (y0, y1) = ((y * 2).min(max_y), (y * 2 + 1).min(max_y));
        for x in 0..width {
            let (x0, x1) = ((x * 2).min(max_x), (x * 2 + 1).min(max_x));
            pixels.push(average([
                src[(x0, y0)],
                src[(x1, y0)],
                src[(x0, y1)],
                src[(x1, y1)],
            ]));
        }
    }
    ImgVec::new(pixels, width, height)
}

fn average_alpha(p: [u8; 4]) -> u8 {
    ((p.iter().map(|&v| v as u16).sum::<u16>() + 2) / 4) as u8
}

fn average_rgba(p: [Rgba; 4]) -> Rgba {
    let channel = |f: fn(&Rgba) -> u8| ((p.iter().map(|c| f(c) as u16).sum::<u16>() + 2) / 4) as u8;
    Rgba::new(
        channel(|c| c.r),
        channel(|c| c.g),
        channel(|c| c.b),
        channel(|c| c.a),
    )
}
