use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use wgpu::util::DeviceExt;

use crate::{Error, ImageBuffer};

/// Backend storage of a [`Texture`](crate::Texture).
#[derive(Debug)]
pub enum RawTexture {
    Wgpu(wgpu::Texture),
    /// A texture with no GPU storage, made by [`HeadlessDevice`].
    Headless,
}

/// Allocates GPU textures.
pub trait Device: Send + Sync {
    /// Creates a texture and uploads `buffer` into it.
    ///
    /// If `mipmapped` is set, the full mip chain is allocated and uploaded as well.
    fn create_texture(&self, buffer: &ImageBuffer, mipmapped: bool) -> Result<RawTexture, Error>;

    /// Largest width or height a texture may have.
    fn max_texture_dimension(&self) -> u32;
}

/// A [`Device`] that uploads through wgpu.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl Device for WgpuDevice {
    fn create_texture(&self, buffer: &ImageBuffer, mipmapped: bool) -> Result<RawTexture, Error> {
        check_size(buffer, self.max_texture_dimension())?;

        let (mip_level_count, data) = if mipmapped {
            let chain = buffer.mip_chain();
            let data: Vec<u8> = chain
                .iter()
                .flat_map(|level| level.as_bytes().iter().copied())
                .collect();
            (chain.len() as u32, std::borrow::Cow::Owned(data))
        } else {
            (1, std::borrow::Cow::Borrowed(buffer.as_bytes()))
        };

        Ok(RawTexture::Wgpu(self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some("texsource: ImageSource"),
                size: wgpu::Extent3d {
                    width: buffer.width(),
                    height: buffer.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: buffer.format(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        )))
    }

    fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

/// A [`Device`] with no GPU behind it.
///
/// Textures it creates carry their size and format but no storage. Useful for tests and for
/// exercising caching logic offscreen.
#[derive(Default)]
pub struct HeadlessDevice {
    allocations: AtomicUsize,
    fail_allocations: AtomicBool,
}

impl HeadlessDevice {
    /// Same limit wgpu's downlevel defaults use.
    pub const MAX_TEXTURE_DIMENSION: u32 = 2048;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures created so far.
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Makes every following allocation fail with [`Error::DeviceLost`].
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::Relaxed);
    }
}

impl Device for HeadlessDevice {
    fn create_texture(&self, buffer: &ImageBuffer, _mipmapped: bool) -> Result<RawTexture, Error> {
        if self.fail_allocations.load(Ordering::Relaxed) {
            return Err(Error::DeviceLost);
        }
        check_size(buffer, self.max_texture_dimension())?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(RawTexture::Headless)
    }

    fn max_texture_dimension(&self) -> u32 {
        Self::MAX_TEXTURE_DIMENSION
    }
}

fn check_size(buffer: &ImageBuffer, max: u32) -> Result<(), Error> {
    if buffer.width() > max || buffer.height() > max {
        return Err(Error::TextureTooLarge {
            width: buffer.width(),
            height: buffer.height(),
            max,
        });
    }
    Ok(())
}
