//! Pixel buffers for decoded and composited tiles.
//!
//! A [`TileBuffer`] owns a raw, row-major pixel array in one of the supported
//! [`PixelFormat`]s. Buffers are designed to be recycled through a
//! [`BufferPool`](crate::pool::BufferPool): [`TileBuffer::clear`] keeps the
//! allocation, and [`TileBuffer::decode_from`] refills it in place.

use image::imageops::FilterType;

use super::error::DecodeError;

/// In-memory pixel layout of tile buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel. Preserves source transparency.
    #[default]
    Rgba8,
    /// 8-bit RGB, 3 bytes per pixel. Opaque, 25% smaller.
    Rgb8,
}

impl PixelFormat {
    /// Number of bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// A decoded tile image.
#[derive(Clone, PartialEq, Eq)]
pub struct TileBuffer {
    format: PixelFormat,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TileBuffer {
    /// Create an empty buffer with room for a `size × size` image.
    pub fn with_capacity(format: PixelFormat, size: u32) -> Self {
        let capacity = size as usize * size as usize * format.bytes_per_pixel();
        Self {
            format,
            width: 0,
            height: 0,
            pixels: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer from raw pixels.
    ///
    /// Returns `None` if `pixels` does not hold exactly `width × height`
    /// pixels of the given format.
    pub fn from_raw(format: PixelFormat, width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        (pixels.len() == expected).then_some(Self {
            format,
            width,
            height,
            pixels,
        })
    }

    /// Create a buffer filled with a single color.
    ///
    /// For [`PixelFormat::Rgb8`] the alpha component is ignored.
    pub fn filled(format: PixelFormat, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let bpp = format.bytes_per_pixel();
        let pixel = &rgba[..bpp];
        let mut pixels = Vec::with_capacity(width as usize * height as usize * bpp);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(pixel);
        }
        Self {
            format,
            width,
            height,
            pixels,
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw row-major pixel data.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns true if the buffer currently holds no image.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Allocated size in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.pixels.capacity()
    }

    /// Forget the current image while keeping the allocation.
    pub fn clear(&mut self) {
        self.width = 0;
        self.height = 0;
        self.pixels.clear();
    }

    /// Returns the pixel at `(x, y)` as RGBA. Opaque for RGB buffers.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        let p = &self.pixels[offset..offset + bpp];
        Some(match self.format {
            PixelFormat::Rgba8 => [p[0], p[1], p[2], p[3]],
            PixelFormat::Rgb8 => [p[0], p[1], p[2], 255],
        })
    }

    /// Decode encoded image bytes into this buffer, reusing its allocation.
    ///
    /// The image is downsampled by `2^sub_sample` and must then fit within
    /// `max_size × max_size`. Smaller images (edge tiles) are accepted as-is.
    pub fn decode_from(
        &mut self,
        bytes: &[u8],
        sub_sample: u8,
        max_size: u32,
    ) -> Result<(), DecodeError> {
        self.clear();

        let mut image = image::load_from_memory(bytes)?;
        if sub_sample > 0 {
            let width = image.width().checked_shr(sub_sample as u32).unwrap_or(0).max(1);
            let height = image.height().checked_shr(sub_sample as u32).unwrap_or(0).max(1);
            image = image.resize_exact(width, height, FilterType::Triangle);
        }

        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 || width > max_size || height > max_size {
            return Err(DecodeError::Dimensions {
                width,
                height,
                max: max_size,
            });
        }

        match self.format {
            PixelFormat::Rgba8 => self.pixels.extend_from_slice(image.to_rgba8().as_raw()),
            PixelFormat::Rgb8 => self.pixels.extend_from_slice(image.to_rgb8().as_raw()),
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Draw `source` over this buffer at the origin, weighted by `alpha`.
    ///
    /// Only the overlapping area is touched. For RGBA sources the effective
    /// weight of each pixel is `alpha × source_alpha`.
    pub fn blend_from(&mut self, source: &TileBuffer, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha == 0.0 || self.is_empty() || source.is_empty() {
            return;
        }

        let width = self.width.min(source.width) as usize;
        let height = self.height.min(source.height) as usize;
        let dst_bpp = self.format.bytes_per_pixel();
        let src_bpp = source.format.bytes_per_pixel();
        let dst_stride = self.width as usize * dst_bpp;
        let src_stride = source.width as usize * src_bpp;

        for y in 0..height {
            let dst_row = &mut self.pixels[y * dst_stride..y * dst_stride + width * dst_bpp];
            let src_row = &source.pixels[y * src_stride..y * src_stride + width * src_bpp];

            for (dst, src) in dst_row
                .chunks_exact_mut(dst_bpp)
                .zip(src_row.chunks_exact(src_bpp))
            {
                let src_alpha = if src_bpp == 4 { src[3] as f32 / 255.0 } else { 1.0 };
                let weight = alpha * src_alpha;
                if weight <= 0.0 {
                    continue;
                }
                for channel in 0..3 {
                    dst[channel] = mix(dst[channel], src[channel], weight);
                }
                if dst_bpp == 4 {
                    dst[3] = mix(dst[3], 255, weight);
                }
            }
        }
    }
}

fn mix(dst: u8, src: u8, weight: f32) -> u8 {
    (src as f32 * weight + dst as f32 * (1.0 - weight))
        .round()
        .clamp(0.0, 255.0) as u8
}

impl std::fmt::Debug for TileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileBuffer")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
