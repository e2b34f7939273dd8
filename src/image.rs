// image.rs — device-resident images and host/device transfer.
//
// RESPONSIBILITIES
// ─────────────────
// 1. `SourceImage` — the decoded input, resident on the GPU as a
//    read-only RGBA8 texture. Created once from host pixels, never
//    mutated afterward.
//
// 2. `DestImage` — the write-only RGBA8 destination, same dimensions as
//    the source. One destination is reused by all four filters: each
//    dispatch overwrites it completely, so its contents are only defined
//    between a dispatch completing and the next one being enqueued. The
//    caller must fully read it back before dispatching again.
//
// 3. `DestImage::read_back` — blocking full-image copy into host memory.
//    This is the pipeline's synchronization point: it stalls the host
//    until the device finishes, which is what makes destination reuse
//    sound.
//
// ROW ALIGNMENT
// ──────────────
// wgpu requires `bytes_per_row` in buffer↔texture copies to be a
// multiple of 256. Host pixel rows (width × 4 bytes) rarely are, so the
// read-back copies into an aligned buffer and strips the padding on the
// way out. The upload goes through `queue.write_texture`, which stages
// internally and has no such alignment requirement.

use crate::device::GpuDevice;
use crate::error::FilterError;
use crate::program::Filter;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: u32 = 4;

/// wgpu's required alignment for `bytes_per_row` in copy operations.
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

// ---------------------------------------------------------------------------
// SourceImage
// ---------------------------------------------------------------------------

/// The input image, resident on the GPU as a read-only `Rgba8Unorm`
/// texture. Dimensions are fixed at creation; a different size means a
/// new `SourceImage`.
pub struct SourceImage {
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    // Kept alive for the view's sake; never re-written after upload.
    _texture: wgpu::Texture,
}

impl SourceImage {
    /// Create the source texture and copy `pixels` into it (one-shot
    /// upload; there is no incremental update path).
    ///
    /// `pixels` is tightly packed RGBA8, row-major,
    /// `width * height * 4` bytes.
    ///
    /// # Panics
    /// If `pixels.len()` does not match the dimensions — a host-side
    /// programming error, not a backend failure.
    pub fn upload(gpu: &GpuDevice, pixels: &[u8], width: u32, height: u32) -> Self {
        assert_eq!(
            pixels.len(),
            (width * height * BYTES_PER_PIXEL) as usize,
            "pixel buffer does not match {width}×{height} RGBA8"
        );

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("source image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // write_texture handles the staging copy internally, but its
        // data layout still wants our row pitch; host rows are tightly
        // packed so bytes_per_row is exactly width * 4 here. (Unlike a
        // buffer→texture copy, write_texture does not require 256-byte
        // row alignment.)
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * BYTES_PER_PIXEL),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        SourceImage {
            view,
            width,
            height,
            _texture: texture,
        }
    }
}

// ---------------------------------------------------------------------------
// DestImage
// ---------------------------------------------------------------------------

/// The filter output image: a write-only `Rgba8Unorm` storage texture
/// with the same dimensions as the source.
///
/// One `DestImage` is shared by all four filters. Its contents are
/// defined only between a completed dispatch and the next enqueue;
/// [`DestImage::read_back`] must run to completion before the next
/// filter's dispatch invalidates them.
pub struct DestImage {
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    texture: wgpu::Texture,
}

impl DestImage {
    /// Allocate the destination texture, uninitialized.
    pub fn new(gpu: &GpuDevice, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("destination image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        DestImage {
            view,
            width,
            height,
            texture,
        }
    }

    /// Blocking full-image read-back.
    ///
    /// Copies the entire destination into a fresh host buffer of
    /// `width * height * 4` bytes (tightly packed, row-major, alignment
    /// padding stripped). Blocks the calling thread until the device
    /// completes the copy — this is the synchronization point that makes
    /// destination reuse across filters sound.
    ///
    /// `filter` only labels the error when the map fails.
    pub fn read_back(&self, gpu: &GpuDevice, filter: Filter) -> Result<Vec<u8>, FilterError> {
        let bytes_per_row = self.width * BYTES_PER_PIXEL;
        let aligned_bytes_per_row = align_to(bytes_per_row, COPY_ALIGNMENT);
        let read_back_size = (aligned_bytes_per_row * self.height) as u64;

        let read_back_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("destination read-back"),
            size: read_back_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("destination read-back"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &read_back_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        // Map is async in wgpu's API; poll(Wait) blocks until the copy
        // completes and the callback fires.
        let buf_slice = read_back_buf.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .unwrap_or(Err(wgpu::BufferAsyncError))
            .map_err(|source| FilterError::ReadBack {
                filter: filter.entry_point(),
                source,
            })?;

        // Strip the row-alignment padding into a tightly packed buffer.
        let mapped = buf_slice.get_mapped_range();
        let mut out = vec![0u8; (bytes_per_row * self.height) as usize];
        for y in 0..self.height as usize {
            let src_start = y * aligned_bytes_per_row as usize;
            let dst_start = y * bytes_per_row as usize;
            out[dst_start..dst_start + bytes_per_row as usize]
                .copy_from_slice(&mapped[src_start..src_start + bytes_per_row as usize]);
        }
        drop(mapped);
        read_back_buf.unmap();

        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

/// Round `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
