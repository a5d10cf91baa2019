//! The rendering backend as an opaque GPU-object factory (§1): `create`,
//! `bind` (exposed here as `update_subresource` plus read-only accessors,
//! since nothing in this crate issues draw calls), consumed by resources
//! and materials without either depending on a concrete graphics API.
//!
//! Grounded in the teacher's `resource_manager.rs` (`TextureRecord`'s
//! view+sampler pair, `MeshRecord`'s vertex/index buffer pair) for the
//! `wgpu`-backed implementation's shape; the trait boundary itself is new,
//! since the teacher calls `wgpu` directly rather than through an
//! abstraction — this crate needs one because the RHI is explicitly an
//! external collaborator, not something it owns.

use std::sync::Arc;

use crate::error::Result;
use crate::raw_import::{MeshPayload, TextureFilterMode, TexturePayload, TexturePixelFormat};

pub trait RhiTexture: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn as_any(&self) -> &dyn std::any::Any;
}

pub trait RhiVertexBuffer: Send + Sync {
    fn vertex_count(&self) -> u32;
}

pub trait RhiIndexBuffer: Send + Sync {
    fn index_count(&self) -> u32;
}

/// Opaque GPU-object factory: the only way resources and materials touch
/// the rendering backend.
pub trait GpuObjectFactory: Send + Sync {
    fn create_texture(&self, payload: &TexturePayload, filter: TextureFilterMode, debug_name: &str) -> Result<Arc<dyn RhiTexture>>;
    fn update_texture_subresource(&self, texture: &dyn RhiTexture, payload: &TexturePayload) -> Result<()>;
    fn create_mesh_buffers(
        &self,
        payload: &MeshPayload,
        debug_name: &str,
    ) -> Result<(Arc<dyn RhiVertexBuffer>, Arc<dyn RhiIndexBuffer>)>;
}

fn wgpu_format_for(format: TexturePixelFormat) -> wgpu::TextureFormat {
    match format {
        TexturePixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexturePixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TexturePixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        // Block-compressed formats vary by source GPU code; BC7 is the
        // common default for pre-compressed color textures.
        TexturePixelFormat::PreCompressed(_) => wgpu::TextureFormat::Bc7RgbaUnorm,
    }
}

fn wgpu_filter_for(filter: TextureFilterMode) -> wgpu::FilterMode {
    match filter {
        TextureFilterMode::Linear => wgpu::FilterMode::Linear,
        TextureFilterMode::Nearest => wgpu::FilterMode::Nearest,
    }
}

fn sampler_descriptor_for(filter: TextureFilterMode) -> wgpu::SamplerDescriptor<'static> {
    let mode = wgpu_filter_for(filter);
    wgpu::SamplerDescriptor {
        label: None,
        mag_filter: mode,
        min_filter: mode,
        mipmap_filter: mode,
        ..Default::default()
    }
}

/// Box-filters a 2x2 neighborhood of an RGBA8 image down to half resolution.
fn downsample_rgba8(width: u32, height: u32, data: &[u8]) -> (u32, u32, Vec<u8>) {
    let next_width = (width / 2).max(1);
    let next_height = (height / 2).max(1);
    let mut out = vec![0u8; (next_width * next_height * 4) as usize];

    for y in 0..next_height {
        for x in 0..next_width {
            let mut sum = [0u32; 4];
            for dy in 0..2 {
                for dx in 0..2 {
                    let sx = (x * 2 + dx).min(width - 1);
                    let sy = (y * 2 + dy).min(height - 1);
                    let src = ((sy * width + sx) * 4) as usize;
                    for (c, sum_c) in sum.iter_mut().enumerate() {
                        *sum_c += data[src + c] as u32;
                    }
                }
            }
            let dst = ((y * next_width + x) * 4) as usize;
            for c in 0..4 {
                out[dst + c] = (sum[c] / 4) as u8;
            }
        }
    }
    (next_width, next_height, out)
}

/// Builds the full mip pyramid for an RGBA8 payload by repeated box-filter
/// downsampling, down to a 1x1 level.
fn generate_rgba8_mip_chain(width: u32, height: u32, data: &[u8]) -> Vec<(u32, u32, Vec<u8>)> {
    let mut levels = vec![(width.max(1), height.max(1), data.to_vec())];
    let (mut w, mut h) = (width.max(1), height.max(1));
    while w > 1 || h > 1 {
        let (prev_w, prev_h, ref prev_data) = *levels.last().unwrap();
        let next = downsample_rgba8(prev_w, prev_h, prev_data);
        w = next.0;
        h = next.1;
        levels.push(next);
    }
    levels
}

/// Slices `payload.data` into its pre-baked levels using
/// `mip_level_lengths`, halving width/height per level per the standard
/// mip pyramid convention.
fn sliced_precompressed_mip_chain(payload: &TexturePayload) -> Vec<(u32, u32, Vec<u8>)> {
    let mut levels = Vec::with_capacity(payload.mip_level_lengths.len());
    let mut offset = 0usize;
    let mut width = payload.width.max(1);
    let mut height = payload.height.max(1);
    for &len in &payload.mip_level_lengths {
        let len = len as usize;
        levels.push((width, height, payload.data[offset..offset + len].to_vec()));
        offset += len;
        width = (width / 2).max(1);
        height = (height / 2).max(1);
    }
    levels
}

/// Produces the full set of `(width, height, bytes)` mip levels to upload.
/// Pre-baked KTX2 levels are sliced out verbatim; a single-level RGBA8
/// payload gets a generated box-filter pyramid; everything else (HDR/EXR
/// linear float payloads) is uploaded as one level — float downsampling
/// isn't implemented here.
fn build_mip_chain(payload: &TexturePayload) -> Vec<(u32, u32, Vec<u8>)> {
    if !payload.mip_level_lengths.is_empty() {
        return sliced_precompressed_mip_chain(payload);
    }
    if payload.format == TexturePixelFormat::Rgba8Unorm {
        return generate_rgba8_mip_chain(payload.width, payload.height, &payload.data);
    }
    vec![(payload.width.max(1), payload.height.max(1), payload.data.clone())]
}

struct WgpuTexture {
    texture: wgpu::Texture,
    _view: wgpu::TextureView,
    _sampler: wgpu::Sampler,
    width: u32,
    height: u32,
}

impl RhiTexture for WgpuTexture {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct WgpuVertexBuffer {
    _buffer: wgpu::Buffer,
    vertex_count: u32,
}

impl RhiVertexBuffer for WgpuVertexBuffer {
    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

struct WgpuIndexBuffer {
    _buffer: wgpu::Buffer,
    index_count: u32,
}

impl RhiIndexBuffer for WgpuIndexBuffer {
    fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// The default [`GpuObjectFactory`], backed by a live `wgpu` device/queue.
pub struct WgpuGpuObjectFactory {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuGpuObjectFactory {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        WgpuGpuObjectFactory { device, queue }
    }

    fn texture_size(&self, payload: &TexturePayload) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: payload.width.max(1),
            height: payload.height.max(1),
            depth_or_array_layers: 1,
        }
    }
}

impl GpuObjectFactory for WgpuGpuObjectFactory {
    fn create_texture(&self, payload: &TexturePayload, filter: TextureFilterMode, debug_name: &str) -> Result<Arc<dyn RhiTexture>> {
        let size = self.texture_size(payload);
        let format = wgpu_format_for(payload.format);
        let mip_chain = build_mip_chain(payload);

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(debug_name),
            size,
            mip_level_count: mip_chain.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, (level_width, level_height, level_data)) in mip_chain.iter().enumerate() {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                level_data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row(format, *level_width)),
                    rows_per_image: Some((*level_height).max(1)),
                },
                wgpu::Extent3d {
                    width: (*level_width).max(1),
                    height: (*level_height).max(1),
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&sampler_descriptor_for(filter));

        Ok(Arc::new(WgpuTexture {
            texture,
            _view: view,
            _sampler: sampler,
            width: payload.width,
            height: payload.height,
        }))
    }

    fn update_texture_subresource(&self, texture: &dyn RhiTexture, payload: &TexturePayload) -> Result<()> {
        let Some(wgpu_texture) = texture.as_any().downcast_ref::<WgpuTexture>() else {
            return Ok(());
        };
        let size = self.texture_size(payload);
        let format = wgpu_texture.texture.format();
        self.queue.write_texture(
            wgpu_texture.texture.as_image_copy(),
            &payload.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row(format, payload.width)),
                rows_per_image: Some(payload.height.max(1)),
            },
            size,
        );
        Ok(())
    }

    fn create_mesh_buffers(
        &self,
        payload: &MeshPayload,
        debug_name: &str,
    ) -> Result<(Arc<dyn RhiVertexBuffer>, Arc<dyn RhiIndexBuffer>)> {
        use wgpu::util::DeviceExt;

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{debug_name}_vertices")),
            contents: bytemuck::cast_slice(&payload.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{debug_name}_indices")),
            contents: bytemuck::cast_slice(&payload.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok((
            Arc::new(WgpuVertexBuffer {
                _buffer: vertex_buffer,
                vertex_count: payload.vertices.len() as u32,
            }),
            Arc::new(WgpuIndexBuffer {
                _buffer: index_buffer,
                index_count: payload.indices.len() as u32,
            }),
        ))
    }
}

fn bytes_per_row(format: wgpu::TextureFormat, width: u32) -> u32 {
    let bytes_per_texel = format.block_copy_size(None).unwrap_or(4);
    bytes_per_texel * width.max(1)
}
