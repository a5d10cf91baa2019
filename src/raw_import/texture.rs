//! Worker-side texture decode: file bytes → a GPU-upload-ready payload
//! (§4.7 "Raw import").
//!
//! Grounded in the teacher's `texture_importer.rs` (exr/hdr/ktx2 decode
//! dispatch, `image` for the general-purpose codecs) — but its width/height
//! placeholders and the broken EXR closure are fixed here rather than
//! copied: width/height always come from the decoder's own metadata, never
//! from dividing buffer length by a channel count.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// One of the small set of pixel formats the RHI factory understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexturePixelFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    /// Pre-compressed GPU block data, tagged by its source Vulkan format code.
    PreCompressed(u32),
}

/// How the RHI factory should sample the constructed texture, read off the
/// descriptor's `<TextureResource><Filter value="..."/></TextureResource>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilterMode {
    Linear,
    Nearest,
}

impl Default for TextureFilterMode {
    fn default() -> Self {
        TextureFilterMode::Linear
    }
}

#[derive(Debug, Clone)]
pub struct TexturePayload {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TexturePixelFormat,
    pub data: Vec<u8>,
    /// Byte length of each of the first `mip_levels` entries packed
    /// sequentially in `data`, for formats decoded with a real pre-baked mip
    /// chain (currently only KTX2). Empty means `data` is a single level,
    /// eligible for the RHI factory to generate its own mip chain from.
    pub mip_level_lengths: Vec<u32>,
}

/// Decode `path`'s bytes according to its extension. Any decode failure is
/// a typed [`Error`], never a panic.
pub fn decode_texture(path: &Path) -> Result<TexturePayload> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "bmp" | "tga" => decode_with_image_crate(path),
        "hdr" => decode_hdr(path),
        "exr" => decode_exr(path),
        "ktx2" => decode_ktx2(path),
        other => Err(Error::parser_fail(format!("unsupported texture extension \".{other}\""))),
    }
}

fn decode_with_image_crate(path: &Path) -> Result<TexturePayload> {
    let image = image::open(path).map_err(|e| Error::parser_fail(format!("failed to decode {}: {e}", path.display())))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(TexturePayload {
        width,
        height,
        mip_levels: 1,
        format: TexturePixelFormat::Rgba8Unorm,
        data: rgba.into_raw(),
        mip_level_lengths: Vec::new(),
    })
}

fn decode_hdr(path: &Path) -> Result<TexturePayload> {
    let file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let decoder = image::codecs::hdr::HdrDecoder::new(std::io::BufReader::new(file))
        .map_err(|e| Error::parser_fail(format!("malformed HDR {}: {e}", path.display())))?;
    let metadata = decoder.metadata();
    let pixels = decoder
        .read_image_hdr()
        .map_err(|e| Error::parser_fail(format!("failed to decode HDR {}: {e}", path.display())))?;

    let rgba: Vec<f32> = pixels
        .into_iter()
        .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 1.0])
        .collect();

    Ok(TexturePayload {
        width: metadata.width,
        height: metadata.height,
        mip_levels: 1,
        format: TexturePixelFormat::Rgba32Float,
        data: bytemuck::cast_slice(&rgba).to_vec(),
        mip_level_lengths: Vec::new(),
    })
}

fn decode_exr(path: &Path) -> Result<TexturePayload> {
    use exr::prelude::*;

    let image = read_first_rgba_layer_from_file(
        path,
        |resolution, _channels| vec![vec![[0.0f32; 4]; resolution.width()]; resolution.height()],
        |rows, position, (r, g, b, a): (f32, f32, f32, f32)| {
            rows[position.y()][position.x()] = [r, g, b, a];
        },
    )
    .map_err(|e| Error::parser_fail(format!("failed to decode EXR {}: {e}", path.display())))?;

    let size = image.layer_data.size;
    let rgba: Vec<f32> = image
        .layer_data
        .channel_data
        .pixels
        .into_iter()
        .flatten()
        .flatten()
        .collect();

    Ok(TexturePayload {
        width: size.width() as u32,
        height: size.height() as u32,
        mip_levels: 1,
        format: TexturePixelFormat::Rgba32Float,
        data: bytemuck::cast_slice(&rgba).to_vec(),
        mip_level_lengths: Vec::new(),
    })
}

fn decode_ktx2(path: &Path) -> Result<TexturePayload> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let reader = ktx2::Reader::new(&bytes).map_err(|e| Error::parser_fail(format!("malformed KTX2 {}: {e}", path.display())))?;
    let header = reader.header();

    let mut data = Vec::new();
    let mut mip_level_lengths = Vec::new();
    for level in reader.levels() {
        data.extend_from_slice(level);
        mip_level_lengths.push(level.len() as u32);
    }

    Ok(TexturePayload {
        width: header.pixel_width,
        height: header.pixel_height.max(1),
        mip_levels: header.level_count.max(1),
        format: TexturePixelFormat::PreCompressed(header.format.map(|f| f as u32).unwrap_or(0)),
        data,
        mip_level_lengths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unsupported_extension_is_a_parser_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thing.weird");
        std::fs::write(&path, b"not a texture").unwrap();
        let err = decode_texture(&path).unwrap_err();
        assert!(err.is_parser_fail());
    }

    #[test]
    fn png_decodes_to_rgba8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solid.png");
        let mut file = fs::File::create(&path).unwrap();
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
        file.write_all(&buf).unwrap();

        let payload = decode_texture(&path).unwrap();
        assert_eq!(payload.width, 4);
        assert_eq!(payload.height, 4);
        assert_eq!(payload.format, TexturePixelFormat::Rgba8Unorm);
        assert_eq!(payload.data.len(), 4 * 4 * 4);
    }
}
