//! Worker-side geometry decode: a glTF container → `MeshPayload` (§4.7).
//!
//! Grounded in the teacher's `gltf_loader.rs::create_mesh_gpu` for the
//! attribute-reading shape (positions required, normals/uvs/tangents
//! defaulted when absent) — adapted to produce a plain CPU-side payload
//! instead of uploading straight to a `wgpu::Device`, since decode and GPU
//! upload are different pipeline stages here (worker vs. main thread).

use std::path::Path;

use crate::error::{Error, Result};

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
}

/// Describes how [`MeshVertex`] fields map onto shader input locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub position_offset: u32,
    pub normal_offset: u32,
    pub uv_offset: u32,
    pub tangent_offset: u32,
}

impl VertexLayout {
    pub const STANDARD: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<MeshVertex>() as u32,
        position_offset: 0,
        normal_offset: 12,
        uv_offset: 24,
        tangent_offset: 32,
    };
}

#[derive(Debug, Clone)]
pub struct MeshPayload {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub vertex_layout: VertexLayout,
}

/// Decode the first mesh primitive found in the glTF container at `path`.
pub fn decode_mesh(path: &Path) -> Result<MeshPayload> {
    let (document, buffers, _images) =
        gltf::import(path).map_err(|e| Error::parser_fail(format!("failed to decode glTF {}: {e}", path.display())))?;

    let primitive = document
        .meshes()
        .next()
        .and_then(|mesh| mesh.primitives().next())
        .ok_or_else(|| Error::parser_fail(format!("{} contains no mesh primitives", path.display())))?;

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| Error::parser_fail("mesh primitive is missing POSITION attribute"))?
        .collect();
    let vertex_count = positions.len();

    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map(|iter| iter.collect())
        .unwrap_or_else(|| vec![[0.0, 1.0, 0.0]; vertex_count]);

    let uvs: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|iter| iter.into_f32().collect())
        .unwrap_or_else(|| vec![[0.0, 0.0]; vertex_count]);

    let tangents: Vec<[f32; 4]> = reader
        .read_tangents()
        .map(|iter| iter.collect())
        .unwrap_or_else(|| vec![[1.0, 0.0, 0.0, 1.0]; vertex_count]);

    let vertices: Vec<MeshVertex> = (0..vertex_count)
        .map(|i| MeshVertex {
            position: positions[i],
            normal: normals[i],
            uv: uvs[i],
            tangent: [tangents[i][0], tangents[i][1], tangents[i][2]],
        })
        .collect();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(iter) => iter.into_u32().collect(),
        None => (0..vertex_count as u32).collect(),
    };

    Ok(MeshPayload {
        vertices,
        indices,
        vertex_layout: VertexLayout::STANDARD,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_of_missing_file_is_parser_fail() {
        let err = decode_mesh(Path::new("/nonexistent/path.gltf")).unwrap_err();
        assert!(err.is_parser_fail());
    }

    #[test]
    fn standard_vertex_layout_matches_struct_offsets() {
        assert_eq!(VertexLayout::STANDARD.stride, 44);
        assert_eq!(VertexLayout::STANDARD.normal_offset, 12);
        assert_eq!(VertexLayout::STANDARD.uv_offset, 24);
        assert_eq!(VertexLayout::STANDARD.tangent_offset, 32);
    }
}
