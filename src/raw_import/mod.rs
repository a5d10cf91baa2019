//! Worker-side raw decoders (§4.7 "Raw import"): turn an imported asset's
//! bytes into a GPU-upload-ready payload, off the main thread.

pub mod mesh;
pub mod texture;

pub use mesh::{decode_mesh, MeshPayload, MeshVertex, VertexLayout};
pub use texture::{decode_texture, TextureFilterMode, TexturePayload, TexturePixelFormat};
