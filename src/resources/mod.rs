//! Concrete resource kinds built on top of [`crate::resource`]'s generic
//! manager (§4.7).

pub mod mesh;
pub mod texture;

pub use mesh::{MeshRenderData, MeshResource};
pub use texture::TextureResource;
