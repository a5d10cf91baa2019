//! Material instances (§4.8): a strong reference to a base [`Material`] plus
//! one parameter-instance per base parameter. Texture parameters resolve
//! asynchronously against a [`TextureResource`], with the snapshot cached
//! under a lock only [`MaterialInstance::resolve_textures`] ever writes to —
//! [`MaterialInstance::bind_textures`] itself is lock-free against that
//! resolution completing, since it only ever reads an already-upgraded
//! strong ref or `None`.
//!
//! Grounded in the teacher's `material_instance.rs` for the parameter-value
//! overlay shape, rebuilt on the safe [`ParamValue`] tagged enum from
//! [`crate::material`] instead of the teacher's unsafe union.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::asset::AssetRegistry;
use crate::error::{Error, Result};
use crate::material::{Material, ParamValue};
use crate::pool::MemoryPool;
use crate::resource::ResourceManager;
use crate::resources::texture::TextureResource;
use crate::rhi::{GpuObjectFactory, RhiTexture};
use crate::task_queue::TaskQueue;

/// Per-instance state for a `texture2D` parameter: the slot it occupies and
/// the last texture snapshot resolution delivered, if any.
struct TextureBinding {
    slot: u8,
    texture: Option<Arc<dyn RhiTexture>>,
}

pub struct MaterialInstance {
    pub material: Arc<Material>,
    scalars: RwLock<HashMap<String, f32>>,
    vectors: RwLock<HashMap<String, [f32; 4]>>,
    textures: RwLock<HashMap<String, TextureBinding>>,
}

impl MaterialInstance {
    /// Creates an instance over `material`, seeding every texture parameter
    /// with its declared slot and no bound texture yet.
    pub fn new(material: Arc<Material>) -> Arc<MaterialInstance> {
        let textures = material
            .parameters
            .textures
            .iter()
            .map(|param| (param.name.clone(), TextureBinding { slot: param.slot, texture: None }))
            .collect();

        Arc::new(MaterialInstance {
            material,
            scalars: RwLock::new(HashMap::new()),
            vectors: RwLock::new(HashMap::new()),
            textures: RwLock::new(textures),
        })
    }

    pub fn set_scalar(&self, name: &str, value: f32) -> Result<()> {
        if !self.material.parameters.scalars.iter().any(|p| p.name == name) {
            return Err(Error::parser_fail(format!("material has no scalar parameter \"{name}\"")));
        }
        self.scalars.write().insert(name.to_string(), value);
        Ok(())
    }

    pub fn set_vector(&self, name: &str, value: [f32; 4]) -> Result<()> {
        if !self.material.parameters.vectors.iter().any(|p| p.name == name) {
            return Err(Error::parser_fail(format!("material has no vector parameter \"{name}\"")));
        }
        self.vectors.write().insert(name.to_string(), value);
        Ok(())
    }

    pub fn scalar(&self, name: &str) -> Option<f32> {
        if let Some(value) = self.scalars.read().get(name).copied() {
            return Some(value);
        }
        self.material.parameters.scalars.iter().find(|p| p.name == name).map(|p| p.default)
    }

    pub fn vector(&self, name: &str) -> Option<[f32; 4]> {
        if let Some(value) = self.vectors.read().get(name).copied() {
            return Some(value);
        }
        self.material.parameters.vectors.iter().find(|p| p.name == name).map(|p| p.default)
    }

    pub fn value(&self, name: &str) -> Option<ParamValue> {
        self.scalar(name)
            .map(ParamValue::Scalar)
            .or_else(|| self.vector(name).map(ParamValue::Vector))
    }

    /// Kicks off resolution of every `texture2D` parameter's default asset
    /// into a live GPU texture, via the same query→take pipeline
    /// [`TextureResource`] exposes directly. Each resolved texture is
    /// cached the moment its `take` callback fires — synchronously if
    /// already resident, otherwise after one worker round and a message
    /// dispatch (S6).
    pub fn resolve_textures(
        self: &Arc<Self>,
        registry: &AssetRegistry,
        resource_manager: &ResourceManager,
        queue: &TaskQueue,
        pool: Arc<MemoryPool>,
        factory: Arc<dyn GpuObjectFactory>,
    ) -> Result<()> {
        for param in &self.material.parameters.textures {
            let Some(asset) = registry.find_by_guid(param.default_asset) else {
                log::warn!(
                    "material \"{}\" parameter \"{}\" default asset is not registered",
                    self.material.virtual_path,
                    param.name
                );
                continue;
            };
            let resource = TextureResource::query(registry, resource_manager, asset)?;

            let this = Arc::clone(self);
            let name = param.name.clone();
            resource.take(registry, queue, Arc::clone(&pool), Arc::clone(&factory), move |texture| {
                if let Some(binding) = this.textures.write().get_mut(&name) {
                    binding.texture = Some(texture);
                }
            });
        }
        Ok(())
    }

    /// Returns the currently bound texture for `name`, if resolution has
    /// delivered one. Synchronous and lock-free against
    /// [`Self::resolve_textures`] completing — it only ever observes an
    /// already-cached snapshot.
    pub fn bound_texture(&self, name: &str) -> Option<Arc<dyn RhiTexture>> {
        self.textures.read().get(name)?.texture.clone()
    }

    /// Snapshots every texture parameter into slot order: index `i` holds
    /// whatever is currently bound at slot `i`, or `None` if that slot's
    /// resolution hasn't delivered yet.
    pub fn bind_textures(&self) -> Vec<Option<Arc<dyn RhiTexture>>> {
        let textures = self.textures.read();
        let slot_count = self.material.parameters.textures.len();
        let mut bound = vec![None; slot_count];
        for binding in textures.values() {
            if let Some(slot) = bound.get_mut(binding.slot as usize) {
                *slot = binding.texture.clone();
            }
        }
        bound
    }
}
