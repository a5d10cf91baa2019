//! Materials (§4.8): a parameter schema plus a deterministic uniform-buffer
//! layout and a per-usage shader-compile/flag pipeline, sitting over the
//! same task queue resources use for async import.
//!
//! Grounded in the teacher's `materials/material_system.rs` for the overall
//! shape (property table, texture-slot bitmask, per-usage compiled flags)
//! but rebuilt on a safe tagged enum rather than the teacher's
//! `union ParameterValue` — `ParamValue` below carries a discriminant, so
//! there is no unsafe code reading the wrong field of the union.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::task_queue::{TaskQueue, TaskWork};

/// Maximum distinct `texture2D` parameters a single material can declare.
pub const MAX_TEXTURE_SLOTS: u32 = 16;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ParamValue {
    Scalar(f32),
    Vector([f32; 4]),
    Texture2D(Guid),
}

#[derive(Clone, Debug)]
pub struct ScalarParam {
    pub name: String,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

#[derive(Clone, Debug)]
pub struct VectorParam {
    pub name: String,
    pub default: [f32; 4],
    pub min: [f32; 4],
    pub max: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct TextureParam {
    pub name: String,
    pub slot: u8,
    pub default_asset: Guid,
}

/// One entry of the uniform buffer layout `build_uniform_layout` derives
/// from a parameter list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformLayoutEntry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformLayout {
    pub entries: Vec<UniformLayoutEntry>,
    pub total_size: u32,
}

const VECTOR_SIZE: u32 = 16;
const SCALAR_SIZE: u32 = 4;

/// Parameter schema: an ordered list of scalar/vector/texture parameters,
/// plus the texture-slot bitmask those texture parameters claimed.
#[derive(Default)]
pub struct MaterialParameters {
    pub scalars: Vec<ScalarParam>,
    pub vectors: Vec<VectorParam>,
    pub textures: Vec<TextureParam>,
    texture_slot_mask: u32,
}

impl MaterialParameters {
    pub fn new() -> Self {
        MaterialParameters::default()
    }

    pub fn add_scalar(&mut self, name: impl Into<String>, default: f32, min: f32, max: f32) {
        self.scalars.push(ScalarParam { name: name.into(), default, min, max });
    }

    pub fn add_vector(&mut self, name: impl Into<String>, default: [f32; 4], min: [f32; 4], max: [f32; 4]) {
        self.vectors.push(VectorParam { name: name.into(), default, min, max });
    }

    /// Claims the lowest clear bit of the 32-bit texture-slot mask and
    /// assigns it to a new `texture2D` parameter. Errors past
    /// [`MAX_TEXTURE_SLOTS`] distinct textures.
    pub fn add_texture(&mut self, name: impl Into<String>, default_asset: Guid) -> Result<u8> {
        if self.textures.len() as u32 >= MAX_TEXTURE_SLOTS {
            return Err(Error::parser_fail(format!(
                "material declares more than {MAX_TEXTURE_SLOTS} texture parameters"
            )));
        }
        let slot = self.texture_slot_mask.trailing_ones();
        self.texture_slot_mask |= 1 << slot;
        let slot = slot as u8;
        self.textures.push(TextureParam { name: name.into(), slot, default_asset });
        Ok(slot)
    }

    /// Vectors first in insertion order, then scalars in insertion order —
    /// the layout the shader code is written against.
    pub fn build_uniform_layout(&self) -> UniformLayout {
        let mut entries = Vec::with_capacity(self.vectors.len() + self.scalars.len());
        let mut offset = 0u32;
        for v in &self.vectors {
            entries.push(UniformLayoutEntry { name: v.name.clone(), offset, size: VECTOR_SIZE });
            offset += VECTOR_SIZE;
        }
        for s in &self.scalars {
            entries.push(UniformLayoutEntry { name: s.name.clone(), offset, size: SCALAR_SIZE });
            offset += SCALAR_SIZE;
        }
        UniformLayout { entries, total_size: offset }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ShaderUsage {
    StaticMesh,
    SkeletalMesh,
    PostProcess,
}

impl ShaderUsage {
    const ALL: [ShaderUsage; 3] = [ShaderUsage::StaticMesh, ShaderUsage::SkeletalMesh, ShaderUsage::PostProcess];

    fn bit(self) -> u32 {
        match self {
            ShaderUsage::StaticMesh => 1 << 0,
            ShaderUsage::SkeletalMesh => 1 << 1,
            ShaderUsage::PostProcess => 1 << 2,
        }
    }
}

pub struct Material {
    pub virtual_path: String,
    pub code_source: String,
    pub parameters: MaterialParameters,
    pub uniform_layout: UniformLayout,
    compiled_flags: AtomicU32,
}

impl Material {
    pub fn new(virtual_path: impl Into<String>, code_source: impl Into<String>, parameters: MaterialParameters) -> Self {
        let uniform_layout = parameters.build_uniform_layout();
        Material {
            virtual_path: virtual_path.into(),
            code_source: code_source.into(),
            parameters,
            uniform_layout,
            compiled_flags: AtomicU32::new(0),
        }
    }

    pub fn is_compiled(&self, usage: ShaderUsage) -> bool {
        self.compiled_flags.load(Ordering::Acquire) & usage.bit() != 0
    }

    /// Schedules `compiler` on a worker for `usage`; on success, posts a
    /// message that flips the per-usage compiled flag on the main thread.
    /// The material is not bindable for `usage` until that flag is set.
    pub fn compile_for_usage(
        self: &Arc<Self>,
        usage: ShaderUsage,
        queue: &TaskQueue,
        compiler: impl Fn(&str, ShaderUsage) -> Result<()> + Send + Sync + 'static,
    ) {
        let this = Arc::clone(self);
        queue.schedule(TaskWork::new(move |sink| {
            let result = compiler(&this.code_source, usage);
            sink.push_message(crate::task_queue::TaskMessage::new(move || match result {
                Ok(()) => {
                    this.compiled_flags.fetch_or(usage.bit(), Ordering::AcqRel);
                }
                Err(e) => log::error!("shader compile failed for \"{}\" ({usage:?}): {e}", this.virtual_path),
            }));
        }));
    }

    /// Compiles every declared usage. Convenience over calling
    /// `compile_for_usage` once per [`ShaderUsage`] variant.
    pub fn compile_all_usages(
        self: &Arc<Self>,
        queue: &TaskQueue,
        compiler: impl Fn(&str, ShaderUsage) -> Result<()> + Send + Sync + Clone + 'static,
    ) {
        for usage in ShaderUsage::ALL {
            self.compile_for_usage(usage, queue, compiler.clone());
        }
    }
}

/// Process-wide map from material virtual path to a strong reference to the
/// parsed material (§4.8) — same single-registration discipline as
/// [`crate::asset::AssetRegistry`]: a second lookup never re-parses.
pub struct MaterialRegistry {
    materials: RwLock<HashMap<String, Arc<Material>>>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        MaterialRegistry { materials: RwLock::new(HashMap::new()) }
    }

    pub fn find(&self, virtual_path: &str) -> Option<Arc<Material>> {
        self.materials.read().get(virtual_path).cloned()
    }

    /// Returns the existing material for `virtual_path` if present;
    /// otherwise parses via `parse` and registers the result.
    pub fn get_or_parse(&self, virtual_path: &str, parse: impl FnOnce() -> Result<Material>) -> Result<Arc<Material>> {
        if let Some(existing) = self.find(virtual_path) {
            return Ok(existing);
        }
        let mut materials = self.materials.write();
        if let Some(existing) = materials.get(virtual_path) {
            return Ok(Arc::clone(existing));
        }
        let material = Arc::new(parse()?);
        materials.insert(virtual_path.to_string(), Arc::clone(&material));
        Ok(material)
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        MaterialRegistry::new()
    }
}
