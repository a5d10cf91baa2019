//! Asset and resource subsystem: virtual-path asset registry, pooled memory
//! allocation, a worker/main-thread task queue, and the resource and
//! material layers built on top.
//!
//! Services are explicit, not ambient globals — construct an [`AssetSystem`]
//! with [`AssetSystem::init`] and tear it down with [`AssetSystem::shutdown`]
//! in that order (§9 "Singletons").

#![allow(clippy::too_many_arguments)]

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod asset;
pub mod asset_type;
pub mod config;
pub mod error;
pub mod guid;
pub mod main_thread;
pub mod material;
pub mod material_instance;
pub mod parser;
pub mod pool;
pub mod raw_import;
pub mod resource;
pub mod resources;
pub mod rhi;
pub mod task_queue;
pub mod vpath;

use std::sync::Arc;

use crate::asset::AssetRegistry;
use crate::asset_type::AssetTypeRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::material::MaterialRegistry;
use crate::pool::MemoryPool;
use crate::resource::ResourceManager;
use crate::task_queue::TaskQueue;

/// The process-wide asset/resource services, held together for the
/// lifetime of one embedder session.
///
/// Construction order mirrors initialization order: type registry, asset
/// registry, memory pools, resource manager, material registry, task
/// queue. Shutdown runs the queue down first so no worker can touch a
/// service that's about to be dropped.
pub struct AssetSystem {
    pub types: Arc<AssetTypeRegistry>,
    pub assets: AssetRegistry,
    pub resources: ResourceManager,
    pub materials: MaterialRegistry,
    pub mesh_pool: MemoryPool,
    pub texture_pool: MemoryPool,
    pub queue: TaskQueue,
    config: Config,
}

impl AssetSystem {
    /// Brings up every singleton service from `config`. Must be called from
    /// the main thread — `AssetRegistry::import` and `Resource::query`
    /// assert that affinity later.
    pub fn init(config: Config) -> Result<Self> {
        main_thread::mark_current_thread_as_main();

        let types = Arc::new(AssetTypeRegistry::new());
        let assets = AssetRegistry::new(Arc::clone(&types));
        let mesh_pool = MemoryPool::allocate_pool(config.mesh_pool_size, config.asset_pool_alignment)?;
        let texture_pool = MemoryPool::allocate_pool(config.texture_pool_size, config.asset_pool_alignment)?;
        let resources = ResourceManager::new();
        let materials = MaterialRegistry::new();
        let queue = TaskQueue::new(config.asset_worker_count);

        Ok(AssetSystem {
            types,
            assets,
            resources,
            materials,
            mesh_pool,
            texture_pool,
            queue,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drains and joins the task queue's workers. Any import still in
    /// flight is allowed to finish; its `on_ready` callback simply never
    /// gets dispatched, matching the "no cancellation" contract (§5).
    pub fn shutdown(mut self) {
        self.queue.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_brings_up_every_service_and_shutdown_drains_cleanly() {
        let system = AssetSystem::init(Config::default()).unwrap();
        assert!(system.assets.find("[Engine]/nothing").is_none());
        assert!(system.materials.find("[Engine]/Materials/Nothing").is_none());
        system.shutdown();
    }
}
