//! `MeshResource`: query→import→build pipeline over decoded geometry
//! (§4.7), mirroring `resources/texture.rs`'s shape but building a
//! vertex+index buffer pair instead of a texture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::asset::{AssetHandle, AssetRegistry};
use crate::guid::Guid;
use crate::pool::{MemoryPool, PoolOffset};
use crate::raw_import::mesh::decode_mesh;
use crate::resource::{Resource, ResourceManager};
use crate::rhi::{GpuObjectFactory, RhiIndexBuffer, RhiVertexBuffer};
use crate::task_queue::TaskQueue;

struct StagedMeshPayload {
    payload: crate::raw_import::MeshPayload,
    offset: PoolOffset,
    byte_len: usize,
}

#[derive(Clone)]
pub struct MeshRenderData {
    pub vertex_buffer: Arc<dyn RhiVertexBuffer>,
    pub index_buffer: Arc<dyn RhiIndexBuffer>,
}

pub struct MeshResource {
    guid: Guid,
    asset: AssetHandle,
    render_data: RwLock<Option<(Weak<dyn RhiVertexBuffer>, Weak<dyn RhiIndexBuffer>)>>,
    importing: AtomicBool,
}

impl Resource for MeshResource {
    fn guid(&self) -> Guid {
        self.guid
    }
    fn asset_handle(&self) -> AssetHandle {
        self.asset
    }
    fn is_loaded(&self) -> bool {
        self.live_render_data().is_some()
    }
}

impl MeshResource {
    fn live_render_data(&self) -> Option<MeshRenderData> {
        let slot = self.render_data.read();
        let (vertex, index) = slot.as_ref()?;
        let vertex_buffer = vertex.upgrade()?;
        let index_buffer = index.upgrade()?;
        Some(MeshRenderData { vertex_buffer, index_buffer })
    }

    pub fn query(registry: &AssetRegistry, manager: &ResourceManager, asset: AssetHandle) -> crate::error::Result<Arc<MeshResource>> {
        manager.query_or_insert(asset, || {
            let guid = registry
                .with_definition(asset, |def| def.guid())
                .ok_or_else(|| crate::error::Error::parser_fail("no asset definition behind this handle"))?;
            Ok(Arc::new(MeshResource {
                guid,
                asset,
                render_data: RwLock::new(None),
                importing: AtomicBool::new(false),
            }))
        })
    }

    /// Stages decoded vertex bytes through `pool` between the worker-side
    /// decode and the main-thread GPU build, mirroring
    /// `TextureResource::take`'s staging of decoded image bytes.
    pub fn take(
        self: &Arc<Self>,
        registry: &AssetRegistry,
        queue: &TaskQueue,
        pool: Arc<MemoryPool>,
        factory: Arc<dyn GpuObjectFactory>,
        on_ready: impl FnOnce(MeshRenderData) + Send + 'static,
    ) -> bool {
        if let Some(existing) = self.live_render_data() {
            on_ready(existing);
            return true;
        }

        if self.importing.swap(true, Ordering::SeqCst) {
            return false;
        }

        let this = Arc::clone(self);
        let debug_name = format!("mesh-{}", self.guid);
        let decode_pool = Arc::clone(&pool);
        let schedule_result = registry.import::<StagedMeshPayload>(
            self.asset,
            queue,
            move |path| {
                let payload = decode_mesh(path)?;
                let vertex_bytes: &[u8] = bytemuck::cast_slice(&payload.vertices);
                let byte_len = vertex_bytes.len();
                let offset = decode_pool.alloc(byte_len)?;
                decode_pool.write(offset, vertex_bytes);
                Ok(StagedMeshPayload { payload, offset, byte_len })
            },
            move |decoded| {
                this.importing.store(false, Ordering::SeqCst);
                match decoded {
                    Ok(staged) => {
                        let staged_bytes = pool.read(staged.offset, staged.byte_len);
                        pool.free(staged.offset);
                        let vertices: &[crate::raw_import::mesh::MeshVertex] = bytemuck::cast_slice(&staged_bytes);
                        let payload = crate::raw_import::MeshPayload {
                            vertices: vertices.to_vec(),
                            ..staged.payload
                        };
                        match factory.create_mesh_buffers(&payload, &debug_name) {
                            Ok((vertex_buffer, index_buffer)) => {
                                *this.render_data.write() =
                                    Some((Arc::downgrade(&vertex_buffer), Arc::downgrade(&index_buffer)));
                                on_ready(MeshRenderData { vertex_buffer, index_buffer });
                            }
                            Err(e) => log::error!("failed to build GPU mesh buffers for \"{debug_name}\": {e}"),
                        }
                    }
                    Err(e) => log::error!("failed to decode mesh for \"{debug_name}\": {e}"),
                }
            },
        );

        if let Err(e) = schedule_result {
            log::error!("failed to schedule mesh import: {e}");
            self.importing.store(false, Ordering::SeqCst);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_type::{AssetType, AssetTypeRegistry, CustomAssetData};
    use crate::main_thread;
    use crate::parser::AssetParserCursor;
    use crate::rhi::RhiTexture;
    use std::sync::atomic::AtomicUsize;

    const TRIANGLE_GLTF: &str = r#"{"asset": {"version": "2.0"}, "scene": 0, "scenes": [{"nodes": [0]}], "nodes": [{"mesh": 0}], "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}], "buffers": [{"uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA", "byteLength": 36}], "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}], "accessors": [{"bufferView": 0, "byteOffset": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]}]}"#;

    struct NullMeshType;
    impl AssetType for NullMeshType {
        fn name(&self) -> &str {
            "Ion.Mesh"
        }
        fn parse(&self, _cursor: &mut AssetParserCursor<'_>) -> crate::error::Result<Box<dyn CustomAssetData>> {
            Ok(Box::new(()))
        }
        fn create_default_custom_data(&self) -> Box<dyn CustomAssetData> {
            Box::new(())
        }
    }

    struct FakeFactory;
    impl GpuObjectFactory for FakeFactory {
        fn create_texture(
            &self,
            _payload: &crate::raw_import::TexturePayload,
            _filter: crate::raw_import::TextureFilterMode,
            _debug_name: &str,
        ) -> crate::error::Result<Arc<dyn RhiTexture>> {
            unimplemented!("not exercised by this test")
        }
        fn update_texture_subresource(&self, _texture: &dyn RhiTexture, _payload: &crate::raw_import::TexturePayload) -> crate::error::Result<()> {
            Ok(())
        }
        fn create_mesh_buffers(
            &self,
            payload: &crate::raw_import::MeshPayload,
            _debug_name: &str,
        ) -> crate::error::Result<(Arc<dyn RhiVertexBuffer>, Arc<dyn RhiIndexBuffer>)> {
            struct FakeVertexBuffer(u32);
            impl RhiVertexBuffer for FakeVertexBuffer {
                fn vertex_count(&self) -> u32 {
                    self.0
                }
            }
            struct FakeIndexBuffer(u32);
            impl RhiIndexBuffer for FakeIndexBuffer {
                fn index_count(&self) -> u32 {
                    self.0
                }
            }
            Ok((
                Arc::new(FakeVertexBuffer(payload.vertices.len() as u32)),
                Arc::new(FakeIndexBuffer(payload.indices.len() as u32)),
            ))
        }
    }

    #[test]
    fn take_stages_decoded_vertices_through_the_pool_then_frees_them() {
        main_thread::mark_current_thread_as_main();

        let dir = tempfile::tempdir().unwrap();
        let mesh_path = dir.path().join("triangle.gltf");
        std::fs::write(&mesh_path, TRIANGLE_GLTF).unwrap();

        let descriptor_path = dir.path().join("Triangle.iasset");
        std::fs::write(
            &descriptor_path,
            r#"<IonAsset><Info type="Ion.Mesh" guid="6f1a2b3c-4d5e-6f70-8192-a3b4c5d6e7f8" /><ImportExternal path="triangle.gltf" /></IonAsset>"#,
        )
        .unwrap();

        let types = Arc::new(AssetTypeRegistry::new());
        types.register_type(Arc::new(NullMeshType)).unwrap();
        let registry = AssetRegistry::new(types);
        registry.register_virtual_root("[Engine]", dir.path()).unwrap();
        let asset = registry.resolve("[Engine]/Triangle").unwrap();

        let manager = ResourceManager::new();
        let resource = MeshResource::query(&registry, &manager, asset).unwrap();

        let pool = Arc::new(MemoryPool::allocate_pool(4096, 64).unwrap());
        let factory: Arc<dyn GpuObjectFactory> = Arc::new(FakeFactory);
        let mut queue = TaskQueue::new(1);

        let ready_count = Arc::new(AtomicUsize::new(0));
        let ready_count2 = Arc::clone(&ready_count);
        let held: Arc<parking_lot::Mutex<Option<MeshRenderData>>> = Arc::new(parking_lot::Mutex::new(None));
        let held2 = Arc::clone(&held);
        let delivered_sync = resource.take(&registry, &queue, Arc::clone(&pool), factory, move |render_data| {
            assert_eq!(render_data.vertex_buffer.vertex_count(), 3);
            ready_count2.fetch_add(1, Ordering::SeqCst);
            *held2.lock() = Some(render_data);
        });
        assert!(!delivered_sync);

        for _ in 0..200 {
            if queue.pending_message_count() > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        queue.dispatch_messages();
        assert_eq!(ready_count.load(Ordering::SeqCst), 1);
        assert!(held.lock().is_some());
        assert!(resource.is_loaded());
        assert_eq!(pool.used_bytes(), 0);

        queue.shutdown();
    }
}
