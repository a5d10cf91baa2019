//! `TextureResource`: query→import→build pipeline over a decoded image
//! (§4.7).
//!
//! Grounded in `original_source/.../Resource/TextureResource.h`'s `Take`
//! method: a weak `RHITexture` promoted to a strong snapshot when
//! available, otherwise one import kicked off and deduplicated against
//! concurrent callers via `importing`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::asset::AssetRegistry;
use crate::asset::AssetHandle;
use crate::error::Error;
use crate::guid::Guid;
use crate::parser::AssetParserCursor;
use crate::pool::MemoryPool;
use crate::raw_import::texture::decode_texture;
use crate::raw_import::TextureFilterMode;
use crate::resource::{Resource, ResourceManager};
use crate::rhi::{GpuObjectFactory, RhiTexture};
use crate::task_queue::TaskQueue;

/// Resource-description properties read from the descriptor's
/// `<TextureResource>` subtree, separate from the generic `Ion.Image`
/// asset-type parse (§4.7 step 2).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextureResourceDescription {
    pub filter: TextureFilterMode,
}

fn parse_filter_mode(raw: &str) -> crate::error::Result<TextureFilterMode> {
    match raw {
        "Linear" => Ok(TextureFilterMode::Linear),
        "Nearest" => Ok(TextureFilterMode::Nearest),
        other => Err(Error::parser_fail(format!("invalid texture filter mode \"{other}\""))),
    }
}

/// Re-reads and parses `definition_path` for the `<TextureResource>`
/// subtree, independent of the generic asset-type parse — mirrors
/// `TextureResource::ParseAssetFile` re-reading the descriptor file rather
/// than riding the `AssetType::parse` pass. Absent `<TextureResource>` or
/// `<Filter>` nodes fall back to [`TextureFilterMode::default`].
fn parse_resource_description(definition_path: &Path) -> crate::error::Result<TextureResourceDescription> {
    let text = std::fs::read_to_string(definition_path).map_err(|e| Error::io(definition_path, e))?;
    let document = roxmltree::Document::parse(&text)
        .map_err(|e| Error::parser_fail(format!("malformed descriptor {}: {e}", definition_path.display())))?;

    let mut cursor = AssetParserCursor::new(&document);
    cursor.begin_asset(None)?;

    if !cursor.try_enter_node("TextureResource") {
        return Ok(TextureResourceDescription::default());
    }
    let filter = match cursor.try_parse_node_value("Filter") {
        Some(raw) => parse_filter_mode(raw?)?,
        None => TextureFilterMode::default(),
    };
    cursor.exit_node();

    Ok(TextureResourceDescription { filter })
}

pub struct TextureResource {
    guid: Guid,
    asset: AssetHandle,
    description: TextureResourceDescription,
    render_data: RwLock<Weak<dyn RhiTexture>>,
    importing: AtomicBool,
}

impl Resource for TextureResource {
    fn guid(&self) -> Guid {
        self.guid
    }
    fn asset_handle(&self) -> AssetHandle {
        self.asset
    }
    fn is_loaded(&self) -> bool {
        self.render_data.read().upgrade().is_some()
    }
}

impl TextureResource {
    /// Find or create the texture resource associated with `asset`.
    pub fn query(registry: &AssetRegistry, manager: &ResourceManager, asset: AssetHandle) -> crate::error::Result<Arc<TextureResource>> {
        manager.query_or_insert(asset, || {
            let (guid, definition_path) = registry
                .with_definition(asset, |def| (def.guid(), def.definition_path().to_path_buf()))
                .ok_or_else(|| crate::error::Error::parser_fail("no asset definition behind this handle"))?;
            let description = parse_resource_description(&definition_path)?;
            Ok(Arc::new(TextureResource {
                guid,
                asset,
                description,
                render_data: RwLock::new(Weak::new()),
                importing: AtomicBool::new(false),
            }))
        })
    }

    /// If render data is already live, delivers synchronously and returns
    /// `true`. Otherwise starts (or rides an in-flight) import and returns
    /// `false`; `on_ready` fires later from `dispatch_messages`.
    ///
    /// Decoded bytes are staged through `pool` between the worker-side
    /// decode and the main-thread GPU build: allocated and written right
    /// after decoding (the pool mutex makes that safe off the main
    /// thread), then read back and freed before handing the bytes to
    /// `factory` — the "pool-allocated GPU data" the resource layer is
    /// specified to wrap.
    pub fn take(
        self: &Arc<Self>,
        registry: &AssetRegistry,
        queue: &TaskQueue,
        pool: Arc<MemoryPool>,
        factory: Arc<dyn GpuObjectFactory>,
        on_ready: impl FnOnce(Arc<dyn RhiTexture>) + Send + 'static,
    ) -> bool {
        if let Some(existing) = self.render_data.read().upgrade() {
            on_ready(existing);
            return true;
        }

        if self.importing.swap(true, Ordering::SeqCst) {
            return false;
        }

        let this = Arc::clone(self);
        let debug_name = format!("texture-{}", self.guid);
        let decode_pool = Arc::clone(&pool);
        let schedule_result = registry.import::<StagedTexturePayload>(
            self.asset,
            queue,
            move |path| {
                let payload = decode_texture(path)?;
                let offset = decode_pool.alloc(payload.data.len())?;
                decode_pool.write(offset, &payload.data);
                Ok(StagedTexturePayload { payload, offset })
            },
            move |decoded| {
                this.importing.store(false, Ordering::SeqCst);
                match decoded {
                    Ok(staged) => {
                        let mut payload = staged.payload;
                        payload.data = pool.read(staged.offset, payload.data.len());
                        pool.free(staged.offset);
                        match factory.create_texture(&payload, this.description.filter, &debug_name) {
                            Ok(texture) => {
                                *this.render_data.write() = Arc::downgrade(&texture);
                                on_ready(texture);
                            }
                            Err(e) => log::error!("failed to build GPU texture for \"{debug_name}\": {e}"),
                        }
                    }
                    Err(e) => log::error!("failed to decode texture for \"{debug_name}\": {e}"),
                }
            },
        );

        if let Err(e) = schedule_result {
            log::error!("failed to schedule texture import: {e}");
            self.importing.store(false, Ordering::SeqCst);
        }
        false
    }
}

struct StagedTexturePayload {
    payload: crate::raw_import::TexturePayload,
    offset: crate::pool::PoolOffset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_type::{AssetType, AssetTypeRegistry, CustomAssetData};
    use crate::main_thread;
    use crate::parser::AssetParserCursor;
    use crate::rhi::RhiVertexBuffer;
    use crate::rhi::{GpuObjectFactory as _, RhiIndexBuffer};
    use std::sync::atomic::AtomicUsize;

    struct NullImageType;
    impl AssetType for NullImageType {
        fn name(&self) -> &str {
            "Ion.Image"
        }
        fn parse(&self, _cursor: &mut AssetParserCursor<'_>) -> crate::error::Result<Box<dyn CustomAssetData>> {
            Ok(Box::new(()))
        }
        fn create_default_custom_data(&self) -> Box<dyn CustomAssetData> {
            Box::new(())
        }
    }

    struct FakeFactory {
        created: AtomicUsize,
    }

    struct FakeTexture {
        width: u32,
        height: u32,
    }
    impl RhiTexture for FakeTexture {
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

    impl GpuObjectFactory for FakeFactory {
        fn create_texture(
            &self,
            payload: &crate::raw_import::TexturePayload,
            _filter: TextureFilterMode,
            _debug_name: &str,
        ) -> crate::error::Result<Arc<dyn RhiTexture>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeTexture {
                width: payload.width,
                height: payload.height,
            }))
        }
        fn update_texture_subresource(&self, _texture: &dyn RhiTexture, _payload: &crate::raw_import::TexturePayload) -> crate::error::Result<()> {
            Ok(())
        }
        fn create_mesh_buffers(
            &self,
            _payload: &crate::raw_import::MeshPayload,
            _debug_name: &str,
        ) -> crate::error::Result<(Arc<dyn RhiVertexBuffer>, Arc<dyn RhiIndexBuffer>)> {
            unimplemented!("not exercised by these tests")
        }
    }

    #[test]
    fn s5_take_defers_until_dispatch_then_delivers_once() {
        main_thread::mark_current_thread_as_main();

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("albedo.png");
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        img.save(&image_path).unwrap();

        let descriptor_path = dir.path().join("Albedo.iasset");
        std::fs::write(
            &descriptor_path,
            format!(
                r#"<IonAsset><Info type="Ion.Image" guid="54a6f55c-feaf-4aa9-87cd-cc9b487c31ef" /><ImportExternal path="{}" /></IonAsset>"#,
                image_path.file_name().unwrap().to_str().unwrap()
            ),
        )
        .unwrap();

        let types = Arc::new(AssetTypeRegistry::new());
        types.register_type(Arc::new(NullImageType)).unwrap();
        let registry = AssetRegistry::new(types);
        registry.register_virtual_root("[Engine]", dir.path()).unwrap();
        let asset = registry.resolve("[Engine]/Albedo").unwrap();

        let manager = ResourceManager::new();
        let resource = TextureResource::query(&registry, &manager, asset).unwrap();

        let factory: Arc<dyn GpuObjectFactory> = Arc::new(FakeFactory { created: AtomicUsize::new(0) });
        let pool = Arc::new(crate::pool::MemoryPool::allocate_pool(4096, 64).unwrap());
        let mut queue = TaskQueue::new(1);

        let ready_count = Arc::new(AtomicUsize::new(0));
        let ready_count2 = Arc::clone(&ready_count);
        let held: Arc<parking_lot::Mutex<Option<Arc<dyn RhiTexture>>>> = Arc::new(parking_lot::Mutex::new(None));
        let held2 = Arc::clone(&held);

        let delivered_sync = resource.take(&registry, &queue, Arc::clone(&pool), Arc::clone(&factory), move |texture| {
            ready_count2.fetch_add(1, Ordering::SeqCst);
            *held2.lock() = Some(texture);
        });
        assert!(!delivered_sync);
        assert_eq!(ready_count.load(Ordering::SeqCst), 0);

        for _ in 0..200 {
            if queue.pending_message_count() > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(ready_count.load(Ordering::SeqCst), 0);

        queue.dispatch_messages();
        assert_eq!(ready_count.load(Ordering::SeqCst), 1);
        assert!(held.lock().is_some());
        assert!(resource.is_loaded());
        assert_eq!(pool.used_bytes(), 0);

        let ready_count3 = Arc::clone(&ready_count);
        let held3 = Arc::clone(&held);
        let delivered_sync_again = resource.take(&registry, &queue, pool, factory, move |texture| {
            ready_count3.fetch_add(1, Ordering::SeqCst);
            *held3.lock() = Some(texture);
        });
        assert!(delivered_sync_again);
        assert_eq!(ready_count.load(Ordering::SeqCst), 2);

        queue.shutdown();
    }

    #[test]
    fn query_reads_filter_mode_from_the_texture_resource_node() {
        main_thread::mark_current_thread_as_main();

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("albedo.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255])).save(&image_path).unwrap();

        let descriptor_path = dir.path().join("Albedo.iasset");
        std::fs::write(
            &descriptor_path,
            format!(
                r#"<IonAsset><Info type="Ion.Image" guid="54a6f55c-feaf-4aa9-87cd-cc9b487c31ef" /><ImportExternal path="{}" /><TextureResource><Filter value="Nearest" /></TextureResource></IonAsset>"#,
                image_path.file_name().unwrap().to_str().unwrap()
            ),
        )
        .unwrap();

        let types = Arc::new(AssetTypeRegistry::new());
        types.register_type(Arc::new(NullImageType)).unwrap();
        let registry = AssetRegistry::new(types);
        registry.register_virtual_root("[Engine]", dir.path()).unwrap();
        let asset = registry.resolve("[Engine]/Albedo").unwrap();

        let manager = ResourceManager::new();
        let resource = TextureResource::query(&registry, &manager, asset).unwrap();
        assert_eq!(resource.description.filter, TextureFilterMode::Nearest);
    }

    #[test]
    fn query_defaults_to_linear_filter_when_texture_resource_node_is_absent() {
        main_thread::mark_current_thread_as_main();

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("albedo.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255])).save(&image_path).unwrap();

        let descriptor_path = dir.path().join("Albedo.iasset");
        std::fs::write(
            &descriptor_path,
            format!(
                r#"<IonAsset><Info type="Ion.Image" guid="54a6f55c-feaf-4aa9-87cd-cc9b487c31ef" /><ImportExternal path="{}" /></IonAsset>"#,
                image_path.file_name().unwrap().to_str().unwrap()
            ),
        )
        .unwrap();

        let types = Arc::new(AssetTypeRegistry::new());
        types.register_type(Arc::new(NullImageType)).unwrap();
        let registry = AssetRegistry::new(types);
        registry.register_virtual_root("[Engine]", dir.path()).unwrap();
        let asset = registry.resolve("[Engine]/Albedo").unwrap();

        let manager = ResourceManager::new();
        let resource = TextureResource::query(&registry, &manager, asset).unwrap();
        assert_eq!(resource.description.filter, TextureFilterMode::Linear);
    }
}
