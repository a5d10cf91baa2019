//! Asset handles, asset definitions, and the virtual-path asset registry
//! (§3, §4.5).
//!
//! Grounded in `AssetRegistry.cpp` and `AssetDefinition.h` from the
//! original engine for exact `resolve`/`register_external`/`unregister`
//! semantics (in particular: a failed resolve must leave the registry
//! untouched, and two `resolve` calls for the same virtual path return the
//! same handle rather than re-parsing). The handle representation follows
//! the generation-tagged packed-index idiom from the teacher's
//! `resource_manager.rs::Handle` rather than the source's raw pointers,
//! per §9's "pool/handle hazards" design note — no client ever holds a
//! pointer into the registry's storage.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::asset_type::{AssetTypeRegistry, CustomAssetData};
use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::main_thread;
use crate::parser::AssetParserCursor;
use crate::task_queue::{TaskQueue, TaskWork};
use crate::vpath;

const DESCRIPTOR_EXTENSION: &str = "iasset";

/// A lightweight, copyable reference to a registered asset definition.
/// Pointer-sized, never owning — ownership lives entirely in the registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AssetHandle {
    /// Explicit "no asset".
    Null,
    /// Uninitialized / never bound.
    Invalid,
    /// Points at a live definition, identified by generation-tagged slot.
    Bound { index: u32, generation: u32 },
}

impl Default for AssetHandle {
    fn default() -> Self {
        AssetHandle::Invalid
    }
}

impl AssetHandle {
    pub const fn null() -> Self {
        AssetHandle::Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AssetHandle::Null)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, AssetHandle::Invalid)
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, AssetHandle::Bound { .. })
    }
}

/// Advisory metadata carried alongside an asset's identity.
#[derive(Debug, Clone, Default)]
pub struct AssetInfo {
    pub name: String,
    pub resource_usage: Vec<String>,
}

/// The in-memory record for a registered asset (§3).
pub struct AssetDefinition {
    guid: Guid,
    virtual_path: String,
    definition_path: PathBuf,
    import_path: Option<PathBuf>,
    type_name: String,
    info: AssetInfo,
    custom_data: Box<dyn CustomAssetData>,
}

impl AssetDefinition {
    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    pub fn definition_path(&self) -> &Path {
        &self.definition_path
    }

    pub fn import_path(&self) -> Option<&Path> {
        self.import_path.as_deref()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn info(&self) -> &AssetInfo {
        &self.info
    }

    pub fn custom_data(&self) -> &dyn CustomAssetData {
        self.custom_data.as_ref()
    }

    /// The descriptor is valid iff it does not require an external import
    /// path, or that path is a regular file.
    pub fn is_valid(&self) -> bool {
        match &self.import_path {
            Some(p) => p.is_file(),
            None => true,
        }
    }
}

struct RegistryInner {
    roots: HashMap<String, PathBuf>,
    by_path: HashMap<String, AssetHandle>,
    /// `None` once freed; `generations[i]` stays valid (and is bumped on
    /// free) regardless, so a stale handle's generation check still works.
    slots: Vec<Option<AssetDefinition>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
}

/// The process-wide asset registry: virtual-path namespace, virtual-root
/// bindings, and the single owner of every [`AssetDefinition`].
pub struct AssetRegistry {
    types: Arc<AssetTypeRegistry>,
    inner: RwLock<RegistryInner>,
}

impl AssetRegistry {
    pub fn new(types: Arc<AssetTypeRegistry>) -> Self {
        AssetRegistry {
            types,
            inner: RwLock::new(RegistryInner {
                roots: HashMap::new(),
                by_path: HashMap::new(),
                slots: Vec::new(),
                generations: Vec::new(),
                free_list: Vec::new(),
            }),
        }
    }

    /// Associate `[Root]` with a filesystem directory. Rejects malformed
    /// tokens and duplicate roots.
    pub fn register_virtual_root(&self, root: &str, fs_path: impl Into<PathBuf>) -> Result<()> {
        if !vpath::is_valid_root_token(root) {
            return Err(Error::parser_fail(format!("\"{root}\" is not a valid virtual root token")));
        }
        let mut inner = self.inner.write();
        if inner.roots.contains_key(root) {
            return Err(Error::duplicate(format!("virtual root \"{root}\"")));
        }
        inner.roots.insert(root.to_string(), fs_path.into());
        Ok(())
    }

    pub fn root_fs_path(&self, root: &str) -> Option<PathBuf> {
        self.inner.read().roots.get(root).cloned()
    }

    /// Resolve `virtual_path` to a handle, parsing and registering the
    /// descriptor the first time; idempotent thereafter (S3).
    pub fn resolve(&self, virtual_path: &str) -> Result<AssetHandle> {
        if !vpath::is_valid_virtual_path(virtual_path) {
            return Err(Error::parser_fail(format!("\"{virtual_path}\" is not a valid virtual path")));
        }
        if let Some(existing) = self.find(virtual_path) {
            return Ok(existing);
        }

        let root = vpath::root_of(virtual_path);
        let root_dir = {
            let inner = self.inner.read();
            inner
                .roots
                .get(root)
                .cloned()
                .ok_or_else(|| Error::FileNotFoundError(PathBuf::from(virtual_path)))?
        };

        let relative = vpath::rest_of(virtual_path).trim_start_matches('/');
        let mut descriptor_path = root_dir.join(relative);
        descriptor_path.set_extension(DESCRIPTOR_EXTENSION);

        self.register_from_descriptor(virtual_path, &descriptor_path)
    }

    /// Register a descriptor at an arbitrary filesystem location under a
    /// caller-chosen virtual path (no virtual-root lookup involved).
    pub fn register_external(&self, fs_path: impl AsRef<Path>, virtual_path: &str) -> Result<AssetHandle> {
        if !vpath::is_valid_virtual_path(virtual_path) {
            return Err(Error::parser_fail(format!("\"{virtual_path}\" is not a valid virtual path")));
        }
        if let Some(existing) = self.find(virtual_path) {
            return Ok(existing);
        }
        self.register_from_descriptor(virtual_path, fs_path.as_ref())
    }

    fn register_from_descriptor(&self, virtual_path: &str, descriptor_path: &Path) -> Result<AssetHandle> {
        let text = fs::read_to_string(descriptor_path).map_err(|e| Error::io(descriptor_path, e))?;
        let document = roxmltree::Document::parse(&text)
            .map_err(|e| Error::parser_fail(format!("malformed descriptor {}: {e}", descriptor_path.display())))?;

        let mut cursor = AssetParserCursor::new(&document);
        cursor.begin_asset(None)?;

        cursor.enter_node("Info")?;
        let type_name = cursor.require_attribute("type")?.to_string();
        let guid_str = cursor.require_attribute("guid")?.to_string();
        cursor.exit_node();

        let guid = Guid::from_string(&guid_str)?;

        let name = match cursor.try_parse_node_value("Name") {
            Some(result) => result?.to_string(),
            None => descriptor_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(virtual_path)
                .to_string(),
        };

        let import_path = if cursor.try_enter_node("ImportExternal") {
            let raw = cursor.require_attribute("path")?.to_string();
            cursor.exit_node();
            let path = PathBuf::from(&raw);
            let resolved = if path.is_absolute() {
                path
            } else {
                descriptor_path
                    .parent()
                    .map(|dir| dir.join(&path))
                    .unwrap_or(path)
            };
            Some(resolved)
        } else {
            None
        };

        let mut resource_usage = Vec::new();
        if let Some(resource_node) = document
            .root_element()
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "Resource")
        {
            resource_usage.extend(
                resource_node
                    .children()
                    .filter(|n| n.is_element())
                    .map(|n| n.tag_name().name().to_string()),
            );
        }

        let asset_type = self
            .types
            .find(&type_name)
            .ok_or_else(|| Error::parser_fail(format!("asset type \"{type_name}\" is not registered")))?;

        let custom_data = asset_type.parse(&mut cursor)?;

        if let Some(path) = &import_path {
            if !path.is_file() {
                return Err(Error::FileNotFoundError(path.clone()));
            }
        }

        let definition = AssetDefinition {
            guid,
            virtual_path: virtual_path.to_string(),
            definition_path: descriptor_path.to_path_buf(),
            import_path,
            type_name,
            info: AssetInfo {
                name,
                resource_usage,
            },
            custom_data,
        };

        let mut inner = self.inner.write();
        let handle = Self::insert_slot(&mut inner, definition);
        inner.by_path.insert(virtual_path.to_string(), handle);
        Ok(handle)
    }

    fn insert_slot(inner: &mut RegistryInner, definition: AssetDefinition) -> AssetHandle {
        if let Some(index) = inner.free_list.pop() {
            inner.slots[index as usize] = Some(definition);
            let generation = inner.generations[index as usize];
            AssetHandle::Bound { index, generation }
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Some(definition));
            inner.generations.push(1);
            AssetHandle::Bound { index, generation: 1 }
        }
    }

    pub fn find(&self, virtual_path: &str) -> Option<AssetHandle> {
        self.inner.read().by_path.get(virtual_path).copied()
    }

    /// Linear scan for the asset carrying `guid`. Used sparingly — by
    /// material instances resolving a `texture2D` parameter's default
    /// asset — never on a hot path.
    pub fn find_by_guid(&self, guid: Guid) -> Option<AssetHandle> {
        self.all_assets()
            .into_iter()
            .find(|handle| self.with_definition(*handle, |def| def.guid()) == Some(guid))
    }

    fn generation_matches(inner: &RegistryInner, index: u32, generation: u32) -> bool {
        inner.slots.get(index as usize).map(Option::is_some).unwrap_or(false)
            && inner.generations.get(index as usize) == Some(&generation)
    }

    pub fn is_registered(&self, handle: AssetHandle) -> bool {
        match handle {
            AssetHandle::Bound { index, generation } => {
                Self::generation_matches(&self.inner.read(), index, generation)
            }
            _ => false,
        }
    }

    /// Run `f` against the live definition behind `handle`, if any.
    pub fn with_definition<R>(&self, handle: AssetHandle, f: impl FnOnce(&AssetDefinition) -> R) -> Option<R> {
        let AssetHandle::Bound { index, generation } = handle else {
            return None;
        };
        let inner = self.inner.read();
        if !Self::generation_matches(&inner, index, generation) {
            return None;
        }
        inner.slots[index as usize].as_ref().map(f)
    }

    pub fn all_assets(&self) -> Vec<AssetHandle> {
        let inner = self.inner.read();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|_| AssetHandle::Bound {
                    index: index as u32,
                    generation: inner.generations[index],
                })
            })
            .collect()
    }

    pub fn all_assets_of_type(&self, type_name: &str) -> Vec<AssetHandle> {
        self.all_assets()
            .into_iter()
            .filter(|h| {
                self.with_definition(*h, |def| def.type_name() == type_name)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// The only removal path. Frees the slot (bumping its generation so
    /// stale handles fail [`is_registered`]) and drops the `by_path` entry.
    pub fn unregister(&self, handle: AssetHandle) {
        let AssetHandle::Bound { index, generation } = handle else {
            return;
        };
        let mut inner = self.inner.write();
        if !Self::generation_matches(&inner, index, generation) {
            return;
        }
        let definition = inner.slots[index as usize].take().expect("checked above");
        inner.by_path.remove(&definition.virtual_path);
        inner.generations[index as usize] = inner.generations[index as usize].wrapping_add(1);
        inner.free_list.push(index);
    }

    /// Recursively walk every registered virtual root, resolving every
    /// `.iasset` file found under it.
    pub fn register_engine_assets(&self) -> Vec<Result<AssetHandle>> {
        let roots: Vec<(String, PathBuf)> = {
            let inner = self.inner.read();
            inner.roots.iter().map(|(r, p)| (r.clone(), p.clone())).collect()
        };

        let mut results = Vec::new();
        for (root, dir) in roots {
            let mut stack = vec![dir.clone()];
            while let Some(current) = stack.pop() {
                let Ok(entries) = fs::read_dir(&current) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        stack.push(path);
                        continue;
                    }
                    if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXTENSION) {
                        continue;
                    }
                    let relative = path.strip_prefix(&dir).unwrap_or(&path);
                    let mut relative = relative.to_path_buf();
                    relative.set_extension("");
                    let relative_str = relative.to_string_lossy().replace('\\', "/");
                    let virtual_path = format!("{root}/{relative_str}");
                    match self.resolve(&virtual_path) {
                        Ok(handle) => results.push(Ok(handle)),
                        Err(e) => {
                            log::warn!("failed to register engine asset \"{virtual_path}\": {e}");
                            results.push(Err(e));
                        }
                    }
                }
            }
        }
        results
    }

    /// Import `handle`'s payload: schedule `decode(import_path)` onto
    /// `queue`'s workers, then post its result back as a message so
    /// `on_ready` runs on whichever thread next calls `dispatch_messages`.
    /// Asserts main-thread affinity, matching `AssetDefinition::import`.
    pub fn import<T: Send + 'static>(
        &self,
        handle: AssetHandle,
        queue: &TaskQueue,
        decode: impl FnOnce(&Path) -> Result<T> + Send + 'static,
        on_ready: impl FnOnce(Result<T>) + Send + 'static,
    ) -> Result<()> {
        main_thread::assert_main_thread();

        let import_path = self
            .with_definition(handle, |def| def.import_path().map(Path::to_path_buf))
            .flatten()
            .ok_or_else(|| Error::parser_fail("asset has no import path to decode"))?;

        queue.schedule(TaskWork::new(move |sink| {
            let result = decode(&import_path);
            sink.push_message(crate::task_queue::TaskMessage::new(move || on_ready(result)));
        }));
        Ok(())
    }
}
