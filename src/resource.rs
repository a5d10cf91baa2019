//! Control-block ref-counting and the asset→resource reverse index (§4.6).
//!
//! Grounded in `Resource/Resource.h` and `Resource/ResourceManager.h`: the
//! `Resource::Query<T>` template (find-by-dynamic-type-or-create-and-register)
//! becomes [`ResourceManager::query_or_insert`], and `ResourceControlBlock`'s
//! manual refcount is replaced by `Arc`'s own strong/weak count — there is no
//! reason to hand-roll what the standard library already gives us for free.
//! `THashMap<Asset, TArray<Resource*>>` becomes the `(AssetHandle, TypeId)`
//! keying decided in the project's open-questions ledger: at most one
//! resource per (asset, concrete resource type).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::asset::AssetHandle;
use crate::error::{Error, Result};
use crate::guid::Guid;

/// A resource built from (and tied to the lifetime of) a single asset.
pub trait Resource: Any + Send + Sync {
    fn guid(&self) -> Guid;
    fn asset_handle(&self) -> AssetHandle;
    fn is_loaded(&self) -> bool;
}

type Key = (AssetHandle, TypeId);

struct Inner {
    by_key: HashMap<Key, Arc<dyn Any + Send + Sync>>,
    reflected: HashMap<Key, Arc<dyn Resource>>,
    by_asset: HashMap<AssetHandle, Vec<TypeId>>,
}

/// Owns every live [`Resource`], keyed by `(asset, concrete type)`.
pub struct ResourceManager {
    inner: RwLock<Inner>,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    pub fn new() -> Self {
        ResourceManager {
            inner: RwLock::new(Inner {
                by_key: HashMap::new(),
                reflected: HashMap::new(),
                by_asset: HashMap::new(),
            }),
        }
    }

    /// Register `resource`, keyed by its asset and concrete type. Rejects a
    /// second resource of the same type for the same asset.
    pub fn register<T: Resource>(&self, resource: Arc<T>) -> Result<Arc<T>> {
        let key = (resource.asset_handle(), TypeId::of::<T>());
        let mut inner = self.inner.write();
        if inner.by_key.contains_key(&key) {
            return Err(Error::duplicate("a resource of this type is already registered for this asset"));
        }
        let erased: Arc<dyn Any + Send + Sync> = resource.clone();
        let reflected: Arc<dyn Resource> = resource.clone();
        inner.by_key.insert(key, erased);
        inner.reflected.insert(key, reflected);
        inner.by_asset.entry(key.0).or_default().push(key.1);
        Ok(resource)
    }

    /// Find the `T`-typed resource registered for `asset`, if any.
    pub fn find<T: Resource>(&self, asset: AssetHandle) -> Option<Arc<T>> {
        let key = (asset, TypeId::of::<T>());
        let erased = self.inner.read().by_key.get(&key).cloned()?;
        erased.downcast::<T>().ok()
    }

    /// Find the resource of type `T` for `asset`, creating and registering
    /// one via `create` on a miss. Mirrors `Resource::Query<T>`: lookup,
    /// then parse-and-register, in one call.
    pub fn query_or_insert<T: Resource>(
        &self,
        asset: AssetHandle,
        create: impl FnOnce() -> Result<Arc<T>>,
    ) -> Result<Arc<T>> {
        if let Some(existing) = self.find::<T>(asset) {
            return Ok(existing);
        }
        let created = create()?;
        self.register(created)
    }

    /// True if `asset` has any resource registered, of any type.
    pub fn is_any_resource_available(&self, asset: AssetHandle) -> bool {
        self.inner
            .read()
            .by_asset
            .get(&asset)
            .map(|types| !types.is_empty())
            .unwrap_or(false)
    }

    pub fn is_registered<T: Resource>(&self, asset: AssetHandle) -> bool {
        let key = (asset, TypeId::of::<T>());
        self.inner.read().by_key.contains_key(&key)
    }

    /// Every currently-registered resource of type `T`, across all assets.
    pub fn resources_of_type<T: Resource>(&self) -> Vec<Arc<T>> {
        let type_id = TypeId::of::<T>();
        self.inner
            .read()
            .by_key
            .iter()
            .filter(|(key, _)| key.1 == type_id)
            .filter_map(|(_, erased)| erased.clone().downcast::<T>().ok())
            .collect()
    }

    /// Remove the `T`-typed resource registered for `asset`, if any.
    pub fn unregister<T: Resource>(&self, asset: AssetHandle) {
        let key = (asset, TypeId::of::<T>());
        let mut inner = self.inner.write();
        if inner.by_key.remove(&key).is_none() {
            return;
        }
        inner.reflected.remove(&key);
        if let Some(types) = inner.by_asset.get_mut(&asset) {
            types.retain(|t| *t != key.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMesh {
        guid: Guid,
        asset: AssetHandle,
        loaded: bool,
    }

    impl Resource for FakeMesh {
        fn guid(&self) -> Guid {
            self.guid
        }
        fn asset_handle(&self) -> AssetHandle {
            self.asset
        }
        fn is_loaded(&self) -> bool {
            self.loaded
        }
    }

    struct FakeTexture {
        guid: Guid,
        asset: AssetHandle,
        loaded: bool,
    }

    impl Resource for FakeTexture {
        fn guid(&self) -> Guid {
            self.guid
        }
        fn asset_handle(&self) -> AssetHandle {
            self.asset
        }
        fn is_loaded(&self) -> bool {
            self.loaded
        }
    }

    fn handle(index: u32) -> AssetHandle {
        AssetHandle::Bound { index, generation: 1 }
    }

    #[test]
    fn register_then_find_round_trips() {
        let manager = ResourceManager::new();
        let asset = handle(1);
        let mesh = Arc::new(FakeMesh {
            guid: Guid::new(),
            asset,
            loaded: true,
        });
        manager.register(mesh.clone()).unwrap();

        let found = manager.find::<FakeMesh>(asset).unwrap();
        assert_eq!(found.guid(), mesh.guid());
        assert!(manager.is_registered::<FakeMesh>(asset));
        assert!(manager.is_any_resource_available(asset));
    }

    #[test]
    fn duplicate_registration_for_same_asset_and_type_is_rejected() {
        let manager = ResourceManager::new();
        let asset = handle(2);
        manager
            .register(Arc::new(FakeMesh {
                guid: Guid::new(),
                asset,
                loaded: true,
            }))
            .unwrap();

        let err = manager
            .register(Arc::new(FakeMesh {
                guid: Guid::new(),
                asset,
                loaded: true,
            }))
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn distinct_types_on_the_same_asset_coexist() {
        let manager = ResourceManager::new();
        let asset = handle(3);
        manager
            .register(Arc::new(FakeMesh {
                guid: Guid::new(),
                asset,
                loaded: true,
            }))
            .unwrap();
        manager
            .register(Arc::new(FakeTexture {
                guid: Guid::new(),
                asset,
                loaded: true,
            }))
            .unwrap();

        assert!(manager.find::<FakeMesh>(asset).is_some());
        assert!(manager.find::<FakeTexture>(asset).is_some());
    }

    #[test]
    fn query_or_insert_creates_once_then_reuses() {
        let manager = ResourceManager::new();
        let asset = handle(4);
        let create_calls = std::sync::atomic::AtomicUsize::new(0);

        let make = || {
            create_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Arc::new(FakeMesh {
                guid: Guid::new(),
                asset,
                loaded: true,
            }))
        };

        let first = manager.query_or_insert(asset, make).unwrap();
        let second = manager.query_or_insert(asset, make).unwrap();
        assert_eq!(first.guid(), second.guid());
        assert_eq!(create_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn invariant_8_unregister_decreases_count_by_exactly_one() {
        let manager = ResourceManager::new();
        let a1 = handle(5);
        let a2 = handle(6);
        let removed_guid = Guid::new();
        manager
            .register(Arc::new(FakeMesh {
                guid: removed_guid,
                asset: a1,
                loaded: true,
            }))
            .unwrap();
        let kept = Arc::new(FakeMesh {
            guid: Guid::new(),
            asset: a2,
            loaded: true,
        });
        manager.register(kept.clone()).unwrap();

        assert_eq!(manager.resources_of_type::<FakeMesh>().len(), 2);
        manager.unregister::<FakeMesh>(a1);
        let remaining = manager.resources_of_type::<FakeMesh>();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].guid(), kept.guid());
    }
}
