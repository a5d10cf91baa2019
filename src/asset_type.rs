//! Process-wide map from type-tag (`Ion.Mesh`, `Ion.Texture`, …) to a
//! parser plus default-data factory (§4.4).
//!
//! Registration happens once, at init, by each asset type — there is no
//! `unregister_type`, mirroring the lifetime of `AssetType` objects in the
//! original engine. Grounded in spec §4.4's contract; the registration-map
//! shape (name → trait object, duplicate rejected rather than silently
//! overwritten) follows the same idiom as `AssetRegistry`'s virtual-root
//! map in `asset.rs`, but fixes the teacher's habit of stubbing missing
//! entries with a `panic!("not implemented")` — here a missing or
//! duplicate registration is always a typed [`Error`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::parser::AssetParserCursor;

/// Type-specific parsed data living inside an `AssetDefinition`. Asset
/// types downcast this back to their concrete struct via [`Any`].
pub trait CustomAssetData: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> CustomAssetData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One entry in the asset type registry: a parser plus a default-data
/// factory for a single type-tag such as `Ion.Material`.
pub trait AssetType: Send + Sync {
    fn name(&self) -> &str;

    /// Parse the type-specific subtree, with the cursor already positioned
    /// past the generic `Info`/`Name`/`ImportExternal`/`Resource` parse.
    fn parse(&self, cursor: &mut AssetParserCursor<'_>) -> Result<Box<dyn CustomAssetData>>;

    /// Used when a descriptor omits the type-specific subtree entirely.
    fn create_default_custom_data(&self) -> Box<dyn CustomAssetData>;
}

#[derive(Default)]
pub struct AssetTypeRegistry {
    types: RwLock<HashMap<String, Arc<dyn AssetType>>>,
}

impl AssetTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(&self, asset_type: Arc<dyn AssetType>) -> Result<()> {
        let mut types = self.types.write();
        let name = asset_type.name().to_string();
        if types.contains_key(&name) {
            return Err(Error::duplicate(format!("asset type \"{name}\"")));
        }
        types.insert(name, asset_type);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn AssetType>> {
        self.types.read().get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }
}
