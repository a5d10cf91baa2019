//! Typed configuration for the asset and resource subsystem (§6.4).
//!
//! Loadable from a TOML file for a standalone embedder, or constructed
//! directly with [`Config::default`] for tests and in-process wiring.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_MESH_POOL_SIZE: usize = 128 * 1024 * 1024;
const DEFAULT_TEXTURE_POOL_SIZE: usize = 512 * 1024 * 1024;
const DEFAULT_ALIGNMENT: usize = 64;

fn default_mesh_pool_size() -> usize {
    DEFAULT_MESH_POOL_SIZE
}

fn default_texture_pool_size() -> usize {
    DEFAULT_TEXTURE_POOL_SIZE
}

fn default_alignment() -> usize {
    DEFAULT_ALIGNMENT
}

fn default_worker_count() -> usize {
    let hw = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    hw.max(4)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial size, in bytes, of the mesh memory pool.
    #[serde(default = "default_mesh_pool_size")]
    pub mesh_pool_size: usize,

    /// Initial size, in bytes, of the texture memory pool.
    #[serde(default = "default_texture_pool_size")]
    pub texture_pool_size: usize,

    /// Alignment, in bytes (power of two), for every pool allocation.
    #[serde(default = "default_alignment")]
    pub asset_pool_alignment: usize,

    /// Number of task-queue worker threads.
    #[serde(default = "default_worker_count")]
    pub asset_worker_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mesh_pool_size: default_mesh_pool_size(),
            texture_pool_size: default_texture_pool_size(),
            asset_pool_alignment: default_alignment(),
            asset_worker_count: default_worker_count(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::parser_fail(format!("invalid config: {e}")))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// `asset_pool_alignment` must be a power of two; callers that load
    /// config from an untrusted file should check this before using it.
    pub fn has_valid_alignment(&self) -> bool {
        self.asset_pool_alignment > 0 && self.asset_pool_alignment.is_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.mesh_pool_size, 128 * 1024 * 1024);
        assert_eq!(cfg.texture_pool_size, 512 * 1024 * 1024);
        assert_eq!(cfg.asset_pool_alignment, 64);
        assert!(cfg.asset_worker_count >= 4);
        assert!(cfg.has_valid_alignment());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = Config::from_toml_str("mesh_pool_size = 1048576\n").unwrap();
        assert_eq!(cfg.mesh_pool_size, 1048576);
        assert_eq!(cfg.texture_pool_size, 512 * 1024 * 1024);
    }

    #[test]
    fn malformed_toml_is_a_parser_fail() {
        let err = Config::from_toml_str("not valid = = toml").unwrap_err();
        assert!(err.is_parser_fail());
    }
}
