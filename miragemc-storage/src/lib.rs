//! Persistence bridge: streams saved per-block records into a context on
//! load, and snapshots the real-world footprint of a context for saving.
//!
//! The engine core never reads files itself; it talks to a `RegionStore`
//! the same way the rest of the workspace talks to host capabilities.

mod bridge;
mod file;

pub use bridge::{BlockSink, ColumnLoader, WorldSampler, restore_region, snapshot_footprint};
pub use file::FileRegionStore;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One saved block record. NBT has no unsigned integers, so the fields are
/// stored signed and converted at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedBlock {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub material: i32,
    pub variant: i8,
    pub block_light: i8,
    pub sky_light: i8,
}

/// A named block snapshot on disk: the real-world blocks under a context's
/// footprint at the time the region was (re)defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRegion {
    pub name: String,
    pub world: u32,
    pub blocks: Vec<SavedBlock>,
}

#[async_trait]
pub trait RegionStore: Send + Sync {
    async fn save_region(&self, region: &SavedRegion) -> Result<()>;
    async fn load_region(&self, name: &str) -> Result<Option<SavedRegion>>;
    async fn delete_region(&self, name: &str) -> Result<bool>;
    async fn list_regions(&self) -> Result<Vec<String>>;
}
